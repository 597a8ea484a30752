//! Little-endian, alignment-free serialization primitives.
//!
//! Every multi-byte integer on disk is little-endian regardless of host
//! endianness. `f32` travels as the bit pattern of its `u32`
//! representation. [`Reader`] is bounds-checked: it never reads past the
//! caller-supplied slice and reports truncation as `None` so callers can
//! map it to their own error kind (`InvalidBlob` for wire blobs,
//! `Corrupt` for index blocks).

/// Bounds-checked little-endian reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Current position from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Skip `n` bytes, if available.
    pub fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }

    /// Borrow the next `n` bytes and advance.
    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    pub fn u16(&mut self) -> Option<u16> {
        let b = self.take(2)?;
        Some(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Option<u32> {
        let b = self.take(4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Option<u64> {
        let b = self.take(8)?;
        Some(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn f32(&mut self) -> Option<f32> {
        self.u32().map(f32::from_bits)
    }
}

/// Little-endian writer over a caller-sized buffer.
///
/// Writers operate on exact-size buffers computed by the block layout, so
/// overruns are programming errors and panic via the slice bounds check
/// rather than being reported.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Writer { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reposition the write head. The target must lie inside the buffer.
    pub fn seek(&mut self, pos: usize) {
        assert!(pos <= self.buf.len());
        self.pos = pos;
    }

    pub fn bytes(&mut self, src: &[u8]) {
        self.buf[self.pos..self.pos + src.len()].copy_from_slice(src);
        self.pos += src.len();
    }

    pub fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.bytes(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.u32(v.to_bits());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_round_trip_little_endian() {
        let mut buf = [0u8; 14];
        let mut w = Writer::new(&mut buf);
        w.u16(0x1234);
        w.u32(0xdead_beef);
        w.u64(0x0102_0304_0506_0708);
        assert_eq!(w.position(), 14);

        // Spot-check wire bytes: low byte first.
        assert_eq!(&buf[..2], &[0x34, 0x12]);
        assert_eq!(&buf[2..6], &[0xef, 0xbe, 0xad, 0xde]);

        let mut r = Reader::new(&buf);
        assert_eq!(r.u16(), Some(0x1234));
        assert_eq!(r.u32(), Some(0xdead_beef));
        assert_eq!(r.u64(), Some(0x0102_0304_0506_0708));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn f32_is_bit_cast_of_u32() {
        let mut buf = [0u8; 4];
        Writer::new(&mut buf).f32(1.0);
        assert_eq!(buf, [0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(Reader::new(&buf).f32(), Some(1.0));
    }

    #[test]
    fn nan_payload_survives_round_trip() {
        let weird = f32::from_bits(0x7fc0_1234);
        let mut buf = [0u8; 4];
        Writer::new(&mut buf).f32(weird);
        let back = Reader::new(&buf).f32().unwrap();
        assert_eq!(back.to_bits(), weird.to_bits());
    }

    #[test]
    fn reader_refuses_truncated_input() {
        let buf = [1u8, 2, 3];
        let mut r = Reader::new(&buf);
        assert_eq!(r.u32(), None);
        // Failed read must not consume anything.
        assert_eq!(r.remaining(), 3);
        assert_eq!(r.u16(), Some(0x0201));
        assert_eq!(r.u16(), None);
        assert_eq!(r.u64(), None);
    }

    #[test]
    fn skip_and_take_respect_bounds() {
        let buf = [0u8; 8];
        let mut r = Reader::new(&buf);
        assert!(r.skip(8).is_some());
        assert!(r.skip(1).is_none());
        assert!(r.take(1).is_none());
    }
}
