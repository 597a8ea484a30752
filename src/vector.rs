//! Dense vector values and cosine distance.
//!
//! A [`Vector`] is a type tag plus a dense array of components. Only
//! `f32` exists today; the tag is stored on disk so further element types
//! can be added without a format break. All vectors inside one index
//! share element type and dimension, pinned at index creation.
//!
//! ## Distance semantics
//!
//! [`Vector::cosine_distance`] accumulates the dot product and both
//! squared norms in `f32` and performs the final division in `f64`. The
//! accumulation order is identical for both arguments, so the distance is
//! bitwise symmetric. A zero norm on either side yields `f64::NAN`, which
//! [`cmp_distance`] orders after every finite value.

use std::cmp::Ordering;

use crate::codec::{Reader, Writer};
use crate::error::{AnnexError, Result};

/// Hard cap on vector dimension, shared by text and blob parsers.
pub const MAX_VECTOR_DIMS: usize = 16000;

/// Longest accepted textual representation of a single component.
pub const MAX_NUMBER_CHARS: usize = 1024;

/// On-disk element type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u16)]
pub enum VectorType {
    /// IEEE-754 single precision, little-endian.
    F32 = 0,
}

impl VectorType {
    pub fn from_tag(tag: u16) -> Option<VectorType> {
        match tag {
            0 => Some(VectorType::F32),
            _ => None,
        }
    }

    pub fn tag(self) -> u16 {
        self as u16
    }

    /// Wire size of one element.
    pub fn element_size(self) -> usize {
        match self {
            VectorType::F32 => 4,
        }
    }
}

/// A dense numeric vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    vtype: VectorType,
    data: Vec<f32>,
}

impl Vector {
    pub fn from_f32(data: Vec<f32>) -> Vector {
        Vector {
            vtype: VectorType::F32,
            data,
        }
    }

    pub fn vector_type(&self) -> VectorType {
        self.vtype
    }

    /// Number of components.
    pub fn dims(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Wire size of the blob form: length prefix plus payload.
    pub fn blob_size(&self) -> usize {
        blob_size(self.vtype, self.dims())
    }

    /// Cosine distance `1 - (u.v)/(|u||v|)` to another vector.
    ///
    /// NaN when either norm is zero; see [`cmp_distance`] for ranking.
    pub fn cosine_distance(&self, other: &Vector) -> Result<f64> {
        if self.dims() != other.dims() {
            return Err(AnnexError::DimensionMismatch {
                left: self.dims(),
                right: other.dims(),
            });
        }
        Ok(cosine(&self.data, &other.data))
    }

    /// Parse the textual form `'[' (number (',' number)*)? ']'`.
    ///
    /// Surrounding whitespace is ignored, as is whitespace around each
    /// component. `[]` parses to a zero-dimension vector; index
    /// boundaries reject it separately.
    pub fn parse_text(text: &str) -> Result<Vector> {
        let trimmed = text.trim();
        let inner = trimmed
            .strip_prefix('[')
            .ok_or_else(|| AnnexError::InvalidText("doesn't start with '['".to_string()))?;
        let inner = inner
            .strip_suffix(']')
            .ok_or_else(|| {
                AnnexError::InvalidText("malformed vector, doesn't end with ']'".to_string())
            })?
            .trim();

        if inner.is_empty() {
            return Ok(Vector::from_f32(Vec::new()));
        }

        let mut data: Vec<f32> = Vec::new();
        data.try_reserve(inner.split(',').count())
            .map_err(|_| AnnexError::NoMemory)?;

        for token in inner.split(',') {
            let token = token.trim();
            if token.len() > MAX_NUMBER_CHARS {
                return Err(AnnexError::InvalidText(format!(
                    "float too big while parsing vector: {}...",
                    echo(token)
                )));
            }
            let value: f64 = token
                .parse()
                .map_err(|_| AnnexError::InvalidText(format!("invalid number: {}...", echo(token))))?;
            if data.len() >= MAX_VECTOR_DIMS {
                return Err(AnnexError::InvalidText(format!(
                    "vector is larger than the maximum: ({})",
                    MAX_VECTOR_DIMS
                )));
            }
            data.push(value as f32);
        }
        Ok(Vector::from_f32(data))
    }

    /// Parse the wire blob form: `u32` length then `length` little-endian
    /// `f32` values.
    pub fn parse_blob(blob: &[u8]) -> Result<Vector> {
        let mut r = Reader::new(blob);
        let len = r
            .u32()
            .ok_or_else(|| AnnexError::InvalidBlob("zero length".to_string()))? as usize;
        if len > MAX_VECTOR_DIMS {
            return Err(AnnexError::InvalidBlob(format!("too large: {}", len)));
        }
        if r.remaining() < len * 4 {
            return Err(AnnexError::InvalidBlob("malformed blob".to_string()));
        }
        let mut data: Vec<f32> = Vec::new();
        data.try_reserve_exact(len).map_err(|_| AnnexError::NoMemory)?;
        for _ in 0..len {
            // Length was checked above; the reads cannot fail.
            data.push(r.f32().unwrap_or_default());
        }
        Ok(Vector::from_f32(data))
    }

    /// Serialize to the wire blob form.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.blob_size()];
        self.write_blob(&mut Writer::new(&mut buf));
        buf
    }

    /// Write the blob form at the writer's current position.
    pub(crate) fn write_blob(&self, w: &mut Writer<'_>) {
        w.u32(self.data.len() as u32);
        for &x in &self.data {
            w.f32(x);
        }
    }

    /// Read a blob of exactly `dims` components from a block slot.
    ///
    /// `None` on truncation or a length prefix disagreeing with the index
    /// dimension; callers map that to `Corrupt`.
    pub(crate) fn read_blob(r: &mut Reader<'_>, dims: usize) -> Option<Vector> {
        let len = r.u32()? as usize;
        if len != dims {
            return None;
        }
        let mut data = Vec::with_capacity(dims);
        for _ in 0..dims {
            data.push(r.f32()?);
        }
        Some(Vector::from_f32(data))
    }

    /// Canonical text form: integer-valued components as decimal
    /// integers, everything else in `%.6e` notation.
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(2 + self.data.len() * 16);
        out.push('[');
        for (i, &x) in self.data.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&format_f32(x));
        }
        out.push(']');
        out
    }
}

/// Cosine distance over raw component slices.
///
/// Accumulation is `f32` throughout (matching the on-disk precision);
/// only the final combination runs in `f64`.
pub(crate) fn cosine(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    let denom = (norm_a * norm_b) as f64;
    if denom == 0.0 {
        return f64::NAN;
    }
    1.0 - (dot as f64) / denom.sqrt()
}

/// Ranking order for distances: ascending, NaN after every finite value.
pub(crate) fn cmp_distance(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

pub(crate) fn blob_size(vtype: VectorType, dims: usize) -> usize {
    4 + vtype.element_size() * dims
}

/// Truncate a token for error echoes.
fn echo(token: &str) -> &str {
    let mut end = token.len().min(32);
    while !token.is_char_boundary(end) {
        end -= 1;
    }
    &token[..end]
}

fn is_integral(x: f32) -> bool {
    x >= 0.0 && x <= u64::MAX as f32 && x == (x as u64) as f32
}

/// One component in canonical text form.
fn format_f32(x: f32) -> String {
    if is_integral(x) {
        return format!("{}", x as u64);
    }
    // C-style %.6e: six fraction digits, signed two-digit exponent.
    let s = format!("{:.6e}", x);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        // inf / NaN carry no exponent
        None => s,
    }
}
