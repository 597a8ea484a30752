//! Index file: header, block allocation, and the host VFS seam.
//!
//! The file is an append-only sequence of fixed-size blocks. Block 0 is
//! the header; every later block holds one graph node. Blocks are never
//! moved and (today) never freed — `first_free_offset` is reserved for a
//! future free list and always written as 0.
//!
//! All I/O goes through the narrow [`Vfs`]/[`VfsFile`] traits so the
//! index can sit on an embedding host's VFS; [`StdVfs`] is the plain
//! `std::fs` implementation used by tests and standalone embedding.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::block::{self, BlockLayout, Node, BLOCK_SIZE_SHIFT};
use crate::codec::{Reader, Writer};
use crate::error::{AnnexError, Result};
use crate::vector::{VectorType, MAX_VECTOR_DIMS};

/// `"DiskANN"` read as a little-endian integer.
pub const INDEX_MAGIC: u64 = 0x4e4e416b736944;

/// Serialized header size (the header block is padded to a full block).
const HEADER_FIELDS_SIZE: usize = 32;

/// Distance function tag stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u16)]
pub enum Similarity {
    Cosine = 0,
}

impl Similarity {
    fn from_tag(tag: u16) -> Option<Similarity> {
        match tag {
            0 => Some(Similarity::Cosine),
            _ => None,
        }
    }
}

/// Decoded header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub block_size: usize,
    pub vector_type: VectorType,
    pub dims: usize,
    pub similarity: Similarity,
    /// Offset of the search entry node; 0 means the graph is empty.
    pub entry_offset: u64,
    /// Reserved for block reclamation; always 0.
    pub first_free_offset: u64,
}

impl IndexHeader {
    /// Serialize into a full zero-padded header block.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.block_size];
        let mut w = Writer::new(&mut buf);
        w.u64(INDEX_MAGIC);
        w.u16((self.block_size >> BLOCK_SIZE_SHIFT) as u16);
        w.u16(self.vector_type.tag());
        w.u16(self.dims as u16);
        w.u16(self.similarity as u16);
        w.u64(self.entry_offset);
        w.u64(self.first_free_offset);
        debug_assert_eq!(w.position(), HEADER_FIELDS_SIZE);
        buf
    }

    /// Decode and validate the fixed header fields.
    pub fn decode(bytes: &[u8]) -> Result<IndexHeader> {
        let mut r = Reader::new(bytes);
        let magic = r
            .u64()
            .ok_or_else(|| AnnexError::Corrupt("header truncated".to_string()))?;
        if magic != INDEX_MAGIC {
            return Err(AnnexError::Corrupt(format!(
                "bad magic {:#018x}",
                magic
            )));
        }
        let units = r
            .u16()
            .ok_or_else(|| AnnexError::Corrupt("header truncated".to_string()))?;
        if units == 0 {
            return Err(AnnexError::Corrupt("zero block size".to_string()));
        }
        let block_size = (units as usize) << BLOCK_SIZE_SHIFT;
        let type_tag = r
            .u16()
            .ok_or_else(|| AnnexError::Corrupt("header truncated".to_string()))?;
        let vector_type = VectorType::from_tag(type_tag)
            .ok_or_else(|| AnnexError::Corrupt(format!("unknown vector type {}", type_tag)))?;
        let dims = r
            .u16()
            .ok_or_else(|| AnnexError::Corrupt("header truncated".to_string()))?
            as usize;
        if dims == 0 || dims > MAX_VECTOR_DIMS {
            return Err(AnnexError::Corrupt(format!("dimension {} out of range", dims)));
        }
        let sim_tag = r
            .u16()
            .ok_or_else(|| AnnexError::Corrupt("header truncated".to_string()))?;
        let similarity = Similarity::from_tag(sim_tag)
            .ok_or_else(|| AnnexError::Corrupt(format!("unknown similarity {}", sim_tag)))?;
        let entry_offset = r
            .u64()
            .ok_or_else(|| AnnexError::Corrupt("header truncated".to_string()))?;
        let first_free_offset = r
            .u64()
            .ok_or_else(|| AnnexError::Corrupt("header truncated".to_string()))?;
        Ok(IndexHeader {
            block_size,
            vector_type,
            dims,
            similarity,
            entry_offset,
            first_free_offset,
        })
    }
}

/// One open file as the host VFS exposes it.
pub trait VfsFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;
    fn write_at(&mut self, offset: u64, data: &[u8]) -> std::io::Result<()>;
    fn size(&mut self) -> std::io::Result<u64>;
}

/// Host file system: open-or-create by path.
pub trait Vfs {
    fn open(&self, path: &Path) -> std::io::Result<Box<dyn VfsFile>>;
}

/// `std::fs` implementation of the VFS seam.
pub struct StdVfs;

struct StdFile(std::fs::File);

impl Vfs for StdVfs {
    fn open(&self, path: &Path) -> std::io::Result<Box<dyn VfsFile>> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Box::new(StdFile(file)))
    }
}

impl VfsFile for StdFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        self.0.seek(SeekFrom::Start(offset))?;
        self.0.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        self.0.seek(SeekFrom::Start(offset))?;
        self.0.write_all(data)
    }

    fn size(&mut self) -> std::io::Result<u64> {
        Ok(self.0.metadata()?.len())
    }
}

/// An open index file: header + append-only block allocator.
pub struct IndexFile {
    file: Box<dyn VfsFile>,
    header: IndexHeader,
    layout: BlockLayout,
    file_size: u64,
}

impl IndexFile {
    /// Open an index file, initializing the header if the file is empty.
    ///
    /// `block_size`, `vector_type` and `dims` come from the index
    /// declaration; on an existing file they are checked against the
    /// stored header. A non-empty file whose header lost its entry
    /// offset is recovered by scanning for the lowest valid node block.
    pub fn open(
        vfs: &dyn Vfs,
        path: &Path,
        block_size: usize,
        vector_type: VectorType,
        dims: usize,
    ) -> Result<IndexFile> {
        let layout = BlockLayout::new(block_size, vector_type, dims)?;
        let mut file = vfs.open(path)?;
        let size = file.size()?;

        if size == 0 {
            let header = IndexHeader {
                block_size,
                vector_type,
                dims,
                similarity: Similarity::Cosine,
                entry_offset: 0,
                first_free_offset: 0,
            };
            file.write_at(0, &header.encode())?;
            debug!(path = %path.display(), block_size, dims, "initialized index file");
            return Ok(IndexFile {
                file,
                header,
                layout,
                file_size: block_size as u64,
            });
        }

        let mut head = vec![0u8; HEADER_FIELDS_SIZE];
        file.read_at(0, &mut head)?;
        let header = IndexHeader::decode(&head)?;
        if header.block_size != block_size
            || header.vector_type != vector_type
            || header.dims != dims
        {
            return Err(AnnexError::Corrupt(format!(
                "header disagrees with declaration: block size {} / type {:?} / dimension {}",
                header.block_size, header.vector_type, header.dims
            )));
        }
        if size % block_size as u64 != 0 {
            return Err(AnnexError::Corrupt(format!(
                "file size {} is not a multiple of the block size",
                size
            )));
        }

        let mut index = IndexFile {
            file,
            header,
            layout,
            file_size: size,
        };
        index.validate_entry()?;
        debug!(path = %path.display(), file_size = size, "opened index file");
        Ok(index)
    }

    /// Check the entry offset, scanning for a replacement if the header
    /// lost it while node blocks exist.
    fn validate_entry(&mut self) -> Result<()> {
        let block_size = self.layout.block_size() as u64;
        if self.header.entry_offset != 0 {
            let entry = self.header.entry_offset;
            if entry < block_size || entry >= self.file_size || entry % block_size != 0 {
                return Err(AnnexError::Corrupt(format!(
                    "entry offset {} out of range",
                    entry
                )));
            }
            return Ok(());
        }
        if self.file_size == block_size {
            return Ok(());
        }

        // Non-empty file without an entry point: the entry update did not
        // make it to disk. Adopt the lowest offset that still decodes as
        // a node.
        let mut offset = block_size;
        while offset < self.file_size {
            let bytes = self.read_block(offset)?;
            if block::decode_block(&bytes, &self.layout, self.file_size).is_ok() {
                warn!(offset, "entry offset missing, recovered from block scan");
                self.set_entry_offset(offset)?;
                return Ok(());
            }
            offset += block_size;
        }
        Err(AnnexError::Corrupt(
            "entry offset missing and no valid node block found".to_string(),
        ))
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Offset of the search entry node; 0 for an empty graph.
    pub fn entry_offset(&self) -> u64 {
        self.header.entry_offset
    }

    /// Number of node blocks.
    pub fn node_count(&self) -> u64 {
        self.file_size / self.layout.block_size() as u64 - 1
    }

    fn check_node_offset(&self, offset: u64) -> Result<()> {
        let block_size = self.layout.block_size() as u64;
        if offset < block_size || offset >= self.file_size || offset % block_size != 0 {
            return Err(AnnexError::Corrupt(format!(
                "block offset {} out of range (file size {})",
                offset, self.file_size
            )));
        }
        Ok(())
    }

    /// Append one block; returns its offset. The file grows by exactly
    /// one block and only after the write succeeded.
    pub fn append_block(&mut self, bytes: &[u8]) -> Result<u64> {
        assert_eq!(bytes.len(), self.layout.block_size());
        let offset = self.file_size;
        self.file.write_at(offset, bytes)?;
        self.file_size += self.layout.block_size() as u64;
        Ok(offset)
    }

    /// Read one node block.
    pub fn read_block(&mut self, offset: u64) -> Result<Vec<u8>> {
        self.check_node_offset(offset)?;
        let mut buf = vec![0u8; self.layout.block_size()];
        self.file.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Overwrite one node block in place.
    pub fn write_block(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        assert_eq!(bytes.len(), self.layout.block_size());
        self.check_node_offset(offset)?;
        self.file.write_at(offset, bytes)?;
        Ok(())
    }

    /// Read and decode the node at `offset`.
    pub fn read_node(&mut self, offset: u64) -> Result<Node> {
        let bytes = self.read_block(offset)?;
        block::decode_block(&bytes, &self.layout, self.file_size)
    }

    /// Encode and append a node; returns its block offset.
    pub fn append_node(&mut self, node: &Node) -> Result<u64> {
        let bytes = block::encode_block(node, &self.layout)?;
        self.append_block(&bytes)
    }

    /// Encode and overwrite the node at `offset`.
    pub fn write_node(&mut self, offset: u64, node: &Node) -> Result<()> {
        let bytes = block::encode_block(node, &self.layout)?;
        self.write_block(offset, &bytes)
    }

    /// Persist the in-memory header.
    pub fn update_header(&mut self) -> Result<()> {
        let bytes = self.header.encode();
        self.file.write_at(0, &bytes)?;
        Ok(())
    }

    /// Set and persist the entry offset.
    pub fn set_entry_offset(&mut self, offset: u64) -> Result<()> {
        self.header.entry_offset = offset;
        self.update_header()
    }

    /// Close the file, releasing the handle.
    pub fn close(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Neighbor, Node};
    use crate::vector::Vector;

    fn header() -> IndexHeader {
        IndexHeader {
            block_size: 4096,
            vector_type: VectorType::F32,
            dims: 3,
            similarity: Similarity::Cosine,
            entry_offset: 4096,
            first_free_offset: 0,
        }
    }

    #[test]
    fn header_wire_form() {
        let bytes = header().encode();
        assert_eq!(bytes.len(), 4096);
        // Magic spells "DiskANN" when read little-endian.
        assert_eq!(&bytes[..8], b"DiskANN\0");
        // 4096 bytes = 8 sectors of 512.
        assert_eq!(&bytes[8..10], &[8, 0]);
        assert!(bytes[32..].iter().all(|&b| b == 0));
    }

    #[test]
    fn header_round_trip() {
        let h = header();
        assert_eq!(IndexHeader::decode(&h.encode()).unwrap(), h);
    }

    #[test]
    fn header_rejects_bad_fields() {
        let good = header().encode();

        let mut bad = good.clone();
        bad[0] ^= 0xff;
        assert!(matches!(
            IndexHeader::decode(&bad),
            Err(AnnexError::Corrupt(_))
        ));

        let mut bad = good.clone();
        bad[10..12].copy_from_slice(&7u16.to_le_bytes()); // unknown vector type
        assert!(matches!(
            IndexHeader::decode(&bad),
            Err(AnnexError::Corrupt(_))
        ));

        let mut bad = good;
        bad[12..14].copy_from_slice(&0u16.to_le_bytes()); // zero dimension
        assert!(matches!(
            IndexHeader::decode(&bad),
            Err(AnnexError::Corrupt(_))
        ));
    }

    #[test]
    fn create_append_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx");

        let mut index =
            IndexFile::open(&StdVfs, &path, 4096, VectorType::F32, 3).unwrap();
        assert_eq!(index.file_size(), 4096);
        assert_eq!(index.entry_offset(), 0);
        assert_eq!(index.node_count(), 0);

        let node = Node {
            id: 1,
            vec: Vector::from_f32(vec![1.0, 0.0, 0.0]),
            neighbors: Default::default(),
        };
        let offset = index.append_node(&node).unwrap();
        assert_eq!(offset, 4096);
        index.set_entry_offset(offset).unwrap();
        let stored_header = *index.header();
        index.close().unwrap();

        let mut reopened =
            IndexFile::open(&StdVfs, &path, 4096, VectorType::F32, 3).unwrap();
        assert_eq!(*reopened.header(), stored_header);
        assert_eq!(reopened.read_node(4096).unwrap(), node);
    }

    #[test]
    fn reopen_with_wrong_declaration_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx");
        IndexFile::open(&StdVfs, &path, 4096, VectorType::F32, 3).unwrap();
        assert!(matches!(
            IndexFile::open(&StdVfs, &path, 4096, VectorType::F32, 4),
            Err(AnnexError::Corrupt(_))
        ));
    }

    #[test]
    fn recovery_scan_adopts_lowest_valid_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx");

        let mut index =
            IndexFile::open(&StdVfs, &path, 4096, VectorType::F32, 3).unwrap();
        let a = index.append_node(&Node {
            id: 1,
            vec: Vector::from_f32(vec![1.0, 0.0, 0.0]),
            neighbors: Default::default(),
        });
        let a = a.unwrap();
        index
            .append_node(&Node {
                id: 2,
                vec: Vector::from_f32(vec![0.0, 1.0, 0.0]),
                neighbors: [Neighbor {
                    id: 1,
                    offset: a,
                    vec: Vector::from_f32(vec![1.0, 0.0, 0.0]),
                }]
                .into_iter()
                .collect(),
            })
            .unwrap();
        // Entry offset never persisted: simulates a crash between the
        // block append and the header update.
        index.close().unwrap();

        let reopened =
            IndexFile::open(&StdVfs, &path, 4096, VectorType::F32, 3).unwrap();
        assert_eq!(reopened.entry_offset(), a);
    }

    #[test]
    fn out_of_range_reads_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx");
        let mut index =
            IndexFile::open(&StdVfs, &path, 4096, VectorType::F32, 3).unwrap();
        assert!(matches!(
            index.read_block(0),
            Err(AnnexError::Corrupt(_))
        ));
        assert!(matches!(
            index.read_block(4096),
            Err(AnnexError::Corrupt(_))
        ));
        assert!(matches!(
            index.read_block(4000),
            Err(AnnexError::Corrupt(_))
        ));
    }
}
