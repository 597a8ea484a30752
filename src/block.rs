//! Fixed-size node blocks.
//!
//! Each graph node occupies exactly one block of `B` bytes. A block
//! stores the owner vector, the owner id, and — the LM-DiskANN twist —
//! the full vectors of the node's out-neighbors next to their `(id,
//! offset)` metadata, so a single block read both scores a candidate and
//! expands the search frontier without further I/O.
//!
//! Layout, in order:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ owner vector blob        (4 + 4·D bytes)     │
//! │ owner id                 (u64)               │
//! │ neighbor count n         (u16)               │
//! │ R_max neighbor vector blobs (slot-parallel)  │
//! │ R_max neighbor records   (u64 id, u64 off)   │
//! │ zero padding to B                            │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Only the first `n` vector slots and metadata records are meaningful;
//! spare slots stay zero-filled. The two arrays are parallel: slot `i`
//! holds the vector of the neighbor described by record `i`.

use smallvec::SmallVec;

use crate::codec::{Reader, Writer};
use crate::error::{AnnexError, Result};
use crate::vector::{self, Vector, VectorType};

/// Default block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// The header stores the block size in 512-byte sector units.
pub const BLOCK_SIZE_SHIFT: u32 = 9;

/// Neighbor lists are degree-capped; keep short ones inline.
pub type NeighborList = SmallVec<[Neighbor; 8]>;

/// An out-edge: target id, target block offset, and the target's vector
/// held inline.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: u64,
    pub offset: u64,
    pub vec: Vector,
}

/// A graph node as materialized from one block.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: u64,
    pub vec: Vector,
    pub neighbors: NeighborList,
}

/// Slot arithmetic for one index's blocks.
///
/// Derived from the block size and the index dimension pinned in the
/// header; all offsets within a block are functions of these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    block_size: usize,
    vtype: VectorType,
    dims: usize,
}

impl BlockLayout {
    /// Build a layout. Fails if a block cannot hold the owner fields and
    /// at least one neighbor slot.
    pub fn new(block_size: usize, vtype: VectorType, dims: usize) -> Result<BlockLayout> {
        let layout = BlockLayout {
            block_size,
            vtype,
            dims,
        };
        if block_size < layout.fixed_size() + layout.neighbor_slot_size() {
            return Err(AnnexError::InvalidParameter(format!(
                "block size {} cannot hold a dimension-{} node",
                block_size, dims
            )));
        }
        Ok(layout)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn vector_type(&self) -> VectorType {
        self.vtype
    }

    /// Size of one vector blob slot (owner or neighbor).
    fn vector_blob_size(&self) -> usize {
        vector::blob_size(self.vtype, self.dims)
    }

    /// Owner blob + owner id + neighbor count.
    fn fixed_size(&self) -> usize {
        self.vector_blob_size() + 8 + 2
    }

    /// One neighbor costs a vector slot plus a 16-byte metadata record.
    fn neighbor_slot_size(&self) -> usize {
        self.vector_blob_size() + 16
    }

    /// Block capacity `R_max`: how many neighbors fit after the owner
    /// fields.
    pub fn max_neighbors(&self) -> usize {
        (self.block_size - self.fixed_size()) / self.neighbor_slot_size()
    }

    fn neighbor_vectors_start(&self) -> usize {
        self.fixed_size()
    }

    fn neighbor_meta_start(&self) -> usize {
        self.neighbor_vectors_start() + self.max_neighbors() * self.vector_blob_size()
    }
}

/// Serialize a node into exactly one block. Spare slots are zero-filled.
pub fn encode_block(node: &Node, layout: &BlockLayout) -> Result<Vec<u8>> {
    if node.vec.dims() != layout.dims() {
        return Err(AnnexError::DimensionMismatch {
            left: node.vec.dims(),
            right: layout.dims(),
        });
    }
    if node.neighbors.len() > layout.max_neighbors() {
        return Err(AnnexError::InvalidParameter(format!(
            "node degree {} exceeds block capacity {}",
            node.neighbors.len(),
            layout.max_neighbors()
        )));
    }

    let mut buf = vec![0u8; layout.block_size()];
    let mut w = Writer::new(&mut buf);
    node.vec.write_blob(&mut w);
    w.u64(node.id);
    w.u16(node.neighbors.len() as u16);

    for neighbor in &node.neighbors {
        if neighbor.vec.dims() != layout.dims() {
            return Err(AnnexError::DimensionMismatch {
                left: neighbor.vec.dims(),
                right: layout.dims(),
            });
        }
        neighbor.vec.write_blob(&mut w);
    }

    w.seek(layout.neighbor_meta_start());
    for neighbor in &node.neighbors {
        w.u64(neighbor.id);
        w.u64(neighbor.offset);
    }
    Ok(buf)
}

/// Deserialize and validate one block.
///
/// `file_size` bounds the neighbor offsets: every edge must point at a
/// block start in `[B, file_size)`.
pub fn decode_block(bytes: &[u8], layout: &BlockLayout, file_size: u64) -> Result<Node> {
    let block_size = layout.block_size() as u64;
    if bytes.len() != layout.block_size() {
        return Err(AnnexError::Corrupt(format!(
            "block is {} bytes, expected {}",
            bytes.len(),
            layout.block_size()
        )));
    }

    let mut r = Reader::new(bytes);
    let vec = Vector::read_blob(&mut r, layout.dims())
        .ok_or_else(|| AnnexError::Corrupt("owner vector malformed".to_string()))?;
    let id = r
        .u64()
        .ok_or_else(|| AnnexError::Corrupt("owner id truncated".to_string()))?;
    let count = r
        .u16()
        .ok_or_else(|| AnnexError::Corrupt("neighbor count truncated".to_string()))?
        as usize;
    if count > layout.max_neighbors() {
        return Err(AnnexError::Corrupt(format!(
            "neighbor count {} exceeds block capacity {}",
            count,
            layout.max_neighbors()
        )));
    }

    let mut vectors = Vec::with_capacity(count);
    for i in 0..count {
        let v = Vector::read_blob(&mut r, layout.dims()).ok_or_else(|| {
            AnnexError::Corrupt(format!("neighbor vector {} malformed", i))
        })?;
        vectors.push(v);
    }
    r.skip((layout.max_neighbors() - count) * layout.vector_blob_size())
        .ok_or_else(|| AnnexError::Corrupt("neighbor slots truncated".to_string()))?;
    debug_assert_eq!(r.position(), layout.neighbor_meta_start());

    let mut neighbors = NeighborList::with_capacity(count);
    for (i, vec) in vectors.into_iter().enumerate() {
        let neighbor_id = r
            .u64()
            .ok_or_else(|| AnnexError::Corrupt("neighbor metadata truncated".to_string()))?;
        let offset = r
            .u64()
            .ok_or_else(|| AnnexError::Corrupt("neighbor metadata truncated".to_string()))?;
        if neighbor_id == 0 {
            return Err(AnnexError::Corrupt(format!("neighbor {} has zero id", i)));
        }
        if neighbor_id == id {
            return Err(AnnexError::Corrupt(format!(
                "node {} has a self-loop",
                id
            )));
        }
        if offset < block_size || offset >= file_size || offset % block_size != 0 {
            return Err(AnnexError::Corrupt(format!(
                "neighbor offset {} out of range (file size {})",
                offset, file_size
            )));
        }
        if neighbors.iter().any(|n: &Neighbor| n.id == neighbor_id) {
            return Err(AnnexError::Corrupt(format!(
                "node {} lists neighbor {} twice",
                id, neighbor_id
            )));
        }
        neighbors.push(Neighbor {
            id: neighbor_id,
            offset,
            vec,
        });
    }

    Ok(Node { id, vec, neighbors })
}
