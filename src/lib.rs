//! annex: a disk-native DiskANN vector index for embedding inside a
//! relational engine.
//!
//! # The Problem
//!
//! In-memory ANN indices need the whole dataset in RAM. For 1 billion
//! 768-dim vectors at float32 that's ~3TB — far beyond what an embedded
//! database can pin. annex keeps the graph on disk and touches a bounded
//! number of fixed-size blocks per operation, so memory stays
//! `O(L + visited)` regardless of index size.
//!
//! # Key Insight: One Block Per Hop
//!
//! annex follows the LM-DiskANN layout: every node block stores the
//! owner's vector **and the full vectors of its out-neighbors** next to
//! their `(id, offset)` metadata.
//!
//! ```text
//! Memory:  [query] + [candidate frontier, <= L nodes]
//!              | block read
//! Disk:    [header][node: vec + neighbor vecs + edges][node: ...]...
//! ```
//!
//! A single block read therefore both scores a candidate and expands the
//! search frontier — no second lookup to fetch neighbor vectors. The
//! price is fatter blocks (degree is capped by what fits in one block);
//! the win is one random read per visited node.
//!
//! # Why Single-Layer?
//!
//! Unlike HNSW's hierarchy, the graph is flat: Vamana's robust prune
//! (α-pruning) keeps a few long-range edges per node, which restores the
//! small-world hops that HNSW gets from its upper layers, without the
//! extra random I/O of layer jumps.
//!
//! # Parameters
//!
//! | Parameter | Typical | Effect |
//! |-----------|---------|--------|
//! | `max_degree` (R) | 16-64 | Edges per node. Higher = better recall, fewer nodes per block size |
//! | `search_list` (L) | 50-200 | Frontier cap. Higher = better recall, more block reads |
//! | `alpha` | 1.2-1.4 | Pruning aggressiveness. Higher = sparser, longer edges |
//!
//! # Usage
//!
//! ```ignore
//! use annex::{IndexCursor, IndexDescriptor, StdVfs, Vector};
//!
//! let descriptor = IndexDescriptor::new("emb_idx", 128);
//! IndexCursor::create(&descriptor)?;
//!
//! let mut cursor = IndexCursor::open(&StdVfs, "/data/main.db", &descriptor)?;
//! cursor.insert(&Vector::from_f32(embedding).to_blob(), rowid)?;
//! let hits = cursor.search(&query, 10)?; // [(rowid, distance), ...]
//! cursor.close()?;
//! ```
//!
//! SQL-facing value functions (`vector`, `vector_extract`,
//! `vector_distance_cos`) live in [`sql`]; the host registers them once
//! at startup via [`sql::scalar_functions`].
//!
//! # Concurrency
//!
//! Single-threaded and synchronous by design: one cursor owns one index
//! file, operations run to completion, and the host serializes writers
//! (e.g. under its write-transaction mutex). Durability follows the host
//! VFS's sync policy; a torn entry-offset update is repaired by a block
//! scan on the next open.
//!
//! # References
//!
//! - Jayaram Subramanya et al. (2019). "DiskANN: Fast Accurate
//!   Billion-point Nearest Neighbor Search on a Single Node." NeurIPS.
//! - Singh et al. (2021). "FreshDiskANN: A Fast and Accurate Graph-Based
//!   ANN Index for Streaming Similarity Search." arXiv.
//! - Pan et al. (2023). "LM-DiskANN: Low Memory Footprint in Disk-Native
//!   Dynamic Graph-Based ANN Indexing." IEEE BigData.

pub mod block;
pub mod codec;
pub mod cursor;
pub mod disk_io;
pub mod error;
pub mod insert;
pub mod search;
pub mod sql;
pub mod vector;

pub use cursor::{index_file_path, IndexCursor, IndexDescriptor};
pub use disk_io::{IndexFile, IndexHeader, Similarity, StdVfs, Vfs, VfsFile};
pub use error::{AnnexError, Result};
pub use insert::{IndexParams, InsertOutcome};
pub use sql::{scalar_functions, SqlValue};
pub use vector::{Vector, VectorType, MAX_VECTOR_DIMS};
