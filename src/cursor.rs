//! Host-facing index cursor.
//!
//! The embedding database drives the index through this surface: declare
//! an index (`create`), open its backing file next to the database file
//! (`open`), feed it `(vector blob, rowid)` rows (`insert`), run k-NN
//! queries (`search`), and release it (`close`).
//!
//! One file is owned by at most one cursor at a time; the host
//! serializes writers externally. A `Corrupt` error poisons the cursor:
//! every later operation returns the same error without touching the
//! file again.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::{BlockLayout, DEFAULT_BLOCK_SIZE};
use crate::disk_io::{IndexFile, Vfs};
use crate::error::{AnnexError, Result};
use crate::insert::{self, IndexParams, InsertOutcome};
use crate::search;
use crate::vector::{Vector, VectorType, MAX_VECTOR_DIMS};

/// Declaration of one vector index, as recorded by the host catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Index name; part of the backing file name.
    pub name: String,
    /// Vector dimension, pinned at creation.
    pub dims: usize,
    #[serde(default = "default_vector_type")]
    pub vector_type: VectorType,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default)]
    pub params: IndexParams,
}

fn default_vector_type() -> VectorType {
    VectorType::F32
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>, dims: usize) -> IndexDescriptor {
        IndexDescriptor {
            name: name.into(),
            dims,
            vector_type: VectorType::F32,
            block_size: DEFAULT_BLOCK_SIZE,
            params: IndexParams::default(),
        }
    }

    /// Validate the declaration without touching disk.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AnnexError::InvalidParameter(
                "index name is empty".to_string(),
            ));
        }
        if self.dims == 0 || self.dims > MAX_VECTOR_DIMS {
            return Err(AnnexError::InvalidParameter(format!(
                "dimension {} out of range 1..={}",
                self.dims, MAX_VECTOR_DIMS
            )));
        }
        if self.block_size == 0
            || self.block_size % 512 != 0
            || self.block_size >> 9 > u16::MAX as usize
        {
            return Err(AnnexError::InvalidParameter(format!(
                "block size {} is not a positive multiple of 512 below 32 MiB",
                self.block_size
            )));
        }
        // The block must hold the owner fields and one neighbor slot.
        BlockLayout::new(self.block_size, self.vector_type, self.dims)?;
        self.params.validate()
    }
}

/// Backing file path for an index: `"{db_path}-vectoridx-{index_name}"`.
pub fn index_file_path(db_path: &str, index_name: &str) -> PathBuf {
    PathBuf::from(format!("{}-vectoridx-{}", db_path, index_name))
}

/// An open index, bound to one backing file.
pub struct IndexCursor {
    file: IndexFile,
    params: IndexParams,
    poisoned: Option<String>,
}

impl IndexCursor {
    /// Acknowledge an index declaration.
    ///
    /// Validation only: the backing file is created lazily by the first
    /// [`IndexCursor::open`].
    pub fn create(descriptor: &IndexDescriptor) -> Result<()> {
        descriptor.validate()?;
        debug!(name = %descriptor.name, dims = descriptor.dims, "index declared");
        Ok(())
    }

    /// Open (or initialize) the index file for `descriptor` next to the
    /// database file at `db_path`.
    pub fn open(vfs: &dyn Vfs, db_path: &str, descriptor: &IndexDescriptor) -> Result<IndexCursor> {
        descriptor.validate()?;
        let path = index_file_path(db_path, &descriptor.name);
        let file = IndexFile::open(
            vfs,
            &path,
            descriptor.block_size,
            descriptor.vector_type,
            descriptor.dims,
        )?;
        Ok(IndexCursor {
            file,
            params: descriptor.params.clone(),
            poisoned: None,
        })
    }

    /// Insert one row: a vector blob (wire form) keyed by its rowid.
    pub fn insert(&mut self, vector_blob: &[u8], rowid: u64) -> Result<InsertOutcome> {
        self.check_poisoned()?;
        if rowid == 0 {
            return Err(AnnexError::InvalidParameter(
                "rowid 0 is reserved".to_string(),
            ));
        }
        let vec = Vector::parse_blob(vector_blob)?;
        let result = insert::insert(&mut self.file, &self.params, rowid, vec);
        self.poison_on_corrupt(result)
    }

    /// k-nearest-neighbor query: `(rowid, distance)` pairs, best first.
    pub fn search(&mut self, query: &Vector, k: usize) -> Result<Vec<(u64, f64)>> {
        self.check_poisoned()?;
        if query.dims() != self.file.layout().dims() {
            return Err(AnnexError::DimensionMismatch {
                left: query.dims(),
                right: self.file.layout().dims(),
            });
        }
        let result = search::knn(&mut self.file, query, k, self.params.search_list);
        self.poison_on_corrupt(result)
    }

    /// Number of indexed rows.
    pub fn len(&self) -> u64 {
        self.file.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the backing file and release the cursor.
    pub fn close(self) -> Result<()> {
        self.file.close()
    }

    fn check_poisoned(&self) -> Result<()> {
        match &self.poisoned {
            Some(msg) => Err(AnnexError::Corrupt(msg.clone())),
            None => Ok(()),
        }
    }

    fn poison_on_corrupt<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(AnnexError::Corrupt(msg)) = &result {
            self.poisoned = Some(msg.clone());
        }
        result
    }
}
