//! Error types for annex.

use thiserror::Error;

/// Errors that can occur during vector parsing, index I/O and search.
#[derive(Debug, Error)]
pub enum AnnexError {
    /// Allocation failed while building a vector or block buffer.
    #[error("out of memory")]
    NoMemory,

    /// Malformed textual vector (missing brackets, unparseable number,
    /// too many components).
    #[error("invalid vector: {0}")]
    InvalidText(String),

    /// Blob shorter than its framing declares, or declared length above
    /// the maximum.
    #[error("invalid vector blob: {0}")]
    InvalidBlob(String),

    /// Invalid index declaration, tuning parameter, or call argument,
    /// rejected before any disk state is touched.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Two vectors of different dimension where equal dimension is
    /// required.
    #[error("vectors must have the same length: {left} != {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// On-disk state failed validation: bad magic, neighbor offset out of
    /// range, neighbor count above block capacity. Poisons the cursor.
    #[error("index corrupt: {0}")]
    Corrupt(String),

    /// The host VFS returned an error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A back-edge write failed after the new node was persisted. The
    /// index stays searchable; recall around `id` may degrade. Non-fatal.
    #[error("backlink to node {id} failed")]
    PartialBacklink { id: u64 },
}

impl AnnexError {
    /// Whether this error must poison the owning cursor.
    pub fn is_corruption(&self) -> bool {
        matches!(self, AnnexError::Corrupt(_))
    }
}

/// Result type alias for annex operations.
pub type Result<T> = std::result::Result<T, AnnexError>;
