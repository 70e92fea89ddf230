//! Error taxonomy for the embedding pipeline and the viewer.
//!
//! Pipeline stages return [`AtlasError`]; the binary wraps them in `anyhow`
//! for reporting. Corrupt images are deliberately absent here: they are
//! [`crate::catalog::Rejection`] records, not errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AtlasError {
    /// Root directory missing or unreadable.
    #[error("cannot read image root {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An image that passed validation failed to decode during extraction.
    #[error("failed to decode {path} during extraction (catalog out of sync with validation): {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("schema error: {0}")]
    Schema(String),

    /// The vectors cannot support the requested projection.
    #[error("reduction failed: {0}")]
    Reduction(String),

    #[error("embedding model failed: {0}")]
    Embedding(String),

    /// Navigation or selection event that cannot apply to the current state.
    #[error("selection event out of range: {0}")]
    SelectionOutOfRange(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, AtlasError>;

impl AtlasError {
    /// Wrap a model-boundary failure, keeping the whole context chain.
    pub fn embedding(err: anyhow::Error) -> Self {
        AtlasError::Embedding(format!("{:#}", err))
    }
}
