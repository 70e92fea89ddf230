pub mod catalog;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod pipeline;
pub mod reduce;
pub mod table;
pub mod viewer;

// Re-export commonly used types
pub use catalog::{build_catalog, validate_catalog, CatalogEntry, Rejection};
pub use config::{AtlasConfig, Components, ReductionMode};
pub use error::{AtlasError, Result};
pub use table::{assemble, EmbeddingRow, EmbeddingTable};
pub use viewer::{SelectionEvent, SelectionState, ViewerSession};
