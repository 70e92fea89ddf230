//! End-to-end batch run: catalog, validate, extract, reduce, assemble.
//!
//! Each hand-off checks that row counts still line up, since the stages are
//! joined by position only.

use crate::catalog::{build_catalog, validate_catalog, Rejection};
use crate::config::AtlasConfig;
use crate::embeddings::{extract_features, ImageEmbedder};
use crate::error::{AtlasError, Result};
use crate::reduce::reduce;
use crate::table::{assemble, EmbeddingTable};
use std::time::Duration;
use tracing::info;

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    pub table: EmbeddingTable,
    /// Entries found before validation.
    pub discovered: usize,
    pub rejected: Vec<Rejection>,
    pub feature_length: usize,
    /// Share of feature variance kept by each output axis.
    pub explained_variance_ratio: Vec<f64>,
    pub extraction_time: Duration,
    pub reduction_time: Duration,
}

/// Run every stage with an already-loaded embedder.
pub fn run(config: &AtlasConfig, embedder: &mut dyn ImageEmbedder) -> Result<PipelineReport> {
    config.validate()?;

    let root = config.root_dir();
    let entries = build_catalog(&root, config.dataset.max_images)?;
    let discovered = entries.len();
    info!("Discovered {} images under {}", discovered, root.display());

    let (entries, rejected) = validate_catalog(entries);
    if !rejected.is_empty() {
        info!("Dropped {} unreadable images", rejected.len());
    }

    let extraction = extract_features(&entries, embedder, config.pipeline.batch_size)?;
    ensure_aligned("feature rows", extraction.features.nrows(), entries.len())?;

    let reduction = reduce(
        extraction.features.view(),
        config.reduction.n_components,
        config.reduction.mode,
        config.reduction.chunk_size,
    )?;
    ensure_aligned("coordinate rows", reduction.coordinates.nrows(), entries.len())?;

    let table = assemble(reduction.coordinates.view(), &entries)?;

    Ok(PipelineReport {
        table,
        discovered,
        rejected,
        feature_length: extraction.features.ncols(),
        explained_variance_ratio: reduction.explained_variance_ratio.to_vec(),
        extraction_time: extraction.elapsed,
        reduction_time: reduction.elapsed,
    })
}

fn ensure_aligned(what: &str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(AtlasError::Schema(format!(
            "{} {} does not match {} catalog entries",
            what, got, expected
        )));
    }
    Ok(())
}
