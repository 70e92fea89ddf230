//! Batched feature extraction over a validated catalog

use super::ImageEmbedder;
use crate::catalog::{open_image, CatalogEntry};
use crate::error::{AtlasError, Result};
use image::DynamicImage;
use ndarray::Array2;
use rayon::prelude::*;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Feature vectors for a catalog, row `i` belonging to entry `i`.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub features: Array2<f32>,
    pub elapsed: Duration,
}

/// Embed every entry, `batch_size` images at a time.
///
/// Images are decoded just before their batch is embedded, so at most one
/// batch of pixels is resident. A decode failure here is fatal: validation
/// already passed these files, and skipping one would shift every later row.
pub fn extract_features(
    entries: &[CatalogEntry],
    embedder: &mut dyn ImageEmbedder,
    batch_size: usize,
) -> Result<Extraction> {
    if batch_size == 0 {
        return Err(AtlasError::Configuration(
            "batch_size must be at least 1".to_string(),
        ));
    }

    let start = Instant::now();
    let total_batches = entries.len().div_ceil(batch_size);

    let mut flat: Vec<f32> = Vec::new();
    let mut dimension: Option<usize> = None;

    for (batch_index, batch) in entries.chunks(batch_size).enumerate() {
        let images = decode_batch(batch)?;

        let vectors = embedder
            .embed_batch(&images)
            .map_err(AtlasError::embedding)?;

        if vectors.len() != batch.len() {
            return Err(AtlasError::Embedding(format!(
                "{} returned {} vectors for a batch of {} images",
                embedder.model_name(),
                vectors.len(),
                batch.len()
            )));
        }

        for (entry, vector) in batch.iter().zip(&vectors) {
            let expected = *dimension.get_or_insert(vector.len());
            if vector.len() != expected || expected == 0 {
                return Err(AtlasError::Embedding(format!(
                    "vector for {} has length {}, expected {}",
                    entry.path.display(),
                    vector.len(),
                    expected
                )));
            }
        }

        if flat.is_empty() {
            let dim = dimension.unwrap_or(0);
            flat.reserve_exact(entries.len() * dim);
        }
        flat.extend(vectors.into_iter().flatten());

        debug!(
            "Embedded batch {}/{} ({} images)",
            batch_index + 1,
            total_batches,
            batch.len()
        );
    }

    let dim = dimension.unwrap_or(0);
    let features = Array2::from_shape_vec((entries.len(), dim), flat)
        .map_err(|e| AtlasError::Embedding(format!("feature matrix assembly failed: {}", e)))?;

    let elapsed = start.elapsed();
    info!(
        "Generated {} embeddings of length {} in {:.2?}",
        features.nrows(),
        dim,
        elapsed
    );

    Ok(Extraction { features, elapsed })
}

/// Decode a batch to RGB in parallel, keeping batch order.
fn decode_batch(batch: &[CatalogEntry]) -> Result<Vec<DynamicImage>> {
    batch
        .par_iter()
        .map(|entry| {
            open_image(&entry.path)
                .map(|img| DynamicImage::ImageRgb8(img.to_rgb8()))
                .map_err(|source| AtlasError::Decode {
                    path: entry.path.clone(),
                    source,
                })
        })
        .collect()
}
