//! Embeddings module - Turn decoded images into feature vectors
//!
//! Provides trait-based abstraction for the frozen vision model with an ONNX
//! backend and a weight-free colour histogram backend, selected via
//! configuration. The embedder is created once and reused for every batch.

mod extract;
mod histogram;
mod onnx;

pub use extract::{extract_features, Extraction};
pub use histogram::HistogramEmbedder;
pub use onnx::OnnxImageEmbedder;

use crate::config::{AtlasConfig, Backend};
use anyhow::Result;
use image::DynamicImage;

/// Trait for image embedding engines
///
/// Requires Send so a loaded model can be handed to a worker thread.
pub trait ImageEmbedder: Send {
    /// Embed a batch of RGB images, one vector per image in input order.
    ///
    /// Every vector produced by one embedder has the same length.
    fn embed_batch(&mut self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Factory function to create embedder from configuration
pub fn create_embedder(config: &AtlasConfig) -> Result<Box<dyn ImageEmbedder>> {
    match config.model.backend {
        Backend::Onnx => Ok(Box::new(OnnxImageEmbedder::new(
            &config.model_path(),
            &config.model,
        )?)),
        Backend::Histogram => Ok(Box::new(HistogramEmbedder::new(
            config.model.histogram_bins,
        ))),
    }
}
