//! ONNX Runtime embedder for ViT-style vision models

use super::ImageEmbedder;
use crate::config::{ModelConfig, Pooling};
use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;
use ort::{inputs, session::Session, value::Value};
use rayon::prelude::*;
use std::path::Path;
use tracing::info;

/// Per-channel normalization used by ViT image processors.
const IMAGE_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
const IMAGE_STD: [f32; 3] = [0.5, 0.5, 0.5];

/// ONNX-based image embedding generator
pub struct OnnxImageEmbedder {
    session: Session,
    model_name: String,
    image_size: u32,
    input_name: String,
    output_name: String,
    pooling: Pooling,
}

impl OnnxImageEmbedder {
    /// Load the model once. The session is reused for every batch.
    pub fn new(model_path: &Path, config: &ModelConfig) -> Result<Self> {
        if !model_path.exists() {
            bail!(
                "ONNX model not found at: {}\n\n\
                Export one with:\n  \
                optimum-cli export onnx --model google/vit-base-patch16-224 {}",
                model_path.display(),
                model_path
                    .parent()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            );
        }

        let mut builder = Session::builder().context("Failed to create ONNX session builder")?;
        if config.num_threads > 0 {
            builder = builder
                .with_intra_threads(config.num_threads)
                .context("Failed to configure ONNX intra-op threads")?;
        }
        let session = builder
            .commit_from_file(model_path)
            .context("Failed to load ONNX model")?;

        info!("Loaded ONNX model {} from {}", config.name, model_path.display());

        Ok(Self {
            session,
            model_name: config.name.clone(),
            image_size: config.image_size,
            input_name: config.input_name.clone(),
            output_name: config.output_name.clone(),
            pooling: config.pooling,
        })
    }
}

impl ImageEmbedder for OnnxImageEmbedder {
    fn embed_batch(&mut self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let pixels = preprocess(images, self.image_size)?;

        let outputs = self
            .session
            .run(inputs![
                self.input_name.as_str() => Value::from_array(pixels)?
            ])
            .context("ONNX inference failed")?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .with_context(|| format!("Failed to extract {} tensor", self.output_name))?;

        let dims: Vec<usize> = shape.as_ref().iter().map(|&d| d as usize).collect();
        let vectors = pool(data, &dims, self.pooling)?;

        if vectors.len() != images.len() {
            bail!(
                "Model returned {} vectors for {} images",
                vectors.len(),
                images.len()
            );
        }

        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Resize, rescale and normalize a batch into an NCHW tensor.
pub(crate) fn preprocess(images: &[DynamicImage], size: u32) -> Result<Array4<f32>> {
    let side = size as usize;
    let plane = side * side;

    let per_image: Vec<Vec<f32>> = images
        .par_iter()
        .map(|img| {
            let rgb = img.resize_exact(size, size, FilterType::Triangle).to_rgb8();
            let mut chw = vec![0.0f32; 3 * plane];
            for (i, pixel) in rgb.pixels().enumerate() {
                for c in 0..3 {
                    let value = pixel[c] as f32 / 255.0;
                    chw[c * plane + i] = (value - IMAGE_MEAN[c]) / IMAGE_STD[c];
                }
            }
            chw
        })
        .collect();

    let flat: Vec<f32> = per_image.into_iter().flatten().collect();
    Array4::from_shape_vec((images.len(), 3, side, side), flat)
        .context("Failed to build pixel tensor")
}

/// Collapse model output into one vector per batch item.
///
/// Rank-2 outputs are already pooled; rank-3 outputs are
/// `[batch, tokens, hidden]` and pooled per `pooling`.
pub(crate) fn pool(data: &[f32], shape: &[usize], pooling: Pooling) -> Result<Vec<Vec<f32>>> {
    let expected: usize = shape.iter().product();
    if shape.iter().any(|&d| d == 0) || data.len() < expected {
        bail!(
            "Output tensor shape {:?} does not match {} values",
            shape,
            data.len()
        );
    }

    match *shape {
        [batch, hidden] => Ok(data[..batch * hidden]
            .chunks(hidden)
            .map(<[f32]>::to_vec)
            .collect()),
        [batch, tokens, hidden] => {
            let per_item = tokens * hidden;
            Ok(data[..batch * per_item]
                .chunks(per_item)
                .map(|item| match pooling {
                    Pooling::Flatten => item.to_vec(),
                    Pooling::Cls => item[..hidden].to_vec(),
                    Pooling::Mean => {
                        let mut mean = vec![0.0f32; hidden];
                        for token in item.chunks(hidden) {
                            for (acc, v) in mean.iter_mut().zip(token) {
                                *acc += v;
                            }
                        }
                        mean.iter_mut().for_each(|v| *v /= tokens as f32);
                        mean
                    }
                })
                .collect())
        }
        _ => bail!("Expected 2D or 3D output tensor, got shape: {:?}", shape),
    }
}
