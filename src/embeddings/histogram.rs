//! Colour histogram embedder
//!
//! A weight-free descriptor: per-channel intensity histograms, each
//! normalized to sum to one. Useful for quick looks at a dataset and for
//! exercising the pipeline without a model export.

use super::ImageEmbedder;
use anyhow::{bail, Result};
use image::DynamicImage;
use rayon::prelude::*;

pub struct HistogramEmbedder {
    bins: usize,
    model_name: String,
}

impl HistogramEmbedder {
    pub fn new(bins: usize) -> Self {
        Self {
            bins,
            model_name: format!("rgb-histogram-{}", bins),
        }
    }

    /// Output length: one histogram per RGB channel.
    pub fn dimension(&self) -> usize {
        3 * self.bins
    }

    fn embed_one(&self, image: &DynamicImage) -> Vec<f32> {
        let rgb = image.to_rgb8();
        let mut hist = vec![0.0f32; self.dimension()];

        for pixel in rgb.pixels() {
            for c in 0..3 {
                let bin = pixel[c] as usize * self.bins / 256;
                hist[c * self.bins + bin] += 1.0;
            }
        }

        let total = (rgb.width() as f32) * (rgb.height() as f32);
        if total > 0.0 {
            hist.iter_mut().for_each(|v| *v /= total);
        }
        hist
    }
}

impl ImageEmbedder for HistogramEmbedder {
    fn embed_batch(&mut self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>> {
        if self.bins == 0 {
            bail!("Histogram embedder needs at least one bin");
        }
        let this = &*self;
        Ok(images.par_iter().map(|img| this.embed_one(img)).collect())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_solid_colour_hits_one_bin_per_channel() {
        let mut embedder = HistogramEmbedder::new(4);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 3, Rgb([255, 0, 100])));

        let vectors = embedder.embed_batch(&[img]).unwrap();
        assert_eq!(vectors.len(), 1);

        let v = &vectors[0];
        assert_eq!(v.len(), 12);
        assert_relative_eq!(v[3], 1.0); // R in top bin
        assert_relative_eq!(v[4], 1.0); // G in bottom bin
        assert_relative_eq!(v[8 + 1], 1.0); // B=100 -> bin 1
        assert_relative_eq!(v.iter().sum::<f32>(), 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_batch_order_preserved() {
        let mut embedder = HistogramEmbedder::new(2);
        let dark = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([0, 0, 0])));
        let light = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 255, 255])));

        let vectors = embedder
            .embed_batch(&[dark.clone(), light, dark])
            .unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        assert_eq!(vectors[2], vectors[0]);
    }
}
