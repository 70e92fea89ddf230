//! Chunked PCA: fit from successive chunks, then project in a second pass.
//!
//! Each partial fit folds a chunk into the running mean and a rank-k
//! summary (`singular values × components`) of everything seen so far. The
//! leading axes of the stacked summary come from the same block power
//! iteration batch mode uses, so working memory stays at
//! `(k + chunk + 1) × D` and no eigenproblem grows with the chunk size.

use super::linalg::{flip_signs, leading_axes};
use super::{check_fittable, chunk_ranges, leading_rows, Projection, Reducer};
use crate::config::{Components, ReductionMode};
use crate::error::{AtlasError, Result};
use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use tracing::debug;

/// Singular values below this fraction of the largest are treated as zero.
const SINGULAR_TOLERANCE: f64 = 1e-12;

pub struct IncrementalPca {
    components: Components,
    chunk_size: usize,
}

impl IncrementalPca {
    /// `chunk_size` must hold at least as many rows as there are components.
    pub fn new(components: Components, chunk_size: usize) -> Result<Self> {
        if chunk_size < components.count() {
            return Err(AtlasError::Configuration(format!(
                "chunk_size must be at least n_components ({}), got {}",
                components.count(),
                chunk_size
            )));
        }
        Ok(Self {
            components,
            chunk_size,
        })
    }
}

/// Running state between partial fits.
struct PartialFit {
    k: usize,
    n_seen: usize,
    mean: Array1<f64>,
    components: Array2<f64>,
    singular_values: Array1<f64>,
}

impl PartialFit {
    fn new(k: usize, width: usize) -> Self {
        Self {
            k,
            n_seen: 0,
            mean: Array1::zeros(width),
            components: Array2::zeros((0, width)),
            singular_values: Array1::zeros(0),
        }
    }

    fn update(&mut self, chunk: ArrayView2<'_, f32>) -> Result<()> {
        let m = chunk.nrows();
        let x = chunk.mapv(f64::from);
        let chunk_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));

        let n_total = self.n_seen + m;
        let centered = &x - &chunk_mean;

        let stacked = if self.n_seen == 0 {
            centered
        } else {
            // Mean shift correction keeps the combined scatter exact
            let weight = ((self.n_seen * m) as f64 / n_total as f64).sqrt();
            let shift = ((&self.mean - &chunk_mean) * weight).insert_axis(Axis(0));
            let summary = &self.components * &self.singular_values.view().insert_axis(Axis(1));
            concatenate(Axis(0), &[summary.view(), centered.view(), shift.view()])
                .map_err(|e| AtlasError::Reduction(format!("partial fit stacking failed: {}", e)))?
        };

        self.mean = (&self.mean * self.n_seen as f64 + &chunk_mean * m as f64) / n_total as f64;
        self.n_seen = n_total;

        let (values, mut axes) = leading_axes(&stacked, self.k);
        let largest = values.get(0).copied().unwrap_or(0.0).max(0.0).sqrt();

        let mut singular = Array1::zeros(axes.nrows());
        for (i, mut axis) in axes.rows_mut().into_iter().enumerate() {
            let sigma = values[i].max(0.0).sqrt();
            if sigma > SINGULAR_TOLERANCE * largest && sigma > 0.0 {
                singular[i] = sigma;
            } else {
                axis.fill(0.0);
            }
        }

        flip_signs(&mut axes);
        self.components = axes;
        self.singular_values = singular;
        Ok(())
    }

    fn finish(self) -> Projection {
        let denom = (self.n_seen.max(2) - 1) as f64;
        let k = self.components.nrows().min(self.k);
        Projection {
            mean: self.mean,
            components: leading_rows(&self.components, k),
            explained_variance: self.singular_values.slice(s![..k]).mapv(|s| s * s / denom),
        }
    }
}

impl Reducer for IncrementalPca {
    fn mode(&self) -> ReductionMode {
        ReductionMode::Incremental
    }

    fn components(&self) -> Components {
        self.components
    }

    fn fit(&self, features: ArrayView2<'_, f32>) -> Result<Projection> {
        let k = self.components.count();
        check_fittable(features, k)?;

        let ranges = chunk_ranges(features.nrows(), self.chunk_size, k);
        let mut state = PartialFit::new(k, features.ncols());
        for (i, &(start, end)) in ranges.iter().enumerate() {
            state.update(features.slice(s![start..end, ..]))?;
            debug!("Partial fit {}/{} ({} rows)", i + 1, ranges.len(), end - start);
        }

        Ok(state.finish())
    }

    /// Second pass: project chunk by chunk after the fit has seen every row.
    fn project(&self, projection: &Projection, features: ArrayView2<'_, f32>) -> Result<Array2<f64>> {
        let k = projection.n_components();
        let mut coordinates = Array2::zeros((features.nrows(), k));
        for (start, end) in chunk_ranges(features.nrows(), self.chunk_size, 1) {
            let projected = projection.transform(features.slice(s![start..end, ..]))?;
            coordinates.slice_mut(s![start..end, ..]).assign(&projected);
        }
        Ok(coordinates)
    }
}

#[cfg(test)]
mod tests {
    use super::super::BatchPca;
    use super::*;
    use approx::assert_relative_eq;

    /// Deterministic pseudo-random cloud with one dominant direction.
    fn cloud(n: usize, d: usize) -> Array2<f32> {
        let mut rng = fastrand::Rng::with_seed(7);
        Array2::from_shape_fn((n, d), |(i, j)| {
            let t = i as f32 / n as f32 - 0.5;
            let dominant = if j % 2 == 0 { 10.0 * t } else { -5.0 * t };
            dominant + rng.f32() - 0.5
        })
    }

    /// Points on a 2-D plane inside `d` dimensions.
    fn plane(n: usize, d: usize) -> Array2<f32> {
        let mut rng = fastrand::Rng::with_seed(11);
        let coeffs: Vec<(f32, f32)> = (0..n)
            .map(|_| (rng.f32() * 8.0 - 4.0, rng.f32() * 2.0 - 1.0))
            .collect();
        Array2::from_shape_fn((n, d), |(i, j)| {
            let (a, b) = coeffs[i];
            let u = if j % 2 == 0 { 1.0 } else { -1.0 };
            let v = j as f32 * 0.25;
            1.0 + a * u + b * v
        })
    }

    #[test]
    fn test_chunk_size_below_components_rejected() {
        assert!(IncrementalPca::new(Components::Three, 2).is_err());
        assert!(IncrementalPca::new(Components::Two, 2).is_ok());
    }

    #[test]
    fn test_matches_batch_on_low_rank_data() {
        // Rank 2 data: truncating to two axes loses nothing, so the
        // incremental fit is exact
        let data = plane(60, 6);

        let batch = BatchPca::new(Components::Two).fit(data.view()).unwrap();
        let incremental = IncrementalPca::new(Components::Two, 7)
            .unwrap()
            .fit(data.view())
            .unwrap();

        for j in 0..6 {
            assert_relative_eq!(incremental.mean[j], batch.mean[j], epsilon = 1e-9);
        }

        let alignment = incremental
            .components
            .row(0)
            .dot(&batch.components.row(0))
            .abs();
        assert_relative_eq!(alignment, 1.0, epsilon = 1e-6);
        assert_relative_eq!(
            incremental.explained_variance[0],
            batch.explained_variance[0],
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_large_chunks_match_batch() {
        // Chunks far wider than the component count
        let data = plane(700, 12);

        let batch = BatchPca::new(Components::Two).fit(data.view()).unwrap();
        let incremental = IncrementalPca::new(Components::Two, 300)
            .unwrap()
            .fit(data.view())
            .unwrap();

        for i in 0..2 {
            let alignment = incremental
                .components
                .row(i)
                .dot(&batch.components.row(i))
                .abs();
            assert_relative_eq!(alignment, 1.0, epsilon = 1e-6);
            assert_relative_eq!(
                incremental.explained_variance[i],
                batch.explained_variance[i],
                max_relative = 1e-6
            );
        }
    }

    #[test]
    fn test_single_chunk_equals_full_fit() {
        let data = cloud(12, 5);
        let projection = IncrementalPca::new(Components::Three, 64)
            .unwrap()
            .fit(data.view())
            .unwrap();
        assert_eq!(projection.n_components(), 3);
        let gram = projection.components.dot(&projection.components.t());
        for i in 0..3 {
            assert_relative_eq!(gram[[i, i]], 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_output_rows_follow_input_rows() {
        let data = cloud(25, 4);
        let reducer = IncrementalPca::new(Components::Two, 4).unwrap();
        let coords = reducer.fit_transform(data.view()).unwrap();
        assert_eq!(coords.dim(), (25, 2));

        // Chunked projection equals projecting everything at once
        let projection = reducer.fit(data.view()).unwrap();
        let whole = projection.transform(data.view()).unwrap();
        for i in 0..25 {
            for c in 0..2 {
                assert_relative_eq!(coords[[i, c]], whole[[i, c]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_repeat_runs_identical() {
        let data = cloud(30, 5);
        let reducer = IncrementalPca::new(Components::Three, 8).unwrap();
        assert_eq!(
            reducer.fit_transform(data.view()).unwrap(),
            reducer.fit_transform(data.view()).unwrap()
        );
    }
}
