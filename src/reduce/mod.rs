//! Dimensionality reduction - Project feature vectors to 2 or 3 coordinates
//!
//! Two strategies share one contract ([`Reducer`]): rows in, one coordinate
//! row per input row out, same order.
//!
//! - [`BatchPca`] fits a single global principal-component projection over
//!   every vector at once.
//! - [`IncrementalPca`] fits the same kind of projection from successive
//!   chunks (bounded working memory), then runs a separate projection pass.
//!
//! Coordinates are reproducible within a mode for fixed input and component
//! count. The two modes are not expected to agree with each other.

mod incremental;
mod linalg;
mod pca;

pub use incremental::IncrementalPca;
pub use pca::BatchPca;

use crate::config::{Components, ReductionMode};
use crate::error::{AtlasError, Result};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use std::time::{Duration, Instant};
use tracing::info;

/// A fitted linear projection: `(x - mean) · componentsᵀ`.
#[derive(Debug, Clone)]
pub struct Projection {
    pub mean: Array1<f64>,
    /// One principal axis per row, strongest first.
    pub components: Array2<f64>,
    /// Variance captured by each axis.
    pub explained_variance: Array1<f64>,
}

impl Projection {
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Project rows through the fitted axes.
    pub fn transform(&self, rows: ArrayView2<'_, f32>) -> Result<Array2<f64>> {
        if rows.ncols() != self.mean.len() {
            return Err(AtlasError::Reduction(format!(
                "projection fitted on {} features cannot transform rows of {}",
                self.mean.len(),
                rows.ncols()
            )));
        }
        let centered = &rows.mapv(f64::from) - &self.mean;
        Ok(centered.dot(&self.components.t()))
    }

    /// Share of total variance carried by each kept axis, when the total is
    /// known.
    pub fn explained_variance_ratio(&self, total_variance: f64) -> Array1<f64> {
        if total_variance > 0.0 {
            &self.explained_variance / total_variance
        } else {
            Array1::zeros(self.explained_variance.len())
        }
    }
}

/// Interface shared by both reduction strategies.
pub trait Reducer {
    fn mode(&self) -> ReductionMode;

    fn components(&self) -> Components;

    /// Fit the projection over every row.
    fn fit(&self, features: ArrayView2<'_, f32>) -> Result<Projection>;

    /// Project rows through a fitted projection.
    fn project(&self, projection: &Projection, features: ArrayView2<'_, f32>) -> Result<Array2<f64>> {
        projection.transform(features)
    }

    /// Fit, then project every row.
    fn fit_transform(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f64>> {
        let projection = self.fit(features)?;
        self.project(&projection, features)
    }
}

/// Coordinates for every input row plus the time spent fitting.
#[derive(Debug, Clone)]
pub struct Reduction {
    pub coordinates: Array2<f64>,
    /// Share of the total feature variance carried by each axis.
    pub explained_variance_ratio: Array1<f64>,
    pub elapsed: Duration,
}

/// Build the strategy for `mode`.
pub fn reducer_for(
    components: Components,
    mode: ReductionMode,
    chunk_size: usize,
) -> Result<Box<dyn Reducer>> {
    match mode {
        ReductionMode::Batch => Ok(Box::new(BatchPca::new(components))),
        ReductionMode::Incremental => Ok(Box::new(IncrementalPca::new(components, chunk_size)?)),
    }
}

/// Project `features` down to `n_components` axes.
///
/// `n_components` and `chunk_size` are checked before any arithmetic runs.
pub fn reduce(
    features: ArrayView2<'_, f32>,
    n_components: usize,
    mode: ReductionMode,
    chunk_size: usize,
) -> Result<Reduction> {
    let components = Components::try_from(n_components)?;
    let reducer = reducer_for(components, mode, chunk_size)?;

    let start = Instant::now();
    let projection = reducer.fit(features)?;
    let coordinates = reducer.project(&projection, features)?;
    let elapsed = start.elapsed();

    let explained_variance_ratio = projection.explained_variance_ratio(total_variance(features));

    info!(
        "Reduced {} vectors to {} dimensions with {} PCA in {:.2?} ({:.1}% of variance kept)",
        coordinates.nrows(),
        n_components,
        reducer.mode(),
        elapsed,
        explained_variance_ratio.sum() * 100.0
    );

    Ok(Reduction {
        coordinates,
        explained_variance_ratio,
        elapsed,
    })
}

/// Sum of per-column sample variances, in two passes over the rows.
fn total_variance(features: ArrayView2<'_, f32>) -> f64 {
    let n = features.nrows();
    if n < 2 {
        return 0.0;
    }

    let mut mean = Array1::<f64>::zeros(features.ncols());
    for row in features.rows() {
        mean.zip_mut_with(&row, |m, &v| *m += f64::from(v));
    }
    mean /= n as f64;

    let mut total = 0.0;
    for row in features.rows() {
        total += row
            .iter()
            .zip(mean.iter())
            .map(|(&v, &m)| {
                let d = f64::from(v) - m;
                d * d
            })
            .sum::<f64>();
    }
    total / (n - 1) as f64
}

/// Reject inputs no k-component PCA can be fitted on.
fn check_fittable(features: ArrayView2<'_, f32>, k: usize) -> Result<()> {
    let (n, d) = features.dim();
    if n < k {
        return Err(AtlasError::Reduction(format!(
            "need at least {} vectors for {} components, got {}",
            k, k, n
        )));
    }
    if d < k {
        return Err(AtlasError::Reduction(format!(
            "vectors of length {} cannot yield {} components",
            d, k
        )));
    }
    if features.iter().any(|x| !x.is_finite()) {
        return Err(AtlasError::Reduction(
            "feature matrix contains NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}

/// Row ranges of at most `chunk_size`, a short tail merged into the previous
/// chunk so no chunk holds fewer than `min_rows` (when `n >= min_rows`).
fn chunk_ranges(n: usize, chunk_size: usize, min_rows: usize) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = (0..n)
        .step_by(chunk_size.max(1))
        .map(|start| (start, (start + chunk_size).min(n)))
        .collect();

    if ranges.len() > 1 {
        if let Some(&(start, end)) = ranges.last() {
            if end - start < min_rows {
                ranges.pop();
                if let Some(prev) = ranges.last_mut() {
                    prev.1 = end;
                }
            }
        }
    }
    ranges
}

fn column_mean(rows: &Array2<f64>) -> Array1<f64> {
    rows.mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(rows.ncols()))
}

/// Top `k` rows of a component matrix.
fn leading_rows(matrix: &Array2<f64>, k: usize) -> Array2<f64> {
    matrix.slice(s![..k, ..]).to_owned()
}
