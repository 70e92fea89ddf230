//! Single-shot PCA over the whole feature matrix.
//!
//! Image embeddings are wide (a flattened ViT hidden state is ~150k values),
//! so the covariance matrix is never formed. The leading axes come from
//! block power iteration on the centered data followed by a Rayleigh-Ritz
//! step, which only needs `N·D·p` work per iteration.

use super::linalg::{flip_signs, leading_axes};
use super::{check_fittable, column_mean, Projection, Reducer};
use crate::config::{Components, ReductionMode};
use crate::error::Result;
use ndarray::ArrayView2;

pub struct BatchPca {
    components: Components,
}

impl BatchPca {
    pub fn new(components: Components) -> Self {
        Self { components }
    }
}

impl Reducer for BatchPca {
    fn mode(&self) -> ReductionMode {
        ReductionMode::Batch
    }

    fn components(&self) -> Components {
        self.components
    }

    fn fit(&self, features: ArrayView2<'_, f32>) -> Result<Projection> {
        let k = self.components.count();
        check_fittable(features, k)?;

        let n = features.nrows();
        let x = features.mapv(f64::from);
        let mean = column_mean(&x);
        let centered = &x - &mean;
        drop(x);

        let (values, mut components) = leading_axes(&centered, k);
        flip_signs(&mut components);

        let denom = (n.max(2) - 1) as f64;
        let explained_variance = values.mapv(|v| v.max(0.0) / denom);

        Ok(Projection {
            mean,
            components,
            explained_variance,
        })
    }
}
