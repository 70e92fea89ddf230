//! Small dense linear algebra helpers for PCA.
//!
//! Everything here works on `f64` and is deterministic: the only random
//! numbers come from a fixed seed, and summation order never depends on
//! threads.

use ndarray::{s, Array1, Array2, ArrayViewMut1, Axis};
use tracing::debug;

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOLERANCE: f64 = 1e-14;

/// Columns whose norm drops below this after orthogonalization are zeroed.
const RANK_TOLERANCE: f64 = 1e-10;

/// Extra search directions beyond the requested axes.
const OVERSAMPLE: usize = 8;
const MAX_ITERATIONS: usize = 200;
const CONVERGENCE_TOLERANCE: f64 = 1e-12;
/// Fixed seed for the starting block. Same input, same axes.
const SEED: u64 = 0x5eed_a71a5;

/// Leading `k` right singular directions of `x` (rows are samples).
///
/// Block power iteration on `x` followed by a Rayleigh-Ritz step, so the
/// only eigenproblems solved are `p × p` with `p = k + OVERSAMPLE`. Neither
/// `xᵀx` nor `xxᵀ` is formed. Returns the top `k` eigenvalues of `xᵀx` in
/// descending order and the matching axes as rows. Requires `k <= x.ncols()`.
pub(crate) fn leading_axes(x: &Array2<f64>, k: usize) -> (Array1<f64>, Array2<f64>) {
    let d = x.ncols();
    let p = (k + OVERSAMPLE).min(d);
    let mut rng = fastrand::Rng::with_seed(SEED);
    let mut q = Array2::from_shape_fn((d, p), |_| rng.f64() * 2.0 - 1.0);
    orthonormalize_columns(&mut q);

    let mut previous: Option<Array1<f64>> = None;
    for iteration in 0..MAX_ITERATIONS {
        let b = x.dot(&q);
        let (ritz, _) = symmetric_eigen(b.t().dot(&b));
        let leading = ritz.slice(s![..k]).to_owned();

        if let Some(prev) = &previous {
            let scale = leading[0].abs().max(f64::MIN_POSITIVE);
            let change = (&leading - prev)
                .iter()
                .fold(0.0f64, |m, v| m.max(v.abs()));
            if change <= CONVERGENCE_TOLERANCE * scale {
                debug!("Power iteration converged after {} rounds", iteration);
                break;
            }
        }
        previous = Some(leading);

        q = x.t().dot(&b);
        orthonormalize_columns(&mut q);
    }

    // Rayleigh-Ritz: rotate the converged block onto the principal axes
    let b = x.dot(&q);
    let (values, w) = symmetric_eigen(b.t().dot(&b));
    let axes = q.dot(&w).reversed_axes();
    (
        values.slice(s![..k]).to_owned(),
        axes.slice(s![..k, ..]).to_owned(),
    )
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns eigenvalues in descending order and the matching eigenvectors as
/// columns.
pub(crate) fn symmetric_eigen(mut a: Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols());
    let mut v = Array2::<f64>::eye(n);

    let norm = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for _ in 0..JACOBI_MAX_SWEEPS {
            let off: f64 = (0..n)
                .flat_map(|p| (p + 1..n).map(move |q| (p, q)))
                .map(|(p, q)| a[[p, q]] * a[[p, q]])
                .sum();
            if off.sqrt() <= JACOBI_TOLERANCE * norm {
                break;
            }

            for p in 0..n {
                for q in (p + 1)..n {
                    let apq = a[[p, q]];
                    if apq == 0.0 {
                        continue;
                    }
                    let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                    let c = 1.0 / (t * t + 1.0).sqrt();
                    let s = t * c;

                    for k in 0..n {
                        let akp = a[[k, p]];
                        let akq = a[[k, q]];
                        a[[k, p]] = c * akp - s * akq;
                        a[[k, q]] = s * akp + c * akq;
                    }
                    for k in 0..n {
                        let apk = a[[p, k]];
                        let aqk = a[[q, k]];
                        a[[p, k]] = c * apk - s * aqk;
                        a[[q, k]] = s * apk + c * aqk;
                    }
                    for k in 0..n {
                        let vkp = v[[k, p]];
                        let vkq = v[[k, q]];
                        v[[k, p]] = c * vkp - s * vkq;
                        v[[k, q]] = s * vkp + c * vkq;
                    }
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    // Stable sort keeps ties in index order
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));

    let values = Array1::from_iter(order.iter().map(|&i| a[[i, i]]));
    let vectors = v.select(Axis(1), &order);
    (values, vectors)
}

/// Modified Gram-Schmidt over the columns of `q`, two passes.
///
/// Columns that are (numerically) dependent on earlier ones become zero.
pub(crate) fn orthonormalize_columns(q: &mut Array2<f64>) {
    let cols = q.ncols();
    let scale = q.iter().fold(0.0f64, |m, x| m.max(x.abs())).max(1.0);

    for j in 0..cols {
        for _pass in 0..2 {
            for i in 0..j {
                let proj = q.column(i).dot(&q.column(j));
                let prev = q.column(i).to_owned();
                q.column_mut(j).scaled_add(-proj, &prev);
            }
        }

        let norm = q.column(j).dot(&q.column(j)).sqrt();
        if norm <= RANK_TOLERANCE * scale {
            q.column_mut(j).fill(0.0);
        } else {
            q.column_mut(j).mapv_inplace(|x| x / norm);
        }
    }
}

/// Make the largest-magnitude entry of each row positive.
///
/// PCA axes are only defined up to sign; fixing it keeps output stable.
pub(crate) fn flip_signs(components: &mut Array2<f64>) {
    for row in components.rows_mut() {
        flip_vector(row);
    }
}

fn flip_vector(mut row: ArrayViewMut1<'_, f64>) {
    let mut pivot = 0.0f64;
    for &x in row.iter() {
        if x.abs() > pivot.abs() {
            pivot = x;
        }
    }
    if pivot < 0.0 {
        row.mapv_inplace(|x| -x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_eigen_diagonal() {
        let (values, vectors) = symmetric_eigen(array![[1.0, 0.0], [0.0, 3.0]]);
        assert_relative_eq!(values[0], 3.0);
        assert_relative_eq!(values[1], 1.0);
        assert_relative_eq!(vectors[[1, 0]].abs(), 1.0);
    }

    #[test]
    fn test_eigen_reconstructs_matrix() {
        let a = array![[4.0, 1.0, 2.0], [1.0, 3.0, 0.5], [2.0, 0.5, 5.0]];
        let (values, vectors) = symmetric_eigen(a.clone());

        assert!(values[0] >= values[1] && values[1] >= values[2]);

        // A v = lambda v for every pair
        for k in 0..3 {
            let v = vectors.column(k);
            let av = a.dot(&v);
            for i in 0..3 {
                assert_relative_eq!(av[i], values[k] * v[i], epsilon = 1e-9);
            }
        }

        // Eigenvectors orthonormal
        let gram = vectors.t().dot(&vectors);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(gram[[i, j]], expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_eigen_zero_matrix() {
        let (values, vectors) = symmetric_eigen(Array2::zeros((3, 3)));
        assert!(values.iter().all(|&v| v == 0.0));
        assert_eq!(vectors, Array2::<f64>::eye(3));
    }

    #[test]
    fn test_leading_axes_match_full_eigen() {
        let x = array![
            [2.0, 0.0, 1.0, 5.0, -1.0],
            [1.0, 3.0, 0.0, 4.0, 2.0],
            [0.0, 1.0, 4.0, 1.0, 0.5],
            [5.0, 2.0, 2.0, 0.0, 1.5],
            [3.0, 3.0, 3.0, 3.0, -2.0],
            [1.0, 0.0, 2.0, 2.0, 0.0]
        ];
        let (expected_values, expected_vectors) = symmetric_eigen(x.t().dot(&x));
        let (values, axes) = leading_axes(&x, 2);

        assert_eq!(axes.dim(), (2, 5));
        for i in 0..2 {
            assert_relative_eq!(values[i], expected_values[i], max_relative = 1e-10);
            let alignment = axes.row(i).dot(&expected_vectors.column(i)).abs();
            assert_relative_eq!(alignment, 1.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_leading_axes_on_wide_short_matrix() {
        // Fewer rows than search directions: rank-deficient block
        let x = array![[1.0, 2.0, 0.0, 0.0, 1.0, 0.0, 3.0, 0.0, 0.0, 1.0, 0.0, 2.0]];
        let (values, axes) = leading_axes(&x, 2);
        let norm2 = x.iter().map(|v| v * v).sum::<f64>();
        assert_relative_eq!(values[0], norm2, max_relative = 1e-10);
        assert_relative_eq!(values[1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(axes.row(0).dot(&axes.row(0)), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_orthonormalize_drops_dependent_column() {
        let mut q = array![[1.0, 2.0, 0.0], [1.0, 2.0, 1.0], [0.0, 0.0, 1.0]];
        orthonormalize_columns(&mut q);

        assert_relative_eq!(q.column(0).dot(&q.column(0)), 1.0, epsilon = 1e-12);
        assert!(q.column(1).iter().all(|&x| x == 0.0));
        assert_relative_eq!(q.column(2).dot(&q.column(2)), 1.0, epsilon = 1e-12);
        assert_relative_eq!(q.column(0).dot(&q.column(2)), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_flip_signs() {
        let mut c = array![[0.1, -0.9, 0.2], [0.5, 0.3, -0.1]];
        flip_signs(&mut c);
        assert_eq!(c.row(0).to_vec(), vec![-0.1, 0.9, -0.2]);
        assert_eq!(c.row(1).to_vec(), vec![0.5, 0.3, -0.1]);
    }
}
