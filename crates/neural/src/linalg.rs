//! Small dense linear algebra for symmetric positive-definite matrices.

use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Lower-triangular Cholesky factor `L` with `A = L Lᵀ`. Only the lower
/// triangle of `a` is read. Returns `None` if `a` is not square or not
/// positive definite.
pub fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return None;
    }
    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= l[[j, k]] * l[[j, k]];
        }
        if !diag.is_finite() || diag <= 0.0 {
            return None;
        }
        let pivot = diag.sqrt();
        l[[j, j]] = pivot;
        for i in (j + 1)..n {
            let mut value = a[[i, j]];
            for k in 0..j {
                value -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = value / pivot;
        }
    }
    Some(l)
}

/// Inverse of a lower-triangular matrix by forward substitution.
fn lower_triangular_inverse(l: &Array2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut inv = Array2::<f64>::zeros((n, n));
    for col in 0..n {
        for i in col..n {
            let mut value = if i == col { 1.0 } else { 0.0 };
            for k in col..i {
                value -= l[[i, k]] * inv[[k, col]];
            }
            inv[[i, col]] = value / l[[i, i]];
        }
    }
    inv
}

/// Inverse of a symmetric positive-definite matrix via its Cholesky factor.
pub fn spd_inverse(a: &Array2<f64>) -> Option<Array2<f64>> {
    let l = cholesky(a)?;
    let l_inv = lower_triangular_inverse(&l);
    Some(l_inv.t().dot(&l_inv))
}

/// One draw from `N(mean, cov)`. Returns `None` when `cov` is not positive
/// definite.
pub fn sample_multivariate_normal<R: Rng + ?Sized>(
    rng: &mut R,
    mean: &Array1<f64>,
    cov: &Array2<f64>,
) -> Option<Array1<f64>> {
    let l = cholesky(cov)?;
    let z: Array1<f64> = Array1::from_shape_fn(mean.len(), |_| StandardNormal.sample(rng));
    Some(mean + &l.dot(&z))
}
