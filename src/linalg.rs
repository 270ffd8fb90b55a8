// linalg.rs
//
// Dense decompositions for ndarray matrices. The heavy lifting is done by
// nalgebra; this module only converts views and normalises the ordering of
// the results (non-increasing values, vectors reordered to match).

use nalgebra::linalg::{SymmetricEigen, QR, SVD};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2};

use crate::error::{ProjectionError, Result};

/// Thin SVD `A = U · diag(s) · Vᵗ` with `s` sorted in non-increasing order.
#[derive(Debug, Clone)]
pub struct ThinSvd {
    pub u: Array2<f64>,
    pub singular_values: Array1<f64>,
    pub vt: Array2<f64>,
}

pub(crate) fn to_dmatrix(a: ArrayView2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

pub(crate) fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn descending_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Eigendecomposition of a symmetric matrix.
///
/// Returns eigenvalues sorted in non-increasing order and the matching
/// eigenvectors as columns.
pub fn symmetric_eigen(a: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    if a.nrows() != a.ncols() {
        return Err(ProjectionError::DimensionMismatch {
            context: "symmetric eigendecomposition (square input)",
            expected: a.nrows(),
            found: a.ncols(),
        });
    }
    let eigen = SymmetricEigen::try_new(to_dmatrix(a), f64::EPSILON, 0).ok_or_else(|| {
        ProjectionError::Linalg(format!(
            "symmetric eigendecomposition of a {}x{} matrix did not converge",
            a.nrows(),
            a.ncols()
        ))
    })?;

    let raw_values: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
    let order = descending_order(&raw_values);
    let n = a.nrows();
    let values = Array1::from_iter(order.iter().map(|&i| raw_values[i]));
    let vectors = Array2::from_shape_fn((n, n), |(row, col)| eigen.eigenvectors[(row, order[col])]);
    Ok((values, vectors))
}

/// Thin singular value decomposition.
pub fn thin_svd(a: ArrayView2<f64>) -> Result<ThinSvd> {
    let (rows, cols) = a.dim();
    let svd = SVD::try_new(to_dmatrix(a), true, true, f64::EPSILON, 0).ok_or_else(|| {
        ProjectionError::Linalg(format!("SVD of a {}x{} matrix did not converge", rows, cols))
    })?;
    let (u, vt) = match (svd.u.as_ref(), svd.v_t.as_ref()) {
        (Some(u), Some(vt)) => (u, vt),
        _ => {
            return Err(ProjectionError::Linalg(
                "SVD did not return singular vectors".to_string(),
            ))
        }
    };

    let raw_values: Vec<f64> = svd.singular_values.iter().copied().collect();
    let order = descending_order(&raw_values);
    let rank = raw_values.len();
    Ok(ThinSvd {
        u: Array2::from_shape_fn((rows, rank), |(i, j)| u[(i, order[j])]),
        singular_values: Array1::from_iter(order.iter().map(|&i| raw_values[i])),
        vt: Array2::from_shape_fn((rank, cols), |(i, j)| vt[(order[i], j)]),
    })
}

/// Orthonormal basis (thin Q factor) for the column space of `a`.
pub fn orthonormal_columns(a: ArrayView2<f64>) -> Array2<f64> {
    let q = QR::new(to_dmatrix(a)).q();
    from_dmatrix(&q)
}
