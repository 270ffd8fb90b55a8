// online_svd.rs

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use crate::diagnostics::Diagnostics;
use crate::error::{ProjectionError, Result};
use crate::linalg::thin_svd;

/// A residual shorter than this fraction of `|b|` means the new sample lies
/// inside the current left-singular span.
const RESIDUAL_TOLERANCE: f64 = 1e-12;

/// Result of appending one column to a truncated SVD.
#[derive(Debug, Clone)]
pub struct OnlineSvdUpdate {
    /// Updated singular values, non-increasing, length `l`.
    pub singular_values: Array1<f64>,
    /// Updated right singular vectors, `(n + 1) × l`; the last row belongs to the new sample.
    pub right: Array2<f64>,
    /// True when the new sample contributed no direction outside the old span.
    pub in_span: bool,
}

/// Rank-one update of a truncated SVD `(U, diag(d), V)` with one new column `b`.
///
/// `u` is `p × k`, `d` has length `k`, `v` is `n × k` and `b` has length `p`.
/// The returned right singular vectors have `n + 1` rows and `n_out`
/// columns (`k` when `None`). Cost is `O(p·k + k³)` rather than a fresh
/// decomposition of the augmented `p × (n + 1)` matrix.
pub fn svd_online(
    u: ArrayView2<f64>,
    d: ArrayView1<f64>,
    v: ArrayView2<f64>,
    b: ArrayView1<f64>,
    n_out: Option<usize>,
    diag: &dyn Diagnostics,
) -> Result<OnlineSvdUpdate> {
    let (n, k) = v.dim();
    let p = u.nrows();
    if u.ncols() != k {
        return Err(ProjectionError::DimensionMismatch {
            context: "online SVD (columns of U vs columns of V)",
            expected: k,
            found: u.ncols(),
        });
    }
    if d.len() != k {
        return Err(ProjectionError::DimensionMismatch {
            context: "online SVD (singular values vs columns of V)",
            expected: k,
            found: d.len(),
        });
    }
    if b.len() != p {
        return Err(ProjectionError::DimensionMismatch {
            context: "online SVD (new column vs rows of U)",
            expected: p,
            found: b.len(),
        });
    }
    let l = n_out.unwrap_or(k);
    if l > k {
        return Err(ProjectionError::Config(format!(
            "online SVD cannot return {} components from a rank-{} basis",
            l, k
        )));
    }

    // Split b into its component inside span(U) and the orthogonal residual.
    let utb = u.t().dot(&b);
    let mut residual = &b - &u.dot(&utb);
    let residual_norm = residual.dot(&residual).sqrt();
    let b_norm = b.dot(&b).sqrt();
    let in_span = residual_norm <= RESIDUAL_TOLERANCE * b_norm.max(1.0);
    let tail = if in_span {
        diag.debug("Online SVD: new sample lies in the existing span; no new direction added.");
        0.0
    } else {
        residual /= residual_norm;
        residual.dot(&b)
    };

    // R = [[diag(d), Uᵗb], [0, b̃ᵗb]]
    let mut r = Array2::<f64>::zeros((k + 1, k + 1));
    for i in 0..k {
        r[[i, i]] = d[i];
        r[[i, k]] = utb[i];
    }
    r[[k, k]] = tail;
    let small = thin_svd(r.view())?;

    // [[Vᵗ, 0], [0, 1]] extends the sample axis by the new column.
    let mut v_ext = Array2::<f64>::zeros((k + 1, n + 1));
    v_ext.slice_mut(s![..k, ..n]).assign(&v.t());
    v_ext[[k, n]] = 1.0;
    let v2 = small.vt.dot(&v_ext).reversed_axes();

    Ok(OnlineSvdUpdate {
        singular_values: small.singular_values.slice(s![..l]).to_owned(),
        right: v2.slice(s![.., ..l]).to_owned(),
        in_span,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use approx::assert_abs_diff_eq;
    use ndarray::{concatenate, Axis};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use rand_distr::StandardNormal;

    fn gaussian(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.sample::<f64, _>(StandardNormal))
    }

    fn assert_columns_match_up_to_sign(a: ArrayView2<f64>, b: ArrayView2<f64>, eps: f64) {
        assert_eq!(a.dim(), b.dim());
        for j in 0..a.ncols() {
            let sign = if a.column(j).dot(&b.column(j)) < 0.0 { -1.0 } else { 1.0 };
            for i in 0..a.nrows() {
                assert_abs_diff_eq!(a[[i, j]], sign * b[[i, j]], epsilon = eps);
            }
        }
    }

    #[test]
    fn update_matches_full_decomposition_of_augmented_matrix() {
        let m = gaussian(30, 8, 1);
        let b = gaussian(30, 1, 2);
        let base = thin_svd(m.view()).unwrap();
        let v = base.vt.t().to_owned();
        let diag = RecordingDiagnostics::new();

        let update = svd_online(
            base.u.view(),
            base.singular_values.view(),
            v.view(),
            b.column(0),
            None,
            &diag,
        )
        .unwrap();
        assert!(!update.in_span);
        assert_eq!(update.right.dim(), (9, 8));

        let augmented = concatenate(Axis(1), &[m.view(), b.view()]).unwrap();
        let full = thin_svd(augmented.view()).unwrap();
        for j in 0..8 {
            assert_abs_diff_eq!(update.singular_values[j], full.singular_values[j], epsilon = 1e-9);
        }
        let full_v = full.vt.t().to_owned();
        assert_columns_match_up_to_sign(update.right.view(), full_v.slice(s![.., ..8]), 1e-8);
    }

    #[test]
    fn truncated_output_keeps_requested_components() {
        let m = gaussian(20, 6, 3);
        let b = gaussian(20, 1, 4);
        let base = thin_svd(m.view()).unwrap();
        let v = base.vt.t().to_owned();
        let diag = RecordingDiagnostics::new();
        let update = svd_online(
            base.u.view(),
            base.singular_values.view(),
            v.view(),
            b.column(0),
            Some(3),
            &diag,
        )
        .unwrap();
        assert_eq!(update.singular_values.len(), 3);
        assert_eq!(update.right.dim(), (7, 3));
    }

    #[test]
    fn sample_inside_span_does_not_divide_by_zero() {
        let m = gaussian(15, 5, 5);
        let base = thin_svd(m.view()).unwrap();
        let v = base.vt.t().to_owned();
        // A combination of existing columns lies entirely in span(U).
        let b = &m.column(0) * 2.0 - &m.column(3);
        let diag = RecordingDiagnostics::new();
        let update = svd_online(
            base.u.view(),
            base.singular_values.view(),
            v.view(),
            b.view(),
            None,
            &diag,
        )
        .unwrap();
        assert!(update.in_span);
        assert!(update.singular_values.iter().all(|x| x.is_finite()));
        assert!(update.right.iter().all(|x| x.is_finite()));

        let augmented = concatenate(Axis(1), &[m.view(), b.view().insert_axis(Axis(1))]).unwrap();
        let full = thin_svd(augmented.view()).unwrap();
        for j in 0..5 {
            assert_abs_diff_eq!(update.singular_values[j], full.singular_values[j], epsilon = 1e-9);
        }
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let m = gaussian(10, 4, 6);
        let base = thin_svd(m.view()).unwrap();
        let v = base.vt.t().to_owned();
        let b = Array1::<f64>::zeros(9);
        let diag = RecordingDiagnostics::new();
        assert!(matches!(
            svd_online(base.u.view(), base.singular_values.view(), v.view(), b.view(), None, &diag),
            Err(ProjectionError::DimensionMismatch { expected: 10, found: 9, .. })
        ));
        let b = Array1::<f64>::zeros(10);
        assert!(matches!(
            svd_online(base.u.view(), base.singular_values.view(), v.view(), b.view(), Some(5), &diag),
            Err(ProjectionError::Config(_))
        ));
    }
}
