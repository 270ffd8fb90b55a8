// decompose.rs

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostics;
use crate::error::{ProjectionError, Result};
use crate::linalg::{orthonormal_columns, symmetric_eigen, thin_svd};

/// Singular values below this (relative to the largest) are treated as zero
/// when forming loadings.
const RELATIVE_RANK_TOLERANCE: f64 = 1e-6;

/// Truncated SVD of the standardized reference matrix `X` (variants × individuals).
///
/// `singular_values` is non-increasing and non-negative; `right` has one
/// orthonormal column per retained component over the individual axis;
/// `loadings` (when present) has one column per component over the variant
/// axis. All three are truncations of the same decomposition.
#[derive(Debug, Clone)]
pub struct ReferenceDecomposition {
    pub singular_values: Array1<f64>,
    pub right: Array2<f64>,
    pub loadings: Option<Array2<f64>>,
}

impl ReferenceDecomposition {
    pub fn num_components(&self) -> usize {
        self.singular_values.len()
    }

    /// Keeps only the leading `k` components.
    pub fn truncated(&self, k: usize) -> Self {
        let k = k.min(self.num_components());
        Self {
            singular_values: self.singular_values.slice(s![..k]).to_owned(),
            right: self.right.slice(s![.., ..k]).to_owned(),
            loadings: self.loadings.as_ref().map(|u| u.slice(s![.., ..k]).to_owned()),
        }
    }

    /// Reference PC coordinates `V[:, :k] · diag(s[:k])`, one row per individual.
    pub fn reference_pcs(&self, k: usize) -> Result<Array2<f64>> {
        if k > self.num_components() {
            return Err(ProjectionError::Config(format!(
                "requested {} reference PCs but only {} components are retained",
                k,
                self.num_components()
            )));
        }
        Ok(scale_columns(
            self.right.slice(s![.., ..k]),
            self.singular_values.slice(s![..k]),
        ))
    }
}

/// How the reference decomposition is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum DecompositionMethod {
    /// Full eigendecomposition of `XᵗX`.
    #[default]
    Exact,
    /// Randomized range finder on `X` with `rank` sketch columns.
    Randomized {
        rank: usize,
        oversamples: usize,
        power_iterations: usize,
        seed: u64,
    },
}

/// Multiplies column `j` of `v` by `s[j]`.
pub fn scale_columns(v: ArrayView2<f64>, s: ArrayView1<f64>) -> Array2<f64> {
    let mut out = v.to_owned();
    for (mut col, &sv) in out.axis_iter_mut(Axis(1)).zip(s.iter()) {
        col *= sv;
    }
    out
}

/// Cross-product `XᵗX` (individuals × individuals).
pub fn cross_product(x: ArrayView2<f64>) -> Array2<f64> {
    x.t().dot(&x)
}

/// Singular values and right singular vectors from a cross-product matrix.
///
/// Eigenvalues are folded through `sqrt(|λ|)` so round-off negatives never
/// fail; the result is sorted in non-increasing order of singular value.
pub fn singular_from_cross_product(xtx: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let (eigenvalues, eigenvectors) = symmetric_eigen(xtx)?;
    let raw: Vec<f64> = eigenvalues.iter().map(|ev| ev.abs().sqrt()).collect();
    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by(|&a, &b| raw[b].partial_cmp(&raw[a]).unwrap_or(std::cmp::Ordering::Equal));

    let n = xtx.nrows();
    let singular_values = Array1::from_iter(order.iter().map(|&i| raw[i]));
    let right = Array2::from_shape_fn((n, n), |(row, col)| eigenvectors[[row, order[col]]]);
    Ok((singular_values, right))
}

/// Loadings `U = X · (V / s)` for each retained component.
///
/// A component whose singular value is numerically zero carries no variant
/// direction; its loading column is left at zero and a warning is emitted.
pub fn loadings(
    x: ArrayView2<f64>,
    right: ArrayView2<f64>,
    singular_values: ArrayView1<f64>,
    diag: &dyn Diagnostics,
) -> Result<Array2<f64>> {
    if x.ncols() != right.nrows() {
        return Err(ProjectionError::DimensionMismatch {
            context: "loadings (individuals in X vs rows of V)",
            expected: x.ncols(),
            found: right.nrows(),
        });
    }
    let leading = singular_values.iter().copied().fold(0.0f64, f64::max);
    let cutoff = leading * RELATIVE_RANK_TOLERANCE;
    let mut scaled_v = right.to_owned();
    let mut degenerate = 0usize;
    for (mut col, &sv) in scaled_v.axis_iter_mut(Axis(1)).zip(singular_values.iter()) {
        if sv <= cutoff {
            col.fill(0.0);
            degenerate += 1;
        } else {
            col /= sv;
        }
    }
    if degenerate > 0 {
        diag.warn(&format!(
            "{} retained component(s) have a numerically zero singular value; their loadings are set to zero.",
            degenerate
        ));
    }
    Ok(x.dot(&scaled_v))
}

/// Decomposes the standardized reference matrix, keeping `n_components`.
///
/// Returns the decomposition and, for the exact method, the full `XᵗX`
/// (needed by the `adp` strategy).
pub fn decompose_reference(
    x: ArrayView2<f64>,
    n_components: usize,
    method: DecompositionMethod,
    diag: &dyn Diagnostics,
) -> Result<(ReferenceDecomposition, Option<Array2<f64>>)> {
    let (num_variants, num_individuals) = x.dim();
    if num_individuals < 2 {
        return Err(ProjectionError::DataIntegrity(format!(
            "reference decomposition needs at least 2 individuals, found {}",
            num_individuals
        )));
    }
    if num_variants == 0 {
        return Err(ProjectionError::DataIntegrity(
            "reference decomposition needs at least 1 variant, found 0".to_string(),
        ));
    }
    if n_components == 0 || n_components > num_individuals {
        return Err(ProjectionError::Config(format!(
            "cannot retain {} components from a reference panel of {} individuals",
            n_components, num_individuals
        )));
    }

    match method {
        DecompositionMethod::Exact => {
            diag.info("Calculating reference cross-product matrix...");
            let xtx = cross_product(x);
            diag.info("Eigendecomposition of reference cross-product matrix...");
            let (singular_values, right) = singular_from_cross_product(xtx.view())?;
            let truncated_s = singular_values.slice(s![..n_components]).to_owned();
            let truncated_v = right.slice(s![.., ..n_components]).to_owned();
            let u = loadings(x, truncated_v.view(), truncated_s.view(), diag)?;
            Ok((
                ReferenceDecomposition {
                    singular_values: truncated_s,
                    right: truncated_v,
                    loadings: Some(u),
                },
                Some(xtx),
            ))
        }
        DecompositionMethod::Randomized {
            rank,
            oversamples,
            power_iterations,
            seed,
        } => {
            if rank < n_components {
                return Err(ProjectionError::Config(format!(
                    "randomized sketch rank {} is below the {} retained components",
                    rank, n_components
                )));
            }
            let decomposition =
                randomized_svd(x, rank, oversamples, power_iterations, seed, diag)?;
            Ok((decomposition.truncated(n_components), None))
        }
    }
}

/// Randomized SVD of `x` (Halko, Martinsson & Tropp range finder).
pub fn randomized_svd(
    x: ArrayView2<f64>,
    rank: usize,
    oversamples: usize,
    power_iterations: usize,
    seed: u64,
    diag: &dyn Diagnostics,
) -> Result<ReferenceDecomposition> {
    let (num_variants, num_individuals) = x.dim();
    let sketch = (rank + oversamples).min(num_variants.min(num_individuals));
    if sketch == 0 {
        return Err(ProjectionError::Config(
            "randomized SVD needs a positive sketch size".to_string(),
        ));
    }
    diag.info(&format!(
        "Randomized SVD: rank={}, sketch={}, power_iterations={}, seed={}",
        rank, sketch, power_iterations, seed
    ));

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let omega = Array2::from_shape_fn((num_individuals, sketch), |_| rng.sample::<f64, _>(StandardNormal));

    let mut q = orthonormal_columns(x.dot(&omega).view());
    for _ in 0..power_iterations {
        let z = orthonormal_columns(x.t().dot(&q).view());
        q = orthonormal_columns(x.dot(&z).view());
    }

    let b = q.t().dot(&x);
    let svd = thin_svd(b.view())?;
    let keep = rank.min(svd.singular_values.len());
    let u = q.dot(&svd.u.slice(s![.., ..keep]));
    Ok(ReferenceDecomposition {
        singular_values: svd.singular_values.slice(s![..keep]).to_owned(),
        right: svd.vt.slice(s![..keep, ..]).t().to_owned(),
        loadings: Some(u),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::standardize::{standardize, MISSING_GENOTYPE};
    use approx::assert_abs_diff_eq;
    use rand::Rng;

    fn random_genotypes(p: usize, n: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::from_shape_fn((p, n), |_| rng.random_range(0..3) as f64)
    }

    fn standardized(p: usize, n: usize, seed: u64) -> Array2<f64> {
        let mut x = random_genotypes(p, n, seed);
        standardize(&mut x, None, MISSING_GENOTYPE, &RecordingDiagnostics::new()).unwrap();
        x
    }

    #[test]
    fn singular_values_are_sorted_and_non_negative() {
        let x = standardized(60, 25, 7);
        let diag = RecordingDiagnostics::new();
        let (dec, xtx) = decompose_reference(x.view(), 25, DecompositionMethod::Exact, &diag).unwrap();
        assert!(xtx.is_some());
        let s = dec.singular_values.to_vec();
        assert!(s.iter().all(|&v| v >= 0.0));
        assert!(s.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn exact_decomposition_matches_direct_svd() {
        let x = standardized(40, 15, 11);
        let diag = RecordingDiagnostics::new();
        let (dec, _) = decompose_reference(x.view(), 5, DecompositionMethod::Exact, &diag).unwrap();
        let svd = thin_svd(x.view()).unwrap();
        for k in 0..5 {
            assert_abs_diff_eq!(dec.singular_values[k], svd.singular_values[k], epsilon = 1e-8);
        }
        // X · V = U · diag(s)
        let u = dec.loadings.as_ref().unwrap();
        let xv = x.dot(&dec.right);
        let us = scale_columns(u.view(), dec.singular_values.view());
        for (a, b) in xv.iter().zip(us.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-8);
        }
        let utu = u.t().dot(u);
        for i in 0..5 {
            for j in 0..5 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(utu[[i, j]], expected, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn null_component_gets_zero_loading_and_warning() {
        // Centred rows make the all-ones direction a null vector of X.
        let x = standardized(30, 6, 3);
        let diag = RecordingDiagnostics::new();
        let (dec, _) = decompose_reference(x.view(), 6, DecompositionMethod::Exact, &diag).unwrap();
        let u = dec.loadings.unwrap();
        assert!(u.column(5).iter().all(|&v| v == 0.0));
        assert!(diag.contains("numerically zero singular value"));
    }

    #[test]
    fn reference_pcs_scale_right_vectors() {
        let x = standardized(20, 8, 5);
        let diag = RecordingDiagnostics::new();
        let (dec, _) = decompose_reference(x.view(), 4, DecompositionMethod::Exact, &diag).unwrap();
        let pcs = dec.reference_pcs(2).unwrap();
        assert_eq!(pcs.dim(), (8, 2));
        assert_abs_diff_eq!(pcs[[3, 1]], dec.right[[3, 1]] * dec.singular_values[1], epsilon = 1e-12);
        assert!(dec.reference_pcs(5).is_err());
    }

    #[test]
    fn randomized_recovers_low_rank_spectrum() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let a = Array2::from_shape_fn((80, 3), |_| rng.sample::<f64, _>(StandardNormal));
        let b = Array2::from_shape_fn((3, 30), |_| rng.sample::<f64, _>(StandardNormal));
        let x = a.dot(&b);
        let diag = RecordingDiagnostics::new();
        let method = DecompositionMethod::Randomized {
            rank: 6,
            oversamples: 4,
            power_iterations: 2,
            seed: 1,
        };
        let (dec, xtx) = decompose_reference(x.view(), 3, method, &diag).unwrap();
        assert!(xtx.is_none());
        let exact = thin_svd(x.view()).unwrap();
        for k in 0..3 {
            assert_abs_diff_eq!(dec.singular_values[k], exact.singular_values[k], epsilon = 1e-6);
        }
    }

    #[test]
    fn too_many_components_is_a_config_error() {
        let x = standardized(10, 4, 1);
        let diag = RecordingDiagnostics::new();
        assert!(matches!(
            decompose_reference(x.view(), 5, DecompositionMethod::Exact, &diag),
            Err(ProjectionError::Config(_))
        ));
    }
}
