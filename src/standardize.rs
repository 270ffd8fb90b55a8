// standardize.rs

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};

use crate::diagnostics::Diagnostics;
use crate::error::{ProjectionError, Result};

/// Missing-genotype code after allele recoding (dosages are 0, 1, 2).
pub const MISSING_GENOTYPE: f64 = 3.0;

#[inline(always)]
pub fn is_missing(value: f64, missing: f64) -> bool {
    value == missing || (missing.is_nan() && value.is_nan())
}

/// Per-variant centring and scaling factors, estimated once on the reference
/// panel and frozen for every study sample.
///
/// Invariant: every entry of `std` is strictly positive. Variants with zero
/// observed variance carry a standard deviation of 1.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizationParams {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl StandardizationParams {
    pub fn new(mean: Array1<f64>, std: Array1<f64>) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(ProjectionError::DimensionMismatch {
                context: "standardization parameters (mean vs std length)",
                expected: mean.len(),
                found: std.len(),
            });
        }
        let std = std.mapv(|s| if s == 0.0 || !s.is_finite() { 1.0 } else { s });
        Ok(Self { mean, std })
    }

    pub fn num_variants(&self) -> usize {
        self.mean.len()
    }

    /// Estimates mean and (population) standard deviation for each variant
    /// row from its non-missing entries.
    ///
    /// A variant with no observed entry at all gets mean 0 and std 1, so its
    /// standardized row is identically zero; a warning is emitted.
    pub fn estimate(x: ArrayView2<f64>, missing: f64, diag: &dyn Diagnostics) -> Self {
        let num_variants = x.nrows();
        let mut mean = Array1::<f64>::zeros(num_variants);
        let mut std = Array1::<f64>::ones(num_variants);
        let mut unobserved = 0usize;

        for (variant_idx, row) in x.axis_iter(Axis(0)).enumerate() {
            let (count, sum) = row
                .iter()
                .filter(|&&v| !is_missing(v, missing))
                .fold((0usize, 0.0f64), |(c, s), &v| (c + 1, s + v));
            if count == 0 {
                unobserved += 1;
                continue;
            }
            let row_mean = sum / count as f64;
            let sum_sq_diff: f64 = row
                .iter()
                .filter(|&&v| !is_missing(v, missing))
                .map(|&v| (v - row_mean).powi(2))
                .sum();
            let row_std = (sum_sq_diff / count as f64).sqrt();
            mean[variant_idx] = row_mean;
            std[variant_idx] = if row_std == 0.0 { 1.0 } else { row_std };
        }

        if unobserved > 0 {
            diag.warn(&format!(
                "{} / {} variants have no observed genotype in the reference panel; they standardize to zero.",
                unobserved, num_variants
            ));
        }
        Self { mean, std }
    }

    /// Standardizes a variants × samples matrix in place. Missing entries
    /// become exactly zero.
    pub fn apply(&self, mut x: ArrayViewMut2<f64>, missing: f64) -> Result<()> {
        if x.nrows() != self.num_variants() {
            return Err(ProjectionError::DimensionMismatch {
                context: "standardizing genotype matrix (variant rows)",
                expected: self.num_variants(),
                found: x.nrows(),
            });
        }
        for (variant_idx, mut row) in x.axis_iter_mut(Axis(0)).enumerate() {
            let (m, s) = (self.mean[variant_idx], self.std[variant_idx]);
            row.mapv_inplace(|v| if is_missing(v, missing) { 0.0 } else { (v - m) / s });
        }
        Ok(())
    }

    /// Standardizes one sample vector in place.
    pub fn apply_to_sample(&self, mut w: ArrayViewMut1<f64>, missing: f64) -> Result<()> {
        if w.len() != self.num_variants() {
            return Err(ProjectionError::DimensionMismatch {
                context: "standardizing sample vector (variants)",
                expected: self.num_variants(),
                found: w.len(),
            });
        }
        for ((v, &m), &s) in w.iter_mut().zip(self.mean.iter()).zip(self.std.iter()) {
            *v = if is_missing(*v, missing) { 0.0 } else { (*v - m) / s };
        }
        Ok(())
    }

    /// Returns a standardized copy of one raw sample vector.
    pub fn standardized_sample(&self, raw: ArrayView1<f64>, missing: f64) -> Result<Array1<f64>> {
        let mut w = raw.to_owned();
        self.apply_to_sample(w.view_mut(), missing)?;
        Ok(w)
    }

    /// Inverse of [`apply`](Self::apply) for fully observed data.
    pub fn restore(&self, z: ArrayView2<f64>) -> Result<Array2<f64>> {
        if z.nrows() != self.num_variants() {
            return Err(ProjectionError::DimensionMismatch {
                context: "restoring standardized matrix (variant rows)",
                expected: self.num_variants(),
                found: z.nrows(),
            });
        }
        let mut out = z.to_owned();
        for (variant_idx, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
            let (m, s) = (self.mean[variant_idx], self.std[variant_idx]);
            row.mapv_inplace(|v| v * s + m);
        }
        Ok(out)
    }
}

/// Standardizes `x` in place.
///
/// With `params == None` the parameters are estimated from `x` first (the
/// reference case); otherwise the supplied ones are reused verbatim (the
/// study case). Returns the parameters that were applied.
pub fn standardize(
    x: &mut Array2<f64>,
    params: Option<&StandardizationParams>,
    missing: f64,
    diag: &dyn Diagnostics,
) -> Result<StandardizationParams> {
    let params = match params {
        Some(p) => p.clone(),
        None => StandardizationParams::estimate(x.view(), missing, diag),
    };
    params.apply(x.view_mut(), missing)?;
    Ok(params)
}
