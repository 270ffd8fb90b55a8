// procrustes.rs

use ndarray::{concatenate, s, Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::diagnostics::Diagnostics;
use crate::error::{ProjectionError, Result};
use crate::linalg::thin_svd;

/// Similarity transform `x ↦ ρ · x · R + c` (row-vector convention).
#[derive(Debug, Clone)]
pub struct ProcrustesTransform {
    pub rotation: Array2<f64>,
    pub scale: f64,
    pub translation: Array1<f64>,
}

impl ProcrustesTransform {
    pub fn apply(&self, x: ArrayView2<f64>) -> Array2<f64> {
        x.dot(&self.rotation) * self.scale + &self.translation
    }

    pub fn apply_row(&self, x: ArrayView1<f64>) -> Array1<f64> {
        x.dot(&self.rotation) * self.scale + &self.translation
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcrustesOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for ProcrustesOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-6,
        }
    }
}

/// Outcome of the latent-dimension iteration.
#[derive(Debug, Clone)]
pub struct ProcrustesFit {
    pub transform: ProcrustesTransform,
    pub iterations: usize,
    pub converged: bool,
}

fn centered(a: ArrayView2<f64>) -> (Array2<f64>, Array1<f64>) {
    let mean = a
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(a.ncols()));
    (&a - &mean, mean)
}

/// Best rotation/reflection, scale and translation mapping `x` onto `y`
/// (both `n × d`) in the least-squares sense.
pub fn procrustes(y: ArrayView2<f64>, x: ArrayView2<f64>) -> Result<ProcrustesTransform> {
    if y.dim() != x.dim() {
        return Err(ProjectionError::DimensionMismatch {
            context: "Procrustes (target and source must share shape; columns shown)",
            expected: y.ncols(),
            found: x.ncols(),
        });
    }
    if x.nrows() == 0 {
        return Err(ProjectionError::DataIntegrity(
            "Procrustes alignment needs at least one point".to_string(),
        ));
    }
    let (xc, x_mean) = centered(x);
    let (yc, y_mean) = centered(y);

    let cross = yc.t().dot(&xc);
    let svd = thin_svd(cross.view())?;
    let rotation = svd.vt.t().dot(&svd.u.t());

    let source_ss: f64 = xc.iter().map(|v| v * v).sum();
    let trace_s: f64 = svd.singular_values.sum();
    // A source collapsed to a single point can only be mapped onto the target centroid.
    let scale = if source_ss > f64::EPSILON { trace_s / source_ss } else { 0.0 };
    let translation = &y_mean - &(x_mean.dot(&rotation) * scale);

    Ok(ProcrustesTransform {
        rotation,
        scale,
        translation,
    })
}

/// Procrustes alignment of a higher-dimensional source `x` (`n × p_x`) onto a
/// target `y` (`n × p_y`, `p_y <= p_x`).
///
/// The target is padded with `p_x - p_y` latent columns starting at zero;
/// each round aligns the source to the padded target and replaces the latent
/// columns with the transformed source's trailing columns. Iteration stops
/// once the relative change of the latent block drops below
/// `options.tolerance`, or after `options.max_iterations` rounds. The last
/// transform is returned either way; hitting the cap is reported as a
/// warning and `converged == false`.
pub fn procrustes_diffdim(
    y: ArrayView2<f64>,
    x: ArrayView2<f64>,
    options: &ProcrustesOptions,
    diag: &dyn Diagnostics,
) -> Result<ProcrustesFit> {
    let (n_x, p_x) = x.dim();
    let (n_y, p_y) = y.dim();
    if n_x != n_y {
        return Err(ProjectionError::DimensionMismatch {
            context: "Procrustes (rows of target vs rows of source)",
            expected: n_y,
            found: n_x,
        });
    }
    if p_x < p_y {
        return Err(ProjectionError::Config(format!(
            "Procrustes source has {} dimensions, fewer than the target's {}",
            p_x, p_y
        )));
    }
    if p_x == p_y {
        return Ok(ProcrustesFit {
            transform: procrustes(y, x)?,
            iterations: 0,
            converged: true,
        });
    }

    let mut latent = Array2::<f64>::zeros((n_x, p_x - p_y));
    let mut transform = None;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < options.max_iterations {
        iterations += 1;
        let padded = concatenate(Axis(1), &[y.view(), latent.view()])
            .map_err(|e| ProjectionError::Linalg(format!("padding Procrustes target: {}", e)))?;
        let current = procrustes(padded.view(), x)?;
        let transformed = current.apply(x);
        let (latent_new, _) = centered(transformed.slice(s![.., p_y..]));

        let change: f64 = (&latent_new - &latent).iter().map(|v| v * v).sum();
        let spread: f64 = latent_new.iter().map(|v| v * v).sum();
        let epsilon = if spread > 0.0 {
            change / spread
        } else if change == 0.0 {
            0.0
        } else {
            f64::INFINITY
        };

        transform = Some(current);
        if epsilon < options.tolerance {
            converged = true;
            break;
        }
        latent = latent_new;
    }

    let transform = match transform {
        Some(t) => t,
        // Zero iterations allowed: fall back to aligning against the zero-padded target.
        None => {
            let padded = concatenate(Axis(1), &[y.view(), latent.view()])
                .map_err(|e| ProjectionError::Linalg(format!("padding Procrustes target: {}", e)))?;
            procrustes(padded.view(), x)?
        }
    };
    if !converged {
        diag.warn(&format!(
            "Procrustes alignment did not converge within {} iterations (tolerance {:e}); using the last iterate.",
            options.max_iterations, options.tolerance
        ));
    }
    Ok(ProcrustesFit {
        transform,
        iterations,
        converged,
    })
}

/// Aligns an augmented solution (`n + 1` rows: the reference individuals then
/// one new sample) onto the anchored reference coordinates (`n` rows) and
/// returns the new sample's coordinate in the target's dimensionality.
pub fn align_augmented(
    pcs_ref: ArrayView2<f64>,
    pcs_aug: ArrayView2<f64>,
    options: &ProcrustesOptions,
    diag: &dyn Diagnostics,
) -> Result<Array1<f64>> {
    let (n_ref, p_ref) = pcs_ref.dim();
    if pcs_aug.nrows() != n_ref + 1 {
        return Err(ProjectionError::DimensionMismatch {
            context: "augmented PCs (reference rows + 1)",
            expected: n_ref + 1,
            found: pcs_aug.nrows(),
        });
    }
    let head = pcs_aug.slice(s![..n_ref, ..]);
    let tail = pcs_aug.row(n_ref);
    let fit = procrustes_diffdim(pcs_ref, head, options, diag)?;
    let aligned = fit.transform.apply_row(tail);
    Ok(aligned.slice(s![..p_ref]).to_owned())
}
