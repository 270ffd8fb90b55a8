// batch.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2, ArrayView2};
use rayon::prelude::*;

use crate::diagnostics::Diagnostics;
use crate::error::{ProjectionError, Result};
use crate::strategy::{ProjectSample, Projector, ReferenceContext};

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} samples ({percent}%) ETA: {eta}",
        )
        .map(|style| style.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(len as u64).with_style(style)
}

/// Projects every study sample (one column of `study`, raw dosages in
/// reference variant order) into the reference PC space.
///
/// Samples are independent: each column is standardized with the frozen
/// reference parameters and handed to the projector on its own rayon task.
/// Returns an `m × dim_ref` matrix in column order.
pub fn project_samples(
    study: ArrayView2<f64>,
    ctx: &ReferenceContext,
    projector: &Projector,
    missing: f64,
    diag: &dyn Diagnostics,
    show_progress: bool,
) -> Result<Array2<f64>> {
    if study.nrows() != ctx.num_variants() {
        return Err(ProjectionError::DimensionMismatch {
            context: "study genotype matrix (variant rows)",
            expected: ctx.num_variants(),
            found: study.nrows(),
        });
    }
    projector.validate(ctx)?;

    let num_samples = study.ncols();
    let dim_out = projector.output_dim();
    diag.info(&format!(
        "Projecting {} study samples with {}...",
        num_samples,
        projector.kind()
    ));
    let start = Instant::now();
    let report_every = (num_samples / 10).max(1);
    let done = AtomicUsize::new(0);
    let pb = progress_bar(num_samples, show_progress);

    let rows: Vec<Result<Array1<f64>>> = (0..num_samples)
        .into_par_iter()
        .map(|j| {
            let w = ctx.params.standardized_sample(study.column(j), missing)?;
            let pc = projector.project(ctx, w.view(), diag)?;
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            if finished % report_every == 0 {
                diag.info(&format!("Projecting sample {} / {}", finished, num_samples));
            }
            pb.inc(1);
            Ok(pc)
        })
        .collect();
    pb.finish_and_clear();

    let mut out = Array2::<f64>::zeros((num_samples, dim_out));
    for (i, row) in rows.into_iter().enumerate() {
        out.row_mut(i).assign(&row?);
    }
    diag.info(&format!(
        "Projected {} study samples in {:.2?}.",
        num_samples,
        start.elapsed()
    ));
    Ok(out)
}
