// strategy.rs

use ndarray::{s, Array1, Array2, ArrayView1};

use crate::config::{ResolvedConfig, StrategyKind};
use crate::decompose::{scale_columns, singular_from_cross_product, ReferenceDecomposition};
use crate::diagnostics::Diagnostics;
use crate::error::{ProjectionError, Result};
use crate::online_svd::svd_online;
use crate::procrustes::{align_augmented, ProcrustesOptions};
use crate::standardize::StandardizationParams;

// --- Shared Reference State ---

/// Frozen reference artifacts shared read-only by every projected sample.
#[derive(Debug, Clone)]
pub struct ReferenceContext {
    pub params: StandardizationParams,
    pub decomposition: ReferenceDecomposition,
    /// Anchored reference coordinates, `n × dim_ref`.
    pub pcs_ref: Array2<f64>,
    /// `XᵗX` of the standardized reference (only for `adp`).
    pub cross_product: Option<Array2<f64>>,
    /// Standardized reference matrix `X`, `p × n` (only for `adp`).
    pub standardized: Option<Array2<f64>>,
}

impl ReferenceContext {
    pub fn new(
        params: StandardizationParams,
        decomposition: ReferenceDecomposition,
        dim_ref: usize,
        cross_product: Option<Array2<f64>>,
        standardized: Option<Array2<f64>>,
    ) -> Result<Self> {
        let pcs_ref = decomposition.reference_pcs(dim_ref)?;
        Ok(Self {
            params,
            decomposition,
            pcs_ref,
            cross_product,
            standardized,
        })
    }

    pub fn num_variants(&self) -> usize {
        self.params.num_variants()
    }

    pub fn num_individuals(&self) -> usize {
        self.decomposition.right.nrows()
    }

    fn loadings(&self) -> Result<&Array2<f64>> {
        self.decomposition.loadings.as_ref().ok_or_else(|| {
            ProjectionError::Config("reference loadings are required but were not retained".to_string())
        })
    }
}

// --- Strategies ---

/// One standardized study sample in, one reference-anchored coordinate out.
pub trait ProjectSample {
    fn project(
        &self,
        ctx: &ReferenceContext,
        w: ArrayView1<f64>,
        diag: &dyn Diagnostics,
    ) -> Result<Array1<f64>>;
}

/// Online SVD update of the reference basis followed by Procrustes alignment.
#[derive(Debug, Clone, Copy)]
pub struct OnlineAugmentation {
    pub dim_ref: usize,
    pub dim_stu: usize,
    pub dim_online: usize,
    pub procrustes: ProcrustesOptions,
}

impl ProjectSample for OnlineAugmentation {
    fn project(
        &self,
        ctx: &ReferenceContext,
        w: ArrayView1<f64>,
        diag: &dyn Diagnostics,
    ) -> Result<Array1<f64>> {
        let u = ctx.loadings()?;
        let k = self.dim_online;
        let update = svd_online(
            u.slice(s![.., ..k]),
            ctx.decomposition.singular_values.slice(s![..k]),
            ctx.decomposition.right.slice(s![.., ..k]),
            w,
            Some(self.dim_stu),
            diag,
        )?;
        let pcs_aug = scale_columns(update.right.view(), update.singular_values.view());
        align_augmented(ctx.pcs_ref.view(), pcs_aug.view(), &self.procrustes, diag)
    }
}

/// Eigendecomposition of the augmented cross-product followed by Procrustes alignment.
#[derive(Debug, Clone, Copy)]
pub struct Augmentation {
    pub dim_ref: usize,
    pub dim_stu: usize,
    pub procrustes: ProcrustesOptions,
}

impl ProjectSample for Augmentation {
    fn project(
        &self,
        ctx: &ReferenceContext,
        w: ArrayView1<f64>,
        diag: &dyn Diagnostics,
    ) -> Result<Array1<f64>> {
        let (x, xtx) = match (&ctx.standardized, &ctx.cross_product) {
            (Some(x), Some(xtx)) => (x, xtx),
            _ => {
                return Err(ProjectionError::Config(
                    "adp needs the standardized reference matrix and its cross-product".to_string(),
                ))
            }
        };
        let n = xtx.nrows();
        let xtw = x.t().dot(&w);

        // [[XᵗX, Xᵗw], [wᵗX, wᵗw]]
        let mut augmented = Array2::<f64>::zeros((n + 1, n + 1));
        augmented.slice_mut(s![..n, ..n]).assign(xtx);
        augmented.slice_mut(s![..n, n]).assign(&xtw);
        augmented.slice_mut(s![n, ..n]).assign(&xtw);
        augmented[[n, n]] = w.dot(&w);

        let (singular_values, right) = singular_from_cross_product(augmented.view())?;
        let pcs_aug = scale_columns(
            right.slice(s![.., ..self.dim_stu]),
            singular_values.slice(s![..self.dim_stu]),
        );
        align_augmented(ctx.pcs_ref.view(), pcs_aug.view(), &self.procrustes, diag)
    }
}

/// Direct projection onto the reference loadings, `wᵗ·U`.
#[derive(Debug, Clone, Copy)]
pub struct SimpleProjection {
    pub dim_ref: usize,
}

impl ProjectSample for SimpleProjection {
    fn project(
        &self,
        ctx: &ReferenceContext,
        w: ArrayView1<f64>,
        _diag: &dyn Diagnostics,
    ) -> Result<Array1<f64>> {
        let u = ctx.loadings()?;
        Ok(u.slice(s![.., ..self.dim_ref]).t().dot(&w))
    }
}

/// The strategy selected for a run.
#[derive(Debug, Clone, Copy)]
pub enum Projector {
    Oadp(OnlineAugmentation),
    Adp(Augmentation),
    Sp(SimpleProjection),
}

impl Projector {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let dims = config.dims;
        match config.strategy {
            StrategyKind::Oadp => Projector::Oadp(OnlineAugmentation {
                dim_ref: dims.reference,
                dim_stu: dims.study,
                dim_online: dims.online,
                procrustes: config.procrustes,
            }),
            StrategyKind::Adp => Projector::Adp(Augmentation {
                dim_ref: dims.reference,
                dim_stu: dims.study,
                procrustes: config.procrustes,
            }),
            StrategyKind::Sp => Projector::Sp(SimpleProjection {
                dim_ref: dims.reference,
            }),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Projector::Oadp(_) => StrategyKind::Oadp,
            Projector::Adp(_) => StrategyKind::Adp,
            Projector::Sp(_) => StrategyKind::Sp,
        }
    }

    pub fn output_dim(&self) -> usize {
        match self {
            Projector::Oadp(p) => p.dim_ref,
            Projector::Adp(p) => p.dim_ref,
            Projector::Sp(p) => p.dim_ref,
        }
    }

    /// Checks once, before the batch starts, that the context carries what
    /// this strategy reads.
    pub fn validate(&self, ctx: &ReferenceContext) -> Result<()> {
        let n = ctx.num_individuals();
        let retained = ctx.decomposition.num_components();
        if ctx.pcs_ref.ncols() < self.output_dim() {
            return Err(ProjectionError::DimensionMismatch {
                context: "reference PC coordinates (columns)",
                expected: self.output_dim(),
                found: ctx.pcs_ref.ncols(),
            });
        }
        match self {
            Projector::Oadp(p) => {
                if p.dim_online > retained {
                    return Err(ProjectionError::Config(format!(
                        "online SVD dimension ({}) exceeds the {} retained reference components",
                        p.dim_online, retained
                    )));
                }
                ctx.loadings()?;
            }
            Projector::Adp(p) => {
                if p.dim_stu > n + 1 {
                    return Err(ProjectionError::Config(format!(
                        "study dimension ({}) exceeds the augmented panel size ({})",
                        p.dim_stu,
                        n + 1
                    )));
                }
                match (&ctx.standardized, &ctx.cross_product) {
                    (Some(x), Some(xtx)) => {
                        if x.dim() != (ctx.num_variants(), n) || xtx.dim() != (n, n) {
                            return Err(ProjectionError::DimensionMismatch {
                                context: "adp reference matrices (individuals)",
                                expected: n,
                                found: xtx.nrows(),
                            });
                        }
                    }
                    _ => {
                        return Err(ProjectionError::Config(
                            "adp needs the standardized reference matrix and its cross-product".to_string(),
                        ))
                    }
                }
            }
            Projector::Sp(p) => {
                if p.dim_ref > retained {
                    return Err(ProjectionError::Config(format!(
                        "reference dimension ({}) exceeds the {} retained reference components",
                        p.dim_ref, retained
                    )));
                }
                ctx.loadings()?;
            }
        }
        Ok(())
    }
}

impl ProjectSample for Projector {
    fn project(
        &self,
        ctx: &ReferenceContext,
        w: ArrayView1<f64>,
        diag: &dyn Diagnostics,
    ) -> Result<Array1<f64>> {
        if w.len() != ctx.num_variants() {
            return Err(ProjectionError::DimensionMismatch {
                context: "study sample vector (variants)",
                expected: ctx.num_variants(),
                found: w.len(),
            });
        }
        match self {
            Projector::Oadp(p) => p.project(ctx, w, diag),
            Projector::Adp(p) => p.project(ctx, w, diag),
            Projector::Sp(p) => p.project(ctx, w, diag),
        }
    }
}
