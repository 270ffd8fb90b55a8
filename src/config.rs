// config.rs

use std::fmt;
use std::str::FromStr;

use crate::decompose::DecompositionMethod;
use crate::error::{ProjectionError, Result};
use crate::procrustes::ProcrustesOptions;
use crate::standardize::MISSING_GENOTYPE;

/// Which projection pipeline turns a standardized study sample into PCs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Online SVD update, then Procrustes alignment.
    Oadp,
    /// Full eigendecomposition of the augmented cross-product, then Procrustes.
    Adp,
    /// Plain projection onto the reference loadings.
    Sp,
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Oadp => "oadp",
            StrategyKind::Adp => "adp",
            StrategyKind::Sp => "sp",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "oadp" => Ok(StrategyKind::Oadp),
            "adp" => Ok(StrategyKind::Adp),
            "sp" => Ok(StrategyKind::Sp),
            "ap" => Err(ProjectionError::Config(
                "the bias-adjusted projection 'ap' is no longer supported; use 'oadp' (default), 'adp' or 'sp'"
                    .to_string(),
            )),
            other => Err(ProjectionError::Config(format!(
                "unsupported projection strategy '{}'; expected one of 'oadp', 'adp', 'sp'",
                other
            ))),
        }
    }
}

/// How the reference decomposition should be computed, before defaults are filled in.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum DecompositionChoice {
    #[default]
    Exact,
    Randomized {
        dim_rand: Option<usize>,
        oversamples: usize,
        power_iterations: usize,
        seed: u64,
    },
}

/// User-facing knobs for one projection run.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionConfig {
    pub strategy: StrategyKind,
    pub dim_ref: usize,
    pub dim_stu: Option<usize>,
    pub dim_online: Option<usize>,
    pub decomposition: DecompositionChoice,
    pub procrustes: ProcrustesOptions,
    pub missing: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Oadp,
            dim_ref: 4,
            dim_stu: None,
            dim_online: None,
            decomposition: DecompositionChoice::Exact,
            procrustes: ProcrustesOptions::default(),
            missing: MISSING_GENOTYPE,
        }
    }
}

/// Dimensionalities after defaults: `reference <= study <= online`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    /// PCs reported per individual.
    pub reference: usize,
    /// Components of the augmented solution used for Procrustes.
    pub study: usize,
    /// Components of the reference basis fed to the online update.
    pub online: usize,
}

/// A validated configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConfig {
    pub strategy: StrategyKind,
    pub dims: Dimensions,
    pub method: DecompositionMethod,
    pub procrustes: ProcrustesOptions,
    pub missing: f64,
}

impl ResolvedConfig {
    /// Number of reference components that must be kept for this strategy.
    pub fn retained_components(&self) -> usize {
        match self.strategy {
            StrategyKind::Oadp => self.dims.online,
            StrategyKind::Adp | StrategyKind::Sp => self.dims.reference,
        }
    }

    /// Whether the reference cross-product `XᵗX` is part of the artifacts.
    pub fn needs_cross_product(&self) -> bool {
        self.strategy == StrategyKind::Adp
    }
}

impl ProjectionConfig {
    /// Fills defaults (`dim_stu = 2·dim_ref`, `dim_online = 2·dim_stu`,
    /// `dim_rand = 2·retained`) and checks the ordering constraints.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        if self.dim_ref == 0 {
            return Err(ProjectionError::Config(
                "the reference dimension must be at least 1".to_string(),
            ));
        }
        let study = self.dim_stu.unwrap_or(self.dim_ref * 2);
        let online = self.dim_online.unwrap_or(study * 2);
        if self.strategy != StrategyKind::Sp && self.dim_ref > study {
            return Err(ProjectionError::Config(format!(
                "reference dimension ({}) must not exceed the study dimension ({})",
                self.dim_ref, study
            )));
        }
        if self.strategy == StrategyKind::Oadp && study > online {
            return Err(ProjectionError::Config(format!(
                "study dimension ({}) must not exceed the online SVD dimension ({})",
                study, online
            )));
        }
        if !(self.procrustes.tolerance > 0.0) {
            return Err(ProjectionError::Config(format!(
                "Procrustes tolerance must be positive, got {}",
                self.procrustes.tolerance
            )));
        }

        let mut resolved = ResolvedConfig {
            strategy: self.strategy,
            dims: Dimensions {
                reference: self.dim_ref,
                study,
                online,
            },
            method: DecompositionMethod::Exact,
            procrustes: self.procrustes,
            missing: self.missing,
        };

        if let DecompositionChoice::Randomized {
            dim_rand,
            oversamples,
            power_iterations,
            seed,
        } = self.decomposition
        {
            let retained = resolved.retained_components();
            let rank = dim_rand.unwrap_or(retained * 2);
            if rank < retained {
                return Err(ProjectionError::Config(format!(
                    "randomized SVD dimension ({}) must be at least the {} retained components",
                    rank, retained
                )));
            }
            resolved.method = DecompositionMethod::Randomized {
                rank,
                oversamples,
                power_iterations,
                seed,
            };
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_decomposition_is_exact() {
        assert_eq!(DecompositionChoice::default(), DecompositionChoice::Exact);
        let resolved = ProjectionConfig::default().resolve().unwrap();
        assert_eq!(resolved.method, DecompositionMethod::default());
        assert_eq!(resolved.method, DecompositionMethod::Exact);
    }

    #[test]
    fn defaults_double_each_dimension() {
        let resolved = ProjectionConfig::default().resolve().unwrap();
        assert_eq!(
            resolved.dims,
            Dimensions {
                reference: 4,
                study: 8,
                online: 16
            }
        );
        assert_eq!(resolved.retained_components(), 16);
        assert!(!resolved.needs_cross_product());
    }

    #[test]
    fn inconsistent_ordering_is_a_config_error() {
        let config = ProjectionConfig {
            dim_ref: 6,
            dim_stu: Some(4),
            ..ProjectionConfig::default()
        };
        assert!(matches!(config.resolve(), Err(ProjectionError::Config(_))));

        let config = ProjectionConfig {
            dim_stu: Some(10),
            dim_online: Some(8),
            ..ProjectionConfig::default()
        };
        assert!(matches!(config.resolve(), Err(ProjectionError::Config(_))));
    }

    #[test]
    fn simple_projection_ignores_study_dimensions() {
        let config = ProjectionConfig {
            strategy: StrategyKind::Sp,
            dim_ref: 6,
            dim_stu: Some(4),
            ..ProjectionConfig::default()
        };
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.retained_components(), 6);
    }

    #[test]
    fn randomized_rank_defaults_and_is_checked() {
        let config = ProjectionConfig {
            decomposition: DecompositionChoice::Randomized {
                dim_rand: None,
                oversamples: 10,
                power_iterations: 2,
                seed: 42,
            },
            ..ProjectionConfig::default()
        };
        match config.resolve().unwrap().method {
            DecompositionMethod::Randomized { rank, .. } => assert_eq!(rank, 32),
            other => panic!("unexpected method {:?}", other),
        }

        let config = ProjectionConfig {
            decomposition: DecompositionChoice::Randomized {
                dim_rand: Some(8),
                oversamples: 10,
                power_iterations: 2,
                seed: 42,
            },
            ..ProjectionConfig::default()
        };
        assert!(matches!(config.resolve(), Err(ProjectionError::Config(_))));
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!("OADP".parse::<StrategyKind>().unwrap(), StrategyKind::Oadp);
        assert_eq!("adp".parse::<StrategyKind>().unwrap(), StrategyKind::Adp);
        assert_eq!("sp".parse::<StrategyKind>().unwrap(), StrategyKind::Sp);
        let removed = "ap".parse::<StrategyKind>().unwrap_err();
        assert!(removed.to_string().contains("no longer supported"));
        assert!(matches!("pca".parse::<StrategyKind>(), Err(ProjectionError::Config(_))));
    }
}
