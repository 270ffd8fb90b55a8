// lib.rs
//
// Projection of study genotypes into a PC space computed once from a
// reference panel.

pub mod batch;
pub mod cache;
pub mod config;
pub mod decompose;
pub mod diagnostics;
pub mod error;
pub mod linalg;
pub mod online_svd;
pub mod output;
pub mod pipeline;
pub mod popu;
pub mod prepare;
pub mod procrustes;
pub mod samples;
pub mod standardize;
pub mod strategy;
pub mod variants;

pub use cache::{CacheKey, CacheLookup, DirectoryCache, NoCache, ReferenceArtifacts, ReferenceCache};
pub use config::{DecompositionChoice, ProjectionConfig, ResolvedConfig, StrategyKind};
pub use decompose::{decompose_reference, DecompositionMethod, ReferenceDecomposition};
pub use diagnostics::{Diagnostics, FileDiagnostics, LogDiagnostics, RecordingDiagnostics};
pub use error::{ProjectionError, Result};
pub use online_svd::{svd_online, OnlineSvdUpdate};
pub use pipeline::{run_projection, PopulationRequest, ProjectionOutcome, RunOptions};
pub use prepare::{GenotypeSource, InMemoryGenotypes, PlinkGenotypes};
pub use procrustes::{procrustes, procrustes_diffdim, ProcrustesOptions, ProcrustesTransform};
pub use samples::SampleId;
pub use standardize::{standardize, StandardizationParams, MISSING_GENOTYPE};
pub use strategy::{ProjectSample, Projector, ReferenceContext};
pub use variants::{reconcile_variants, VariantKey, VariantMatch};
