// pipeline.rs

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use ndarray::{Array2, Axis};

use crate::batch::project_samples;
use crate::cache::{CacheKey, CacheLookup, ReferenceArtifacts, ReferenceCache};
use crate::config::{ProjectionConfig, ResolvedConfig};
use crate::decompose::{cross_product, decompose_reference};
use crate::diagnostics::Diagnostics;
use crate::error::{ProjectionError, Result};
use crate::output::write_pcs;
use crate::popu::{predict_populations, read_population_labels, PopulationPrediction};
use crate::prepare::GenotypeSource;
use crate::samples::{ensure_unique_samples, select_samples, SampleId};
use crate::standardize::{standardize, StandardizationParams};
use crate::strategy::{Projector, ReferenceContext};
use crate::variants::{ensure_unique_variants, reconcile_variants};

/// Where to read population labels and write predictions.
#[derive(Debug, Clone)]
pub struct PopulationRequest {
    pub reference_labels: PathBuf,
    pub output: PathBuf,
    pub n_neighbors: usize,
}

/// Side outputs of a run. Everything defaults to off.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Reference `.pcs` table, written whenever the decomposition is computed.
    pub reference_table: Option<PathBuf>,
    pub study_table: Option<PathBuf>,
    pub study_filter: Option<HashSet<SampleId>>,
    pub population: Option<PopulationRequest>,
    pub show_progress: bool,
}

#[derive(Debug, Clone)]
pub struct ProjectionOutcome {
    pub cache_hit: bool,
    pub reference_ids: Vec<SampleId>,
    pub reference_pcs: Array2<f64>,
    pub study_ids: Vec<SampleId>,
    pub study_pcs: Option<Array2<f64>>,
    pub populations: Option<Vec<PopulationPrediction>>,
}

fn cache_key(reference: &dyn GenotypeSource, config: &ResolvedConfig) -> CacheKey {
    CacheKey {
        reference: reference.label(),
        num_variants: reference.num_variants(),
        num_samples: reference.num_samples(),
        components: config.retained_components(),
        method: config.method,
        with_cross_product: config.needs_cross_product(),
    }
}

/// Reads the reference panel and standardizes it, estimating parameters
/// unless `params` is given.
fn standardized_reference(
    reference: &mut dyn GenotypeSource,
    params: Option<&StandardizationParams>,
    missing: f64,
    diag: &dyn Diagnostics,
) -> Result<(Array2<f64>, StandardizationParams)> {
    diag.info("Loading reference genotypes...");
    let mut x = reference.read_dosages(None, missing)?;
    diag.info("Standardizing reference data...");
    let params = standardize(&mut x, params, missing, diag)?;
    Ok((x, params))
}

/// Builds the shared reference context, either from the cache or from scratch.
fn reference_context(
    config: &ResolvedConfig,
    reference: &mut dyn GenotypeSource,
    cache: &dyn ReferenceCache,
    options: &RunOptions,
    diag: &dyn Diagnostics,
) -> Result<(ReferenceContext, bool)> {
    let key = cache_key(reference, config);
    let dim_ref = config.dims.reference;
    let hit = match cache.load(&key, diag)? {
        CacheLookup::Hit(artifacts) if artifacts.variants.as_slice() == reference.variants() => Some(artifacts),
        CacheLookup::Hit(_) => {
            diag.warn("Cached reference variants differ from the reference dataset; recomputing.");
            None
        }
        CacheLookup::Miss(reason) => {
            diag.debug(&format!("Reference cache miss: {}", reason));
            None
        }
    };

    if let Some(artifacts) = hit {
        diag.info("Reference PC scores loaded from cache.");
        let standardized = if config.needs_cross_product() {
            let (x, _) = standardized_reference(reference, Some(&artifacts.params), config.missing, diag)?;
            Some(x)
        } else {
            None
        };
        let ctx = ReferenceContext::new(
            artifacts.params,
            artifacts.decomposition,
            dim_ref,
            artifacts.cross_product,
            standardized,
        )?;
        if let Some(path) = options.reference_table.as_ref().filter(|p| !p.exists()) {
            diag.info("Reference PC table missing; rewriting it from the cached scores.");
            write_pcs(path, reference.samples(), &ctx.pcs_ref, diag)?;
        }
        return Ok((ctx, true));
    }

    let start = Instant::now();
    let (x, params) = standardized_reference(reference, None, config.missing, diag)?;
    let (decomposition, xtx) = decompose_reference(x.view(), config.retained_components(), config.method, diag)?;
    let xtx = if config.needs_cross_product() {
        Some(xtx.unwrap_or_else(|| cross_product(x.view())))
    } else {
        None
    };
    diag.info(&format!("Reference decomposition finished in {:.2?}.", start.elapsed()));

    let artifacts = ReferenceArtifacts {
        params,
        decomposition,
        cross_product: xtx,
        variants: reference.variants().to_vec(),
    };
    cache.store(&key, &artifacts, diag)?;

    let standardized = config.needs_cross_product().then_some(x);
    let ctx = ReferenceContext::new(
        artifacts.params,
        artifacts.decomposition,
        dim_ref,
        artifacts.cross_product,
        standardized,
    )?;
    if let Some(path) = &options.reference_table {
        write_pcs(path, reference.samples(), &ctx.pcs_ref, diag)?;
    }
    Ok((ctx, false))
}

/// One complete run: reference artifacts (cached or computed), then, when a
/// study dataset is given, variant reconciliation, projection and outputs.
pub fn run_projection(
    config: &ProjectionConfig,
    reference: &mut dyn GenotypeSource,
    study: Option<&mut dyn GenotypeSource>,
    cache: &dyn ReferenceCache,
    options: &RunOptions,
    diag: &dyn Diagnostics,
) -> Result<ProjectionOutcome> {
    let resolved = config.resolve()?;
    let population_labels = match &options.population {
        Some(_) if study.is_none() => {
            return Err(ProjectionError::Config(
                "population prediction needs a study dataset".to_string(),
            ));
        }
        Some(request) if request.n_neighbors == 0 => {
            return Err(ProjectionError::Config(
                "population prediction needs at least one neighbour".to_string(),
            ));
        }
        Some(request) => Some(read_population_labels(&request.reference_labels)?),
        None => None,
    };
    diag.info(&format!(
        "Strategy {}: dim_ref {}, dim_stu {}, dim_online {}.",
        resolved.strategy, resolved.dims.reference, resolved.dims.study, resolved.dims.online
    ));

    ensure_unique_samples(reference.samples(), "reference")?;
    ensure_unique_variants(reference.variants(), "reference")?;
    let (ctx, cache_hit) = reference_context(&resolved, reference, cache, options, diag)?;
    let reference_ids = reference.samples().to_vec();

    let Some(study) = study else {
        return Ok(ProjectionOutcome {
            cache_hit,
            reference_ids,
            reference_pcs: ctx.pcs_ref,
            study_ids: Vec::new(),
            study_pcs: None,
            populations: None,
        });
    };

    ensure_unique_samples(study.samples(), "study")?;
    let selection = match &options.study_filter {
        Some(keep) => Some(select_samples(study.samples(), keep, diag)?),
        None => None,
    };
    let study_ids: Vec<SampleId> = match &selection {
        Some(indices) => indices.iter().map(|&i| study.samples()[i].clone()).collect(),
        None => study.samples().to_vec(),
    };
    let permutation = reconcile_variants(reference.variants(), study.variants(), diag)?;

    diag.info("Loading study genotypes...");
    let mut raw = study.read_dosages(selection.as_deref(), resolved.missing)?;
    if let Some(permutation) = permutation {
        raw = raw.select(Axis(0), &permutation);
    }

    let projector = Projector::from_config(&resolved);
    let study_pcs = project_samples(raw.view(), &ctx, &projector, resolved.missing, diag, options.show_progress)?;
    if let Some(path) = &options.study_table {
        write_pcs(path, &study_ids, &study_pcs, diag)?;
    }

    let populations = match (&options.population, &population_labels) {
        (Some(request), Some(labels)) => {
            Some(predict_populations(
                &reference_ids,
                ctx.pcs_ref.view(),
                labels,
                &study_ids,
                study_pcs.view(),
                request.n_neighbors,
                &request.output,
                diag,
            )?)
        }
        _ => None,
    };

    Ok(ProjectionOutcome {
        cache_hit,
        reference_ids,
        reference_pcs: ctx.pcs_ref,
        study_ids,
        study_pcs: Some(study_pcs),
        populations,
    })
}
