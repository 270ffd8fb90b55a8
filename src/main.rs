// main.rs

// --- External Crate Imports ---
use anyhow::{anyhow, Error, Result};
use clap::Parser;
use log::info;
use std::{path::PathBuf, time::Instant};

use genomic_projection::{
    diagnostics::Diagnostics,
    pipeline::{run_projection, PopulationRequest, RunOptions},
    samples::read_sample_filter,
    DecompositionChoice, DirectoryCache, FileDiagnostics, GenotypeSource, PlinkGenotypes,
    ProcrustesOptions, ProjectionConfig, MISSING_GENOTYPE,
};

// --- Main Function ---
fn main() -> Result<(), Error> {
    let total_time_start = Instant::now();
    let cli_args = cli::CliArgs::parse();

    // Initialize logger
    let log_level = cli_args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                cli_args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .init();

    info!("Starting genomic_projection with args: {:?}", cli_args);

    // Configure Rayon thread pool
    let num_threads = cli_args.threads.unwrap_or_else(num_cpus::get);
    info!("Using {} threads for parallel operations.", num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    let config = cli_args.projection_config();
    // Configuration errors surface before any file is touched.
    config.resolve()?;

    let ref_prefix = PathBuf::from(&cli_args.ref_filepref);
    let out_prefix = cli_args
        .out
        .clone()
        .or_else(|| cli_args.stu_filepref.clone())
        .unwrap_or_else(|| cli_args.ref_filepref.clone());
    let out_prefix_path = PathBuf::from(&out_prefix);
    if let Some(parent) = out_prefix_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow!("Failed to create output directory {}: {}", parent.display(), e)
            })?;
            info!("Created output directory: {}", parent.display());
        }
    }
    let diag = FileDiagnostics::create(&PathBuf::from(format!("{}.log", out_prefix)))?;

    let mut reference = PlinkGenotypes::open(&ref_prefix)?;
    diag.info(&format!(
        "Reference dataset {}: {} variants, {} samples.",
        ref_prefix.display(),
        reference.num_variants(),
        reference.num_samples()
    ));
    let mut study = match &cli_args.stu_filepref {
        Some(prefix) => Some(PlinkGenotypes::open(&PathBuf::from(prefix))?),
        None => None,
    };
    if cli_args.predict_popu && study.is_none() {
        return Err(anyhow!("--predict-popu requires --stu-filepref"));
    }

    let options = RunOptions {
        reference_table: Some(PathBuf::from(format!("{}.pcs", cli_args.ref_filepref))),
        study_table: study
            .as_ref()
            .map(|_| PathBuf::from(format!("{}.pcs", out_prefix))),
        study_filter: match &cli_args.stu_filt_iid {
            Some(path) => Some(read_sample_filter(path)?),
            None => None,
        },
        population: cli_args.predict_popu.then(|| PopulationRequest {
            reference_labels: PathBuf::from(format!("{}.popu", cli_args.ref_filepref)),
            output: PathBuf::from(format!("{}.popu", out_prefix)),
            n_neighbors: cli_args.n_neighbors,
        }),
        show_progress: true,
    };
    let cache = DirectoryCache::new(&ref_prefix);

    let outcome = run_projection(
        &config,
        &mut reference,
        study.as_mut().map(|s| s as &mut dyn GenotypeSource),
        &cache,
        &options,
        &diag,
    )?;
    info!(
        "Reference: {} samples ({}). Study: {} samples.",
        outcome.reference_ids.len(),
        if outcome.cache_hit { "cached" } else { "computed" },
        outcome.study_ids.len()
    );

    diag.info(&format!(
        "genomic_projection finished in {:.2?}.",
        total_time_start.elapsed()
    ));
    diag.info("finished");
    Ok(())
}

// --- Module Implementations ---

mod cli {
    use clap::Parser; // For the derive macro to find Parser
    use std::path::PathBuf;

    use super::{DecompositionChoice, ProcrustesOptions, ProjectionConfig, MISSING_GENOTYPE};
    use genomic_projection::{popu::DEFAULT_NEIGHBORS, StrategyKind};

    #[derive(Parser, Debug)]
    #[command(author, version, about = "Project study samples into a reference PC space.", long_about = None, propagate_version = true)]
    pub(crate) struct CliArgs {
        /// PLINK prefix of the reference panel; cached artifacts are written next to it.
        pub(crate) ref_filepref: String,

        /// PLINK prefix of the study dataset.
        #[arg(long = "stu-filepref")]
        pub(crate) stu_filepref: Option<String>,

        /// Whitespace-separated `FID IID` list of study samples to keep.
        #[arg(long = "stu-filt-iid")]
        pub(crate) stu_filt_iid: Option<PathBuf>,

        /// Output prefix for study results (defaults to the study prefix).
        #[arg(short, long)]
        pub(crate) out: Option<String>,

        #[arg(short, long, default_value = "oadp")]
        pub(crate) method: StrategyKind,

        #[arg(long, default_value_t = 4)]
        pub(crate) dim_ref: usize,

        #[arg(long)]
        pub(crate) dim_stu: Option<usize>,

        #[arg(long)]
        pub(crate) dim_online: Option<usize>,

        /// Use a randomized SVD for the reference decomposition.
        #[arg(long)]
        pub(crate) randomized: bool,

        #[arg(long)]
        pub(crate) dim_rand: Option<usize>,

        #[arg(long, default_value_t = 10)]
        pub(crate) oversamples: usize,

        #[arg(long, default_value_t = 4)]
        pub(crate) power_iterations: usize,

        #[arg(long, default_value_t = 42)]
        pub(crate) seed: u64,

        #[arg(long, default_value_t = 10000)]
        pub(crate) procrustes_max_iter: usize,

        #[arg(long, default_value_t = 1e-6)]
        pub(crate) procrustes_tol: f64,

        /// Assign study samples to reference populations (reads `<ref>.popu`).
        #[arg(long)]
        pub(crate) predict_popu: bool,

        #[arg(long, default_value_t = DEFAULT_NEIGHBORS)]
        pub(crate) n_neighbors: usize,

        #[arg(short = 't', long)]
        pub(crate) threads: Option<usize>,

        #[arg(long, default_value = "Info")]
        pub(crate) log_level: String,
    }

    impl CliArgs {
        pub(crate) fn projection_config(&self) -> ProjectionConfig {
            let decomposition = if self.randomized {
                DecompositionChoice::Randomized {
                    dim_rand: self.dim_rand,
                    oversamples: self.oversamples,
                    power_iterations: self.power_iterations,
                    seed: self.seed,
                }
            } else {
                DecompositionChoice::Exact
            };
            ProjectionConfig {
                strategy: self.method,
                dim_ref: self.dim_ref,
                dim_stu: self.dim_stu,
                dim_online: self.dim_online,
                decomposition,
                procrustes: ProcrustesOptions {
                    max_iterations: self.procrustes_max_iter,
                    tolerance: self.procrustes_tol,
                },
                missing: MISSING_GENOTYPE,
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use clap::Parser;

        #[test]
        fn defaults_mirror_the_library() {
            let args = CliArgs::try_parse_from(["genomic_projection", "ref"]).unwrap();
            assert_eq!(args.projection_config(), ProjectionConfig::default());
            assert_eq!(args.n_neighbors, DEFAULT_NEIGHBORS);
        }

        #[test]
        fn removed_strategy_is_rejected_at_parse_time() {
            let err = CliArgs::try_parse_from(["genomic_projection", "ref", "--method", "ap"]).unwrap_err();
            assert!(err.to_string().contains("no longer supported"));
        }

        #[test]
        fn randomized_flags_build_a_randomized_choice() {
            let args = CliArgs::try_parse_from([
                "genomic_projection",
                "ref",
                "--randomized",
                "--dim-rand",
                "40",
                "--method",
                "sp",
            ])
            .unwrap();
            let config = args.projection_config();
            assert!(matches!(
                config.decomposition,
                DecompositionChoice::Randomized { dim_rand: Some(40), .. }
            ));
        }
    }
}
