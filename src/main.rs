// ========================================================================================
//
//                      THE COMMAND-LINE FRONT END: EBMIX
//
// ========================================================================================
//
// Thin orchestration over the `ebmix` library. It reads a cohort TSV and an optional
// TOML run configuration, fits one mixture model per biomarker, evaluates every
// patient, and writes the probability tensor as a long-format TSV.
//
// Command-line flags take precedence over the configuration file.

use clap::{Args, Parser, Subcommand, ValueEnum};
use ebmix::config::{ModelFamily, RunConfig};
use ebmix::data::load_cohort;
use ebmix::fit::{fit_all_gmm_models, fit_all_kde_models_plus};
use ebmix::output::write_prob_mat_tsv;
use ebmix::prob_mat::get_prob_mat;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

// ========================================================================================
//                         COMMAND-LINE INTERFACE DEFINITION
// ========================================================================================

#[derive(Parser)]
#[command(
    name = "ebmix",
    version,
    about = "Per-biomarker normal/abnormal mixture models for event-based disease progression modelling."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit mixture models and write the patient × biomarker probability table
    ProbMat(ProbMatArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelFamilyCli {
    Kde,
    Gmm,
}

impl From<ModelFamilyCli> for ModelFamily {
    fn from(value: ModelFamilyCli) -> Self {
        match value {
            ModelFamilyCli::Kde => ModelFamily::Kde,
            ModelFamilyCli::Gmm => ModelFamily::Gmm,
        }
    }
}

#[derive(Args)]
struct ProbMatArgs {
    /// Cohort TSV with a `diagnosis` column, an optional `sample_id` column and one
    /// column per biomarker
    cohort: PathBuf,

    /// Output TSV path
    #[arg(long, value_name = "PATH")]
    out: PathBuf,

    /// TOML run configuration
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Mixture model family, overriding the configuration file
    #[arg(long, value_enum)]
    family: Option<ModelFamilyCli>,

    /// Keep control labels fixed while fitting kernel-density models
    #[arg(long)]
    fixed_controls: bool,
}

// ========================================================================================
//                           THE MAIN ORCHESTRATION LOGIC
// ========================================================================================

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::ProbMat(args) => run_prob_mat(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_prob_mat(args: ProbMatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let start_time = Instant::now();

    // --- Phase 1: Configuration ---
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading run configuration from {}", path.display());
            RunConfig::load(path)?
        }
        None => RunConfig::default(),
    };
    if let Some(family) = args.family {
        config.family = family.into();
    }
    if args.fixed_controls {
        config.implement_fixed_controls = true;
    }

    // --- Phase 2: Cohort ---
    let loaded = load_cohort(&args.cohort)?;
    let cohort = &loaded.cohort;
    log::info!(
        "Loaded {} patients and {} biomarkers from {}",
        cohort.n_patients(),
        cohort.n_biomarkers(),
        args.cohort.display()
    );

    // --- Phase 3: Fit and evaluate ---
    let tensor = match config.family {
        ModelFamily::Gmm => {
            if config.implement_fixed_controls {
                log::warn!("Fixed controls only apply to kernel-density models; ignoring.");
            }
            let models = fit_all_gmm_models(cohort)?;
            get_prob_mat(cohort.table(), &models)?
        }
        ModelFamily::Kde => {
            let models = fit_all_kde_models_plus(
                cohort,
                &config.kde_settings(),
                config.alphas.as_ref(),
                config.betas.as_ref(),
            )?;
            get_prob_mat(cohort.table(), &models)?
        }
    };

    // --- Phase 4: Output ---
    write_prob_mat_tsv(&args.out, &tensor, &loaded.sample_ids, cohort.table().biomarkers())?;
    log::info!("Finished in {:.2?}", start_time.elapsed());
    Ok(())
}
