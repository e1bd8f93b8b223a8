//! # Model Fitting Orchestrator
//!
//! Fits one fresh mixture model per biomarker, in column order:
//!
//! 1. Keep only the control and diseased patients.
//! 2. For each biomarker, drop the patients whose measurement is missing.
//! 3. Build the model for that biomarker and fit it.
//!
//! The batch is all-or-nothing. The first biomarker that cannot be fit aborts the
//! whole call, and the error names it.

use crate::data::Cohort;
use crate::filter::training_subset;
use crate::kde_mixture::{KdeMixture, DEFAULT_MAX_ITERATIONS};
use crate::model::{FitOptions, MixtureError, MixtureModel, DEFAULT_OUTLIER_CONTROLS_QUANTILE};
use crate::params::{resolve_directions, resolve_smoothing, ParamError, PathologyDirection, ScalarOrList};
use crate::parametric::ParametricMixture;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("Biomarker {biomarker} ('{name}') has no measurements among control and diseased patients.")]
    NoTrainingData { biomarker: usize, name: String },
    #[error("Failed to fit the mixture model for biomarker {biomarker} ('{name}'): {source}")]
    Model {
        biomarker: usize,
        name: String,
        #[source]
        source: MixtureError,
    },
    #[error(transparent)]
    Param(#[from] ParamError),
}

/// Cohort-wide options for the kernel-density fitting entry points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KdeFitSettings<'a> {
    pub implement_fixed_controls: bool,
    /// One direction per biomarker; inferred per biomarker when absent.
    pub patholog_dirn: Option<&'a [PathologyDirection]>,
    pub outlier_controls_quantile: f64,
    pub max_iterations: usize,
}

impl Default for KdeFitSettings<'_> {
    fn default() -> Self {
        Self {
            implement_fixed_controls: false,
            patholog_dirn: None,
            outlier_controls_quantile: DEFAULT_OUTLIER_CONTROLS_QUANTILE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Fits one model per biomarker. `build` receives the biomarker index and returns
/// the unfitted model together with its fit options.
pub fn fit_models<M, F>(cohort: &Cohort, mut build: F) -> Result<Vec<M>, FitError>
where
    M: MixtureModel,
    F: FnMut(usize) -> (M, FitOptions),
{
    let training = training_subset(cohort);
    log::info!(
        "Fitting mixture models for {} biomarkers on {} of {} patients (control or diseased).",
        cohort.n_biomarkers(),
        training.len(),
        cohort.n_patients()
    );

    let mut models = Vec::with_capacity(cohort.n_biomarkers());
    for biomarker in 0..cohort.n_biomarkers() {
        let name = cohort.table().biomarker_name(biomarker).to_string();
        let samples = training.biomarker_samples(biomarker);
        if samples.is_empty() {
            return Err(FitError::NoTrainingData { biomarker, name });
        }

        let (mut model, options) = build(biomarker);
        log::debug!(
            "Fitting {} model for '{}' on {} measurements.",
            model.name(),
            name,
            samples.len()
        );
        model
            .fit(&samples, &options)
            .map_err(|source| FitError::Model {
                biomarker,
                name,
                source,
            })?;
        models.push(model);
    }
    Ok(models)
}

/// Parametric (Gaussian) models for every biomarker.
pub fn fit_all_gmm_models(cohort: &Cohort) -> Result<Vec<ParametricMixture>, FitError> {
    fit_models(cohort, |_| (ParametricMixture::new(), FitOptions::default()))
}

/// Kernel-density models for every biomarker, all sharing `alpha` and `beta`.
/// A missing `beta` takes the value of `alpha`.
pub fn fit_all_kde_models(
    cohort: &Cohort,
    settings: &KdeFitSettings<'_>,
    alpha: f64,
    beta: Option<f64>,
) -> Result<Vec<KdeMixture>, FitError> {
    let n = cohort.n_biomarkers();
    let beta = beta.unwrap_or(alpha);
    fit_kde_with(cohort, settings, &vec![alpha; n], &vec![beta; n])
}

/// Kernel-density models with per-biomarker smoothing. Either parameter may be a
/// scalar or a list with one value per biomarker; missing `alphas` default to
/// 0.3 and missing `betas` copy the resolved alphas.
pub fn fit_all_kde_models_plus(
    cohort: &Cohort,
    settings: &KdeFitSettings<'_>,
    alphas: Option<&ScalarOrList>,
    betas: Option<&ScalarOrList>,
) -> Result<Vec<KdeMixture>, FitError> {
    let smoothing = resolve_smoothing(cohort.n_biomarkers(), alphas, betas)?;
    fit_kde_with(cohort, settings, &smoothing.alphas, &smoothing.betas)
}

fn fit_kde_with(
    cohort: &Cohort,
    settings: &KdeFitSettings<'_>,
    alphas: &[f64],
    betas: &[f64],
) -> Result<Vec<KdeMixture>, FitError> {
    let directions = resolve_directions(cohort.n_biomarkers(), settings.patholog_dirn)?;
    fit_models(cohort, |b| {
        let model = KdeMixture::new(alphas[b], Some(betas[b])).with_max_iterations(settings.max_iterations);
        let options = FitOptions {
            implement_fixed_controls: settings.implement_fixed_controls,
            patholog_dirn: directions[b],
            outlier_controls_quantile: settings.outlier_controls_quantile,
        };
        (model, options)
    })
}
