//! Per-biomarker hyperparameters.
//!
//! Smoothing parameters may arrive as one scalar for every biomarker or as an
//! explicit list. They are resolved once, here, into one value per biomarker so
//! that no later stage needs to know which form the caller used.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default kernel-density smoothing strength when none is supplied.
pub const DEFAULT_ALPHA: f64 = 0.3;

/// A hyperparameter given either once for all biomarkers or once per biomarker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarOrList {
    Scalar(f64),
    List(Vec<f64>),
}

impl From<f64> for ScalarOrList {
    fn from(value: f64) -> Self {
        ScalarOrList::Scalar(value)
    }
}

impl From<Vec<f64>> for ScalarOrList {
    fn from(values: Vec<f64>) -> Self {
        ScalarOrList::List(values)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("'{name}' has {found} per-biomarker values, but the table has {expected} biomarkers.")]
    LengthMismatch {
        name: &'static str,
        found: usize,
        expected: usize,
    },
    #[error("Pathology direction must be 1 (higher is abnormal) or -1 (lower is abnormal), got {0}.")]
    InvalidDirection(i64),
}

/// Which tail of a biomarker's distribution indicates disease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum PathologyDirection {
    /// Higher values are abnormal.
    Increasing,
    /// Lower values are abnormal.
    Decreasing,
}

impl PathologyDirection {
    pub fn sign(self) -> f64 {
        match self {
            PathologyDirection::Increasing => 1.0,
            PathologyDirection::Decreasing => -1.0,
        }
    }

    /// Direction implied by the class means; ties resolve to `Increasing`.
    pub fn from_means(control_mean: f64, diseased_mean: f64) -> Self {
        if diseased_mean < control_mean {
            PathologyDirection::Decreasing
        } else {
            PathologyDirection::Increasing
        }
    }
}

impl TryFrom<i64> for PathologyDirection {
    type Error = ParamError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PathologyDirection::Increasing),
            -1 => Ok(PathologyDirection::Decreasing),
            other => Err(ParamError::InvalidDirection(other)),
        }
    }
}

impl From<PathologyDirection> for i64 {
    fn from(value: PathologyDirection) -> Self {
        match value {
            PathologyDirection::Increasing => 1,
            PathologyDirection::Decreasing => -1,
        }
    }
}

/// Resolved `alpha`/`beta` pair, exactly one entry per biomarker.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingParams {
    pub alphas: Vec<f64>,
    pub betas: Vec<f64>,
}

/// Expands `param` to `n_biomarkers` values, using `default` when it is absent.
pub fn broadcast(
    name: &'static str,
    param: Option<&ScalarOrList>,
    n_biomarkers: usize,
    default: &[f64],
) -> Result<Vec<f64>, ParamError> {
    let values = match param {
        None => default.to_vec(),
        Some(ScalarOrList::Scalar(value)) => vec![*value; n_biomarkers],
        Some(ScalarOrList::List(values)) => values.clone(),
    };
    if values.len() != n_biomarkers {
        return Err(ParamError::LengthMismatch {
            name,
            found: values.len(),
            expected: n_biomarkers,
        });
    }
    Ok(values)
}

/// Resolves the kernel-density smoothing parameters.
///
/// A missing `alphas` becomes `DEFAULT_ALPHA` everywhere; a missing `betas`
/// becomes a copy of the resolved alphas.
pub fn resolve_smoothing(
    n_biomarkers: usize,
    alphas: Option<&ScalarOrList>,
    betas: Option<&ScalarOrList>,
) -> Result<SmoothingParams, ParamError> {
    let alphas = broadcast(
        "alphas",
        alphas,
        n_biomarkers,
        &vec![DEFAULT_ALPHA; n_biomarkers],
    )?;
    let betas = broadcast("betas", betas, n_biomarkers, &alphas)?;
    Ok(SmoothingParams { alphas, betas })
}

/// One optional direction per biomarker.
pub fn resolve_directions(
    n_biomarkers: usize,
    directions: Option<&[PathologyDirection]>,
) -> Result<Vec<Option<PathologyDirection>>, ParamError> {
    match directions {
        None => Ok(vec![None; n_biomarkers]),
        Some(list) if list.len() == n_biomarkers => Ok(list.iter().copied().map(Some).collect()),
        Some(list) => Err(ParamError::LengthMismatch {
            name: "patholog_dirn",
            found: list.len(),
            expected: n_biomarkers,
        }),
    }
}
