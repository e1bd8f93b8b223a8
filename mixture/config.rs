//! Run configuration, read from a TOML file.
//!
//! Every key is optional:
//!
//! ```toml
//! family = "kde"                    # or "gmm"
//! implement_fixed_controls = false
//! patholog_dirn = [1, -1, 1]        # one entry per biomarker
//! alphas = 0.3                      # scalar or one entry per biomarker
//! betas = [0.3, 0.5, 0.3]
//! outlier_controls_quantile = 0.9
//! max_iterations = 1500
//! ```

use crate::fit::KdeFitSettings;
use crate::kde_mixture::DEFAULT_MAX_ITERATIONS;
use crate::model::DEFAULT_OUTLIER_CONTROLS_QUANTILE;
use crate::params::{PathologyDirection, ScalarOrList};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse the run configuration: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("outlier_controls_quantile must lie strictly between 0 and 1, got {0}.")]
    InvalidQuantile(f64),
    #[error("'{name}' must be finite and non-negative, got {value}.")]
    InvalidSmoothing { name: &'static str, value: f64 },
}

/// Which mixture model family to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    #[default]
    Kde,
    Gmm,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub family: ModelFamily,
    pub implement_fixed_controls: bool,
    pub patholog_dirn: Option<Vec<PathologyDirection>>,
    pub alphas: Option<ScalarOrList>,
    pub betas: Option<ScalarOrList>,
    pub outlier_controls_quantile: f64,
    pub max_iterations: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            family: ModelFamily::default(),
            implement_fixed_controls: false,
            patholog_dirn: None,
            alphas: None,
            betas: None,
            outlier_controls_quantile: DEFAULT_OUTLIER_CONTROLS_QUANTILE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        Self::from_toml_str(&toml_string)
    }

    pub fn from_toml_str(toml_string: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(toml_string)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that do not depend on the cohort. List lengths are
    /// checked against the biomarker count when fitting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let q = self.outlier_controls_quantile;
        if !(q > 0.0 && q < 1.0) {
            return Err(ConfigError::InvalidQuantile(q));
        }
        for (name, param) in [("alphas", &self.alphas), ("betas", &self.betas)] {
            let values: &[f64] = match param {
                None => &[],
                Some(ScalarOrList::Scalar(v)) => std::slice::from_ref(v),
                Some(ScalarOrList::List(vs)) => vs,
            };
            if let Some(&value) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
                return Err(ConfigError::InvalidSmoothing { name, value });
            }
        }
        Ok(())
    }

    pub fn kde_settings(&self) -> KdeFitSettings<'_> {
        KdeFitSettings {
            implement_fixed_controls: self.implement_fixed_controls,
            patholog_dirn: self.patholog_dirn.as_deref(),
            outlier_controls_quantile: self.outlier_controls_quantile,
            max_iterations: self.max_iterations,
        }
    }
}
