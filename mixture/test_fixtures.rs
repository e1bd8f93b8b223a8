//! Test fixtures for ebmix unit tests.
//!
//! Builds seeded synthetic cohorts so tests can exercise the full fitting path
//! without touching the filesystem.

use crate::data::{Cohort, MeasurementTable};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Shape and separation of a synthetic cohort.
#[derive(Clone, Debug)]
pub struct SyntheticCohortConfig {
    pub n_controls: usize,
    pub n_diseased: usize,
    /// Patients with diagnosis code 2, never used for fitting.
    pub n_excluded: usize,
    pub n_biomarkers: usize,
    /// Distance between the control mean (0) and the diseased mean.
    pub separation: f64,
    /// Probability that any one cell is missing.
    pub missing_rate: f64,
    pub seed: u64,
}

impl Default for SyntheticCohortConfig {
    fn default() -> Self {
        Self {
            n_controls: 40,
            n_diseased: 40,
            n_excluded: 5,
            n_biomarkers: 3,
            separation: 3.0,
            missing_rate: 0.05,
            seed: 42,
        }
    }
}

/// Controls ~ N(0, 1), diseased ~ N(separation, 1), excluded halfway between.
/// Rows are ordered controls, diseased, excluded.
pub fn synthetic_cohort(config: &SyntheticCohortConfig) -> Cohort {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let n = config.n_controls + config.n_diseased + config.n_excluded;

    let codes: Vec<u32> = (0..n)
        .map(|row| {
            if row < config.n_controls {
                0
            } else if row < config.n_controls + config.n_diseased {
                1
            } else {
                2
            }
        })
        .collect();

    let values = Array2::from_shape_fn((n, config.n_biomarkers), |(row, _)| {
        let noise: f64 = rng.sample(StandardNormal);
        let shift = match codes[row] {
            0 => 0.0,
            1 => config.separation,
            _ => 0.5 * config.separation,
        };
        if rng.gen_range(0.0..1.0) < config.missing_rate {
            None
        } else {
            Some(shift + noise)
        }
    });

    let names = (1..=config.n_biomarkers).map(|i| format!("biomarker_{i}")).collect();
    let table = MeasurementTable::new(names, values).expect("synthetic values are finite");
    Cohort::from_codes(table, &codes).expect("one code per synthetic row")
}
