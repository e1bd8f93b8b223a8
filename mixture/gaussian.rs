//! Univariate normal distribution used by the parametric mixture.

use crate::model::{mean, std_dev};

/// `ln(sqrt(2π))`.
pub(crate) const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian {
    pub mean: f64,
    pub std: f64,
}

impl Gaussian {
    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }

    /// Maximum-likelihood fit with the standard deviation raised to `std_floor`.
    pub fn fit(values: &[f64], std_floor: f64) -> Self {
        Self {
            mean: mean(values),
            std: std_dev(values).max(std_floor),
        }
    }

    pub fn log_pdf(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.std;
        -0.5 * z * z - self.std.ln() - LN_SQRT_2PI
    }
}
