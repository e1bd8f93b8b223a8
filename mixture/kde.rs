//! Gaussian kernel density estimation in one dimension.
//!
//! Supports a single global bandwidth and Abramson-style adaptive bandwidths,
//! where every data point carries its own kernel width scaled by the inverse of
//! a pilot density estimate at that point.

use crate::gaussian::LN_SQRT_2PI;
use crate::model::{quantile, std_dev};

/// Rule-of-thumb constant `(4/3)^(1/5)`.
const SCOTT_FACTOR: f64 = 1.059;
/// Interquartile range of a standard normal.
const NORMAL_IQR: f64 = 1.349;
/// Local bandwidth factors are confined to this range around the global bandwidth.
const MIN_LOCAL_FACTOR: f64 = 0.2;
const MAX_LOCAL_FACTOR: f64 = 5.0;

/// Scott/Silverman rule-of-thumb bandwidth, `None` when `values` has no spread.
pub fn scott_bandwidth(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let std = std_dev(values);
    let iqr = quantile(values, 0.75) - quantile(values, 0.25);
    let spread = if iqr > 0.0 { std.min(iqr / NORMAL_IQR) } else { std };
    if spread > 0.0 && spread.is_finite() {
        Some(SCOTT_FACTOR * spread * (values.len() as f64).powf(-0.2))
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelDensity {
    points: Vec<f64>,
    bandwidths: Vec<f64>,
}

impl KernelDensity {
    /// Every kernel shares `bandwidth`.
    pub fn fixed(points: Vec<f64>, bandwidth: f64) -> Self {
        let bandwidths = vec![bandwidth; points.len()];
        Self { points, bandwidths }
    }

    /// Local bandwidths `h_i = bandwidth * (pilot_i / g)^(-sensitivity)`, where the
    /// pilot is the fixed-bandwidth estimate and `g` its geometric mean over the
    /// points. A sensitivity of zero gives the fixed estimator.
    pub fn adaptive(points: Vec<f64>, bandwidth: f64, sensitivity: f64) -> Self {
        let pilot = Self::fixed(points, bandwidth);
        if sensitivity == 0.0 || pilot.points.len() < 2 {
            return pilot;
        }
        let log_pilot: Vec<f64> = pilot.points.iter().map(|&x| pilot.log_density(x)).collect();
        let log_g = log_pilot.iter().sum::<f64>() / log_pilot.len() as f64;
        let bandwidths = log_pilot
            .iter()
            .map(|&lp| {
                let factor = (-sensitivity * (lp - log_g)).exp();
                bandwidth * factor.clamp(MIN_LOCAL_FACTOR, MAX_LOCAL_FACTOR)
            })
            .collect();
        Self {
            points: pilot.points,
            bandwidths,
        }
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn bandwidths(&self) -> &[f64] {
        &self.bandwidths
    }

    /// Log of the estimated density at `x`. `-inf` only for an empty estimator.
    pub fn log_density(&self, x: f64) -> f64 {
        if self.points.is_empty() {
            return f64::NEG_INFINITY;
        }
        let terms: Vec<f64> = self
            .points
            .iter()
            .zip(&self.bandwidths)
            .map(|(&p, &h)| {
                let z = (x - p) / h;
                -0.5 * z * z - h.ln() - LN_SQRT_2PI
            })
            .collect();
        let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = terms.iter().map(|t| (t - max).exp()).sum();
        max + sum.ln() - (self.points.len() as f64).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_single_point_matches_gaussian() {
        let kde = KernelDensity::fixed(vec![1.0], 0.5);
        let expected = crate::gaussian::Gaussian::new(1.0, 0.5).log_pdf(1.7);
        assert_abs_diff_eq!(kde.log_density(1.7), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_density_integrates_to_one() {
        let kde = KernelDensity::adaptive(vec![-1.0, 0.0, 0.2, 0.3, 2.0], 0.4, 0.5);
        let step = 0.01;
        let total: f64 = (-1000..1000)
            .map(|i| kde.log_density(i as f64 * step).exp() * step)
            .sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_adaptive_widens_sparse_points() {
        let kde = KernelDensity::adaptive(vec![0.0, 0.1, 0.2, 0.15, 5.0], 0.3, 0.5);
        let h = kde.bandwidths();
        assert!(h[4] > h[0]);
        assert!(h.iter().all(|&b| (0.3 * MIN_LOCAL_FACTOR..=0.3 * MAX_LOCAL_FACTOR).contains(&b)));

        let plain = KernelDensity::adaptive(vec![0.0, 5.0], 0.3, 0.0);
        assert_eq!(plain.bandwidths(), &[0.3, 0.3]);
    }

    #[test]
    fn test_scott_bandwidth() {
        assert_eq!(scott_bandwidth(&[1.0]), None);
        assert_eq!(scott_bandwidth(&[2.0, 2.0, 2.0]), None);
        let h = scott_bandwidth(&[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        // std = sqrt(2), iqr / 1.349 = 2 / 1.349
        let expected = SCOTT_FACTOR * 2.0_f64.sqrt().min(2.0 / NORMAL_IQR) * 5.0_f64.powf(-0.2);
        assert_abs_diff_eq!(h, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_far_values_have_finite_log_density() {
        let kde = KernelDensity::fixed(vec![0.0, 1.0], 1e-3);
        assert!(kde.log_density(1.0e4).is_finite());
    }
}
