//! # The Mixture Model Capability
//!
//! A mixture model describes one biomarker as a two-component mixture: a normal
//! component learnt from controls and an abnormal component learnt from diseased
//! patients. The orchestration and assembly code only ever talks to the
//! `MixtureModel` trait, so the parametric and kernel-density variants are
//! interchangeable at the call site.
//!
//! Both variants report their fit through the same pair of mixture-weighted log
//! densities (`ComponentScores`). Posterior probabilities are derived from the
//! difference of the two log scores, which keeps them finite and inside [0, 1]
//! for every finite input.

use crate::data::Class;
use crate::filter::BiomarkerSamples;
use crate::params::PathologyDirection;
use itertools::Itertools;
use ndarray::{Array1, ArrayView1};
use thiserror::Error;

/// Default quantile beyond which control measurements count as outliers.
pub const DEFAULT_OUTLIER_CONTROLS_QUANTILE: f64 = 0.9;

/// Width of the evaluation window on each side of the training support, in
/// multiples of the support width. Posteriors have saturated long before it.
const WINDOW_SPANS: f64 = 1.0e3;

/// Failures while fitting or evaluating one biomarker's mixture model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MixtureError {
    #[error("Cannot fit a mixture model to an empty set of measurements.")]
    EmptyInput,
    #[error("The {class} class has no measurements for this biomarker.")]
    EmptyClass { class: Class },
    #[error("All measurements are identical ({value}); there is no spread to model.")]
    DegenerateInput { value: f64 },
    #[error("Measurement {0} is not finite.")]
    NonFiniteInput(f64),
    #[error("Outlier-controls quantile must lie strictly between 0 and 1, got {0}.")]
    InvalidQuantile(f64),
    #[error("Smoothing parameter '{name}' must be finite and non-negative, got {value}.")]
    InvalidSmoothing { name: &'static str, value: f64 },
    #[error("The mixture model has not been fit yet.")]
    NotFitted,
}

/// Per-call options for `MixtureModel::fit`.
///
/// Both variants read `patholog_dirn`, inferring the direction from the class
/// means when it is absent. The other two only steer the control component of
/// the kernel-density variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub implement_fixed_controls: bool,
    pub patholog_dirn: Option<PathologyDirection>,
    pub outlier_controls_quantile: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            implement_fixed_controls: false,
            patholog_dirn: None,
            outlier_controls_quantile: DEFAULT_OUTLIER_CONTROLS_QUANTILE,
        }
    }
}

/// Mixture-weighted log densities of the two components at one value:
/// `ln(w * f_normal(x))` and `ln((1 - w) * f_abnormal(x))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentScores {
    pub log_normal: f64,
    pub log_abnormal: f64,
}

impl ComponentScores {
    pub fn probability_abnormal(&self) -> f64 {
        logistic(self.log_abnormal - self.log_normal)
    }

    pub fn probability_normal(&self) -> f64 {
        logistic(self.log_normal - self.log_abnormal)
    }

    /// `ln(P(abnormal) / P(normal))`.
    pub fn log_odds_abnormal(&self) -> f64 {
        self.log_abnormal - self.log_normal
    }
}

/// A two-component normal/abnormal model for a single biomarker.
pub trait MixtureModel {
    /// Short human-readable name of the model family, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Estimates both components from one biomarker's present, labelled
    /// measurements. Replaces any previous fit.
    fn fit(&mut self, samples: &BiomarkerSamples, options: &FitOptions)
    -> Result<(), MixtureError>;

    fn is_fitted(&self) -> bool;

    /// Weighted component log densities at `value`.
    fn component_log_scores(&self, value: f64) -> Result<ComponentScores, MixtureError>;

    /// Probability that each value belongs to the abnormal component.
    fn probability(&self, values: ArrayView1<f64>) -> Result<Array1<f64>, MixtureError> {
        values
            .iter()
            .map(|&v| {
                self.component_log_scores(v)
                    .map(|s| s.probability_abnormal())
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Array1::from_vec)
    }

    /// Probability that each value belongs to the normal component.
    fn probability_normal(&self, values: ArrayView1<f64>) -> Result<Array1<f64>, MixtureError> {
        values
            .iter()
            .map(|&v| self.component_log_scores(v).map(|s| s.probability_normal()))
            .collect::<Result<Vec<_>, _>>()
            .map(Array1::from_vec)
    }
}

/// Numerically stable logistic function.
pub(crate) fn logistic(x: f64) -> f64 {
    if x.is_nan() {
        // Both components vanished; neither side is supported.
        return 0.5;
    }
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `ln(exp(a) + exp(b))` without overflow.
pub(crate) fn log_add_exp(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Finite interval inputs are clamped to before evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct EvaluationWindow {
    lo: f64,
    hi: f64,
}

impl EvaluationWindow {
    /// Window around `values`; `scale` stands in for the width of a single point.
    pub(crate) fn around(values: &[f64], scale: f64) -> Self {
        let (min, max) = values
            .iter()
            .copied()
            .minmax()
            .into_option()
            .unwrap_or((0.0, 0.0));
        let width = (max - min).max(scale).max(f64::MIN_POSITIVE);
        Self {
            lo: min - WINDOW_SPANS * width,
            hi: max + WINDOW_SPANS * width,
        }
    }

    pub(crate) fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lo, self.hi)
    }
}

/// Keeps the abnormal log-odds monotone along the pathology direction outside
/// the training data.
///
/// Far from the data the wider component always wins, whichever class it
/// belongs to. So on the healthy side of `healthy_anchor` the log-odds are
/// capped at their value there, and beyond `disease_anchor` they are floored at
/// their value there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TailGuard {
    direction: PathologyDirection,
    healthy_anchor: f64,
    healthy_cap: f64,
    disease_anchor: f64,
    disease_floor: f64,
}

impl TailGuard {
    pub(crate) fn new(
        direction: PathologyDirection,
        healthy_anchor: f64,
        disease_anchor: f64,
        score: impl Fn(f64) -> ComponentScores,
    ) -> Self {
        Self {
            direction,
            healthy_anchor,
            healthy_cap: score(healthy_anchor).log_odds_abnormal(),
            disease_anchor,
            disease_floor: score(disease_anchor).log_odds_abnormal(),
        }
    }

    pub(crate) fn direction(&self) -> PathologyDirection {
        self.direction
    }

    pub(crate) fn apply(&self, x: f64, scores: ComponentScores) -> ComponentScores {
        let sign = self.direction.sign();
        let log_odds = scores.log_odds_abnormal();
        let bound = if sign * (x - self.healthy_anchor) < 0.0 && log_odds > self.healthy_cap {
            self.healthy_cap
        } else if sign * (x - self.disease_anchor) > 0.0 && log_odds < self.disease_floor {
            self.disease_floor
        } else {
            return scores;
        };
        ComponentScores {
            log_normal: scores.log_normal,
            log_abnormal: scores.log_normal + bound,
        }
    }
}

/// The most extreme diseased value in the pathological direction.
pub(crate) fn disease_extreme(diseased: &[f64], direction: PathologyDirection) -> f64 {
    let values = diseased.iter().copied();
    match direction {
        PathologyDirection::Increasing => values.fold(f64::NEG_INFINITY, f64::max),
        PathologyDirection::Decreasing => values.fold(f64::INFINITY, f64::min),
    }
}

/// Class-split view of validated training samples.
#[derive(Debug, Clone)]
pub(crate) struct ClassSplit {
    pub(crate) controls: Vec<f64>,
    pub(crate) diseased: Vec<f64>,
    pub(crate) pooled_std: f64,
}

/// Common pre-fit validation: non-empty, finite, both classes present and some
/// spread in the pooled values.
pub(crate) fn split_classes(samples: &BiomarkerSamples) -> Result<ClassSplit, MixtureError> {
    if samples.is_empty() {
        return Err(MixtureError::EmptyInput);
    }
    if let Some(&bad) = samples.values.iter().find(|v| !v.is_finite()) {
        return Err(MixtureError::NonFiniteInput(bad));
    }
    let controls = samples.class_values(Class::Control);
    let diseased = samples.class_values(Class::Diseased);
    if controls.is_empty() {
        return Err(MixtureError::EmptyClass {
            class: Class::Control,
        });
    }
    if diseased.is_empty() {
        return Err(MixtureError::EmptyClass {
            class: Class::Diseased,
        });
    }
    let pooled = samples.values.to_vec();
    let pooled_std = std_dev(&pooled);
    if pooled_std <= 0.0 {
        return Err(MixtureError::DegenerateInput { value: pooled[0] });
    }
    Ok(ClassSplit {
        controls,
        diseased,
        pooled_std,
    })
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Maximum-likelihood (population) standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Quantile with linear interpolation between order statistics.
pub(crate) fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let sorted: Vec<f64> = values.iter().copied().sorted_by(f64::total_cmp).collect();
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_logistic_is_stable_at_extremes() {
        assert_eq!(logistic(1.0e6), 1.0);
        assert_eq!(logistic(-1.0e6), 0.0);
        assert_abs_diff_eq!(logistic(0.0), 0.5, epsilon = 1e-15);
        assert_eq!(logistic(f64::NAN), 0.5);
    }

    #[test]
    fn test_component_scores_are_complementary() {
        let scores = ComponentScores {
            log_normal: -3.0,
            log_abnormal: -1.0,
        };
        let p_ab = scores.probability_abnormal();
        assert!(p_ab > 0.5);
        assert_abs_diff_eq!(p_ab + scores.probability_normal(), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_log_add_exp() {
        assert_abs_diff_eq!(log_add_exp(0.0, 0.0), 2.0_f64.ln(), epsilon = 1e-15);
        assert_abs_diff_eq!(log_add_exp(-1000.0, -1000.0), -1000.0 + 2.0_f64.ln(), epsilon = 1e-9);
        assert_eq!(log_add_exp(f64::NEG_INFINITY, f64::NEG_INFINITY), f64::NEG_INFINITY);
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_abs_diff_eq!(quantile(&values, 0.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&values, 0.5), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&values, 0.9), 3.7, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&values, 1.0), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_split_classes_rejects_empty_class() {
        let samples = BiomarkerSamples::from_codes(&[1.0, 2.0, 3.0], &[0, 0, 0]);
        assert_eq!(
            split_classes(&samples).unwrap_err(),
            MixtureError::EmptyClass {
                class: Class::Diseased
            }
        );
    }

    #[test]
    fn test_split_classes_rejects_constant_values() {
        let samples = BiomarkerSamples::from_codes(&[2.0, 2.0, 2.0], &[0, 1, 1]);
        assert_eq!(
            split_classes(&samples).unwrap_err(),
            MixtureError::DegenerateInput { value: 2.0 }
        );
    }

    fn gaussian_scores(normal_sd: f64, abnormal_sd: f64) -> impl Fn(f64) -> ComponentScores {
        move |x: f64| ComponentScores {
            log_normal: -0.5 * (x / normal_sd).powi(2) - normal_sd.ln(),
            log_abnormal: -0.5 * ((x - 3.0) / abnormal_sd).powi(2) - abnormal_sd.ln(),
        }
    }

    #[test]
    fn test_tail_guard_floors_disease_tail() {
        let score = gaussian_scores(2.0, 0.5);
        let guard = TailGuard::new(PathologyDirection::Increasing, 0.0, 3.0, &score);
        let at_anchor = score(3.0).log_odds_abnormal();
        for x in [4.0, 6.0, 50.0] {
            assert!(score(x).log_odds_abnormal() < at_anchor);
            assert_abs_diff_eq!(guard.apply(x, score(x)).log_odds_abnormal(), at_anchor, epsilon = 1e-9);
        }
        // Inside the training range nothing changes.
        assert_eq!(guard.apply(1.5, score(1.5)), score(1.5));
    }

    #[test]
    fn test_tail_guard_caps_healthy_tail() {
        let score = gaussian_scores(0.5, 2.0);
        let guard = TailGuard::new(PathologyDirection::Increasing, 0.0, 3.0, &score);
        let at_anchor = score(0.0).log_odds_abnormal();
        for x in [-2.0, -10.0] {
            assert!(score(x).log_odds_abnormal() > at_anchor);
            assert_abs_diff_eq!(guard.apply(x, score(x)).log_odds_abnormal(), at_anchor, epsilon = 1e-9);
        }
        assert_eq!(guard.direction(), PathologyDirection::Increasing);
    }

    #[test]
    fn test_disease_extreme_follows_direction() {
        let diseased = [2.0, 5.0, 3.0];
        assert_eq!(disease_extreme(&diseased, PathologyDirection::Increasing), 5.0);
        assert_eq!(disease_extreme(&diseased, PathologyDirection::Decreasing), 2.0);
    }

    #[test]
    fn test_window_clamps_far_values() {
        let window = EvaluationWindow::around(&[0.0, 1.0], 0.1);
        assert_eq!(window.clamp(0.5), 0.5);
        assert_eq!(window.clamp(1.0e300), 1.0 + WINDOW_SPANS);
        assert_eq!(window.clamp(-1.0e300), -WINDOW_SPANS);
    }
}
