//! # Kernel-Density Mixture
//!
//! Both components are Gaussian kernel density estimates. Fitting alternates
//! between two steps until the posteriors settle:
//!
//! 1. Fit the normal and abnormal densities on the current labels.
//! 2. Relabel each training value as abnormal iff its posterior probability of
//!    being normal drops below one half, and set the mixing weight to the
//!    fraction labelled normal.
//!
//! The loop ends when a relabelling pass changes nothing, so the posteriors of
//! the next pass would be identical.
//!
//! The abnormal component is smoothed more heavily than the normal one: its
//! bandwidth is inflated by `1 + alpha` and its kernels adapt to local density
//! with sensitivity `beta`. Both fitting and evaluation respect the pathology
//! direction: training values on the healthy side of the control median always
//! stay normal, no value on that side is scored more abnormal than the median
//! itself, and no value beyond the most extreme diseased patient is scored less
//! abnormal than that patient.

use crate::data::Class;
use crate::filter::BiomarkerSamples;
use crate::kde::{scott_bandwidth, KernelDensity};
use crate::model::{
    disease_extreme, mean, quantile, split_classes, ComponentScores, EvaluationWindow, FitOptions,
    MixtureError, MixtureModel, TailGuard,
};
use crate::params::{PathologyDirection, DEFAULT_ALPHA};

/// Default cap on relabelling iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 1500;
/// Mixing weights are kept away from 0 and 1 so both log weights stay finite.
const MIXTURE_EPSILON: f64 = 1e-6;

/// Kernel-density two-component mixture for one biomarker.
#[derive(Debug, Clone, PartialEq)]
pub struct KdeMixture {
    alpha: f64,
    beta: f64,
    max_iterations: usize,
    state: Option<KdeFit>,
}

#[derive(Debug, Clone, PartialEq)]
struct KdeFit {
    normal: KernelDensity,
    abnormal: KernelDensity,
    mixture: f64,
    tail: TailGuard,
    iterations: usize,
    window: EvaluationWindow,
}

impl Default for KdeMixture {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA, None)
    }
}

impl KdeMixture {
    /// A missing `beta` takes the value of `alpha`.
    pub fn new(alpha: f64, beta: Option<f64>) -> Self {
        Self {
            alpha,
            beta: beta.unwrap_or(alpha),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            state: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Weight of the normal component, once fitted.
    pub fn mixture(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.mixture)
    }

    /// Pathology direction used by the last fit, given or inferred.
    pub fn direction(&self) -> Option<PathologyDirection> {
        self.state.as_ref().map(|s| s.tail.direction())
    }

    /// Number of relabelling iterations the last fit ran.
    pub fn iterations(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.iterations)
    }

    fn validate(&self, options: &FitOptions) -> Result<(), MixtureError> {
        for (name, value) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !value.is_finite() || value < 0.0 {
                return Err(MixtureError::InvalidSmoothing { name, value });
            }
        }
        let q = options.outlier_controls_quantile;
        if !(q > 0.0 && q < 1.0) {
            return Err(MixtureError::InvalidQuantile(q));
        }
        Ok(())
    }
}

impl MixtureModel for KdeMixture {
    fn name(&self) -> &'static str {
        "kde"
    }

    fn fit(&mut self, samples: &BiomarkerSamples, options: &FitOptions) -> Result<(), MixtureError> {
        self.validate(options)?;
        let split = split_classes(samples)?;
        let values = samples.values.to_vec();

        let direction = options
            .patholog_dirn
            .unwrap_or_else(|| PathologyDirection::from_means(mean(&split.controls), mean(&split.diseased)));
        let pooled_bandwidth = scott_bandwidth(&values).ok_or(MixtureError::DegenerateInput { value: values[0] })?;
        let control_median = quantile(&split.controls, 0.5);

        let reference_controls = if options.implement_fixed_controls {
            internal::trim_control_outliers(&split.controls, direction, options.outlier_controls_quantile)
        } else {
            Vec::new()
        };

        let components = internal::Components {
            alpha: self.alpha,
            beta: self.beta,
            pooled_bandwidth,
        };

        let mut labels = samples.classes.clone();
        let mut mixture = internal::normal_fraction(&labels);
        let mut iterations = 0;

        let (normal, abnormal, settled) = loop {
            // 1. Fit both densities on the current labels.
            let normal_points = if options.implement_fixed_controls {
                reference_controls.clone()
            } else {
                internal::points_with(&values, &labels, Class::Control)
            };
            let normal = components.normal(normal_points);
            let abnormal = components.abnormal(internal::points_with(&values, &labels, Class::Diseased));

            if iterations >= self.max_iterations {
                break (normal, abnormal, false);
            }
            iterations += 1;

            // 2. Posterior probability of the normal component.
            let ratio: Vec<f64> = values
                .iter()
                .map(|&x| internal::scores(&normal, &abnormal, mixture, x).probability_normal())
                .collect();

            // 3. Relabel.
            let proposed: Vec<Class> = values
                .iter()
                .zip(&ratio)
                .zip(&samples.classes)
                .map(|((&x, &r), &original)| {
                    let healthy_side = direction.sign() * (x - control_median) <= 0.0;
                    if options.implement_fixed_controls && original == Class::Control {
                        Class::Control
                    } else if r < 0.5 && !healthy_side {
                        Class::Diseased
                    } else {
                        Class::Control
                    }
                })
                .collect();
            if proposed == labels {
                break (normal, abnormal, true);
            }
            let n_diseased = proposed.iter().filter(|c| **c == Class::Diseased).count();
            if n_diseased == 0 || n_diseased == proposed.len() {
                log::debug!("Relabelling would empty a component; stopping after {} iterations.", iterations);
                break (normal, abnormal, true);
            }

            mixture = internal::normal_fraction(&proposed);
            labels = proposed;
        };

        log::debug!(
            "KDE mixture fit: direction {:?}, mixture {:.3}, {} iterations, {} normal / {} abnormal kernels",
            direction,
            mixture,
            iterations,
            normal.points().len(),
            abnormal.points().len()
        );
        if !settled && self.max_iterations > 0 {
            log::warn!(
                "KDE mixture did not settle within {} iterations; using the last fit.",
                self.max_iterations
            );
        }

        let tail = TailGuard::new(
            direction,
            control_median,
            disease_extreme(&split.diseased, direction),
            |x| internal::scores(&normal, &abnormal, mixture, x),
        );
        self.state = Some(KdeFit {
            normal,
            abnormal,
            mixture,
            tail,
            iterations,
            window: EvaluationWindow::around(&values, pooled_bandwidth),
        });
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    fn component_log_scores(&self, value: f64) -> Result<ComponentScores, MixtureError> {
        let state = self.state.as_ref().ok_or(MixtureError::NotFitted)?;
        if !value.is_finite() {
            return Err(MixtureError::NonFiniteInput(value));
        }
        let x = state.window.clamp(value);
        let scores = internal::scores(&state.normal, &state.abnormal, state.mixture, x);
        Ok(state.tail.apply(x, scores))
    }
}

mod internal {
    use super::*;

    pub(super) struct Components {
        pub(super) alpha: f64,
        pub(super) beta: f64,
        pub(super) pooled_bandwidth: f64,
    }

    impl Components {
        pub(super) fn normal(&self, points: Vec<f64>) -> KernelDensity {
            let h = scott_bandwidth(&points).unwrap_or(self.pooled_bandwidth);
            KernelDensity::fixed(points, h)
        }

        pub(super) fn abnormal(&self, points: Vec<f64>) -> KernelDensity {
            let h = scott_bandwidth(&points).unwrap_or(self.pooled_bandwidth) * (1.0 + self.alpha);
            KernelDensity::adaptive(points, h, self.beta)
        }
    }

    pub(super) fn scores(normal: &KernelDensity, abnormal: &KernelDensity, mixture: f64, x: f64) -> ComponentScores {
        let m = mixture.clamp(MIXTURE_EPSILON, 1.0 - MIXTURE_EPSILON);
        ComponentScores {
            log_normal: m.ln() + normal.log_density(x),
            log_abnormal: (1.0 - m).ln() + abnormal.log_density(x),
        }
    }

    pub(super) fn points_with(values: &[f64], labels: &[Class], class: Class) -> Vec<f64> {
        values
            .iter()
            .zip(labels)
            .filter(|(_, c)| **c == class)
            .map(|(v, _)| *v)
            .collect()
    }

    pub(super) fn normal_fraction(labels: &[Class]) -> f64 {
        labels.iter().filter(|c| **c == Class::Control).count() as f64 / labels.len() as f64
    }

    /// Controls with values beyond the `q` quantile on the pathological side removed.
    pub(super) fn trim_control_outliers(controls: &[f64], direction: PathologyDirection, q: f64) -> Vec<f64> {
        match direction {
            PathologyDirection::Increasing => {
                let cut = quantile(controls, q);
                controls.iter().copied().filter(|&x| x <= cut).collect()
            }
            PathologyDirection::Decreasing => {
                let cut = quantile(controls, 1.0 - q);
                controls.iter().copied().filter(|&x| x >= cut).collect()
            }
        }
    }
}
