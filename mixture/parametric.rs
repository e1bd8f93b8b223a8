//! # Parametric (Gaussian) Mixture
//!
//! Each component is a single normal distribution. The fit runs in two stages:
//!
//! 1. Class split: the normal component is the maximum-likelihood Gaussian of the
//!    controls, the abnormal component that of the diseased patients, and the
//!    mixing weight is the control proportion.
//! 2. Refinement: the full two-component likelihood over all training values is
//!    minimised with BFGS. The refinement is only accepted when it improves the
//!    likelihood and leaves the abnormal component on the same side of the normal
//!    one, so the labelled classes keep their meaning.
//!
//! Outside the training data the wider Gaussian always wins, so posteriors are
//! kept monotone along the pathology direction: below the control median they
//! never exceed the value at the median, and beyond the most extreme diseased
//! patient they never fall below the value at that patient.

use crate::filter::BiomarkerSamples;
use crate::gaussian::Gaussian;
use crate::model::{
    disease_extreme, log_add_exp, logistic, mean, quantile, split_classes, ComponentScores,
    EvaluationWindow, FitOptions, MixtureError, MixtureModel, TailGuard,
};
use crate::params::PathologyDirection;
use ndarray::{array, Array1};
use wolfe_bfgs::{Bfgs, BfgsSolution};

/// Component standard deviations never drop below this fraction of the pooled std.
const STD_FLOOR_FRACTION: f64 = 0.05;
/// Bounds on the mixing weight of the normal component.
const MIN_MIXTURE: f64 = 0.1;
const MAX_MIXTURE: f64 = 0.9;
const DEFAULT_MAX_ITERATIONS: usize = 200;
const BFGS_TOLERANCE: f64 = 1e-6;
/// Cost returned to the optimizer for parameters where the likelihood is not finite.
const LARGE_COST: f64 = 1e10;

/// Two-component Gaussian mixture for one biomarker.
#[derive(Debug, Clone, PartialEq)]
pub struct ParametricMixture {
    max_iterations: usize,
    state: Option<ParametricFit>,
}

#[derive(Debug, Clone, PartialEq)]
struct ParametricFit {
    normal: Gaussian,
    abnormal: Gaussian,
    /// Weight of the normal component.
    mixture: f64,
    tail: TailGuard,
    window: EvaluationWindow,
}

impl Default for ParametricMixture {
    fn default() -> Self {
        Self::new()
    }
}

impl ParametricMixture {
    pub fn new() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            state: None,
        }
    }

    /// Caps the number of BFGS iterations of the refinement stage.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn normal_component(&self) -> Option<Gaussian> {
        self.state.as_ref().map(|s| s.normal)
    }

    pub fn abnormal_component(&self) -> Option<Gaussian> {
        self.state.as_ref().map(|s| s.abnormal)
    }

    /// Weight of the normal component, once fitted.
    pub fn mixture(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.mixture)
    }

    /// Pathology direction used by the last fit, given or inferred.
    pub fn direction(&self) -> Option<PathologyDirection> {
        self.state.as_ref().map(|s| s.tail.direction())
    }
}

impl MixtureModel for ParametricMixture {
    fn name(&self) -> &'static str {
        "gmm"
    }

    fn fit(&mut self, samples: &BiomarkerSamples, options: &FitOptions) -> Result<(), MixtureError> {
        let split = split_classes(samples)?;
        let floor = STD_FLOOR_FRACTION * split.pooled_std;

        let class_split = internal::Params {
            normal: Gaussian::fit(&split.controls, floor),
            abnormal: Gaussian::fit(&split.diseased, floor),
            mixture: (split.controls.len() as f64 / samples.len() as f64)
                .clamp(MIN_MIXTURE, MAX_MIXTURE),
        };
        log::debug!(
            "Class-split Gaussian fit: normal N({:.4}, {:.4}), abnormal N({:.4}, {:.4}), mixture {:.3}",
            class_split.normal.mean,
            class_split.normal.std,
            class_split.abnormal.mean,
            class_split.abnormal.std,
            class_split.mixture
        );

        let params = internal::refine(&samples.values, class_split, floor, self.max_iterations);
        let direction = options
            .patholog_dirn
            .unwrap_or_else(|| PathologyDirection::from_means(mean(&split.controls), mean(&split.diseased)));
        let tail = TailGuard::new(
            direction,
            quantile(&split.controls, 0.5),
            disease_extreme(&split.diseased, direction),
            |x| params.scores(x),
        );
        self.state = Some(ParametricFit {
            normal: params.normal,
            abnormal: params.abnormal,
            mixture: params.mixture,
            tail,
            window: EvaluationWindow::around(&samples.values.to_vec(), split.pooled_std),
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
        let params = internal::Params {
            normal: state.normal,
            abnormal: state.abnormal,
            mixture: state.mixture,
        };
        Ok(state.tail.apply(x, params.scores(x)))
    }
}

mod internal {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    pub(super) struct Params {
        pub(super) normal: Gaussian,
        pub(super) abnormal: Gaussian,
        pub(super) mixture: f64,
    }

    impl Params {
        pub(super) fn scores(&self, x: f64) -> ComponentScores {
            ComponentScores {
                log_normal: self.mixture.ln() + self.normal.log_pdf(x),
                log_abnormal: (1.0 - self.mixture).ln() + self.abnormal.log_pdf(x),
            }
        }
    }

    /// Unconstrained coordinates `[mu_n, s_n, mu_a, s_a, t]` where
    /// `std = floor + exp(s)` and `mixture = MIN + (MAX - MIN) * logistic(t)`.
    fn to_theta(params: &Params, floor: f64) -> Array1<f64> {
        let excess = |std: f64| (std - floor).max(1e-3 * floor).ln();
        let unit = ((params.mixture - MIN_MIXTURE) / (MAX_MIXTURE - MIN_MIXTURE)).clamp(1e-6, 1.0 - 1e-6);
        array![
            params.normal.mean,
            excess(params.normal.std),
            params.abnormal.mean,
            excess(params.abnormal.std),
            (unit / (1.0 - unit)).ln()
        ]
    }

    fn from_theta(theta: &Array1<f64>, floor: f64) -> Params {
        Params {
            normal: Gaussian::new(theta[0], floor + theta[1].exp()),
            abnormal: Gaussian::new(theta[2], floor + theta[3].exp()),
            mixture: MIN_MIXTURE + (MAX_MIXTURE - MIN_MIXTURE) * logistic(theta[4]),
        }
    }

    /// Negative log-likelihood and its gradient with respect to `theta`.
    pub(super) fn cost_and_grad(values: &Array1<f64>, theta: &Array1<f64>, floor: f64) -> (f64, Array1<f64>) {
        let p = from_theta(theta, floor);
        let (ln_m, ln_1m) = (p.mixture.ln(), (1.0 - p.mixture).ln());

        let mut nll = 0.0;
        let mut grad = Array1::<f64>::zeros(5);
        for &x in values {
            let a = ln_m + p.normal.log_pdf(x);
            let b = ln_1m + p.abnormal.log_pdf(x);
            let total = log_add_exp(a, b);
            nll -= total;

            // Responsibility of the normal component.
            let r = (a - total).exp();
            for (offset, weight, g) in [(0, r, &p.normal), (2, 1.0 - r, &p.abnormal)] {
                let d = x - g.mean;
                let var = g.std * g.std;
                grad[offset] -= weight * d / var;
                grad[offset + 1] -= weight * (d * d / (var * g.std) - 1.0 / g.std);
            }
            grad[4] -= r / p.mixture - (1.0 - r) / (1.0 - p.mixture);
        }

        // Chain rule into the unconstrained coordinates.
        grad[1] *= theta[1].exp();
        grad[3] *= theta[3].exp();
        let s = logistic(theta[4]);
        grad[4] *= (MAX_MIXTURE - MIN_MIXTURE) * s * (1.0 - s);

        if !nll.is_finite() || grad.iter().any(|g| !g.is_finite()) {
            return (LARGE_COST, Array1::zeros(5));
        }
        (nll, grad)
    }

    /// Runs the BFGS refinement, falling back to `start` whenever it does not help.
    pub(super) fn refine(values: &Array1<f64>, start: Params, floor: f64, max_iterations: usize) -> Params {
        let theta0 = to_theta(&start, floor);
        let (initial_cost, _) = cost_and_grad(values, &theta0, floor);

        let owned = values.to_owned();
        let objective = move |theta: &Array1<f64>| -> (f64, Array1<f64>) { cost_and_grad(&owned, theta, floor) };

        let result = Bfgs::new(theta0, objective)
            .with_tolerance(BFGS_TOLERANCE)
            .with_max_iterations(max_iterations)
            .run();

        let BfgsSolution {
            final_point,
            final_value,
            iterations,
            ..
        } = match result {
            Ok(solution) => solution,
            Err(e) => {
                log::warn!("BFGS refinement failed ({:?}); keeping the class-split Gaussian fit.", e);
                return start;
            }
        };

        let refined = from_theta(&final_point, floor);
        let start_side = start.abnormal.mean - start.normal.mean;
        let refined_side = refined.abnormal.mean - refined.normal.mean;
        let orientation_kept = start_side == 0.0 || start_side * refined_side > 0.0;

        if !final_value.is_finite() || final_value >= LARGE_COST || final_value > initial_cost {
            log::warn!(
                "BFGS refinement did not improve the likelihood ({:.6} -> {:.6}); keeping the class-split Gaussian fit.",
                initial_cost,
                final_value
            );
            return start;
        }
        if !orientation_kept {
            log::warn!("BFGS refinement swapped the normal and abnormal components; keeping the class-split Gaussian fit.");
            return start;
        }
        log::debug!(
            "BFGS refinement converged in {} iterations: NLL {:.6} -> {:.6}",
            iterations,
            initial_cost,
            final_value
        );
        refined
    }
}
