//! Fast iterative shrinkage-thresholding (Beck & Teboulle, 2009).
//!
//! Each iteration takes a gradient step on `f` from the extrapolated point
//! and applies the proximal operator of `g`:
//!
//! $$ x_{k+1} = \operatorname{prox}_{\gamma g}\big(y_k - \gamma\nabla f(y_k)\big), \qquad
//!    y_{k+1} = x_{k+1} + \tfrac{t_k - 1}{t_{k+1}}(x_{k+1} - x_k). $$
//!
//! The objective is kept monotone: a step that increases it is rejected and
//! the momentum reset; a rejected plain gradient step halves the step size.

use super::{
    check_finite, estimate_lipschitz, initial_point, relative_change, relative_step, require_smooth,
    Optimizer, SolverOutput, SolverSettings, SolverState,
};
use crate::error::Result;
use crate::objective::{ObjectiveAggregator, ObjectiveTerm};
use crate::parameter::FaradayParameter;

/// Consecutive rejected steps tolerated before the run is abandoned.
const MAX_BACKTRACKS: usize = 30;

pub struct Fista {
    guess: FaradayParameter,
    f: ObjectiveAggregator,
    g: ObjectiveAggregator,
    settings: SolverSettings,
    step: Option<f64>,
    state: SolverState,
}

impl Fista {
    pub fn new(
        guess: FaradayParameter,
        f: ObjectiveAggregator,
        g: ObjectiveAggregator,
        settings: SolverSettings,
    ) -> Result<Self> {
        require_smooth(&f, "FISTA")?;
        Ok(Self { guess, f, g, settings, step: None, state: SolverState::Initialized })
    }

    /// Use a fixed step instead of `1/L` from power iteration.
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step).filter(|s| s.is_finite() && *s > 0.0);
        self
    }

    fn objective(&self, x: &[f64]) -> f64 {
        self.f.value(x) + self.g.value(x)
    }

    fn initial_step(&self, x0: &[f64]) -> Result<f64> {
        if let Some(step) = self.step {
            return Ok(step);
        }
        let lipschitz = estimate_lipschitz(&self.f, x0)?;
        Ok(if lipschitz > 0.0 { 1.0 / lipschitz } else { 1.0 })
    }
}

impl Optimizer for Fista {
    fn name(&self) -> &str {
        "FISTA"
    }

    fn state(&self) -> SolverState {
        self.state
    }

    fn run(&mut self) -> Result<SolverOutput> {
        let mut x = initial_point(&self.guess);
        let mut step = self.initial_step(&x)?;
        let mut objective = match check_finite(self.objective(&x), 0) {
            Ok(v) => v,
            Err(e) => {
                self.state = SolverState::Diverged;
                return Err(e);
            }
        };

        let mut y = x.clone();
        let mut t = 1.0_f64;
        let mut history = Vec::with_capacity(self.settings.max_iterations.min(4096));
        let mut backtracks = 0;
        let mut iterations = 0;
        self.state = SolverState::Iterating;
        log::debug!("FISTA start: F = {:.6e}, step = {:.3e}", objective, step);

        while iterations < self.settings.max_iterations {
            iterations += 1;
            let grad = self.f.gradient(&y).unwrap_or_else(|| vec![0.0; y.len()]);
            let forward: Vec<f64> = y.iter().zip(&grad).map(|(yi, gi)| yi - step * gi).collect();
            let x_new = self.g.prox(&forward, step)?;
            let new_objective = match check_finite(self.objective(&x_new), iterations) {
                Ok(v) => v,
                Err(e) => {
                    self.state = SolverState::Diverged;
                    return Err(e);
                }
            };

            if new_objective > objective {
                // Overshoot from momentum: restart from x. Otherwise the step is too long.
                if t > 1.0 {
                    t = 1.0;
                    y.clone_from(&x);
                    continue;
                }
                backtracks += 1;
                if backtracks > MAX_BACKTRACKS {
                    log::warn!(
                        "FISTA stalled: no descent after {} step halvings (F = {:.6e})",
                        MAX_BACKTRACKS,
                        objective
                    );
                    self.state = SolverState::MaxItersReached;
                    break;
                }
                step *= 0.5;
                continue;
            }
            backtracks = 0;

            let t_new = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
            let momentum = (t - 1.0) / t_new;
            y = x_new
                .iter()
                .zip(&x)
                .map(|(xn, xo)| xn + momentum * (xn - xo))
                .collect();

            let obj_change = relative_change(objective, new_objective);
            let x_change = relative_step(&x, &x_new);
            x = x_new;
            objective = new_objective;
            t = t_new;
            history.push(objective);

            if iterations % 100 == 0 {
                log::debug!("FISTA iter {}: F = {:.6e}, dx = {:.2e}", iterations, objective, x_change);
            }
            if iterations >= self.settings.min_iterations
                && obj_change <= self.settings.tolerance
                && x_change <= self.settings.tolerance
            {
                self.state = SolverState::Converged;
                break;
            }
        }

        if self.state == SolverState::Iterating {
            self.state = SolverState::MaxItersReached;
            log::warn!(
                "FISTA did not converge in {} iterations (F = {:.6e})",
                self.settings.max_iterations,
                objective
            );
        }

        let mut parameter = self.guess.clone();
        parameter.set_real(x);
        Ok(SolverOutput { objective, parameter, status: self.state, iterations, history })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::{TotalSquaredVariation, L1};
    use std::sync::Arc;

    fn guess(x: Vec<f64>) -> FaradayParameter {
        let n = x.len() / 2;
        let mut p = FaradayParameter::from_grid((0..n).map(|i| i as f64).collect(), 1.0).unwrap();
        p.set_real(x);
        p
    }

    #[test]
    fn test_rejects_non_smooth_f() {
        let f = ObjectiveAggregator::new(vec![Arc::new(L1::new(1.0).unwrap()) as Arc<dyn ObjectiveTerm>]);
        let g = ObjectiveAggregator::new(vec![]);
        assert!(Fista::new(guess(vec![0.0; 4]), f, g, SolverSettings::default()).is_err());
    }

    #[test]
    fn test_smoothing_converges_to_constant_halves() {
        // Minimising TSV alone flattens each half to its mean.
        let f = ObjectiveAggregator::smooth(vec![Arc::new(TotalSquaredVariation::new(1.0).unwrap()) as Arc<dyn ObjectiveTerm>]).unwrap();
        let g = ObjectiveAggregator::new(vec![]);
        let settings = SolverSettings { max_iterations: 5000, tolerance: 1e-12, min_iterations: 1 };
        let mut solver = Fista::new(guess(vec![0.0, 2.0, 4.0, 1.0, 1.0, 4.0]), f, g, settings).unwrap();
        let out = solver.run().unwrap();
        assert_ne!(out.status, SolverState::Diverged);
        let x = out.parameter.as_real().unwrap();
        for v in &x[..3] {
            assert!((v - 2.0).abs() < 1e-3, "got {}", v);
        }
        for v in &x[3..] {
            assert!((v - 2.0).abs() < 1e-3, "got {}", v);
        }
        assert!(out.history.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_iteration_cap_is_reported() {
        let f = ObjectiveAggregator::smooth(vec![Arc::new(TotalSquaredVariation::new(1.0).unwrap()) as Arc<dyn ObjectiveTerm>]).unwrap();
        let g = ObjectiveAggregator::new(vec![]);
        let settings = SolverSettings { max_iterations: 2, tolerance: 1e-14, min_iterations: 1 };
        let mut solver = Fista::new(guess(vec![0.0, 5.0, -3.0, 1.0, 7.0, 4.0]), f, g, settings).unwrap();
        let out = solver.run().unwrap();
        assert_eq!(out.status, SolverState::MaxItersReached);
        assert_eq!(solver.state(), SolverState::MaxItersReached);
        assert_eq!(out.iterations, 2);
    }

    /// Smooth term whose gradient points uphill, so no step ever descends.
    struct Uphill;

    impl ObjectiveTerm for Uphill {
        fn name(&self) -> &str {
            "uphill"
        }

        fn reg(&self) -> f64 {
            1.0
        }

        fn value(&self, x: &[f64]) -> f64 {
            x.iter().map(|v| v * v).sum()
        }

        fn gradient(&self, x: &[f64]) -> Option<Vec<f64>> {
            Some(x.iter().map(|v| -2.0 * v).collect())
        }

        fn prox(&self, v: &[f64], _step: f64) -> Result<Vec<f64>> {
            Ok(v.to_vec())
        }

        fn is_smooth(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_stalled_descent_is_not_reported_as_converged() {
        let f = ObjectiveAggregator::smooth(vec![Arc::new(Uphill) as Arc<dyn ObjectiveTerm>]).unwrap();
        let g = ObjectiveAggregator::new(vec![]);
        let settings = SolverSettings { max_iterations: 1000, tolerance: 1e-12, min_iterations: 1 };
        let mut solver = Fista::new(guess(vec![1.0, -2.0, 0.5, 3.0]), f, g, settings)
            .unwrap()
            .with_step(0.5);
        let out = solver.run().unwrap();
        assert_eq!(out.status, SolverState::MaxItersReached);
        assert_eq!(out.iterations, MAX_BACKTRACKS + 1);
        assert!(out.history.is_empty());
        assert_eq!(out.parameter.as_real().unwrap(), &[1.0, -2.0, 0.5, 3.0][..]);
    }
}
