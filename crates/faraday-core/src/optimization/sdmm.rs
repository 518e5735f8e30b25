//! Simultaneous-direction method of multipliers (Combettes & Pesquet, 2011).
//!
//! Minimises $\sum_i h_i(x)$ over all terms of `f` and `g` by giving every
//! term its own copy $y_i$ and scaled multiplier $z_i$:
//!
//! $$ x = \tfrac1m\sum_i (y_i - z_i), \qquad
//!    y_i = \operatorname{prox}_{\gamma h_i}(x + z_i), \qquad
//!    z_i \leftarrow z_i + x - y_i. $$
//!
//! Only proximal operators are used, so the data term is handled through its
//! conjugate-gradient prox.

use std::sync::Arc;

use super::{
    check_finite, distance, estimate_lipschitz, initial_point, norm, relative_step, require_smooth, Optimizer,
    SolverOutput, SolverSettings, SolverState,
};
use crate::error::{FaradayError, Result};
use crate::objective::{ObjectiveAggregator, ObjectiveTerm};
use crate::parameter::FaradayParameter;

pub struct Sdmm {
    guess: FaradayParameter,
    f: ObjectiveAggregator,
    g: ObjectiveAggregator,
    settings: SolverSettings,
    gamma: Option<f64>,
    state: SolverState,
}

impl Sdmm {
    pub fn new(
        guess: FaradayParameter,
        f: ObjectiveAggregator,
        g: ObjectiveAggregator,
        settings: SolverSettings,
    ) -> Result<Self> {
        require_smooth(&f, "SDMM")?;
        if f.is_empty() && g.is_empty() {
            return Err(FaradayError::config("SDMM needs at least one objective term"));
        }
        Ok(Self { guess, f, g, settings, gamma: None, state: SolverState::Initialized })
    }

    /// Proximal step; defaults to `1/L` of the smooth part.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = Some(gamma).filter(|g| g.is_finite() && *g > 0.0);
        self
    }

    fn objective(&self, x: &[f64]) -> f64 {
        self.f.value(x) + self.g.value(x)
    }

    fn fail(&mut self, err: FaradayError) -> Result<SolverOutput> {
        self.state = SolverState::Diverged;
        Err(err)
    }
}

impl Optimizer for Sdmm {
    fn name(&self) -> &str {
        "SDMM"
    }

    fn state(&self) -> SolverState {
        self.state
    }

    fn run(&mut self) -> Result<SolverOutput> {
        let mut x = initial_point(&self.guess);
        let n = x.len();
        let terms: Vec<Arc<dyn ObjectiveTerm>> = self
            .f
            .active_terms()
            .chain(self.g.active_terms())
            .cloned()
            .collect();

        let mut objective = match check_finite(self.objective(&x), 0) {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        let mut history = Vec::with_capacity(self.settings.max_iterations.min(4096));
        let mut iterations = 0;
        self.state = SolverState::Iterating;

        if terms.is_empty() {
            // Nothing left to minimise once zero-weight terms are dropped.
            self.state = SolverState::Converged;
        }

        let gamma = match self.gamma {
            Some(g) => g,
            None => {
                let l = estimate_lipschitz(&self.f, &x)?;
                if l > 0.0 {
                    1.0 / l
                } else {
                    1.0
                }
            }
        };
        let m = terms.len() as f64;
        let mut y: Vec<Vec<f64>> = vec![x.clone(); terms.len()];
        let mut z: Vec<Vec<f64>> = vec![vec![0.0; n]; terms.len()];
        log::debug!("SDMM start: {} terms, F = {:.6e}, gamma = {:.3e}", terms.len(), objective, gamma);

        while self.state == SolverState::Iterating && iterations < self.settings.max_iterations {
            iterations += 1;

            let mut x_new = vec![0.0; n];
            for (yi, zi) in y.iter().zip(&z) {
                for ((xn, a), b) in x_new.iter_mut().zip(yi).zip(zi) {
                    *xn += (a - b) / m;
                }
            }

            let mut primal = 0.0_f64;
            for ((term, yi), zi) in terms.iter().zip(y.iter_mut()).zip(z.iter_mut()) {
                let v: Vec<f64> = x_new.iter().zip(zi.iter()).map(|(a, b)| a + b).collect();
                *yi = term.prox(&v, gamma)?;
                for ((zk, xk), yk) in zi.iter_mut().zip(&x_new).zip(yi.iter()) {
                    *zk += xk - yk;
                }
                primal = primal.max(distance(&x_new, yi));
            }

            let x_change = relative_step(&x, &x_new);
            x = x_new;
            objective = match check_finite(self.objective(&x), iterations) {
                Ok(v) => v,
                Err(e) => return self.fail(e),
            };
            history.push(objective);

            if iterations % 100 == 0 {
                log::debug!(
                    "SDMM iter {}: F = {:.6e}, r = {:.2e}, dx = {:.2e}",
                    iterations,
                    objective,
                    primal,
                    x_change
                );
            }
            if iterations >= self.settings.min_iterations
                && primal <= self.settings.tolerance * norm(&x)
                && x_change <= self.settings.tolerance
            {
                self.state = SolverState::Converged;
            }
        }

        if self.state == SolverState::Iterating {
            self.state = SolverState::MaxItersReached;
            log::warn!(
                "SDMM did not converge in {} iterations (F = {:.6e})",
                self.settings.max_iterations,
                objective
            );
        }

        let mut parameter = self.guess.clone();
        parameter.set_real(x);
        Ok(SolverOutput { objective, parameter, status: self.state, iterations, history })
    }
}
