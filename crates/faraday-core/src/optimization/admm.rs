//! Alternating direction method of multipliers.
//!
//! Splits $\min_x f(x) + g(x)$ as $f(x) + g(z)$ subject to $x = z$ and
//! iterates, in scaled form,
//!
//! 1. $x \leftarrow \arg\min_x f(x) + \tfrac{\rho}{2}\|x - z + u\|^2$ (conjugate gradients),
//! 2. $z \leftarrow \operatorname{prox}_{g/\rho}(x + u)$,
//! 3. $u \leftarrow u + x - z$.
//!
//! The penalty $\rho$ is adapted by residual balancing and stopping follows
//! Boyd et al. (2011), §3.3.

use super::cg::cg_solve;
use super::{
    check_finite, distance, estimate_lipschitz, initial_point, norm, require_smooth, Optimizer, SolverOutput,
    SolverSettings, SolverState,
};
use crate::error::Result;
use crate::objective::{ObjectiveAggregator, ObjectiveTerm};
use crate::parameter::FaradayParameter;

/// Rebalance when one residual exceeds the other by this factor.
const BALANCE_RATIO: f64 = 10.0;
/// Multiplicative change of ρ when rebalancing.
const BALANCE_SCALE: f64 = 2.0;
const CG_TOL: f64 = 1e-10;
const CG_MAX_ITER: usize = 200;

pub struct Admm {
    guess: FaradayParameter,
    f: ObjectiveAggregator,
    g: ObjectiveAggregator,
    settings: SolverSettings,
    rho: Option<f64>,
    state: SolverState,
}

impl Admm {
    pub fn new(
        guess: FaradayParameter,
        f: ObjectiveAggregator,
        g: ObjectiveAggregator,
        settings: SolverSettings,
    ) -> Result<Self> {
        require_smooth(&f, "ADMM")?;
        Ok(Self { guess, f, g, settings, rho: None, state: SolverState::Initialized })
    }

    /// Starting penalty; defaults to the Lipschitz constant of `∇f`.
    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = Some(rho).filter(|r| r.is_finite() && *r > 0.0);
        self
    }

    fn objective(&self, x: &[f64]) -> f64 {
        self.f.value(x) + self.g.value(x)
    }

    /// `argmin f(x) + ρ/2‖x − target‖²` for quadratic `f`.
    fn x_update(&self, target: &[f64], warm: &[f64], grad_zero: &[f64], rho: f64) -> Vec<f64> {
        let rhs: Vec<f64> = target.iter().zip(grad_zero).map(|(t, g0)| rho * t - g0).collect();
        let op = |v: &[f64]| -> Vec<f64> {
            let gv = self.f.gradient(v).unwrap_or_else(|| grad_zero.to_vec());
            v.iter()
                .zip(gv.iter().zip(grad_zero))
                .map(|(vi, (gi, g0))| rho * vi + gi - g0)
                .collect()
        };
        cg_solve(op, &rhs, warm, CG_TOL, CG_MAX_ITER).x
    }

    fn fail(&mut self, err: crate::error::FaradayError) -> Result<SolverOutput> {
        self.state = SolverState::Diverged;
        Err(err)
    }
}

impl Optimizer for Admm {
    fn name(&self) -> &str {
        "ADMM"
    }

    fn state(&self) -> SolverState {
        self.state
    }

    fn run(&mut self) -> Result<SolverOutput> {
        let mut x = initial_point(&self.guess);
        let n = x.len();
        let zero = vec![0.0; n];
        let grad_zero = self.f.gradient(&zero).unwrap_or_else(|| zero.clone());

        let mut rho = match self.rho {
            Some(r) => r,
            None => {
                let l = estimate_lipschitz(&self.f, &x)?;
                if l > 0.0 {
                    l
                } else {
                    1.0
                }
            }
        };

        let mut z = x.clone();
        let mut u = vec![0.0; n];
        let mut objective = match check_finite(self.objective(&z), 0) {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        let mut history = Vec::with_capacity(self.settings.max_iterations.min(4096));
        let mut iterations = 0;
        let eps_rel = self.settings.tolerance;
        let eps_abs = 1e-3 * eps_rel;
        let sqrt_n = (n as f64).sqrt();
        self.state = SolverState::Iterating;
        log::debug!("ADMM start: F = {:.6e}, rho = {:.3e}", objective, rho);

        while iterations < self.settings.max_iterations {
            iterations += 1;

            let target: Vec<f64> = z.iter().zip(&u).map(|(zi, ui)| zi - ui).collect();
            x = self.x_update(&target, &x, &grad_zero, rho);

            let z_old = std::mem::take(&mut z);
            let v: Vec<f64> = x.iter().zip(&u).map(|(xi, ui)| xi + ui).collect();
            z = self.g.prox(&v, 1.0 / rho)?;
            for ((ui, xi), zi) in u.iter_mut().zip(&x).zip(&z) {
                *ui += xi - zi;
            }

            objective = match check_finite(self.objective(&z), iterations) {
                Ok(v) => v,
                Err(e) => return self.fail(e),
            };
            history.push(objective);

            let primal = distance(&x, &z);
            let dual = rho * distance(&z, &z_old);
            let eps_primal = sqrt_n * eps_abs + eps_rel * norm(&x).max(norm(&z));
            let eps_dual = sqrt_n * eps_abs + eps_rel * rho * norm(&u);

            if iterations % 100 == 0 {
                log::debug!(
                    "ADMM iter {}: F = {:.6e}, r = {:.2e}, s = {:.2e}, rho = {:.3e}",
                    iterations,
                    objective,
                    primal,
                    dual,
                    rho
                );
            }
            if iterations >= self.settings.min_iterations && primal <= eps_primal && dual <= eps_dual {
                self.state = SolverState::Converged;
                break;
            }

            // u is scaled by 1/ρ, so it rescales inversely.
            if primal > BALANCE_RATIO * dual {
                rho *= BALANCE_SCALE;
                u.iter_mut().for_each(|ui| *ui /= BALANCE_SCALE);
            } else if dual > BALANCE_RATIO * primal {
                rho /= BALANCE_SCALE;
                u.iter_mut().for_each(|ui| *ui *= BALANCE_SCALE);
            }
        }

        if self.state == SolverState::Iterating {
            self.state = SolverState::MaxItersReached;
            log::warn!(
                "ADMM did not converge in {} iterations (F = {:.6e})",
                self.settings.max_iterations,
                objective
            );
        }

        let mut parameter = self.guess.clone();
        parameter.set_real(z);
        Ok(SolverOutput { objective, parameter, status: self.state, iterations, history })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::{TotalSquaredVariation, L1};
    use std::sync::Arc;

    #[test]
    fn test_l1_with_quadratic_smoothing() {
        // f = TSV is flat on constants, so any constant-per-half vector is
        // optimal for f; the L1 term then pulls it to zero.
        let f = ObjectiveAggregator::smooth(vec![Arc::new(TotalSquaredVariation::new(1.0).unwrap()) as Arc<dyn ObjectiveTerm>]).unwrap();
        let g = ObjectiveAggregator::new(vec![Arc::new(L1::new(0.1).unwrap()) as Arc<dyn ObjectiveTerm>]);
        let mut guess = FaradayParameter::from_grid(vec![0.0, 1.0, 2.0], 1.0).unwrap();
        guess.set_real(vec![1.0, 2.0, 3.0, -1.0, 0.0, 1.0]);
        let settings = SolverSettings { max_iterations: 5000, tolerance: 1e-8, min_iterations: 1 };
        let mut admm = Admm::new(guess, f, g, settings).unwrap().with_rho(1.0);
        let out = admm.run().unwrap();
        assert_eq!(out.status, SolverState::Converged);
        for v in out.parameter.as_real().unwrap() {
            assert!(v.abs() < 1e-4, "got {}", v);
        }
    }
}
