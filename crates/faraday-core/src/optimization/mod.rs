//! Iterative solvers for $\min_x f(x) + g(x)$.
//!
//! The [`Optimizer`] trait is the interface the reconstruction pipeline runs
//! against. `f` is a smooth [`ObjectiveAggregator`] (it must provide a
//! gradient), `g` an arbitrary one used through its proximal operator.
//! Solvers only see real vectors; any dictionary lives inside the terms.
//!
//! - [`Fista`]: accelerated proximal gradient with monotone restarts.
//! - [`Admm`]: splitting `x = z` with an adaptive penalty.
//! - [`Sdmm`]: simultaneous direction method, one split per term.

pub mod admm;
pub mod cg;
pub mod fista;
pub mod sdmm;

use serde::{Deserialize, Serialize};

use crate::error::{FaradayError, Result};
use crate::objective::{ObjectiveAggregator, ObjectiveTerm};
use crate::parameter::{complex_to_real, FaradayParameter, SolutionData};

pub use admm::Admm;
pub use fista::Fista;
pub use sdmm::Sdmm;

/// Lifecycle of a solver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverState {
    Initialized,
    Iterating,
    Converged,
    /// The iteration cap was hit before the stopping rule was met.
    MaxItersReached,
    Diverged,
}

impl SolverState {
    pub fn is_converged(self) -> bool {
        self == SolverState::Converged
    }
}

/// Stopping rules shared by all solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Iterations always run before the stopping rule is checked.
    #[serde(default = "default_min_iterations")]
    pub min_iterations: usize,
}

fn default_max_iterations() -> usize {
    1000
}
fn default_tolerance() -> f64 {
    1e-6
}
fn default_min_iterations() -> usize {
    1
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            min_iterations: default_min_iterations(),
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(FaradayError::config("max_iterations must be at least 1"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(FaradayError::config(format!("tolerance must be positive, got {}", self.tolerance)));
        }
        if self.min_iterations > self.max_iterations {
            return Err(FaradayError::config(format!(
                "min_iterations ({}) exceeds max_iterations ({})",
                self.min_iterations, self.max_iterations
            )));
        }
        Ok(())
    }
}

/// What a finished run hands back.
#[derive(Debug, Clone)]
pub struct SolverOutput {
    /// Final objective value `f + g`.
    pub objective: f64,
    /// The guess parameter carrying the solution as [`SolutionData::Real`].
    pub parameter: FaradayParameter,
    pub status: SolverState,
    pub iterations: usize,
    /// Objective value after every accepted iteration.
    pub history: Vec<f64>,
}

/// A solver for the composite objective.
pub trait Optimizer {
    fn name(&self) -> &str;

    /// Iterate to convergence or the iteration cap.
    ///
    /// A non-finite objective aborts with [`FaradayError::NumericalDivergence`].
    /// Hitting the cap is not an error: the status is
    /// [`SolverState::MaxItersReached`].
    fn run(&mut self) -> Result<SolverOutput>;

    fn state(&self) -> SolverState;
}

/// Which solver to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    #[default]
    Fista,
    Admm,
    Sdmm,
}

impl SolverKind {
    pub fn build(
        self,
        guess: FaradayParameter,
        f: ObjectiveAggregator,
        g: ObjectiveAggregator,
        settings: SolverSettings,
    ) -> Result<Box<dyn Optimizer>> {
        settings.validate()?;
        Ok(match self {
            SolverKind::Fista => Box::new(Fista::new(guess, f, g, settings)?),
            SolverKind::Admm => Box::new(Admm::new(guess, f, g, settings)?),
            SolverKind::Sdmm => Box::new(Sdmm::new(guess, f, g, settings)?),
        })
    }
}

/// Starting point as a real vector, whatever the guess representation.
pub(crate) fn initial_point(guess: &FaradayParameter) -> Vec<f64> {
    match guess.data() {
        SolutionData::Real(x) => x.clone(),
        SolutionData::Complex(z) => complex_to_real(z),
    }
}

pub(crate) fn require_smooth(f: &ObjectiveAggregator, solver: &str) -> Result<()> {
    if f.is_smooth() {
        Ok(())
    } else {
        Err(FaradayError::config(format!("{} needs a differentiable f", solver)))
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// `‖a − b‖`.
pub(crate) fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

/// `|a − b| / max(|a|, |b|)`, zero when both vanish.
pub(crate) fn relative_change(old: f64, new: f64) -> f64 {
    let scale = old.abs().max(new.abs());
    if scale == 0.0 {
        0.0
    } else {
        (old - new).abs() / scale
    }
}

/// `‖new − old‖ / max(‖old‖, ‖new‖)`, zero when both vanish.
pub(crate) fn relative_step(old: &[f64], new: &[f64]) -> f64 {
    let scale = norm(old).max(norm(new));
    if scale == 0.0 {
        0.0
    } else {
        distance(old, new) / scale
    }
}

pub(crate) fn check_finite(value: f64, iteration: usize) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FaradayError::NumericalDivergence { iteration, value })
    }
}

const POWER_ITERATIONS: usize = 50;
const POWER_TOL: f64 = 1e-6;
/// Head-room on the power-iteration estimate, which approaches from below.
const LIPSCHITZ_MARGIN: f64 = 1.1;

/// Lipschitz constant of `∇f` by power iteration on `v ↦ ∇f(x0 + v) − ∇f(x0)`.
///
/// Exact up to [`LIPSCHITZ_MARGIN`] for quadratic `f`, where that map is the
/// Hessian. Returns 0 for a constant `f`.
pub fn estimate_lipschitz(f: &dyn ObjectiveTerm, x0: &[f64]) -> Result<f64> {
    let n = x0.len();
    if n == 0 {
        return Ok(0.0);
    }
    let g0 = f
        .gradient(x0)
        .ok_or_else(|| FaradayError::config(format!("'{}' has no gradient", f.name())))?;

    // Fixed, non-symmetric start vector keeps runs reproducible.
    let mut v: Vec<f64> = (0..n).map(|i| 1.0 + ((i * 7919) % 101) as f64 / 101.0).collect();
    let v_norm = norm(&v);
    v.iter_mut().for_each(|vi| *vi /= v_norm);

    let mut estimate = 0.0;
    for _ in 0..POWER_ITERATIONS {
        let shifted: Vec<f64> = x0.iter().zip(&v).map(|(a, b)| a + b).collect();
        let gv = f
            .gradient(&shifted)
            .ok_or_else(|| FaradayError::config(format!("'{}' has no gradient", f.name())))?;
        let mut hv: Vec<f64> = gv.iter().zip(&g0).map(|(a, b)| a - b).collect();
        let hv_norm = norm(&hv);
        if !hv_norm.is_finite() {
            return Err(FaradayError::NumericalDivergence { iteration: 0, value: hv_norm });
        }
        if hv_norm == 0.0 {
            return Ok(0.0);
        }
        let converged = relative_change(estimate, hv_norm) < POWER_TOL;
        estimate = hv_norm;
        if converged {
            break;
        }
        hv.iter_mut().for_each(|x| *x /= hv_norm);
        v = hv;
    }
    Ok(LIPSCHITZ_MARGIN * estimate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::TotalSquaredVariation;
    use approx::assert_relative_eq;

    #[test]
    fn test_settings_validation() {
        assert!(SolverSettings::default().validate().is_ok());
        let bad = SolverSettings { tolerance: 0.0, ..Default::default() };
        assert!(bad.validate().unwrap_err().is_fatal());
        let bad = SolverSettings { min_iterations: 10, max_iterations: 5, ..Default::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_lipschitz_of_squared_variation() {
        // 2λ DᵀD on a path of length m has largest eigenvalue 2λ(2 − 2cos(π(m−1)/m)).
        let tsv = TotalSquaredVariation::new(0.5).unwrap();
        let m = 6;
        let exact = 2.0 * 0.5 * (2.0 - 2.0 * (std::f64::consts::PI * (m - 1) as f64 / m as f64).cos());
        let l = estimate_lipschitz(&tsv, &vec![0.3; 2 * m]).unwrap();
        assert_relative_eq!(l, LIPSCHITZ_MARGIN * exact, max_relative = 1e-3);
    }

    #[test]
    fn test_relative_helpers() {
        assert_eq!(relative_change(0.0, 0.0), 0.0);
        assert_relative_eq!(relative_change(2.0, 1.0), 0.5);
        assert_eq!(relative_step(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        assert!(check_finite(f64::INFINITY, 4).is_err());
    }
}
