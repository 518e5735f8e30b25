//! Objective terms for the composite problem $\min_x f(x) + g(x)$.
//!
//! Every term works on real-stacked vectors (or dictionary coefficients) and
//! exposes its value, optionally its gradient, and its proximal operator
//!
//! $$ \operatorname{prox}_{\gamma h}(v) = \arg\min_x\; \gamma h(x) + \tfrac12\|x - v\|^2. $$
//!
//! Smooth terms (data fidelity, squared variation) go into `f`; the
//! non-smooth ones (L1, total variation) into `g`, handled through their
//! proximal operators.

pub mod chi2;
pub mod l1;
pub mod policy;
pub mod variation;

use std::sync::Arc;

use crate::error::{FaradayError, Result};

pub use chi2::Chi2;
pub use l1::L1;
pub use policy::{Fixed, LambdaPolicy, RegularizationPolicy, UniversalThreshold};
pub use variation::{TotalSquaredVariation, TotalVariation};

/// A single term of the objective.
pub trait ObjectiveTerm: Send + Sync {
    fn name(&self) -> &str;

    /// Regularisation weight; 1 for the data-fidelity term.
    fn reg(&self) -> f64;

    fn value(&self, x: &[f64]) -> f64;

    /// Gradient, or `None` for non-differentiable terms.
    fn gradient(&self, _x: &[f64]) -> Option<Vec<f64>> {
        None
    }

    /// Proximal operator with step `step`.
    fn prox(&self, v: &[f64], step: f64) -> Result<Vec<f64>>;

    fn is_smooth(&self) -> bool {
        false
    }
}

/// Validate a regularisation weight at construction time.
pub(crate) fn check_reg(name: &str, reg: f64) -> Result<f64> {
    if reg.is_finite() && reg >= 0.0 {
        Ok(reg)
    } else {
        Err(FaradayError::config(format!(
            "{} regularisation must be finite and non-negative, got {}",
            name, reg
        )))
    }
}

/// Sum of objective terms.
#[derive(Clone)]
pub struct ObjectiveAggregator {
    terms: Vec<Arc<dyn ObjectiveTerm>>,
    smooth: bool,
}

impl ObjectiveAggregator {
    /// Aggregate arbitrary terms. `value` and `prox` are always available.
    pub fn new(terms: Vec<Arc<dyn ObjectiveTerm>>) -> Self {
        let smooth = terms.iter().all(|t| t.is_smooth());
        Self { terms, smooth }
    }

    /// Aggregate terms that must all be differentiable.
    pub fn smooth(terms: Vec<Arc<dyn ObjectiveTerm>>) -> Result<Self> {
        if let Some(t) = terms.iter().find(|t| !t.is_smooth()) {
            return Err(FaradayError::config(format!(
                "'{}' has no gradient and cannot join the smooth part of the objective",
                t.name()
            )));
        }
        Ok(Self { terms, smooth: true })
    }

    pub fn terms(&self) -> &[Arc<dyn ObjectiveTerm>] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms whose weight is non-zero.
    pub fn active_terms(&self) -> impl Iterator<Item = &Arc<dyn ObjectiveTerm>> {
        self.terms.iter().filter(|t| t.reg() != 0.0)
    }
}

impl ObjectiveTerm for ObjectiveAggregator {
    fn name(&self) -> &str {
        "aggregate"
    }

    fn reg(&self) -> f64 {
        1.0
    }

    fn value(&self, x: &[f64]) -> f64 {
        self.terms.iter().map(|t| t.value(x)).sum()
    }

    fn gradient(&self, x: &[f64]) -> Option<Vec<f64>> {
        let mut total = vec![0.0; x.len()];
        for t in &self.terms {
            let g = t.gradient(x)?;
            total.iter_mut().zip(g).for_each(|(a, b)| *a += b);
        }
        Some(total)
    }

    /// Composition of the member proximal operators, applied in order.
    ///
    /// Exact for a single term and for total variation followed by L1; an
    /// approximation otherwise.
    fn prox(&self, v: &[f64], step: f64) -> Result<Vec<f64>> {
        let mut x = v.to_vec();
        for t in self.active_terms() {
            x = t.prox(&x, step)?;
        }
        Ok(x)
    }

    fn is_smooth(&self) -> bool {
        self.smooth
    }
}
