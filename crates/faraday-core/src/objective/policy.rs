//! How the L1 weight is chosen for each line of sight.

use serde::{Deserialize, Serialize};

use crate::error::{FaradayError, Result};

/// Maps the problem size and noise level to a regularisation weight.
pub trait RegularizationPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Weight for `n_channels` data samples at noise level `noise`.
    fn lambda(&self, n_channels: usize, noise: f64) -> f64;
}

/// A constant weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fixed(pub f64);

impl RegularizationPolicy for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    fn lambda(&self, _n_channels: usize, _noise: f64) -> f64 {
        self.0
    }
}

/// Universal threshold $\lambda = \eta\,\sigma\sqrt{2N + \sqrt{4N}}$.
///
/// Scales with the expected norm of a pure-noise dirty spectrum, so that
/// noise alone is thresholded away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniversalThreshold {
    pub eta: f64,
}

impl RegularizationPolicy for UniversalThreshold {
    fn name(&self) -> &str {
        "universal"
    }

    fn lambda(&self, n_channels: usize, noise: f64) -> f64 {
        let n = n_channels as f64;
        (2.0 * n + (4.0 * n).sqrt()).sqrt() * noise * self.eta
    }
}

/// Serialisable policy selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LambdaPolicy {
    Fixed { value: f64 },
    Universal { eta: f64 },
}

impl Default for LambdaPolicy {
    fn default() -> Self {
        LambdaPolicy::Universal { eta: 1.0 }
    }
}

impl LambdaPolicy {
    pub fn validate(&self) -> Result<()> {
        let (what, v) = match *self {
            LambdaPolicy::Fixed { value } => ("fixed lambda", value),
            LambdaPolicy::Universal { eta } => ("eta", eta),
        };
        if v.is_finite() && v >= 0.0 {
            Ok(())
        } else {
            Err(FaradayError::config(format!("{} must be finite and non-negative, got {}", what, v)))
        }
    }

    pub fn build(&self) -> Box<dyn RegularizationPolicy> {
        match *self {
            LambdaPolicy::Fixed { value } => Box::new(Fixed(value)),
            LambdaPolicy::Universal { eta } => Box::new(UniversalThreshold { eta }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_universal_threshold() {
        let p = UniversalThreshold { eta: 2.0 };
        // N = 8: sqrt(16 + sqrt(32)) ≈ 4.6500
        assert_relative_eq!(p.lambda(8, 0.5), (16.0 + 32f64.sqrt()).sqrt(), max_relative = 1e-12);
        assert_eq!(Fixed(0.3).lambda(100, 9.0), 0.3);
    }

    #[test]
    fn test_policy_parses_and_validates() {
        let p: LambdaPolicy = serde_json::from_str(r#"{"kind": "fixed", "value": 0.01}"#).unwrap();
        assert_eq!(p, LambdaPolicy::Fixed { value: 0.01 });
        assert_eq!(p.build().name(), "fixed");
        assert!(LambdaPolicy::Universal { eta: -1.0 }.validate().is_err());
    }
}
