//! Wavelet dictionaries acting on real-stacked Faraday spectra.
//!
//! A real-stacked vector `[Re..., Im...]` is treated as two independent
//! halves. Each half is decomposed separately and the coefficient vectors are
//! concatenated, so a dictionary built for `n` depth samples maps `2n` values
//! to [`Dictionary::coefficient_len`] coefficients.
//!
//! - [`DiscreteWavelet`]: decimated and orthogonal; exact round trip and as
//!   many coefficients as samples.
//! - [`UndecimatedWavelet`]: stationary with zero boundary; `(J + 1)`-fold
//!   redundant and inexact near the grid edges.
//!
//! For both, `reconstruct` is the adjoint of `decompose`.

pub mod discrete;
pub mod filters;
pub mod undecimated;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FaradayError, Result};

pub use discrete::DiscreteWavelet;
pub use filters::Wavelet;
pub use undecimated::UndecimatedWavelet;

/// Sparsifying basis for Faraday spectra.
pub trait Dictionary: Send + Sync {
    /// Filter bank name.
    fn name(&self) -> &str;

    /// Decomposition depth in use.
    fn level(&self) -> usize;

    /// Length of the real-stacked signals this dictionary accepts.
    fn signal_len(&self) -> usize;

    /// Length of the coefficient vectors it produces.
    fn coefficient_len(&self) -> usize;

    /// Deepest level admissible for a half-signal of length `len`.
    fn calculate_max_level(&self, len: usize) -> usize;

    /// Analysis: real-stacked signal to coefficients.
    ///
    /// # Panics
    /// If `x.len() != self.signal_len()`.
    fn decompose(&self, x: &[f64]) -> Vec<f64>;

    /// Synthesis: coefficients to real-stacked signal.
    ///
    /// # Panics
    /// If `c.len() != self.coefficient_len()`.
    fn reconstruct(&self, c: &[f64]) -> Vec<f64>;
}

/// Decimated or undecimated transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveletMode {
    #[default]
    Decimated,
    #[serde(alias = "swt", alias = "atrous")]
    Undecimated,
}

/// User-facing wavelet choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveletConfig {
    pub name: String,
    /// `None` selects the deepest admissible level.
    #[serde(default)]
    pub level: Option<usize>,
    #[serde(default)]
    pub mode: WaveletMode,
}

impl WaveletConfig {
    pub fn new(name: impl Into<String>, level: Option<usize>, mode: WaveletMode) -> Self {
        Self { name: name.into(), level, mode }
    }

    /// Check the name without knowing the grid size.
    pub fn validate(&self) -> Result<()> {
        Wavelet::from_name(&self.name).map(|_| ())
    }

    /// Build the dictionary for a grid of `n_phi` depth samples.
    pub fn build(&self, n_phi: usize) -> Result<Arc<dyn Dictionary>> {
        let dict: Arc<dyn Dictionary> = match self.mode {
            WaveletMode::Decimated => Arc::new(DiscreteWavelet::new(&self.name, self.level, n_phi)?),
            WaveletMode::Undecimated => Arc::new(UndecimatedWavelet::new(&self.name, self.level, n_phi)?),
        };
        log::debug!(
            "Built {:?} '{}' dictionary: level {}, {} coefficients",
            self.mode,
            dict.name(),
            dict.level(),
            dict.coefficient_len()
        );
        Ok(dict)
    }
}

/// Resolve a requested level against the admissible maximum.
pub(crate) fn check_level(requested: Option<usize>, max: usize, name: &str) -> Result<usize> {
    match requested {
        None => Ok(max),
        Some(level) if level <= max => Ok(level),
        Some(level) => Err(FaradayError::config(format!(
            "wavelet '{}' supports at most {} levels here, {} requested",
            name, max, level
        ))),
    }
}
