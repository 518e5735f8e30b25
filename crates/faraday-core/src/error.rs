//! Error taxonomy shared by every stage of a reconstruction.
//!
//! Configuration problems are fatal for a whole run and are raised before any
//! iteration starts. Everything else is local to one line of sight: the caller
//! marks the pixel as failed and carries on with the rest of the cube.

use thiserror::Error;

/// Errors raised by the reconstruction core.
#[derive(Debug, Error)]
pub enum FaradayError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Insufficient data: {remaining} usable channels left, at least {required} required")]
    InsufficientData { remaining: usize, required: usize },

    #[error("Numerical divergence at iteration {iteration}: objective value {value}")]
    NumericalDivergence { iteration: usize, value: f64 },

    #[error("Shape mismatch for {what}: expected {expected}, found {found}")]
    Shape {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Linear algebra error: {0}")]
    LinAlg(String),
}

impl FaradayError {
    /// Whether the error must abort the whole run rather than a single pixel.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FaradayError::Configuration(_))
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        FaradayError::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, FaradayError>;
