//! Faraday transforms between channel space and the Faraday-depth grid.
//!
//! Both implementations realise the same pair of operators:
//!
//! $$ P_c = s_c \sum_j F_j \, e^{2i\phi_j(\lambda^2_c - \lambda^2_0)} $$
//! $$ F_j = \frac{1}{K} \sum_c w_c s_c P_c \, e^{-2i\phi_j(\lambda^2_c - \lambda^2_0)} $$
//!
//! where $w_c$ are inverse-variance weights, $s_c$ the spectral-index scaling
//! and $K = \sum_c w_c s_c^2$. `backward` is the adjoint of `forward` for the
//! weighted channel inner product $\langle a, b \rangle = \sum_c \hat w_c a_c
//! \bar b_c$ with $\hat w = w / K$; it is not an inverse.
//!
//! # Method selection
//!
//! - **Direct** ([`DirectTransform`]): explicit kernel matrix, exact,
//!   $O(N_c N_\phi)$. Ground truth and small grids.
//! - **NUFFT** ([`NufftTransform`]): Gaussian gridding onto an oversampled
//!   regular grid plus FFT, $O((N_c + N_\phi) \log N_\phi)$.

pub mod direct;
pub mod lstsq;
pub mod nufft;

use std::sync::Arc;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::parameter::{complex_to_real, real_to_complex, FaradayParameter, GridPolicy};

pub use direct::DirectTransform;
pub use nufft::NufftTransform;

/// Linear map between channel samples and Faraday-depth spectra.
pub trait Transform: Send + Sync {
    /// Human-readable name of the implementation.
    fn name(&self) -> &str;

    /// Number of channels (length of channel-domain vectors).
    fn n_channels(&self) -> usize;

    /// Number of Faraday-depth samples (length of phi-domain vectors).
    fn n_phi(&self) -> usize;

    /// Normalised channel weights $\hat w = w / K$.
    fn weights(&self) -> &[f64];

    /// Model channel samples for a Faraday spectrum.
    fn forward(&self, x: &[Complex64]) -> Vec<Complex64>;

    /// Weighted adjoint: Faraday spectrum from channel samples.
    fn backward(&self, b: &[Complex64]) -> Vec<Complex64>;

    /// `data - forward(x)`.
    fn residual(&self, x: &[Complex64], data: &[Complex64]) -> Vec<Complex64> {
        self.forward(x)
            .iter()
            .zip(data)
            .map(|(m, d)| d - m)
            .collect()
    }

    /// `forward` applied to a real-stacked spectrum.
    fn forward_real(&self, x: &[f64]) -> Vec<Complex64> {
        self.forward(&real_to_complex(x))
    }

    /// `backward` returning a real-stacked spectrum.
    fn backward_real(&self, b: &[Complex64]) -> Vec<f64> {
        complex_to_real(&self.backward(b))
    }
}

/// Which transform implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    #[serde(alias = "dft")]
    Direct,
    #[serde(alias = "fast")]
    Nufft,
}

impl TransformKind {
    /// Grid rounding that suits this implementation.
    pub fn grid_policy(self) -> GridPolicy {
        match self {
            TransformKind::Direct => GridPolicy::Exact,
            TransformKind::Nufft => GridPolicy::FftFriendly,
        }
    }

    pub fn build(self, dataset: &Dataset, parameter: &FaradayParameter) -> Arc<dyn Transform> {
        match self {
            TransformKind::Direct => Arc::new(DirectTransform::new(dataset, parameter)),
            TransformKind::Nufft => Arc::new(NufftTransform::new(dataset, parameter)),
        }
    }
}

/// Per-channel quantities both implementations need.
#[derive(Debug, Clone)]
pub(crate) struct ChannelGeometry {
    /// `λ²_c − λ²_ref`.
    pub delta_l2: Vec<f64>,
    /// Spectral-index scaling.
    pub s: Vec<f64>,
    /// `w_c / K`.
    pub w_hat: Vec<f64>,
    pub phi: Vec<f64>,
}

impl ChannelGeometry {
    pub fn new(dataset: &Dataset, parameter: &FaradayParameter) -> Self {
        let l2_ref = dataset.l2_ref();
        Self {
            delta_l2: dataset.lambda2().iter().map(|l2| l2 - l2_ref).collect(),
            s: dataset.s().to_vec(),
            w_hat: dataset.normalised_weights(),
            phi: parameter.phi().to_vec(),
        }
    }

    pub fn n_channels(&self) -> usize {
        self.delta_l2.len()
    }

    pub fn n_phi(&self) -> usize {
        self.phi.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parses_aliases() {
        let direct: TransformKind = serde_json::from_str("\"dft\"").unwrap();
        let fast: TransformKind = serde_json::from_str("\"nufft\"").unwrap();
        assert_eq!(direct, TransformKind::Direct);
        assert_eq!(fast, TransformKind::Nufft);
        assert_eq!(fast.grid_policy(), GridPolicy::FftFriendly);
    }
}
