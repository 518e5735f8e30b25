//! Per-channel measurement container.
//!
//! A [`Dataset`] holds the frequency, noise and (optionally) the complex
//! polarisation sample `P = Q + iU` of every channel of one line of sight,
//! together with the quantities derived from them: wavelength squared,
//! inverse-variance weights, spectral-index scaling and the weighted reference
//! wavelength squared.
//!
//! Datasets are immutable once built. Flagging produces a new dataset via
//! [`Dataset::select`] or [`Dataset::with_zero_weights`].

use num_complex::Complex64;
use serde::Serialize;

use crate::error::{FaradayError, Result};

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Channel data of a single line of sight.
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    nu: Vec<f64>,
    lambda2: Vec<f64>,
    sigma: Vec<f64>,
    w: Vec<f64>,
    s: Vec<f64>,
    data: Option<Vec<Complex64>>,
    spectral_index: f64,
    l2_ref: f64,
    k: f64,
}

impl Dataset {
    /// Build a dataset from raw per-channel arrays.
    ///
    /// # Arguments
    /// * `nu` - Channel frequencies (Hz), strictly positive.
    /// * `sigma` - Noise standard deviation per channel. Channels with
    ///   `sigma <= 0` or a non-finite value get zero weight.
    /// * `data` - Complex polarisation samples `Q + iU`, one per channel.
    ///   Non-finite samples are zeroed and their channel gets zero weight.
    /// * `spectral_index` - Spectral index α of the total intensity; the
    ///   transform scales channels by `(ν/ν_ref)^(-α)`.
    pub fn new(
        nu: Vec<f64>,
        sigma: Vec<f64>,
        data: Option<Vec<Complex64>>,
        spectral_index: Option<f64>,
    ) -> Result<Self> {
        let n = nu.len();
        if n == 0 {
            return Err(FaradayError::InsufficientData { remaining: 0, required: 1 });
        }
        if sigma.len() != n {
            return Err(FaradayError::Shape { what: "sigma", expected: n, found: sigma.len() });
        }
        if let Some(d) = &data {
            if d.len() != n {
                return Err(FaradayError::Shape { what: "data", expected: n, found: d.len() });
            }
        }
        if let Some(bad) = nu.iter().find(|&&f| !(f.is_finite() && f > 0.0)) {
            return Err(FaradayError::config(format!(
                "channel frequencies must be positive and finite, got {}",
                bad
            )));
        }
        let alpha = spectral_index.unwrap_or(0.0);
        if !alpha.is_finite() {
            return Err(FaradayError::config("spectral index must be finite"));
        }

        let mut w: Vec<f64> = sigma
            .iter()
            .map(|&s| if s.is_finite() && s > 0.0 { 1.0 / (s * s) } else { 0.0 })
            .collect();

        let data = data.map(|mut d| {
            for (c, p) in d.iter_mut().enumerate() {
                if !(p.re.is_finite() && p.im.is_finite()) {
                    *p = Complex64::new(0.0, 0.0);
                    w[c] = 0.0;
                }
            }
            d
        });

        Self::from_weights(nu, sigma, w, data, alpha)
    }

    /// Build a dataset with the same noise level on every channel.
    pub fn with_uniform_noise(
        nu: Vec<f64>,
        sigma: f64,
        data: Option<Vec<Complex64>>,
        spectral_index: Option<f64>,
    ) -> Result<Self> {
        let sigma = vec![sigma; nu.len()];
        Self::new(nu, sigma, data, spectral_index)
    }

    fn from_weights(
        nu: Vec<f64>,
        sigma: Vec<f64>,
        w: Vec<f64>,
        data: Option<Vec<Complex64>>,
        spectral_index: f64,
    ) -> Result<Self> {
        let lambda2: Vec<f64> = nu
            .iter()
            .map(|&f| {
                let l = SPEED_OF_LIGHT / f;
                l * l
            })
            .collect();

        let sum_w: f64 = w.iter().sum();
        if !(sum_w > 0.0) {
            return Err(FaradayError::InsufficientData { remaining: 0, required: 1 });
        }
        let l2_ref = w.iter().zip(&lambda2).map(|(wi, l2)| wi * l2).sum::<f64>() / sum_w;

        let s: Vec<f64> = if spectral_index == 0.0 {
            vec![1.0; nu.len()]
        } else {
            let nu_ref = SPEED_OF_LIGHT / l2_ref.sqrt();
            nu.iter().map(|&f| (f / nu_ref).powf(-spectral_index)).collect()
        };
        let k = w.iter().zip(&s).map(|(wi, si)| wi * si * si).sum();

        Ok(Self {
            nu,
            lambda2,
            sigma,
            w,
            s,
            data,
            spectral_index,
            l2_ref,
            k,
        })
    }

    /// Keep only the given channels (in the given order).
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(FaradayError::Shape { what: "channel index", expected: self.len(), found: bad });
        }
        let pick = |v: &[f64]| indices.iter().map(|&i| v[i]).collect::<Vec<_>>();
        let data = self
            .data
            .as_ref()
            .map(|d| indices.iter().map(|&i| d[i]).collect());
        Self::from_weights(
            pick(&self.nu),
            pick(&self.sigma),
            pick(&self.w),
            data,
            self.spectral_index,
        )
    }

    /// Copy of the dataset with the given channels weighted zero.
    pub fn with_zero_weights(&self, indices: &[usize]) -> Result<Self> {
        let mut w = self.w.clone();
        for &i in indices {
            if i >= w.len() {
                return Err(FaradayError::Shape { what: "channel index", expected: w.len(), found: i });
            }
            w[i] = 0.0;
        }
        Self::from_weights(
            self.nu.clone(),
            self.sigma.clone(),
            w,
            self.data.clone(),
            self.spectral_index,
        )
    }

    /// Copy of the dataset (weights included) carrying new polarisation samples.
    pub fn with_data(&self, data: Vec<Complex64>) -> Result<Self> {
        if data.len() != self.len() {
            return Err(FaradayError::Shape { what: "data", expected: self.len(), found: data.len() });
        }
        Self::from_weights(
            self.nu.clone(),
            self.sigma.clone(),
            self.w.clone(),
            Some(data),
            self.spectral_index,
        )
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.nu.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nu.is_empty()
    }

    pub fn nu(&self) -> &[f64] {
        &self.nu
    }

    /// Wavelength squared per channel (m²).
    pub fn lambda2(&self) -> &[f64] {
        &self.lambda2
    }

    pub fn sigma(&self) -> &[f64] {
        &self.sigma
    }

    /// Inverse-variance weights `1/σ²` (zero for excluded channels).
    pub fn w(&self) -> &[f64] {
        &self.w
    }

    /// Spectral-index scaling per channel.
    pub fn s(&self) -> &[f64] {
        &self.s
    }

    /// Weight normaliser `Σ w s²`.
    pub fn k(&self) -> f64 {
        self.k
    }

    /// Weighted mean wavelength squared.
    pub fn l2_ref(&self) -> f64 {
        self.l2_ref
    }

    pub fn spectral_index(&self) -> f64 {
        self.spectral_index
    }

    pub fn data(&self) -> Option<&[Complex64]> {
        self.data.as_deref()
    }

    /// Polarisation samples, or an error for a noise-only dataset.
    pub fn require_data(&self) -> Result<&[Complex64]> {
        self.data().ok_or_else(|| FaradayError::config("dataset carries no polarisation samples"))
    }

    /// Weights normalised by [`Dataset::k`].
    pub fn normalised_weights(&self) -> Vec<f64> {
        self.w.iter().map(|wi| wi / self.k).collect()
    }

    /// Indices of channels with non-zero weight.
    pub fn active_channels(&self) -> Vec<usize> {
        self.w
            .iter()
            .enumerate()
            .filter(|(_, &wi)| wi > 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    /// Expected noise of the weighted channel average, `1/sqrt(Σw)`.
    pub fn theoretical_noise(&self) -> f64 {
        1.0 / self.w.iter().sum::<f64>().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn freqs(n: usize) -> Vec<f64> {
        (0..n).map(|i| 1.0e9 + i as f64 * 1.0e7).collect()
    }

    #[test]
    fn test_lambda2_and_weights() {
        let ds = Dataset::new(freqs(4), vec![0.5, 1.0, 0.0, 2.0], None, None).unwrap();
        assert_relative_eq!(ds.lambda2()[0], (SPEED_OF_LIGHT / 1.0e9).powi(2), max_relative = 1e-14);
        assert_eq!(ds.w(), &[4.0, 1.0, 0.0, 0.25]);
        assert_eq!(ds.active_channels(), vec![0, 1, 3]);
        assert_relative_eq!(ds.k(), 5.25);
    }

    #[test]
    fn test_l2_ref_is_weighted_mean() {
        let ds = Dataset::new(freqs(3), vec![1.0, 1.0, 0.0], None, None).unwrap();
        let expected = 0.5 * (ds.lambda2()[0] + ds.lambda2()[1]);
        assert_relative_eq!(ds.l2_ref(), expected, max_relative = 1e-14);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let err = Dataset::new(freqs(4), vec![1.0; 3], None, None).unwrap_err();
        assert!(matches!(err, FaradayError::Shape { what: "sigma", .. }));
    }

    #[test]
    fn test_all_zero_weights_is_insufficient() {
        let err = Dataset::new(freqs(3), vec![0.0; 3], None, None).unwrap_err();
        assert!(matches!(err, FaradayError::InsufficientData { .. }));
    }

    #[test]
    fn test_non_finite_samples_are_excluded() {
        let data = vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(f64::NAN, 0.0),
            Complex64::new(0.5, 0.5),
        ];
        let ds = Dataset::with_uniform_noise(freqs(3), 1.0, Some(data), None).unwrap();
        assert_eq!(ds.w()[1], 0.0);
        assert_eq!(ds.data().unwrap()[1], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_select_and_zero_weights_do_not_mutate() {
        let ds = Dataset::with_uniform_noise(freqs(5), 1.0, None, None).unwrap();
        let kept = ds.select(&[0, 2, 4]).unwrap();
        let masked = ds.with_zero_weights(&[1, 3]).unwrap();
        assert_eq!(ds.len(), 5);
        assert_eq!(kept.len(), 3);
        assert_eq!(masked.len(), 5);
        assert_eq!(masked.active_channels(), vec![0, 2, 4]);
        assert_relative_eq!(kept.l2_ref(), masked.l2_ref(), max_relative = 1e-14);
    }

    #[test]
    fn test_spectral_scaling_is_unity_at_reference() {
        let ds = Dataset::with_uniform_noise(freqs(8), 1.0, None, Some(-0.7)).unwrap();
        let nu_ref = SPEED_OF_LIGHT / ds.l2_ref().sqrt();
        for (f, s) in ds.nu().iter().zip(ds.s()) {
            assert_relative_eq!(*s, (f / nu_ref).powf(0.7), max_relative = 1e-12);
        }
    }
}
