//! Decimated, periodised discrete wavelet transform.
//!
//! One analysis stage maps a signal of even length $N$ to $N/2$ approximation
//! and $N/2$ detail coefficients,
//!
//! $$ a_k = \sum_i h_i x_{(2k+i) \bmod N}, \qquad d_k = \sum_i g_i x_{(2k+i) \bmod N}, $$
//!
//! which is an orthogonal map for an orthonormal filter bank. Synthesis is
//! its transpose, so reconstruction is exact.

use super::filters::Wavelet;
use super::{check_level, Dictionary};
use crate::error::Result;

/// Orthogonal multilevel DWT dictionary.
#[derive(Debug, Clone)]
pub struct DiscreteWavelet {
    wavelet: Wavelet,
    level: usize,
    half_len: usize,
}

impl DiscreteWavelet {
    /// # Arguments
    /// * `name` - Filter bank name, see [`super::filters::AVAILABLE`].
    /// * `level` - Decomposition depth, `None` for the deepest allowed.
    /// * `half_len` - Length of each real-stacked half (the number of
    ///   Faraday-depth samples).
    pub fn new(name: &str, level: Option<usize>, half_len: usize) -> Result<Self> {
        let wavelet = Wavelet::from_name(name)?;
        let max = max_level(&wavelet, half_len);
        let level = check_level(level, max, wavelet.name())?;
        Ok(Self { wavelet, level, half_len })
    }

    fn analyse(&self, x: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; x.len()];
        let mut approx = x.to_vec();
        let mut end = x.len();
        for _ in 0..self.level {
            let (a, d) = analysis_stage(&approx, self.wavelet.dec_lo(), self.wavelet.dec_hi());
            let half = a.len();
            out[half..end].copy_from_slice(&d);
            end = half;
            approx = a;
        }
        out[..end].copy_from_slice(&approx);
        out
    }

    fn synthesise(&self, c: &[f64]) -> Vec<f64> {
        let mut len = c.len() >> self.level;
        let mut approx = c[..len].to_vec();
        for _ in 0..self.level {
            let detail = &c[len..2 * len];
            approx = synthesis_stage(&approx, detail, self.wavelet.dec_lo(), self.wavelet.dec_hi());
            len *= 2;
        }
        approx
    }
}

impl Dictionary for DiscreteWavelet {
    fn name(&self) -> &str {
        self.wavelet.name()
    }

    fn level(&self) -> usize {
        self.level
    }

    fn signal_len(&self) -> usize {
        2 * self.half_len
    }

    fn coefficient_len(&self) -> usize {
        2 * self.half_len
    }

    fn calculate_max_level(&self, len: usize) -> usize {
        max_level(&self.wavelet, len)
    }

    fn decompose(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.signal_len(), "signal length must match the dictionary");
        let (re, im) = x.split_at(self.half_len);
        let mut out = self.analyse(re);
        out.extend(self.analyse(im));
        out
    }

    fn reconstruct(&self, c: &[f64]) -> Vec<f64> {
        assert_eq!(c.len(), self.coefficient_len(), "coefficient length must match the dictionary");
        let (re, im) = c.split_at(self.half_len);
        let mut out = self.synthesise(re);
        out.extend(self.synthesise(im));
        out
    }
}

/// The filter must fit and every intermediate length must stay even.
fn max_level(wavelet: &Wavelet, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    wavelet.max_level(len).min(len.trailing_zeros() as usize)
}

fn analysis_stage(x: &[f64], lo: &[f64], hi: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = x.len();
    let half = n / 2;
    let mut a = vec![0.0; half];
    let mut d = vec![0.0; half];
    for k in 0..half {
        for (i, (&h, &g)) in lo.iter().zip(hi).enumerate() {
            let v = x[(2 * k + i) % n];
            a[k] += h * v;
            d[k] += g * v;
        }
    }
    (a, d)
}

fn synthesis_stage(a: &[f64], d: &[f64], lo: &[f64], hi: &[f64]) -> Vec<f64> {
    let n = 2 * a.len();
    let mut x = vec![0.0; n];
    for k in 0..a.len() {
        for (i, (&h, &g)) in lo.iter().zip(hi).enumerate() {
            x[(2 * k + i) % n] += h * a[k] + g * d[k];
        }
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_haar_single_level() {
        let dict = DiscreteWavelet::new("haar", Some(1), 4).unwrap();
        let c = dict.decompose(&[1.0, 3.0, 2.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
        let r = std::f64::consts::FRAC_1_SQRT_2;
        let expected = [4.0 * r, 4.0 * r, -2.0 * r, 0.0];
        for (got, want) in c[..4].iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
        assert!(c[4..].iter().all(|v| v.abs() < 1e-15));
    }

    #[test]
    fn test_energy_is_preserved() {
        let dict = DiscreteWavelet::new("sym4", None, 64).unwrap();
        let x: Vec<f64> = (0..128).map(|i| ((i * i) as f64 * 0.013).sin()).collect();
        let c = dict.decompose(&x);
        let ex: f64 = x.iter().map(|v| v * v).sum();
        let ec: f64 = c.iter().map(|v| v * v).sum();
        assert_relative_eq!(ex, ec, max_relative = 1e-12);
    }

    #[test]
    fn test_max_level_respects_parity() {
        let dict = DiscreteWavelet::new("haar", None, 96).unwrap();
        assert_eq!(dict.level(), 5);
        assert_eq!(dict.calculate_max_level(96), 5);
        assert!(DiscreteWavelet::new("haar", Some(6), 96).is_err());
    }
}
