//! Undecimated (à trous) wavelet transform with zero boundary.
//!
//! Level $j$ filters the previous approximation with the bank upsampled by
//! $2^{j-1}$ and scaled by $1/\sqrt{2}$, keeping every sample:
//!
//! $$ a^{j}_n = \tfrac{1}{\sqrt 2}\sum_i h_i\, a^{j-1}_{n + 2^{j-1}(i - c)}, \qquad
//!    d^{j}_n = \tfrac{1}{\sqrt 2}\sum_i g_i\, a^{j-1}_{n + 2^{j-1}(i - c)} $$
//!
//! with samples outside the signal taken as zero. On an infinite signal the
//! analysis is a tight frame and its adjoint is the exact inverse. Here the
//! adjoint is still used for reconstruction, so energy leaking past the
//! boundaries is lost and the round-trip error grows with the level.

use std::f64::consts::FRAC_1_SQRT_2;

use super::filters::Wavelet;
use super::{check_level, Dictionary};
use crate::error::Result;

/// Redundant stationary wavelet dictionary, `(J + 1)` coefficients per sample.
#[derive(Debug, Clone)]
pub struct UndecimatedWavelet {
    wavelet: Wavelet,
    level: usize,
    half_len: usize,
}

impl UndecimatedWavelet {
    pub fn new(name: &str, level: Option<usize>, half_len: usize) -> Result<Self> {
        let wavelet = Wavelet::from_name(name)?;
        let max = wavelet.max_level(half_len);
        let level = check_level(level, max, wavelet.name())?;
        Ok(Self { wavelet, level, half_len })
    }

    fn centre(&self) -> isize {
        (self.wavelet.len() / 2) as isize - 1
    }

    /// One stage: `out[n] = Σ_i f_i x[n + s(i - c)] / √2`.
    fn filter(&self, x: &[f64], f: &[f64], stride: isize) -> Vec<f64> {
        let n = x.len() as isize;
        let c = self.centre();
        (0..n)
            .map(|p| {
                f.iter()
                    .enumerate()
                    .filter_map(|(i, &fi)| {
                        let src = p + stride * (i as isize - c);
                        (0..n).contains(&src).then(|| fi * x[src as usize])
                    })
                    .sum::<f64>()
                    * FRAC_1_SQRT_2
            })
            .collect()
    }

    /// Transpose of [`Self::filter`], accumulated into `out`.
    fn filter_adjoint(&self, y: &[f64], f: &[f64], stride: isize, out: &mut [f64]) {
        let n = y.len() as isize;
        let c = self.centre();
        for p in 0..n {
            let v = y[p as usize] * FRAC_1_SQRT_2;
            if v == 0.0 {
                continue;
            }
            for (i, &fi) in f.iter().enumerate() {
                let dst = p + stride * (i as isize - c);
                if (0..n).contains(&dst) {
                    out[dst as usize] += fi * v;
                }
            }
        }
    }

    fn analyse(&self, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        let mut out = vec![0.0; (self.level + 1) * n];
        let mut approx = x.to_vec();
        for j in 0..self.level {
            let stride = 1isize << j;
            let d = self.filter(&approx, self.wavelet.dec_hi(), stride);
            let slot = self.level - j;
            out[slot * n..(slot + 1) * n].copy_from_slice(&d);
            approx = self.filter(&approx, self.wavelet.dec_lo(), stride);
        }
        out[..n].copy_from_slice(&approx);
        out
    }

    fn synthesise(&self, c: &[f64]) -> Vec<f64> {
        let n = self.half_len;
        let mut approx = c[..n].to_vec();
        for j in (0..self.level).rev() {
            let stride = 1isize << j;
            let slot = self.level - j;
            let mut prev = vec![0.0; n];
            self.filter_adjoint(&approx, self.wavelet.dec_lo(), stride, &mut prev);
            self.filter_adjoint(&c[slot * n..(slot + 1) * n], self.wavelet.dec_hi(), stride, &mut prev);
            approx = prev;
        }
        approx
    }
}

impl Dictionary for UndecimatedWavelet {
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
        2 * (self.level + 1) * self.half_len
    }

    fn calculate_max_level(&self, len: usize) -> usize {
        self.wavelet.max_level(len)
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
        let (re, im) = c.split_at(self.coefficient_len() / 2);
        let mut out = self.synthesise(re);
        out.extend(self.synthesise(im));
        out
    }
}
