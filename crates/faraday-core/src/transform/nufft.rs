//! Non-uniform fast Faraday transform.
//!
//! Gaussian-gridding NUFFT (Greengard & Lee, *SIAM Review* **46**, 443, 2004).
//! Each channel maps to a point $x_c = 2\delta\phi(\lambda^2_c - \lambda^2_0)$
//! on the unit circle and the Faraday grid to integer modes
//! $k = j - N/2$, so that
//!
//! - `backward` is a type-1 transform: spread weighted samples onto an
//!   oversampled grid of $M = RN$ points with a periodic Gaussian, FFT, then
//!   divide out the kernel's Fourier coefficients $\sqrt{\tau/\pi}e^{-k^2\tau}$;
//! - `forward` is the matching type-2 transform: pre-divide, inverse FFT,
//!   interpolate back to the channel points with the same Gaussian.
//!
//! With $R = 2$ and 12 points per side the result agrees with the direct
//! transform to ~1e-10.

use std::f64::consts::PI;
use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftDirection, FftPlanner};

use super::{ChannelGeometry, Transform};
use crate::dataset::Dataset;
use crate::parameter::FaradayParameter;

/// Oversampling ratio of the regular grid.
const GRID_RATIO: usize = 2;
/// Gaussian support, grid points per side.
const SPREAD: usize = 12;

/// NUFFT-based Faraday transform with cached FFT plans.
pub struct NufftTransform {
    geometry: ChannelGeometry,
    n_modes: usize,
    grid_len: usize,
    /// Phase of the grid centre, `exp(2i φ_centre Δλ²_c)`.
    centre_phase: Vec<Complex64>,
    /// First grid index touched by each channel.
    base: Vec<isize>,
    /// `2 * SPREAD` Gaussian weights per channel.
    kernel: Vec<f64>,
    /// `sqrt(π/τ) exp(k²τ)` per mode, already divided by the grid length.
    deconv: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
    ifft: Arc<dyn Fft<f64>>,
}

impl NufftTransform {
    pub fn new(dataset: &Dataset, parameter: &FaradayParameter) -> Self {
        let geometry = ChannelGeometry::new(dataset, parameter);
        let n_modes = geometry.n_phi();
        let grid_len = (GRID_RATIO * n_modes).max(4 * SPREAD);
        let ratio = grid_len as f64 / n_modes as f64;
        let tau = PI * SPREAD as f64 / ((n_modes * n_modes) as f64 * ratio * (ratio - 0.5));

        let dphi = parameter.cellsize();
        let half = (n_modes / 2) as f64;
        let phi_centre = geometry.phi[0] + half * dphi;

        let h = 2.0 * PI / grid_len as f64;
        let nc = geometry.n_channels();
        let mut centre_phase = Vec::with_capacity(nc);
        let mut base = Vec::with_capacity(nc);
        let mut kernel = Vec::with_capacity(nc * 2 * SPREAD);
        for &dl2 in &geometry.delta_l2 {
            centre_phase.push(Complex64::new(0.0, 2.0 * phi_centre * dl2).exp());

            let x = wrap_to_pi(2.0 * dphi * dl2);
            let m0 = (x / h).floor() as isize;
            let first = m0 - SPREAD as isize + 1;
            base.push(first);
            for t in 0..2 * SPREAD as isize {
                let d = x - (first + t) as f64 * h;
                kernel.push((-d * d / (4.0 * tau)).exp());
            }
        }

        let scale = (PI / tau).sqrt() / grid_len as f64;
        let deconv = (0..n_modes)
            .map(|j| {
                let k = j as f64 - half;
                scale * (k * k * tau).exp()
            })
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft(grid_len, FftDirection::Forward);
        let ifft = planner.plan_fft(grid_len, FftDirection::Inverse);

        log::debug!(
            "NUFFT plan: {} channels, {} modes, grid {} (tau={:.3e})",
            nc,
            n_modes,
            grid_len,
            tau
        );

        Self {
            geometry,
            n_modes,
            grid_len,
            centre_phase,
            base,
            kernel,
            deconv,
            fft,
            ifft,
        }
    }

    /// Grid slot of mode index `j` (mode `k = j - N/2`).
    #[inline]
    fn slot(&self, j: usize) -> usize {
        let k = j as isize - (self.n_modes / 2) as isize;
        k.rem_euclid(self.grid_len as isize) as usize
    }

    #[inline]
    fn grid_index(&self, c: usize, t: usize) -> usize {
        (self.base[c] + t as isize).rem_euclid(self.grid_len as isize) as usize
    }
}

impl Transform for NufftTransform {
    fn name(&self) -> &str {
        "NUFFT Faraday transform"
    }

    fn n_channels(&self) -> usize {
        self.geometry.n_channels()
    }

    fn n_phi(&self) -> usize {
        self.n_modes
    }

    fn weights(&self) -> &[f64] {
        &self.geometry.w_hat
    }

    fn forward(&self, x: &[Complex64]) -> Vec<Complex64> {
        assert_eq!(x.len(), self.n_modes, "spectrum length must match the phi grid");

        let mut grid = vec![Complex64::new(0.0, 0.0); self.grid_len];
        for (j, (&f, &d)) in x.iter().zip(&self.deconv).enumerate() {
            grid[self.slot(j)] = f * d;
        }
        self.ifft.process(&mut grid);

        (0..self.n_channels())
            .map(|c| {
                let weights = &self.kernel[c * 2 * SPREAD..(c + 1) * 2 * SPREAD];
                let acc: Complex64 = weights
                    .iter()
                    .enumerate()
                    .map(|(t, &g)| grid[self.grid_index(c, t)] * g)
                    .sum();
                acc * self.centre_phase[c] * self.geometry.s[c]
            })
            .collect()
    }

    fn backward(&self, b: &[Complex64]) -> Vec<Complex64> {
        assert_eq!(b.len(), self.n_channels(), "sample count must match the channel count");

        let mut grid = vec![Complex64::new(0.0, 0.0); self.grid_len];
        for (c, &bc) in b.iter().enumerate() {
            let q = bc * self.centre_phase[c].conj() * (self.geometry.w_hat[c] * self.geometry.s[c]);
            if q == Complex64::new(0.0, 0.0) {
                continue;
            }
            let weights = &self.kernel[c * 2 * SPREAD..(c + 1) * 2 * SPREAD];
            for (t, &g) in weights.iter().enumerate() {
                let idx = self.grid_index(c, t);
                grid[idx] += q * g;
            }
        }
        self.fft.process(&mut grid);

        (0..self.n_modes)
            .map(|j| grid[self.slot(j)] * self.deconv[j])
            .collect()
    }
}

/// Map an angle to [-π, π).
fn wrap_to_pi(x: f64) -> f64 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}
