//! Faraday-depth grid and solution buffer.
//!
//! The grid is derived from the wavelength-squared sampling of a
//! [`Dataset`]:
//!
//! - cell size $\delta\phi = 1 / (\text{oversampling} \cdot \lambda^2_{\max})$
//! - maximum unambiguous depth $\phi_{\max} = \sqrt{3} / \Delta\lambda^2_{\min}$
//! - RMTF width $\text{FWHM} = 2\sqrt{3} / (\lambda^2_{\max} - \lambda^2_{\min})$
//!
//! The sample count is a multiple of 32 covering $[-\phi_{\max}, \phi_{\max})$,
//! additionally rounded to a 5-smooth multiple for the fast transform.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{FaradayError, Result};

/// Grid sizes above this are rejected as a configuration mistake.
const MAX_GRID_SIZE: usize = 1 << 22;

/// How the number of Faraday-depth samples is rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridPolicy {
    /// Any multiple of 32.
    Exact,
    /// 32 times a 5-smooth integer, so FFT plans stay fast.
    FftFriendly,
}

/// Solution vector in either representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolutionData {
    Complex(Vec<Complex64>),
    /// Real-stacked `[Re..., Im...]` vector, or dictionary coefficients.
    Real(Vec<f64>),
}

impl SolutionData {
    pub fn len(&self) -> usize {
        match self {
            SolutionData::Complex(v) => v.len(),
            SolutionData::Real(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stack a complex vector into `[Re..., Im...]`.
pub fn complex_to_real(z: &[Complex64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(2 * z.len());
    out.extend(z.iter().map(|c| c.re));
    out.extend(z.iter().map(|c| c.im));
    out
}

/// Inverse of [`complex_to_real`]. `x` must have even length.
pub fn real_to_complex(x: &[f64]) -> Vec<Complex64> {
    debug_assert!(x.len() % 2 == 0, "real-stacked vector must have even length");
    let n = x.len() / 2;
    x[..n]
        .iter()
        .zip(&x[n..])
        .map(|(&re, &im)| Complex64::new(re, im))
        .collect()
}

/// Reconstruction grid plus the current solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaradayParameter {
    phi: Vec<f64>,
    cellsize: f64,
    max_faraday_depth: f64,
    max_recoverable_width: f64,
    rmtf_fwhm: f64,
    data: SolutionData,
}

impl FaradayParameter {
    /// Derive the grid from the dataset's wavelength-squared coverage.
    ///
    /// Only channels with non-zero weight contribute. Deterministic: the same
    /// dataset, oversampling and policy always give the same grid.
    pub fn calculate_cellsize(dataset: &Dataset, oversampling: f64, policy: GridPolicy) -> Result<Self> {
        if !(oversampling.is_finite() && oversampling > 0.0) {
            return Err(FaradayError::config(format!(
                "oversampling must be positive, got {}",
                oversampling
            )));
        }

        let mut l2: Vec<f64> = dataset
            .active_channels()
            .into_iter()
            .map(|i| dataset.lambda2()[i])
            .collect();
        l2.sort_by(|a, b| a.total_cmp(b));

        let delta_l2_min = l2
            .windows(2)
            .map(|p| p[1] - p[0])
            .filter(|&d| d > 0.0)
            .fold(f64::INFINITY, f64::min);
        if l2.len() < 2 || !delta_l2_min.is_finite() {
            return Err(FaradayError::InsufficientData { remaining: l2.len(), required: 2 });
        }
        let l2_min = l2[0];
        let l2_max = l2[l2.len() - 1];

        let cellsize = 1.0 / (oversampling * l2_max);
        let max_faraday_depth = 3f64.sqrt() / delta_l2_min;
        let rmtf_fwhm = 2.0 * 3f64.sqrt() / (l2_max - l2_min);
        let max_recoverable_width = std::f64::consts::PI / l2_min;

        // Depths run from -n/2 to n/2 - 1 cells; two spare cells keep +φ_max on the grid.
        let blocks = ((2.0 * max_faraday_depth / cellsize + 2.0) / 32.0).ceil().max(1.0);
        if blocks * 32.0 > MAX_GRID_SIZE as f64 {
            return Err(FaradayError::config(format!(
                "Faraday-depth grid of {:.0} samples exceeds the limit of {}; lower the oversampling",
                blocks * 32.0,
                MAX_GRID_SIZE
            )));
        }
        let blocks = match policy {
            GridPolicy::Exact => blocks as usize,
            GridPolicy::FftFriendly => next_smooth(blocks as usize),
        };
        let n = 32 * blocks;

        let half = (n / 2) as f64;
        let phi = (0..n).map(|j| cellsize * (j as f64 - half)).collect();

        log::debug!(
            "Faraday grid: n={}, dphi={:.4}, phi_max={:.2}, rmtf_fwhm={:.3}",
            n,
            cellsize,
            max_faraday_depth,
            rmtf_fwhm
        );

        Ok(Self {
            phi,
            cellsize,
            max_faraday_depth,
            max_recoverable_width,
            rmtf_fwhm,
            data: SolutionData::Complex(vec![Complex64::new(0.0, 0.0); n]),
        })
    }

    /// Build a parameter on a caller-supplied uniform grid.
    pub fn from_grid(phi: Vec<f64>, rmtf_fwhm: f64) -> Result<Self> {
        if phi.len() < 2 {
            return Err(FaradayError::Shape { what: "phi grid", expected: 2, found: phi.len() });
        }
        let cellsize = phi[1] - phi[0];
        let uniform = phi
            .windows(2)
            .all(|p| ((p[1] - p[0]) - cellsize).abs() <= 1e-9 * cellsize.abs().max(1.0));
        if !(cellsize > 0.0 && uniform) {
            return Err(FaradayError::config("phi grid must be increasing and uniformly spaced"));
        }
        let n = phi.len();
        let max_faraday_depth = phi.iter().fold(0.0_f64, |m, p| m.max(p.abs()));
        Ok(Self {
            phi,
            cellsize,
            max_faraday_depth,
            max_recoverable_width: f64::INFINITY,
            rmtf_fwhm,
            data: SolutionData::Complex(vec![Complex64::new(0.0, 0.0); n]),
        })
    }

    /// Faraday-depth samples (rad/m²).
    pub fn phi(&self) -> &[f64] {
        &self.phi
    }

    /// Number of Faraday-depth samples.
    pub fn n(&self) -> usize {
        self.phi.len()
    }

    pub fn cellsize(&self) -> f64 {
        self.cellsize
    }

    pub fn max_faraday_depth(&self) -> f64 {
        self.max_faraday_depth
    }

    /// Largest Faraday-thick scale the band can recover, `π/λ²_min`.
    pub fn max_recoverable_width(&self) -> f64 {
        self.max_recoverable_width
    }

    pub fn rmtf_fwhm(&self) -> f64 {
        self.rmtf_fwhm
    }

    pub fn data(&self) -> &SolutionData {
        &self.data
    }

    pub fn as_complex(&self) -> Option<&[Complex64]> {
        match &self.data {
            SolutionData::Complex(v) => Some(v),
            SolutionData::Real(_) => None,
        }
    }

    pub fn as_real(&self) -> Option<&[f64]> {
        match &self.data {
            SolutionData::Real(v) => Some(v),
            SolutionData::Complex(_) => None,
        }
    }

    /// Replace the solution with a complex spectrum on this grid.
    pub fn set_complex(&mut self, values: Vec<Complex64>) -> Result<()> {
        if values.len() != self.n() {
            return Err(FaradayError::Shape { what: "complex solution", expected: self.n(), found: values.len() });
        }
        self.data = SolutionData::Complex(values);
        Ok(())
    }

    /// Replace the solution with a real vector (stacked spectrum or coefficients).
    pub fn set_real(&mut self, values: Vec<f64>) {
        self.data = SolutionData::Real(values);
    }

    /// Take the real vector out of the buffer, leaving an empty real vector.
    pub fn take_real(&mut self) -> Option<Vec<f64>> {
        match &mut self.data {
            SolutionData::Real(v) => Some(std::mem::take(v)),
            SolutionData::Complex(_) => None,
        }
    }

    /// Switch the buffer to the real-stacked representation (no-op if already real).
    pub fn complex_data_to_real(&mut self) {
        if let SolutionData::Complex(z) = &self.data {
            self.data = SolutionData::Real(complex_to_real(z));
        }
    }

    /// Switch the buffer back to complex (no-op if already complex).
    pub fn real_data_to_complex(&mut self) -> Result<()> {
        if let SolutionData::Real(x) = &self.data {
            if x.len() != 2 * self.n() {
                return Err(FaradayError::Shape {
                    what: "real-stacked solution",
                    expected: 2 * self.n(),
                    found: x.len(),
                });
            }
            self.data = SolutionData::Complex(real_to_complex(x));
        }
        Ok(())
    }

    /// Convolve the complex solution with the Gaussian restoring beam.
    ///
    /// The beam has the RMTF FWHM and is truncated at ±5σ. With `normalised`
    /// the beam peaks at one, so a delta of amplitude A restores to a peak of
    /// A; otherwise it has unit area.
    pub fn convolve(&self, normalised: bool) -> Result<Vec<Complex64>> {
        let x = self.as_complex().ok_or_else(|| {
            FaradayError::config("convolution needs the complex representation of the solution")
        })?;
        if !(self.rmtf_fwhm.is_finite() && self.rmtf_fwhm > 0.0) {
            return Err(FaradayError::config("RMTF FWHM must be positive to build the restoring beam"));
        }

        let sigma = self.rmtf_fwhm / (2.0 * (2.0 * 2f64.ln()).sqrt());
        let half = ((5.0 * sigma / self.cellsize).ceil() as usize).min(self.n());
        let mut kernel: Vec<f64> = (0..=2 * half)
            .map(|i| {
                let d = (i as f64 - half as f64) * self.cellsize;
                (-0.5 * d * d / (sigma * sigma)).exp()
            })
            .collect();
        if !normalised {
            let area: f64 = kernel.iter().sum();
            kernel.iter_mut().for_each(|k| *k /= area);
        }

        let n = x.len() as isize;
        let h = half as isize;
        let out = (0..n)
            .map(|j| {
                let mut acc = Complex64::new(0.0, 0.0);
                for (t, &kv) in kernel.iter().enumerate() {
                    let src = j + t as isize - h;
                    if (0..n).contains(&src) {
                        acc += x[src as usize] * kv;
                    }
                }
                acc
            })
            .collect();
        Ok(out)
    }

    /// Indices far from the origin (|φ| > φ_max/1.5), free of signal in practice.
    pub fn edge_indices(&self) -> Vec<usize> {
        let limit = self.max_faraday_depth / 1.5;
        self.phi
            .iter()
            .enumerate()
            .filter(|(_, p)| p.abs() > limit)
            .map(|(i, _)| i)
            .collect()
    }

    /// Noise of a spectrum estimated at the grid edges: `0.5 (std Re + std Im)`.
    pub fn edge_noise(&self, spectrum: &[Complex64]) -> f64 {
        let edges = self.edge_indices();
        if edges.len() < 2 {
            return 0.0;
        }
        let re: Vec<f64> = edges.iter().map(|&i| spectrum[i].re).collect();
        let im: Vec<f64> = edges.iter().map(|&i| spectrum[i].im).collect();
        0.5 * (std_dev(&re) + std_dev(&im))
    }
}

/// Population standard deviation.
pub(crate) fn std_dev(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    (x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt()
}

/// Smallest integer >= m whose only prime factors are 2, 3 and 5.
fn next_smooth(m: usize) -> usize {
    let mut candidate = m.max(1);
    loop {
        let mut r = candidate;
        for p in [2, 3, 5] {
            while r % p == 0 {
                r /= p;
            }
        }
        if r == 1 {
            return candidate;
        }
        candidate += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lband() -> Dataset {
        let nu: Vec<f64> = (0..32).map(|i| 1.0e9 + i as f64 * 3.2e7).collect();
        Dataset::with_uniform_noise(nu, 1.0, None, None).unwrap()
    }

    #[test]
    fn test_next_smooth() {
        assert_eq!(next_smooth(1), 1);
        assert_eq!(next_smooth(7), 8);
        assert_eq!(next_smooth(11), 12);
        assert_eq!(next_smooth(31), 32);
        assert_eq!(next_smooth(49), 50);
    }

    #[test]
    fn test_grid_geometry() {
        let ds = lband();
        let p = FaradayParameter::calculate_cellsize(&ds, 8.0, GridPolicy::Exact).unwrap();
        let l2_max = ds.lambda2().iter().cloned().fold(0.0, f64::max);
        assert_relative_eq!(p.cellsize(), 1.0 / (8.0 * l2_max), max_relative = 1e-12);
        assert_eq!(p.n() % 32, 0);
        assert_eq!(p.phi()[p.n() / 2], 0.0);
        assert!(p.phi()[0] <= -p.max_faraday_depth());
        for w in p.phi().windows(2) {
            assert_relative_eq!(w[1] - w[0], p.cellsize(), max_relative = 1e-9);
        }
    }

    #[test]
    fn test_grid_covers_both_ends() {
        let ds = lband();
        for policy in [GridPolicy::Exact, GridPolicy::FftFriendly] {
            for oversampling in [1.0, 4.0, 8.0, 10.0] {
                let p = FaradayParameter::calculate_cellsize(&ds, oversampling, policy).unwrap();
                let phi = p.phi();
                assert!(phi[0] <= -p.max_faraday_depth());
                assert!(phi[phi.len() - 1] >= p.max_faraday_depth(), "os {} last {}", oversampling, phi[phi.len() - 1]);
                assert_relative_eq!(phi[0] + phi[phi.len() - 1], -p.cellsize(), max_relative = 1e-6);
            }
        }
    }

    #[test]
    fn test_grid_is_deterministic_and_fft_policy_is_smooth() {
        let ds = lband();
        let a = FaradayParameter::calculate_cellsize(&ds, 8.0, GridPolicy::FftFriendly).unwrap();
        let b = FaradayParameter::calculate_cellsize(&ds, 8.0, GridPolicy::FftFriendly).unwrap();
        assert_eq!(a.phi(), b.phi());
        let m = a.n() / 32;
        assert_eq!(next_smooth(m), m);
        let exact = FaradayParameter::calculate_cellsize(&ds, 8.0, GridPolicy::Exact).unwrap();
        assert!(a.n() >= exact.n());
    }

    #[test]
    fn test_invalid_oversampling() {
        let err = FaradayParameter::calculate_cellsize(&lband(), 0.0, GridPolicy::Exact).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_representation_round_trip_is_exact() {
        let mut p = FaradayParameter::from_grid((0..8).map(|i| i as f64 - 4.0).collect(), 2.0).unwrap();
        let z: Vec<Complex64> = (0..8).map(|i| Complex64::new(i as f64 * 0.1, -(i as f64) / 3.0)).collect();
        p.set_complex(z.clone()).unwrap();
        p.complex_data_to_real();
        assert_eq!(p.as_real().unwrap().len(), 16);
        p.real_data_to_complex().unwrap();
        assert_eq!(p.as_complex().unwrap(), z.as_slice());
    }

    #[test]
    fn test_real_to_complex_rejects_coefficient_lengths() {
        let mut p = FaradayParameter::from_grid((0..8).map(|i| i as f64).collect(), 2.0).unwrap();
        p.set_real(vec![0.0; 24]);
        assert!(p.real_data_to_complex().is_err());
    }

    #[test]
    fn test_convolve_preserves_delta_amplitude() {
        let phi: Vec<f64> = (0..64).map(|i| i as f64 - 32.0).collect();
        let mut p = FaradayParameter::from_grid(phi, 6.0).unwrap();
        let mut z = vec![Complex64::new(0.0, 0.0); 64];
        z[32] = Complex64::new(3.0, -4.0);
        p.set_complex(z).unwrap();
        let restored = p.convolve(true).unwrap();
        assert_relative_eq!(restored[32].norm(), 5.0, max_relative = 1e-12);
        // Half maximum three cells away for a FWHM of six cells.
        assert_relative_eq!(restored[35].norm(), 2.5, max_relative = 1e-9);
    }
}
