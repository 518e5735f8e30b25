//! Direct Faraday transform.
//!
//! Precomputes the $N_c \times N_\phi$ kernel
//! $E_{cj} = e^{2i\phi_j(\lambda^2_c - \lambda^2_0)}$ once and applies it by
//! explicit summation. Exact to rounding; memory and time are
//! $O(N_c N_\phi)$, so it serves as ground truth and for small grids.

use ndarray::{Array1, Array2};
use num_complex::Complex64;

use super::lstsq::solve_dense;
use super::{ChannelGeometry, Transform};
use crate::dataset::Dataset;
use crate::error::{FaradayError, Result};
use crate::parameter::FaradayParameter;

/// Explicit-sum Faraday transform.
pub struct DirectTransform {
    geometry: ChannelGeometry,
    kernel: Array2<Complex64>,
}

impl DirectTransform {
    pub fn new(dataset: &Dataset, parameter: &FaradayParameter) -> Self {
        let geometry = ChannelGeometry::new(dataset, parameter);
        let kernel = Array2::from_shape_fn((geometry.n_channels(), geometry.n_phi()), |(c, j)| {
            Complex64::new(0.0, 2.0 * geometry.phi[j] * geometry.delta_l2[c]).exp()
        });
        Self { geometry, kernel }
    }

    /// Weighted least-squares spectrum minimising $\sum_c \hat w_c |P_c - (AF)_c|^2$.
    ///
    /// Solves the dense normal equations $(A^H \hat W A) F = A^H \hat W P$ by
    /// LU decomposition. Only meaningful when the system is over-determined
    /// (more weighted channels than depth samples); intended for small grids.
    pub fn least_squares(&self, data: &[Complex64]) -> Result<Vec<Complex64>> {
        let (nc, np) = self.kernel.dim();
        if data.len() != nc {
            return Err(FaradayError::Shape { what: "data", expected: nc, found: data.len() });
        }

        // Rows of A = s_c E_c, weighted by ŵ_c.
        let mut normal = Array2::<Complex64>::zeros((np, np));
        let mut rhs = Array1::<Complex64>::zeros(np);
        for c in 0..nc {
            let wc = self.geometry.w_hat[c];
            if wc == 0.0 {
                continue;
            }
            let sc = self.geometry.s[c];
            let row = self.kernel.row(c);
            for j in 0..np {
                let a_cj = row[j].conj() * (wc * sc);
                rhs[j] += a_cj * data[c];
                for k in 0..np {
                    normal[[j, k]] += a_cj * row[k] * sc;
                }
            }
        }

        Ok(solve_dense(&normal, &rhs)?.to_vec())
    }
}

impl Transform for DirectTransform {
    fn name(&self) -> &str {
        "Direct Faraday transform"
    }

    fn n_channels(&self) -> usize {
        self.geometry.n_channels()
    }

    fn n_phi(&self) -> usize {
        self.geometry.n_phi()
    }

    fn weights(&self) -> &[f64] {
        &self.geometry.w_hat
    }

    fn forward(&self, x: &[Complex64]) -> Vec<Complex64> {
        assert_eq!(x.len(), self.n_phi(), "spectrum length must match the phi grid");
        self.kernel
            .rows()
            .into_iter()
            .zip(&self.geometry.s)
            .map(|(row, &sc)| {
                let acc: Complex64 = row.iter().zip(x).map(|(e, f)| e * f).sum();
                acc * sc
            })
            .collect()
    }

    fn backward(&self, b: &[Complex64]) -> Vec<Complex64> {
        assert_eq!(b.len(), self.n_channels(), "sample count must match the channel count");
        let mut out = vec![Complex64::new(0.0, 0.0); self.n_phi()];
        for (c, row) in self.kernel.rows().into_iter().enumerate() {
            let q = b[c] * (self.geometry.w_hat[c] * self.geometry.s[c]);
            if q == Complex64::new(0.0, 0.0) {
                continue;
            }
            for (o, e) in out.iter_mut().zip(row.iter()) {
                *o += e.conj() * q;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn setup() -> (Dataset, FaradayParameter) {
        let nu: Vec<f64> = (0..24).map(|i| 1.1e9 + i as f64 * 2.5e7).collect();
        let ds = Dataset::with_uniform_noise(nu, 1.0, None, None).unwrap();
        let phi: Vec<f64> = (0..16).map(|j| (j as f64 - 8.0) * 80.0).collect();
        let par = FaradayParameter::from_grid(phi, 80.0).unwrap();
        (ds, par)
    }

    #[test]
    fn test_delta_round_trips_to_unit_peak() {
        let (ds, par) = setup();
        let dft = DirectTransform::new(&ds, &par);
        let mut x = vec![Complex64::new(0.0, 0.0); par.n()];
        x[11] = Complex64::new(0.6, -0.8);
        let dirty = dft.backward(&dft.forward(&x));
        assert_relative_eq!(dirty[11].re, 0.6, epsilon = 1e-12);
        assert_relative_eq!(dirty[11].im, -0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_least_squares_recovers_exact_spectrum() {
        let (ds, par) = setup();
        let dft = DirectTransform::new(&ds, &par);
        let truth: Vec<Complex64> = (0..par.n())
            .map(|j| Complex64::new((j as f64 * 0.7).sin(), (j as f64 * 0.3).cos()))
            .collect();
        let data = dft.forward(&truth);
        let solved = dft.least_squares(&data).unwrap();
        for (s, t) in solved.iter().zip(&truth) {
            assert!((s - t).norm() < 1e-6, "got {:?}, expected {:?}", s, t);
        }
    }
}
