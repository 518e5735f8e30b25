//! Weighted data-fidelity term.
//!
//! $$ \chi^2(x) = \sum_c \hat w_c \,\big|(A\tilde x)_c - P_c\big|^2,
//!    \qquad \tilde x = R x \text{ with a dictionary, else } x. $$
//!
//! Since `backward` is $A^H \hat W$, the gradient is
//! $2 R^T\,\mathrm{stack}(A^H \hat W (A\tilde x - P))$ and $R^T$ is the
//! dictionary's `decompose`.

use std::sync::Arc;

use num_complex::Complex64;

use super::ObjectiveTerm;
use crate::dictionary::Dictionary;
use crate::error::{FaradayError, Result};
use crate::optimization::cg::cg_solve;
use crate::transform::Transform;

const PROX_CG_TOL: f64 = 1e-10;
const PROX_CG_MAX_ITER: usize = 200;

/// Chi-squared misfit between a model spectrum and the channel data.
#[derive(Clone)]
pub struct Chi2 {
    transform: Arc<dyn Transform>,
    data: Vec<Complex64>,
    dictionary: Option<Arc<dyn Dictionary>>,
}

impl Chi2 {
    pub fn new(
        transform: Arc<dyn Transform>,
        data: Vec<Complex64>,
        dictionary: Option<Arc<dyn Dictionary>>,
    ) -> Result<Self> {
        if data.len() != transform.n_channels() {
            return Err(FaradayError::Shape {
                what: "chi2 data",
                expected: transform.n_channels(),
                found: data.len(),
            });
        }
        if let Some(d) = &dictionary {
            if d.signal_len() != 2 * transform.n_phi() {
                return Err(FaradayError::Shape {
                    what: "dictionary signal",
                    expected: 2 * transform.n_phi(),
                    found: d.signal_len(),
                });
            }
        }
        Ok(Self { transform, data, dictionary })
    }

    pub fn dictionary(&self) -> Option<&Arc<dyn Dictionary>> {
        self.dictionary.as_ref()
    }

    /// Length of the vectors this term accepts.
    pub fn domain_len(&self) -> usize {
        match &self.dictionary {
            Some(d) => d.coefficient_len(),
            None => 2 * self.transform.n_phi(),
        }
    }

    /// Model minus data, in channel space.
    fn misfit(&self, x: &[f64]) -> Vec<Complex64> {
        let model = match &self.dictionary {
            Some(d) => self.transform.forward_real(&d.reconstruct(x)),
            None => self.transform.forward_real(x),
        };
        model.iter().zip(&self.data).map(|(m, d)| m - d).collect()
    }
}

impl ObjectiveTerm for Chi2 {
    fn name(&self) -> &str {
        "Chi2"
    }

    fn reg(&self) -> f64 {
        1.0
    }

    fn value(&self, x: &[f64]) -> f64 {
        self.misfit(x)
            .iter()
            .zip(self.transform.weights())
            .map(|(r, w)| w * r.norm_sqr())
            .sum()
    }

    fn gradient(&self, x: &[f64]) -> Option<Vec<f64>> {
        let mut g = self.transform.backward_real(&self.misfit(x));
        g.iter_mut().for_each(|v| *v *= 2.0);
        Some(match &self.dictionary {
            Some(d) => d.decompose(&g),
            None => g,
        })
    }

    /// Solves `(I + γH) x = v − γ∇χ²(0)` by conjugate gradients, where
    /// `H` is the (constant) Hessian.
    fn prox(&self, v: &[f64], step: f64) -> Result<Vec<f64>> {
        let zero = vec![0.0; v.len()];
        let g0 = self.gradient(&zero).unwrap_or_else(|| zero.clone());
        let rhs: Vec<f64> = v.iter().zip(&g0).map(|(vi, gi)| vi - step * gi).collect();

        let op = |x: &[f64]| -> Vec<f64> {
            let gx = self.gradient(x).unwrap_or_else(|| zero.clone());
            x.iter()
                .zip(gx.iter().zip(&g0))
                .map(|(xi, (gi, g0i))| xi + step * (gi - g0i))
                .collect()
        };
        let out = cg_solve(op, &rhs, v, PROX_CG_TOL, PROX_CG_MAX_ITER);
        if out.x.iter().any(|v| !v.is_finite()) {
            return Err(FaradayError::LinAlg("chi2 proximal solve produced non-finite values".into()));
        }
        log::trace!(
            "Chi2 prox: {} CG iterations, relative residual {:.2e}",
            out.iterations,
            out.relative_residual
        );
        Ok(out.x)
    }

    fn is_smooth(&self) -> bool {
        true
    }
}
