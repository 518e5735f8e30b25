//! Smoothness penalties on neighbouring Faraday-depth samples.
//!
//! Both act on each real-stacked half separately, with the forward
//! difference $(Dx)_i = x_{i+1} - x_i$ and no wrap-around.

use super::{check_reg, ObjectiveTerm};
use crate::error::Result;

const TV_MAX_ITER: usize = 200;
const TV_TOL: f64 = 1e-8;
/// Dual step, `1/‖D‖²` for the 1-D difference operator.
const TV_DUAL_STEP: f64 = 0.25;

fn halves(x: &[f64]) -> (&[f64], &[f64]) {
    x.split_at(x.len() / 2)
}

fn diff(x: &[f64]) -> impl Iterator<Item = f64> + '_ {
    x.windows(2).map(|w| w[1] - w[0])
}

/// `Dᵀp` for a signal of length `p.len() + 1`.
fn diff_adjoint(p: &[f64], out: &mut [f64]) {
    let m = out.len();
    for (i, o) in out.iter_mut().enumerate() {
        let left = if i > 0 { p[i - 1] } else { 0.0 };
        let right = if i + 1 < m { p[i] } else { 0.0 };
        *o = left - right;
    }
}

/// Total variation $\lambda \sum_i |x_{i+1} - x_i|$.
#[derive(Debug, Clone)]
pub struct TotalVariation {
    reg: f64,
}

impl TotalVariation {
    pub fn new(reg: f64) -> Result<Self> {
        Ok(Self { reg: check_reg("TV", reg)? })
    }

    /// Chambolle's projected gradient on the dual of the 1-D TV prox.
    fn prox_half(&self, v: &[f64], bound: f64) -> Vec<f64> {
        let m = v.len();
        if m < 2 || bound == 0.0 {
            return v.to_vec();
        }
        let mut p = vec![0.0; m - 1];
        let mut x = v.to_vec();
        for it in 0..TV_MAX_ITER {
            let mut change = 0.0_f64;
            for (i, pi) in p.iter_mut().enumerate() {
                let next = (*pi + TV_DUAL_STEP * (x[i + 1] - x[i])).clamp(-bound, bound);
                change = change.max((next - *pi).abs());
                *pi = next;
            }
            diff_adjoint(&p, &mut x);
            x.iter_mut().zip(v).for_each(|(xi, vi)| *xi = vi - *xi);
            if change <= TV_TOL * bound {
                log::trace!("TV prox converged after {} dual iterations", it + 1);
                break;
            }
        }
        x
    }
}

impl ObjectiveTerm for TotalVariation {
    fn name(&self) -> &str {
        "TV"
    }

    fn reg(&self) -> f64 {
        self.reg
    }

    fn value(&self, x: &[f64]) -> f64 {
        let (re, im) = halves(x);
        self.reg * diff(re).chain(diff(im)).map(f64::abs).sum::<f64>()
    }

    fn prox(&self, v: &[f64], step: f64) -> Result<Vec<f64>> {
        let bound = self.reg * step;
        let (re, im) = halves(v);
        let mut out = self.prox_half(re, bound);
        out.extend(self.prox_half(im, bound));
        Ok(out)
    }
}

/// Total squared variation $\lambda \sum_i (x_{i+1} - x_i)^2$.
#[derive(Debug, Clone)]
pub struct TotalSquaredVariation {
    reg: f64,
}

impl TotalSquaredVariation {
    pub fn new(reg: f64) -> Result<Self> {
        Ok(Self { reg: check_reg("TSV", reg)? })
    }
}

/// Solve `(I + c DᵀD) x = v` with the Thomas algorithm.
fn solve_laplacian_system(v: &[f64], c: f64) -> Vec<f64> {
    let m = v.len();
    if m < 2 || c == 0.0 {
        return v.to_vec();
    }
    let diag = |i: usize| if i == 0 || i == m - 1 { 1.0 + c } else { 1.0 + 2.0 * c };
    let off = -c;

    let mut upper = vec![0.0; m];
    let mut rhs = vec![0.0; m];
    let mut denom = diag(0);
    upper[0] = off / denom;
    rhs[0] = v[0] / denom;
    for i in 1..m {
        denom = diag(i) - off * upper[i - 1];
        upper[i] = off / denom;
        rhs[i] = (v[i] - off * rhs[i - 1]) / denom;
    }
    let mut x = rhs;
    for i in (0..m - 1).rev() {
        x[i] -= upper[i] * x[i + 1];
    }
    x
}

impl ObjectiveTerm for TotalSquaredVariation {
    fn name(&self) -> &str {
        "TSV"
    }

    fn reg(&self) -> f64 {
        self.reg
    }

    fn value(&self, x: &[f64]) -> f64 {
        let (re, im) = halves(x);
        self.reg * diff(re).chain(diff(im)).map(|d| d * d).sum::<f64>()
    }

    fn gradient(&self, x: &[f64]) -> Option<Vec<f64>> {
        let (re, im) = halves(x);
        let mut out = vec![0.0; x.len()];
        let (out_re, out_im) = out.split_at_mut(re.len());
        for (half, o) in [(re, out_re), (im, out_im)] {
            if half.len() < 2 {
                continue;
            }
            let d: Vec<f64> = diff(half).map(|v| 2.0 * self.reg * v).collect();
            diff_adjoint(&d, o);
        }
        Some(out)
    }

    fn prox(&self, v: &[f64], step: f64) -> Result<Vec<f64>> {
        let c = 2.0 * self.reg * step;
        let (re, im) = halves(v);
        let mut out = solve_laplacian_system(re, c);
        out.extend(solve_laplacian_system(im, c));
        Ok(out)
    }

    fn is_smooth(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_values_ignore_the_seam_between_halves() {
        let x = [0.0, 1.0, 3.0, 10.0, 10.0, 8.0];
        assert_relative_eq!(TotalVariation::new(1.0).unwrap().value(&x), 3.0 + 2.0);
        assert_relative_eq!(TotalSquaredVariation::new(1.0).unwrap().value(&x), 1.0 + 4.0 + 4.0);
    }

    #[test]
    fn test_tsv_gradient_matches_finite_differences() {
        let tsv = TotalSquaredVariation::new(0.3).unwrap();
        let x = [0.2, -1.0, 0.7, 1.5, 0.0, 2.0, -0.4, 0.9];
        let g = tsv.gradient(&x).unwrap();
        let h = 1e-6;
        for i in 0..x.len() {
            let mut xp = x;
            let mut xm = x;
            xp[i] += h;
            xm[i] -= h;
            let fd = (tsv.value(&xp) - tsv.value(&xm)) / (2.0 * h);
            assert_relative_eq!(g[i], fd, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_tsv_prox_satisfies_optimality() {
        let tsv = TotalSquaredVariation::new(0.8).unwrap();
        let v = [1.0, 4.0, -2.0, 0.5, 3.0, 0.0, 1.0, -1.0];
        let step = 0.7;
        let x = tsv.prox(&v, step).unwrap();
        let g = tsv.gradient(&x).unwrap();
        for i in 0..v.len() {
            assert_relative_eq!(x[i] - v[i] + step * g[i], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_tv_prox_flattens_small_steps() {
        let tv = TotalVariation::new(1.0).unwrap();
        // A step of height 0.4 is removed entirely with threshold 1; the mean survives.
        let v = [0.0, 0.0, 0.4, 0.4, 1.0, 1.0, 1.0, 1.0];
        let x = tv.prox(&v, 1.0).unwrap();
        for xi in &x[..4] {
            assert_relative_eq!(*xi, 0.2, epsilon = 1e-6);
        }
        for xi in &x[4..] {
            assert_relative_eq!(*xi, 1.0, epsilon = 1e-6);
        }
    }
}
