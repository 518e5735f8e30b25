//! Matrix-free conjugate gradients.
//!
//! Solves $\mathbf{A}\mathbf{x} = \mathbf{b}$ for a symmetric positive definite
//! operator given only as a closure. Used for the ADMM x-update and for the
//! proximal operator of the data-fidelity term.

use super::{dot, norm};

/// Result of a conjugate-gradient solve.
#[derive(Debug, Clone)]
pub struct CgOutcome {
    pub x: Vec<f64>,
    pub iterations: usize,
    /// `‖b − Ax‖ / ‖b‖` at exit.
    pub relative_residual: f64,
}

/// Conjugate-gradient solve of `a_op(x) = b`.
///
/// # Arguments
/// * `a_op` - Closure computing $\mathbf{A}\mathbf{x}$.
/// * `b` - Right-hand side.
/// * `x0` - Initial guess (warm start).
/// * `tol` - Stop when the residual norm drops below `tol · ‖b‖`.
/// * `max_iter` - Iteration cap.
pub fn cg_solve<F>(a_op: F, b: &[f64], x0: &[f64], tol: f64, max_iter: usize) -> CgOutcome
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let mut x = x0.to_vec();
    let b_norm = norm(b);
    if b_norm == 0.0 {
        return CgOutcome { x: vec![0.0; b.len()], iterations: 0, relative_residual: 0.0 };
    }

    let ax = a_op(&x);
    let mut r: Vec<f64> = b.iter().zip(&ax).map(|(bi, axi)| bi - axi).collect();
    let mut p = r.clone();
    let mut rs_old = dot(&r, &r);
    let mut iterations = 0;

    while iterations < max_iter && rs_old.sqrt() >= tol * b_norm {
        let ap = a_op(&p);
        let pap = dot(&p, &ap);
        if pap.abs() < 1e-300 {
            break;
        }
        let alpha = rs_old / pap;
        for ((xi, ri), (pi, api)) in x.iter_mut().zip(r.iter_mut()).zip(p.iter().zip(&ap)) {
            *xi += alpha * pi;
            *ri -= alpha * api;
        }
        iterations += 1;

        let rs_new = dot(&r, &r);
        let beta = rs_new / rs_old;
        for (pi, ri) in p.iter_mut().zip(&r) {
            *pi = ri + beta * *pi;
        }
        rs_old = rs_new;
    }

    CgOutcome { x, iterations, relative_residual: rs_old.sqrt() / b_norm }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cg_identity() {
        let b = vec![1.0, 2.0, 3.0];
        let out = cg_solve(|v| v.to_vec(), &b, &[0.0; 3], 1e-10, 100);
        for (xi, bi) in out.x.iter().zip(&b) {
            assert!((xi - bi).abs() < 1e-8, "x should equal b");
        }
        assert_eq!(out.iterations, 1);
    }

    #[test]
    fn test_cg_tridiagonal() {
        // [[2,-1,0],[-1,2,-1],[0,-1,2]] x = [1,0,1] has x = [1,1,1].
        let op = |v: &[f64]| vec![2.0 * v[0] - v[1], -v[0] + 2.0 * v[1] - v[2], -v[1] + 2.0 * v[2]];
        let out = cg_solve(op, &[1.0, 0.0, 1.0], &[0.0; 3], 1e-12, 50);
        for xi in &out.x {
            assert!((xi - 1.0).abs() < 1e-10, "Expected 1, got {}", xi);
        }
        assert!(out.relative_residual < 1e-12);
    }

    #[test]
    fn test_zero_rhs_returns_zero() {
        let out = cg_solve(|v| v.to_vec(), &[0.0, 0.0], &[5.0, 5.0], 1e-10, 10);
        assert_eq!(out.x, vec![0.0, 0.0]);
    }
}
