//! Dense complex linear solves.
//!
//! Uses LU decomposition via `faer` to solve $\mathbf{A}\mathbf{x} = \mathbf{b}$
//! exactly. Used for the normal equations of small Faraday grids, where it
//! provides the reference least-squares solution the iterative solvers are
//! checked against.

use faer::linalg::solvers::SpSolver;
use ndarray::{Array1, Array2};
use num_complex::Complex64;

use crate::error::{FaradayError, Result};

/// Solve a square complex system by LU decomposition with partial pivoting.
///
/// # Arguments
/// * `matrix` - The $n \times n$ system matrix.
/// * `rhs` - Right-hand side of length $n$.
pub fn solve_dense(matrix: &Array2<Complex64>, rhs: &Array1<Complex64>) -> Result<Array1<Complex64>> {
    let dim = matrix.nrows();
    if matrix.ncols() != dim {
        return Err(FaradayError::Shape { what: "square matrix", expected: dim, found: matrix.ncols() });
    }
    if rhs.len() != dim {
        return Err(FaradayError::Shape { what: "right-hand side", expected: dim, found: rhs.len() });
    }

    let faer_mat = faer::Mat::<faer::complex_native::c64>::from_fn(dim, dim, |i, j| {
        let c = matrix[[i, j]];
        faer::complex_native::c64::new(c.re, c.im)
    });
    let faer_rhs = faer::Col::<faer::complex_native::c64>::from_fn(dim, |i| {
        let c = rhs[i];
        faer::complex_native::c64::new(c.re, c.im)
    });

    let lu = faer_mat.partial_piv_lu();
    let faer_sol = lu.solve(&faer_rhs);

    let solution = Array1::from_vec(
        (0..dim)
            .map(|i| {
                let c = faer_sol[i];
                Complex64::new(c.re, c.im)
            })
            .collect(),
    );

    if solution.iter().any(|c| !(c.re.is_finite() && c.im.is_finite())) {
        return Err(FaradayError::LinAlg("singular system: non-finite LU solution".into()));
    }
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_solve_hermitian_system() {
        // Normal-equation matrices are Hermitian positive definite.
        let matrix = array![
            [Complex64::new(4.0, 0.0), Complex64::new(1.0, -1.0)],
            [Complex64::new(1.0, 1.0), Complex64::new(3.0, 0.0)],
        ];
        let rhs = array![Complex64::new(2.0, 1.0), Complex64::new(-1.0, 0.5)];

        let sol = solve_dense(&matrix, &rhs).unwrap();

        let check = matrix.dot(&sol);
        for i in 0..2 {
            assert!(
                (check[i] - rhs[i]).norm() < 1e-10,
                "Mismatch at {}: got {:?}, expected {:?}",
                i,
                check[i],
                rhs[i]
            );
        }
    }

    #[test]
    fn test_rejects_non_square() {
        let matrix = Array2::<Complex64>::zeros((2, 3));
        let rhs = Array1::<Complex64>::zeros(2);
        assert!(solve_dense(&matrix, &rhs).is_err());
    }
}
