//! Bridge from `ndarray` matrices over the working scalar to `faer` dense solvers.
//!
//! Factorizations run in `f64`; inputs and outputs are converted element by element.
use crate::{cast, to_f64, Real};
use faer::linalg::solvers::{self, Solve};
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinalgError {
    #[error("LDLT factorization failed: {0:?}")]
    Ldlt(solvers::LdltError),
    #[error("Self-adjoint eigendecomposition failed: {0:?}")]
    SelfAdjointEigen(solvers::EvdError),
    #[error("Non-finite values in the solution of a {0}x{0} system")]
    NonFinite(usize),
}

/// Symmetric factorization: Cholesky when positive definite, LDLT otherwise.
///
/// Factor once, then solve for any number of right-hand sides; the factor is shared
/// read-only between workers.
pub enum SymmetricFactor {
    Llt(solvers::Llt<f64>),
    Ldlt(solvers::Ldlt<f64>),
}

impl SymmetricFactor {
    /// # Errors
    /// * If neither Cholesky nor LDLT factorization succeeds
    pub fn new<T: Real>(a: &Array2<T>) -> Result<Self, LinalgError> {
        let matrix = to_mat(a);
        if let Ok(llt) = solvers::Llt::new(matrix.as_ref(), Side::Lower) {
            return Ok(Self::Llt(llt));
        }
        let ldlt = solvers::Ldlt::new(matrix.as_ref(), Side::Lower).map_err(LinalgError::Ldlt)?;
        Ok(Self::Ldlt(ldlt))
    }

    /// Solve for every column of `b`
    ///
    /// # Errors
    /// * If the solution is not finite, which indicates a singular system
    pub fn solve<T: Real>(&self, b: &Array2<T>) -> Result<Array2<T>, LinalgError> {
        let rhs = to_mat(b);
        let x = match self {
            Self::Llt(f) => f.solve(rhs.as_ref()),
            Self::Ldlt(f) => f.solve(rhs.as_ref()),
        };
        let out: Array2<T> = from_mat(x.as_ref());
        if out.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::NonFinite(b.nrows()));
        }
        Ok(out)
    }
}

fn to_mat<T: Real>(a: &Array2<T>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| to_f64(a[[i, j]]))
}

fn from_mat<T: Real>(m: MatRef<'_, f64>) -> Array2<T> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| cast(m[(i, j)]))
}

/// Solve `a x = b` for a symmetric (normally positive definite) `a`
///
/// # Errors
/// * If neither Cholesky nor LDLT factorization succeeds
/// * If the solution is not finite, which indicates a singular system
pub fn solve_symmetric<T: Real>(a: &Array2<T>, b: &Array2<T>) -> Result<Array2<T>, LinalgError> {
    SymmetricFactor::new(a)?.solve(b)
}

/// Eigenvalues (ascending) and eigenvectors (columns) of a symmetric matrix
pub fn symmetric_eigen<T: Real>(a: &Array2<T>) -> Result<(Array1<T>, Array2<T>), LinalgError> {
    let m = to_mat(a);
    let eigen = m
        .as_ref()
        .self_adjoint_eigen(Side::Lower)
        .map_err(LinalgError::SelfAdjointEigen)?;
    let s = eigen.S().column_vector().as_mat();
    let u = eigen.U();
    let n = s.nrows();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| s[(i, 0)].total_cmp(&s[(j, 0)]));

    let values = Array1::from_iter(order.iter().map(|&i| cast::<T, _>(s[(i, 0)])));
    let vectors = Array2::from_shape_fn((u.nrows(), n), |(r, c)| cast(u[(r, order[c])]));
    Ok((values, vectors))
}
