use crate::Real;
use nalgebra::{DMatrix, DVector, DVectorView};
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Error produced when a dense linear system is singular to working precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingularSystemError {
    /// Dimension of the offending system.
    pub dimension: usize,
}

impl Display for SingularSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "Linear system of dimension {} is singular to working precision.",
            self.dimension
        )
    }
}

impl Error for SingularSystemError {}

/// Solves the dense linear system `matrix * solution = rhs` with LU decomposition
/// and partial pivoting.
///
/// A pivot whose magnitude does not exceed a threshold proportional to the matrix
/// max-norm and the system dimension is reported as a [`SingularSystemError`].
/// Intended for the small systems arising in pointwise Newton iterations; there is
/// no hard upper bound on the dimension.
///
/// # Panics
///
/// Panics if the matrix is not square or the right-hand side length does not match.
pub fn solve_lu<T>(matrix: DMatrix<T>, rhs: DVectorView<T>) -> Result<DVector<T>, SingularSystemError>
where
    T: Real,
{
    let n = matrix.nrows();
    assert_eq!(matrix.ncols(), n, "matrix must be square");
    assert_eq!(rhs.nrows(), n, "right-hand side must match matrix dimension");

    if n == 0 {
        return Ok(DVector::zeros(0));
    }

    let max_abs = matrix.amax();
    let pivot_threshold =
        T::default_epsilon() * T::from_f64(n as f64).expect("dimension must fit in T") * max_abs;

    let lu = matrix.lu();
    let min_pivot = lu.u().diagonal().amin();
    if min_pivot <= pivot_threshold {
        return Err(SingularSystemError { dimension: n });
    }

    lu.solve(&rhs).ok_or(SingularSystemError { dimension: n })
}
