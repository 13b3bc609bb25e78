use crate::linalg::SingularSystemError;
use crate::structure::{MismatchedShapeError, TrialStructure};
use crate::Real;
use nalgebra::{DVector, DVectorViewMut};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Stopping configuration shared by the residual and minimization iterators.
///
/// Convergence is declared as soon as either tolerance is satisfied: the residual
/// (or gradient) norm must not exceed `absolute_tolerance`, or, when
/// `relative_tolerance` is positive, must not exceed `relative_tolerance` times the
/// norm at the starting state. The iteration budget is a hard ceiling regardless of
/// tolerances; with both tolerances at zero it is the sole stopping criterion.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings<T> {
    pub max_iterations: usize,
    pub absolute_tolerance: T,
    pub relative_tolerance: T,
}

impl<T> Default for SolverSettings<T>
where
    T: Real,
{
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn default() -> Self {
        Self {
            max_iterations: 10,
            absolute_tolerance: 1e-10,
            relative_tolerance: 0.0,
        }
    }
}

impl<T> SolverSettings<T>
where
    T: Real,
{
    /// True if the given norm satisfies the absolute or the relative criterion.
    pub fn is_converged(&self, norm: T, initial_norm: T) -> bool {
        norm <= self.absolute_tolerance
            || (self.relative_tolerance > T::zero() && norm <= self.relative_tolerance * initial_norm)
    }
}

/// Terminal outcome of a pointwise solve that produced a usable state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Termination {
    /// A tolerance was satisfied.
    Converged { iterations: usize },
    /// The iteration budget was exhausted; the associated state is the best
    /// available iterate rather than a converged solution.
    MaxIterationsReached { iterations: usize },
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        matches!(self, Termination::Converged { .. })
    }

    pub fn iterations(&self) -> usize {
        match self {
            Termination::Converged { iterations } => *iterations,
            Termination::MaxIterationsReached { iterations } => *iterations,
        }
    }
}

/// The solved (or best-effort) local state at one evaluation point.
#[derive(Debug, Clone)]
pub struct PointSolution<T>
where
    T: Real,
{
    pub(crate) state: DVector<T>,
    pub(crate) termination: Termination,
}

impl<T> PointSolution<T>
where
    T: Real,
{
    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// The composite state in reduced coordinates, covering free and fixed
    /// components alike.
    pub fn state(&self) -> &DVector<T> {
        &self.state
    }

    /// Writes the state into an output buffer whose layout is inferred from its
    /// size; see [`TrialStructure::write_state_into`].
    pub fn write_into<'a>(
        &self,
        structure: &TrialStructure<T>,
        output: impl Into<DVectorViewMut<'a, T>>,
    ) -> Result<(), MismatchedShapeError>
    where
        T: 'a,
    {
        structure.write_state_into(&self.state, output)
    }
}

/// Fatal failure of a pointwise solve. No output state is produced.
#[derive(Debug, Clone)]
pub enum SolveError {
    /// The declared structure, evaluator and buffers disagree on sizes; raised
    /// before any iteration begins.
    MismatchedShape(MismatchedShapeError),
    /// A linear system solved during the given iteration was singular.
    SingularSystem {
        iteration: usize,
        source: SingularSystemError,
    },
}

impl Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            SolveError::MismatchedShape(err) => {
                write!(f, "{}", err)
            }
            SolveError::SingularSystem { iteration, source } => {
                write!(f, "Iteration {} failed: {}", iteration, source)
            }
        }
    }
}

impl Error for SolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SolveError::MismatchedShape(err) => Some(err),
            SolveError::SingularSystem { source, .. } => Some(source),
        }
    }
}

impl From<MismatchedShapeError> for SolveError {
    fn from(err: MismatchedShapeError) -> Self {
        SolveError::MismatchedShape(err)
    }
}
