use crate::calculus::ResidualFunction;
use crate::convergence::{PointSolution, SolveError, SolverSettings, Termination};
use crate::linalg;
use crate::structure::TrialStructure;
use crate::Real;
use log::debug;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};

/// Solves the pointwise residual equation `F(x) = 0` with undamped Newton
/// iterations.
///
/// Every iteration evaluates the residual and its Jacobian at the current iterate
/// (expanded to the full tensor space of the free components), contracts them onto
/// reduced coordinates, and takes a full Newton step. Convergence is checked on the
/// reduced-space residual norm against `settings`; a linear residual therefore
/// converges after exactly one iteration.
///
/// The starting state covers every component of `structure` and may be supplied in
/// reduced or expanded coordinates (see [`TrialStructure::normalize_state`]); use
/// [`TrialStructure::assemble_state`] to build it from per-component blocks.
///
/// Reaching the iteration budget is not an error: the best available iterate is
/// returned with [`Termination::MaxIterationsReached`]. A singular Jacobian system
/// aborts the point with [`SolveError::SingularSystem`] and yields no state.
pub fn solve_root<'a, T, F>(
    mut function: F,
    structure: &TrialStructure<T>,
    starting_state: impl Into<DVectorView<'a, T>>,
    settings: &SolverSettings<T>,
) -> Result<PointSolution<T>, SolveError>
where
    T: Real,
    F: ResidualFunction<T>,
{
    let mut state = structure.normalize_state(starting_state)?;
    structure.check_evaluator_dim(function.dimension())?;

    let n_full = structure.evaluator_dim();
    let n = structure.unknown_dim();

    let mut x = structure.extract_unknowns(&state);
    let mut x_full = DVector::zeros(n_full);
    let mut f_full = DVector::zeros(n_full);
    let mut j_full = DMatrix::zeros(n_full, n_full);
    let mut f = DVector::zeros(n);
    let mut j = DMatrix::zeros(n, n);

    structure.expand_unknowns_into(&x, &mut x_full);
    function.eval_residual_into(&mut DVectorViewMut::from(&mut f_full), &DVectorView::from(&x_full));
    structure.contract_vector_into(&f_full, &mut f);

    let initial_norm = f.norm();
    let mut iterations = 0;

    let termination = loop {
        let norm = f.norm();
        if settings.is_converged(norm, initial_norm) {
            break Termination::Converged { iterations };
        }
        if iterations == settings.max_iterations {
            break Termination::MaxIterationsReached { iterations };
        }

        function.eval_jacobian_into(&mut DMatrixViewMut::from(&mut j_full), &DVectorView::from(&x_full));
        structure.contract_matrix_into(&j_full, &mut j);

        // Solve J dx = -F
        let rhs = -&f;
        let dx = linalg::solve_lu(j.clone(), DVectorView::from(&rhs))
            .map_err(|source| SolveError::SingularSystem {
                iteration: iterations,
                source,
            })?;
        x += &dx;
        iterations += 1;
        debug!(
            "Newton iteration {}: residual norm {:?}, step norm {:?}",
            iterations,
            norm,
            dx.norm()
        );

        structure.expand_unknowns_into(&x, &mut x_full);
        function.eval_residual_into(&mut DVectorViewMut::from(&mut f_full), &DVectorView::from(&x_full));
        structure.contract_vector_into(&f_full, &mut f);
    };

    structure.store_unknowns(&x, &mut state);
    Ok(PointSolution { state, termination })
}
