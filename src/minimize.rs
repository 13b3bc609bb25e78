use crate::calculus::PotentialFunction;
use crate::convergence::{PointSolution, SolveError, SolverSettings, Termination};
use crate::linalg;
use crate::structure::TrialStructure;
use crate::Real;
use log::debug;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use numeric_literals::replace_float_literals;

/// Finds a stationary point (local minimum) of the pointwise potential `Φ(x)` with
/// a damped Newton method on the stationarity condition `∇Φ(x) = 0`.
///
/// Each iteration solves the Hessian system for the Newton direction. If the
/// Hessian is singular, or the direction is not a descent direction, the iterate
/// falls back to the steepest-descent direction. The step is then damped: starting
/// from a factor of one, the factor is halved until the potential strictly
/// decreases or the damping floor is reached. If no decrease can be found, the
/// iteration stops and the best state seen so far is returned with
/// [`Termination::MaxIterationsReached`]; the potential never increases across
/// iterations.
///
/// Convergence is checked on the reduced-space gradient norm against `settings`.
/// Starting-state handling and shape reconciliation are identical to
/// [`crate::newton::solve_root`].
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn solve_minimize<'a, T, F>(
    mut function: F,
    structure: &TrialStructure<T>,
    starting_state: impl Into<DVectorView<'a, T>>,
    settings: &SolverSettings<T>,
) -> Result<PointSolution<T>, SolveError>
where
    T: Real,
    F: PotentialFunction<T>,
{
    let mut state = structure.normalize_state(starting_state)?;
    structure.check_evaluator_dim(function.dimension())?;

    let n_full = structure.evaluator_dim();
    let n = structure.unknown_dim();

    let mut x = structure.extract_unknowns(&state);
    let mut x_full = DVector::zeros(n_full);
    let mut g_full = DVector::zeros(n_full);
    let mut h_full = DMatrix::zeros(n_full, n_full);
    let mut g = DVector::zeros(n);
    let mut h = DMatrix::zeros(n, n);
    let mut x_trial = DVector::zeros(n);

    let damping_floor = 1e-6;

    structure.expand_unknowns_into(&x, &mut x_full);
    function.eval_gradient_into(&mut DVectorViewMut::from(&mut g_full), &DVectorView::from(&x_full));
    structure.contract_vector_into(&g_full, &mut g);

    let initial_norm = g.norm();
    let mut iterations = 0;

    let termination = loop {
        let norm = g.norm();
        if settings.is_converged(norm, initial_norm) {
            break Termination::Converged { iterations };
        }
        if iterations == settings.max_iterations {
            break Termination::MaxIterationsReached { iterations };
        }

        function.eval_hessian_into(&mut DMatrixViewMut::from(&mut h_full), &DVectorView::from(&x_full));
        structure.contract_matrix_into(&h_full, &mut h);

        // Newton direction from H d = -g; fall back to steepest descent when the
        // Hessian is singular or the direction is not a descent direction.
        let rhs = -&g;
        let direction = match linalg::solve_lu(h.clone(), DVectorView::from(&rhs)) {
            Ok(newton_direction) if g.dot(&newton_direction) < T::zero() => newton_direction,
            _ => {
                debug!("Falling back to steepest descent at iteration {}", iterations);
                -&g
            }
        };

        // Damped update: halve the step until the potential strictly decreases.
        let potential = function.eval_potential(&DVectorView::from(&x_full));
        let mut damping = 1.0;
        let mut accepted = false;
        while damping >= damping_floor {
            x_trial.copy_from(&x);
            x_trial.axpy(damping, &direction, T::one());
            structure.expand_unknowns_into(&x_trial, &mut x_full);
            let potential_trial = function.eval_potential(&DVectorView::from(&x_full));
            if potential_trial < potential {
                x.copy_from(&x_trial);
                accepted = true;
                break;
            }
            damping *= 0.5;
        }

        if !accepted {
            // No step along the direction decreases the potential; keep the best
            // state seen so far.
            break Termination::MaxIterationsReached { iterations };
        }

        iterations += 1;
        debug!(
            "Minimization iteration {}: gradient norm {:?}, damping {:?}",
            iterations, norm, damping
        );

        function.eval_gradient_into(&mut DVectorViewMut::from(&mut g_full), &DVectorView::from(&x_full));
        structure.contract_vector_into(&g_full, &mut g);
    };

    structure.store_unknowns(&x, &mut state);
    Ok(PointSolution { state, termination })
}
