use crate::calculus::{PotentialFunction, ResidualFunction};
use crate::convergence::SolverSettings;
use crate::minimize::solve_minimize;
use crate::newton::solve_root;
use crate::structure::TrialStructure;
use crate::Real;
use eyre::{bail, WrapErr};
use nalgebra::{DVectorView, DVectorViewMut};

/// Solves the residual equation independently at every evaluation point of a field
/// and writes the per-point states into a strided coefficient buffer.
///
/// `function_at_point` produces the evaluator already bound to the given point's
/// fixed data. `starting_states` holds one starting state per point, concatenated;
/// the per-point stride is inferred from `num_points` and may use any layout
/// accepted by [`TrialStructure::normalize_state`]. Output strides are inferred the
/// same way, per [`TrialStructure::write_state_into`].
///
/// The pass is all-or-nothing: the first point whose solve fails aborts the whole
/// pass with an error identifying the point, and the output buffer contents are
/// unspecified. Points solved before the failure do not mask it.
pub fn solve_root_at_points<'a, 'b, T, F>(
    mut function_at_point: impl FnMut(usize) -> F,
    structure: &TrialStructure<T>,
    num_points: usize,
    starting_states: impl Into<DVectorView<'a, T>>,
    settings: &SolverSettings<T>,
    output: impl Into<DVectorViewMut<'b, T>>,
) -> eyre::Result<()>
where
    T: Real,
    F: ResidualFunction<T>,
{
    let starting_states = starting_states.into();
    let mut output = output.into();
    if num_points == 0 {
        return Ok(());
    }
    let (start_stride, output_stride) = point_strides(num_points, starting_states.len(), output.len())?;

    for point in 0..num_points {
        let start = starting_states.rows(point * start_stride, start_stride);
        let solution = solve_root(function_at_point(point), structure, start, settings)
            .wrap_err_with(|| format!("pointwise solve failed at evaluation point {}", point))?;
        solution
            .write_into(structure, output.rows_mut(point * output_stride, output_stride))
            .wrap_err_with(|| format!("cannot write solution at evaluation point {}", point))?;
    }
    Ok(())
}

/// Minimizes the potential independently at every evaluation point of a field; in
/// all other respects identical to [`solve_root_at_points`].
pub fn solve_minimize_at_points<'a, 'b, T, F>(
    mut function_at_point: impl FnMut(usize) -> F,
    structure: &TrialStructure<T>,
    num_points: usize,
    starting_states: impl Into<DVectorView<'a, T>>,
    settings: &SolverSettings<T>,
    output: impl Into<DVectorViewMut<'b, T>>,
) -> eyre::Result<()>
where
    T: Real,
    F: PotentialFunction<T>,
{
    let starting_states = starting_states.into();
    let mut output = output.into();
    if num_points == 0 {
        return Ok(());
    }
    let (start_stride, output_stride) = point_strides(num_points, starting_states.len(), output.len())?;

    for point in 0..num_points {
        let start = starting_states.rows(point * start_stride, start_stride);
        let solution = solve_minimize(function_at_point(point), structure, start, settings)
            .wrap_err_with(|| format!("pointwise solve failed at evaluation point {}", point))?;
        solution
            .write_into(structure, output.rows_mut(point * output_stride, output_stride))
            .wrap_err_with(|| format!("cannot write solution at evaluation point {}", point))?;
    }
    Ok(())
}

fn point_strides(num_points: usize, start_len: usize, output_len: usize) -> eyre::Result<(usize, usize)> {
    if start_len % num_points != 0 {
        bail!(
            "starting-state buffer length {} is not divisible by the number of points {}",
            start_len,
            num_points
        );
    }
    if output_len % num_points != 0 {
        bail!(
            "output buffer length {} is not divisible by the number of points {}",
            output_len,
            num_points
        );
    }
    Ok((start_len / num_points, output_len / num_points))
}
