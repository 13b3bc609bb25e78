use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;

/// A vector-valued residual together with its Jacobian.
///
/// Both the unknown argument and the residual live in the full (expanded) tensor
/// space; any reduction to constrained coordinates is applied by the caller.
/// Implementations must be pure functions of `x` so that independent pointwise
/// solves can evaluate them concurrently.
pub trait ResidualFunction<T>
where
    T: Scalar,
{
    /// Number of entries of the unknown argument and of the residual.
    fn dimension(&self) -> usize;
    fn eval_residual_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>);
    fn eval_jacobian_into(&mut self, jacobian: &mut DMatrixViewMut<T>, x: &DVectorView<T>);
}

impl<T, X> ResidualFunction<T> for &mut X
where
    T: Scalar,
    X: ResidualFunction<T>,
{
    fn dimension(&self) -> usize {
        X::dimension(self)
    }

    fn eval_residual_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) {
        X::eval_residual_into(self, f, x)
    }

    fn eval_jacobian_into(&mut self, jacobian: &mut DMatrixViewMut<T>, x: &DVectorView<T>) {
        X::eval_jacobian_into(self, jacobian, x)
    }
}

/// A scalar potential together with its gradient and Hessian.
///
/// As with [`ResidualFunction`], all quantities are evaluated in the full
/// (expanded) tensor space of the unknown.
pub trait PotentialFunction<T>
where
    T: Scalar,
{
    /// Number of entries of the unknown argument.
    fn dimension(&self) -> usize;
    fn eval_potential(&mut self, x: &DVectorView<T>) -> T;
    fn eval_gradient_into(&mut self, gradient: &mut DVectorViewMut<T>, x: &DVectorView<T>);
    fn eval_hessian_into(&mut self, hessian: &mut DMatrixViewMut<T>, x: &DVectorView<T>);
}

impl<T, X> PotentialFunction<T> for &mut X
where
    T: Scalar,
    X: PotentialFunction<T>,
{
    fn dimension(&self) -> usize {
        X::dimension(self)
    }

    fn eval_potential(&mut self, x: &DVectorView<T>) -> T {
        X::eval_potential(self, x)
    }

    fn eval_gradient_into(&mut self, gradient: &mut DVectorViewMut<T>, x: &DVectorView<T>) {
        X::eval_gradient_into(self, gradient, x)
    }

    fn eval_hessian_into(&mut self, hessian: &mut DMatrixViewMut<T>, x: &DVectorView<T>) {
        X::eval_hessian_into(self, hessian, x)
    }
}

/// Builder for assembling a [`ResidualFunction`] from closures.
#[derive(Debug, Clone)]
pub struct ResidualFunctionBuilder {
    dimension: usize,
}

#[derive(Debug, Clone)]
pub struct ClosureResidualFunction<F, J> {
    dimension: usize,
    residual: F,
    jacobian: J,
}

impl ResidualFunctionBuilder {
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn with_residual<F, T>(self, residual: F) -> ClosureResidualFunction<F, ()>
    where
        T: Scalar,
        F: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>),
    {
        ClosureResidualFunction {
            dimension: self.dimension,
            residual,
            jacobian: (),
        }
    }
}

impl<F> ClosureResidualFunction<F, ()> {
    pub fn with_jacobian<J, T>(self, jacobian: J) -> ClosureResidualFunction<F, J>
    where
        T: Scalar,
        J: FnMut(&mut DMatrixViewMut<T>, &DVectorView<T>),
    {
        ClosureResidualFunction {
            dimension: self.dimension,
            residual: self.residual,
            jacobian,
        }
    }
}

impl<F, J, T> ResidualFunction<T> for ClosureResidualFunction<F, J>
where
    T: Scalar,
    F: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>),
    J: FnMut(&mut DMatrixViewMut<T>, &DVectorView<T>),
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn eval_residual_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) {
        let residual = &mut self.residual;
        residual(f, x)
    }

    fn eval_jacobian_into(&mut self, jacobian: &mut DMatrixViewMut<T>, x: &DVectorView<T>) {
        let jac = &mut self.jacobian;
        jac(jacobian, x)
    }
}

/// Approximates the Jacobian of the function $f: \mathbb{R}^n \rightarrow \mathbb{R}^m$
/// with central finite differences.
///
/// The parameter `h` determines the step size of the finite difference approximation.
///
/// The vector `x` is mutable in order to hold intermediate evaluation points, but upon
/// returning, its content remains unchanged.
pub fn approximate_jacobian_fd<'a, T>(
    m: usize,
    f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) -> DMatrix<T>
where
    T: Real,
{
    approximate_jacobian_fd_(m, f, x.into(), h)
}

#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
fn approximate_jacobian_fd_<T>(
    m: usize,
    mut f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    mut x: DVectorViewMut<T>,
    h: T,
) -> DMatrix<T>
where
    T: Real,
{
    let n = x.len();
    let mut jacobian = DMatrix::zeros(m, n);

    // Buffers to hold f(x + h e_i) and f(x - h e_i)
    let mut f_plus = DVector::zeros(m);
    let mut f_minus = DVector::zeros(m);

    // Build the Jacobian column by column
    for i in 0..n {
        // df_dxi ~ (f(x + h e_i) - f(x - h e_i)) / (2 h)
        let x_i = x[i];
        x[i] = x_i + h;
        f(DVectorView::from(&x), DVectorViewMut::from(&mut f_plus));
        x[i] = x_i - h;
        f(DVectorView::from(&x), DVectorViewMut::from(&mut f_minus));
        x[i] = x_i;

        let mut df_dxi = jacobian.column_mut(i);
        df_dxi.copy_from(&f_plus);
        df_dxi -= &f_minus;
        df_dxi /= 2.0 * h;
    }

    jacobian
}

/// Approximates the gradient of the function `f: R^n -> R` with central finite
/// differences.
///
/// The vector `x` is mutable in order to hold intermediate evaluation points, but upon
/// returning, its content remains unchanged.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn approximate_gradient_fd<'a, T>(
    mut f: impl FnMut(DVectorView<T>) -> T,
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) -> DVector<T>
where
    T: Real,
{
    let mut x = x.into();
    let n = x.len();
    let mut df = DVector::zeros(n);
    for i in 0..n {
        let x_i = x[i];
        x[i] = x_i + h;
        let f_plus = f(DVectorView::from(&x));
        x[i] = x_i - h;
        let f_minus = f(DVectorView::from(&x));
        x[i] = x_i;
        df[i] = (f_plus - f_minus) / (2.0 * h);
    }
    df
}

/// Approximates the Hessian of a potential from its gradient function with central
/// finite differences.
///
/// `gradient` evaluates the analytic (or otherwise trusted) gradient of the
/// potential; the resulting matrix is the Jacobian of the gradient, i.e. the
/// Hessian of the underlying potential.
pub fn approximate_hessian_fd<'a, T>(
    gradient: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) -> DMatrix<T>
where
    T: Real,
{
    let x = x.into();
    let n = x.len();
    approximate_jacobian_fd_(n, gradient, x, h)
}
