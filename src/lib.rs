//! Pointwise nonlinear solvers for discretized-field construction.
//!
//! At every evaluation point of a discretized field, an expression in an unknown
//! local state is either driven to zero (root-finding) or to a stationary point of a
//! scalar potential (minimization) with Newton's method. Values and derivatives of
//! the expression are supplied by an external evaluator; this crate contains the
//! iteration itself, the small dense linear solves, and the bookkeeping that maps
//! compound and constrained unknowns onto flat coefficient vectors.

/// Evaluator-binding traits and numerical differentiation helpers
pub mod calculus;
/// Stopping criteria, solve outcomes and error types shared by the iterators
pub mod convergence;
/// Application of the pointwise solvers across batches of evaluation points
pub mod interpolate;
/// Dense linear kernel for the small per-point Newton systems
pub mod linalg;
/// Damped Newton minimization of a scalar potential
pub mod minimize;
/// Newton iteration for pointwise residual equations
pub mod newton;
/// Trial structures: compound unknowns, reduced-coordinate embeddings and output mapping
pub mod structure;

pub extern crate nalgebra;

pub use fenris_traits::Real;
