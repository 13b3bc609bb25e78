use crate::linalg::SingularSystemError;
use crate::Real;
use itertools::izip;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Error raised when a declared trial structure cannot be reconciled with the size of
/// a buffer or of the evaluator's unknown argument.
///
/// This is a caller bug: it is always raised before any Newton iteration begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchedShapeError {
    /// Which quantity had the offending size.
    pub quantity: &'static str,
    /// The sizes that would have been accepted.
    pub expected: Vec<usize>,
    /// The size that was encountered.
    pub actual: usize,
}

impl Display for MismatchedShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        if self.expected.len() == 1 {
            write!(
                f,
                "Mismatched size for {}: got {}, expected {}.",
                self.quantity, self.actual, self.expected[0]
            )
        } else {
            write!(
                f,
                "Mismatched size for {}: got {}, expected one of {:?}.",
                self.quantity, self.actual, self.expected
            )
        }
    }
}

impl Error for MismatchedShapeError {}

/// A linear embedding of reduced coordinates into a full tensor space.
///
/// The expansion matrix maps reduced coordinates onto the full tensor entries; the
/// contraction maps full-space values and derivatives back onto reduced
/// coordinates. With the contraction chosen as the pseudo-inverse of the expansion,
/// contraction after expansion is the identity on reduced coordinates, so Newton
/// steps can be taken in the reduced space while the expression evaluator only ever
/// sees full tensors. Both maps are fixed once per space and independent of the
/// evaluation point and iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding<T>
where
    T: Real,
{
    expansion: DMatrix<T>,
    contraction: DMatrix<T>,
}

impl<T> Embedding<T>
where
    T: Real,
{
    /// Creates an embedding from an expansion matrix and an explicitly supplied
    /// contraction.
    ///
    /// The expansion must have one row per full-space entry and one column per
    /// reduced coordinate; the contraction must have the transposed shape.
    pub fn new(expansion: DMatrix<T>, contraction: DMatrix<T>) -> Result<Self, MismatchedShapeError> {
        if contraction.nrows() != expansion.ncols() {
            return Err(MismatchedShapeError {
                quantity: "embedding contraction rows",
                expected: vec![expansion.ncols()],
                actual: contraction.nrows(),
            });
        }
        if contraction.ncols() != expansion.nrows() {
            return Err(MismatchedShapeError {
                quantity: "embedding contraction columns",
                expected: vec![expansion.nrows()],
                actual: contraction.ncols(),
            });
        }
        Ok(Self { expansion, contraction })
    }

    /// Creates an embedding whose contraction is the Moore-Penrose pseudo-inverse
    /// `(EᵀE)⁻¹ Eᵀ` of the expansion.
    ///
    /// Fails if the expansion does not have full column rank.
    pub fn from_expansion(expansion: DMatrix<T>) -> Result<Self, SingularSystemError> {
        let transpose = expansion.transpose();
        let gram = &transpose * &expansion;
        let gram_inv = gram.try_inverse().ok_or(SingularSystemError {
            dimension: expansion.ncols(),
        })?;
        Ok(Self {
            contraction: gram_inv * transpose,
            expansion,
        })
    }

    /// The embedding of symmetric `dim x dim` matrices by their upper-triangular
    /// entries, in row-major order.
    ///
    /// Expansion places each independent entry at its two mirrored positions of the
    /// row-major full tensor; contraction keeps diagonal entries and averages the
    /// two mirrored off-diagonal entries.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn symmetric(dim: usize) -> Self {
        let full = dim * dim;
        let reduced = dim * (dim + 1) / 2;
        let mut expansion = DMatrix::zeros(full, reduced);
        let mut contraction = DMatrix::zeros(reduced, full);
        let mut k = 0;
        for i in 0..dim {
            for j in i..dim {
                expansion[(i * dim + j, k)] = 1.0;
                expansion[(j * dim + i, k)] = 1.0;
                if i == j {
                    contraction[(k, i * dim + j)] = 1.0;
                } else {
                    contraction[(k, i * dim + j)] = 0.5;
                    contraction[(k, j * dim + i)] = 0.5;
                }
                k += 1;
            }
        }
        Self { expansion, contraction }
    }

    pub fn reduced_dim(&self) -> usize {
        self.expansion.ncols()
    }

    pub fn full_dim(&self) -> usize {
        self.expansion.nrows()
    }

    pub fn expansion(&self) -> &DMatrix<T> {
        &self.expansion
    }

    pub fn contraction(&self) -> &DMatrix<T> {
        &self.contraction
    }

    /// Expands reduced coordinates into the full tensor space.
    pub fn expand_into(&self, reduced: &DVectorView<T>, full: &mut DVectorViewMut<T>) {
        full.gemv(T::one(), &self.expansion, reduced, T::zero());
    }

    /// Contracts a full-space vector (value, residual or gradient) onto reduced
    /// coordinates.
    pub fn contract_into(&self, full: &DVectorView<T>, reduced: &mut DVectorViewMut<T>) {
        reduced.gemv(T::one(), &self.contraction, full, T::zero());
    }
}

/// The shape of a single trial component.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentShape<T>
where
    T: Real,
{
    /// An unconstrained scalar, vector or tensor with the given number of entries.
    Plain(usize),
    /// A tensor constrained to a linear subspace, represented by reduced coordinates.
    Embedded(Embedding<T>),
}

impl<T> ComponentShape<T>
where
    T: Real,
{
    pub fn reduced_dim(&self) -> usize {
        match self {
            ComponentShape::Plain(size) => *size,
            ComponentShape::Embedded(embedding) => embedding.reduced_dim(),
        }
    }

    pub fn full_dim(&self) -> usize {
        match self {
            ComponentShape::Plain(size) => *size,
            ComponentShape::Embedded(embedding) => embedding.full_dim(),
        }
    }
}

/// Whether a component is solved for or passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentRole {
    /// The component participates in the solve.
    Free,
    /// The component is a fixed parameter: its starting value is copied unchanged
    /// to composite outputs and it is never presented to the evaluator.
    Fixed,
}

/// One component of a (possibly compound) trial structure.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialComponent<T>
where
    T: Real,
{
    shape: ComponentShape<T>,
    role: ComponentRole,
}

impl<T> TrialComponent<T>
where
    T: Real,
{
    /// A free, unconstrained component with the given number of entries.
    pub fn plain(size: usize) -> Self {
        Self {
            shape: ComponentShape::Plain(size),
            role: ComponentRole::Free,
        }
    }

    /// A free component constrained by the given embedding.
    pub fn embedded(embedding: Embedding<T>) -> Self {
        Self {
            shape: ComponentShape::Embedded(embedding),
            role: ComponentRole::Free,
        }
    }

    /// A free symmetric `dim x dim` matrix component.
    pub fn symmetric(dim: usize) -> Self {
        Self::embedded(Embedding::symmetric(dim))
    }

    /// Marks this component as a fixed parameter.
    pub fn fixed(self) -> Self {
        Self {
            role: ComponentRole::Fixed,
            ..self
        }
    }

    pub fn shape(&self) -> &ComponentShape<T> {
        &self.shape
    }

    pub fn role(&self) -> ComponentRole {
        self.role
    }

    pub fn is_free(&self) -> bool {
        self.role == ComponentRole::Free
    }

    pub fn reduced_dim(&self) -> usize {
        self.shape.reduced_dim()
    }

    pub fn full_dim(&self) -> usize {
        self.shape.full_dim()
    }
}

/// An ordered list of trial components describing how the flat unknown vector maps
/// onto the symbolic unknowns of the expression, and how solved values map onto
/// output buffers.
///
/// The *state* of a structure is the concatenation of the reduced coordinates of
/// every component, free and fixed alike; the *unknowns* are the reduced
/// coordinates of the free components only, and the evaluator sees the free
/// components expanded to their full tensor spaces.
#[derive(Debug, Clone)]
pub struct TrialStructure<T>
where
    T: Real,
{
    components: Vec<TrialComponent<T>>,
    // Block-diagonal expansion/contraction over the free components; None when
    // every free component is plain, in which case both maps are the identity.
    free_expansion: Option<DMatrix<T>>,
    free_contraction: Option<DMatrix<T>>,
}

impl<T> TrialStructure<T>
where
    T: Real,
{
    pub fn new(components: Vec<TrialComponent<T>>) -> Self {
        let needs_maps = components
            .iter()
            .any(|c| c.is_free() && matches!(c.shape, ComponentShape::Embedded(_)));
        let (free_expansion, free_contraction) = if needs_maps {
            let reduced: usize = components.iter().filter(|c| c.is_free()).map(|c| c.reduced_dim()).sum();
            let full: usize = components.iter().filter(|c| c.is_free()).map(|c| c.full_dim()).sum();
            let mut expansion = DMatrix::zeros(full, reduced);
            let mut contraction = DMatrix::zeros(reduced, full);
            let mut ro = 0;
            let mut fo = 0;
            for component in components.iter().filter(|c| c.is_free()) {
                let r = component.reduced_dim();
                let f = component.full_dim();
                match &component.shape {
                    ComponentShape::Plain(_) => {
                        expansion.view_mut((fo, ro), (f, r)).fill_with_identity();
                        contraction.view_mut((ro, fo), (r, f)).fill_with_identity();
                    }
                    ComponentShape::Embedded(embedding) => {
                        expansion.view_mut((fo, ro), (f, r)).copy_from(embedding.expansion());
                        contraction.view_mut((ro, fo), (r, f)).copy_from(embedding.contraction());
                    }
                }
                ro += r;
                fo += f;
            }
            (Some(expansion), Some(contraction))
        } else {
            (None, None)
        };
        Self {
            components,
            free_expansion,
            free_contraction,
        }
    }

    /// A structure consisting of a single free, unconstrained component.
    pub fn plain(size: usize) -> Self {
        Self::new(vec![TrialComponent::plain(size)])
    }

    /// A compound structure of free, unconstrained components with the given sizes.
    pub fn from_block_sizes(sizes: &[usize]) -> Self {
        Self::new(sizes.iter().map(|&size| TrialComponent::plain(size)).collect())
    }

    pub fn components(&self) -> &[TrialComponent<T>] {
        &self.components
    }

    /// Total reduced size of the free components: the number of unknowns actually
    /// iterated on.
    pub fn unknown_dim(&self) -> usize {
        self.components
            .iter()
            .filter(|c| c.is_free())
            .map(|c| c.reduced_dim())
            .sum()
    }

    /// Total full (expanded) size of the free components: the size of the unknown
    /// argument presented to the evaluator.
    pub fn evaluator_dim(&self) -> usize {
        self.components
            .iter()
            .filter(|c| c.is_free())
            .map(|c| c.full_dim())
            .sum()
    }

    /// Total reduced size of all components, free and fixed.
    pub fn state_dim(&self) -> usize {
        self.components.iter().map(|c| c.reduced_dim()).sum()
    }

    /// Total full (expanded) size of all components, free and fixed.
    pub fn expanded_state_dim(&self) -> usize {
        self.components.iter().map(|c| c.full_dim()).sum()
    }

    /// Validates the size of the unknown argument the evaluator expects against the
    /// expanded size of the free components.
    pub fn check_evaluator_dim(&self, dimension: usize) -> Result<(), MismatchedShapeError> {
        if dimension != self.evaluator_dim() {
            return Err(MismatchedShapeError {
                quantity: "evaluator dimension",
                expected: vec![self.evaluator_dim()],
                actual: dimension,
            });
        }
        Ok(())
    }

    /// Normalizes a caller-supplied composite starting state into reduced
    /// coordinates.
    ///
    /// The state may be given either in reduced coordinates (one entry per reduced
    /// coordinate of every component) or in expanded coordinates (full tensor
    /// entries per component, contracted here); the layout is inferred from the
    /// length.
    pub fn normalize_state<'a>(
        &self,
        state: impl Into<DVectorView<'a, T>>,
    ) -> Result<DVector<T>, MismatchedShapeError>
    where
        T: 'a,
    {
        let state = state.into();
        let reduced_dim = self.state_dim();
        let full_dim = self.expanded_state_dim();
        if state.len() == reduced_dim {
            return Ok(state.clone_owned());
        }
        if state.len() == full_dim {
            let mut normalized = DVector::zeros(reduced_dim);
            let mut ro = 0;
            let mut fo = 0;
            for component in &self.components {
                let r = component.reduced_dim();
                let f = component.full_dim();
                match &component.shape {
                    ComponentShape::Plain(_) => {
                        normalized.rows_mut(ro, r).copy_from(&state.rows(fo, f));
                    }
                    ComponentShape::Embedded(embedding) => {
                        embedding.contract_into(&state.rows(fo, f), &mut normalized.rows_mut(ro, r));
                    }
                }
                ro += r;
                fo += f;
            }
            return Ok(normalized);
        }
        Err(MismatchedShapeError {
            quantity: "starting state",
            expected: dedup_sizes(vec![reduced_dim, full_dim]),
            actual: state.len(),
        })
    }

    /// Assembles a composite starting state from one block per component.
    ///
    /// Each block may be given in the reduced or the expanded coordinates of its
    /// component, inferred from its length.
    pub fn assemble_state(&self, blocks: &[DVectorView<T>]) -> Result<DVector<T>, MismatchedShapeError> {
        if blocks.len() != self.components.len() {
            return Err(MismatchedShapeError {
                quantity: "starting-state block count",
                expected: vec![self.components.len()],
                actual: blocks.len(),
            });
        }
        let mut state = DVector::zeros(self.state_dim());
        let mut ro = 0;
        for (component, block) in izip!(&self.components, blocks) {
            let r = component.reduced_dim();
            let f = component.full_dim();
            if block.len() == r {
                state.rows_mut(ro, r).copy_from(block);
            } else if block.len() == f {
                match &component.shape {
                    ComponentShape::Plain(_) => state.rows_mut(ro, r).copy_from(block),
                    ComponentShape::Embedded(embedding) => {
                        embedding.contract_into(block, &mut state.rows_mut(ro, r))
                    }
                }
            } else {
                return Err(MismatchedShapeError {
                    quantity: "starting-state block",
                    expected: dedup_sizes(vec![r, f]),
                    actual: block.len(),
                });
            }
            ro += r;
        }
        Ok(state)
    }

    /// Extracts the free reduced coordinates from a composite state.
    pub fn extract_unknowns(&self, state: &DVector<T>) -> DVector<T> {
        let mut unknowns = DVector::zeros(self.unknown_dim());
        let mut so = 0;
        let mut uo = 0;
        for component in &self.components {
            let r = component.reduced_dim();
            if component.is_free() {
                unknowns.rows_mut(uo, r).copy_from(&state.rows(so, r));
                uo += r;
            }
            so += r;
        }
        unknowns
    }

    /// Writes the free reduced coordinates back into a composite state, leaving
    /// fixed components untouched.
    pub fn store_unknowns(&self, unknowns: &DVector<T>, state: &mut DVector<T>) {
        let mut so = 0;
        let mut uo = 0;
        for component in &self.components {
            let r = component.reduced_dim();
            if component.is_free() {
                state.rows_mut(so, r).copy_from(&unknowns.rows(uo, r));
                uo += r;
            }
            so += r;
        }
    }

    /// Expands the free unknowns into the full space seen by the evaluator.
    pub fn expand_unknowns_into(&self, unknowns: &DVector<T>, full: &mut DVector<T>) {
        match &self.free_expansion {
            Some(expansion) => full.gemv(T::one(), expansion, unknowns, T::zero()),
            None => full.copy_from(unknowns),
        }
    }

    /// Contracts a full-space residual or gradient onto the free reduced
    /// coordinates.
    pub fn contract_vector_into(&self, full: &DVector<T>, reduced: &mut DVector<T>) {
        match &self.free_contraction {
            Some(contraction) => reduced.gemv(T::one(), contraction, full, T::zero()),
            None => reduced.copy_from(full),
        }
    }

    /// Contracts a full-space Jacobian or Hessian onto the free reduced
    /// coordinates as `C * M * E`.
    pub fn contract_matrix_into(&self, full: &DMatrix<T>, reduced: &mut DMatrix<T>) {
        match (&self.free_contraction, &self.free_expansion) {
            (Some(contraction), Some(expansion)) => {
                reduced.copy_from(&(contraction * full * expansion))
            }
            _ => reduced.copy_from(full),
        }
    }

    /// Writes a composite reduced state into an output buffer, inferring the output
    /// layout from the buffer size.
    ///
    /// Candidate layouts are tried in this order: the free components in reduced
    /// coordinates, the free components expanded, the whole state in reduced
    /// coordinates, the whole state expanded. Fixed components retain the values
    /// present in `state`. Fails with [`MismatchedShapeError`] when no layout
    /// matches.
    pub fn write_state_into<'a, 'b>(
        &self,
        state: impl Into<DVectorView<'a, T>>,
        output: impl Into<DVectorViewMut<'b, T>>,
    ) -> Result<(), MismatchedShapeError>
    where
        T: 'a + 'b,
    {
        let state = state.into();
        let mut output = output.into();
        if state.len() != self.state_dim() {
            return Err(MismatchedShapeError {
                quantity: "state",
                expected: vec![self.state_dim()],
                actual: state.len(),
            });
        }

        let out_len = output.len();
        if out_len == self.unknown_dim() {
            let mut so = 0;
            let mut oo = 0;
            for component in &self.components {
                let r = component.reduced_dim();
                if component.is_free() {
                    output.rows_mut(oo, r).copy_from(&state.rows(so, r));
                    oo += r;
                }
                so += r;
            }
        } else if out_len == self.evaluator_dim() {
            let mut so = 0;
            let mut oo = 0;
            for component in &self.components {
                let r = component.reduced_dim();
                let f = component.full_dim();
                if component.is_free() {
                    expand_component(component, &state.rows(so, r), &mut output.rows_mut(oo, f));
                    oo += f;
                }
                so += r;
            }
        } else if out_len == self.state_dim() {
            output.copy_from(&state);
        } else if out_len == self.expanded_state_dim() {
            let mut so = 0;
            let mut oo = 0;
            for component in &self.components {
                let r = component.reduced_dim();
                let f = component.full_dim();
                expand_component(component, &state.rows(so, r), &mut output.rows_mut(oo, f));
                so += r;
                oo += f;
            }
        } else {
            return Err(MismatchedShapeError {
                quantity: "output buffer",
                expected: dedup_sizes(vec![
                    self.unknown_dim(),
                    self.evaluator_dim(),
                    self.state_dim(),
                    self.expanded_state_dim(),
                ]),
                actual: out_len,
            });
        }
        Ok(())
    }
}

fn expand_component<T>(component: &TrialComponent<T>, reduced: &DVectorView<T>, full: &mut DVectorViewMut<T>)
where
    T: Real,
{
    match &component.shape {
        ComponentShape::Plain(_) => full.copy_from(reduced),
        ComponentShape::Embedded(embedding) => embedding.expand_into(reduced, full),
    }
}

fn dedup_sizes(mut sizes: Vec<usize>) -> Vec<usize> {
    sizes.sort_unstable();
    sizes.dedup();
    sizes
}
