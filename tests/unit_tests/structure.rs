use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use pointsolve::structure::{Embedding, TrialComponent, TrialStructure};
use proptest::prelude::*;

#[test]
fn symmetric_embedding_has_expected_expansion() {
    let embedding = Embedding::<f64>::symmetric(2);
    assert_eq!(embedding.reduced_dim(), 3);
    assert_eq!(embedding.full_dim(), 4);

    #[rustfmt::skip]
    let expected_expansion = DMatrix::from_row_slice(4, 3, &[
        1.0, 0.0, 0.0,
        0.0, 1.0, 0.0,
        0.0, 1.0, 0.0,
        0.0, 0.0, 1.0,
    ]);
    assert_matrix_eq!(embedding.expansion().clone(), expected_expansion, comp = exact);
}

#[test]
fn symmetric_embedding_expands_upper_triangle_row_major() {
    let embedding = Embedding::<f64>::symmetric(3);
    let reduced = DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let mut full = DVector::zeros(9);
    embedding.expand_into(&DVectorView::from(&reduced), &mut DVectorViewMut::from(&mut full));

    let expected = DVector::from_column_slice(&[1.0, 2.0, 3.0, 2.0, 4.0, 5.0, 3.0, 5.0, 6.0]);
    assert_matrix_eq!(full, expected, comp = exact);
}

#[test]
fn symmetric_contraction_averages_off_diagonal_entries() {
    let embedding = Embedding::<f64>::symmetric(2);
    // A non-symmetric full tensor: only the (0, 1) entry is set.
    let full = DVector::from_column_slice(&[0.0, 1.0, 0.0, 0.0]);
    let mut reduced = DVector::zeros(3);
    embedding.contract_into(&DVectorView::from(&full), &mut DVectorViewMut::from(&mut reduced));

    let expected = DVector::from_column_slice(&[0.0, 0.5, 0.0]);
    assert_matrix_eq!(reduced, expected, comp = exact);
}

#[test]
fn pseudo_inverse_contraction_matches_symmetric_construction() {
    for dim in 2..=4 {
        let symmetric = Embedding::<f64>::symmetric(dim);
        let from_expansion = Embedding::from_expansion(symmetric.expansion().clone()).unwrap();
        assert_matrix_eq!(
            from_expansion.contraction().clone(),
            symmetric.contraction().clone(),
            comp = abs,
            tol = 1e-14
        );
    }
}

#[test]
fn embedding_rejects_mismatched_contraction() {
    let expansion = DMatrix::<f64>::zeros(4, 3);
    let contraction = DMatrix::<f64>::zeros(2, 4);
    assert!(Embedding::new(expansion, contraction).is_err());
}

#[test]
fn compound_structure_dimensions() {
    let structure = TrialStructure::<f64>::new(vec![
        TrialComponent::plain(1).fixed(),
        TrialComponent::symmetric(3),
        TrialComponent::plain(2),
    ]);
    assert_eq!(structure.unknown_dim(), 8);
    assert_eq!(structure.evaluator_dim(), 11);
    assert_eq!(structure.state_dim(), 9);
    assert_eq!(structure.expanded_state_dim(), 12);
}

#[test]
fn assemble_state_accepts_reduced_and_expanded_blocks() {
    let structure = TrialStructure::<f64>::new(vec![
        TrialComponent::plain(1),
        TrialComponent::symmetric(3),
        TrialComponent::plain(2),
    ]);

    let scalar = DVector::from_column_slice(&[0.5]);
    // Symmetric matrix given by all nine entries, row major.
    let matrix_full = DVector::from_column_slice(&[1.0, 3.0, 5.0, 3.0, 5.0, 7.0, 5.0, 7.0, 9.0]);
    let matrix_reduced = DVector::from_column_slice(&[1.0, 3.0, 5.0, 5.0, 7.0, 9.0]);
    let vector = DVector::from_column_slice(&[2.0 / 3.0, 3.0 / 4.0]);

    let expected = DVector::from_column_slice(&[
        0.5,
        1.0,
        3.0,
        5.0,
        5.0,
        7.0,
        9.0,
        2.0 / 3.0,
        3.0 / 4.0,
    ]);

    let from_full = structure
        .assemble_state(&[
            DVectorView::from(&scalar),
            DVectorView::from(&matrix_full),
            DVectorView::from(&vector),
        ])
        .unwrap();
    assert_matrix_eq!(from_full, expected, comp = exact);

    let from_reduced = structure
        .assemble_state(&[
            DVectorView::from(&scalar),
            DVectorView::from(&matrix_reduced),
            DVectorView::from(&vector),
        ])
        .unwrap();
    assert_matrix_eq!(from_reduced, expected, comp = exact);
}

#[test]
fn assemble_state_rejects_wrong_block_count() {
    let structure = TrialStructure::<f64>::from_block_sizes(&[1, 2]);
    let block = DVector::from_column_slice(&[1.0]);
    let result = structure.assemble_state(&[DVectorView::from(&block)]);
    assert!(result.is_err());
}

#[test]
fn normalize_state_contracts_expanded_layout() {
    let structure = TrialStructure::<f64>::new(vec![
        TrialComponent::plain(1),
        TrialComponent::symmetric(2),
    ]);

    let expanded = DVector::from_column_slice(&[0.5, 1.0, 2.0, 2.0, 5.0]);
    let normalized = structure.normalize_state(&expanded).unwrap();
    let expected = DVector::from_column_slice(&[0.5, 1.0, 2.0, 5.0]);
    assert_matrix_eq!(normalized, expected, comp = exact);

    // An already reduced state passes through unchanged.
    let roundtrip = structure.normalize_state(&expected).unwrap();
    assert_matrix_eq!(roundtrip, expected, comp = exact);
}

#[test]
fn normalize_state_rejects_unrecognized_length() {
    let structure = TrialStructure::<f64>::plain(2);
    let state = DVector::<f64>::zeros(3);
    let error = structure.normalize_state(&state).unwrap_err();
    assert_eq!(error.quantity, "starting state");
    assert_eq!(error.actual, 3);
}

#[test]
fn write_state_into_infers_layout_from_size() {
    let structure = TrialStructure::<f64>::new(vec![
        TrialComponent::plain(1).fixed(),
        TrialComponent::plain(2),
    ]);
    let state = DVector::from_column_slice(&[9.0, 1.0, 2.0]);

    let mut free_only = DVector::zeros(2);
    structure
        .write_state_into(&state, &mut free_only)
        .unwrap();
    assert_matrix_eq!(free_only, DVector::from_column_slice(&[1.0, 2.0]), comp = exact);

    let mut composite = DVector::zeros(3);
    structure.write_state_into(&state, &mut composite).unwrap();
    assert_matrix_eq!(composite, state, comp = exact);

    let mut wrong = DVector::<f64>::zeros(5);
    assert!(structure.write_state_into(&state, &mut wrong).is_err());
}

#[test]
fn write_state_into_expands_embedded_components() {
    let structure = TrialStructure::<f64>::new(vec![TrialComponent::symmetric(2)]);
    let state = DVector::from_column_slice(&[1.0, 2.0, 5.0]);

    let mut reduced = DVector::zeros(3);
    structure.write_state_into(&state, &mut reduced).unwrap();
    assert_matrix_eq!(reduced, state, comp = exact);

    let mut expanded = DVector::zeros(4);
    structure.write_state_into(&state, &mut expanded).unwrap();
    assert_matrix_eq!(
        expanded,
        DVector::from_column_slice(&[1.0, 2.0, 2.0, 5.0]),
        comp = exact
    );
}

proptest! {
    #[test]
    fn embedding_roundtrip_is_identity(
        dim in 2usize..=4,
        values in proptest::collection::vec(-10.0..10.0f64, 10),
    ) {
        let embedding = Embedding::<f64>::symmetric(dim);
        let reduced = DVector::from_fn(embedding.reduced_dim(), |i, _| values[i]);
        let mut full = DVector::zeros(embedding.full_dim());
        embedding.expand_into(&DVectorView::from(&reduced), &mut DVectorViewMut::from(&mut full));
        let mut roundtrip = DVector::zeros(embedding.reduced_dim());
        embedding.contract_into(&DVectorView::from(&full), &mut DVectorViewMut::from(&mut roundtrip));
        assert_matrix_eq!(roundtrip, reduced, comp = abs, tol = 1e-12);
    }
}
