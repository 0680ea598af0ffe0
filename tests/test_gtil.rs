mod common;

use approx::assert_relative_eq;
use common::*;
use proptest::prelude::*;
use treelite_rust::gtil::{self, get_output_shape, get_output_size, Configuration, PredictKind};
use treelite_rust::model_builder::{initialize_model, Metadata, PostProcessorFunc, TreeAnnotation};
use treelite_rust::{Model, Operator, TaskType, TypeInfo};

fn run(model: &Model, input: &[f64], num_row: usize, kind: PredictKind) -> Vec<f64> {
    let config = Configuration::new().with_pred_kind(kind);
    let mut output = vec![0.0; get_output_size(model, num_row as u64, &config) as usize];
    gtil::predict(model, input, num_row, &mut output, &config).unwrap();
    output
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.iter().map(|e| e / total).collect()
}

/// Two targets with two classes each, one stump per `(target, class)`.
fn two_target_model() -> Model {
    let metadata = Metadata::new(1, TaskType::MultiClf, false, 2, vec![2, 2], [1, 1]).unwrap();
    let annotation = TreeAnnotation::new(4, vec![0, 0, 1, 1], vec![0, 1, 0, 1]).unwrap();
    let mut builder = initialize_model(
        TypeInfo::Float64,
        TypeInfo::Float64,
        &metadata,
        &annotation,
        &PostProcessorFunc::new("identity"),
        &[0.0, 0.5, 1.0, 1.5],
        None,
    )
    .unwrap();
    for tree_id in 0..4 {
        let v = (tree_id + 1) as f64 * 10.0;
        add_stump(&mut builder, 0, STUMP_THRESHOLD, -v, v).unwrap();
    }
    builder.commit_model().unwrap()
}

/// Six stumps on feature 0 (`x < 0` goes left), two per class.
fn paired_grove_model() -> Model {
    let metadata = Metadata::new(1, TaskType::MultiClf, false, 1, vec![3], [1, 1]).unwrap();
    let annotation = TreeAnnotation::new(6, vec![0; 6], vec![0, 1, 2, 0, 1, 2]).unwrap();
    let mut builder = initialize_model(
        TypeInfo::Float64,
        TypeInfo::Float64,
        &metadata,
        &annotation,
        &PostProcessorFunc::new("softmax"),
        &[0.3, 0.2, 0.5],
        None,
    )
    .unwrap();
    let leaves = [(-1.0, 1.0), (1.0, -1.0), (0.5, 0.5), (-1.0, 0.0), (0.0, -1.0), (0.5, 1.5)];
    for (left, right) in leaves {
        add_stump(&mut builder, 0, 0.0, left, right).unwrap();
    }
    builder.commit_model().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stump_missing_value_goes_right() {
        let metadata = Metadata::new(1, TaskType::Regressor, false, 1, vec![1], [1, 1]).unwrap();
        let annotation = TreeAnnotation::new(1, vec![0], vec![0]).unwrap();
        let mut builder = initialize_model(
            TypeInfo::Float32,
            TypeInfo::Float32,
            &metadata,
            &annotation,
            &PostProcessorFunc::new("identity"),
            &[0.0],
            None,
        )
        .unwrap();
        builder.start_tree().unwrap();
        builder.start_node(0).unwrap();
        builder.numerical_test(0, 0.0, false, Operator::Lt, 1, 2).unwrap();
        builder.end_node().unwrap();
        builder.start_node(1).unwrap();
        builder.leaf_scalar(-1.0).unwrap();
        builder.end_node().unwrap();
        builder.start_node(2).unwrap();
        builder.leaf_scalar(1.0).unwrap();
        builder.end_node().unwrap();
        builder.end_tree().unwrap();
        let model = builder.commit_model().unwrap();

        let config = Configuration::new().with_pred_kind(PredictKind::Raw);
        let mut output = vec![0.0f32; 3];
        gtil::predict(&model, &[1.0f32, -1.0, f32::NAN], 3, &mut output, &config).unwrap();
        assert_eq!(output, vec![1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_grove_with_base_scores() {
        let model = paired_grove_model();
        let raw = run(&model, &[1.0], 1, PredictKind::Raw);
        let expected = [0.3 + 1.0 + 0.0, 0.2 - 1.0 - 1.0, 0.5 + 0.5 + 1.5];
        for (got, want) in raw.iter().zip(expected.iter()) {
            assert_relative_eq!(*got, *want, epsilon = 1e-12);
        }
        let probs = run(&model, &[1.0], 1, PredictKind::Default);
        for (got, want) in probs.iter().zip(softmax(&expected).iter()) {
            assert_relative_eq!(*got, *want, epsilon = 1e-12);
        }

        let leaf_config = Configuration::new().with_pred_kind(PredictKind::LeafId);
        assert_eq!(get_output_shape(&model, 7, &leaf_config), vec![7, 6]);
    }

    #[test]
    fn test_stump_raw_and_missing() {
        let model = stump_model(TypeInfo::Float64, "identity");
        let output = run(&model, &[-1.0, 0.5, 0.0, f64::NAN], 4, PredictKind::Raw);
        // default_left sends missing values to the left leaf
        assert_eq!(output, vec![-1.0, 1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_stump_sigmoid_f32() {
        let model = stump_model(TypeInfo::Float32, "sigmoid");
        let config = Configuration::new();
        let mut output = vec![0.0f32; 2];
        gtil::predict(&model, &[-3.0f32, 3.0], 2, &mut output, &config).unwrap();
        assert_relative_eq!(output[0], 1.0 / (1.0 + 1.0f32.exp()));
        assert_relative_eq!(output[1], 1.0 / (1.0 + (-1.0f32).exp()));
    }

    #[test]
    fn test_grove_per_class_softmax() {
        let num_round = 2;
        let num_class = 3u32;
        let model = grove_per_class_model(num_round, num_class);
        let num_row = 50;
        let input = random_rows(num_row, 2, 2.0, 7);

        let output = run(&model, &input, num_row, PredictKind::Default);
        let raw = run(&model, &input, num_row, PredictKind::Raw);
        assert_eq!(get_output_shape(&model, num_row as u64, &Configuration::new()), vec![50, 3]);

        for row in 0..num_row {
            let mut expected = vec![0.0; num_class as usize];
            for round in 0..num_round {
                for class in 0..num_class as usize {
                    let tree_id = round * num_class as usize + class;
                    let (left, right) = grove_leaves(round, class);
                    let x = input[row * 2 + tree_id % 2];
                    expected[class] += if x < STUMP_THRESHOLD { left } else { right };
                }
            }
            let row_raw = &raw[row * 3..row * 3 + 3];
            for (got, want) in row_raw.iter().zip(expected.iter()) {
                assert_relative_eq!(*got, *want, epsilon = 1e-12);
            }
            let probs = softmax(&expected);
            let row_out = &output[row * 3..row * 3 + 3];
            for (got, want) in row_out.iter().zip(probs.iter()) {
                assert_relative_eq!(*got, *want, epsilon = 1e-12);
            }
            assert_relative_eq!(row_out.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_forest_leaf_vectors_are_averaged() {
        let num_tree = 4;
        let num_class = 3u32;
        let model = forest_model(num_tree, num_class);
        let input = [-1.0f32, 1.5, 10.0];
        let config = Configuration::new().with_pred_kind(PredictKind::Raw);
        let mut output = vec![0.0f32; 9];
        gtil::predict(&model, &input, 3, &mut output, &config).unwrap();

        for (row, &x) in input.iter().enumerate() {
            let mut expected = vec![0.0f32; num_class as usize];
            for tree_id in 0..num_tree {
                let (left, right) = forest_leaves(tree_id, num_class);
                let leaf = if x <= tree_id as f32 { left } else { right };
                for (e, v) in expected.iter_mut().zip(leaf) {
                    *e += v;
                }
            }
            for c in 0..num_class as usize {
                assert_relative_eq!(output[row * 3 + c], expected[c] / num_tree as f32);
            }
        }
        // x = 1.5: trees 0, 1 go right (classes 1, 2); trees 2, 3 go left (classes 2, 0)
        assert_eq!(&output[3..6], &[0.25, 0.25, 0.5]);
    }

    #[test]
    fn test_multi_target_layout() {
        let model = two_target_model();
        let input = [-1.0, 1.0, 2.0];
        let output = run(&model, &input, 3, PredictKind::Raw);
        let config = Configuration::new().with_pred_kind(PredictKind::Raw);
        assert_eq!(get_output_shape(&model, 3, &config), vec![2, 3, 2]);

        let base_scores = [0.0, 0.5, 1.0, 1.5];
        for target in 0..2 {
            for (row, &x) in input.iter().enumerate() {
                for class in 0..2 {
                    let slot = target * 2 + class;
                    let v = (slot + 1) as f64 * 10.0;
                    let leaf = if x < STUMP_THRESHOLD { -v } else { v };
                    assert_eq!(output[target * 6 + row * 2 + class], leaf + base_scores[slot]);
                }
            }
        }
    }

    #[test]
    fn test_categorical_membership() {
        let model = categorical_model();
        let input = [1.0, 2.0, 3.0, 3.5, -1.0, 5.0, f64::NAN, 1e20];
        let output = run(&model, &input, input.len(), PredictKind::Raw);
        assert_eq!(output, vec![1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_leaf_id_output() {
        let model = stump_model(TypeInfo::Float64, "identity");
        let output = run(&model, &[-1.0, 1.0, f64::NAN], 3, PredictKind::LeafId);
        assert_eq!(output, vec![1.0, 2.0, 1.0]);

        let grove = grove_per_class_model(1, 2);
        let config = Configuration::new().with_pred_kind(PredictKind::LeafId);
        assert_eq!(get_output_shape(&grove, 4, &config), vec![4, 2]);
        let output = run(&grove, &[-1.0, 1.0, 1.0, -1.0], 2, PredictKind::LeafId);
        assert_eq!(output, vec![1.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn test_score_per_tree_output() {
        let model = forest_model(2, 3);
        let config = Configuration::new().with_pred_kind(PredictKind::PerTree);
        assert_eq!(get_output_shape(&model, 1, &config), vec![1, 2, 3]);
        let mut output = vec![0.0f32; 6];
        gtil::predict(&model, &[0.5f32], 1, &mut output, &config).unwrap();
        // tree 0: 0.5 > 0 goes right (class 1); tree 1: 0.5 <= 1 goes left (class 1)
        assert_eq!(output, vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0]);

        let stump = stump_model(TypeInfo::Float64, "sigmoid");
        let output = run(&stump, &[-2.0, 2.0], 2, PredictKind::PerTree);
        assert_eq!(output, vec![-1.0, 1.0]);
    }

    #[test]
    fn test_shape_contract_errors() {
        let model = stump_model(TypeInfo::Float64, "identity");
        let config = Configuration::new();

        let mut short = vec![0.0f64; 1];
        let err = gtil::predict(&model, &[0.0, 1.0], 2, &mut short, &config).unwrap_err();
        assert_eq!(err.category(), "dimension_mismatch");

        let mut wrong_type = vec![0.0f32; 2];
        let err = gtil::predict(&model, &[0.0f32, 1.0], 2, &mut wrong_type, &config).unwrap_err();
        assert_eq!(err.category(), "type_mismatch");

        let mut output = vec![0.0f64; 2];
        let bad_threads = Configuration::new().with_nthread(-2);
        let err = gtil::predict(&model, &[0.0, 1.0], 2, &mut output, &bad_threads).unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_zero_rows() {
        let model = grove_per_class_model(1, 3);
        let output = run(&model, &[], 0, PredictKind::Default);
        assert!(output.is_empty());
    }

    #[test]
    fn test_thread_count_does_not_change_results() {
        let model = grove_per_class_model(3, 4);
        let num_row = 1000;
        let input = random_rows(num_row, 2, 3.0, 99);
        let size = get_output_size(&model, num_row as u64, &Configuration::new()) as usize;

        let mut reference = vec![0.0; size];
        let single = Configuration::new().with_nthread(-1);
        gtil::predict(&model, &input, num_row, &mut reference, &single).unwrap();

        for nthread in [0, 2, 3, 8] {
            let config = Configuration::new().with_nthread(nthread);
            let mut output = vec![0.0; size];
            gtil::predict(&model, &input, num_row, &mut output, &config).unwrap();
            assert_eq!(output, reference, "nthread = {}", nthread);
        }
    }

    #[test]
    fn test_configuration_json_drives_prediction() {
        let model = stump_model(TypeInfo::Float64, "sigmoid");
        let config = Configuration::from_json(r#"{"predict_type": "raw", "nthread": 1}"#).unwrap();
        let mut output = vec![0.0f64; 1];
        gtil::predict(&model, &[5.0], 1, &mut output, &config).unwrap();
        assert_eq!(output, vec![1.0]);
    }

    proptest! {
        #[test]
        fn prop_stump_matches_threshold(x in -1.0e6f64..1.0e6) {
            let model = stump_model(TypeInfo::Float64, "identity");
            let output = run(&model, &[x], 1, PredictKind::Raw);
            prop_assert_eq!(output[0], if x < STUMP_THRESHOLD { -1.0 } else { 1.0 });
            let leaf = run(&model, &[x], 1, PredictKind::LeafId);
            prop_assert_eq!(leaf[0], if x < STUMP_THRESHOLD { 1.0 } else { 2.0 });
        }
    }
}
