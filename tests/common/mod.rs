//! Common test utilities for treelite-rust integration tests.
#![allow(dead_code)]

use rand::prelude::*;
use treelite_rust::model_builder::{
    initialize_model, Metadata, ModelBuilder, PostProcessorFunc, TreeAnnotation,
};
use treelite_rust::{Model, Operator, TaskType, TypeInfo};

/// Threshold of every stump built by these helpers.
pub const STUMP_THRESHOLD: f64 = 0.0;

/// Declare a stump `feature[split_index] < threshold ? left : right` under
/// caller-chosen node keys.
pub fn add_stump(
    builder: &mut ModelBuilder,
    split_index: i32,
    threshold: f64,
    left: f64,
    right: f64,
) -> treelite_rust::Result<()> {
    builder.start_tree()?;
    builder.start_node(10)?;
    builder.numerical_test(split_index, threshold, true, Operator::Lt, 20, 30)?;
    builder.end_node()?;
    builder.start_node(20)?;
    builder.leaf_scalar(left)?;
    builder.end_node()?;
    builder.start_node(30)?;
    builder.leaf_scalar(right)?;
    builder.end_node()?;
    builder.end_tree()
}

/// Single stump on feature 0: `x < 0 ? -1 : 1`.
pub fn stump_model(type_info: TypeInfo, postprocessor: &str) -> Model {
    let metadata = Metadata::new(1, TaskType::BinaryClf, false, 1, vec![1], [1, 1]).unwrap();
    let annotation = TreeAnnotation::new(1, vec![0], vec![0]).unwrap();
    let mut builder = initialize_model(
        type_info,
        type_info,
        &metadata,
        &annotation,
        &PostProcessorFunc::new(postprocessor),
        &[0.0],
        None,
    )
    .unwrap();
    add_stump(&mut builder, 0, STUMP_THRESHOLD, -1.0, 1.0).unwrap();
    builder.commit_model().unwrap()
}

/// Leaf values of tree `round * num_class + class` in [`grove_per_class_model`].
pub fn grove_leaves(round: usize, class: usize) -> (f64, f64) {
    let scale = (class + 1) as f64 * 0.5 + round as f64 * 0.25;
    (-scale, scale)
}

/// Gradient-boosted multiclass model: `num_round` rounds of one stump per
/// class, stump `i` splitting on feature `i % 2`.
pub fn grove_per_class_model(num_round: usize, num_class: u32) -> Model {
    let num_tree = num_round * num_class as usize;
    let metadata =
        Metadata::new(2, TaskType::MultiClf, false, 1, vec![num_class], [1, 1]).unwrap();
    let class_id = (0..num_tree).map(|i| (i % num_class as usize) as i32).collect();
    let annotation = TreeAnnotation::new(num_tree as u32, vec![0; num_tree], class_id).unwrap();
    let base_scores = vec![0.0; num_class as usize];
    let mut builder = initialize_model(
        TypeInfo::Float64,
        TypeInfo::Float64,
        &metadata,
        &annotation,
        &PostProcessorFunc::new("softmax"),
        &base_scores,
        None,
    )
    .unwrap();
    for round in 0..num_round {
        for class in 0..num_class as usize {
            let (left, right) = grove_leaves(round, class);
            let tree_id = round * num_class as usize + class;
            add_stump(&mut builder, (tree_id % 2) as i32, STUMP_THRESHOLD, left, right).unwrap();
        }
    }
    builder.commit_model().unwrap()
}

/// Random forest of `num_tree` stumps on feature 0 with probability vectors
/// over `num_class` classes in the leaves, averaged.
pub fn forest_model(num_tree: usize, num_class: u32) -> Model {
    let metadata = Metadata::new(
        1,
        TaskType::MultiClf,
        true,
        1,
        vec![num_class],
        [1, num_class],
    )
    .unwrap();
    let annotation =
        TreeAnnotation::new(num_tree as u32, vec![0; num_tree], vec![-1; num_tree]).unwrap();
    let base_scores = vec![0.0; num_class as usize];
    let mut builder = initialize_model(
        TypeInfo::Float32,
        TypeInfo::Float32,
        &metadata,
        &annotation,
        &PostProcessorFunc::new("identity_multiclass"),
        &base_scores,
        None,
    )
    .unwrap();
    for tree_id in 0..num_tree {
        let (left, right) = forest_leaves(tree_id, num_class);
        builder.start_tree().unwrap();
        builder.start_node(0).unwrap();
        builder
            .numerical_test(0, tree_id as f64, false, Operator::Le, 1, 2)
            .unwrap();
        builder.end_node().unwrap();
        builder.start_node(1).unwrap();
        builder.leaf_vector(&left).unwrap();
        builder.end_node().unwrap();
        builder.start_node(2).unwrap();
        builder.leaf_vector(&right).unwrap();
        builder.end_node().unwrap();
        builder.end_tree().unwrap();
    }
    builder.commit_model().unwrap()
}

/// Leaf vectors `(left, right)` of tree `tree_id` in [`forest_model`]: all
/// mass on class `tree_id % num_class` on the left, on the next class on
/// the right.
pub fn forest_leaves(tree_id: usize, num_class: u32) -> (Vec<f32>, Vec<f32>) {
    let num_class = num_class as usize;
    let mut left = vec![0.0f32; num_class];
    let mut right = vec![0.0f32; num_class];
    left[tree_id % num_class] = 1.0;
    right[(tree_id + 1) % num_class] = 1.0;
    (left, right)
}

/// Single categorical split on feature 0: categories {1, 3, 5} go right.
pub fn categorical_model() -> Model {
    let metadata = Metadata::new(1, TaskType::Regressor, false, 1, vec![1], [1, 1]).unwrap();
    let annotation = TreeAnnotation::new(1, vec![0], vec![0]).unwrap();
    let mut builder = initialize_model(
        TypeInfo::Float64,
        TypeInfo::Float64,
        &metadata,
        &annotation,
        &PostProcessorFunc::new("identity"),
        &[0.0],
        None,
    )
    .unwrap();
    builder.start_tree().unwrap();
    builder.start_node(0).unwrap();
    builder.categorical_test(0, false, &[5, 1, 3], true, 1, 2).unwrap();
    builder.end_node().unwrap();
    builder.start_node(1).unwrap();
    builder.leaf_scalar(-1.0).unwrap();
    builder.end_node().unwrap();
    builder.start_node(2).unwrap();
    builder.leaf_scalar(1.0).unwrap();
    builder.end_node().unwrap();
    builder.end_tree().unwrap();
    builder.commit_model().unwrap()
}

/// Deterministic row-major feature matrix with values in `[-range, range)`.
pub fn random_rows(num_row: usize, num_feature: usize, range: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_row * num_feature)
        .map(|_| rng.gen_range(-range..range))
        .collect()
}
