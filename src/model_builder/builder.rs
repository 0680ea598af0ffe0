//! Incremental model construction.
//!
//! A [`ModelBuilder`] receives trees as a stream of node declarations. Callers
//! name nodes with arbitrary non-negative keys; the builder assigns compact
//! internal ids in declaration order (the first node of a tree is its root)
//! and translates child keys to ids when the tree is closed.
//!
//! A failed call leaves the builder in the state it had before the call.

use crate::core::error::{Result, TreeliteError};
use crate::core::types::{FloatValue, NodeId, Operator, TypeInfo, TypedValue};
use crate::ensure;
use crate::gtil::postprocessor::PostProcessorKind;
use crate::model_builder::metadata::{Metadata, PostProcessorFunc, TreeAnnotation};
use crate::model_builder::state::{transition, BuilderOp, BuilderState};
use crate::tree::model::{Model, ModelPreset, PresetVariant};
use crate::tree::tree::Tree;
use std::collections::HashMap;

/// Builder for one concrete threshold/leaf type.
#[derive(Debug)]
pub struct TypedModelBuilder<T> {
    expected_num_tree: u32,
    num_feature: i32,
    leaf_vector_shape: [u32; 2],
    model: Option<Model>,
    trees: Vec<Tree<T, T>>,
    current_tree: Tree<T, T>,
    node_id_map: HashMap<i32, NodeId>,
    child_keys: Vec<Option<(i32, i32)>>,
    current_node_id: NodeId,
    current_node_key: i32,
    state: BuilderState,
}

impl<T> TypedModelBuilder<T>
where
    T: FloatValue,
    ModelPreset<T, T>: PresetVariant,
{
    /// Validate the descriptors and prepare an empty model.
    pub fn new(
        metadata: &Metadata,
        tree_annotation: &TreeAnnotation,
        postprocessor: &PostProcessorFunc,
        base_scores: &[f64],
        attributes: Option<&str>,
    ) -> Result<Self> {
        metadata.validate()?;
        tree_annotation.validate()?;
        tree_annotation.validate_against(metadata)?;

        let max_num_class = metadata.max_num_class();
        let expected_scores = metadata.num_target as usize * max_num_class as usize;
        ensure!(
            base_scores.len() == expected_scores,
            TreeliteError::dimension_mismatch(
                format!("{} base scores (num_target * max_num_class)", expected_scores),
                format!("{} base scores", base_scores.len())
            )
        );

        let kind: PostProcessorKind = postprocessor.name.parse()?;
        let params = postprocessor.params()?;

        let mut model = Model::from_variant(ModelPreset::<T, T>::default().into_variant());
        model.num_feature = metadata.num_feature;
        model.task_type = metadata.task_type;
        model.average_tree_output = metadata.average_tree_output;
        model.num_target = metadata.num_target;
        model.num_class = metadata.num_class.clone().into();
        model.leaf_vector_shape = metadata.leaf_vector_shape.to_vec().into();
        model.target_id = tree_annotation.target_id.clone().into();
        model.class_id = tree_annotation.class_id.clone().into();
        model.postprocessor = postprocessor.name.clone();
        if kind.uses_sigmoid_alpha() {
            if let Some(alpha) = params.sigmoid_alpha {
                model.sigmoid_alpha = alpha;
            }
        }
        if kind == PostProcessorKind::ExponentialStandardRatio {
            if let Some(ratio_c) = params.ratio_c {
                model.ratio_c = ratio_c;
            }
        }
        model.base_scores = base_scores.to_vec().into();
        if let Some(attributes) = attributes {
            let parsed: serde_json::Value = serde_json::from_str(attributes)?;
            ensure!(
                parsed.is_object(),
                TreeliteError::config("attributes must be a JSON object")
            );
            model.attributes = attributes.to_string();
        }

        log::debug!(
            "Initialized {} model builder expecting {} trees",
            T::TYPE_INFO,
            tree_annotation.num_tree
        );
        Ok(Self {
            expected_num_tree: tree_annotation.num_tree,
            num_feature: metadata.num_feature,
            leaf_vector_shape: metadata.leaf_vector_shape,
            model: Some(model),
            trees: Vec::with_capacity(tree_annotation.num_tree as usize),
            current_tree: Tree::new(),
            node_id_map: HashMap::new(),
            child_keys: Vec::new(),
            current_node_id: 0,
            current_node_key: -1,
            state: BuilderState::ExpectTree,
        })
    }

    /// Current protocol state.
    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// Begin a new tree.
    pub fn start_tree(&mut self) -> Result<()> {
        let next = transition(BuilderOp::StartTree, self.state)?;
        ensure!(
            (self.trees.len() as u64) < u64::from(self.expected_num_tree),
            TreeliteError::protocol(format!(
                "cannot start tree {}: the model was declared with {} trees",
                self.trees.len(),
                self.expected_num_tree
            ))
        );
        self.current_tree = Tree::new();
        self.node_id_map.clear();
        self.child_keys.clear();
        self.state = next;
        Ok(())
    }

    /// Close the current tree, translating child keys into node ids.
    pub fn end_tree(&mut self) -> Result<()> {
        let next = transition(BuilderOp::EndTree, self.state)?;
        let num_nodes = self.current_tree.num_nodes();
        ensure!(
            num_nodes > 0,
            TreeliteError::structural("cannot end a tree with no nodes")
        );

        let mut links = Vec::new();
        for (nid, keys) in self.child_keys.iter().enumerate() {
            if let Some((left_key, right_key)) = *keys {
                let left = self.lookup_key(left_key)?;
                let right = self.lookup_key(right_key)?;
                links.push((nid, left, right));
            }
        }

        // Link a copy so a rejected tree stays as it was declared.
        let mut tree = self.current_tree.clone();
        for &(nid, left, right) in &links {
            tree.set_children(nid, left, right)?;
        }
        tree.validate()?;
        self.current_tree = Tree::new();
        log::debug!("Finished tree {} with {} nodes", self.trees.len(), num_nodes);
        self.trees.push(tree);
        self.node_id_map.clear();
        self.child_keys.clear();
        self.state = next;
        Ok(())
    }

    /// Begin a node identified by the caller's `node_key`.
    pub fn start_node(&mut self, node_key: i32) -> Result<()> {
        let next = transition(BuilderOp::StartNode, self.state)?;
        ensure!(
            node_key >= 0,
            TreeliteError::structural(format!("node key must be non-negative, got {}", node_key))
        );
        ensure!(
            !self.node_id_map.contains_key(&node_key),
            TreeliteError::structural(format!("node key {} was already declared in this tree", node_key))
        );
        let nid = self.current_tree.alloc_node()?;
        self.node_id_map.insert(node_key, nid);
        self.child_keys.push(None);
        self.current_node_id = nid;
        self.current_node_key = node_key;
        self.state = next;
        Ok(())
    }

    /// Close the current node.
    pub fn end_node(&mut self) -> Result<()> {
        self.state = transition(BuilderOp::EndNode, self.state)?;
        Ok(())
    }

    /// Declare the current node as `feature[split_index] <cmp> threshold`.
    #[allow(clippy::too_many_arguments)]
    pub fn numerical_test(
        &mut self,
        split_index: i32,
        threshold: f64,
        default_left: bool,
        cmp: Operator,
        left_child_key: i32,
        right_child_key: i32,
    ) -> Result<()> {
        let next = transition(BuilderOp::NumericalTest, self.state)?;
        let split_index = self.check_split_index(split_index)?;
        self.check_child_keys(left_child_key, right_child_key)?;
        ensure!(
            cmp != Operator::None,
            TreeliteError::structural("numerical test requires a comparison operator")
        );
        self.current_tree.set_numerical_split(
            self.current_node_id,
            split_index,
            T::cast_from(threshold),
            default_left,
            cmp,
        )?;
        self.child_keys[self.current_node_id] = Some((left_child_key, right_child_key));
        self.state = next;
        Ok(())
    }

    /// Declare the current node as a membership test of `feature[split_index]`
    /// in `category_list`.
    pub fn categorical_test(
        &mut self,
        split_index: i32,
        default_left: bool,
        category_list: &[u32],
        category_list_right_child: bool,
        left_child_key: i32,
        right_child_key: i32,
    ) -> Result<()> {
        let next = transition(BuilderOp::CategoricalTest, self.state)?;
        let split_index = self.check_split_index(split_index)?;
        self.check_child_keys(left_child_key, right_child_key)?;
        self.current_tree.set_categorical_split(
            self.current_node_id,
            split_index,
            default_left,
            category_list,
            category_list_right_child,
        )?;
        self.child_keys[self.current_node_id] = Some((left_child_key, right_child_key));
        self.state = next;
        Ok(())
    }

    /// Declare the current node as a leaf with a scalar output.
    pub fn leaf_scalar(&mut self, leaf_value: f64) -> Result<()> {
        let next = transition(BuilderOp::LeafScalar, self.state)?;
        ensure!(
            self.leaf_vector_shape == [1, 1],
            TreeliteError::structural(format!(
                "scalar leaf requires leaf_vector_shape [1, 1], model has {:?}",
                self.leaf_vector_shape
            ))
        );
        self.current_tree
            .set_leaf(self.current_node_id, T::cast_from(leaf_value))?;
        self.state = next;
        Ok(())
    }

    /// Declare the current node as a leaf with a vector output.
    ///
    /// The element type must match the model's leaf type.
    pub fn leaf_vector<V: TypedValue>(&mut self, leaf_vector: &[V]) -> Result<()> {
        let next = transition(BuilderOp::LeafVector, self.state)?;
        ensure!(
            V::TYPE_INFO == T::TYPE_INFO,
            TreeliteError::type_mismatch(format!(
                "mismatched type for leaf vector: expected {}, got {}",
                T::TYPE_INFO,
                V::TYPE_INFO
            ))
        );
        let [d0, d1] = self.leaf_vector_shape;
        let expected_len = d0 as usize * d1 as usize;
        ensure!(
            leaf_vector.len() == expected_len,
            TreeliteError::structural(format!(
                "leaf vector must have length {} (leaf_vector_shape {:?}), got {}",
                expected_len,
                self.leaf_vector_shape,
                leaf_vector.len()
            ))
        );
        let values: Vec<T> = leaf_vector.iter().map(|&v| T::cast_from(v)).collect();
        self.current_tree
            .set_leaf_vector(self.current_node_id, &values)?;
        self.state = next;
        Ok(())
    }

    /// Attach the split gain to the current node.
    pub fn gain(&mut self, gain: f64) -> Result<()> {
        let next = transition(BuilderOp::Gain, self.state)?;
        self.current_tree.set_gain(self.current_node_id, gain)?;
        self.state = next;
        Ok(())
    }

    /// Attach the training row count to the current node.
    pub fn data_count(&mut self, data_count: u64) -> Result<()> {
        let next = transition(BuilderOp::DataCount, self.state)?;
        self.current_tree
            .set_data_count(self.current_node_id, data_count)?;
        self.state = next;
        Ok(())
    }

    /// Attach the hessian sum to the current node.
    pub fn sum_hess(&mut self, sum_hess: f64) -> Result<()> {
        let next = transition(BuilderOp::SumHess, self.state)?;
        self.current_tree.set_sum_hess(self.current_node_id, sum_hess)?;
        self.state = next;
        Ok(())
    }

    /// Hand out the finished model.
    pub fn commit_model(&mut self) -> Result<Model> {
        let next = transition(BuilderOp::CommitModel, self.state)?;
        ensure!(
            self.trees.len() as u64 == u64::from(self.expected_num_tree),
            TreeliteError::protocol(format!(
                "expected {} trees but only got {} trees instead",
                self.expected_num_tree,
                self.trees.len()
            ))
        );
        let mut model = self
            .model
            .take()
            .ok_or_else(|| TreeliteError::protocol("model was already committed"))?;
        let preset = ModelPreset {
            trees: std::mem::take(&mut self.trees),
        };
        model.variant = preset.into_variant();
        model.refresh_header();
        self.state = next;
        log::debug!("Committed model with {} trees", model.num_tree());
        Ok(model)
    }

    fn lookup_key(&self, key: i32) -> Result<NodeId> {
        self.node_id_map.get(&key).copied().ok_or_else(|| {
            TreeliteError::structural(format!(
                "node key {} is referenced as a child but was never declared",
                key
            ))
        })
    }

    fn check_split_index(&self, split_index: i32) -> Result<u32> {
        ensure!(
            split_index >= 0 && split_index < self.num_feature,
            TreeliteError::structural(format!(
                "split_index {} is out of range for num_feature = {}",
                split_index, self.num_feature
            ))
        );
        Ok(split_index as u32)
    }

    fn check_child_keys(&self, left_child_key: i32, right_child_key: i32) -> Result<()> {
        ensure!(
            left_child_key >= 0 && right_child_key >= 0,
            TreeliteError::structural(format!(
                "child keys must be non-negative, got ({}, {})",
                left_child_key, right_child_key
            ))
        );
        ensure!(
            left_child_key != right_child_key,
            TreeliteError::structural(format!(
                "left and right child keys must differ, got {} twice",
                left_child_key
            ))
        );
        ensure!(
            left_child_key != self.current_node_key && right_child_key != self.current_node_key,
            TreeliteError::structural(format!(
                "node {} cannot be its own child",
                self.current_node_key
            ))
        );
        Ok(())
    }
}

#[derive(Debug)]
enum BuilderVariant {
    F32(TypedModelBuilder<f32>),
    F64(TypedModelBuilder<f64>),
}

macro_rules! dispatch_builder {
    ($variant:expr, $builder:ident => $body:expr) => {
        match $variant {
            BuilderVariant::F32($builder) => $body,
            BuilderVariant::F64($builder) => $body,
        }
    };
}

/// Type-erased model builder; see [`initialize_model`].
#[derive(Debug)]
pub struct ModelBuilder {
    inner: BuilderVariant,
}

impl ModelBuilder {
    /// Current protocol state.
    pub fn state(&self) -> BuilderState {
        dispatch_builder!(&self.inner, b => b.state())
    }

    /// Begin a new tree.
    pub fn start_tree(&mut self) -> Result<()> {
        dispatch_builder!(&mut self.inner, b => b.start_tree())
    }

    /// Close the current tree.
    pub fn end_tree(&mut self) -> Result<()> {
        dispatch_builder!(&mut self.inner, b => b.end_tree())
    }

    /// Begin a node identified by `node_key`.
    pub fn start_node(&mut self, node_key: i32) -> Result<()> {
        dispatch_builder!(&mut self.inner, b => b.start_node(node_key))
    }

    /// Close the current node.
    pub fn end_node(&mut self) -> Result<()> {
        dispatch_builder!(&mut self.inner, b => b.end_node())
    }

    /// Declare a numerical test on the current node.
    pub fn numerical_test(
        &mut self,
        split_index: i32,
        threshold: f64,
        default_left: bool,
        cmp: Operator,
        left_child_key: i32,
        right_child_key: i32,
    ) -> Result<()> {
        dispatch_builder!(&mut self.inner, b => b.numerical_test(
            split_index,
            threshold,
            default_left,
            cmp,
            left_child_key,
            right_child_key,
        ))
    }

    /// Declare a categorical test on the current node.
    pub fn categorical_test(
        &mut self,
        split_index: i32,
        default_left: bool,
        category_list: &[u32],
        category_list_right_child: bool,
        left_child_key: i32,
        right_child_key: i32,
    ) -> Result<()> {
        dispatch_builder!(&mut self.inner, b => b.categorical_test(
            split_index,
            default_left,
            category_list,
            category_list_right_child,
            left_child_key,
            right_child_key,
        ))
    }

    /// Declare a scalar leaf.
    pub fn leaf_scalar(&mut self, leaf_value: f64) -> Result<()> {
        dispatch_builder!(&mut self.inner, b => b.leaf_scalar(leaf_value))
    }

    /// Declare a vector leaf.
    pub fn leaf_vector<V: TypedValue>(&mut self, leaf_vector: &[V]) -> Result<()> {
        dispatch_builder!(&mut self.inner, b => b.leaf_vector(leaf_vector))
    }

    /// Attach the split gain.
    pub fn gain(&mut self, gain: f64) -> Result<()> {
        dispatch_builder!(&mut self.inner, b => b.gain(gain))
    }

    /// Attach the training row count.
    pub fn data_count(&mut self, data_count: u64) -> Result<()> {
        dispatch_builder!(&mut self.inner, b => b.data_count(data_count))
    }

    /// Attach the hessian sum.
    pub fn sum_hess(&mut self, sum_hess: f64) -> Result<()> {
        dispatch_builder!(&mut self.inner, b => b.sum_hess(sum_hess))
    }

    /// Hand out the finished model.
    pub fn commit_model(&mut self) -> Result<Model> {
        dispatch_builder!(&mut self.inner, b => b.commit_model())
    }
}

/// Create a builder for a model with the given types and descriptors.
///
/// Builders only produce float models whose leaf type equals the threshold
/// type.
pub fn initialize_model(
    threshold_type: TypeInfo,
    leaf_output_type: TypeInfo,
    metadata: &Metadata,
    tree_annotation: &TreeAnnotation,
    postprocessor: &PostProcessorFunc,
    base_scores: &[f64],
    attributes: Option<&str>,
) -> Result<ModelBuilder> {
    ensure!(
        leaf_output_type == threshold_type,
        TreeliteError::type_mismatch(format!(
            "model builder requires leaf_output_type ({}) to equal threshold_type ({})",
            leaf_output_type, threshold_type
        ))
    );
    let inner = match threshold_type {
        TypeInfo::Float32 => BuilderVariant::F32(TypedModelBuilder::new(
            metadata,
            tree_annotation,
            postprocessor,
            base_scores,
            attributes,
        )?),
        TypeInfo::Float64 => BuilderVariant::F64(TypedModelBuilder::new(
            metadata,
            tree_annotation,
            postprocessor,
            base_scores,
            attributes,
        )?),
        other => {
            return Err(TreeliteError::type_mismatch(format!(
                "model builder requires float32 or float64 thresholds, got {}",
                other
            )))
        }
    };
    Ok(ModelBuilder { inner })
}
