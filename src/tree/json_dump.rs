//! Human-readable JSON rendering of a model.
//!
//! Field order is fixed so that dumps of equal models compare equal as
//! strings.

use crate::core::error::Result;
use crate::core::types::{NodeId, TreeNodeType, TypedValue};
use crate::dispatch_preset;
use crate::tree::model::{Model, ModelVariant};
use crate::tree::tree::Tree;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

impl Model {
    /// Render the model as JSON, optionally pretty-printed.
    pub fn dump_as_json(&self, pretty_print: bool) -> Result<String> {
        let dump = ModelDump(self);
        let json = if pretty_print {
            serde_json::to_string_pretty(&dump)?
        } else {
            serde_json::to_string(&dump)?
        };
        Ok(json)
    }
}

struct ModelDump<'a>(&'a Model);

impl Serialize for ModelDump<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let model = self.0;
        let mut s = serializer.serialize_struct("Model", 14)?;
        s.serialize_field("num_feature", &model.num_feature)?;
        s.serialize_field("task_type", &model.task_type)?;
        s.serialize_field("average_tree_output", &model.average_tree_output)?;
        s.serialize_field("num_target", &model.num_target)?;
        s.serialize_field("num_class", model.num_class.as_slice())?;
        s.serialize_field("leaf_vector_shape", model.leaf_vector_shape.as_slice())?;
        s.serialize_field("target_id", model.target_id.as_slice())?;
        s.serialize_field("class_id", model.class_id.as_slice())?;
        s.serialize_field("postprocessor", &model.postprocessor)?;
        s.serialize_field("sigmoid_alpha", &model.sigmoid_alpha)?;
        s.serialize_field("ratio_c", &model.ratio_c)?;
        s.serialize_field("base_scores", model.base_scores.as_slice())?;
        s.serialize_field("attributes", &model.attributes)?;
        s.serialize_field("trees", &TreesDump(&model.variant))?;
        s.end()
    }
}

struct TreesDump<'a>(&'a ModelVariant);

impl Serialize for TreesDump<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        dispatch_preset!(self.0, preset => serializer.collect_seq(preset.trees.iter().map(TreeDump)))
    }
}

struct TreeDump<'a, T, L>(&'a Tree<T, L>);

impl<T: TypedValue, L: TypedValue> Serialize for TreeDump<'_, T, L> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let tree = self.0;
        let mut s = serializer.serialize_struct("Tree", 3)?;
        s.serialize_field("num_nodes", &tree.num_nodes)?;
        s.serialize_field("has_categorical_split", &tree.has_categorical_split())?;
        let nodes: Vec<NodeDump<'_, T, L>> = (0..tree.num_nodes()).map(|nid| NodeDump { tree, nid }).collect();
        s.serialize_field("nodes", &nodes)?;
        s.end()
    }
}

struct NodeDump<'a, T, L> {
    tree: &'a Tree<T, L>,
    nid: NodeId,
}

impl<T: TypedValue, L: TypedValue> Serialize for NodeDump<'_, T, L> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let (tree, nid) = (self.tree, self.nid);
        let mut m = serializer.serialize_map(None)?;
        m.serialize_entry("node_id", &nid)?;
        if tree.is_leaf(nid) {
            if tree.has_leaf_vector(nid) {
                m.serialize_entry("leaf_value", tree.leaf_vector(nid))?;
            } else {
                m.serialize_entry("leaf_value", &tree.leaf_value(nid))?;
            }
        } else {
            let node_type = tree.node_type(nid);
            m.serialize_entry("split_feature_id", &tree.split_index(nid))?;
            m.serialize_entry("default_left", &tree.default_left(nid))?;
            m.serialize_entry("node_type", &node_type)?;
            if node_type == TreeNodeType::CategoricalTestNode {
                m.serialize_entry("category_list", tree.category_list(nid))?;
                m.serialize_entry("category_list_right_child", &tree.category_list_right_child(nid))?;
            } else {
                m.serialize_entry("comparison_op", &tree.comparison_op(nid))?;
                m.serialize_entry("threshold", &tree.threshold(nid))?;
            }
            m.serialize_entry("left_child", &tree.left_child(nid))?;
            m.serialize_entry("right_child", &tree.right_child(nid))?;
        }
        if let Some(count) = tree.data_count(nid) {
            m.serialize_entry("data_count", &count)?;
        }
        if let Some(sum_hess) = tree.sum_hess(nid) {
            m.serialize_entry("sum_hess", &sum_hess)?;
        }
        if let Some(gain) = tree.gain(nid) {
            m.serialize_entry("gain", &gain)?;
        }
        m.end()
    }
}
