//! Builder construction from a JSON document.
//!
//! ```json
//! {
//!   "threshold_type": "float64",
//!   "leaf_output_type": "float64",
//!   "metadata": {
//!     "num_feature": 2, "task_type": "kBinaryClf", "average_tree_output": false,
//!     "num_target": 1, "num_class": [1], "leaf_vector_shape": [1, 1]
//!   },
//!   "tree_annotation": {"num_tree": 1, "target_id": [0], "class_id": [0]},
//!   "postprocessor": {"name": "sigmoid", "config": {"sigmoid_alpha": 2.0}},
//!   "base_scores": [0.0],
//!   "attributes": {"origin": "example"}
//! }
//! ```

use crate::core::error::{Result, TreeliteError};
use crate::core::types::{TaskType, TypeInfo};
use crate::model_builder::builder::{initialize_model, ModelBuilder};
use crate::model_builder::metadata::{Metadata, PostProcessorFunc, TreeAnnotation};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuilderDocument {
    threshold_type: TypeInfo,
    leaf_output_type: TypeInfo,
    metadata: MetadataFields,
    tree_annotation: TreeAnnotationFields,
    #[serde(alias = "pred_transform")]
    postprocessor: PostProcessorFields,
    base_scores: Vec<f64>,
    #[serde(default)]
    attributes: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MetadataFields {
    num_feature: i32,
    task_type: TaskType,
    average_tree_output: bool,
    num_target: u32,
    num_class: Vec<u32>,
    leaf_vector_shape: [u32; 2],
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TreeAnnotationFields {
    num_tree: u32,
    target_id: Vec<i32>,
    class_id: Vec<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PostProcessorFields {
    name: String,
    #[serde(default)]
    config: Option<Value>,
}

/// Create a [`ModelBuilder`] from a JSON description of the model header.
pub fn get_model_builder_from_json(json_str: &str) -> Result<ModelBuilder> {
    let doc: BuilderDocument = serde_json::from_str(json_str)?;

    let metadata = Metadata::new(
        doc.metadata.num_feature,
        doc.metadata.task_type,
        doc.metadata.average_tree_output,
        doc.metadata.num_target,
        doc.metadata.num_class,
        doc.metadata.leaf_vector_shape,
    )?;
    let tree_annotation = TreeAnnotation::new(
        doc.tree_annotation.num_tree,
        doc.tree_annotation.target_id,
        doc.tree_annotation.class_id,
    )?;
    let postprocessor = match doc.postprocessor.config {
        Some(config) => {
            if !config.is_object() {
                return Err(TreeliteError::config(
                    "postprocessor.config must be a JSON object",
                ));
            }
            PostProcessorFunc::with_config(doc.postprocessor.name, config.to_string())
        }
        None => PostProcessorFunc::new(doc.postprocessor.name),
    };
    let attributes = match doc.attributes {
        Some(Value::Object(map)) => Some(Value::Object(map).to_string()),
        Some(_) => return Err(TreeliteError::config("attributes must be a JSON object")),
        None => None,
    };

    initialize_model(
        doc.threshold_type,
        doc.leaf_output_type,
        &metadata,
        &tree_annotation,
        &postprocessor,
        &doc.base_scores,
        attributes.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Operator;

    const DOCUMENT: &str = r#"{
        "threshold_type": "float32",
        "leaf_output_type": "float32",
        "metadata": {
            "num_feature": 2,
            "task_type": "kBinaryClf",
            "average_tree_output": false,
            "num_target": 1,
            "num_class": [1],
            "leaf_vector_shape": [1, 1]
        },
        "tree_annotation": {"num_tree": 1, "target_id": [0], "class_id": [0]},
        "postprocessor": {"name": "sigmoid", "config": {"sigmoid_alpha": 2.0}},
        "base_scores": [0.5],
        "attributes": {"origin": "unit-test"}
    }"#;

    #[test]
    fn test_builder_from_json() {
        let mut builder = get_model_builder_from_json(DOCUMENT).unwrap();
        builder.start_tree().unwrap();
        builder.start_node(0).unwrap();
        builder.numerical_test(0, 0.0, true, Operator::Lt, 1, 2).unwrap();
        builder.end_node().unwrap();
        for (key, value) in [(1, -1.0), (2, 1.0)] {
            builder.start_node(key).unwrap();
            builder.leaf_scalar(value).unwrap();
            builder.end_node().unwrap();
        }
        builder.end_tree().unwrap();
        let model = builder.commit_model().unwrap();

        assert_eq!(model.threshold_type(), TypeInfo::Float32);
        assert_eq!(model.sigmoid_alpha, 2.0);
        assert_eq!(model.base_scores.as_slice(), &[0.5]);
        assert_eq!(model.postprocessor, "sigmoid");
        let attributes: Value = serde_json::from_str(&model.attributes).unwrap();
        assert_eq!(attributes["origin"], "unit-test");
    }

    #[test]
    fn test_pred_transform_alias() {
        let doc = DOCUMENT.replace("\"postprocessor\"", "\"pred_transform\"");
        assert!(get_model_builder_from_json(&doc).is_ok());
    }

    #[test]
    fn test_invalid_json_document() {
        assert!(get_model_builder_from_json("{}").is_err());
        let bad_type = DOCUMENT.replace("\"threshold_type\": \"float32\"", "\"threshold_type\": \"uint32\"");
        assert!(get_model_builder_from_json(&bad_type).is_err());
        let bad_attr = DOCUMENT.replace(r#"{"origin": "unit-test"}"#, "[1, 2]");
        assert!(get_model_builder_from_json(&bad_attr).is_err());
        let bad_scores = DOCUMENT.replace("[0.5]", "[0.5, 0.5]");
        assert!(get_model_builder_from_json(&bad_scores).is_err());
    }
}
