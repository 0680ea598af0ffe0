//! Ensemble-level descriptors supplied once when a builder is created.

use crate::core::error::{Result, TreeliteError};
use crate::core::types::TaskType;
use crate::ensure;
use serde::{Deserialize, Serialize};

/// Task and output layout of the model being built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Number of input features
    pub num_feature: i32,
    /// Learning task
    pub task_type: TaskType,
    /// Whether tree outputs are averaged instead of summed
    pub average_tree_output: bool,
    /// Number of output targets
    pub num_target: u32,
    /// Number of classes per target
    pub num_class: Vec<u32>,
    /// Shape `[d0, d1]` of each leaf output
    pub leaf_vector_shape: [u32; 2],
}

impl Metadata {
    /// Create validated metadata.
    pub fn new(
        num_feature: i32,
        task_type: TaskType,
        average_tree_output: bool,
        num_target: u32,
        num_class: Vec<u32>,
        leaf_vector_shape: [u32; 2],
    ) -> Result<Self> {
        let metadata = Self {
            num_feature,
            task_type,
            average_tree_output,
            num_target,
            num_class,
            leaf_vector_shape,
        };
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check the metadata invariants.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.num_feature >= 0,
            TreeliteError::invalid_parameter(
                "num_feature",
                self.num_feature.to_string(),
                "must be non-negative"
            )
        );
        ensure!(
            self.num_target >= 1,
            TreeliteError::invalid_parameter("num_target", "0", "num_target must be at least 1")
        );
        ensure!(
            self.num_class.len() == self.num_target as usize,
            TreeliteError::config(format!(
                "num_class field must have length equal to num_target ({}), got {}",
                self.num_target,
                self.num_class.len()
            ))
        );
        ensure!(
            self.num_class.iter().all(|&c| c >= 1),
            TreeliteError::config("all elements in num_class field must be at least 1")
        );
        let [d0, d1] = self.leaf_vector_shape;
        ensure!(
            d0 == 1 || d0 == self.num_target,
            TreeliteError::config(format!(
                "leaf_vector_shape[0] must be either 1 or num_target ({}), got {}",
                self.num_target, d0
            ))
        );
        let max_num_class = self.max_num_class();
        ensure!(
            d1 == 1 || d1 == max_num_class,
            TreeliteError::config(format!(
                "leaf_vector_shape[1] must be either 1 or max_num_class ({}), got {}",
                max_num_class, d1
            ))
        );
        Ok(())
    }

    /// Largest class count over all targets.
    pub fn max_num_class(&self) -> u32 {
        self.num_class.iter().copied().max().unwrap_or(1)
    }
}

/// Per-tree routing of outputs onto `[target, class]` slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeAnnotation {
    /// Number of trees the builder must receive
    pub num_tree: u32,
    /// Target of each tree, -1 for all targets
    pub target_id: Vec<i32>,
    /// Class of each tree, -1 for all classes
    pub class_id: Vec<i32>,
}

impl TreeAnnotation {
    /// Create an annotation; both id vectors must have `num_tree` entries.
    pub fn new(num_tree: u32, target_id: Vec<i32>, class_id: Vec<i32>) -> Result<Self> {
        let annotation = Self {
            num_tree,
            target_id,
            class_id,
        };
        annotation.validate()?;
        Ok(annotation)
    }

    /// Check vector lengths against `num_tree`.
    pub fn validate(&self) -> Result<()> {
        for (field, len) in [("target_id", self.target_id.len()), ("class_id", self.class_id.len())] {
            ensure!(
                len == self.num_tree as usize,
                TreeliteError::config(format!(
                    "{} field must have length equal to num_tree ({}), got {}",
                    field, self.num_tree, len
                ))
            );
        }
        Ok(())
    }

    /// Check every tree's ids against the metadata and its leaf shape.
    pub fn validate_against(&self, metadata: &Metadata) -> Result<()> {
        let max_num_class = metadata.max_num_class();
        for (tree_id, (&target_id, &class_id)) in
            self.target_id.iter().zip(self.class_id.iter()).enumerate()
        {
            ensure!(
                target_id >= -1 && target_id < metadata.num_target as i32,
                TreeliteError::config(format!(
                    "target_id[{}] = {} is out of range for num_target = {}",
                    tree_id, target_id, metadata.num_target
                ))
            );
            let class_bound = if target_id >= 0 {
                metadata.num_class[target_id as usize]
            } else {
                max_num_class
            };
            ensure!(
                class_id >= -1 && class_id < class_bound as i32,
                TreeliteError::config(format!(
                    "class_id[{}] = {} is out of range (number of classes: {})",
                    tree_id, class_id, class_bound
                ))
            );
            let expected = expected_leaf_shape(target_id, class_id, metadata.num_target, max_num_class);
            ensure!(
                expected == metadata.leaf_vector_shape,
                TreeliteError::config(format!(
                    "tree {} with target_id = {}, class_id = {} needs leaf_vector_shape {:?}, \
                     but the model declares {:?}",
                    tree_id, target_id, class_id, expected, metadata.leaf_vector_shape
                ))
            );
        }
        Ok(())
    }
}

/// Leaf output shape implied by a tree's `(target_id, class_id)` routing.
pub fn expected_leaf_shape(
    target_id: i32,
    class_id: i32,
    num_target: u32,
    max_num_class: u32,
) -> [u32; 2] {
    let d0 = if target_id == -1 { num_target } else { 1 };
    let d1 = if class_id == -1 { max_num_class } else { 1 };
    [d0, d1]
}

/// Post-processor name plus its JSON configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessorFunc {
    /// Post-processor name
    pub name: String,
    /// JSON object with parameters such as `sigmoid_alpha` or `ratio_c`
    pub config_json: String,
}

impl PostProcessorFunc {
    /// Post-processor without parameters.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            config_json: "{}".to_string(),
        }
    }

    /// Post-processor with a JSON parameter object.
    pub fn with_config<S: Into<String>, C: Into<String>>(name: S, config_json: C) -> Self {
        Self {
            name: name.into(),
            config_json: config_json.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PostProcessorParams {
    pub(crate) sigmoid_alpha: Option<f32>,
    pub(crate) ratio_c: Option<f32>,
}

impl PostProcessorFunc {
    pub(crate) fn params(&self) -> Result<PostProcessorParams> {
        let value: serde_json::Value = serde_json::from_str(&self.config_json)?;
        ensure!(
            value.is_object(),
            TreeliteError::config("post-processor config must be a JSON object")
        );
        Ok(serde_json::from_value(value)?)
    }
}
