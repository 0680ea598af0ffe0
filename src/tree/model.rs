//! Tree ensemble container.
//!
//! A [`Model`] holds the trees of one ensemble together with its metadata.
//! The trees share one `(threshold, leaf output)` type pairing, chosen from a
//! closed set and represented by [`ModelVariant`]. Code that needs the
//! concrete tree types goes through [`dispatch_preset!`], the single match
//! over the variant.

use crate::core::column_store::ColumnStore;
use crate::core::constants::{
    DEFAULT_ATTRIBUTES, DEFAULT_RATIO_C, DEFAULT_SIGMOID_ALPHA, VER_MAJOR, VER_MINOR, VER_PATCH,
};
use crate::core::error::{Result, TreeliteError};
use crate::core::types::{TaskType, TypeInfo, TypedValue};
use crate::ensure;
use crate::tree::tree::Tree;

/// Trees of one ensemble with a fixed type pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPreset<T, L> {
    /// Member trees, in ensemble order
    pub trees: Vec<Tree<T, L>>,
}

impl<T, L> Default for ModelPreset<T, L> {
    fn default() -> Self {
        Self { trees: Vec::new() }
    }
}

impl<T: TypedValue, L: TypedValue> ModelPreset<T, L> {
    /// Threshold type of the trees.
    pub fn threshold_type(&self) -> TypeInfo {
        T::TYPE_INFO
    }

    /// Leaf output type of the trees.
    pub fn leaf_output_type(&self) -> TypeInfo {
        L::TYPE_INFO
    }
}

/// Closed set of legal `(threshold, leaf output)` pairings.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelVariant {
    /// `f32` thresholds, `f32` leaves
    F32F32(ModelPreset<f32, f32>),
    /// `f32` thresholds, `u32` leaves
    F32U32(ModelPreset<f32, u32>),
    /// `f64` thresholds, `f64` leaves
    F64F64(ModelPreset<f64, f64>),
    /// `f64` thresholds, `u32` leaves
    F64U32(ModelPreset<f64, u32>),
}

/// Evaluate `$body` with `$preset` bound to the concrete preset inside a
/// [`ModelVariant`] (by value, reference or mutable reference, following
/// the expression passed in).
#[macro_export]
macro_rules! dispatch_preset {
    ($variant:expr, $preset:ident => $body:expr) => {
        match $variant {
            $crate::tree::model::ModelVariant::F32F32($preset) => $body,
            $crate::tree::model::ModelVariant::F32U32($preset) => $body,
            $crate::tree::model::ModelVariant::F64F64($preset) => $body,
            $crate::tree::model::ModelVariant::F64U32($preset) => $body,
        }
    };
}

impl ModelVariant {
    /// Empty preset for the given pairing.
    ///
    /// The leaf output type must be `u32` or equal to the threshold type, and
    /// the threshold type must be a float.
    pub fn create(threshold_type: TypeInfo, leaf_output_type: TypeInfo) -> Result<Self> {
        match (threshold_type, leaf_output_type) {
            (TypeInfo::Float32, TypeInfo::Float32) => Ok(ModelVariant::F32F32(Default::default())),
            (TypeInfo::Float32, TypeInfo::UInt32) => Ok(ModelVariant::F32U32(Default::default())),
            (TypeInfo::Float64, TypeInfo::Float64) => Ok(ModelVariant::F64F64(Default::default())),
            (TypeInfo::Float64, TypeInfo::UInt32) => Ok(ModelVariant::F64U32(Default::default())),
            (thr, leaf) => Err(TreeliteError::type_mismatch(format!(
                "illegal type pairing: threshold_type = {}, leaf_output_type = {}; \
                 threshold_type must be float32 or float64 and leaf_output_type must be \
                 uint32 or equal to threshold_type",
                thr, leaf
            ))),
        }
    }

    /// Threshold type of the held preset.
    pub fn threshold_type(&self) -> TypeInfo {
        dispatch_preset!(self, preset => preset.threshold_type())
    }

    /// Leaf output type of the held preset.
    pub fn leaf_output_type(&self) -> TypeInfo {
        dispatch_preset!(self, preset => preset.leaf_output_type())
    }

    /// Number of trees.
    pub fn num_tree(&self) -> usize {
        dispatch_preset!(self, preset => preset.trees.len())
    }
}

/// Conversion between a concrete preset and [`ModelVariant`].
pub trait PresetVariant: Sized {
    /// Wrap into the variant.
    fn into_variant(self) -> ModelVariant;
    /// Borrow out of the variant if the pairing matches.
    fn from_variant(variant: &ModelVariant) -> Option<&Self>;
    /// Mutably borrow out of the variant if the pairing matches.
    fn from_variant_mut(variant: &mut ModelVariant) -> Option<&mut Self>;
}

macro_rules! impl_preset_variant {
    ($thr:ty, $leaf:ty, $name:ident) => {
        impl PresetVariant for ModelPreset<$thr, $leaf> {
            fn into_variant(self) -> ModelVariant {
                ModelVariant::$name(self)
            }

            fn from_variant(variant: &ModelVariant) -> Option<&Self> {
                match variant {
                    ModelVariant::$name(preset) => Some(preset),
                    _ => None,
                }
            }

            fn from_variant_mut(variant: &mut ModelVariant) -> Option<&mut Self> {
                match variant {
                    ModelVariant::$name(preset) => Some(preset),
                    _ => None,
                }
            }
        }
    };
}

impl_preset_variant!(f32, f32, F32F32);
impl_preset_variant!(f32, u32, F32U32);
impl_preset_variant!(f64, f64, F64F64);
impl_preset_variant!(f64, u32, F64U32);

/// Header values written ahead of the model body. Refreshed from the model
/// before each serialization and populated by deserialization.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SerializedHeader {
    pub(crate) major_ver: i32,
    pub(crate) minor_ver: i32,
    pub(crate) patch_ver: i32,
    pub(crate) threshold_type: TypeInfo,
    pub(crate) leaf_output_type: TypeInfo,
    pub(crate) num_tree: u64,
    pub(crate) num_opt_field_per_model: i32,
}

/// A decision tree ensemble with its metadata.
#[derive(Debug, Clone)]
pub struct Model {
    pub(crate) variant: ModelVariant,
    /// Number of input features
    pub num_feature: i32,
    /// Learning task
    pub task_type: TaskType,
    /// Whether tree outputs are averaged instead of summed
    pub average_tree_output: bool,
    /// Number of output targets
    pub num_target: u32,
    /// Number of classes per target
    pub num_class: ColumnStore<u32>,
    /// Shape `[d0, d1]` of each leaf output
    pub leaf_vector_shape: ColumnStore<u32>,
    /// Target each tree contributes to, -1 for all targets
    pub target_id: ColumnStore<i32>,
    /// Class each tree contributes to, -1 for all classes
    pub class_id: ColumnStore<i32>,
    /// Post-processor name
    pub postprocessor: String,
    /// Scaling parameter of sigmoid-like post-processors
    pub sigmoid_alpha: f32,
    /// Scaling parameter of exponential_standard_ratio
    pub ratio_c: f32,
    /// Initial score per `[target, class]`, row-major
    pub base_scores: ColumnStore<f64>,
    /// Free-form attributes
    pub attributes: String,
    pub(crate) header: SerializedHeader,
}

impl Model {
    /// Create an empty model with the given type pairing.
    pub fn create(threshold_type: TypeInfo, leaf_output_type: TypeInfo) -> Result<Self> {
        let variant = ModelVariant::create(threshold_type, leaf_output_type)?;
        Ok(Self::from_variant(variant))
    }

    /// Create an empty model holding the given trees' pairing.
    pub fn from_variant(variant: ModelVariant) -> Self {
        let header = SerializedHeader {
            major_ver: VER_MAJOR,
            minor_ver: VER_MINOR,
            patch_ver: VER_PATCH,
            threshold_type: variant.threshold_type(),
            leaf_output_type: variant.leaf_output_type(),
            num_tree: variant.num_tree() as u64,
            num_opt_field_per_model: 0,
        };
        Self {
            variant,
            num_feature: 0,
            task_type: TaskType::default(),
            average_tree_output: false,
            num_target: 1,
            num_class: ColumnStore::from(vec![1]),
            leaf_vector_shape: ColumnStore::from(vec![1, 1]),
            target_id: ColumnStore::new(),
            class_id: ColumnStore::new(),
            postprocessor: "identity".to_string(),
            sigmoid_alpha: DEFAULT_SIGMOID_ALPHA,
            ratio_c: DEFAULT_RATIO_C,
            base_scores: ColumnStore::from(vec![0.0]),
            attributes: DEFAULT_ATTRIBUTES.to_string(),
            header,
        }
    }

    /// The held preset variant.
    pub fn variant(&self) -> &ModelVariant {
        &self.variant
    }

    /// Mutable access to the held preset variant.
    pub fn variant_mut(&mut self) -> &mut ModelVariant {
        &mut self.variant
    }

    /// Typed view of the trees, if the pairing is `(T, L)`.
    pub fn preset<T, L>(&self) -> Option<&ModelPreset<T, L>>
    where
        ModelPreset<T, L>: PresetVariant,
    {
        ModelPreset::<T, L>::from_variant(&self.variant)
    }

    /// Mutable typed view of the trees, if the pairing is `(T, L)`.
    pub fn preset_mut<T, L>(&mut self) -> Option<&mut ModelPreset<T, L>>
    where
        ModelPreset<T, L>: PresetVariant,
    {
        ModelPreset::<T, L>::from_variant_mut(&mut self.variant)
    }

    /// Threshold type.
    pub fn threshold_type(&self) -> TypeInfo {
        self.variant.threshold_type()
    }

    /// Leaf output type.
    pub fn leaf_output_type(&self) -> TypeInfo {
        self.variant.leaf_output_type()
    }

    /// Number of trees.
    pub fn num_tree(&self) -> usize {
        self.variant.num_tree()
    }

    /// `(threshold_type, leaf_output_type)`.
    pub fn type_pairing(&self) -> (TypeInfo, TypeInfo) {
        (self.threshold_type(), self.leaf_output_type())
    }

    /// Largest class count over all targets.
    pub fn max_num_class(&self) -> u32 {
        self.num_class.iter().max().unwrap_or(1)
    }

    /// Version stamped on this model: the running version for models built
    /// in this process, the stored version for deserialized ones.
    pub fn version(&self) -> (i32, i32, i32) {
        (
            self.header.major_ver,
            self.header.minor_ver,
            self.header.patch_ver,
        )
    }

    /// Keep only the first `limit` trees.
    pub fn set_tree_limit(&mut self, limit: usize) -> Result<()> {
        ensure!(
            limit > 0,
            TreeliteError::invalid_parameter("limit", "0", "tree limit must be positive")
        );
        let num_tree = self.num_tree();
        ensure!(
            limit <= num_tree,
            TreeliteError::invalid_parameter(
                "limit",
                limit.to_string(),
                format!("model only has {} trees", num_tree),
            )
        );
        dispatch_preset!(&mut self.variant, preset => preset.trees.truncate(limit));
        self.target_id.truncate(limit);
        self.class_id.truncate(limit);
        log::debug!("Truncated model from {} to {} trees", num_tree, limit);
        Ok(())
    }

    /// Copy the current version, type tags and counters into the header.
    pub(crate) fn refresh_header(&mut self) {
        self.header = SerializedHeader {
            major_ver: VER_MAJOR,
            minor_ver: VER_MINOR,
            patch_ver: VER_PATCH,
            threshold_type: self.threshold_type(),
            leaf_output_type: self.leaf_output_type(),
            num_tree: self.num_tree() as u64,
            num_opt_field_per_model: 0,
        };
        dispatch_preset!(&mut self.variant, preset => {
            for tree in preset.trees.iter_mut() {
                tree.num_opt_field_per_tree = 0;
                tree.num_opt_field_per_node = 0;
            }
        });
    }
}

/// Concatenate the trees of several models into a new model.
///
/// All inputs must share one type pairing. Metadata is taken from the first
/// model; per-tree `target_id`/`class_id` entries follow the trees.
pub fn concatenate_models(models: &[&Model]) -> Result<Model> {
    let first = models
        .first()
        .ok_or_else(|| TreeliteError::config("cannot concatenate an empty list of models"))?;
    let threshold_type = first.threshold_type();
    let leaf_output_type = first.leaf_output_type();

    let mut concatenated = Model::create(threshold_type, leaf_output_type)?;
    for (i, model) in models.iter().enumerate() {
        ensure!(
            model.threshold_type() == threshold_type
                && model.leaf_output_type() == leaf_output_type,
            TreeliteError::type_mismatch(format!(
                "model {} has type pairing ({}, {}) but model 0 has ({}, {})",
                i,
                model.threshold_type(),
                model.leaf_output_type(),
                threshold_type,
                leaf_output_type
            ))
        );
        append_trees(&mut concatenated.variant, &model.variant)?;
        concatenated
            .target_id
            .extend_from_slice(model.target_id.as_slice());
        concatenated
            .class_id
            .extend_from_slice(model.class_id.as_slice());
    }

    concatenated.num_feature = first.num_feature;
    concatenated.task_type = first.task_type;
    concatenated.average_tree_output = first.average_tree_output;
    concatenated.num_target = first.num_target;
    concatenated.num_class = first.num_class.clone();
    concatenated.leaf_vector_shape = first.leaf_vector_shape.clone();
    concatenated.postprocessor = first.postprocessor.clone();
    concatenated.sigmoid_alpha = first.sigmoid_alpha;
    concatenated.ratio_c = first.ratio_c;
    concatenated.base_scores = first.base_scores.clone();
    concatenated.attributes = first.attributes.clone();
    concatenated.refresh_header();
    log::debug!(
        "Concatenated {} models into one with {} trees",
        models.len(),
        concatenated.num_tree()
    );
    Ok(concatenated)
}

fn append_trees(dst: &mut ModelVariant, src: &ModelVariant) -> Result<()> {
    match (dst, src) {
        (ModelVariant::F32F32(d), ModelVariant::F32F32(s)) => d.trees.extend(s.trees.iter().cloned()),
        (ModelVariant::F32U32(d), ModelVariant::F32U32(s)) => d.trees.extend(s.trees.iter().cloned()),
        (ModelVariant::F64F64(d), ModelVariant::F64F64(s)) => d.trees.extend(s.trees.iter().cloned()),
        (ModelVariant::F64U32(d), ModelVariant::F64U32(s)) => d.trees.extend(s.trees.iter().cloned()),
        _ => return Err(TreeliteError::type_mismatch("type pairing changed mid-concatenation")),
    }
    Ok(())
}
