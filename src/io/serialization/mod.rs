//! Versioned binary model serialization.
//!
//! One field walk drives two encodings: a byte stream ([`stream`]) and a list
//! of typed buffer frames ([`frame`]). Header layout:
//!
//! 1. `major_ver`, `minor_ver`, `patch_ver` (`i32`)
//! 2. `threshold_type`, `leaf_output_type` (`u8`)
//! 3. `num_tree` (`u64`)
//! 4. model metadata, ending with `attributes`
//! 5. `num_opt_field_per_model` (`i32`) followed by that many optional fields
//!
//! Each tree then writes its node columns in a fixed order, followed by
//! `num_opt_field_per_tree` and `num_opt_field_per_node`, each followed by
//! that many optional fields. Readers skip optional fields they do not know.

pub mod frame;
pub mod stream;

pub use frame::{BorrowedModel, BufferFrame};

use crate::core::column_store::{ColumnElement, ColumnStore};
use crate::core::constants::{
    format_version_string, LEGACY_COMPATIBLE_VERSION, VER_MAJOR, VER_MINOR,
};
use crate::core::error::{Result, TreeliteError};
use crate::core::types::{TaskType, TypeInfo, TypedValue};
use crate::core::utils::binary_writer::{IoBinaryWriter, VecBinaryWriter};
use crate::dispatch_preset;
use crate::tree::model::{Model, SerializedHeader};
use crate::tree::tree::Tree;
use frame::{FrameDeserializer, FrameSerializer};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use stream::{StreamDeserializer, StreamSerializer};

/// Sink for model fields. `'a` is the lifetime of the model being written,
/// so zero-copy encoders can keep references to its fields.
pub(crate) trait SerializerMixin<'a> {
    fn serialize_scalar<T: ColumnElement>(&mut self, value: &'a T) -> Result<()>;
    fn serialize_array<T: ColumnElement>(&mut self, values: &'a [T]) -> Result<()>;
    fn serialize_string(&mut self, value: &'a str) -> Result<()>;
}

/// Source of model fields. `what` names the field for error messages.
pub(crate) trait DeserializerMixin {
    fn deserialize_scalar<T: ColumnElement>(&mut self, what: &'static str) -> Result<T>;
    fn deserialize_array<T: ColumnElement>(&mut self, what: &'static str) -> Result<ColumnStore<T>>;
    fn deserialize_string(&mut self, what: &'static str) -> Result<String>;
    fn skip_optional_field(&mut self) -> Result<()>;
}

fn serialize_model<'a, S: SerializerMixin<'a>>(model: &'a Model, ser: &mut S) -> Result<()> {
    let header = &model.header;
    if header.num_tree != model.num_tree() as u64 {
        return Err(TreeliteError::structural(format!(
            "header records {} trees but the model holds {}",
            header.num_tree,
            model.num_tree()
        )));
    }
    ser.serialize_scalar(&header.major_ver)?;
    ser.serialize_scalar(&header.minor_ver)?;
    ser.serialize_scalar(&header.patch_ver)?;
    ser.serialize_scalar(&header.threshold_type)?;
    ser.serialize_scalar(&header.leaf_output_type)?;
    ser.serialize_scalar(&header.num_tree)?;

    ser.serialize_scalar(&model.num_feature)?;
    ser.serialize_scalar(&model.task_type)?;
    ser.serialize_scalar(&model.average_tree_output)?;
    ser.serialize_scalar(&model.num_target)?;
    ser.serialize_array(model.num_class.as_slice())?;
    ser.serialize_array(model.leaf_vector_shape.as_slice())?;
    ser.serialize_array(model.target_id.as_slice())?;
    ser.serialize_array(model.class_id.as_slice())?;
    ser.serialize_string(&model.postprocessor)?;
    ser.serialize_scalar(&model.sigmoid_alpha)?;
    ser.serialize_scalar(&model.ratio_c)?;
    ser.serialize_array(model.base_scores.as_slice())?;
    ser.serialize_string(&model.attributes)?;
    ser.serialize_scalar(&header.num_opt_field_per_model)?;

    dispatch_preset!(&model.variant, preset => {
        for tree in &preset.trees {
            serialize_tree(tree, ser)?;
        }
    });
    Ok(())
}

fn serialize_tree<'a, T, L, S>(tree: &'a Tree<T, L>, ser: &mut S) -> Result<()>
where
    T: TypedValue,
    L: TypedValue,
    S: SerializerMixin<'a>,
{
    ser.serialize_scalar(&tree.num_nodes)?;
    ser.serialize_scalar(&tree.has_categorical_split)?;
    ser.serialize_array(tree.node_type.as_slice())?;
    ser.serialize_array(tree.cleft.as_slice())?;
    ser.serialize_array(tree.cright.as_slice())?;
    ser.serialize_array(tree.split_index.as_slice())?;
    ser.serialize_array(tree.default_left.as_slice())?;
    ser.serialize_array(tree.leaf_value.as_slice())?;
    ser.serialize_array(tree.threshold.as_slice())?;
    ser.serialize_array(tree.cmp.as_slice())?;
    ser.serialize_array(tree.category_list_right_child.as_slice())?;
    ser.serialize_array(tree.leaf_vector.as_slice())?;
    ser.serialize_array(tree.leaf_vector_begin.as_slice())?;
    ser.serialize_array(tree.leaf_vector_end.as_slice())?;
    ser.serialize_array(tree.category_list.as_slice())?;
    ser.serialize_array(tree.category_list_begin.as_slice())?;
    ser.serialize_array(tree.category_list_end.as_slice())?;

    ser.serialize_array(tree.data_count.as_slice())?;
    ser.serialize_array(tree.data_count_present.as_slice())?;
    ser.serialize_array(tree.sum_hess.as_slice())?;
    ser.serialize_array(tree.sum_hess_present.as_slice())?;
    ser.serialize_array(tree.gain.as_slice())?;
    ser.serialize_array(tree.gain_present.as_slice())?;

    ser.serialize_scalar(&tree.num_opt_field_per_tree)?;
    ser.serialize_scalar(&tree.num_opt_field_per_node)?;
    Ok(())
}

/// Refuse other major versions (except the legacy bridge) and warn about
/// newer minor versions.
pub(crate) fn check_version(major: i32, minor: i32, patch: i32) -> Result<()> {
    let legacy = (major, minor) == LEGACY_COMPATIBLE_VERSION;
    if major != VER_MAJOR && !legacy {
        return Err(TreeliteError::Version {
            major,
            minor,
            patch,
            current: format_version_string(),
        });
    }
    if major == VER_MAJOR && minor > VER_MINOR {
        log::warn!(
            "The model you are loading originated from a newer version ({}.{}.{}); some \
             functionalities may be unavailable. Running version is {}",
            major,
            minor,
            patch,
            format_version_string()
        );
    }
    Ok(())
}

fn skip_optional_fields<D: DeserializerMixin>(de: &mut D, count: i32, slot: &str) -> Result<()> {
    if count < 0 {
        return Err(TreeliteError::format(format!(
            "negative optional field count {} for {}",
            count, slot
        )));
    }
    for _ in 0..count {
        de.skip_optional_field()?;
    }
    Ok(())
}

fn deserialize_model<D: DeserializerMixin>(de: &mut D) -> Result<Model> {
    let major_ver: i32 = de.deserialize_scalar("major_ver")?;
    let minor_ver: i32 = de.deserialize_scalar("minor_ver")?;
    let patch_ver: i32 = de.deserialize_scalar("patch_ver")?;
    check_version(major_ver, minor_ver, patch_ver)?;

    let threshold_type: TypeInfo = de.deserialize_scalar("threshold_type")?;
    let leaf_output_type: TypeInfo = de.deserialize_scalar("leaf_output_type")?;
    let mut model = Model::create(threshold_type, leaf_output_type)?;
    let num_tree: u64 = de.deserialize_scalar("num_tree")?;

    model.num_feature = de.deserialize_scalar("num_feature")?;
    model.task_type = de.deserialize_scalar::<TaskType>("task_type")?;
    model.average_tree_output = de.deserialize_scalar("average_tree_output")?;
    model.num_target = de.deserialize_scalar("num_target")?;
    model.num_class = de.deserialize_array("num_class")?;
    model.leaf_vector_shape = de.deserialize_array("leaf_vector_shape")?;
    model.target_id = de.deserialize_array("target_id")?;
    model.class_id = de.deserialize_array("class_id")?;
    model.postprocessor = de.deserialize_string("postprocessor")?;
    model.sigmoid_alpha = de.deserialize_scalar("sigmoid_alpha")?;
    model.ratio_c = de.deserialize_scalar("ratio_c")?;
    model.base_scores = de.deserialize_array("base_scores")?;
    model.attributes = de.deserialize_string("attributes")?;
    let num_opt_field_per_model: i32 = de.deserialize_scalar("num_opt_field_per_model")?;
    skip_optional_fields(de, num_opt_field_per_model, "model")?;

    model.header = SerializedHeader {
        major_ver,
        minor_ver,
        patch_ver,
        threshold_type,
        leaf_output_type,
        num_tree,
        num_opt_field_per_model,
    };

    dispatch_preset!(&mut model.variant, preset => {
        for tree_id in 0..num_tree {
            let tree = deserialize_tree(de).map_err(|err| {
                log::debug!("Failed to decode tree {}: {}", tree_id, err);
                err
            })?;
            preset.trees.push(tree);
        }
    });
    log::debug!(
        "Loaded model (version {}.{}.{}) with {} trees",
        major_ver,
        minor_ver,
        patch_ver,
        num_tree
    );
    Ok(model)
}

fn deserialize_tree<T, L, D>(de: &mut D) -> Result<Tree<T, L>>
where
    T: TypedValue,
    L: TypedValue,
    D: DeserializerMixin,
{
    let mut tree = Tree::new();
    tree.num_nodes = de.deserialize_scalar("num_nodes")?;
    tree.has_categorical_split = de.deserialize_scalar("has_categorical_split")?;
    tree.node_type = de.deserialize_array("node_type")?;
    tree.cleft = de.deserialize_array("cleft")?;
    tree.cright = de.deserialize_array("cright")?;
    tree.split_index = de.deserialize_array("split_index")?;
    tree.default_left = de.deserialize_array("default_left")?;
    tree.leaf_value = de.deserialize_array("leaf_value")?;
    tree.threshold = de.deserialize_array("threshold")?;
    tree.cmp = de.deserialize_array("cmp")?;
    tree.category_list_right_child = de.deserialize_array("category_list_right_child")?;
    tree.leaf_vector = de.deserialize_array("leaf_vector")?;
    tree.leaf_vector_begin = de.deserialize_array("leaf_vector_begin")?;
    tree.leaf_vector_end = de.deserialize_array("leaf_vector_end")?;
    tree.category_list = de.deserialize_array("category_list")?;
    tree.category_list_begin = de.deserialize_array("category_list_begin")?;
    tree.category_list_end = de.deserialize_array("category_list_end")?;

    tree.data_count = de.deserialize_array("data_count")?;
    tree.data_count_present = de.deserialize_array("data_count_present")?;
    tree.sum_hess = de.deserialize_array("sum_hess")?;
    tree.sum_hess_present = de.deserialize_array("sum_hess_present")?;
    tree.gain = de.deserialize_array("gain")?;
    tree.gain_present = de.deserialize_array("gain_present")?;

    tree.num_opt_field_per_tree = de.deserialize_scalar("num_opt_field_per_tree")?;
    skip_optional_fields(de, tree.num_opt_field_per_tree, "tree")?;
    tree.num_opt_field_per_node = de.deserialize_scalar("num_opt_field_per_node")?;
    skip_optional_fields(de, tree.num_opt_field_per_node, "node")?;

    tree.validate()?;
    Ok(tree)
}

impl Model {
    /// Write the model to a byte stream.
    ///
    /// Takes `&mut self` because the version stamp and counters in the
    /// header are refreshed first.
    pub fn serialize_to_stream<W: Write>(&mut self, writer: W) -> Result<()> {
        self.refresh_header();
        let mut ser = StreamSerializer::new(IoBinaryWriter::new(writer));
        serialize_model(self, &mut ser)?;
        let writer = ser.into_inner();
        log::debug!("Serialized model to stream ({} bytes)", writer.bytes_written());
        writer.into_inner()?;
        Ok(())
    }

    /// Serialize the model into an in-memory byte buffer.
    pub fn serialize_to_bytes(&mut self) -> Result<Vec<u8>> {
        self.refresh_header();
        let mut ser = StreamSerializer::new(VecBinaryWriter::new());
        serialize_model(self, &mut ser)?;
        Ok(ser.into_inner().into_buffer())
    }

    /// Serialize the model to a file, replacing any existing content.
    pub fn serialize_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.serialize_to_stream(BufWriter::new(file))?;
        log::info!("Saved model to {}", path.as_ref().display());
        Ok(())
    }

    /// Read one model from a byte stream. Bytes past the end of the model are
    /// left unread.
    pub fn deserialize_from_stream<R: Read>(reader: R) -> Result<Model> {
        let mut de = StreamDeserializer::new(reader);
        deserialize_model(&mut de)
    }

    /// Read a model from an in-memory byte buffer.
    pub fn deserialize_from_bytes(bytes: &[u8]) -> Result<Model> {
        Self::deserialize_from_stream(bytes)
    }

    /// Read a model from a file written by [`Model::serialize_to_file`].
    pub fn deserialize_from_file<P: AsRef<Path>>(path: P) -> Result<Model> {
        let file = File::open(path.as_ref())?;
        let model = Self::deserialize_from_stream(BufReader::new(file))?;
        log::info!("Loaded model from {}", path.as_ref().display());
        Ok(model)
    }

    /// Export the model as buffer frames that borrow its columns.
    pub fn serialize_to_frames(&mut self) -> Result<Vec<BufferFrame<'_>>> {
        self.refresh_header();
        let model: &Model = self;
        let mut ser = FrameSerializer::new();
        serialize_model(model, &mut ser)?;
        Ok(ser.into_frames())
    }

    /// Rebuild a model from buffer frames without copying array contents.
    ///
    /// The returned model views the frames' memory, which therefore stays
    /// borrowed until it is dropped or detached with
    /// [`BorrowedModel::into_owned`].
    pub fn deserialize_from_frames<'a>(frames: &[BufferFrame<'a>]) -> Result<BorrowedModel<'a>> {
        let mut de = FrameDeserializer::new(frames);
        let model = deserialize_model(&mut de)?;
        // SAFETY: every foreign column was created by `FrameDeserializer`
        // over frame data borrowed for `'a`.
        Ok(unsafe { BorrowedModel::new(model) })
    }

    /// Export the model as buffer frames.
    #[deprecated(note = "use `serialize_to_frames`")]
    pub fn get_py_buffer(&mut self) -> Result<Vec<BufferFrame<'_>>> {
        log::warn!("get_py_buffer() is deprecated; use serialize_to_frames() instead");
        self.serialize_to_frames()
    }

    /// Rebuild a model from buffer frames.
    #[deprecated(note = "use `deserialize_from_frames`")]
    pub fn create_from_py_buffer<'a>(frames: &[BufferFrame<'a>]) -> Result<BorrowedModel<'a>> {
        log::warn!("create_from_py_buffer() is deprecated; use deserialize_from_frames() instead");
        Self::deserialize_from_frames(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::VER_PATCH;
    use crate::core::types::Operator;

    fn small_model() -> Model {
        let mut model = Model::create(TypeInfo::Float32, TypeInfo::UInt32).unwrap();
        let mut tree = Tree::<f32, u32>::new();
        tree.init().unwrap();
        tree.add_childs(0).unwrap();
        tree.set_numerical_split(0, 0, 0.5, true, Operator::Ge).unwrap();
        tree.set_leaf(1, 3).unwrap();
        tree.set_leaf_vector(2, &[1, 2]).unwrap();
        tree.set_sum_hess(1, 4.5).unwrap();
        model.preset_mut::<f32, u32>().unwrap().trees.push(tree);
        model.num_feature = 1;
        model.leaf_vector_shape = vec![1, 2].into();
        model.target_id.push(0);
        model.class_id.push(-1);
        model
    }

    #[test]
    fn test_stream_roundtrip() {
        let mut model = small_model();
        let bytes = model.serialize_to_bytes().unwrap();
        let restored = Model::deserialize_from_bytes(&bytes).unwrap();
        assert_eq!(
            restored.dump_as_json(false).unwrap(),
            model.dump_as_json(false).unwrap()
        );
        assert_eq!(restored.version(), (VER_MAJOR, VER_MINOR, VER_PATCH));
    }

    #[test]
    fn test_frame_roundtrip() {
        let mut model = small_model();
        let expected = model.dump_as_json(false).unwrap();
        let frames = model.serialize_to_frames().unwrap();
        let restored = Model::deserialize_from_frames(&frames).unwrap();
        assert_eq!(restored.dump_as_json(false).unwrap(), expected);
    }

    #[test]
    fn test_frame_import_views_frame_memory() {
        let mut model = small_model();
        let frames = model.serialize_to_frames().unwrap();
        let restored = Model::deserialize_from_frames(&frames).unwrap();
        // tree frames follow the 20 model-level frames
        let tree_frames = &frames[20..];
        let tree = &restored.preset::<f32, u32>().unwrap().trees[0];
        assert_eq!(tree.cleft.as_slice().as_ptr() as *const u8, tree_frames[3].data.as_ptr());
        assert_eq!(tree.default_left.as_slice().as_ptr() as *const u8, tree_frames[6].data.as_ptr());
        assert_eq!(tree.threshold.as_slice().as_ptr() as *const u8, tree_frames[8].data.as_ptr());
        assert_eq!(tree.cmp.as_slice().as_ptr() as *const u8, tree_frames[9].data.as_ptr());
        assert_eq!(tree.leaf_vector.as_slice().as_ptr() as *const u8, tree_frames[11].data.as_ptr());
        assert_eq!(tree.leaf_vector(2), &[1, 2]);

        let owned = restored.into_owned();
        let tree = &owned.preset::<f32, u32>().unwrap().trees[0];
        assert_ne!(tree.threshold.as_slice().as_ptr() as *const u8, tree_frames[8].data.as_ptr());
        assert_eq!(tree.leaf_vector(2), &[1, 2]);
    }

    #[test]
    fn test_column_length_mismatch_is_format_error() {
        let mut model = small_model();
        model.preset_mut::<f32, u32>().unwrap().trees[0].gain.push(0.0);
        let bytes = model.serialize_to_bytes().unwrap();
        let err = Model::deserialize_from_bytes(&bytes).unwrap_err();
        assert_eq!(err.category(), "format");
        assert!(err.to_string().contains("gain"));
    }

    #[test]
    fn test_frame_and_stream_agree_on_field_count() {
        let mut model = small_model();
        // 6 header scalars, 13 metadata fields, 1 optional-field counter,
        // then 25 fields per tree.
        let frames = model.serialize_to_frames().unwrap();
        assert_eq!(frames.len(), 6 + 13 + 1 + 25);
    }

    #[test]
    fn test_check_version() {
        assert!(check_version(VER_MAJOR, VER_MINOR, 0).is_ok());
        assert!(check_version(VER_MAJOR, VER_MINOR + 1, 0).is_ok());
        assert!(check_version(3, 9, 0).is_ok());
        assert!(matches!(
            check_version(3, 8, 0),
            Err(TreeliteError::Version { major: 3, minor: 8, .. })
        ));
        assert!(check_version(VER_MAJOR + 1, 0, 0).is_err());
    }

    #[test]
    fn test_truncated_stream() {
        let mut model = small_model();
        let bytes = model.serialize_to_bytes().unwrap();
        for cut in [0, 4, 20, bytes.len() / 2, bytes.len() - 1] {
            assert!(Model::deserialize_from_bytes(&bytes[..cut]).is_err());
        }
    }
}
