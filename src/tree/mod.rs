//! Decision tree and ensemble data model.

pub mod json_dump;
pub mod model;
pub mod tree;

pub use model::{concatenate_models, Model, ModelPreset, ModelVariant, PresetVariant};
pub use tree::Tree;
