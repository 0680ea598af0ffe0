//! Incremental model construction.
//!
//! Start with [`initialize_model`] (or [`get_model_builder_from_json`]), then
//! stream trees through the returned [`ModelBuilder`]:
//!
//! ```text
//! start_tree
//!   start_node(key) <numerical_test | categorical_test | leaf_scalar | leaf_vector> [gain|data_count|sum_hess]* end_node
//!   ...
//! end_tree
//! ...
//! commit_model
//! ```

pub mod builder;
pub mod json_document;
pub mod metadata;
pub mod state;

pub use builder::{initialize_model, ModelBuilder, TypedModelBuilder};
pub use json_document::get_model_builder_from_json;
pub use metadata::{expected_leaf_shape, Metadata, PostProcessorFunc, TreeAnnotation};
pub use state::{BuilderOp, BuilderState};
