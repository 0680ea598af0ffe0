//! # Treelite Rust
//!
//! An in-memory representation of decision tree ensembles with a builder,
//! a versioned binary serializer and a reference predictor.
//!
//! ## Features
//!
//! - **Columnar Trees**: every per-node attribute lives in its own contiguous
//!   column, so a tree serializes as a fixed sequence of typed arrays.
//! - **Type Pairings**: thresholds in `f32`/`f64`, leaf outputs in the same
//!   float type or `u32`, checked once at model creation.
//! - **Model Builder**: a state machine that assembles trees from user node
//!   keys and rejects malformed call sequences without corrupting state.
//! - **Binary Serialization**: a byte stream format and a zero-copy frame
//!   list, both carrying the same fields in the same order.
//! - **Parallel Prediction**: row-blocked inference on a Rayon pool with the
//!   usual post-processors (sigmoid, softmax, ...).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use treelite_rust::gtil::{self, Configuration, PredictKind};
//! use treelite_rust::model_builder::{
//!     initialize_model, Metadata, PostProcessorFunc, TreeAnnotation,
//! };
//! use treelite_rust::{Operator, TaskType, TypeInfo};
//!
//! # fn main() -> treelite_rust::Result<()> {
//! let metadata = Metadata::new(1, TaskType::Regressor, false, 1, vec![1], [1, 1])?;
//! let annotation = TreeAnnotation::new(1, vec![0], vec![0])?;
//! let mut builder = initialize_model(
//!     TypeInfo::Float64,
//!     TypeInfo::Float64,
//!     &metadata,
//!     &annotation,
//!     &PostProcessorFunc::new("identity"),
//!     &[0.0],
//!     None,
//! )?;
//! builder.start_tree()?;
//! builder.start_node(0)?;
//! builder.numerical_test(0, 0.5, true, Operator::Lt, 1, 2)?;
//! builder.end_node()?;
//! builder.start_node(1)?;
//! builder.leaf_scalar(-1.0)?;
//! builder.end_node()?;
//! builder.start_node(2)?;
//! builder.leaf_scalar(1.0)?;
//! builder.end_node()?;
//! builder.end_tree()?;
//! let model = builder.commit_model()?;
//!
//! let mut output = vec![0.0f64; 2];
//! let config = Configuration::new().with_pred_kind(PredictKind::Raw);
//! gtil::predict(&model, &[0.0, 1.0], 2, &mut output, &config)?;
//! assert_eq!(output, vec![-1.0, 1.0]);
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/treelite-rust/")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    non_snake_case,
    non_upper_case_globals
)]

// Core infrastructure module - always available
pub mod core;

// Tree and model representation
pub mod tree;

// Incremental model construction
pub mod model_builder;

// Binary serialization
pub mod io;

// Reference predictor
pub mod gtil;

pub use crate::core::{
    constants::*,
    error::{FormatError, Result, TreeliteError},
    types::*,
    ColumnElement, ColumnStore,
};

pub use io::{BorrowedModel, BufferFrame};
pub use model_builder::{
    get_model_builder_from_json, initialize_model, Metadata, ModelBuilder, PostProcessorFunc,
    TreeAnnotation,
};
pub use tree::{concatenate_models, Model, ModelPreset, ModelVariant, Tree};

// Version information
pub use crate::core::constants::TREELITE_RUST_VERSION as VERSION;

/// Install the default logger at `info` level.
///
/// `RUST_LOG` overrides the level. Calling this is optional; without it the
/// library's `log` records go to whatever logger the application installed.
pub fn init() {
    crate::core::utils::log::init_logger(crate::core::utils::log::LogLevel::Info);
}
