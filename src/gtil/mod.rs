//! General tree inference library.
//!
//! A reference predictor that walks every tree of a [`crate::Model`] for each
//! input row. Rows are split into contiguous blocks evaluated in parallel on a
//! Rayon pool sized by [`Configuration::nthread`].

pub mod config;
pub mod output_shape;
pub mod postprocessor;
pub mod predict;

pub use config::{Configuration, PredictKind};
pub use output_shape::{get_output_shape, get_output_size};
pub use postprocessor::{PostProcessor, PostProcessorKind};
pub use predict::{evaluate_tree, predict};
