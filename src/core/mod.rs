//! Core infrastructure shared by the tree, builder, serializer and predictor.
//!
//! This module provides the error type, the on-disk enumerations and numeric
//! traits, the columnar storage primitive, and small utilities for binary
//! output, logging and threading.

pub mod column_store;
pub mod constants;
pub mod error;
pub mod types;
pub mod utils;

pub use column_store::{ColumnElement, ColumnStore};
pub use constants::*;
pub use error::{FormatError, Result, TreeliteError};
pub use types::*;
