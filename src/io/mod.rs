//! Model persistence.

pub mod serialization;

pub use serialization::{BorrowedModel, BufferFrame};
