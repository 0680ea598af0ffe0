/// Binary writer utilities
pub mod binary_writer;
/// Logger initialization
pub mod log;
/// Row-parallel loop helpers
pub mod threading;
