//! Error handling and error types for treelite-rust.
//!
//! Every fallible operation in the crate returns [`Result`]. The variants of
//! [`TreeliteError`] follow the failure classes of the library: builder
//! protocol misuse, structural invariant breaks, type mismatches, corrupt or
//! incompatible serialized data, and invalid configuration.

use std::io;
use thiserror::Error;

/// Main error type for the treelite-rust library.
#[derive(Error, Debug)]
pub enum TreeliteError {
    /// A model builder operation was called in a state where it is not allowed
    #[error("Protocol violation: {message}")]
    Protocol { message: String },

    /// A tree or model invariant does not hold (orphaned nodes, duplicate keys,
    /// desynchronized columns, malformed leaf outputs)
    #[error("Structural error: {message}")]
    Structural { message: String },

    /// Threshold/leaf output type pairing is illegal, or a caller-supplied
    /// buffer does not match the model's element type
    #[error("Type mismatch: {message}")]
    TypeMismatch { message: String },

    /// Model metadata or prediction configuration is invalid
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid input parameters
    #[error("Invalid parameter: {parameter} = {value}, {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    /// Serialized data is corrupt, truncated or carries unknown identifiers
    #[error("Format error: {message}")]
    Format { message: String },

    /// Serialized data was produced by an incompatible library version
    #[error("Incompatible version: cannot load model from version {major}.{minor}.{patch}; running version is {current}")]
    Version {
        major: i32,
        minor: i32,
        patch: i32,
        current: String,
    },

    /// Dimension mismatch errors
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// File I/O errors
    #[error("I/O error: {source}")]
    IO {
        #[from]
        source: io::Error,
    },

    /// JSON serialization errors
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Thread pool construction errors
    #[error("Threading error: {message}")]
    Threading { message: String },
}

/// Errors raised while decoding a serialized model
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Unexpected end of input while reading {what}")]
    UnexpectedEof { what: String },

    #[error("Frame {index} has format {actual:?} (item size {actual_size}), expected {expected:?} (item size {expected_size})")]
    FrameTypeMismatch {
        index: usize,
        expected: &'static str,
        expected_size: usize,
        actual: String,
        actual_size: usize,
    },

    #[error("Frame {index} is a scalar field but holds {nitem} items")]
    ScalarFrameLength { index: usize, nitem: usize },

    #[error("Invalid value {value} for {what}")]
    InvalidDiscriminant { what: &'static str, value: i64 },

    #[error("Column {column} has {actual} entries, expected {expected}")]
    ColumnLength {
        column: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("String field is not valid UTF-8")]
    InvalidUtf8,
}

impl From<FormatError> for TreeliteError {
    fn from(err: FormatError) -> Self {
        TreeliteError::Format {
            message: err.to_string(),
        }
    }
}

/// Type alias for Results using TreeliteError
pub type Result<T> = std::result::Result<T, TreeliteError>;

impl TreeliteError {
    /// Create a protocol violation error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        TreeliteError::Protocol {
            message: message.into(),
        }
    }

    /// Create a structural error
    pub fn structural<S: Into<String>>(message: S) -> Self {
        TreeliteError::Structural {
            message: message.into(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch<S: Into<String>>(message: S) -> Self {
        TreeliteError::TypeMismatch {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        TreeliteError::Config {
            message: message.into(),
        }
    }

    /// Create a format error
    pub fn format<S: Into<String>>(message: S) -> Self {
        TreeliteError::Format {
            message: message.into(),
        }
    }

    /// Create a threading error
    pub fn threading<S: Into<String>>(message: S) -> Self {
        TreeliteError::Threading {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<P, V, R>(parameter: P, value: V, reason: R) -> Self
    where
        P: Into<String>,
        V: Into<String>,
        R: Into<String>,
    {
        TreeliteError::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch<E, A>(expected: E, actual: A) -> Self
    where
        E: Into<String>,
        A: Into<String>,
    {
        TreeliteError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Short machine-readable name of the error class
    pub fn category(&self) -> &'static str {
        match self {
            TreeliteError::Protocol { .. } => "protocol",
            TreeliteError::Structural { .. } => "structural",
            TreeliteError::TypeMismatch { .. } => "type_mismatch",
            TreeliteError::Config { .. } => "config",
            TreeliteError::InvalidParameter { .. } => "invalid_parameter",
            TreeliteError::Format { .. } => "format",
            TreeliteError::Version { .. } => "version",
            TreeliteError::DimensionMismatch { .. } => "dimension_mismatch",
            TreeliteError::IO { .. } => "io",
            TreeliteError::Json { .. } => "json",
            TreeliteError::Threading { .. } => "threading",
        }
    }
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err.into());
        }
    };
}
