//! Core enumerations and numeric type traits.
//!
//! The enums here are stored verbatim in serialized models, so their
//! discriminants and 1-byte representations are part of the binary format.

use crate::core::column_store::ColumnElement;
use crate::core::error::{FormatError, Result, TreeliteError};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use static_assertions::assert_eq_size;
use std::fmt;
use std::str::FromStr;

/// Tree node identifier within a single tree.
pub type NodeId = usize;

/// Runtime tag for the numeric types a model may be parameterized over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeInfo {
    /// Unset or unknown type
    #[default]
    #[serde(rename = "invalid")]
    Invalid = 0,
    /// 32-bit unsigned integer
    #[serde(rename = "uint32")]
    UInt32 = 1,
    /// 32-bit float
    #[serde(rename = "float32")]
    Float32 = 2,
    /// 64-bit float
    #[serde(rename = "float64")]
    Float64 = 3,
}

impl TypeInfo {
    /// Decode from the on-disk byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TypeInfo::Invalid),
            1 => Some(TypeInfo::UInt32),
            2 => Some(TypeInfo::Float32),
            3 => Some(TypeInfo::Float64),
            _ => None,
        }
    }

    /// Lower-case type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeInfo::Invalid => "invalid",
            TypeInfo::UInt32 => "uint32",
            TypeInfo::Float32 => "float32",
            TypeInfo::Float64 => "float64",
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeInfo {
    type Err = TreeliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uint32" => Ok(TypeInfo::UInt32),
            "float32" => Ok(TypeInfo::Float32),
            "float64" => Ok(TypeInfo::Float64),
            _ => Err(TreeliteError::invalid_parameter(
                "type",
                s,
                "expected one of uint32, float32, float64",
            )),
        }
    }
}

/// Kind of learning task the ensemble was trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TaskType {
    /// Binary classification
    #[default]
    #[serde(rename = "kBinaryClf")]
    BinaryClf = 0,
    /// Regression
    #[serde(rename = "kRegressor")]
    Regressor = 1,
    /// Multi-class classification
    #[serde(rename = "kMultiClf")]
    MultiClf = 2,
    /// Learning to rank
    #[serde(rename = "kLearningToRank")]
    LearningToRank = 3,
    /// Isolation forest anomaly detection
    #[serde(rename = "kIsolationForest")]
    IsolationForest = 4,
}

impl TaskType {
    /// Decode from the on-disk byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TaskType::BinaryClf),
            1 => Some(TaskType::Regressor),
            2 => Some(TaskType::MultiClf),
            3 => Some(TaskType::LearningToRank),
            4 => Some(TaskType::IsolationForest),
            _ => None,
        }
    }

    /// Canonical name as used in JSON documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::BinaryClf => "kBinaryClf",
            TaskType::Regressor => "kRegressor",
            TaskType::MultiClf => "kMultiClf",
            TaskType::LearningToRank => "kLearningToRank",
            TaskType::IsolationForest => "kIsolationForest",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = TreeliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kBinaryClf" => Ok(TaskType::BinaryClf),
            "kRegressor" => Ok(TaskType::Regressor),
            "kMultiClf" => Ok(TaskType::MultiClf),
            "kLearningToRank" => Ok(TaskType::LearningToRank),
            "kIsolationForest" => Ok(TaskType::IsolationForest),
            _ => Err(TreeliteError::invalid_parameter(
                "task_type",
                s,
                "unknown task type",
            )),
        }
    }
}

/// Comparison operator of a numerical test node.
///
/// The test evaluates `feature_value <op> threshold`; a true result sends
/// the row to the left child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i8)]
pub enum Operator {
    /// No operator; only valid on non-numerical nodes
    #[default]
    #[serde(rename = "")]
    None = 0,
    /// `==`
    #[serde(rename = "==")]
    Eq = 1,
    /// `<`
    #[serde(rename = "<")]
    Lt = 2,
    /// `<=`
    #[serde(rename = "<=")]
    Le = 3,
    /// `>`
    #[serde(rename = ">")]
    Gt = 4,
    /// `>=`
    #[serde(rename = ">=")]
    Ge = 5,
}

impl Operator {
    /// Decode from the on-disk byte.
    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            0 => Some(Operator::None),
            1 => Some(Operator::Eq),
            2 => Some(Operator::Lt),
            3 => Some(Operator::Le),
            4 => Some(Operator::Gt),
            5 => Some(Operator::Ge),
            _ => None,
        }
    }

    /// Symbolic form of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::None => "",
            Operator::Eq => "==",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    /// Apply the operator to `lhs <op> rhs`. `None` never holds.
    #[inline]
    pub fn compare<T: PartialOrd>(&self, lhs: T, rhs: T) -> bool {
        match self {
            Operator::Eq => lhs == rhs,
            Operator::Lt => lhs < rhs,
            Operator::Le => lhs <= rhs,
            Operator::Gt => lhs > rhs,
            Operator::Ge => lhs >= rhs,
            Operator::None => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = TreeliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "==" => Ok(Operator::Eq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            _ => Err(TreeliteError::format(format!(
                "unrecognized comparison operator {:?}",
                s
            ))),
        }
    }
}

/// Kind of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i8)]
pub enum TreeNodeType {
    /// Leaf node carrying a scalar or vector output
    #[default]
    #[serde(rename = "leaf_node")]
    LeafNode = 0,
    /// Test node comparing a feature against a threshold
    #[serde(rename = "numerical_test_node")]
    NumericalTestNode = 1,
    /// Test node checking membership of a feature in a category set
    #[serde(rename = "categorical_test_node")]
    CategoricalTestNode = 2,
}

impl TreeNodeType {
    /// Decode from the on-disk byte.
    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            0 => Some(TreeNodeType::LeafNode),
            1 => Some(TreeNodeType::NumericalTestNode),
            2 => Some(TreeNodeType::CategoricalTestNode),
            _ => None,
        }
    }

    /// Name used in JSON dumps.
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeNodeType::LeafNode => "leaf_node",
            TreeNodeType::NumericalTestNode => "numerical_test_node",
            TreeNodeType::CategoricalTestNode => "categorical_test_node",
        }
    }
}

impl fmt::Display for TreeNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

assert_eq_size!(TypeInfo, u8);
assert_eq_size!(TaskType, u8);
assert_eq_size!(Operator, i8);
assert_eq_size!(TreeNodeType, i8);

macro_rules! impl_column_element_enum {
    ($ty:ty, $repr:ty, $fmt:expr, $decode:ident, $what:expr) => {
        unsafe impl ColumnElement for $ty {
            const FORMAT: &'static str = $fmt;

            fn encode_le(self, out: &mut Vec<u8>) {
                out.push(self as $repr as u8);
            }

            fn decode_le(bytes: &[u8]) -> std::result::Result<Self, FormatError> {
                match bytes {
                    [b] => <$ty>::$decode(*b as $repr).ok_or(FormatError::InvalidDiscriminant {
                        what: $what,
                        value: i64::from(*b as $repr),
                    }),
                    _ => Err(FormatError::UnexpectedEof {
                        what: $what.to_string(),
                    }),
                }
            }

            fn decode_ne(bytes: &[u8]) -> std::result::Result<Self, FormatError> {
                Self::decode_le(bytes)
            }

            fn check_ne(bytes: &[u8]) -> std::result::Result<(), FormatError> {
                bytes
                    .iter()
                    .try_for_each(|b| Self::decode_le(std::slice::from_ref(b)).map(drop))
            }
        }
    };
}

impl_column_element_enum!(TypeInfo, u8, "=B", from_u8, "TypeInfo");
impl_column_element_enum!(TaskType, u8, "=B", from_u8, "TaskType");
impl_column_element_enum!(Operator, i8, "=b", from_i8, "Operator");
impl_column_element_enum!(TreeNodeType, i8, "=b", from_i8, "TreeNodeType");

/// Numeric types usable as thresholds or leaf outputs (`f32`, `f64`, `u32`).
pub trait TypedValue:
    ColumnElement
    + PartialOrd
    + Serialize
    + AsPrimitive<f32>
    + AsPrimitive<f64>
    + AsPrimitive<u32>
{
    /// Runtime tag of this type.
    const TYPE_INFO: TypeInfo;

    /// Numeric `as` conversion from another typed value.
    fn cast_from<V: TypedValue>(v: V) -> Self;

    /// Widen to `f64`.
    fn as_f64(self) -> f64 {
        AsPrimitive::<f64>::as_(self)
    }
}

impl TypedValue for f32 {
    const TYPE_INFO: TypeInfo = TypeInfo::Float32;

    fn cast_from<V: TypedValue>(v: V) -> Self {
        AsPrimitive::<f32>::as_(v)
    }
}

impl TypedValue for f64 {
    const TYPE_INFO: TypeInfo = TypeInfo::Float64;

    fn cast_from<V: TypedValue>(v: V) -> Self {
        AsPrimitive::<f64>::as_(v)
    }
}

impl TypedValue for u32 {
    const TYPE_INFO: TypeInfo = TypeInfo::UInt32;

    fn cast_from<V: TypedValue>(v: V) -> Self {
        AsPrimitive::<u32>::as_(v)
    }
}

/// Floating-point typed values; thresholds built by the model builder and
/// prediction inputs/outputs are restricted to these.
pub trait FloatValue: TypedValue + num_traits::Float + num_traits::FromPrimitive {
    /// Number of mantissa digits (including the implicit bit).
    const MANTISSA_DIGITS: u32;
}

impl FloatValue for f32 {
    const MANTISSA_DIGITS: u32 = f32::MANTISSA_DIGITS;
}

impl FloatValue for f64 {
    const MANTISSA_DIGITS: u32 = f64::MANTISSA_DIGITS;
}
