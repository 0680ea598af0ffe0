//! Post-processing of summed scores.
//!
//! Elementwise functions map every class slot of a target independently;
//! `softmax` and the multiclass variants treat the class slots of one target
//! as a vector.

use crate::core::error::{Result, TreeliteError};
use crate::core::types::{FloatValue, TypedValue};
use crate::tree::model::Model;
use std::fmt;
use std::str::FromStr;

/// Named post-processing function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostProcessorKind {
    /// `x`
    Identity,
    /// `sign(x) * x^2`
    SignedSquare,
    /// `1` if `x > 0` else `0`
    Hinge,
    /// `1 / (1 + exp(-sigmoid_alpha * x))`
    Sigmoid,
    /// `exp(x)`
    Exponential,
    /// `2^(-x / ratio_c)`
    ExponentialStandardRatio,
    /// `log(1 + exp(x))`
    LogarithmOnePlusExp,
    /// `x`, for multiclass outputs
    IdentityMulticlass,
    /// Softmax over the class slots
    Softmax,
    /// Independent sigmoid per class slot
    MulticlassOva,
}

impl PostProcessorKind {
    /// Name stored in the model.
    pub fn as_str(&self) -> &'static str {
        match self {
            PostProcessorKind::Identity => "identity",
            PostProcessorKind::SignedSquare => "signed_square",
            PostProcessorKind::Hinge => "hinge",
            PostProcessorKind::Sigmoid => "sigmoid",
            PostProcessorKind::Exponential => "exponential",
            PostProcessorKind::ExponentialStandardRatio => "exponential_standard_ratio",
            PostProcessorKind::LogarithmOnePlusExp => "logarithm_one_plus_exp",
            PostProcessorKind::IdentityMulticlass => "identity_multiclass",
            PostProcessorKind::Softmax => "softmax",
            PostProcessorKind::MulticlassOva => "multiclass_ova",
        }
    }

    /// Whether the function reads `sigmoid_alpha`.
    pub fn uses_sigmoid_alpha(&self) -> bool {
        matches!(self, PostProcessorKind::Sigmoid | PostProcessorKind::MulticlassOva)
    }
}

impl fmt::Display for PostProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostProcessorKind {
    type Err = TreeliteError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s {
            "identity" => PostProcessorKind::Identity,
            "signed_square" => PostProcessorKind::SignedSquare,
            "hinge" => PostProcessorKind::Hinge,
            "sigmoid" => PostProcessorKind::Sigmoid,
            "exponential" => PostProcessorKind::Exponential,
            "exponential_standard_ratio" => PostProcessorKind::ExponentialStandardRatio,
            "logarithm_one_plus_exp" => PostProcessorKind::LogarithmOnePlusExp,
            "identity_multiclass" => PostProcessorKind::IdentityMulticlass,
            "softmax" => PostProcessorKind::Softmax,
            "multiclass_ova" => PostProcessorKind::MulticlassOva,
            other => {
                return Err(TreeliteError::format(format!(
                    "post-processor named '{}' not found",
                    other
                )))
            }
        };
        Ok(kind)
    }
}

/// Post-processor bound to a model's parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessor {
    kind: PostProcessorKind,
    sigmoid_alpha: f32,
    ratio_c: f32,
}

impl PostProcessor {
    /// Resolve the post-processor named in `model`.
    pub fn from_model(model: &Model) -> Result<Self> {
        Ok(Self {
            kind: model.postprocessor.parse()?,
            sigmoid_alpha: model.sigmoid_alpha,
            ratio_c: model.ratio_c,
        })
    }

    /// Function kind.
    pub fn kind(&self) -> PostProcessorKind {
        self.kind
    }

    /// Transform the class scores of one target for one row in place.
    pub fn apply<T: FloatValue>(&self, scores: &mut [T]) {
        let one = T::one();
        match self.kind {
            PostProcessorKind::Identity | PostProcessorKind::IdentityMulticlass => {}
            PostProcessorKind::SignedSquare => {
                for x in scores.iter_mut() {
                    *x = *x * x.abs();
                }
            }
            PostProcessorKind::Hinge => {
                for x in scores.iter_mut() {
                    *x = if *x > T::zero() { one } else { T::zero() };
                }
            }
            PostProcessorKind::Sigmoid | PostProcessorKind::MulticlassOva => {
                let alpha = T::cast_from(self.sigmoid_alpha);
                for x in scores.iter_mut() {
                    *x = one / (one + (-alpha * *x).exp());
                }
            }
            PostProcessorKind::Exponential => {
                for x in scores.iter_mut() {
                    *x = x.exp();
                }
            }
            PostProcessorKind::ExponentialStandardRatio => {
                let ratio_c = T::cast_from(self.ratio_c);
                for x in scores.iter_mut() {
                    *x = (-*x / ratio_c).exp2();
                }
            }
            PostProcessorKind::LogarithmOnePlusExp => {
                for x in scores.iter_mut() {
                    *x = x.exp().ln_1p();
                }
            }
            PostProcessorKind::Softmax => softmax(scores),
        }
    }
}

fn softmax<T: FloatValue>(scores: &mut [T]) {
    let Some(&first) = scores.first() else {
        return;
    };
    let max_margin = scores
        .iter()
        .skip(1)
        .fold(first, |acc, &x| if x > acc { x } else { acc });
    let mut norm_const = 0.0f64;
    for x in scores.iter_mut() {
        let t = (*x - max_margin).exp();
        norm_const += t.as_f64();
        *x = t;
    }
    let norm = T::cast_from(norm_const);
    for x in scores.iter_mut() {
        *x = *x / norm;
    }
}
