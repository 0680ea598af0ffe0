//! Builder state machine.
//!
//! The legal transitions are kept as data in [`TRANSITIONS`]; every builder
//! operation looks itself up there before touching the model.

use crate::core::error::{Result, TreeliteError};
use std::fmt;

/// Phase of model construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuilderState {
    /// Waiting for `start_tree` or `commit_model`
    ExpectTree,
    /// Inside a tree, waiting for `start_node` or `end_tree`
    ExpectNode,
    /// Inside a node, waiting for its test or leaf output
    ExpectDetail,
    /// Node kind fixed, waiting for `end_node` or more statistics
    NodeComplete,
    /// Model handed out; no further calls allowed
    ModelComplete,
}

impl fmt::Display for BuilderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuilderState::ExpectTree => "ExpectTree",
            BuilderState::ExpectNode => "ExpectNode",
            BuilderState::ExpectDetail => "ExpectDetail",
            BuilderState::NodeComplete => "NodeComplete",
            BuilderState::ModelComplete => "ModelComplete",
        };
        f.write_str(name)
    }
}

/// Operations of the builder protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuilderOp {
    /// Begin a tree
    StartTree,
    /// Finish the current tree
    EndTree,
    /// Begin a node
    StartNode,
    /// Finish the current node
    EndNode,
    /// Declare a numerical test
    NumericalTest,
    /// Declare a categorical test
    CategoricalTest,
    /// Declare a scalar leaf
    LeafScalar,
    /// Declare a vector leaf
    LeafVector,
    /// Attach split gain
    Gain,
    /// Attach training row count
    DataCount,
    /// Attach hessian sum
    SumHess,
    /// Hand out the finished model
    CommitModel,
}

impl fmt::Display for BuilderOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Next state of a transition: a fixed state, or unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    /// Move to the given state
    To(BuilderState),
    /// Remain in the current state
    Stay,
}

use BuilderOp as Op;
use BuilderState as S;

/// `(operation, states in which it is valid, resulting state)`
pub const TRANSITIONS: &[(BuilderOp, &[BuilderState], NextState)] = &[
    (Op::StartTree, &[S::ExpectTree], NextState::To(S::ExpectNode)),
    (Op::EndTree, &[S::ExpectNode], NextState::To(S::ExpectTree)),
    (Op::StartNode, &[S::ExpectNode], NextState::To(S::ExpectDetail)),
    (Op::EndNode, &[S::NodeComplete], NextState::To(S::ExpectNode)),
    (Op::NumericalTest, &[S::ExpectDetail], NextState::To(S::NodeComplete)),
    (Op::CategoricalTest, &[S::ExpectDetail], NextState::To(S::NodeComplete)),
    (Op::LeafScalar, &[S::ExpectDetail], NextState::To(S::NodeComplete)),
    (Op::LeafVector, &[S::ExpectDetail], NextState::To(S::NodeComplete)),
    (Op::Gain, &[S::ExpectDetail, S::NodeComplete], NextState::Stay),
    (Op::DataCount, &[S::ExpectDetail, S::NodeComplete], NextState::Stay),
    (Op::SumHess, &[S::ExpectDetail, S::NodeComplete], NextState::Stay),
    (Op::CommitModel, &[S::ExpectTree], NextState::To(S::ModelComplete)),
];

/// State reached by applying `op` in `current`, or a protocol error.
pub fn transition(op: BuilderOp, current: BuilderState) -> Result<BuilderState> {
    let (_, valid, next) = TRANSITIONS
        .iter()
        .find(|(candidate, _, _)| *candidate == op)
        .ok_or_else(|| TreeliteError::protocol(format!("no transition rule for {}", op)))?;
    if !valid.contains(&current) {
        return Err(TreeliteError::protocol(format!(
            "unexpected call to {}() in state {}",
            op, current
        )));
    }
    Ok(match next {
        NextState::To(state) => *state,
        NextState::Stay => current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_OPS: [BuilderOp; 12] = [
        Op::StartTree,
        Op::EndTree,
        Op::StartNode,
        Op::EndNode,
        Op::NumericalTest,
        Op::CategoricalTest,
        Op::LeafScalar,
        Op::LeafVector,
        Op::Gain,
        Op::DataCount,
        Op::SumHess,
        Op::CommitModel,
    ];

    #[test]
    fn test_every_op_has_a_rule() {
        for op in ALL_OPS {
            assert_eq!(TRANSITIONS.iter().filter(|(o, _, _)| *o == op).count(), 1);
        }
    }

    #[test]
    fn test_happy_path() {
        let mut state = S::ExpectTree;
        for op in [
            Op::StartTree,
            Op::StartNode,
            Op::Gain,
            Op::LeafScalar,
            Op::DataCount,
            Op::EndNode,
            Op::EndTree,
            Op::CommitModel,
        ] {
            state = transition(op, state).unwrap();
        }
        assert_eq!(state, S::ModelComplete);
    }

    #[test]
    fn test_model_complete_is_terminal() {
        for op in ALL_OPS {
            assert!(transition(op, S::ModelComplete).is_err());
        }
    }

    #[test]
    fn test_stats_keep_state() {
        assert_eq!(transition(Op::SumHess, S::NodeComplete).unwrap(), S::NodeComplete);
        assert_eq!(transition(Op::Gain, S::ExpectDetail).unwrap(), S::ExpectDetail);
        assert!(transition(Op::Gain, S::ExpectNode).is_err());
    }

    #[test]
    fn test_error_names_operation_and_state() {
        let err = transition(Op::EndNode, S::ExpectDetail).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("EndNode"));
        assert!(msg.contains("ExpectDetail"));
    }
}
