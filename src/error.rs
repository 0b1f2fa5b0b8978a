use std::collections::BTreeSet;

use thiserror::Error;

use crate::filter::model::Operator;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("negation is not supported for operator(s): {}", join_operators(.operators))]
    UnsupportedNegation { operators: BTreeSet<Operator> },

    #[error("incomplete rule at path {path:?}")]
    IncompleteRule { path: Vec<usize> },

    #[error("invalid filter structure: {reason}")]
    InvalidStructure { reason: String },

    #[error("rewrite would produce {produced} leaves, limit is {limit}")]
    RewriteTooLarge { produced: usize, limit: usize },

    #[error("cannot lower nesting depth to {requested}, draft is {current} levels deep")]
    DepthBelowTree { requested: usize, current: usize },

    #[error("{name} must be within {min}..={max}, got {requested}")]
    LimitOutOfRange {
        name: &'static str,
        requested: usize,
        min: usize,
        max: usize,
    },
}

impl FilterError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        FilterError::InvalidStructure {
            reason: reason.into(),
        }
    }
}

fn join_operators(operators: &BTreeSet<Operator>) -> String {
    operators
        .iter()
        .map(|op| op.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
