//! Error types for rule registration, firing and plan substitution.
//!
//! Registration errors (`InvalidPattern`, `DuplicateRule`) are configuration mistakes
//! and are expected to be surfaced at startup. A pattern that simply does not match,
//! or a rule that declines a match, is not an error and never produces one.

use crate::plan::PlanKind;

/// Structural problems in an operand pattern, detected when the rule is registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// The pattern root must name an operator kind so the rule can be indexed by it.
    #[error("pattern root must be an operator, not a wildcard or leaf")]
    NonOperatorRoot,
    /// A child list disagrees with the number of inputs the operator kind has.
    #[error("{kind} takes {expected} inputs but the pattern lists {found}")]
    ArityMismatch {
        kind: PlanKind,
        expected: usize,
        found: usize,
    },
}

/// Errors raised by the rule registry, rule calls and the rewrite engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("invalid pattern for rule '{rule}': {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: PatternError,
    },
    #[error("rule '{0}' is already registered")]
    DuplicateRule(String),
    /// A rule tried to write a second replacement into its rule call.
    #[error("rule '{0}' wrote more than one replacement")]
    ReplacementAlreadySet(String),
    /// The match position does not exist in the plan being rewritten.
    #[error("match path {path:?} does not resolve in the plan")]
    InvalidPath { path: Vec<usize> },
    /// The node at the match position is no longer the node the rule matched.
    #[error("rule '{rule}' matched a node that is no longer at {path:?}")]
    StaleMatch { rule: String, path: Vec<usize> },
    /// A predicate references a column outside the row it is evaluated against.
    #[error("column {index} is out of range for an input row of width {width}")]
    ColumnOutOfRange { index: usize, width: usize },
}

pub type Result<T, E = RuleError> = std::result::Result<T, E>;
