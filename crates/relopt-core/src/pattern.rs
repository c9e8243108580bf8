//! # Declarative Pattern Matching for Rewrite Rules
//!
//! Each rule declares a `Pattern` describing the shape of the sub-tree it transforms.
//! The engine checks the pattern against a plan position before calling the rule, so
//! a rule only ever sees nodes of the kinds it asked for.
//!
//! ## Pattern Language
//!
//! - `Pattern::Operator(kind, children)`: matches a node of `kind` whose inputs match
//!   `children` position by position (e.g. "a Filter on top of a Join").
//! - `Pattern::Any`: matches any sub-tree. Used for inputs the rule does not inspect.
//! - `Pattern::Leaf`: matches only nodes without inputs.
//!
//! ## Bindings
//!
//! A successful match binds the matched nodes in pattern pre-order, root first. `Any`
//! positions are not bound; `Operator` and `Leaf` positions are. For
//! `Filter(Join(Any, Any))` the bindings are `[filter, join]`.
//!
//! ## Validation
//!
//! Patterns are checked once, at registration: the root must be an operator and every
//! operator's child list must agree with the number of inputs of that node kind.
//! `Other` nodes have a variable number of inputs, so any child list is accepted and
//! the input count is compared while matching instead.

use crate::error::PatternError;
use crate::plan::{PlanKind, PlanRef};

/// Pattern for matching sub-trees of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Match an operator of the given kind with child patterns.
    Operator(PlanKind, Vec<Pattern>),
    /// Match any sub-tree without binding it.
    Any,
    /// Match a node with no inputs.
    Leaf,
}

impl Pattern {
    /// Match a filter with any input.
    pub fn filter() -> Self {
        Pattern::Operator(PlanKind::Filter, vec![Pattern::Any])
    }

    /// Match a join with any two inputs.
    pub fn join() -> Self {
        Pattern::Operator(PlanKind::Join, vec![Pattern::Any, Pattern::Any])
    }

    /// Match a filter whose input is exactly a join.
    pub fn filter_join() -> Self {
        Pattern::Operator(PlanKind::Filter, vec![Self::join()])
    }

    /// Match a filter whose input is another filter.
    pub fn filter_filter() -> Self {
        Pattern::Operator(PlanKind::Filter, vec![Self::filter()])
    }

    /// Kind of the root operator, if the root is an operator.
    pub fn root_kind(&self) -> Option<PlanKind> {
        match self {
            Pattern::Operator(kind, _) => Some(*kind),
            Pattern::Any | Pattern::Leaf => None,
        }
    }

    /// Number of nodes a successful match binds.
    pub fn bound_count(&self) -> usize {
        match self {
            Pattern::Any => 0,
            Pattern::Leaf => 1,
            Pattern::Operator(_, children) => {
                1 + children.iter().map(Pattern::bound_count).sum::<usize>()
            }
        }
    }

    /// Check the pattern is usable as a rule pattern.
    pub fn validate(&self) -> Result<(), PatternError> {
        if self.root_kind().is_none() {
            return Err(PatternError::NonOperatorRoot);
        }
        self.validate_arity()
    }

    fn validate_arity(&self) -> Result<(), PatternError> {
        let Pattern::Operator(kind, children) = self else {
            return Ok(());
        };
        if let Some(expected) = kind.input_count() {
            if expected != children.len() {
                return Err(PatternError::ArityMismatch {
                    kind: *kind,
                    expected,
                    found: children.len(),
                });
            }
        }
        children.iter().try_for_each(Pattern::validate_arity)
    }
}

/// Check whether the sub-tree rooted at `node` matches `pattern`.
pub fn matches(node: &PlanRef, pattern: &Pattern) -> bool {
    let mut scratch = Vec::new();
    match_and_bind(node, pattern, &mut scratch)
}

/// Match `node` against `pattern`, appending bound nodes to `bindings` in pre-order.
///
/// On failure `bindings` is left as it was on entry.
pub fn match_and_bind(node: &PlanRef, pattern: &Pattern, bindings: &mut Vec<PlanRef>) -> bool {
    let mark = bindings.len();
    let matched = bind_inner(node, pattern, bindings);
    if !matched {
        bindings.truncate(mark);
    }
    matched
}

fn bind_inner(node: &PlanRef, pattern: &Pattern, bindings: &mut Vec<PlanRef>) -> bool {
    match pattern {
        Pattern::Any => true,
        Pattern::Leaf => {
            if !node.inputs().is_empty() {
                return false;
            }
            bindings.push(node.clone());
            true
        }
        Pattern::Operator(kind, child_patterns) => {
            if node.kind() != *kind {
                return false;
            }
            let inputs = node.inputs();
            if inputs.len() != child_patterns.len() {
                return false;
            }
            bindings.push(node.clone());
            inputs
                .into_iter()
                .zip(child_patterns)
                .all(|(input, child_pattern)| bind_inner(input, child_pattern, bindings))
        }
    }
}
