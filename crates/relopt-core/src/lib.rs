//! # relopt-core: Rule-Based Plan Rewriting Core
//!
//! This crate implements the core data structures and algorithms of a rule-based
//! rewrite engine for relational query plans: locate sub-trees matching a declared
//! shape, hand them to a rule, and substitute the equivalent sub-tree the rule builds.
//!
//! ## Module Overview
//!
//! - **`expr`**: Scalar predicate trees (conjunction, disjunction, comparison, column
//!   reference, literal) used for filter predicates and join conditions.
//! - **`plan`**: Immutable, reference-counted plan nodes (scan, filter, join, opaque).
//! - **`pattern`**: Declarative operand patterns and the structural matcher.
//! - **`rule`**: Rules as (pattern, transform) values, rule calls and the registry.
//! - **`engine`**: Lazy match enumeration, rule firing and structural-sharing
//!   substitution.
//! - **`rewriter`**: A heuristic driver that applies rules until fixpoint.
//! - **`error`**: Error types.

pub mod engine;
pub mod error;
pub mod expr;
pub mod pattern;
pub mod plan;
pub mod rewriter;
pub mod rule;

pub use engine::{apply, find_matches, fire, Matches};
pub use error::{PatternError, Result, RuleError};
pub use plan::{PlanNode, PlanRef};
pub use rewriter::{HeuristicRewriter, RewriteConfig, RewriteOutcome};
pub use rule::{Rule, RuleCall, RuleHandle, RuleRegistry};
