//! # Built-in Rewrite Rules
//!
//! This crate provides the default set of rewrite rules for the relopt engine. Every
//! rule is a plain transform function registered together with its operand pattern;
//! each module exposes a `register` function and the rule's name as a constant.
//!
//! ## Rules
//!
//! - **`FilterIntoJoin`** ([`filter_pushdown`]): Distributes the conjuncts of a filter
//!   sitting on a join, and of the join condition itself, onto the join inputs and
//!   into the join condition, respecting outer-join semantics.
//! - **`FilterMerge`** ([`filter_merge`]): Collapses two stacked filters into one so
//!   all conjuncts are pushed together.
//! - **`RemoveTrueFilter`** ([`remove_true_filter`]): Drops filters whose predicate is
//!   always true.
//!
//! ## Ordering
//!
//! Rules are tried at a node in registration order. Cleanup rules are registered
//! first so that pushdown sees merged, non-trivial filters.

pub mod filter_merge;
pub mod filter_pushdown;
pub mod remove_true_filter;

use relopt_core::rule::RuleRegistry;
use relopt_core::RuleError;

/// Create a rule registry with all built-in rules.
///
/// Additional rules can be registered on the returned registry before it is handed
/// to a rewriter.
pub fn default_rule_registry() -> Result<RuleRegistry, RuleError> {
    let mut registry = RuleRegistry::new();

    remove_true_filter::register(&mut registry)?;
    filter_merge::register(&mut registry)?;
    filter_pushdown::register(&mut registry)?;

    Ok(registry)
}
