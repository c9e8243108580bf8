//! # Filter Merge Rule
//!
//! Two stacked filters are equivalent to a single filter on the conjunction of their
//! predicates:
//!
//! ```text
//! Before: Filter(p, Filter(q, A))
//! After:  Filter(q AND p, A)
//! ```
//!
//! Merging lets the pushdown rule see every conjunct at once when the merged filter
//! sits on a join. Conjuncts of the inner filter come first and duplicates are
//! dropped.

use relopt_core::expr::Expr;
use relopt_core::pattern::Pattern;
use relopt_core::plan::PlanNode;
use relopt_core::rule::{RuleCall, RuleHandle, RuleRegistry};
use relopt_core::Result;
use tracing::trace;

pub const FILTER_MERGE: &str = "FilterMerge";

pub fn register(registry: &mut RuleRegistry) -> Result<RuleHandle> {
    registry.register(FILTER_MERGE, Pattern::filter_filter(), filter_merge)
}

fn filter_merge(call: &mut RuleCall<'_>) -> Result<()> {
    let PlanNode::Filter { predicate: outer, .. } = call.node(0).as_ref() else {
        return Ok(());
    };
    let PlanNode::Filter {
        input,
        predicate: inner,
    } = call.node(1).as_ref()
    else {
        return Ok(());
    };

    let mut merged = inner.to_conjuncts();
    for conjunct in outer.to_conjuncts() {
        if !merged.contains(&conjunct) {
            merged.push(conjunct);
        }
    }
    trace!(conjuncts = merged.len(), "merging stacked filters");

    let replacement = PlanNode::filter(input.clone(), Expr::and_all(merged));
    call.transform_to(replacement)
}
