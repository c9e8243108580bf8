//! Removes filters whose predicate is always true.
//!
//! `Filter(true, A)` passes every row of `A`, so it is replaced by `A` itself. The
//! pushdown rule leaves no such filter behind, but plans built by hand or by other
//! rules may contain them.

use relopt_core::pattern::Pattern;
use relopt_core::plan::PlanNode;
use relopt_core::rule::{RuleCall, RuleHandle, RuleRegistry};
use relopt_core::Result;

pub const REMOVE_TRUE_FILTER: &str = "RemoveTrueFilter";

pub fn register(registry: &mut RuleRegistry) -> Result<RuleHandle> {
    registry.register(REMOVE_TRUE_FILTER, Pattern::filter(), remove_true_filter)
}

fn remove_true_filter(call: &mut RuleCall<'_>) -> Result<()> {
    let PlanNode::Filter { input, predicate } = call.node(0).as_ref() else {
        return Ok(());
    };
    if !predicate.is_always_true() {
        return Ok(());
    }
    let input = input.clone();
    call.transform_to(input)
}
