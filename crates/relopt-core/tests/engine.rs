//! End-to-end tests of the match, fire and apply cycle on multi-join plans.
//!
//! ## What These Tests Verify
//! - Matches are produced outside-in and bind nodes in pattern pre-order
//! - A proposal is only a proposal: the driver can drop it
//! - Substitution copies the root-to-match path and shares everything else
//! - A call applied to a plan it was not found in is rejected
//! - Plans and rewriter configuration load from JSON

use pretty_assertions::assert_eq;
use relopt_core::engine::{apply, find_matches, fire};
use relopt_core::expr::Expr;
use relopt_core::pattern::Pattern;
use relopt_core::plan::{JoinType, PlanKind, PlanNode, PlanRef};
use relopt_core::rule::{RuleCall, RuleRegistry};
use relopt_core::{Result, RewriteConfig, RuleError};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Swaps the inputs of an inner join. Only used to exercise the engine, so the
/// condition is kept as is.
fn swap_inner_join(call: &mut RuleCall<'_>) -> Result<()> {
    let PlanNode::Join {
        left,
        right,
        join_type: JoinType::Inner,
        condition,
        flags,
    } = call.node(0).as_ref()
    else {
        return Ok(());
    };
    let swapped = PlanNode::join_with_flags(
        right.clone(),
        left.clone(),
        JoinType::Inner,
        condition.clone(),
        *flags,
    );
    call.transform_to(swapped)
}

/// `Filter(Join(Filter(Scan t1), Scan t2))` joined with `Scan t3` on the right.
fn three_way() -> (PlanRef, [PlanRef; 3]) {
    let t1 = PlanNode::scan("t1", &["a"]);
    let t2 = PlanNode::scan("t2", &["a"]);
    let t3 = PlanNode::scan("t3", &["a"]);
    let f1 = PlanNode::filter(t1.clone(), Expr::eq(Expr::column(0, "t1.a"), Expr::int(1)));
    let j12 = PlanNode::join(
        f1,
        t2.clone(),
        JoinType::Inner,
        Expr::eq(Expr::column(0, "t1.a"), Expr::column(1, "t2.a")),
    );
    let top = PlanNode::join(
        PlanNode::filter(j12, Expr::true_literal()),
        t3.clone(),
        JoinType::Left,
        Expr::eq(Expr::column(1, "t2.a"), Expr::column(2, "t3.a")),
    );
    (top, [t1, t2, t3])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_filter_over_join_binds_in_pre_order() {
    init_tracing();
    let mut registry = RuleRegistry::new();
    registry
        .register("Probe", Pattern::filter_join(), |_: &mut RuleCall<'_>| Ok(()))
        .unwrap();

    let (plan, _) = three_way();
    let calls: Vec<_> = find_matches(&registry, &plan).collect();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.path(), &[0]);
    let kinds: Vec<PlanKind> = call.nodes().iter().map(|n| n.kind()).collect();
    assert_eq!(kinds, vec![PlanKind::Filter, PlanKind::Join]);
}

#[test]
fn test_leaf_pattern_binds_scans() {
    let mut registry = RuleRegistry::new();
    let pattern = Pattern::Operator(
        PlanKind::Join,
        vec![Pattern::Any, Pattern::Leaf],
    );
    registry
        .register("JoinWithScanOnRight", pattern, |_: &mut RuleCall<'_>| Ok(()))
        .unwrap();

    let (plan, [_, t2, t3]) = three_way();
    let bound: Vec<(Vec<usize>, PlanRef)> = find_matches(&registry, &plan)
        .map(|c| (c.path().to_vec(), c.node(1).clone()))
        .collect();
    assert_eq!(bound.len(), 2);
    assert_eq!(bound[0].0, Vec::<usize>::new());
    assert!(Arc::ptr_eq(&bound[0].1, &t3));
    assert_eq!(bound[1].0, vec![0, 0]);
    assert!(Arc::ptr_eq(&bound[1].1, &t2));
}

#[test]
fn test_apply_copies_only_the_path() {
    let mut registry = RuleRegistry::new();
    registry.register("SwapInner", Pattern::join(), swap_inner_join).unwrap();

    let (plan, [_, t2, t3]) = three_way();
    // The root join is a left join; the rule declines it and fires on the inner one.
    let mut fired = None;
    for mut call in find_matches(&registry, &plan) {
        if fire(&mut call).unwrap().is_some() {
            fired = Some(apply(&plan, &call).unwrap());
            break;
        }
    }
    let rewritten = fired.expect("inner join should be swapped");

    let PlanNode::Join { left, right, .. } = rewritten.as_ref() else {
        panic!("expected a join at the root");
    };
    assert!(Arc::ptr_eq(right, &t3));
    let PlanNode::Filter { input, .. } = left.as_ref() else {
        panic!("expected a filter");
    };
    let PlanNode::Join { left: new_left, right: new_right, .. } = input.as_ref() else {
        panic!("expected the swapped join");
    };
    assert!(Arc::ptr_eq(new_left, &t2));
    assert_eq!(new_right.kind(), PlanKind::Filter);

    // The original plan still has the old order.
    assert_eq!(
        plan.explain(),
        "Join[LeftOuter] t2.a = t3.a\n\
         \x20 Filter true\n\
         \x20   Join[Inner] t1.a = t2.a\n\
         \x20     Filter t1.a = 1\n\
         \x20       Scan t1\n\
         \x20     Scan t2\n\
         \x20 Scan t3\n"
    );
}

#[test]
fn test_dropped_proposal_leaves_plan_alone() {
    let mut registry = RuleRegistry::new();
    registry.register("SwapInner", Pattern::join(), swap_inner_join).unwrap();

    let (plan, _) = three_way();
    let mut call = find_matches(&registry, &plan).nth(1).unwrap();
    assert!(fire(&mut call).unwrap().is_some());
    // The driver rejects the proposal.
    assert!(call.take_replacement().is_some());
    assert!(Arc::ptr_eq(&apply(&plan, &call).unwrap(), &plan));
}

#[test]
fn test_call_from_another_plan_is_stale() {
    let mut registry = RuleRegistry::new();
    registry.register("SwapInner", Pattern::join(), swap_inner_join).unwrap();

    let (plan, _) = three_way();
    let (other, _) = three_way();
    let mut call = find_matches(&registry, &plan).nth(1).unwrap();
    fire(&mut call).unwrap();

    assert_eq!(
        apply(&other, &call),
        Err(RuleError::StaleMatch {
            rule: "SwapInner".into(),
            path: vec![0, 0],
        })
    );
}

#[test]
fn test_plan_round_trips_through_json() {
    let (plan, _) = three_way();
    let json = serde_json::to_string(&plan).unwrap();
    let loaded: PlanRef = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded, plan);
}

#[test]
fn test_rewrite_config_from_json() {
    let config: RewriteConfig =
        serde_json::from_str(r#"{ "disabled_rules": ["FilterMerge"] }"#).unwrap();
    assert_eq!(
        config,
        RewriteConfig {
            disabled_rules: vec!["FilterMerge".into()],
            ..Default::default()
        }
    );
}
