//! End-to-end tests for filter pushdown into joins.
//!
//! The plans join `t1(a, x, z)` with `t2(a, y)`, so join rows are laid out as
//! `t1.a, t1.x, t1.z, t2.a, t2.y` at positions 0 through 4.
//!
//! ## What These Tests Verify
//! - Conjuncts land on the inputs they read, or in the join condition, per join type
//! - Disjunctions are moved or kept as a whole, never split
//! - Declines (nothing to push, repartitioned joins) leave no replacement behind
//! - Untouched inputs are shared with the original plan, not copied
//! - The heuristic rewriter pushes filters through stacked joins to a fixpoint

use pretty_assertions::assert_eq;
use relopt_core::engine::{apply, find_matches, fire};
use relopt_core::expr::Expr;
use relopt_core::plan::{JoinFlags, JoinType, PlanNode, PlanRef};
use relopt_core::rule::RuleRegistry;
use relopt_core::{HeuristicRewriter, RewriteConfig, RuleError};
use relopt_rules::{default_rule_registry, filter_pushdown};
use std::collections::HashSet;
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

fn t1() -> PlanRef {
    PlanNode::scan("t1", &["a", "x", "z"])
}

fn t2() -> PlanRef {
    PlanNode::scan("t2", &["a", "y"])
}

fn a_eq_a() -> Expr {
    Expr::eq(Expr::column(0, "t1.a"), Expr::column(3, "t2.a"))
}

fn x_eq_1() -> Expr {
    Expr::eq(Expr::column(1, "t1.x"), Expr::int(1))
}

fn z_eq_3() -> Expr {
    Expr::eq(Expr::column(2, "t1.z"), Expr::int(3))
}

fn y_eq_2() -> Expr {
    Expr::eq(Expr::column(4, "t2.y"), Expr::int(2))
}

fn pushdown_registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();
    filter_pushdown::register(&mut registry).unwrap();
    registry
}

/// Fire filter pushdown at the plan root and apply its proposal.
fn push_at_root(plan: &PlanRef) -> Result<Option<PlanRef>, RuleError> {
    let registry = pushdown_registry();
    let Some(mut call) = find_matches(&registry, plan).find(|c| c.path().is_empty()) else {
        return Ok(None);
    };
    match fire(&mut call)? {
        Some(_) => apply(plan, &call).map(Some),
        None => Ok(None),
    }
}

/// Every conjunct of every filter predicate and join condition in the tree, rendered
/// by column name so rebased columns compare equal.
fn all_conjuncts(plan: &PlanRef) -> Vec<String> {
    let mut out = Vec::new();
    collect_conjuncts(plan, &mut out);
    out.sort();
    out
}

fn collect_conjuncts(plan: &PlanRef, out: &mut Vec<String>) {
    match plan.as_ref() {
        PlanNode::Filter { predicate, .. } => {
            out.extend(predicate.conjuncts().iter().map(|c| c.to_string()))
        }
        PlanNode::Join { condition, .. } => {
            out.extend(condition.conjuncts().iter().map(|c| c.to_string()))
        }
        _ => {}
    }
    for input in plan.inputs() {
        collect_conjuncts(input, out);
    }
}

fn join_inputs(plan: &PlanRef) -> (&PlanRef, &PlanRef) {
    match plan.as_ref() {
        PlanNode::Join { left, right, .. } => (left, right),
        other => panic!("expected a join, got\n{other}"),
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_inner_join_pushes_filter_to_both_inputs() {
    init_tracing();
    let plan = PlanNode::filter(
        PlanNode::join(t1(), t2(), JoinType::Inner, a_eq_a()),
        Expr::And(vec![x_eq_1(), y_eq_2()]),
    );

    let rewritten = push_at_root(&plan).unwrap().expect("rule should fire");
    assert_eq!(
        rewritten.explain(),
        "Join[Inner] t1.a = t2.a\n\
         \x20 Filter t1.x = 1\n\
         \x20   Scan t1\n\
         \x20 Filter t2.y = 2\n\
         \x20   Scan t2\n"
    );

    // The right-side conjunct is rebased onto the right input's row.
    let (_, right) = join_inputs(&rewritten);
    let PlanNode::Filter { predicate, .. } = right.as_ref() else {
        panic!("expected a filter on the right input");
    };
    assert_eq!(predicate, &Expr::eq(Expr::column(1, "t2.y"), Expr::int(2)));
}

#[test]
fn test_left_join_right_only_filter_declines() {
    let plan = PlanNode::filter(
        PlanNode::join(t1(), t2(), JoinType::Left, a_eq_a()),
        y_eq_2(),
    );
    assert_eq!(push_at_root(&plan).unwrap(), None);
}

#[test]
fn test_disjunction_is_never_split() {
    let disjunction = Expr::Or(vec![Expr::And(vec![x_eq_1(), y_eq_2()]), z_eq_3()]);

    // Inner join: the disjunction reads both inputs and joins the condition whole.
    let plan = PlanNode::filter(
        PlanNode::join(t1(), t2(), JoinType::Inner, a_eq_a()),
        disjunction.clone(),
    );
    let rewritten = push_at_root(&plan).unwrap().expect("rule should fire");
    let PlanNode::Join { condition, .. } = rewritten.as_ref() else {
        panic!("expected a join at the root, got\n{rewritten}");
    };
    assert_eq!(condition, &Expr::And(vec![a_eq_a(), disjunction.clone()]));
    let (left, right) = join_inputs(&rewritten);
    assert_eq!(left.kind(), relopt_core::plan::PlanKind::Scan);
    assert_eq!(right.kind(), relopt_core::plan::PlanKind::Scan);

    // Left join: it stays above, unchanged.
    let plan = PlanNode::filter(
        PlanNode::join(t1(), t2(), JoinType::Left, a_eq_a()),
        disjunction,
    );
    assert_eq!(push_at_root(&plan).unwrap(), None);
}

#[test]
fn test_true_filter_declines() {
    let plan = PlanNode::filter(
        PlanNode::join(t1(), t2(), JoinType::Inner, a_eq_a()),
        Expr::true_literal(),
    );
    assert_eq!(push_at_root(&plan).unwrap(), None);

    let registry = pushdown_registry();
    let mut call = find_matches(&registry, &plan).next().unwrap();
    assert_eq!(fire(&mut call).unwrap(), None);
    assert!(call.replacement().is_none());
}

// ---------------------------------------------------------------------------
// Join types
// ---------------------------------------------------------------------------

#[test]
fn test_left_join_pushes_left_filter_and_keeps_right_above() {
    let t2 = t2();
    let plan = PlanNode::filter(
        PlanNode::join(t1(), t2.clone(), JoinType::Left, a_eq_a()),
        Expr::And(vec![x_eq_1(), y_eq_2()]),
    );
    let rewritten = push_at_root(&plan).unwrap().expect("rule should fire");
    assert_eq!(
        rewritten.explain(),
        "Filter t2.y = 2\n\
         \x20 Join[LeftOuter] t1.a = t2.a\n\
         \x20   Filter t1.x = 1\n\
         \x20     Scan t1\n\
         \x20   Scan t2\n"
    );
    let PlanNode::Filter { input, .. } = rewritten.as_ref() else {
        unreachable!();
    };
    let (_, right) = join_inputs(input);
    assert!(Arc::ptr_eq(right, &t2));
}

#[test]
fn test_right_join_mirrors_left_join() {
    let plan = PlanNode::filter(
        PlanNode::join(t1(), t2(), JoinType::Right, a_eq_a()),
        Expr::And(vec![x_eq_1(), y_eq_2()]),
    );
    let rewritten = push_at_root(&plan).unwrap().expect("rule should fire");
    assert_eq!(
        rewritten.explain(),
        "Filter t1.x = 1\n\
         \x20 Join[RightOuter] t1.a = t2.a\n\
         \x20   Scan t1\n\
         \x20   Filter t2.y = 2\n\
         \x20     Scan t2\n"
    );
}

#[test]
fn test_left_join_on_condition_filters_right_input() {
    let condition = Expr::And(vec![a_eq_a(), x_eq_1(), y_eq_2()]);
    let plan = PlanNode::filter(
        PlanNode::join(t1(), t2(), JoinType::Left, condition),
        z_eq_3(),
    );
    let rewritten = push_at_root(&plan).unwrap().expect("rule should fire");
    // Left rows are preserved, so the left-only ON conjunct stays in the condition.
    assert_eq!(
        rewritten.explain(),
        "Join[LeftOuter] (t1.a = t2.a AND t1.x = 1)\n\
         \x20 Filter t1.z = 3\n\
         \x20   Scan t1\n\
         \x20 Filter t2.y = 2\n\
         \x20   Scan t2\n"
    );
}

#[test]
fn test_full_join_moves_nothing() {
    let plan = PlanNode::filter(
        PlanNode::join(
            t1(),
            t2(),
            JoinType::Full,
            Expr::And(vec![a_eq_a(), x_eq_1(), y_eq_2()]),
        ),
        Expr::And(vec![x_eq_1(), y_eq_2()]),
    );
    assert_eq!(push_at_root(&plan).unwrap(), None);
}

#[test]
fn test_repartitioned_join_declines() {
    let flags = JoinFlags {
        already_repartitioned: true,
        ..Default::default()
    };
    let plan = PlanNode::filter(
        PlanNode::join_with_flags(t1(), t2(), JoinType::Inner, a_eq_a(), flags),
        x_eq_1(),
    );
    assert_eq!(push_at_root(&plan).unwrap(), None);
}

#[test]
fn test_join_flags_survive_rewrite() {
    let flags = JoinFlags {
        semi_join_done: true,
        ..Default::default()
    };
    let plan = PlanNode::filter(
        PlanNode::join_with_flags(t1(), t2(), JoinType::Inner, a_eq_a(), flags),
        x_eq_1(),
    );
    let rewritten = push_at_root(&plan).unwrap().expect("rule should fire");
    let PlanNode::Join { flags: kept, .. } = rewritten.as_ref() else {
        panic!("expected a join, got\n{rewritten}");
    };
    assert_eq!(*kept, flags);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn test_pushdown_is_idempotent() {
    let plans = [
        PlanNode::filter(
            PlanNode::join(t1(), t2(), JoinType::Inner, a_eq_a()),
            Expr::And(vec![x_eq_1(), y_eq_2(), z_eq_3()]),
        ),
        PlanNode::filter(
            PlanNode::join(t1(), t2(), JoinType::Left, Expr::And(vec![a_eq_a(), y_eq_2()])),
            Expr::And(vec![x_eq_1(), y_eq_2()]),
        ),
    ];
    let registry = pushdown_registry();
    for plan in plans {
        let rewritten = push_at_root(&plan).unwrap().expect("rule should fire");
        for mut call in find_matches(&registry, &rewritten) {
            assert_eq!(fire(&mut call).unwrap(), None, "fired again on\n{rewritten}");
        }
    }
}

#[test]
fn test_untouched_inputs_are_shared() {
    let (t1, t2) = (t1(), t2());
    let plan = PlanNode::filter(
        PlanNode::join(t1.clone(), t2.clone(), JoinType::Inner, a_eq_a()),
        x_eq_1(),
    );
    let rewritten = push_at_root(&plan).unwrap().expect("rule should fire");
    let (left, right) = join_inputs(&rewritten);
    assert!(Arc::ptr_eq(right, &t2));
    let PlanNode::Filter { input, .. } = left.as_ref() else {
        panic!("expected a filter on the left input");
    };
    assert!(Arc::ptr_eq(input, &t1));
}

#[test]
fn test_conjuncts_are_conserved() {
    let plan = PlanNode::filter(
        PlanNode::join(
            t1(),
            t2(),
            JoinType::Left,
            Expr::And(vec![a_eq_a(), x_eq_1(), y_eq_2()]),
        ),
        Expr::And(vec![z_eq_3(), y_eq_2(), Expr::Or(vec![x_eq_1(), y_eq_2()])]),
    );
    let rewritten = push_at_root(&plan).unwrap().expect("rule should fire");
    assert_eq!(all_conjuncts(&rewritten), all_conjuncts(&plan));
}

#[test]
fn test_original_plan_is_unchanged() {
    let plan = PlanNode::filter(
        PlanNode::join(t1(), t2(), JoinType::Inner, a_eq_a()),
        Expr::And(vec![x_eq_1(), y_eq_2()]),
    );
    let before = plan.explain();
    push_at_root(&plan).unwrap().expect("rule should fire");
    assert_eq!(plan.explain(), before);
}

#[test]
fn test_column_out_of_range_is_an_error() {
    let bad = Expr::eq(Expr::column(7, "t9.q"), Expr::int(0));
    let plan = PlanNode::filter(PlanNode::join(t1(), t2(), JoinType::Inner, a_eq_a()), bad);
    assert_eq!(
        push_at_root(&plan),
        Err(RuleError::ColumnOutOfRange { index: 7, width: 5 })
    );
}

// ---------------------------------------------------------------------------
// Rewriter
// ---------------------------------------------------------------------------

#[test]
fn test_rewriter_pushes_through_stacked_joins() {
    init_tracing();
    let t3 = PlanNode::scan("t3", &["a", "w"]);
    let t1 = PlanNode::scan("t1", &["a", "x"]);
    let t2 = PlanNode::scan("t2", &["a", "y"]);

    // Row of the outer join: t1.a, t1.x, t2.a, t2.y, t3.a, t3.w.
    let inner_join = PlanNode::join(
        t1,
        t2,
        JoinType::Inner,
        Expr::eq(Expr::column(0, "t1.a"), Expr::column(2, "t2.a")),
    );
    let outer_join = PlanNode::join(
        inner_join,
        t3.clone(),
        JoinType::Inner,
        Expr::eq(Expr::column(2, "t2.a"), Expr::column(4, "t3.a")),
    );
    let plan = PlanNode::filter(
        PlanNode::filter(outer_join, Expr::eq(Expr::column(1, "t1.x"), Expr::int(1))),
        Expr::And(vec![
            Expr::eq(Expr::column(5, "t3.w"), Expr::int(5)),
            Expr::eq(Expr::column(3, "t2.y"), Expr::int(2)),
        ]),
    );

    let registry = Arc::new(default_rule_registry().unwrap());
    let rewriter = HeuristicRewriter::new(registry, RewriteConfig::default());
    let outcome = rewriter.rewrite(&plan).unwrap();

    assert_eq!(
        outcome.plan.explain(),
        "Join[Inner] t2.a = t3.a\n\
         \x20 Join[Inner] t1.a = t2.a\n\
         \x20   Filter t1.x = 1\n\
         \x20     Scan t1\n\
         \x20   Filter t2.y = 2\n\
         \x20     Scan t2\n\
         \x20 Filter t3.w = 5\n\
         \x20   Scan t3\n"
    );
    assert_eq!(
        outcome.fired,
        vec!["FilterMerge", "FilterIntoJoin", "FilterIntoJoin"]
    );
    assert!(!outcome.budget_exhausted);

    let distinct: HashSet<String> = all_conjuncts(&outcome.plan).into_iter().collect();
    assert_eq!(distinct.len(), 5);

    // A second rewrite of the result finds nothing to do.
    let again = rewriter.rewrite(&outcome.plan).unwrap();
    assert!(again.fired.is_empty());
    assert!(Arc::ptr_eq(&again.plan, &outcome.plan));
}

#[test]
fn test_rewriter_removes_true_filter_left_above_join() {
    let join = PlanNode::join(t1(), t2(), JoinType::Left, a_eq_a());
    let plan = PlanNode::filter(join.clone(), Expr::true_literal());

    let rewriter = HeuristicRewriter::new(
        Arc::new(default_rule_registry().unwrap()),
        RewriteConfig::default(),
    );
    let outcome = rewriter.rewrite(&plan).unwrap();
    assert!(Arc::ptr_eq(&outcome.plan, &join));
    assert_eq!(outcome.fired, vec!["RemoveTrueFilter"]);
}

#[test]
fn test_rewriter_respects_disabled_rules() {
    let plan = PlanNode::filter(
        PlanNode::join(t1(), t2(), JoinType::Inner, a_eq_a()),
        x_eq_1(),
    );
    let config = RewriteConfig {
        disabled_rules: vec![filter_pushdown::FILTER_INTO_JOIN.to_string()],
        ..Default::default()
    };
    let rewriter = HeuristicRewriter::new(Arc::new(default_rule_registry().unwrap()), config);
    let outcome = rewriter.rewrite(&plan).unwrap();
    assert!(Arc::ptr_eq(&outcome.plan, &plan));
}
