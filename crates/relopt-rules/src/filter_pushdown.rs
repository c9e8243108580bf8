//! # Filter Pushdown Into Joins
//!
//! Pushing predicates toward the inputs they read is one of the most impactful
//! rewrites, because every row discarded early is a row the join never processes.
//!
//! ## What It Does
//!
//! The rule matches a Filter directly on top of a Join and redistributes the
//! conjuncts of both the filter predicate and the join condition:
//!
//! ```text
//! Before: Filter(t1.x = 1 AND t2.y = 2, Join[Inner](t1, t2, t1.a = t2.a))
//! After:  Join[Inner](Filter(x = 1, t1), Filter(y = 2, t2), t1.a = t2.a)
//! ```
//!
//! Each conjunct ends up in one of four places: above the join, in the join
//! condition, on a new filter over the left input, or on a new filter over the right
//! input. Disjunctions are kept whole; no per-side terms are derived from them.
//!
//! ## Outer Joins
//!
//! Where a conjunct may go depends on which sides of the join synthesize NULLs:
//!
//! - A conjunct from *above* the join reads the join output. It may move onto an input
//!   only if that input is not null-generating: filtering a null-generating input
//!   before the join would turn discarded rows into NULL-padded rows instead of
//!   removing them. It may move into the join condition only for inner joins.
//! - A conjunct of the *join condition* decides which row pairs match. It may move onto
//!   an input only if that input's unmatched rows are not preserved, i.e. the
//!   *other* side is not null-generating. For a left outer join, right-only ON
//!   conjuncts move onto the right input and left-only ones stay.
//!
//! ## Idempotence
//!
//! If classification moves nothing, the rule declines. Its output never contains a
//! Filter directly over the new join with anything left to push, so firing the rule
//! on its own output is a no-op.
//!
//! Conjuncts that read no columns at all are sent to the left input when both sides
//! would accept them.

use relopt_core::expr::Expr;
use relopt_core::pattern::Pattern;
use relopt_core::plan::{JoinType, PlanNode, PlanRef};
use relopt_core::rule::{RuleCall, RuleHandle, RuleRegistry};
use relopt_core::{Result, RuleError};
use tracing::{debug, trace};

pub const FILTER_INTO_JOIN: &str = "FilterIntoJoin";

/// Register the filter-into-join pushdown rule.
pub fn register(registry: &mut RuleRegistry) -> Result<RuleHandle> {
    registry.register(FILTER_INTO_JOIN, Pattern::filter_join(), filter_into_join)
}

/// Which inputs of a join a conjunct reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputSide {
    /// No columns at all; acceptable on either side.
    Neither,
    Left,
    Right,
    Both,
}

/// Column layout of a join input row: left columns then right columns.
#[derive(Debug, Clone, Copy)]
struct JoinLayout {
    left_width: usize,
    right_width: usize,
}

impl JoinLayout {
    fn width(&self) -> usize {
        self.left_width + self.right_width
    }

    fn side_of(&self, conjunct: &Expr) -> Result<InputSide> {
        let refs = conjunct.input_refs();
        let (mut left, mut right) = (false, false);
        for index in refs.ones() {
            if index >= self.width() {
                return Err(RuleError::ColumnOutOfRange {
                    index,
                    width: self.width(),
                });
            }
            if index < self.left_width {
                left = true;
            } else {
                right = true;
            }
        }
        Ok(match (left, right) {
            (false, false) => InputSide::Neither,
            (true, false) => InputSide::Left,
            (false, true) => InputSide::Right,
            (true, true) => InputSide::Both,
        })
    }
}

/// Where a classification pass may move conjuncts.
#[derive(Debug, Clone, Copy)]
struct PushTargets {
    into_join: bool,
    left: bool,
    right: bool,
}

impl PushTargets {
    /// Targets for conjuncts of the filter above the join.
    fn for_filter(join_type: JoinType) -> Self {
        Self {
            into_join: join_type == JoinType::Inner,
            left: !join_type.generates_nulls_on_left(),
            right: !join_type.generates_nulls_on_right(),
        }
    }

    /// Targets for conjuncts of the join condition itself.
    fn for_join_condition(join_type: JoinType) -> Self {
        Self {
            into_join: false,
            left: !join_type.generates_nulls_on_right(),
            right: !join_type.generates_nulls_on_left(),
        }
    }
}

/// Conjuncts sorted by destination.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Destinations {
    join: Vec<Expr>,
    left: Vec<Expr>,
    right: Vec<Expr>,
}

/// Move every conjunct of `filters` that `targets` allows into `dest`; the rest stay
/// in `filters`. Returns true if anything moved.
fn classify(
    layout: JoinLayout,
    filters: &mut Vec<Expr>,
    targets: PushTargets,
    dest: &mut Destinations,
) -> Result<bool> {
    let mut pushed = false;
    let mut kept = Vec::with_capacity(filters.len());
    for conjunct in filters.drain(..) {
        let side = layout.side_of(&conjunct)?;
        let left_only = matches!(side, InputSide::Left | InputSide::Neither);
        let right_only = matches!(side, InputSide::Right | InputSide::Neither);

        if targets.left && left_only {
            dest.left.push(conjunct);
        } else if targets.right && right_only {
            dest.right.push(conjunct.rebase_columns(layout.left_width));
        } else if targets.into_join {
            if !dest.join.contains(&conjunct) {
                dest.join.push(conjunct);
            }
        } else {
            kept.push(conjunct);
            continue;
        }
        pushed = true;
    }
    *filters = kept;
    Ok(pushed)
}

/// Result of classifying a filter-over-join match.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pushdown {
    above: Vec<Expr>,
    dest: Destinations,
    pushed: bool,
}

fn plan_pushdown(
    layout: JoinLayout,
    join_type: JoinType,
    predicate: &Expr,
    condition: &Expr,
) -> Result<Pushdown> {
    let mut above = predicate.to_conjuncts();
    let mut dest = Destinations {
        join: condition.to_conjuncts(),
        ..Default::default()
    };

    let mut pushed = classify(layout, &mut above, PushTargets::for_filter(join_type), &mut dest)?;

    // Second pass over the join condition, including what the first pass moved in.
    let mut on_conds = std::mem::take(&mut dest.join);
    pushed |= classify(
        layout,
        &mut on_conds,
        PushTargets::for_join_condition(join_type),
        &mut dest,
    )?;
    on_conds.append(&mut dest.join);
    dest.join = on_conds;

    Ok(Pushdown {
        above,
        dest,
        pushed,
    })
}

/// Put a filter with `conjuncts` on top of `input`, or return `input` itself if there
/// are none.
fn filter_on(input: &PlanRef, conjuncts: Vec<Expr>) -> PlanRef {
    if conjuncts.is_empty() {
        input.clone()
    } else {
        PlanNode::filter(input.clone(), Expr::and_all(conjuncts))
    }
}

fn filter_into_join(call: &mut RuleCall<'_>) -> Result<()> {
    let PlanNode::Filter { predicate, .. } = call.node(0).as_ref() else {
        return Ok(());
    };
    let PlanNode::Join {
        left,
        right,
        join_type,
        condition,
        flags,
    } = call.node(1).as_ref()
    else {
        return Ok(());
    };

    if flags.already_repartitioned {
        trace!("join was rebuilt from a multi-way join; filters already distributed");
        return Ok(());
    }

    let layout = JoinLayout {
        left_width: left.arity(),
        right_width: right.arity(),
    };
    let Pushdown {
        above,
        dest,
        pushed,
    } = plan_pushdown(layout, *join_type, predicate, condition)?;
    if !pushed {
        trace!(join_type = %join_type, "nothing to push");
        return Ok(());
    }

    debug!(
        join_type = %join_type,
        above = above.len(),
        join = dest.join.len(),
        left = dest.left.len(),
        right = dest.right.len(),
        "pushing filter conjuncts into join"
    );

    let new_left = filter_on(left, dest.left);
    let new_right = filter_on(right, dest.right);
    let new_join = PlanNode::join_with_flags(
        new_left,
        new_right,
        *join_type,
        Expr::and_all(dest.join),
        *flags,
    );
    let new_top = filter_on(&new_join, above);
    call.transform_to(new_top)
}
