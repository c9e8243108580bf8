//! # Matching and Dispatch
//!
//! This module finds rule matches in a plan, fires rules, and substitutes their
//! replacements back into the plan.
//!
//! ## Finding Matches
//!
//! [`find_matches`] returns a lazy iterator of [`RuleCall`]s. It walks the plan in
//! pre-order, so every match rooted at a node is produced before any match rooted
//! below it (outside-in). At each node only the rules indexed under that node's kind
//! are tried, in registration order. The iterator is finite, can be restarted, and the
//! engine keeps no state between calls.
//!
//! ## Firing and Applying
//!
//! Firing ([`fire`]) runs the rule's transform and returns its proposal. Applying
//! ([`apply`]) is a separate step that substitutes the proposal at the match position.
//! A driver can therefore inspect a proposal and drop it.
//!
//! Substitution copies the path from the root to the match position and shares every
//! other sub-tree with the input plan:
//!
//! ```text
//! Before:  P(Q(A, B), C)        replace B with B'
//! After:   P'(Q'(A, B'), C)     A and C are the same Arcs as before
//! ```

use crate::error::{Result, RuleError};
use crate::pattern::match_and_bind;
use crate::plan::PlanRef;
use crate::rule::{RuleCall, RuleRegistry};
use std::sync::Arc;
use tracing::trace;

/// Lazy sequence of rule calls for every match in a plan.
#[derive(Clone)]
pub struct Matches<'a> {
    registry: &'a RuleRegistry,
    root: PlanRef,
    pending: Vec<(PlanRef, Vec<usize>)>,
    cursor: Option<Cursor>,
}

/// Node currently being tried against its candidate rules.
#[derive(Clone)]
struct Cursor {
    node: PlanRef,
    path: Vec<usize>,
    next_rule: usize,
}

/// Enumerate all matches of registered rules in `root`, outside-in.
pub fn find_matches<'a>(registry: &'a RuleRegistry, root: &PlanRef) -> Matches<'a> {
    Matches {
        registry,
        root: root.clone(),
        pending: vec![(root.clone(), Vec::new())],
        cursor: None,
    }
}

impl<'a> Matches<'a> {
    /// Rewind to the first match of the plan.
    pub fn restart(&mut self) {
        self.pending = vec![(self.root.clone(), Vec::new())];
        self.cursor = None;
    }

    pub fn root(&self) -> &PlanRef {
        &self.root
    }

    /// Try the remaining candidate rules of the cursor node.
    fn next_at(&self, cursor: &mut Cursor) -> Option<RuleCall<'a>> {
        let registry: &'a RuleRegistry = self.registry;
        let candidates = registry.handles_for(cursor.node.kind());
        while let Some(&handle) = candidates.get(cursor.next_rule) {
            cursor.next_rule += 1;
            let Some(rule) = registry.rule(handle) else {
                continue;
            };
            let mut nodes = Vec::with_capacity(rule.pattern().bound_count());
            if match_and_bind(&cursor.node, rule.pattern(), &mut nodes) {
                return Some(RuleCall::new(rule, handle, nodes, cursor.path.clone()));
            }
        }
        None
    }
}

impl<'a> Iterator for Matches<'a> {
    type Item = RuleCall<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(mut cursor) = self.cursor.take() {
                if let Some(call) = self.next_at(&mut cursor) {
                    self.cursor = Some(cursor);
                    return Some(call);
                }
                // Children are pushed in reverse so input 0 is visited first.
                for (idx, input) in cursor.node.inputs().into_iter().enumerate().rev() {
                    let mut path = cursor.path.clone();
                    path.push(idx);
                    self.pending.push((input.clone(), path));
                }
            }
            let (node, path) = self.pending.pop()?;
            self.cursor = Some(Cursor {
                node,
                path,
                next_rule: 0,
            });
        }
    }
}

/// Run the rule bound to `call` and return the replacement it proposed, if any.
pub fn fire(call: &mut RuleCall<'_>) -> Result<Option<PlanRef>> {
    let rule = call.rule();
    rule.invoke(call)?;
    match call.replacement() {
        Some(replacement) => {
            trace!(rule = rule.name(), path = ?call.path(), "rule proposed a replacement");
            Ok(Some(replacement.clone()))
        }
        None => {
            trace!(rule = rule.name(), path = ?call.path(), "rule declined");
            Ok(None)
        }
    }
}

/// Substitute the replacement proposed in `call` into `root`.
///
/// Returns `root` itself when the call holds no replacement. The node found at the
/// call's path must be the very node the rule matched; otherwise the call belongs to
/// a different plan and [`RuleError::StaleMatch`] is returned.
pub fn apply(root: &PlanRef, call: &RuleCall<'_>) -> Result<PlanRef> {
    let Some(replacement) = call.replacement() else {
        return Ok(root.clone());
    };
    let matched = call.nodes().first();
    replace_at(root, call.path(), call.path(), &|target: &PlanRef| {
        if matched.is_some_and(|m| Arc::ptr_eq(m, target)) {
            Ok(replacement.clone())
        } else {
            Err(RuleError::StaleMatch {
                rule: call.rule_name().to_string(),
                path: call.path().to_vec(),
            })
        }
    })
}

fn replace_at(
    node: &PlanRef,
    rest: &[usize],
    full_path: &[usize],
    substitute: &dyn Fn(&PlanRef) -> Result<PlanRef>,
) -> Result<PlanRef> {
    let Some((&idx, rest)) = rest.split_first() else {
        return substitute(node);
    };
    let invalid = || RuleError::InvalidPath {
        path: full_path.to_vec(),
    };
    let child = node.inputs().get(idx).copied().ok_or_else(invalid)?;
    let new_child = replace_at(child, rest, full_path, substitute)?;
    let new_node = node.with_input(idx, new_child).ok_or_else(invalid)?;
    Ok(Arc::new(new_node))
}
