//! # Plan Nodes
//!
//! Relational-algebra operator trees. A plan is a tree of [`PlanNode`]s linked by
//! [`PlanRef`] (`Arc<PlanNode>`) handles.
//!
//! ## Persistence
//!
//! Plans are persistent values: a node is never modified after it is built. A rewrite
//! builds new nodes along the path from the root to the changed position and reuses
//! every other sub-tree by reference. Holders of the pre-rewrite tree (an outer search,
//! another pending rule call) keep seeing exactly what they had, without any locking.
//! Whether a sub-tree was reused can be checked with `Arc::ptr_eq`.
//!
//! ## Operators
//!
//! Only the operators needed by the built-in rules are modelled explicitly:
//!
//! - `Scan`: leaf producing the given columns.
//! - `Filter`: discards input rows that do not satisfy `predicate`.
//! - `Join`: binary join with a [`JoinType`] and a condition over the concatenated
//!   left+right row.
//! - `Other`: any other operator, opaque to rules, with an explicit output width.

use crate::expr::{ColumnRef, Expr};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared handle to an immutable plan node.
pub type PlanRef = Arc<PlanNode>;

/// SQL join types supported by the rewrite rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    /// Inner join: only matching rows from both sides.
    Inner,
    /// Left outer join: all rows from left, matching from right (or NULLs).
    Left,
    /// Right outer join: all rows from right, matching from left (or NULLs).
    Right,
    /// Full outer join: all rows from both sides, NULLs where no match.
    Full,
}

impl JoinType {
    /// True when unmatched rows of the right input are preserved and the left-side
    /// columns are padded with NULLs.
    pub fn generates_nulls_on_left(self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }

    /// True when unmatched rows of the left input are preserved and the right-side
    /// columns are padded with NULLs.
    pub fn generates_nulls_on_right(self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    pub fn is_outer(self) -> bool {
        self != JoinType::Inner
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinType::Inner => "Inner",
            JoinType::Left => "LeftOuter",
            JoinType::Right => "RightOuter",
            JoinType::Full => "FullOuter",
        };
        f.write_str(s)
    }
}

/// Bookkeeping flags carried by a join through rewrites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinFlags {
    /// A semi-join has already been derived from this join.
    pub semi_join_done: bool,
    /// The join was produced by merging into a multi-way join and splitting it back
    /// out. Filters were already distributed when that happened.
    pub already_repartitioned: bool,
}

/// Data-free discriminant of [`PlanNode`], used by patterns and the rule registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlanKind {
    Scan,
    Filter,
    Join,
    Other,
}

impl PlanKind {
    /// Number of inputs a node of this kind has, or `None` when it varies.
    pub fn input_count(self) -> Option<usize> {
        match self {
            PlanKind::Scan => Some(0),
            PlanKind::Filter => Some(1),
            PlanKind::Join => Some(2),
            PlanKind::Other => None,
        }
    }
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Immutable relational operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanNode {
    Scan {
        table: String,
        columns: Vec<ColumnRef>,
    },
    Filter {
        input: PlanRef,
        predicate: Expr,
    },
    Join {
        left: PlanRef,
        right: PlanRef,
        join_type: JoinType,
        condition: Expr,
        flags: JoinFlags,
    },
    Other {
        name: String,
        inputs: Vec<PlanRef>,
        arity: usize,
    },
}

impl PlanNode {
    /// Scan of `table` producing one column per name, numbered from zero.
    pub fn scan(table: impl Into<String>, columns: &[&str]) -> PlanRef {
        let table = table.into();
        let columns = columns
            .iter()
            .enumerate()
            .map(|(i, c)| ColumnRef::new(i, format!("{table}.{c}")))
            .collect();
        Arc::new(PlanNode::Scan { table, columns })
    }

    pub fn filter(input: PlanRef, predicate: Expr) -> PlanRef {
        Arc::new(PlanNode::Filter { input, predicate })
    }

    pub fn join(left: PlanRef, right: PlanRef, join_type: JoinType, condition: Expr) -> PlanRef {
        Self::join_with_flags(left, right, join_type, condition, JoinFlags::default())
    }

    pub fn join_with_flags(
        left: PlanRef,
        right: PlanRef,
        join_type: JoinType,
        condition: Expr,
        flags: JoinFlags,
    ) -> PlanRef {
        Arc::new(PlanNode::Join {
            left,
            right,
            join_type,
            condition,
            flags,
        })
    }

    pub fn other(name: impl Into<String>, inputs: Vec<PlanRef>, arity: usize) -> PlanRef {
        Arc::new(PlanNode::Other {
            name: name.into(),
            inputs,
            arity,
        })
    }

    pub fn kind(&self) -> PlanKind {
        match self {
            PlanNode::Scan { .. } => PlanKind::Scan,
            PlanNode::Filter { .. } => PlanKind::Filter,
            PlanNode::Join { .. } => PlanKind::Join,
            PlanNode::Other { .. } => PlanKind::Other,
        }
    }

    /// Input nodes in positional order.
    pub fn inputs(&self) -> Vec<&PlanRef> {
        match self {
            PlanNode::Scan { .. } => vec![],
            PlanNode::Filter { input, .. } => vec![input],
            PlanNode::Join { left, right, .. } => vec![left, right],
            PlanNode::Other { inputs, .. } => inputs.iter().collect(),
        }
    }

    /// Number of columns in this node's output row.
    pub fn arity(&self) -> usize {
        match self {
            PlanNode::Scan { columns, .. } => columns.len(),
            PlanNode::Filter { input, .. } => input.arity(),
            PlanNode::Join { left, right, .. } => left.arity() + right.arity(),
            PlanNode::Other { arity, .. } => *arity,
        }
    }

    /// Copy of this node with input `idx` replaced by `child`. Every other field and
    /// input is shared with `self`. Returns `None` if `idx` is not an input position.
    pub fn with_input(&self, idx: usize, child: PlanRef) -> Option<PlanNode> {
        let node = match (self, idx) {
            (PlanNode::Filter { predicate, .. }, 0) => PlanNode::Filter {
                input: child,
                predicate: predicate.clone(),
            },
            (
                PlanNode::Join {
                    left,
                    right,
                    join_type,
                    condition,
                    flags,
                },
                0 | 1,
            ) => {
                let (left, right) = if idx == 0 {
                    (child, right.clone())
                } else {
                    (left.clone(), child)
                };
                PlanNode::Join {
                    left,
                    right,
                    join_type: *join_type,
                    condition: condition.clone(),
                    flags: *flags,
                }
            }
            (PlanNode::Other { name, inputs, arity }, i) if i < inputs.len() => {
                let mut inputs = inputs.clone();
                inputs[i] = child;
                PlanNode::Other {
                    name: name.clone(),
                    inputs,
                    arity: *arity,
                }
            }
            _ => return None,
        };
        Some(node)
    }

    /// Indented, one-operator-per-line rendering of the tree.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(0, &mut out);
        out
    }

    fn explain_into(&self, indent: usize, out: &mut String) {
        out.push_str(&"  ".repeat(indent));
        match self {
            PlanNode::Scan { table, .. } => out.push_str(&format!("Scan {table}")),
            PlanNode::Filter { predicate, .. } => out.push_str(&format!("Filter {predicate}")),
            PlanNode::Join {
                join_type,
                condition,
                ..
            } => out.push_str(&format!("Join[{join_type}] {condition}")),
            PlanNode::Other { name, .. } => out.push_str(name),
        }
        out.push('\n');
        for input in self.inputs() {
            input.explain_into(indent + 1, out);
        }
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explain())
    }
}
