//! # Scalar Predicate Expressions
//!
//! This module defines the scalar expression trees that appear inside plan nodes:
//! filter predicates and join conditions. Rules read them to decide where a predicate
//! may be evaluated and build new ones when they move predicates around.
//!
//! ## Shape
//!
//! An `Expr` is one of:
//!
//! - `Column`: a reference to a column of the row the expression is evaluated against.
//! - `Literal`: a constant value. `Literal(Bool(true))` is the distinguished
//!   always-true predicate (an empty join condition, for instance).
//! - `Compare`: a binary comparison between two sub-expressions.
//! - `And` / `Or`: n-ary conjunction and disjunction, stored as flat lists.
//!
//! ## Column Positions
//!
//! A `ColumnRef` is positional: `index` is the ordinal of the column in the input row of
//! the operator evaluating the expression. For a join, the input row is the
//! concatenation of the left row and the right row, so left columns occupy
//! `0..left_width` and right columns `left_width..left_width + right_width`. The `name`
//! is a display label only.
//!
//! ## Immutability
//!
//! Expressions are plain values. Equality and hashing are structural, so two separately
//! built `t1.x = 1` predicates compare equal. Nothing in the engine mutates an
//! expression after construction; rewrites build new ones.

use fixedbitset::FixedBitSet;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Positional reference to a column of the operator's input row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Ordinal of the column in the input row.
    pub index: usize,
    /// Display label (e.g. `t1.a`). Never consulted by rules.
    pub name: String,
}

impl ColumnRef {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "${}", self.index)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Scalar value for literals.
///
/// Uses `OrderedFloat` for `f64` so that floating-point literals keep `Eq`/`Hash`
/// and expressions can be compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    /// SQL NULL value.
    Null,
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
    /// Date as days since Unix epoch (1970-01-01).
    Date(i32),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{}", v.0),
            ScalarValue::Utf8(s) => write!(f, "'{s}'"),
            ScalarValue::Date(d) => write!(f, "DATE({d})"),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// Null-safe inequality (`IS DISTINCT FROM`): never evaluates to unknown.
    IsDistinctFrom,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::IsDistinctFrom => "IS DISTINCT FROM",
        };
        f.write_str(s)
    }
}

/// Scalar predicate tree used for filter predicates and join conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a column of the input row by ordinal.
    Column(ColumnRef),
    /// Constant literal value.
    Literal(ScalarValue),
    /// Binary comparison (e.g. `t1.x = 1`, `t1.a = t2.a`).
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Conjunction (AND), stored as a flat list.
    And(Vec<Expr>),
    /// Disjunction (OR), stored as a flat list.
    Or(Vec<Expr>),
}

impl Expr {
    pub fn column(index: usize, name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(index, name))
    }

    pub fn literal(value: ScalarValue) -> Self {
        Expr::Literal(value)
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(ScalarValue::Int64(value))
    }

    /// The always-true predicate.
    pub fn true_literal() -> Self {
        Expr::Literal(ScalarValue::Bool(true))
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Eq, left, right)
    }

    /// Build a conjunction from a list of conjuncts.
    ///
    /// An empty list yields the true literal and a single conjunct is returned as is,
    /// so rebuilding a condition never produces a degenerate `And`.
    pub fn and_all(mut exprs: Vec<Expr>) -> Self {
        match exprs.len() {
            0 => Self::true_literal(),
            1 => exprs.remove(0),
            _ => Expr::And(exprs),
        }
    }

    pub fn or_all(mut exprs: Vec<Expr>) -> Self {
        match exprs.len() {
            0 => Expr::Literal(ScalarValue::Bool(false)),
            1 => exprs.remove(0),
            _ => Expr::Or(exprs),
        }
    }

    /// True if this expression always evaluates to true.
    pub fn is_always_true(&self) -> bool {
        match self {
            Expr::Literal(ScalarValue::Bool(true)) => true,
            Expr::And(exprs) => exprs.iter().all(Expr::is_always_true),
            _ => false,
        }
    }

    /// Flatten AND-chains into their top-level conjuncts.
    ///
    /// `(A AND (B AND C))` yields `[A, B, C]`. Disjunctions and every other node are
    /// opaque conjuncts. Always-true conjuncts are dropped, so a `true` join condition
    /// has no conjuncts at all.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        match self {
            Expr::And(exprs) => {
                for e in exprs {
                    e.collect_conjuncts(out);
                }
            }
            e if e.is_always_true() => {}
            e => out.push(e),
        }
    }

    /// Owned variant of [`Expr::conjuncts`].
    pub fn to_conjuncts(&self) -> Vec<Expr> {
        self.conjuncts().into_iter().cloned().collect()
    }

    /// Return all column references in this expression, in tree order.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut cols = Vec::new();
        self.collect_columns(&mut cols);
        cols
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(c) => out.push(c),
            Expr::Literal(_) => {}
            Expr::Compare { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.collect_columns(out);
                }
            }
        }
    }

    /// Bitmap of the input column ordinals this expression reads.
    pub fn input_refs(&self) -> FixedBitSet {
        let mut bits = FixedBitSet::new();
        for col in self.columns() {
            bits.grow(col.index + 1);
            bits.insert(col.index);
        }
        bits
    }

    /// Rebase every column reference by subtracting `offset`.
    ///
    /// Used when a predicate over a join row moves onto the right input, whose columns
    /// start at zero. Callers must only rebase expressions whose columns are all
    /// `>= offset`.
    pub fn rebase_columns(&self, offset: usize) -> Expr {
        match self {
            Expr::Column(c) => {
                debug_assert!(c.index >= offset, "column {c} below rebase offset {offset}");
                Expr::Column(ColumnRef {
                    index: c.index.saturating_sub(offset),
                    name: c.name.clone(),
                })
            }
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::Compare { op, left, right } => Expr::Compare {
                op: *op,
                left: Box::new(left.rebase_columns(offset)),
                right: Box::new(right.rebase_columns(offset)),
            },
            Expr::And(exprs) => Expr::And(exprs.iter().map(|e| e.rebase_columns(offset)).collect()),
            Expr::Or(exprs) => Expr::Or(exprs.iter().map(|e| e.rebase_columns(offset)).collect()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{c}"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Compare { op, left, right } => write!(f, "{left} {op} {right}"),
            Expr::And(exprs) => write_list(f, exprs, " AND "),
            Expr::Or(exprs) => write_list(f, exprs, " OR "),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, exprs: &[Expr], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, e) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{e}")?;
    }
    write!(f, ")")
}
