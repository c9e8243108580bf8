//! # Rule System
//!
//! This module defines rules, the registry that holds them, and the rule call a rule
//! receives when its pattern matches.
//!
//! ## Rules as Values
//!
//! A [`Rule`] is data: a name, an operand [`Pattern`] and a transform function. There
//! is no rule trait to implement; adding a rule means registering one more value. The
//! transform is a pure function of the matched nodes. It must not keep any state
//! between invocations and it never mutates a plan node. Its only output is the
//! replacement it writes into the [`RuleCall`].
//!
//! ## Rule Calls
//!
//! For each match, the engine builds a fresh `RuleCall` holding the nodes bound by the
//! pattern (pre-order, root first), the position of the match in the plan and an empty
//! replacement slot. The transform may fill the slot once with an equivalent sub-tree,
//! or leave it empty to decline. Writing is a proposal: the driver decides whether the
//! replacement is substituted into the plan.
//!
//! ## Rule Registry
//!
//! The `RuleRegistry` validates patterns at registration and indexes rules by the kind
//! of their pattern root, so the engine only tries rules that can match a given node.
//! Registration order is preserved and is the order rules are tried at a node.

use crate::error::{PatternError, Result, RuleError};
use crate::pattern::Pattern;
use crate::plan::{PlanKind, PlanRef};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Transform function of a rule.
pub type TransformFn = Arc<dyn Fn(&mut RuleCall<'_>) -> Result<()> + Send + Sync>;

/// Stable identifier of a registered rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleHandle(usize);

impl RuleHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named (pattern, transform) pair.
#[derive(Clone)]
pub struct Rule {
    name: String,
    pattern: Pattern,
    transform: TransformFn,
}

impl Rule {
    pub fn new<F>(name: impl Into<String>, pattern: Pattern, transform: F) -> Self
    where
        F: Fn(&mut RuleCall<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            pattern,
            transform: Arc::new(transform),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub(crate) fn invoke(&self, call: &mut RuleCall<'_>) -> Result<()> {
        (self.transform)(call)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Matched context for one firing of a rule.
pub struct RuleCall<'a> {
    rule: &'a Rule,
    handle: RuleHandle,
    nodes: Vec<PlanRef>,
    path: Vec<usize>,
    replacement: Option<PlanRef>,
}

impl<'a> RuleCall<'a> {
    pub(crate) fn new(rule: &'a Rule, handle: RuleHandle, nodes: Vec<PlanRef>, path: Vec<usize>) -> Self {
        Self {
            rule,
            handle,
            nodes,
            path,
            replacement: None,
        }
    }

    pub fn rule(&self) -> &'a Rule {
        self.rule
    }

    pub fn rule_name(&self) -> &'a str {
        self.rule.name()
    }

    pub fn handle(&self) -> RuleHandle {
        self.handle
    }

    /// Nodes bound by the pattern, root first.
    pub fn nodes(&self) -> &[PlanRef] {
        &self.nodes
    }

    /// The `idx`-th bound node in pattern pre-order.
    ///
    /// # Panics
    ///
    /// If `idx` is not below the pattern's bound node count. A rule only asks for
    /// positions its own pattern binds.
    pub fn node(&self, idx: usize) -> &PlanRef {
        &self.nodes[idx]
    }

    /// Input positions leading from the plan root to the matched node.
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// Propose `replacement` as an equivalent of the matched sub-tree.
    ///
    /// The slot is write-once; a second write is rejected.
    pub fn transform_to(&mut self, replacement: PlanRef) -> Result<()> {
        if self.replacement.is_some() {
            return Err(RuleError::ReplacementAlreadySet(self.rule.name().to_string()));
        }
        self.replacement = Some(replacement);
        Ok(())
    }

    pub fn replacement(&self) -> Option<&PlanRef> {
        self.replacement.as_ref()
    }

    pub fn take_replacement(&mut self) -> Option<PlanRef> {
        self.replacement.take()
    }
}

impl fmt::Debug for RuleCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleCall")
            .field("rule", &self.rule.name())
            .field("handle", &self.handle)
            .field("path", &self.path)
            .field("bound", &self.nodes.len())
            .field("has_replacement", &self.replacement.is_some())
            .finish()
    }
}

/// Registry of rewrite rules, indexed by the kind of their pattern root.
#[derive(Debug, Default, Clone)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
    by_kind: HashMap<PlanKind, Vec<RuleHandle>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule built from its parts.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        pattern: Pattern,
        transform: F,
    ) -> Result<RuleHandle>
    where
        F: Fn(&mut RuleCall<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.add_rule(Rule::new(name, pattern, transform))
    }

    /// Register an already built rule.
    ///
    /// Fails if the pattern is malformed or a rule with the same name exists.
    pub fn add_rule(&mut self, rule: Rule) -> Result<RuleHandle> {
        let invalid = |source| RuleError::InvalidPattern {
            rule: rule.name.clone(),
            source,
        };
        rule.pattern.validate().map_err(invalid)?;
        let kind = rule
            .pattern
            .root_kind()
            .ok_or_else(|| invalid(PatternError::NonOperatorRoot))?;
        if self.rules.iter().any(|r| r.name == rule.name) {
            return Err(RuleError::DuplicateRule(rule.name));
        }

        let handle = RuleHandle(self.rules.len());
        self.rules.push(rule);
        self.by_kind.entry(kind).or_default().push(handle);
        Ok(handle)
    }

    pub fn rule(&self, handle: RuleHandle) -> Option<&Rule> {
        self.rules.get(handle.0)
    }

    pub fn find(&self, name: &str) -> Option<RuleHandle> {
        self.rules.iter().position(|r| r.name == name).map(RuleHandle)
    }

    /// Handles of the rules whose pattern root is `kind`, in registration order.
    pub fn handles_for(&self, kind: PlanKind) -> &[RuleHandle] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rules_for(&self, kind: PlanKind) -> impl Iterator<Item = (RuleHandle, &Rule)> + '_ {
        self.handles_for(kind)
            .iter()
            .map(move |&h| (h, &self.rules[h.0]))
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(Rule::name).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
