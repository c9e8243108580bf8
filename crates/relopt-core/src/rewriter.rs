//! # Heuristic Rewrite Driver
//!
//! The rewriter applies registered rules to a plan until no rule proposes anything
//! more. It is the simplest driver built on top of the engine's match/fire/apply
//! primitives: every proposal is accepted as soon as it is made.
//!
//! ## Passes
//!
//! A pass walks the match sequence of the current plan (outside-in) and fires rules
//! until one proposes a replacement. That replacement is applied, producing a new
//! plan, and the next pass starts from the new root. The rewrite stops when a whole
//! pass yields no proposal (a fixpoint) or when the pass budget runs out.
//!
//! Because plans are persistent, the input plan is never modified: the caller keeps the
//! original tree and receives the rewritten one in [`RewriteOutcome::plan`].

use crate::engine::{apply, find_matches, fire};
use crate::error::Result;
use crate::plan::PlanRef;
use crate::rule::RuleRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Configuration knobs for the heuristic rewriter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Upper bound on the number of passes (each pass applies at most one rewrite).
    pub max_passes: usize,
    /// Names of registered rules that must not fire.
    pub disabled_rules: Vec<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_passes: 10_000,
            disabled_rules: Vec::new(),
        }
    }
}

/// Result of a rewrite.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    /// The rewritten plan (the input root itself if nothing fired).
    pub plan: PlanRef,
    /// Names of the rules whose proposals were applied, in order.
    pub fired: Vec<String>,
    /// True if the pass budget ran out before a fixpoint was reached.
    pub budget_exhausted: bool,
}

impl RewriteOutcome {
    pub fn applied(&self) -> usize {
        self.fired.len()
    }
}

/// Applies rules from a registry until fixpoint.
pub struct HeuristicRewriter {
    registry: Arc<RuleRegistry>,
    config: RewriteConfig,
}

impl HeuristicRewriter {
    pub fn new(registry: Arc<RuleRegistry>, config: RewriteConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    pub fn rewrite(&self, root: &PlanRef) -> Result<RewriteOutcome> {
        let mut plan = root.clone();
        let mut fired = Vec::new();

        for pass in 0..self.config.max_passes {
            match self.rewrite_once(&plan)? {
                Some((new_plan, rule)) => {
                    debug!(pass, rule = %rule, "applied rewrite");
                    fired.push(rule);
                    plan = new_plan;
                }
                None => {
                    debug!(passes = pass, applied = fired.len(), "rewrite reached fixpoint");
                    return Ok(RewriteOutcome {
                        plan,
                        fired,
                        budget_exhausted: false,
                    });
                }
            }
        }

        warn!(
            max_passes = self.config.max_passes,
            "rewrite stopped before reaching a fixpoint"
        );
        Ok(RewriteOutcome {
            plan,
            fired,
            budget_exhausted: true,
        })
    }

    /// Apply the first proposal found in `plan`, if any.
    fn rewrite_once(&self, plan: &PlanRef) -> Result<Option<(PlanRef, String)>> {
        for mut call in find_matches(&self.registry, plan) {
            if self.is_disabled(call.rule_name()) {
                trace!(rule = call.rule_name(), "skipping disabled rule");
                continue;
            }
            if fire(&mut call)?.is_some() {
                let new_plan = apply(plan, &call)?;
                return Ok(Some((new_plan, call.rule_name().to_string())));
            }
        }
        Ok(None)
    }

    fn is_disabled(&self, rule: &str) -> bool {
        self.config.disabled_rules.iter().any(|r| r == rule)
    }
}
