//! # Scoring Engine
//!
//! A total, deterministic function from the result multiset (plus the
//! dependency-graph verdict) to a [`Verdict`].

pub mod rules;

pub use rules::{Rule, ScoringPolicy, Tally, RULES};

use crate::config::DiagnosticsConfig;
use crate::constants::{FailureCategory, RunStatus};
use crate::results::ExecutionResult;

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: RunStatus,
    pub migration_ready: bool,
    pub overall_coverage: f64,
    pub critical_workflows_pass: bool,
    /// Sorted, de-duplicated
    pub failure_categories: Vec<FailureCategory>,
    /// Names of every rule that applied, in table order
    pub triggered_rules: Vec<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    policy: ScoringPolicy,
}

impl ScoringEngine {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &DiagnosticsConfig) -> Self {
        Self::new(ScoringPolicy {
            l1_pass_threshold: config.scoring.l1_pass_threshold,
            mismatch_severity: config.snapshot.severity,
        })
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn score(&self, results: &[ExecutionResult], dependency_graph_passed: bool) -> Verdict {
        self.score_tally(&Tally::from_results(results, dependency_graph_passed))
    }

    pub fn score_tally(&self, tally: &Tally) -> Verdict {
        let triggered: Vec<&Rule> = RULES
            .iter()
            .filter(|rule| (rule.applies)(tally, &self.policy))
            .collect();
        let status = triggered
            .first()
            .map(|rule| rule.status)
            .unwrap_or(RunStatus::Pass);

        Verdict {
            status,
            migration_ready: status.is_pass()
                && !tally.categories.contains(&FailureCategory::ContractMismatch),
            overall_coverage: tally.overall_coverage(),
            critical_workflows_pass: tally.critical_passed == tally.critical_total,
            failure_categories: tally.categories.iter().copied().collect(),
            triggered_rules: triggered.iter().map(|rule| rule.name).collect(),
        }
    }
}
