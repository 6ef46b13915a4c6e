//! The verdict rule table.
//!
//! Rules are evaluated over a [`Tally`], a commutative summary of the result
//! set, so completion order can never influence the verdict. The first rule
//! that applies decides the status; `FAIL` rules precede `PARTIAL` rules.

use std::collections::BTreeSet;

use crate::constants::{FailureCategory, Layer, Outcome, RunStatus};
use crate::results::ExecutionResult;
use crate::snapshot::MismatchSeverity;

/// Configurable inputs to the rules
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    pub l1_pass_threshold: f64,
    pub mismatch_severity: MismatchSeverity,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            l1_pass_threshold: 0.9,
            mismatch_severity: MismatchSeverity::Warn,
        }
    }
}

/// Order-independent counts over a result set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub dependency_graph_passed: bool,
    pub l0_total: usize,
    pub l0_failed: usize,
    pub l1_total: usize,
    pub l1_passed: usize,
    pub l2_total: usize,
    pub l2_passed: usize,
    pub critical_total: usize,
    pub critical_passed: usize,
    pub timed_out: usize,
    pub server_errors: usize,
    pub snapshot_mismatches: usize,
    pub categories: BTreeSet<FailureCategory>,
}

impl Tally {
    pub fn new(dependency_graph_passed: bool) -> Self {
        Self {
            dependency_graph_passed,
            ..Self::default()
        }
    }

    pub fn from_results<'a>(
        results: impl IntoIterator<Item = &'a ExecutionResult>,
        dependency_graph_passed: bool,
    ) -> Self {
        results
            .into_iter()
            .fold(Self::new(dependency_graph_passed), Tally::add)
    }

    /// Fold one result in. Addition is commutative.
    pub fn add(mut self, result: &ExecutionResult) -> Self {
        let passed = result.is_pass();
        match result.layer {
            Layer::L0 => {
                self.l0_total += 1;
                self.l0_failed += usize::from(!passed);
            }
            Layer::L1 => {
                self.l1_total += 1;
                self.l1_passed += usize::from(passed);
            }
            Layer::L2 => {
                self.l2_total += 1;
                self.l2_passed += usize::from(passed);
                if result.critical {
                    self.critical_total += 1;
                    self.critical_passed += usize::from(passed);
                }
            }
        }
        self.timed_out += usize::from(result.outcome == Outcome::Timeout);
        self.server_errors += usize::from(result.is_server_error());
        self.snapshot_mismatches += usize::from(!result.contract_mismatches.is_empty());
        self.categories.extend(result.categories());
        self
    }

    pub fn l2_failed(&self) -> usize {
        self.l2_total - self.l2_passed
    }

    /// With no L1 results there is nothing to fall short of
    pub fn l1_pass_rate(&self) -> f64 {
        if self.l1_total == 0 {
            1.0
        } else {
            self.l1_passed as f64 / self.l1_total as f64
        }
    }

    pub fn overall_coverage(&self) -> f64 {
        let total = self.l1_total + self.l2_total;
        if total == 0 {
            0.0
        } else {
            (self.l1_passed + self.l2_passed) as f64 / total as f64
        }
    }
}

pub struct Rule {
    pub name: &'static str,
    pub status: RunStatus,
    pub applies: fn(&Tally, &ScoringPolicy) -> bool,
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "dependency_graph_invalid",
        status: RunStatus::Fail,
        applies: |tally, _| !tally.dependency_graph_passed,
    },
    Rule {
        name: "l0_check_failed",
        status: RunStatus::Fail,
        applies: |tally, _| tally.l0_failed > 0,
    },
    Rule {
        name: "l2_workflow_failed",
        status: RunStatus::Fail,
        applies: |tally, _| tally.l2_failed() > 0,
    },
    Rule {
        name: "snapshot_mismatch_fatal",
        status: RunStatus::Fail,
        applies: |tally, policy| {
            policy.mismatch_severity == MismatchSeverity::Fail && tally.snapshot_mismatches > 0
        },
    },
    Rule {
        name: "l1_pass_rate_below_threshold",
        status: RunStatus::Partial,
        applies: |tally, policy| tally.l1_pass_rate() < policy.l1_pass_threshold,
    },
    Rule {
        name: "server_error_observed",
        status: RunStatus::Partial,
        applies: |tally, _| tally.server_errors > 0,
    },
];
