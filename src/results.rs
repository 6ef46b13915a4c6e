//! # Execution Results
//!
//! What a unit hands back ([`UnitOutcome`]) and what the scheduler records for
//! it ([`ExecutionResult`]). The scheduler is the only producer of
//! `ExecutionResult`s, which is how "exactly one result per executed unit" is
//! kept.

use serde::{Deserialize, Serialize};

use crate::constants::{FailureCategory, Layer, Outcome};
use crate::error::sanitize_message;
use crate::snapshot::Mismatch;

/// Outcome of a single L2 workflow step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub name: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub message: String,
}

/// Result reported by a unit's own execution, before the scheduler stamps
/// identity and latency onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOutcome {
    pub outcome: Outcome,
    pub category: Option<FailureCategory>,
    pub message: String,
    pub http_status: Option<u16>,
    pub steps: Vec<StepRecord>,
    pub workflow_duration_ms: Option<u64>,
    pub contract_mismatches: Vec<Mismatch>,
}

impl UnitOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Pass,
            category: None,
            message: message.into(),
            http_status: None,
            steps: Vec::new(),
            workflow_duration_ms: None,
            contract_mismatches: Vec::new(),
        }
    }

    pub fn fail(category: FailureCategory, message: impl AsRef<str>) -> Self {
        Self {
            outcome: Outcome::Fail,
            category: Some(category),
            message: sanitize_message(message.as_ref()),
            http_status: None,
            steps: Vec::new(),
            workflow_duration_ms: None,
            contract_mismatches: Vec::new(),
        }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_steps(mut self, steps: Vec<StepRecord>, duration_ms: u64) -> Self {
        self.steps = steps;
        self.workflow_duration_ms = Some(duration_ms);
        self
    }

    pub fn with_mismatches(mut self, mismatches: Vec<Mismatch>) -> Self {
        self.contract_mismatches = mismatches;
        self
    }
}

/// The recorded result of one executed unit in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub id: String,
    pub layer: Layer,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
    pub latency_ms: u64,
    pub message: String,
    /// Last captured intermediate state; only set on timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contract_mismatches: Vec<Mismatch>,
    #[serde(default)]
    pub critical: bool,
}

impl ExecutionResult {
    /// Build a result from a completed unit outcome
    pub fn from_outcome(
        id: impl Into<String>,
        layer: Layer,
        outcome: UnitOutcome,
        latency_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            layer,
            outcome: outcome.outcome,
            category: outcome.category,
            latency_ms,
            message: outcome.message,
            last_trace: None,
            http_status: outcome.http_status,
            dependency_type: None,
            workflow_duration_ms: outcome.workflow_duration_ms,
            steps: outcome.steps,
            contract_mismatches: outcome.contract_mismatches,
            critical: false,
        }
    }

    /// Build a timeout result carrying the last observed intermediate state
    pub fn timeout(
        id: impl Into<String>,
        layer: Layer,
        category: FailureCategory,
        message: impl AsRef<str>,
        last_trace: Option<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            layer,
            outcome: Outcome::Timeout,
            category: Some(category),
            latency_ms,
            message: sanitize_message(message.as_ref()),
            last_trace: last_trace.map(|trace| sanitize_message(&trace)),
            http_status: None,
            dependency_type: None,
            workflow_duration_ms: None,
            steps: Vec::new(),
            contract_mismatches: Vec::new(),
            critical: false,
        }
    }

    pub fn with_dependency_type(mut self, dependency_type: Option<String>) -> Self {
        self.dependency_type = dependency_type;
        self
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn is_pass(&self) -> bool {
        self.outcome.is_pass()
    }

    pub fn is_server_error(&self) -> bool {
        self.http_status.is_some_and(|status| status >= 500)
            || self.steps.iter().any(|step| step.http_status.is_some_and(|s| s >= 500))
    }

    /// Categories this result contributes to the report
    pub fn categories(&self) -> impl Iterator<Item = FailureCategory> + '_ {
        let timeout = (self.outcome == Outcome::Timeout).then_some(FailureCategory::Timeout);
        let mismatch =
            (!self.contract_mismatches.is_empty()).then_some(FailureCategory::ContractMismatch);
        self.category.into_iter().chain(timeout).chain(mismatch)
    }
}
