//! # Readiness Report
//!
//! The sole output artifact of a run. Field names follow the published JSON
//! schema exactly (camelCase). Entries for failing dependencies and workflows
//! additionally carry their category and message.

pub mod builder;

pub use builder::ReportBuilder;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{FailureCategory, Outcome, RunMode, RunStatus};
use crate::results::{ExecutionResult, StepRecord};
use crate::validation::DiContainerReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub environment: String,
    pub application_id: String,
    pub status: RunStatus,
    pub failure_categories: Vec<FailureCategory>,
    pub executive_summary: ExecutiveSummary,
    pub diagnostics: Diagnostics,
    pub workflows: Vec<WorkflowReport>,
    pub timestamp: DateTime<Utc>,
}

impl Report {
    pub fn is_pass(&self) -> bool {
        self.status.is_pass()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutiveSummary {
    pub migration_ready: bool,
    pub overall_coverage: f64,
    pub critical_workflows_pass: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub di_container: DiContainerReport,
    pub dependencies: Vec<DependencyReport>,
    pub endpoints: EndpointSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyReport {
    pub name: String,
    #[serde(rename = "type")]
    pub dependency_type: String,
    pub status: Outcome,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSummary {
    pub total: usize,
    pub passed: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub details: Vec<ExecutionResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    pub name: String,
    pub status: Outcome,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepRecord>,
}
