//! Assembles a [`Report`] from the run context, the dependency-graph
//! verdict, the collected results and the scoring verdict.

use chrono::Utc;

use super::{
    DependencyReport, Diagnostics, EndpointSummary, ExecutiveSummary, Report, WorkflowReport,
};
use crate::constants::{Layer, Outcome};
use crate::context::RunContext;
use crate::results::ExecutionResult;
use crate::scoring::Verdict;
use crate::validation::DiContainerReport;

pub struct ReportBuilder<'a> {
    ctx: &'a RunContext,
    di_container: DiContainerReport,
    results: Vec<ExecutionResult>,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self {
            ctx,
            di_container: DiContainerReport::not_configured(),
            results: Vec::new(),
        }
    }

    pub fn di_container(mut self, report: DiContainerReport) -> Self {
        self.di_container = report;
        self
    }

    pub fn results(mut self, results: Vec<ExecutionResult>) -> Self {
        self.results = results;
        self
    }

    pub fn build(self, verdict: &Verdict) -> Report {
        let mut dependencies = Vec::new();
        let mut endpoint_details = Vec::new();
        let mut workflows = Vec::new();

        for result in self.results {
            let failure = (!result.is_pass()).then(|| (result.category, result.message.clone()));
            match result.layer {
                Layer::L0 => dependencies.push(DependencyReport {
                    name: result.id,
                    dependency_type: result.dependency_type.unwrap_or_default(),
                    status: result.outcome,
                    latency_ms: result.latency_ms,
                    category: failure.as_ref().and_then(|(category, _)| *category),
                    message: failure.map(|(_, message)| message),
                }),
                Layer::L1 => endpoint_details.push(result),
                Layer::L2 => workflows.push(WorkflowReport {
                    duration_ms: result.workflow_duration_ms.unwrap_or(result.latency_ms),
                    name: result.id,
                    status: result.outcome,
                    category: failure.as_ref().and_then(|(category, _)| *category),
                    message: failure.map(|(_, message)| message),
                    steps: if result.outcome.is_pass() {
                        Vec::new()
                    } else {
                        result.steps
                    },
                }),
            }
        }

        let count = |outcome: Outcome| {
            endpoint_details
                .iter()
                .filter(|result| result.outcome == outcome)
                .count()
        };
        let (passed, timed_out, failed) = (
            count(Outcome::Pass),
            count(Outcome::Timeout),
            count(Outcome::Fail),
        );
        let endpoints = EndpointSummary {
            total: endpoint_details.len(),
            passed,
            timed_out,
            failed,
            details: endpoint_details,
        };

        Report {
            run_id: self.ctx.run_id(),
            mode: self.ctx.mode(),
            environment: self.ctx.environment().to_string(),
            application_id: self.ctx.application_id().to_string(),
            status: verdict.status,
            failure_categories: verdict.failure_categories.clone(),
            executive_summary: ExecutiveSummary {
                migration_ready: verdict.migration_ready,
                overall_coverage: verdict.overall_coverage,
                critical_workflows_pass: verdict.critical_workflows_pass,
            },
            diagnostics: Diagnostics {
                di_container: self.di_container,
                dependencies,
                endpoints,
            },
            workflows,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FailureCategory, RunMode};
    use crate::results::UnitOutcome;
    use crate::scoring::ScoringEngine;
    use std::time::Duration;

    #[test]
    fn test_report_serializes_with_schema_field_names() {
        let ctx = RunContext::new(RunMode::SafeWrite, "t", "staging", "orders-api", Duration::from_secs(1));
        let results = vec![
            ExecutionResult::from_outcome(
                "orders-db.connectivity",
                Layer::L0,
                UnitOutcome::fail(FailureCategory::Dependency, "refused"),
                4,
            )
            .with_dependency_type(Some("postgres".to_string())),
            ExecutionResult::from_outcome("orders.list", Layer::L1, UnitOutcome::pass("ok"), 2),
            ExecutionResult::from_outcome(
                "checkout",
                Layer::L2,
                UnitOutcome::pass("ok").with_steps(Vec::new(), 17),
                18,
            ),
        ];
        let verdict = ScoringEngine::default().score(&results, true);
        let report = ReportBuilder::new(&ctx).results(results).build(&verdict);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["status"], "FAIL");
        assert_eq!(json["applicationId"], "orders-api");
        assert_eq!(json["executiveSummary"]["migrationReady"], false);
        assert_eq!(json["executiveSummary"]["overallCoverage"], 1.0);
        assert_eq!(json["diagnostics"]["diContainer"]["status"], "PASS");
        assert_eq!(json["diagnostics"]["dependencies"][0]["type"], "postgres");
        assert_eq!(json["diagnostics"]["dependencies"][0]["latencyMs"], 4);
        assert_eq!(json["diagnostics"]["dependencies"][0]["category"], "Dependency");
        assert_eq!(json["diagnostics"]["endpoints"]["total"], 1);
        assert_eq!(json["diagnostics"]["endpoints"]["timedOut"], 0);
        assert_eq!(json["workflows"][0]["durationMs"], 17);
        assert!(json["workflows"][0].get("message").is_none());
        assert_eq!(json["failureCategories"], serde_json::json!(["Dependency"]));
        assert!(json["timestamp"].as_str().is_some());
    }
}
