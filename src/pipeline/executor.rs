//! Scenario execution through the request pipeline.
//!
//! A [`ScenarioUnit`] replays an L1 request or an L2 workflow. Workflow steps
//! run strictly in order; values captured from one step's response are
//! substituted into the next step's request. The first failing step ends the
//! workflow. The declared cleanup step is left to the scheduler, which calls
//! [`DiagnosticUnit::cleanup`] exactly once however execution ended.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::harness::{PipelineError, RequestPipeline};
use super::request::{PipelineRequest, ScenarioStep};
use crate::constants::{headers, FailureCategory, Layer, Outcome};
use crate::context::RunContext;
use crate::error::sanitize_message;
use crate::registry::ScenarioDefinition;
use crate::results::{StepRecord, UnitOutcome};
use crate::scheduler::{DiagnosticUnit, UnitDescriptor, UnitScope};
use crate::snapshot::SnapshotComparator;

/// Map a response status to the failure taxonomy. `None` for statuses with
/// no specific meaning (an unexpected 2xx/3xx is a contract problem).
pub fn category_for_status(status: u16) -> Option<FailureCategory> {
    match status {
        401 | 403 => Some(FailureCategory::Auth),
        404 | 405 => Some(FailureCategory::Routing),
        400 | 415 => Some(FailureCategory::ModelBinding),
        422 => Some(FailureCategory::Validation),
        502..=504 => Some(FailureCategory::Dependency),
        500..=599 => Some(FailureCategory::UnhandledException),
        _ => None,
    }
}

fn category_for_pipeline_error(error: &PipelineError) -> FailureCategory {
    match error {
        PipelineError::InvalidRequest(_) => FailureCategory::ModelBinding,
        PipelineError::Transport(_) => FailureCategory::UnhandledException,
        PipelineError::Body(_) => FailureCategory::Serialization,
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// What one executed step produced
struct StepExecution {
    record: StepRecord,
    body: Option<Value>,
}

impl StepExecution {
    fn failed(
        step: &ScenarioStep,
        category: FailureCategory,
        message: impl AsRef<str>,
        http_status: Option<u16>,
        latency_ms: u64,
    ) -> Self {
        Self {
            record: StepRecord {
                name: step.name.clone(),
                outcome: Outcome::Fail,
                category: Some(category),
                latency_ms,
                http_status,
                message: sanitize_message(message.as_ref()),
            },
            body: None,
        }
    }

    fn passed(&self) -> bool {
        self.record.outcome.is_pass()
    }
}

pub struct ScenarioUnit {
    descriptor: UnitDescriptor,
    scenario: ScenarioDefinition,
    pipeline: Arc<dyn RequestPipeline>,
    comparator: SnapshotComparator,
    credential: Option<String>,
}

impl ScenarioUnit {
    pub fn new(
        scenario: ScenarioDefinition,
        pipeline: Arc<dyn RequestPipeline>,
        default_timeout: Duration,
    ) -> Self {
        let descriptor = UnitDescriptor::new(
            scenario.id.clone(),
            scenario.layer,
            scenario.timeout.unwrap_or(default_timeout),
        )
        .with_critical(scenario.layer == Layer::L2 && scenario.critical);

        Self {
            descriptor,
            scenario,
            pipeline,
            comparator: SnapshotComparator::default(),
            credential: None,
        }
    }

    pub fn with_comparator(mut self, comparator: SnapshotComparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Bearer credential attached to requests that carry no authorization of their own
    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    fn decorate(&self, mut request: PipelineRequest, ctx: &RunContext) -> PipelineRequest {
        let run_id = ctx.run_id().to_string();
        let defaults = [
            (headers::DIAGNOSTICS_RUN_ID, run_id.as_str()),
            (headers::CORRELATION_ID, ctx.correlation_id()),
            (headers::TENANT_ID, ctx.tenant_id()),
        ];
        for (name, value) in defaults {
            if !request.has_header(name) {
                request.headers.push((name.to_string(), value.to_string()));
            }
        }
        if let Some(credential) = &self.credential {
            if !request.has_header(headers::AUTHORIZATION) {
                request
                    .headers
                    .push((headers::AUTHORIZATION.to_string(), format!("Bearer {credential}")));
            }
        }
        request
    }

    async fn run_step(
        &self,
        ctx: &RunContext,
        scope: &UnitScope,
        step: &ScenarioStep,
        label: &str,
        needs_body: bool,
    ) -> StepExecution {
        let started = Instant::now();

        let request = match step.request.render(&scope.captures(), ctx) {
            Ok(request) => self.decorate(request, ctx),
            Err(unresolved) => {
                return StepExecution::failed(
                    step,
                    FailureCategory::ContractMismatch,
                    format!("{label}: {unresolved}"),
                    None,
                    0,
                )
            }
        };

        scope.mark(format!("{label}: awaiting pipeline response"));
        let response = match self.pipeline.submit(request).await {
            Ok(response) => response,
            Err(error) => {
                return StepExecution::failed(
                    step,
                    category_for_pipeline_error(&error),
                    format!("{label}: {error}"),
                    None,
                    elapsed_ms(started),
                )
            }
        };
        let status = response.status;
        let latency_ms = elapsed_ms(started);

        if !step.expect.status.matches(status) {
            let category =
                category_for_status(status).unwrap_or(FailureCategory::ContractMismatch);
            return StepExecution::failed(
                step,
                category,
                format!("{label}: unexpected status {status}"),
                Some(status),
                latency_ms,
            );
        }

        scope.mark(format!("{label}: inspecting response"));
        let requires_body = needs_body || step.expect.requires_body() || !step.captures.is_empty();
        let body = if response.body.is_empty() && !requires_body {
            None
        } else {
            match response.json() {
                Ok(body) => Some(body),
                Err(_) if !requires_body => None,
                Err(e) => {
                    return StepExecution::failed(
                        step,
                        FailureCategory::Serialization,
                        format!("{label}: response body is not valid JSON ({e})"),
                        Some(status),
                        latency_ms,
                    )
                }
            }
        };

        let empty = Value::Null;
        let document = body.as_ref().unwrap_or(&empty);
        for field in &step.expect.fields {
            match document.pointer(&field.pointer) {
                Some(value) if field.field_type.matches(value) => {}
                Some(_) => {
                    return StepExecution::failed(
                        step,
                        FailureCategory::ContractMismatch,
                        format!("{label}: field {} has unexpected type", field.pointer),
                        Some(status),
                        latency_ms,
                    )
                }
                None => {
                    return StepExecution::failed(
                        step,
                        FailureCategory::ContractMismatch,
                        format!("{label}: field {} is missing", field.pointer),
                        Some(status),
                        latency_ms,
                    )
                }
            }
        }

        for capture in &step.captures {
            match document.pointer(&capture.pointer) {
                Some(value) if !value.is_null() => scope.capture(capture.name.clone(), value.clone()),
                _ => {
                    return StepExecution::failed(
                        step,
                        FailureCategory::ContractMismatch,
                        format!(
                            "{label}: nothing to capture as '{}' at {}",
                            capture.name, capture.pointer
                        ),
                        Some(status),
                        latency_ms,
                    )
                }
            }
        }

        StepExecution {
            record: StepRecord {
                name: step.name.clone(),
                outcome: Outcome::Pass,
                category: None,
                latency_ms,
                http_status: Some(status),
                message: format!("status {status}"),
            },
            body,
        }
    }

    fn workflow_failure(
        &self,
        scope: &UnitScope,
        execution: &StepExecution,
        started: Instant,
    ) -> UnitOutcome {
        let record = &execution.record;
        let mut outcome = UnitOutcome::fail(
            record.category.unwrap_or(FailureCategory::UnhandledException),
            &record.message,
        );
        if let Some(status) = record.http_status {
            outcome = outcome.with_http_status(status);
        }
        if self.scenario.layer == Layer::L2 {
            outcome = outcome.with_steps(scope.steps(), elapsed_ms(started));
        }
        outcome
    }
}

#[async_trait]
impl DiagnosticUnit for ScenarioUnit {
    fn descriptor(&self) -> &UnitDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &RunContext, scope: &UnitScope) -> UnitOutcome {
        let started = Instant::now();
        let total = self.scenario.steps.len();
        let wants_snapshot = self.scenario.snapshot.is_some();
        let mut last: Option<StepExecution> = None;

        for (index, step) in self.scenario.steps.iter().enumerate() {
            let label = format!("step {} of {total} ({})", index + 1, step.name);
            let execution = self
                .run_step(ctx, scope, step, &label, wants_snapshot)
                .await;
            scope.record_step(execution.record.clone());
            if !execution.passed() {
                debug!(
                    scenario = %self.scenario.id,
                    step = %step.name,
                    "Scenario step failed, skipping remaining steps"
                );
                return self.workflow_failure(scope, &execution, started);
            }
            last = Some(execution);
        }

        if let Some(post) = &self.scenario.post_condition {
            let label = format!("post-condition ({})", post.name);
            let execution = self.run_step(ctx, scope, post, &label, false).await;
            scope.record_step(execution.record.clone());
            if !execution.passed() {
                return self.workflow_failure(scope, &execution, started);
            }
        }

        let mut outcome = UnitOutcome::pass(format!("{total} step(s) passed"));
        if let Some(status) = last.as_ref().and_then(|execution| execution.record.http_status) {
            outcome = outcome.with_http_status(status);
        }
        if self.scenario.layer == Layer::L2 {
            outcome = outcome.with_steps(scope.steps(), elapsed_ms(started));
        }
        if let (Some(reference), Some(body)) = (
            &self.scenario.snapshot,
            last.as_ref().and_then(|execution| execution.body.as_ref()),
        ) {
            let mismatches = self.comparator.compare(reference, body);
            if !mismatches.is_empty() {
                outcome.message = format!(
                    "{} snapshot mismatch(es) against reference",
                    mismatches.len()
                );
                outcome = outcome.with_mismatches(mismatches);
            }
        }
        outcome
    }

    async fn cleanup(&self, ctx: &RunContext, scope: &UnitScope) -> Option<StepRecord> {
        let step = self.scenario.cleanup.as_ref()?;
        let label = format!("cleanup ({})", step.name);

        // Nothing was captured for the cleanup to address, so nothing was created.
        if let Err(unresolved) = step.request.render(&scope.captures(), ctx) {
            return Some(StepRecord {
                name: step.name.clone(),
                outcome: Outcome::Pass,
                category: None,
                latency_ms: 0,
                http_status: None,
                message: format!("{label} skipped: {unresolved}"),
            });
        }

        let execution = self.run_step(ctx, scope, step, &label, false).await;
        Some(execution.record)
    }
}
