//! # Unit Scheduler
//!
//! Executes diagnostic units concurrently under a parallelism bound, enforces
//! per-unit timeouts and the suite deadline, isolates panics, and guarantees
//! that every admitted unit yields exactly one [`ExecutionResult`] and that
//! its cleanup runs exactly once.

pub mod collector;
pub mod unit;

pub use collector::ResultCollector;
pub use unit::{DiagnosticUnit, UnitDescriptor, UnitScope};

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::config::SchedulerConfig;
use crate::constants::{FailureCategory, Outcome};
use crate::context::RunContext;
use crate::logging::log_unit_operation;
use crate::results::{ExecutionResult, StepRecord};

pub const SUITE_DEADLINE_MESSAGE: &str = "suite deadline exceeded";

const QUEUED_STATE: &str = "queued: waiting for an execution slot";

#[derive(Debug, Clone)]
pub struct Scheduler {
    max_parallelism: usize,
    cleanup_grace: Duration,
    deadline_grace: Duration,
}

impl Scheduler {
    pub fn new(max_parallelism: usize, cleanup_grace: Duration, deadline_grace: Duration) -> Self {
        Self {
            max_parallelism: max_parallelism.max(1),
            cleanup_grace,
            deadline_grace,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            config.max_parallelism,
            config.cleanup_grace(),
            config.deadline_grace(),
        )
    }

    /// Run every unit to completion, timeout or cancellation.
    ///
    /// Returns once each unit has a result in `collector`. A result already
    /// present for a unit id (from an earlier batch) is left untouched.
    #[instrument(skip_all, fields(run_id = %ctx.run_id(), units = units.len()))]
    pub async fn run(
        &self,
        ctx: &Arc<RunContext>,
        units: Vec<Arc<dyn DiagnosticUnit>>,
        collector: &Arc<ResultCollector>,
    ) {
        if units.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_parallelism));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        let mut tracked = Vec::with_capacity(units.len());

        for unit in units {
            let scope = Arc::new(UnitScope::new());
            tracked.push((unit.descriptor().clone(), scope.clone()));
            tasks.spawn(run_unit(
                unit,
                ctx.clone(),
                scope,
                semaphore.clone(),
                cancel_rx.clone(),
                collector.clone(),
                self.cleanup_grace,
            ));
        }

        let drained = tokio::time::timeout_at(ctx.deadline(), drain(&mut tasks)).await;
        if drained.is_err() {
            warn!(
                run_id = %ctx.run_id(),
                pending = tasks.len(),
                "Suite deadline reached, cancelling outstanding units"
            );
            cancel_tx.send_replace(true);
            if tokio::time::timeout(self.deadline_grace, drain(&mut tasks))
                .await
                .is_err()
            {
                error!(
                    run_id = %ctx.run_id(),
                    abandoned = tasks.len(),
                    "Units did not stop within the deadline grace period, aborting"
                );
                tasks.shutdown().await;
            }
        }

        // Anything still without a result never started or was abandoned.
        for (descriptor, scope) in tracked {
            if collector.contains(&descriptor.id) {
                continue;
            }
            let (message, last_trace, latency_ms) = match scope.started_at() {
                Some(started) => (
                    format!(
                        "{SUITE_DEADLINE_MESSAGE}; unit abandoned after grace period; last state: {}",
                        scope.last_state().unwrap_or_else(|| "started".to_string())
                    ),
                    scope.last_state(),
                    elapsed_ms(started),
                ),
                None => (
                    format!("{SUITE_DEADLINE_MESSAGE} before the unit started"),
                    Some(QUEUED_STATE.to_string()),
                    0,
                ),
            };
            let mut result = ExecutionResult::timeout(
                &descriptor.id,
                descriptor.layer,
                FailureCategory::Timeout,
                message,
                last_trace,
                latency_ms,
            )
            .with_dependency_type(descriptor.dependency_type.clone())
            .with_critical(descriptor.critical);
            result.steps = scope.steps();
            log_unit_operation(
                "abandoned",
                &ctx.run_id().to_string(),
                &descriptor.id,
                descriptor.layer,
                Some(Outcome::Timeout),
                Some(latency_ms),
            );
            collector.record(result);
        }
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                error!(error = %e, "Unit task panicked outside execution isolation");
            }
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

async fn run_unit(
    unit: Arc<dyn DiagnosticUnit>,
    ctx: Arc<RunContext>,
    scope: Arc<UnitScope>,
    semaphore: Arc<Semaphore>,
    mut cancel: watch::Receiver<bool>,
    collector: Arc<ResultCollector>,
    cleanup_grace: Duration,
) {
    let descriptor = unit.descriptor().clone();
    let run_id = ctx.run_id().to_string();

    let permit = tokio::select! {
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
        _ = cancelled(&mut cancel) => return,
    };

    let started = scope.mark_started();
    scope.mark("started");
    log_unit_operation("started", &run_id, &descriptor.id, descriptor.layer, None, None);

    let unit_deadline = (started + descriptor.timeout).min(ctx.deadline());
    let execution = AssertUnwindSafe(unit.execute(&ctx, &scope)).catch_unwind();

    let mut result = tokio::select! {
        finished = tokio::time::timeout_at(unit_deadline, execution) => match finished {
            Ok(Ok(outcome)) => {
                ExecutionResult::from_outcome(&descriptor.id, descriptor.layer, outcome, elapsed_ms(started))
            }
            Ok(Err(_panic)) => {
                error!(run_id = %run_id, unit_id = %descriptor.id, "Unit panicked during execution");
                let mut result = ExecutionResult::from_outcome(
                    &descriptor.id,
                    descriptor.layer,
                    crate::results::UnitOutcome::fail(
                        FailureCategory::UnhandledException,
                        "unit panicked during execution",
                    ),
                    elapsed_ms(started),
                );
                result.steps = scope.steps();
                result
            }
            Err(_elapsed) => timed_out(&descriptor, &scope, &ctx, started),
        },
        _ = cancelled(&mut cancel) => suite_deadline_result(&descriptor, &scope, started),
    };
    result = result
        .with_dependency_type(descriptor.dependency_type.clone())
        .with_critical(descriptor.critical);

    let cleanup = tokio::time::timeout(
        cleanup_grace,
        AssertUnwindSafe(unit.cleanup(&ctx, &scope)).catch_unwind(),
    )
    .await;
    let cleanup_step = match cleanup {
        Ok(Ok(step)) => step,
        Ok(Err(_panic)) => Some(cleanup_failure(
            FailureCategory::UnhandledException,
            "cleanup panicked",
        )),
        Err(_elapsed) => Some(cleanup_failure(
            FailureCategory::Timeout,
            &format!("cleanup exceeded grace period of {}ms", cleanup_grace.as_millis()),
        )),
    };
    if let Some(step) = cleanup_step {
        apply_cleanup(&mut result, step);
    }
    drop(permit);

    log_unit_operation(
        "completed",
        &run_id,
        &descriptor.id,
        descriptor.layer,
        Some(result.outcome),
        Some(result.latency_ms),
    );
    collector.record(result);
}

fn timed_out(
    descriptor: &UnitDescriptor,
    scope: &UnitScope,
    ctx: &RunContext,
    started: Instant,
) -> ExecutionResult {
    // The unit deadline is clamped to the suite deadline; report whichever hit.
    if ctx.deadline_exceeded() && started + descriptor.timeout > ctx.deadline() {
        return suite_deadline_result(descriptor, scope, started);
    }
    let last_state = scope.last_state();
    debug!(unit_id = %descriptor.id, last_state = ?last_state, "Unit timed out");
    let mut result = ExecutionResult::timeout(
        &descriptor.id,
        descriptor.layer,
        descriptor.timeout_category,
        format!(
            "timed out after {}ms at: {}",
            descriptor.timeout.as_millis(),
            last_state.as_deref().unwrap_or("unknown")
        ),
        last_state,
        elapsed_ms(started),
    );
    result.steps = scope.steps();
    result
}

fn suite_deadline_result(
    descriptor: &UnitDescriptor,
    scope: &UnitScope,
    started: Instant,
) -> ExecutionResult {
    let last_state = scope.last_state();
    let mut result = ExecutionResult::timeout(
        &descriptor.id,
        descriptor.layer,
        FailureCategory::Timeout,
        format!(
            "{SUITE_DEADLINE_MESSAGE}; last state: {}",
            last_state.as_deref().unwrap_or("unknown")
        ),
        last_state,
        elapsed_ms(started),
    );
    result.steps = scope.steps();
    result
}

fn cleanup_failure(category: FailureCategory, message: &str) -> StepRecord {
    StepRecord {
        name: "cleanup".to_string(),
        outcome: Outcome::Fail,
        category: Some(category),
        latency_ms: 0,
        http_status: None,
        message: message.to_string(),
    }
}

/// Attach the cleanup step; a failed cleanup turns a passing unit into a failure.
fn apply_cleanup(result: &mut ExecutionResult, step: StepRecord) {
    if !step.outcome.is_pass() && result.is_pass() {
        result.outcome = Outcome::Fail;
        result.category = step.category.or(Some(FailureCategory::Dependency));
        result.message = format!("cleanup failed: {}", step.message);
    }
    result.steps.push(step);
}
