//! # Run Context
//!
//! Immutable per-invocation metadata. Created once when the gate admits a run
//! and shared by reference with every check and scenario.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::constants::RunMode;

#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    mode: RunMode,
    tenant_id: String,
    correlation_id: String,
    environment: String,
    application_id: String,
    started_at: DateTime<Utc>,
    deadline: Instant,
}

impl RunContext {
    /// Create a context whose absolute deadline is `suite_deadline` from now
    pub fn new(
        mode: RunMode,
        tenant_id: impl Into<String>,
        environment: impl Into<String>,
        application_id: impl Into<String>,
        suite_deadline: Duration,
    ) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            mode,
            tenant_id: tenant_id.into(),
            correlation_id: run_id.to_string(),
            environment: environment.into(),
            application_id: application_id.into(),
            started_at: Utc::now(),
            deadline: Instant::now() + suite_deadline,
        }
    }

    /// Use a caller-provided correlation identifier instead of the run id
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the suite deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn deadline_exceeded(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_defaults_to_run_id() {
        let ctx = RunContext::new(
            RunMode::ReadOnly,
            "tenant-a",
            "test",
            "orders-api",
            Duration::from_secs(5),
        );
        assert_eq!(ctx.correlation_id(), ctx.run_id().to_string());

        let ctx = ctx.with_correlation_id("corr-123");
        assert_eq!(ctx.correlation_id(), "corr-123");
    }

    #[tokio::test]
    async fn test_remaining_saturates_at_zero() {
        let ctx = RunContext::new(
            RunMode::ReadOnly,
            "tenant-a",
            "test",
            "orders-api",
            Duration::from_millis(1),
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(ctx.remaining(), Duration::ZERO);
        assert!(ctx.deadline_exceeded());
    }
}
