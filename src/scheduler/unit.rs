//! The fixed contract every schedulable check or scenario implements, plus
//! the per-unit scope the scheduler owns on its behalf.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::Instant;

use crate::constants::{FailureCategory, Layer};
use crate::context::RunContext;
use crate::pipeline::request::CarriedState;
use crate::results::{StepRecord, UnitOutcome};

/// Static facts the scheduler needs about a unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDescriptor {
    pub id: String,
    pub layer: Layer,
    pub timeout: Duration,
    /// Category recorded when the unit exceeds its own timeout
    pub timeout_category: FailureCategory,
    pub dependency_type: Option<String>,
    pub critical: bool,
}

impl UnitDescriptor {
    pub fn new(id: impl Into<String>, layer: Layer, timeout: Duration) -> Self {
        let timeout_category = match layer {
            Layer::L0 => FailureCategory::Dependency,
            Layer::L1 | Layer::L2 => FailureCategory::Timeout,
        };
        Self {
            id: id.into(),
            layer,
            timeout,
            timeout_category,
            dependency_type: None,
            critical: false,
        }
    }

    pub fn with_dependency_type(mut self, dependency_type: impl Into<String>) -> Self {
        self.dependency_type = Some(dependency_type.into());
        self
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }
}

/// State the scheduler keeps for a unit so that it survives cancellation of
/// the unit's execution future: progress marks, carried workflow state and
/// completed step records.
#[derive(Debug, Default)]
pub struct UnitScope {
    started_at: OnceLock<Instant>,
    last_state: Mutex<Option<String>>,
    captures: Mutex<CarriedState>,
    steps: Mutex<Vec<StepRecord>>,
}

impl UnitScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_started(&self) -> Instant {
        *self.started_at.get_or_init(Instant::now)
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at.get().copied()
    }

    /// Record the latest intermediate state, e.g. "step 2 of 3: awaiting response"
    pub fn mark(&self, state: impl Into<String>) {
        *self.last_state.lock() = Some(state.into());
    }

    pub fn last_state(&self) -> Option<String> {
        self.last_state.lock().clone()
    }

    pub fn capture(&self, name: impl Into<String>, value: Value) {
        self.captures.lock().insert(name.into(), value);
    }

    pub fn captures(&self) -> CarriedState {
        self.captures.lock().clone()
    }

    pub fn record_step(&self, step: StepRecord) {
        self.steps.lock().push(step);
    }

    pub fn steps(&self) -> Vec<StepRecord> {
        self.steps.lock().clone()
    }
}

/// `execute(context) -> result`, plus an optional cleanup that the scheduler
/// runs exactly once after execution ends, however it ended.
#[async_trait]
pub trait DiagnosticUnit: Send + Sync {
    fn descriptor(&self) -> &UnitDescriptor;

    /// Run the unit. May be cancelled at any await point.
    async fn execute(&self, ctx: &RunContext, scope: &UnitScope) -> UnitOutcome;

    /// Release anything `execute` created. Runs inside a bounded,
    /// non-cancelable grace window.
    async fn cleanup(&self, _ctx: &RunContext, _scope: &UnitScope) -> Option<StepRecord> {
        None
    }
}
