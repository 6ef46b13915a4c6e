//! Declarative check and scenario definitions.
//!
//! Definitions are plain data plus, for checks, the probe that performs the
//! work. They are registered once at process start and never mutated.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{Layer, RunMode};
use crate::pipeline::request::ScenarioStep;
use crate::probes::DependencyCheck;

/// An L0 dependency check
#[derive(Clone)]
pub struct CheckDefinition {
    pub id: String,
    /// Logical dependency this check exercises, e.g. "orders-db"
    pub dependency: String,
    /// Dependency kind reported on the report, e.g. "postgres"
    pub dependency_type: String,
    pub min_mode: RunMode,
    /// Falls back to the scheduler default when unset
    pub timeout: Option<Duration>,
    pub probe: Arc<dyn DependencyCheck>,
}

impl CheckDefinition {
    pub fn new(
        id: impl Into<String>,
        dependency: impl Into<String>,
        dependency_type: impl Into<String>,
        probe: Arc<dyn DependencyCheck>,
    ) -> Self {
        Self {
            id: id.into(),
            dependency: dependency.into(),
            dependency_type: dependency_type.into(),
            min_mode: RunMode::ReadOnly,
            timeout: None,
            probe,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_min_mode(mut self, mode: RunMode) -> Self {
        self.min_mode = mode;
        self
    }
}

impl fmt::Debug for CheckDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckDefinition")
            .field("id", &self.id)
            .field("dependency", &self.dependency)
            .field("dependency_type", &self.dependency_type)
            .field("min_mode", &self.min_mode)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// An L1 request or L2 workflow replayed through the request pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioDefinition {
    pub id: String,
    pub layer: Layer,
    pub min_mode: RunMode,
    pub timeout: Option<Duration>,
    /// Only eligible under `Full`
    pub destructive: bool,
    /// Counts toward `criticalWorkflowsPass` (L2 only)
    pub critical: bool,
    pub steps: Vec<ScenarioStep>,
    /// Runs after a workflow regardless of how its steps ended
    pub cleanup: Option<ScenarioStep>,
    /// Must hold after all steps passed, e.g. "created resource is retrievable"
    pub post_condition: Option<ScenarioStep>,
    /// Reference document for the L1 response body
    pub snapshot: Option<Value>,
}

impl ScenarioDefinition {
    /// A single idempotent request
    pub fn l1(id: impl Into<String>, step: ScenarioStep) -> Self {
        Self {
            id: id.into(),
            layer: Layer::L1,
            min_mode: RunMode::ReadOnly,
            timeout: None,
            destructive: false,
            critical: false,
            steps: vec![step],
            cleanup: None,
            post_condition: None,
            snapshot: None,
        }
    }

    /// An ordered multi-step workflow, eligible from `SafeWrite`
    pub fn workflow(id: impl Into<String>, steps: Vec<ScenarioStep>) -> Self {
        Self {
            id: id.into(),
            layer: Layer::L2,
            min_mode: RunMode::SafeWrite,
            timeout: None,
            destructive: false,
            critical: true,
            steps,
            cleanup: None,
            post_condition: None,
            snapshot: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_min_mode(mut self, mode: RunMode) -> Self {
        self.min_mode = mode;
        self
    }

    pub fn destructive(mut self) -> Self {
        self.destructive = true;
        self
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_cleanup(mut self, step: ScenarioStep) -> Self {
        self.cleanup = Some(step);
        self
    }

    pub fn with_post_condition(mut self, step: ScenarioStep) -> Self {
        self.post_condition = Some(step);
        self
    }

    pub fn with_snapshot(mut self, reference: Value) -> Self {
        self.snapshot = Some(reference);
        self
    }
}

/// Anything the registry can hold
#[derive(Debug, Clone)]
pub enum Definition {
    Check(CheckDefinition),
    Scenario(ScenarioDefinition),
}

impl Definition {
    pub fn id(&self) -> &str {
        match self {
            Definition::Check(check) => &check.id,
            Definition::Scenario(scenario) => &scenario.id,
        }
    }

    pub fn layer(&self) -> Layer {
        match self {
            Definition::Check(_) => Layer::L0,
            Definition::Scenario(scenario) => scenario.layer,
        }
    }

    pub fn min_mode(&self) -> RunMode {
        match self {
            Definition::Check(check) => check.min_mode,
            Definition::Scenario(scenario) => scenario.min_mode,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Definition::Check(check) => check.timeout,
            Definition::Scenario(scenario) => scenario.timeout,
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, Definition::Scenario(scenario) if scenario.destructive)
    }

    /// Layer bound, minimum mode and destructive gating must all allow `mode`
    pub fn eligible_for(&self, mode: RunMode) -> bool {
        mode.permits_layer(self.layer())
            && mode >= self.min_mode()
            && (!self.is_destructive() || mode.permits_destructive())
    }
}

impl From<CheckDefinition> for Definition {
    fn from(check: CheckDefinition) -> Self {
        Definition::Check(check)
    }
}

impl From<ScenarioDefinition> for Definition {
    fn from(scenario: ScenarioDefinition) -> Self {
        Definition::Scenario(scenario)
    }
}
