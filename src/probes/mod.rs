//! # Dependency Probe Layer (L0)
//!
//! Each external dependency gets a connectivity probe and a minimal
//! behavioral probe that goes through the dependency's real client code path.
//! Probes are wrapped in [`DependencyCheckUnit`] so the scheduler treats them
//! like any other unit: isolated, individually timed out, never blocking one
//! another.

pub mod configuration;
pub mod postgres;
pub mod telemetry;

pub use configuration::{ConfigurationProvider, RequiredKeysProbe, StaticConfiguration};
pub use postgres::{PostgresProbe, PostgresProbeKind};
pub use telemetry::{TelemetryCollaborator, TelemetryProbe, TelemetryProbeKind, TracingTelemetry};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{FailureCategory, Layer};
use crate::context::RunContext;
use crate::registry::CheckDefinition;
use crate::results::UnitOutcome;
use crate::scheduler::{DiagnosticUnit, UnitDescriptor, UnitScope};

/// Why a probe did not pass
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{category}: {message}")]
pub struct ProbeFailure {
    pub category: FailureCategory,
    pub message: String,
}

impl ProbeFailure {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Dependency, message)
    }

    pub fn configuration_missing(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::ConfigurationMissing, message)
    }
}

/// One connectivity or behavioral probe against an external dependency.
///
/// Implementations use the dependency's normal client surface, read-only,
/// and should `scope.mark(..)` before each await so a timeout can report
/// where the probe was stuck.
#[async_trait]
pub trait DependencyCheck: Send + Sync {
    async fn probe(&self, ctx: &RunContext, scope: &UnitScope) -> Result<String, ProbeFailure>;
}

/// Adapts a [`CheckDefinition`] to the scheduler's unit contract
pub struct DependencyCheckUnit {
    descriptor: UnitDescriptor,
    dependency: String,
    probe: Arc<dyn DependencyCheck>,
}

impl DependencyCheckUnit {
    pub fn new(definition: &CheckDefinition, default_timeout: Duration) -> Self {
        let descriptor = UnitDescriptor::new(
            definition.id.clone(),
            Layer::L0,
            definition.timeout.unwrap_or(default_timeout),
        )
        .with_dependency_type(definition.dependency_type.clone());

        Self {
            descriptor,
            dependency: definition.dependency.clone(),
            probe: definition.probe.clone(),
        }
    }
}

#[async_trait]
impl DiagnosticUnit for DependencyCheckUnit {
    fn descriptor(&self) -> &UnitDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &RunContext, scope: &UnitScope) -> UnitOutcome {
        scope.mark(format!("probing dependency '{}'", self.dependency));
        match self.probe.probe(ctx, scope).await {
            Ok(message) => UnitOutcome::pass(message),
            Err(failure) => UnitOutcome::fail(failure.category, failure.message),
        }
    }
}
