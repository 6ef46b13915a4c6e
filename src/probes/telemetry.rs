//! Logger/tracer probes.
//!
//! Telemetry is an injected collaborator with an explicit "emit and confirm"
//! contract. [`TracingTelemetry`] is the default, backed by the global
//! `tracing` dispatcher.

use async_trait::async_trait;
use std::sync::Arc;

use super::{DependencyCheck, ProbeFailure};
use crate::context::RunContext;
use crate::scheduler::UnitScope;

pub trait TelemetryCollaborator: Send + Sync {
    /// Emit one span/event carrying `correlation_id`; `Ok` only if something recorded it
    fn emit_correlated_span(&self, correlation_id: &str) -> Result<(), String>;

    /// Whether a sink/listener is installed at all
    fn sink_present(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetryCollaborator for TracingTelemetry {
    fn emit_correlated_span(&self, correlation_id: &str) -> Result<(), String> {
        let span = tracing::info_span!("diagnostics.telemetry_probe", correlation_id = %correlation_id);
        if span.is_disabled() {
            return Err("span was not recorded by any subscriber".to_string());
        }
        let _entered = span.enter();
        tracing::info!(correlation_id = %correlation_id, "Telemetry probe event");
        Ok(())
    }

    fn sink_present(&self) -> bool {
        tracing::dispatcher::get_default(|dispatch| {
            !dispatch.is::<tracing::subscriber::NoSubscriber>()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryProbeKind {
    SpanEmission,
    SinkPresence,
}

pub struct TelemetryProbe {
    collaborator: Arc<dyn TelemetryCollaborator>,
    kind: TelemetryProbeKind,
}

impl TelemetryProbe {
    pub fn new(collaborator: Arc<dyn TelemetryCollaborator>, kind: TelemetryProbeKind) -> Self {
        Self { collaborator, kind }
    }

    pub fn tracing(kind: TelemetryProbeKind) -> Self {
        Self::new(Arc::new(TracingTelemetry), kind)
    }
}

#[async_trait]
impl DependencyCheck for TelemetryProbe {
    async fn probe(&self, ctx: &RunContext, scope: &UnitScope) -> Result<String, ProbeFailure> {
        match self.kind {
            TelemetryProbeKind::SpanEmission => {
                scope.mark("emitting correlated span");
                self.collaborator
                    .emit_correlated_span(ctx.correlation_id())
                    .map_err(|reason| ProbeFailure::dependency(format!("span emission: {reason}")))?;
                Ok("correlated span emitted".to_string())
            }
            TelemetryProbeKind::SinkPresence => {
                scope.mark("checking log sink presence");
                if self.collaborator.sink_present() {
                    Ok("log sink present".to_string())
                } else {
                    Err(ProbeFailure::dependency("no log sink is installed"))
                }
            }
        }
    }
}
