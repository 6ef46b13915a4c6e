//! # Diagnostics Engine
//!
//! Orchestrates one protected invocation end to end:
//!
//! ```text
//! gate -> tenant lease -> graph validation + L0 batch -> L1/L2 batch -> scoring -> report -> audit
//! ```
//!
//! A structural dependency-graph failure skips the L1/L2 batch (L0 still
//! runs). With `engine.short_circuit_on_dependency_failure` an L0 failure
//! does the same. Skipped units produce no results.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use diagnostics_core::config::DiagnosticsConfig;
//! use diagnostics_core::engine::{DiagnosticsEngine, RunRequest};
//! use diagnostics_core::registry::DiagnosticRegistry;
//!
//! # async fn example(router: axum::Router) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DiagnosticsEngine::builder(DiagnosticsConfig::default())
//!     .registry(DiagnosticRegistry::new())
//!     .router(router)
//!     .build()?;
//!
//! let report = engine
//!     .run(RunRequest::new().credential("token").intent("run-diagnostics").mode("ReadOnly"))
//!     .await?;
//! println!("{}", report.status);
//! # Ok(())
//! # }
//! ```

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::audit::{AuditDecision, AuditRecord, AuditSink, TracingAuditSink};
use crate::config::DiagnosticsConfig;
use crate::constants::{Layer, RunMode};
use crate::context::RunContext;
use crate::error::{DiagnosticsError, Result};
use crate::gate::{
    CredentialVerifier, GateRejection, GateRequest, ModeGate, StaticBearerVerifier,
    TenantLeaseManager,
};
use crate::pipeline::{RequestPipeline, RouterPipeline, ScenarioUnit};
use crate::probes::DependencyCheckUnit;
use crate::registry::{Definition, DiagnosticPlugin, DiagnosticRegistry};
use crate::report::{Report, ReportBuilder};
use crate::scheduler::{DiagnosticUnit, ResultCollector, Scheduler};
use crate::scoring::ScoringEngine;
use crate::snapshot::{CanonicalizeOptions, SnapshotComparator};
use crate::validation::{
    ContainerIntrospection, DiContainerReport, GraphValidator, ScopedActivation,
};

/// Tenant used when the caller names none
pub const DEFAULT_TENANT: &str = "default";

pub const VALIDATION_DEADLINE_MESSAGE: &str =
    "dependency graph validation exceeded the suite deadline";

/// Caller-supplied inputs of one invocation
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub mode: Option<String>,
    pub tenant_id: Option<String>,
    pub credential: Option<String>,
    pub intent: Option<String>,
    pub correlation_id: Option<String>,
}

impl RunRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    fn tenant_or_default(&self) -> &str {
        self.tenant_id
            .as_deref()
            .filter(|tenant| !tenant.trim().is_empty())
            .unwrap_or(DEFAULT_TENANT)
    }
}

/// A run refused before any probe executed
#[derive(Error, Debug, Clone, PartialEq)]
#[error("diagnostics run {run_id} rejected: {reason}")]
pub struct RunRejection {
    pub run_id: Uuid,
    pub reason: GateRejection,
    pub timestamp: DateTime<Utc>,
}

impl RunRejection {
    pub fn http_status(&self) -> u16 {
        self.reason.http_status()
    }
}

pub struct DiagnosticsEngine {
    config: Arc<DiagnosticsConfig>,
    registry: Arc<DiagnosticRegistry>,
    gate: ModeGate,
    leases: TenantLeaseManager,
    scheduler: Scheduler,
    scoring: ScoringEngine,
    comparator: SnapshotComparator,
    pipeline: Option<Arc<dyn RequestPipeline>>,
    validator: Option<Arc<GraphValidator>>,
    audit: Arc<dyn AuditSink>,
}

impl DiagnosticsEngine {
    pub fn builder(config: DiagnosticsConfig) -> DiagnosticsEngineBuilder {
        DiagnosticsEngineBuilder::new(config)
    }

    pub fn config(&self) -> &DiagnosticsConfig {
        &self.config
    }

    pub fn registry(&self) -> &DiagnosticRegistry {
        &self.registry
    }

    pub fn leases(&self) -> &TenantLeaseManager {
        &self.leases
    }

    /// Gate, execute, score and report one invocation
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_or_default()))]
    pub async fn run(&self, request: RunRequest) -> std::result::Result<Report, RunRejection> {
        let tenant_id = request.tenant_or_default().to_string();
        let gate_request = GateRequest {
            credential: request.credential.as_deref(),
            intent: request.intent.as_deref(),
            mode: request.mode.as_deref(),
        };

        let mode = match self.gate.admit(&gate_request) {
            Ok(mode) => mode,
            Err(reason) => return Err(self.reject(Uuid::new_v4(), reason, &request, &tenant_id)),
        };

        let mut ctx = RunContext::new(
            mode,
            tenant_id.clone(),
            self.config.environment.clone(),
            self.config.application_id.clone(),
            self.config.scheduler.suite_deadline(),
        );
        if let Some(correlation_id) = request.correlation_id.as_deref() {
            ctx = ctx.with_correlation_id(correlation_id);
        }

        let lease = match self.leases.acquire(&tenant_id, ctx.run_id()) {
            Ok(lease) => lease,
            Err(reason) => return Err(self.reject(ctx.run_id(), reason, &request, &tenant_id)),
        };

        let ctx = Arc::new(ctx);
        info!(
            run_id = %ctx.run_id(),
            mode = %mode,
            correlation_id = %ctx.correlation_id(),
            "Diagnostics run started"
        );

        let report = self.execute(&ctx).await;
        // Every unit's cleanup has finished; the sandbox may be reused.
        drop(lease);

        info!(
            run_id = %report.run_id,
            status = %report.status,
            migration_ready = report.executive_summary.migration_ready,
            overall_coverage = report.executive_summary.overall_coverage,
            "Diagnostics run completed"
        );
        self.audit.append(AuditRecord {
            run_id: report.run_id,
            decision: AuditDecision::Admitted,
            mode: Some(mode),
            tenant_id,
            correlation_id: Some(ctx.correlation_id().to_string()),
            environment: self.config.environment.clone(),
            result: report.status.to_string(),
            recorded_at: Utc::now(),
        });

        Ok(report)
    }

    /// Refuse a request whose inputs could not be read, auditing it like any
    /// other rejection
    pub fn reject_malformed(
        &self,
        request: &RunRequest,
        reason: impl Into<String>,
    ) -> RunRejection {
        let tenant_id = request.tenant_or_default().to_string();
        self.reject(
            Uuid::new_v4(),
            GateRejection::MalformedRequest(reason.into()),
            request,
            &tenant_id,
        )
    }

    fn reject(
        &self,
        run_id: Uuid,
        reason: GateRejection,
        request: &RunRequest,
        tenant_id: &str,
    ) -> RunRejection {
        warn!(run_id = %run_id, reason = %reason, "Diagnostics run rejected");
        self.audit.append(AuditRecord {
            run_id,
            decision: AuditDecision::Rejected,
            mode: request.mode.as_deref().and_then(|mode| mode.parse::<RunMode>().ok()),
            tenant_id: tenant_id.to_string(),
            correlation_id: request.correlation_id.clone(),
            environment: self.config.environment.clone(),
            result: reason.to_string(),
            recorded_at: Utc::now(),
        });
        RunRejection {
            run_id,
            reason,
            timestamp: Utc::now(),
        }
    }

    async fn execute(&self, ctx: &Arc<RunContext>) -> Report {
        let collector = Arc::new(ResultCollector::new());
        let l0_units = self.dependency_units(ctx.mode());

        let (di_container, ()) = tokio::join!(
            self.validate_graph(ctx),
            self.scheduler.run(ctx, l0_units, &collector)
        );

        let l0_failed = collector
            .snapshot()
            .iter()
            .any(|result| result.layer == Layer::L0 && !result.is_pass());
        let short_circuit = di_container.structural_failure()
            || (self.config.engine.short_circuit_on_dependency_failure && l0_failed);

        if short_circuit {
            warn!(
                run_id = %ctx.run_id(),
                structural_failure = di_container.structural_failure(),
                l0_failed = l0_failed,
                "Skipping L1/L2 scenarios"
            );
        } else {
            let scenario_units = self.scenario_units(ctx.mode());
            self.scheduler.run(ctx, scenario_units, &collector).await;
        }

        let results = collector.snapshot();
        let verdict = self.scoring.score(&results, di_container.passed());
        ReportBuilder::new(ctx)
            .di_container(di_container)
            .results(results)
            .build(&verdict)
    }

    /// Runs off the async workers; the join is bounded by the suite deadline
    /// because a hung constructor cannot be interrupted.
    async fn validate_graph(&self, ctx: &RunContext) -> DiContainerReport {
        let Some(validator) = self.validator.clone() else {
            return DiContainerReport::not_configured();
        };
        let validation = tokio::task::spawn_blocking(move || validator.validate());
        match tokio::time::timeout_at(ctx.deadline(), validation).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                warn!(error = %e, "Dependency graph validation did not complete");
                DiContainerReport::validator_failed("dependency graph validation did not complete")
            }
            Err(_) => {
                warn!(run_id = %ctx.run_id(), "Dependency graph validation exceeded the suite deadline");
                DiContainerReport::validator_failed(VALIDATION_DEADLINE_MESSAGE)
            }
        }
    }

    fn dependency_units(&self, mode: RunMode) -> Vec<Arc<dyn DiagnosticUnit>> {
        let default_timeout = self.config.scheduler.default_unit_timeout();
        self.registry
            .list_for(mode, Layer::L0)
            .into_iter()
            .filter_map(|definition| match definition {
                Definition::Check(check) => Some(Arc::new(DependencyCheckUnit::new(
                    check,
                    default_timeout,
                )) as Arc<dyn DiagnosticUnit>),
                Definition::Scenario(_) => None,
            })
            .collect()
    }

    fn scenario_units(&self, mode: RunMode) -> Vec<Arc<dyn DiagnosticUnit>> {
        let Some(pipeline) = &self.pipeline else {
            return Vec::new();
        };
        let default_timeout = self.config.scheduler.default_unit_timeout();
        [Layer::L1, Layer::L2]
            .into_iter()
            .flat_map(|layer| self.registry.list_for(mode, layer))
            .filter_map(|definition| match definition {
                Definition::Scenario(scenario) => Some(Arc::new(
                    ScenarioUnit::new(scenario.clone(), pipeline.clone(), default_timeout)
                        .with_comparator(self.comparator.clone())
                        .with_credential(self.config.auth.diagnostic_credential.clone()),
                ) as Arc<dyn DiagnosticUnit>),
                Definition::Check(_) => None,
            })
            .collect()
    }
}

pub struct DiagnosticsEngineBuilder {
    config: DiagnosticsConfig,
    registry: DiagnosticRegistry,
    plugins: Vec<Box<dyn DiagnosticPlugin>>,
    pipeline: Option<Arc<dyn RequestPipeline>>,
    validator: Option<GraphValidator>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    audit: Option<Arc<dyn AuditSink>>,
    leases: Option<TenantLeaseManager>,
}

impl DiagnosticsEngineBuilder {
    pub fn new(config: DiagnosticsConfig) -> Self {
        Self {
            config,
            registry: DiagnosticRegistry::new(),
            plugins: Vec::new(),
            pipeline: None,
            validator: None,
            verifier: None,
            audit: None,
            leases: None,
        }
    }

    pub fn registry(mut self, registry: DiagnosticRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Installed into the registry at build time
    pub fn plugin(mut self, plugin: impl DiagnosticPlugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn pipeline(mut self, pipeline: Arc<dyn RequestPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Replay scenarios through this router
    pub fn router(self, router: Router) -> Self {
        self.pipeline(Arc::new(RouterPipeline::new(router)))
    }

    /// Validate a container offering both capabilities, with the configured critical services
    pub fn container<C>(mut self, container: Arc<C>) -> Self
    where
        C: ContainerIntrospection + ScopedActivation + 'static,
    {
        self.validator = Some(
            GraphValidator::for_container(container)
                .with_critical_services(self.config.activation.critical_services.clone()),
        );
        self
    }

    pub fn validator(mut self, validator: GraphValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Share tenant leases with other engines in the process
    pub fn lease_manager(mut self, leases: TenantLeaseManager) -> Self {
        self.leases = Some(leases);
        self
    }

    pub fn build(self) -> Result<DiagnosticsEngine> {
        self.config.validate()?;

        let mut registry = self.registry;
        for plugin in &self.plugins {
            registry.install(plugin.as_ref())?;
        }

        let has_scenarios = registry.ids().any(|id| {
            registry
                .get(id)
                .is_some_and(|definition| matches!(definition, Definition::Scenario(_)))
        });
        if has_scenarios && self.pipeline.is_none() {
            return Err(DiagnosticsError::assembly(
                "scenarios are registered but no request pipeline was supplied",
            ));
        }

        let verifier = self
            .verifier
            .unwrap_or_else(|| Arc::new(StaticBearerVerifier::from_config(&self.config.auth)));
        let gate = ModeGate::new(
            self.config.gate.clone(),
            self.config.environment.clone(),
            verifier,
        );
        let comparator = SnapshotComparator::new(CanonicalizeOptions {
            mask_timestamps: self.config.snapshot.mask_timestamps,
        });

        info!(
            application_id = %self.config.application_id,
            environment = %self.config.environment,
            definitions = registry.len(),
            dependency_graph = self.validator.is_some(),
            "Diagnostics engine assembled"
        );

        Ok(DiagnosticsEngine {
            scheduler: Scheduler::from_config(&self.config.scheduler),
            scoring: ScoringEngine::from_config(&self.config),
            gate,
            comparator,
            leases: self.leases.unwrap_or_default(),
            pipeline: self.pipeline,
            validator: self.validator.map(Arc::new),
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
            registry: Arc::new(registry),
            config: Arc::new(self.config),
        })
    }
}
