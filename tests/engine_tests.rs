//! End-to-end runs of the engine against the in-process orders API.

mod common;

use common::*;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use diagnostics_core::audit::{AuditDecision, MemoryAuditSink};
use diagnostics_core::constants::{FailureCategory, Layer, Outcome, RunStatus};
use diagnostics_core::engine::{DiagnosticsEngine, VALIDATION_DEADLINE_MESSAGE};
use diagnostics_core::error::DiagnosticsError;
use diagnostics_core::gate::GateRejection;
use diagnostics_core::pipeline::request::{RequestTemplate, ScenarioStep};
use diagnostics_core::registry::{
    CheckDefinition, DiagnosticPlugin, DiagnosticRegistry, RegistryError, ScenarioDefinition,
};
use diagnostics_core::scheduler::SUITE_DEADLINE_MESSAGE;
use diagnostics_core::validation::{
    DependencySpec, ServiceCatalog, ServiceDescriptor, ServiceLifetime,
};

#[tokio::test]
async fn test_dependency_timeout_fails_the_run() {
    let mut registry = DiagnosticRegistry::new();
    registry.register(check("cache.ping", Behavior::Pass)).unwrap();
    registry.register(check("db.connectivity", Behavior::Pass)).unwrap();
    registry
        .register(check("queue.publish", Behavior::Hang).with_timeout(Duration::from_millis(50)))
        .unwrap();

    let engine = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .build()
        .unwrap();
    let report = engine.run(admitted("ReadOnly")).await.unwrap();

    assert_eq!(report.status, RunStatus::Fail);
    assert!(!report.executive_summary.migration_ready);
    assert_eq!(report.diagnostics.dependencies.len(), 3);

    let hung = report
        .diagnostics
        .dependencies
        .iter()
        .find(|dependency| dependency.name == "queue.publish")
        .unwrap();
    assert_eq!(hung.status, Outcome::Timeout);
    assert_eq!(hung.dependency_type, "fake");
    assert!(hung
        .message
        .as_deref()
        .is_some_and(|message| message.contains("awaiting fake dependency")));

    assert!(report.failure_categories.contains(&FailureCategory::Timeout));
    assert!(report.failure_categories.contains(&FailureCategory::Dependency));
}

#[tokio::test]
async fn test_one_server_error_in_ten_requests_is_partial() {
    let state = Arc::new(OrdersState::default());
    let mut registry = DiagnosticRegistry::new();
    for i in 0..9 {
        registry.register(list_scenario(&format!("orders.list.{i}"))).unwrap();
    }
    registry
        .register(ScenarioDefinition::l1(
            "orders.report",
            ScenarioStep::new("report", RequestTemplate::get("/boom")),
        ))
        .unwrap();

    let engine = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .router(orders_router(state.clone()))
        .build()
        .unwrap();
    let report = engine.run(admitted("ReadOnly")).await.unwrap();

    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.executive_summary.overall_coverage, 0.9);
    assert!(!report.executive_summary.migration_ready);
    assert_eq!(report.failure_categories, vec![FailureCategory::UnhandledException]);

    let endpoints = &report.diagnostics.endpoints;
    assert_eq!(endpoints.total, 10);
    assert_eq!(endpoints.passed, 9);
    assert_eq!(endpoints.failed, 1);
    assert_eq!(state.listed(), 9);

    let failed = endpoints
        .details
        .iter()
        .find(|detail| detail.id == "orders.report")
        .unwrap();
    assert_eq!(failed.http_status, Some(500));
}

#[tokio::test]
async fn test_hung_request_times_out_with_last_state() {
    let mut registry = DiagnosticRegistry::new();
    registry.register(list_scenario("orders.list")).unwrap();
    registry
        .register(
            ScenarioDefinition::l1("orders.slow", ScenarioStep::new("hang", RequestTemplate::get("/hang")))
                .with_timeout(Duration::from_millis(100)),
        )
        .unwrap();

    let engine = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .router(orders_router(Arc::new(OrdersState::default())))
        .build()
        .unwrap();

    let started = Instant::now();
    let report = engine.run(admitted("ReadOnly")).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    let slow = report
        .diagnostics
        .endpoints
        .details
        .iter()
        .find(|detail| detail.id == "orders.slow")
        .unwrap();
    assert_eq!(slow.outcome, Outcome::Timeout);
    assert_eq!(slow.category, Some(FailureCategory::Timeout));
    assert_eq!(
        slow.last_trace.as_deref(),
        Some("step 1 of 1 (hang): awaiting pipeline response")
    );
    assert_eq!(report.diagnostics.endpoints.timed_out, 1);
    assert_ne!(report.status, RunStatus::Pass);
}

#[tokio::test]
async fn test_suite_deadline_bounds_the_run() {
    let mut config = test_config();
    config.scheduler.suite_deadline_ms = 300;
    config.scheduler.default_unit_timeout_ms = 10_000;
    config.scheduler.cleanup_grace_ms = 100;
    config.scheduler.deadline_grace_ms = 200;

    let mut registry = DiagnosticRegistry::new();
    registry
        .register(ScenarioDefinition::l1(
            "orders.slow",
            ScenarioStep::new("hang", RequestTemplate::get("/hang")),
        ))
        .unwrap();

    let engine = DiagnosticsEngine::builder(config)
        .registry(registry)
        .router(orders_router(Arc::new(OrdersState::default())))
        .build()
        .unwrap();

    let started = Instant::now();
    let report = engine.run(admitted("ReadOnly")).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    let detail = &report.diagnostics.endpoints.details[0];
    assert_eq!(detail.outcome, Outcome::Timeout);
    assert!(detail.message.starts_with(SUITE_DEADLINE_MESSAGE));
}

#[tokio::test]
async fn test_full_mode_in_production_is_rejected_before_anything_runs() {
    let mut config = test_config();
    config.environment = "Prod".to_string();

    let probe = FakeCheck::new(Behavior::Pass);
    let calls = probe.calls();
    let mut registry = DiagnosticRegistry::new();
    registry
        .register(CheckDefinition::new("db.connectivity", "db", "postgres", Arc::new(probe)))
        .unwrap();

    let audit = Arc::new(MemoryAuditSink::new());
    let engine = DiagnosticsEngine::builder(config)
        .registry(registry)
        .audit_sink(audit.clone())
        .build()
        .unwrap();

    let rejection = engine.run(admitted("Full")).await.unwrap_err();
    assert_eq!(rejection.http_status(), 403);
    assert!(matches!(rejection.reason, GateRejection::ModeNotPermitted { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].decision, AuditDecision::Rejected);
    assert_eq!(records[0].run_id, rejection.run_id);

    // The same engine still serves SafeWrite in production
    let report = engine.run(admitted("SafeWrite")).await.unwrap();
    assert_eq!(report.status, RunStatus::Pass);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_read_only_never_runs_workflows() {
    let state = Arc::new(OrdersState::default());
    let mut registry = DiagnosticRegistry::new();
    registry.register(list_scenario("orders.list")).unwrap();
    registry.register(order_workflow("orders.lifecycle", false)).unwrap();

    let engine = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .router(orders_router(state.clone()))
        .build()
        .unwrap();

    let report = engine.run(admitted("ReadOnly")).await.unwrap();
    assert!(report.workflows.is_empty());
    assert_eq!(report.diagnostics.endpoints.total, 1);
    assert_eq!(state.created(), 0);
    assert_eq!(report.status, RunStatus::Pass);

    let report = engine.run(admitted("SafeWrite")).await.unwrap();
    assert_eq!(report.workflows.len(), 1);
    assert_eq!(report.workflows[0].status, Outcome::Pass);
    assert!(report.executive_summary.critical_workflows_pass);
    assert_eq!(state.created(), 1);
    assert_eq!(state.deleted(), 1);
}

#[tokio::test]
async fn test_failed_workflow_step_still_cleans_up_once() {
    let state = Arc::new(OrdersState::default());
    let mut registry = DiagnosticRegistry::new();
    registry.register(order_workflow("orders.settlement", true)).unwrap();

    let engine = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .router(orders_router(state.clone()))
        .build()
        .unwrap();
    let report = engine.run(admitted("SafeWrite")).await.unwrap();

    assert_eq!(state.created(), 1);
    assert_eq!(state.deleted(), 1);

    assert_eq!(report.status, RunStatus::Fail);
    assert!(!report.executive_summary.critical_workflows_pass);
    let workflow = &report.workflows[0];
    assert_eq!(workflow.status, Outcome::Fail);
    assert_eq!(workflow.category, Some(FailureCategory::UnhandledException));

    let steps: Vec<(&str, Outcome)> = workflow
        .steps
        .iter()
        .map(|step| (step.name.as_str(), step.outcome))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("create", Outcome::Pass),
            ("settle", Outcome::Fail),
            ("delete", Outcome::Pass),
        ]
    );
}

#[tokio::test]
async fn test_timed_out_workflow_step_still_cleans_up_once() {
    let state = Arc::new(OrdersState::default());
    let mut registry = DiagnosticRegistry::new();
    registry
        .register(
            order_workflow_through(
                "orders.stalled",
                Some(ScenarioStep::new("stall", RequestTemplate::get("/hang"))),
            )
            .with_timeout(Duration::from_millis(150)),
        )
        .unwrap();

    let engine = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .router(orders_router(state.clone()))
        .build()
        .unwrap();
    let report = engine.run(admitted("SafeWrite")).await.unwrap();

    assert_eq!(state.created(), 1);
    assert_eq!(state.deleted(), 1);

    let workflow = &report.workflows[0];
    assert_eq!(workflow.status, Outcome::Timeout);
    assert_eq!(workflow.category, Some(FailureCategory::Timeout));
    let names: Vec<&str> = workflow.steps.iter().map(|step| step.name.as_str()).collect();
    assert_eq!(names.first(), Some(&"create"));
    assert_eq!(names.last(), Some(&"delete"));
    assert_eq!(names.iter().filter(|name| **name == "delete").count(), 1);
}

#[tokio::test]
async fn test_second_run_for_a_busy_tenant_is_refused() {
    let mut registry = DiagnosticRegistry::new();
    registry.register(check("db.connectivity", Behavior::Pass)).unwrap();
    let engine = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .build()
        .unwrap();

    let lease = engine.leases().acquire("tenant-a", Uuid::new_v4()).unwrap();

    let rejection = engine
        .run(admitted("ReadOnly").tenant("tenant-a"))
        .await
        .unwrap_err();
    assert_eq!(rejection.http_status(), 409);
    assert_eq!(rejection.reason, GateRejection::TenantBusy("tenant-a".to_string()));

    // Other tenants are unaffected
    assert!(engine.run(admitted("ReadOnly").tenant("tenant-b")).await.is_ok());

    drop(lease);
    assert!(engine.run(admitted("ReadOnly").tenant("tenant-a")).await.is_ok());
    assert!(!engine.leases().is_leased("tenant-a"));
}

#[tokio::test]
async fn test_structural_dependency_failure_skips_scenarios() {
    let state = Arc::new(OrdersState::default());
    let mut catalog = ServiceCatalog::new();
    catalog.register(
        ServiceDescriptor::new("OrdersHandler", ServiceLifetime::Scoped)
            .handler()
            .depends_on(DependencySpec::required("OrderRepository")),
    );

    let mut registry = DiagnosticRegistry::new();
    registry.register(check("db.connectivity", Behavior::Pass)).unwrap();
    registry.register(list_scenario("orders.list")).unwrap();

    let engine = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .router(orders_router(state.clone()))
        .container(Arc::new(catalog))
        .build()
        .unwrap();
    let report = engine.run(admitted("ReadOnly")).await.unwrap();

    assert_eq!(report.status, RunStatus::Fail);
    let di = &report.diagnostics.di_container;
    assert_eq!(di.status, Outcome::Fail);
    assert!(di
        .errors
        .iter()
        .any(|error| error == "'OrdersHandler' depends on 'OrderRepository', which is not registered"));

    // L0 still ran, L1 did not
    assert_eq!(report.diagnostics.dependencies.len(), 1);
    assert_eq!(report.diagnostics.endpoints.total, 0);
    assert_eq!(state.listed(), 0);
}

#[tokio::test]
async fn test_hung_activation_is_bounded_by_the_suite_deadline() {
    let mut config = test_config();
    config.scheduler.suite_deadline_ms = 300;
    config.scheduler.cleanup_grace_ms = 100;
    config.scheduler.deadline_grace_ms = 200;

    let mut catalog = ServiceCatalog::new();
    catalog.register_with(
        ServiceDescriptor::new("OutboxRelay", ServiceLifetime::Singleton).background_service(),
        || {
            std::thread::sleep(Duration::from_secs(2));
            Ok(())
        },
    );

    let mut registry = DiagnosticRegistry::new();
    registry.register(check("db.connectivity", Behavior::Pass)).unwrap();

    let engine = DiagnosticsEngine::builder(config)
        .registry(registry)
        .container(Arc::new(catalog))
        .build()
        .unwrap();

    let started = Instant::now();
    let report = engine.run(admitted("ReadOnly")).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(1500));

    assert_eq!(report.status, RunStatus::Fail);
    let di = &report.diagnostics.di_container;
    assert_eq!(di.status, Outcome::Fail);
    assert_eq!(di.errors, vec![VALIDATION_DEADLINE_MESSAGE.to_string()]);
    assert_eq!(report.diagnostics.dependencies.len(), 1);
}

#[tokio::test]
async fn test_dependency_failure_short_circuit_is_opt_in() {
    let state = Arc::new(OrdersState::default());
    let registry = || {
        let mut registry = DiagnosticRegistry::new();
        registry.register(check("db.connectivity", Behavior::Fail)).unwrap();
        registry.register(list_scenario("orders.list")).unwrap();
        registry
    };

    let engine = DiagnosticsEngine::builder(test_config())
        .registry(registry())
        .router(orders_router(state.clone()))
        .build()
        .unwrap();
    let report = engine.run(admitted("ReadOnly")).await.unwrap();
    assert_eq!(report.diagnostics.endpoints.total, 1);
    assert_eq!(report.status, RunStatus::Fail);

    let mut config = test_config();
    config.engine.short_circuit_on_dependency_failure = true;
    let engine = DiagnosticsEngine::builder(config)
        .registry(registry())
        .router(orders_router(state.clone()))
        .build()
        .unwrap();
    let report = engine.run(admitted("ReadOnly")).await.unwrap();
    assert_eq!(report.diagnostics.endpoints.total, 0);
    assert_eq!(state.listed(), 1);
}

#[tokio::test]
async fn test_every_invocation_is_audited_once() {
    let audit = Arc::new(MemoryAuditSink::new());
    let mut registry = DiagnosticRegistry::new();
    registry.register(check("db.connectivity", Behavior::Pass)).unwrap();
    let engine = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .audit_sink(audit.clone())
        .build()
        .unwrap();

    let report = engine
        .run(admitted("ReadOnly").tenant("tenant-a").correlation_id("corr-1"))
        .await
        .unwrap();
    let rejection = engine
        .run(admitted("ReadOnly").credential("wrong"))
        .await
        .unwrap_err();
    assert_eq!(rejection.reason, GateRejection::Unauthorized);

    let records = audit.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].decision, AuditDecision::Admitted);
    assert_eq!(records[0].run_id, report.run_id);
    assert_eq!(records[0].tenant_id, "tenant-a");
    assert_eq!(records[0].correlation_id.as_deref(), Some("corr-1"));
    assert_eq!(records[0].result, "PASS");
    assert_eq!(records[1].decision, AuditDecision::Rejected);
    assert_eq!(records[1].tenant_id, "default");
}

#[tokio::test]
async fn test_snapshot_mismatch_flags_contract_without_failing() {
    let mut registry = DiagnosticRegistry::new();
    registry
        .register(
            ScenarioDefinition::l1(
                "orders.get",
                ScenarioStep::new("get", RequestTemplate::get("/orders/ord-1")),
            )
            .with_snapshot(json!({"id": "ord-1", "currency": "EUR", "total": 42})),
        )
        .unwrap();

    let engine = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .router(orders_router(Arc::new(OrdersState::default())))
        .build()
        .unwrap();
    let report = engine.run(admitted("ReadOnly")).await.unwrap();

    assert_eq!(report.status, RunStatus::Pass);
    assert!(!report.executive_summary.migration_ready);
    assert_eq!(report.failure_categories, vec![FailureCategory::ContractMismatch]);

    let detail = &report.diagnostics.endpoints.details[0];
    assert_eq!(detail.outcome, Outcome::Pass);
    assert_eq!(detail.contract_mismatches.len(), 1);
    assert_eq!(detail.contract_mismatches[0].path, "/currency");
}

struct InventoryPlugin;

impl DiagnosticPlugin for InventoryPlugin {
    fn name(&self) -> &str {
        "inventory"
    }

    fn register(&self, registry: &mut DiagnosticRegistry) -> Result<(), RegistryError> {
        registry.register(check("inventory.db", Behavior::Pass))
    }
}

#[tokio::test]
async fn test_plugins_contribute_definitions() {
    let engine = DiagnosticsEngine::builder(test_config())
        .plugin(InventoryPlugin)
        .build()
        .unwrap();
    assert!(engine.registry().get("inventory.db").is_some());

    let report = engine.run(admitted("ReadOnly")).await.unwrap();
    assert_eq!(report.diagnostics.dependencies[0].name, "inventory.db");
    assert_eq!(report.diagnostics.dependencies[0].status, Outcome::Pass);
}

#[test]
fn test_assembly_errors() {
    let mut registry = DiagnosticRegistry::new();
    registry.register(check("inventory.db", Behavior::Pass)).unwrap();
    let duplicate = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .plugin(InventoryPlugin)
        .build();
    assert!(matches!(
        duplicate,
        Err(DiagnosticsError::Registry(RegistryError::DuplicateIdentifier(_)))
    ));

    let mut registry = DiagnosticRegistry::new();
    registry.register(list_scenario("orders.list")).unwrap();
    let no_pipeline = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .build();
    assert!(matches!(no_pipeline, Err(DiagnosticsError::Assembly(_))));

    let no_credentials = DiagnosticsEngine::builder(Default::default()).build();
    assert!(matches!(no_credentials, Err(DiagnosticsError::Configuration(_))));
}

#[tokio::test]
async fn test_results_are_partitioned_by_layer() {
    let mut registry = DiagnosticRegistry::new();
    registry.register(check("db.connectivity", Behavior::Pass)).unwrap();
    registry.register(list_scenario("orders.list")).unwrap();
    registry.register(order_workflow("orders.lifecycle", false)).unwrap();

    let engine = DiagnosticsEngine::builder(test_config())
        .registry(registry)
        .router(orders_router(Arc::new(OrdersState::default())))
        .build()
        .unwrap();
    let report = engine.run(admitted("SafeWrite")).await.unwrap();

    assert_eq!(report.status, RunStatus::Pass);
    assert!(report.executive_summary.migration_ready);
    assert_eq!(report.executive_summary.overall_coverage, 1.0);
    assert_eq!(report.diagnostics.dependencies.len(), 1);
    assert!(report
        .diagnostics
        .endpoints
        .details
        .iter()
        .all(|detail| detail.layer == Layer::L1));
    assert_eq!(report.workflows[0].name, "orders.lifecycle");
    assert!(report.workflows[0].steps.is_empty());
}
