#![allow(dead_code)]

//! Shared fixtures: a scriptable dependency probe, an in-process orders API
//! to replay scenarios against, and a valid test configuration.

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use diagnostics_core::config::DiagnosticsConfig;
use diagnostics_core::context::RunContext;
use diagnostics_core::engine::RunRequest;
use diagnostics_core::pipeline::request::{
    FieldType, RequestTemplate, ScenarioStep, StatusExpectation,
};
use diagnostics_core::probes::{DependencyCheck, ProbeFailure};
use diagnostics_core::registry::{CheckDefinition, ScenarioDefinition};
use diagnostics_core::scheduler::UnitScope;

pub const TOKEN: &str = "test-token";
pub const INTENT: &str = "run-diagnostics";
pub const ORDER_ID: &str = "ord-1";

/// Configuration that passes validation, with short timings
pub fn test_config() -> DiagnosticsConfig {
    let mut config = DiagnosticsConfig::default();
    config.application_id = "orders-api".to_string();
    config.environment = "staging".to_string();
    config.auth.bearer_tokens = vec![TOKEN.to_string()];
    config.scheduler.max_parallelism = 4;
    config.scheduler.suite_deadline_ms = 3_000;
    config.scheduler.default_unit_timeout_ms = 1_000;
    config.scheduler.cleanup_grace_ms = 500;
    config.scheduler.deadline_grace_ms = 500;
    config
}

/// An authenticated, intent-marked request for `mode`
pub fn admitted(mode: &str) -> RunRequest {
    RunRequest::new().credential(TOKEN).intent(INTENT).mode(mode)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Pass,
    Fail,
    Hang,
}

/// Probe with a fixed behavior that counts its invocations
pub struct FakeCheck {
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

impl FakeCheck {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl DependencyCheck for FakeCheck {
    async fn probe(&self, _ctx: &RunContext, scope: &UnitScope) -> Result<String, ProbeFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        scope.mark("awaiting fake dependency");
        match self.behavior {
            Behavior::Pass => Ok("reachable".to_string()),
            Behavior::Fail => Err(ProbeFailure::dependency("connection refused")),
            Behavior::Hang => {
                futures::future::pending::<()>().await;
                Ok("unreachable".to_string())
            }
        }
    }
}

pub fn check(id: &str, behavior: Behavior) -> CheckDefinition {
    CheckDefinition::new(id, id, "fake", Arc::new(FakeCheck::new(behavior)))
}

/// Request counters of the orders API
#[derive(Debug, Default)]
pub struct OrdersState {
    pub created: AtomicUsize,
    pub deleted: AtomicUsize,
    pub listed: AtomicUsize,
}

impl OrdersState {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> usize {
        self.deleted.load(Ordering::SeqCst)
    }

    pub fn listed(&self) -> usize {
        self.listed.load(Ordering::SeqCst)
    }
}

/// A small orders API standing in for the host service
pub fn orders_router(state: Arc<OrdersState>) -> Router {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order).delete(delete_order))
        .route("/orders/:id/fail", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/boom", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route(
            "/hang",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                StatusCode::OK
            }),
        )
        .with_state(state)
}

async fn list_orders(State(state): State<Arc<OrdersState>>) -> Json<Value> {
    state.listed.fetch_add(1, Ordering::SeqCst);
    Json(json!({"orders": [{"id": ORDER_ID, "currency": "USD"}]}))
}

async fn create_order(
    State(state): State<Arc<OrdersState>>,
    Json(_body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.created.fetch_add(1, Ordering::SeqCst);
    (StatusCode::CREATED, Json(json!({"id": ORDER_ID})))
}

async fn get_order(Path(id): Path<String>) -> Json<Value> {
    Json(json!({"id": id, "currency": "USD", "total": 42}))
}

async fn delete_order(
    State(state): State<Arc<OrdersState>>,
    Path(_id): Path<String>,
) -> StatusCode {
    state.deleted.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

pub fn list_scenario(id: &str) -> ScenarioDefinition {
    ScenarioDefinition::l1(id, ScenarioStep::new("list", RequestTemplate::get("/orders")))
}

/// Create, optionally fail, then read back; deletes what it created
pub fn order_workflow(id: &str, fail_midway: bool) -> ScenarioDefinition {
    let settle = fail_midway
        .then(|| ScenarioStep::new("settle", RequestTemplate::get("/orders/{{order_id}}/fail")));
    order_workflow_through(id, settle)
}

/// Create, run `middle` if given, then read back; deletes what it created
pub fn order_workflow_through(id: &str, middle: Option<ScenarioStep>) -> ScenarioDefinition {
    let mut steps = vec![ScenarioStep::new(
        "create",
        RequestTemplate::post("/orders", json!({"sku": "A-1", "tenant": "{{tenant_id}}"})),
    )
    .expect_status(StatusExpectation::Exact(201))
    .capture("order_id", "/id")];
    steps.extend(middle);
    steps.push(ScenarioStep::new(
        "fetch",
        RequestTemplate::get("/orders/{{order_id}}"),
    ));

    ScenarioDefinition::workflow(id, steps)
        .with_post_condition(
            ScenarioStep::new("retrievable", RequestTemplate::get("/orders/{{order_id}}"))
                .expect_field("/id", FieldType::String)
                .expect_field("/total", FieldType::Number),
        )
        .with_cleanup(
            ScenarioStep::new("delete", RequestTemplate::delete("/orders/{{order_id}}"))
                .expect_status(StatusExpectation::Exact(204)),
        )
}
