//! # Web API
//!
//! The single protected diagnostics endpoint, for hosts to merge into their
//! own router.

pub mod auth;
pub mod errors;
pub mod handlers;
pub mod state;

use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::engine::DiagnosticsEngine;
use state::AppState;

/// Router serving `POST {web.route}`
pub fn create_app(engine: Arc<DiagnosticsEngine>) -> Router {
    let route = engine.config().web.route.clone();
    Router::new()
        .route(&route, post(handlers::diagnostics::run_diagnostics))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(engine))
}
