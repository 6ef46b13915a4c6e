//! # Web Application State

use std::sync::Arc;

use crate::engine::DiagnosticsEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DiagnosticsEngine>,
}

impl AppState {
    pub fn new(engine: Arc<DiagnosticsEngine>) -> Self {
        Self { engine }
    }
}
