#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Diagnostics Core
//!
//! An in-process diagnostics engine. On one protected invocation it validates
//! the host service's dependency wiring, probes its external dependencies,
//! replays business-critical requests through the real request pipeline and
//! reduces everything to one deterministic readiness report.
//!
//! ## Architecture
//!
//! ```text
//! gate -> registry -> scheduler (L0, then L1/L2) -> collector -> scoring -> report
//!                      |-- graph validator (alongside L0)
//! ```
//!
//! - **L0** dependency checks: connectivity plus one minimal behavioral probe
//!   per dependency, through the dependency's own client.
//! - **L1** single idempotent requests and **L2** multi-step workflows, both
//!   replayed through the host's router, never by calling handlers directly.
//!
//! ## Module Organization
//!
//! - [`registry`] - Check and scenario definitions, plugin discovery
//! - [`validation`] - Structural and activation checks of the DI graph
//! - [`probes`] - L0 dependency probes
//! - [`pipeline`] - L1/L2 scenario replay through the request pipeline
//! - [`scheduler`] - Bounded-parallel execution with timeouts and cleanup
//! - [`scoring`] - The verdict rule table
//! - [`snapshot`] - JSON canonicalization and structural diff
//! - [`report`] - The readiness report schema
//! - [`gate`] - Mode/tenant admission and tenant leases
//! - [`engine`] - Orchestration of one invocation
//! - [`web`] - The protected HTTP endpoint
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use diagnostics_core::config::ConfigManager;
//! use diagnostics_core::engine::DiagnosticsEngine;
//! use diagnostics_core::registry::DiagnosticRegistry;
//!
//! # fn example(app: axum::Router) -> Result<(), Box<dyn std::error::Error>> {
//! diagnostics_core::logging::init_structured_logging();
//! let manager = ConfigManager::load()?;
//!
//! let engine = DiagnosticsEngine::builder(manager.config().clone())
//!     .registry(DiagnosticRegistry::new())
//!     .router(app.clone())
//!     .build()?;
//!
//! let app = app.merge(diagnostics_core::web::create_app(Arc::new(engine)));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod constants;
pub mod context;
pub mod engine;
pub mod error;
pub mod gate;
pub mod logging;
pub mod pipeline;
pub mod probes;
pub mod registry;
pub mod report;
pub mod results;
pub mod scheduler;
pub mod scoring;
pub mod snapshot;
pub mod validation;
pub mod web;

pub use config::{ConfigManager, DiagnosticsConfig};
pub use constants::{FailureCategory, Layer, Outcome, RunMode, RunStatus};
pub use context::RunContext;
pub use engine::{DiagnosticsEngine, DiagnosticsEngineBuilder, RunRejection, RunRequest};
pub use error::{DiagnosticsError, Result};
pub use registry::{CheckDefinition, DiagnosticPlugin, DiagnosticRegistry, ScenarioDefinition};
pub use report::Report;
pub use results::ExecutionResult;
