//! # Structured Logging Module
//!
//! Environment-aware structured logging. Production environments get JSON
//! lines; everything else gets human-readable output. Host services that
//! already installed a global subscriber keep theirs.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ConfigManager;
use crate::constants::{Layer as ProbeLayer, Outcome};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_log_level(&environment)));

        let json_output = is_production(&environment);
        let console = if json_output {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            json_output = json_output,
            "Structured logging initialized"
        );
    });
}

fn is_production(environment: &str) -> bool {
    matches!(environment, "production" | "prod")
}

fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" | "prod" => "info",
        "test" => "debug",
        _ => "debug",
    }
}

/// Log one unit lifecycle event with uniform fields
pub fn log_unit_operation(
    operation: &str,
    run_id: &str,
    unit_id: &str,
    layer: ProbeLayer,
    outcome: Option<Outcome>,
    latency_ms: Option<u64>,
) {
    tracing::info!(
        operation = %operation,
        run_id = %run_id,
        unit_id = %unit_id,
        layer = %layer,
        outcome = outcome.map(|o| o.to_string()),
        latency_ms = latency_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "UNIT_OPERATION"
    );
}
