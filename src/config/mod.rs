//! # Diagnostics Configuration
//!
//! Typed configuration for the diagnostics engine. Every section carries
//! defaults so a host service can embed the engine with no file at all and
//! override individual values through the environment.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use diagnostics_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let deadline = manager.config().scheduler.suite_deadline();
//! let parallelism = manager.config().scheduler.max_parallelism;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::constants::RunMode;
use crate::snapshot::MismatchSeverity;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Identifier of the host application, echoed in every report
    pub application_id: String,

    /// Environment tag of the running instance (e.g. `production`, `staging`)
    pub environment: String,

    pub scheduler: SchedulerConfig,
    pub scoring: ScoringConfig,
    pub snapshot: SnapshotConfig,
    pub gate: GateConfig,
    pub auth: AuthConfig,
    pub activation: ActivationConfig,
    pub engine: EngineConfig,
    pub web: WebConfig,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            application_id: "unknown-application".to_string(),
            environment: "development".to_string(),
            scheduler: SchedulerConfig::default(),
            scoring: ScoringConfig::default(),
            snapshot: SnapshotConfig::default(),
            gate: GateConfig::default(),
            auth: AuthConfig::default(),
            activation: ActivationConfig::default(),
            engine: EngineConfig::default(),
            web: WebConfig::default(),
        }
    }
}

/// Bounded-concurrency scheduler settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_parallelism: usize,
    pub suite_deadline_ms: u64,
    pub default_unit_timeout_ms: u64,
    /// Non-cancelable window granted to each cleanup step
    pub cleanup_grace_ms: u64,
    /// How long after the suite deadline the scheduler waits for cancelled
    /// units (and their cleanup) before abandoning them
    pub deadline_grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 8,
            suite_deadline_ms: 30_000,
            default_unit_timeout_ms: 5_000,
            cleanup_grace_ms: 2_000,
            deadline_grace_ms: 3_000,
        }
    }
}

impl SchedulerConfig {
    pub fn suite_deadline(&self) -> Duration {
        Duration::from_millis(self.suite_deadline_ms)
    }

    pub fn default_unit_timeout(&self) -> Duration {
        Duration::from_millis(self.default_unit_timeout_ms)
    }

    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_millis(self.cleanup_grace_ms)
    }

    pub fn deadline_grace(&self) -> Duration {
        Duration::from_millis(self.deadline_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// L1 pass rate below which the run is `PARTIAL`
    pub l1_pass_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            l1_pass_threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub severity: MismatchSeverity,
    pub mask_timestamps: bool,
}

/// Mode/tenant gate policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    pub intent_header: String,
    pub intent_value: String,
    pub production_environments: Vec<String>,
    pub allow_full_in_production: bool,
    pub allow_full_outside_production: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            intent_header: "x-diagnostics-intent".to_string(),
            intent_value: "run-diagnostics".to_string(),
            production_environments: vec!["production".to_string(), "prod".to_string()],
            allow_full_in_production: false,
            allow_full_outside_production: true,
        }
    }
}

impl GateConfig {
    pub fn is_production(&self, environment: &str) -> bool {
        self.production_environments
            .iter()
            .any(|env| env.eq_ignore_ascii_case(environment))
    }

    /// Whether `mode` may run in `environment` under this policy
    pub fn permits(&self, mode: RunMode, environment: &str) -> bool {
        match mode {
            RunMode::ReadOnly | RunMode::SafeWrite => true,
            RunMode::Full if self.is_production(environment) => self.allow_full_in_production,
            RunMode::Full => self.allow_full_outside_production,
        }
    }
}

/// Caller and replay credentials. Values are never logged.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub bearer_tokens: Vec<String>,
    /// Bearer credential attached to replayed pipeline requests
    pub diagnostic_credential: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bearer_tokens: Vec::new(),
            diagnostic_credential: None,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("enabled", &self.enabled)
            .field("bearer_tokens", &format!("[{} MASKED]", self.bearer_tokens.len()))
            .field(
                "diagnostic_credential",
                &self.diagnostic_credential.as_ref().map(|_| "[MASKED]"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// Services that must activate in addition to handlers and background services
    pub critical_services: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Skip L1/L2 when any L0 check did not pass
    pub short_circuit_on_dependency_failure: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    pub route: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            route: "/diagnostics/run".to_string(),
        }
    }
}

impl DiagnosticsConfig {
    /// Reject settings the engine cannot honor
    pub fn validate(&self) -> ConfigResult<()> {
        let scheduler = &self.scheduler;
        if scheduler.max_parallelism == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_parallelism",
                scheduler.max_parallelism,
                "must be at least 1",
            ));
        }
        if scheduler.suite_deadline_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.suite_deadline_ms",
                scheduler.suite_deadline_ms,
                "must be greater than zero",
            ));
        }
        if scheduler.default_unit_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.default_unit_timeout_ms",
                scheduler.default_unit_timeout_ms,
                "must be greater than zero",
            ));
        }
        if scheduler.deadline_grace_ms < scheduler.cleanup_grace_ms {
            return Err(ConfigurationError::invalid_value(
                "scheduler.deadline_grace_ms",
                scheduler.deadline_grace_ms,
                "must not be shorter than scheduler.cleanup_grace_ms",
            ));
        }
        let threshold = self.scoring.l1_pass_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigurationError::invalid_value(
                "scoring.l1_pass_threshold",
                threshold,
                "must be within [0, 1]",
            ));
        }
        if self.gate.intent_header.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "gate.intent_header",
                "\"\"",
                "must name a header",
            ));
        }
        if self.auth.enabled && self.auth.bearer_tokens.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "auth.bearer_tokens",
                "[]",
                "authentication is enabled but no credentials are configured",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> DiagnosticsConfig {
        let mut config = DiagnosticsConfig::default();
        config.auth.bearer_tokens = vec!["token".to_string()];
        config
    }

    #[test]
    fn test_defaults_are_valid_once_credentials_exist() {
        assert!(valid_config().validate().is_ok());
        assert!(DiagnosticsConfig::default().validate().is_err());
    }

    #[test]
    fn test_deadline_grace_must_cover_cleanup() {
        let mut config = valid_config();
        config.scheduler.cleanup_grace_ms = 5_000;
        config.scheduler.deadline_grace_ms = 1_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { field, .. }) if field == "scheduler.deadline_grace_ms"
        ));
    }

    #[test]
    fn test_threshold_bounds() {
        let mut config = valid_config();
        config.scoring.l1_pass_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_full_mode_policy() {
        let gate = GateConfig::default();
        assert!(!gate.permits(RunMode::Full, "Prod"));
        assert!(!gate.permits(RunMode::Full, "production"));
        assert!(gate.permits(RunMode::Full, "staging"));
        assert!(gate.permits(RunMode::SafeWrite, "production"));
    }

    #[test]
    fn test_auth_debug_masks_tokens() {
        let mut auth = AuthConfig::default();
        auth.bearer_tokens = vec!["super-secret".to_string()];
        auth.diagnostic_credential = Some("replay-secret".to_string());
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("replay-secret"));
    }
}
