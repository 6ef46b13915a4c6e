//! Configuration Loader
//!
//! Layers an optional configuration file under environment overrides using
//! the `config` crate, validates the result and logs a sanitized copy.

use config::{Config, Environment, File};
use serde_json::Value;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::DiagnosticsConfig;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_VAR: &str = "DIAGNOSTICS_CONFIG_PATH";

/// Prefix for environment overrides, e.g. `DIAGNOSTICS__SCHEDULER__MAX_PARALLELISM`
pub const ENV_PREFIX: &str = "DIAGNOSTICS";

const LIST_KEYS: [&str; 3] = [
    "auth.bearer_tokens",
    "activation.critical_services",
    "gate.production_environments",
];

const SENSITIVE_PATTERNS: [&str; 5] = ["password", "secret", "token", "credential", "key"];

pub struct ConfigManager {
    config: DiagnosticsConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from `DIAGNOSTICS_CONFIG_PATH` (if set) plus
    /// environment overrides
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let path = env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load configuration from an explicit file plus environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from(Some(path.as_ref()))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: DiagnosticsConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            source: None,
        }))
    }

    fn load_from(path: Option<&Path>) -> ConfigResult<Arc<ConfigManager>> {
        let mut builder =
            Config::builder().set_default("environment", Self::detect_environment())?;

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigurationError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            debug!(path = %path.display(), "Loading diagnostics configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }

        let mut environment = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }
        builder = builder.add_source(environment);

        let config: DiagnosticsConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        let manager = ConfigManager {
            config,
            source: path.map(Path::to_path_buf),
        };

        debug!(
            config = %manager.debug_config(),
            "Diagnostics configuration resolved"
        );
        info!(
            application_id = %manager.config.application_id,
            environment = %manager.config.environment,
            max_parallelism = manager.config.scheduler.max_parallelism,
            suite_deadline_ms = manager.config.scheduler.suite_deadline_ms,
            "Diagnostics configuration loaded"
        );

        Ok(Arc::new(manager))
    }

    pub fn config(&self) -> &DiagnosticsConfig {
        &self.config
    }

    /// File the configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Configuration as JSON with sensitive values masked
    pub fn debug_config(&self) -> Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or(Value::Null);
        sanitize_json_recursive(&mut value);
        value
    }

    /// Environment tag from `DIAGNOSTICS_ENV` / `APP_ENV`, defaulting to development
    pub fn detect_environment() -> String {
        env::var("DIAGNOSTICS_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}

fn sanitize_json_recursive(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let sensitive = SENSITIVE_PATTERNS
                    .iter()
                    .any(|pattern| key_lower.contains(pattern));
                if sensitive && !child.is_null() {
                    *child = Value::String("[MASKED]".to_string());
                } else {
                    sanitize_json_recursive(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_json_recursive),
        _ => {}
    }
}
