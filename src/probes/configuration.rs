//! Required configuration keys probe.
//!
//! Reports only key names. Values are never read into results.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{DependencyCheck, ProbeFailure};
use crate::context::RunContext;
use crate::scheduler::UnitScope;

/// "Enumerate known keys and whether each resolves to a value"
pub trait ConfigurationProvider: Send + Sync {
    fn known_keys(&self) -> Vec<String>;

    fn resolves(&self, key: &str) -> bool;
}

/// Flat key → value map, e.g. built from a host's settings at startup
#[derive(Debug, Clone, Default)]
pub struct StaticConfiguration {
    values: BTreeMap<String, Option<String>>,
}

impl StaticConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), Some(value.into()));
        self
    }

    /// A key the host knows about that has no value
    pub fn with_unset(mut self, key: impl Into<String>) -> Self {
        self.values.insert(key.into(), None);
        self
    }
}

impl ConfigurationProvider for StaticConfiguration {
    fn known_keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn resolves(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(Some(value)) if !value.is_empty())
    }
}

/// Layered `config` crate sources, with dotted key paths
impl ConfigurationProvider for config::Config {
    fn known_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Ok(root) = self.clone().try_deserialize::<Value>() {
            flatten_keys(&root, "", &mut keys);
        }
        keys
    }

    fn resolves(&self, key: &str) -> bool {
        match self.get::<Value>(key) {
            Ok(Value::Null) | Err(_) => false,
            Ok(Value::String(s)) => !s.is_empty(),
            Ok(_) => true,
        }
    }
}

fn flatten_keys(value: &Value, prefix: &str, keys: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_keys(child, &path, keys);
            }
        }
        _ if !prefix.is_empty() => keys.push(prefix.to_string()),
        _ => {}
    }
}

pub struct RequiredKeysProbe {
    provider: Arc<dyn ConfigurationProvider>,
    required: Vec<String>,
}

impl RequiredKeysProbe {
    pub fn new(provider: Arc<dyn ConfigurationProvider>, required: Vec<String>) -> Self {
        Self { provider, required }
    }
}

#[async_trait]
impl DependencyCheck for RequiredKeysProbe {
    async fn probe(&self, _ctx: &RunContext, scope: &UnitScope) -> Result<String, ProbeFailure> {
        scope.mark("resolving required configuration keys");
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|key| !self.provider.resolves(key))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(format!("{} required keys resolved", self.required.len()))
        } else {
            Err(ProbeFailure::configuration_missing(format!(
                "unresolved configuration keys: {}",
                missing.join(", ")
            )))
        }
    }
}
