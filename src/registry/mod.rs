//! # Diagnostic Registry
//!
//! Holds every check and scenario definition keyed by a stable identifier.
//!
//! ## Overview
//!
//! Definitions are validated as they are registered, either directly or
//! through a [`DiagnosticPlugin`]. Once the engine is built the registry is
//! wrapped in an `Arc` and only read: nothing executed during a run can add,
//! replace or remove a definition.
//!
//! ## Usage
//!
//! ```rust
//! use diagnostics_core::constants::{Layer, RunMode};
//! use diagnostics_core::pipeline::request::{RequestTemplate, ScenarioStep};
//! use diagnostics_core::registry::{DiagnosticRegistry, ScenarioDefinition};
//!
//! let mut registry = DiagnosticRegistry::new();
//! registry
//!     .register(ScenarioDefinition::l1(
//!         "orders.list",
//!         ScenarioStep::new("list", RequestTemplate::get("/orders")),
//!     ))
//!     .unwrap();
//!
//! assert_eq!(registry.list_for(RunMode::ReadOnly, Layer::L1).len(), 1);
//! assert!(registry.list_for(RunMode::ReadOnly, Layer::L2).is_empty());
//! ```

pub mod definitions;
pub mod plugin;

pub use definitions::{CheckDefinition, Definition, ScenarioDefinition};
pub use plugin::DiagnosticPlugin;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::constants::{Layer, RunMode};
use crate::pipeline::request::{ScenarioStep, BUILTIN_PLACEHOLDERS};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate identifier: '{0}' is already registered")]
    DuplicateIdentifier(String),

    #[error("Invalid definition '{id}': {reason}")]
    InvalidDefinition { id: String, reason: String },
}

impl RegistryError {
    fn invalid(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Definitions keyed by identifier. Iteration order is the identifier order,
/// which makes every listing deterministic.
#[derive(Debug, Default)]
pub struct DiagnosticRegistry {
    definitions: BTreeMap<String, Definition>,
}

impl DiagnosticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a definition
    pub fn register(&mut self, definition: impl Into<Definition>) -> Result<(), RegistryError> {
        let definition = definition.into();
        let id = definition.id().to_string();

        if self.definitions.contains_key(&id) {
            return Err(RegistryError::DuplicateIdentifier(id));
        }
        validate_definition(&definition)?;

        debug!(
            definition_id = %id,
            layer = %definition.layer(),
            min_mode = %definition.min_mode(),
            "Registered diagnostic definition"
        );
        self.definitions.insert(id, definition);
        Ok(())
    }

    /// Let a plugin contribute its definitions
    pub fn install(&mut self, plugin: &dyn DiagnosticPlugin) -> Result<(), RegistryError> {
        let before = self.definitions.len();
        plugin.register(self)?;
        info!(
            plugin = plugin.name(),
            definitions = self.definitions.len() - before,
            "Installed diagnostic plugin"
        );
        Ok(())
    }

    /// Definitions of `layer` eligible under `mode`, in identifier order
    pub fn list_for(&self, mode: RunMode, layer: Layer) -> Vec<&Definition> {
        self.definitions
            .values()
            .filter(|definition| definition.layer() == layer && definition.eligible_for(mode))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Definition> {
        self.definitions.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn validate_definition(definition: &Definition) -> Result<(), RegistryError> {
    let id = definition.id();
    if id.trim().is_empty() {
        return Err(RegistryError::invalid(id, "identifier must not be empty"));
    }
    if definition.timeout() == Some(Duration::ZERO) {
        return Err(RegistryError::invalid(id, "timeout must be greater than zero"));
    }

    match definition {
        Definition::Check(check) => {
            if check.dependency.trim().is_empty() {
                return Err(RegistryError::invalid(id, "dependency name must not be empty"));
            }
            Ok(())
        }
        Definition::Scenario(scenario) => {
            match scenario.layer {
                Layer::L0 => {
                    return Err(RegistryError::invalid(
                        id,
                        "scenarios run at L1 or L2; use a check definition for L0",
                    ))
                }
                Layer::L1 if scenario.steps.len() != 1 => {
                    return Err(RegistryError::invalid(
                        id,
                        format!("L1 scenarios have exactly one step, found {}", scenario.steps.len()),
                    ))
                }
                Layer::L2 if scenario.steps.is_empty() => {
                    return Err(RegistryError::invalid(id, "L2 workflows need at least one step"))
                }
                Layer::L2 if !has_success_condition(scenario) => {
                    return Err(RegistryError::invalid(
                        id,
                        "L2 workflows need a post-condition or field expectations on the final step",
                    ))
                }
                _ => {}
            }
            if scenario.snapshot.is_some() && scenario.layer != Layer::L1 {
                return Err(RegistryError::invalid(
                    id,
                    "reference snapshots apply to L1 scenarios only",
                ));
            }
            validate_placeholders(scenario)
        }
    }
}

/// A status code alone does not prove a workflow did what it claims
fn has_success_condition(scenario: &ScenarioDefinition) -> bool {
    scenario.post_condition.is_some()
        || scenario
            .steps
            .last()
            .is_some_and(|step| !step.expect.fields.is_empty())
}

/// Every placeholder must be a built-in or captured by an earlier step.
/// Cleanup and post-condition steps see everything the workflow steps capture.
fn validate_placeholders(scenario: &ScenarioDefinition) -> Result<(), RegistryError> {
    let mut available: BTreeSet<String> = BUILTIN_PLACEHOLDERS
        .iter()
        .map(|name| name.to_string())
        .collect();

    let check = |step: &ScenarioStep, available: &BTreeSet<String>| {
        match step
            .request
            .referenced_placeholders()
            .into_iter()
            .find(|name| !available.contains(name))
        {
            Some(missing) => Err(RegistryError::invalid(
                &scenario.id,
                format!(
                    "step '{}' references '{{{{{missing}}}}}' before any step captures it",
                    step.name
                ),
            )),
            None => Ok(()),
        }
    };

    for step in &scenario.steps {
        check(step, &available)?;
        available.extend(step.captures.iter().map(|capture| capture.name.clone()));
    }
    for step in scenario.post_condition.iter().chain(scenario.cleanup.iter()) {
        check(step, &available)?;
    }
    Ok(())
}
