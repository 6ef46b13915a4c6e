//! # Graph Validator
//!
//! Two independent layers, both required for a `PASS`:
//!
//! 1. **Structural**: walks the container's registrations and reports every
//!    dependency that cannot be satisfied, every cycle and every captive
//!    dependency, without constructing anything. All errors are collected.
//! 2. **Activation**: inside one isolated child scope, constructs only the
//!    allow-list (handlers, background services and the configured critical
//!    services). Each activation is isolated from the others, panics
//!    included.

pub mod container;

pub use container::{
    ActivationScope, ContainerIntrospection, DependencySpec, ScopedActivation, ServiceCatalog,
    ServiceDescriptor, ServiceKind, ServiceLifetime,
};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

use crate::constants::Outcome;

pub const STRUCTURAL_LAYER: &str = "structural";
pub const ACTIVATION_LAYER: &str = "activation";

/// Outcome of one validation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerReport {
    pub name: String,
    pub status: Outcome,
    pub checked: usize,
    pub errors: usize,
}

/// The `diagnostics.diContainer` section of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiContainerReport {
    pub status: Outcome,
    pub layers: Vec<LayerReport>,
    pub errors: Vec<String>,
}

impl DiContainerReport {
    /// No container was supplied; nothing to validate
    pub fn not_configured() -> Self {
        Self {
            status: Outcome::Pass,
            layers: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// The validator itself did not finish; treated as a structural failure
    pub fn validator_failed(message: impl Into<String>) -> Self {
        Self {
            status: Outcome::Fail,
            layers: vec![LayerReport {
                name: STRUCTURAL_LAYER.to_string(),
                status: Outcome::Fail,
                checked: 0,
                errors: 1,
            }],
            errors: vec![message.into()],
        }
    }

    pub fn passed(&self) -> bool {
        self.status.is_pass()
    }

    /// A structural failure makes L1/L2 probes meaningless
    pub fn structural_failure(&self) -> bool {
        self.layers
            .iter()
            .any(|layer| layer.name == STRUCTURAL_LAYER && !layer.status.is_pass())
    }
}

pub struct GraphValidator {
    introspection: Arc<dyn ContainerIntrospection>,
    activation: Arc<dyn ScopedActivation>,
    critical_services: Vec<String>,
}

impl GraphValidator {
    pub fn new(
        introspection: Arc<dyn ContainerIntrospection>,
        activation: Arc<dyn ScopedActivation>,
    ) -> Self {
        Self {
            introspection,
            activation,
            critical_services: Vec::new(),
        }
    }

    /// Validate a container that offers both capabilities, e.g. a [`ServiceCatalog`]
    pub fn for_container<C>(container: Arc<C>) -> Self
    where
        C: ContainerIntrospection + ScopedActivation + 'static,
    {
        Self::new(container.clone(), container)
    }

    pub fn with_critical_services(mut self, services: Vec<String>) -> Self {
        self.critical_services = services;
        self
    }

    /// Run both layers and combine them
    pub fn validate(&self) -> DiContainerReport {
        let registrations = self.introspection.registrations();

        let structural_errors = structural_errors(&registrations);
        let allow_list = self.allow_list(&registrations);
        let activation_errors = self.activate_all(&allow_list, &registrations);

        let layer = |name: &str, checked: usize, errors: &[String]| LayerReport {
            name: name.to_string(),
            status: if errors.is_empty() {
                Outcome::Pass
            } else {
                Outcome::Fail
            },
            checked,
            errors: errors.len(),
        };
        let layers = vec![
            layer(STRUCTURAL_LAYER, registrations.len(), &structural_errors),
            layer(ACTIVATION_LAYER, allow_list.len(), &activation_errors),
        ];

        let errors: Vec<String> = structural_errors
            .into_iter()
            .chain(activation_errors)
            .collect();
        let status = if errors.is_empty() {
            Outcome::Pass
        } else {
            Outcome::Fail
        };

        info!(
            registrations = registrations.len(),
            activated = allow_list.len(),
            errors = errors.len(),
            status = %status,
            "Dependency graph validated"
        );

        DiContainerReport {
            status,
            layers,
            errors,
        }
    }

    /// Handlers, background services and critical services, de-duplicated and sorted
    fn allow_list(&self, registrations: &[ServiceDescriptor]) -> Vec<String> {
        let mut services: BTreeSet<String> = registrations
            .iter()
            .filter(|d| matches!(d.kind, ServiceKind::Handler | ServiceKind::BackgroundService))
            .map(|d| d.service.clone())
            .collect();
        services.extend(self.critical_services.iter().cloned());
        services.into_iter().collect()
    }

    fn activate_all(&self, allow_list: &[String], registrations: &[ServiceDescriptor]) -> Vec<String> {
        if allow_list.is_empty() {
            return Vec::new();
        }
        let registered: BTreeSet<&str> = registrations.iter().map(|d| d.service.as_str()).collect();

        let mut scope = match self.activation.create_scope() {
            Ok(scope) => scope,
            Err(reason) => return vec![format!("activation scope could not be created: {reason}")],
        };

        let mut errors = Vec::new();
        for service in allow_list {
            if !registered.contains(service.as_str()) {
                errors.push(format!("critical service '{service}' is not registered"));
                continue;
            }
            let attempt = catch_unwind(AssertUnwindSafe(|| scope.activate(service)));
            match attempt {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => {
                    errors.push(format!("activation of '{service}' failed: {reason}"))
                }
                Err(_) => {
                    errors.push(format!("activation of '{service}' panicked"));
                    // A panicking constructor may leave the scope half-built.
                    if let Ok(fresh) = self.activation.create_scope() {
                        scope = fresh;
                    }
                }
            }
        }
        if !errors.is_empty() {
            warn!(failures = errors.len(), "Activation smoke test reported failures");
        }
        errors
    }
}

/// Missing registrations, captive dependencies and cycles, in a stable order
fn structural_errors(registrations: &[ServiceDescriptor]) -> Vec<String> {
    let mut by_service: BTreeMap<&str, &ServiceDescriptor> = BTreeMap::new();
    for descriptor in registrations {
        // Later registrations override earlier ones.
        by_service.insert(descriptor.service.as_str(), descriptor);
    }

    let mut errors = Vec::new();
    for descriptor in by_service.values() {
        for dependency in &descriptor.dependencies {
            match by_service.get(dependency.service.as_str()) {
                None if dependency.must_resolve() => errors.push(format!(
                    "'{}' depends on '{}', which is not registered",
                    descriptor.service, dependency.service
                )),
                Some(target) if descriptor.lifetime.captures(target.lifetime) => {
                    errors.push(format!(
                        "'{}' ({:?}) captures '{}' ({:?})",
                        descriptor.service, descriptor.lifetime, target.service, target.lifetime
                    ))
                }
                _ => {}
            }
        }
    }

    errors.extend(find_cycles(&by_service));
    errors
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

fn find_cycles(by_service: &BTreeMap<&str, &ServiceDescriptor>) -> Vec<String> {
    let mut state: BTreeMap<&str, Visit> = BTreeMap::new();
    let mut cycles = Vec::new();
    for service in by_service.keys().copied() {
        let mut path = Vec::new();
        visit(service, by_service, &mut state, &mut path, &mut cycles);
    }
    cycles
}

fn visit<'a>(
    service: &'a str,
    by_service: &BTreeMap<&'a str, &'a ServiceDescriptor>,
    state: &mut BTreeMap<&'a str, Visit>,
    path: &mut Vec<&'a str>,
    cycles: &mut Vec<String>,
) {
    match state.get(service) {
        Some(Visit::Done) => return,
        Some(Visit::InProgress) => {
            if let Some(start) = path.iter().position(|s| *s == service) {
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(service);
                cycles.push(format!("dependency cycle: {}", cycle.join(" -> ")));
            }
            return;
        }
        None => {}
    }
    let Some(descriptor) = by_service.get(service) else {
        return;
    };

    state.insert(service, Visit::InProgress);
    path.push(service);
    for dependency in &descriptor.dependencies {
        if let Some((name, _)) = by_service.get_key_value(dependency.service.as_str()) {
            visit(*name, by_service, state, path, cycles);
        }
    }
    path.pop();
    state.insert(service, Visit::Done);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_catalog() -> ServiceCatalog {
        let mut catalog = ServiceCatalog::new();
        catalog
            .register(ServiceDescriptor::new("db", ServiceLifetime::Singleton))
            .register(
                ServiceDescriptor::new("orders-repo", ServiceLifetime::Scoped)
                    .depends_on(DependencySpec::required("db")),
            )
            .register(
                ServiceDescriptor::new("orders-handler", ServiceLifetime::Scoped)
                    .handler()
                    .depends_on(DependencySpec::required("orders-repo"))
                    .depends_on(DependencySpec::optional("feature-flags")),
            );
        catalog
    }

    #[test]
    fn test_healthy_graph_passes_both_layers() {
        let report = GraphValidator::for_container(Arc::new(healthy_catalog())).validate();
        assert_eq!(report.status, Outcome::Pass);
        assert_eq!(report.layers.len(), 2);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_structural_errors_are_all_collected() {
        let mut catalog = healthy_catalog();
        catalog
            .register(
                ServiceDescriptor::new("cache", ServiceLifetime::Singleton)
                    .depends_on(DependencySpec::required("orders-repo")),
            )
            .register(
                ServiceDescriptor::new("a", ServiceLifetime::Transient)
                    .depends_on(DependencySpec::required("b"))
                    .depends_on(DependencySpec::required("missing-1")),
            )
            .register(
                ServiceDescriptor::new("b", ServiceLifetime::Transient)
                    .depends_on(DependencySpec::required("a")),
            );

        let report = GraphValidator::for_container(Arc::new(catalog)).validate();
        assert_eq!(report.status, Outcome::Fail);
        assert!(report.structural_failure());
        assert!(report.errors.iter().any(|e| e.contains("missing-1")));
        assert!(report.errors.iter().any(|e| e.contains("captures 'orders-repo'")));
        assert!(report.errors.iter().any(|e| e == "dependency cycle: a -> b -> a"));
    }

    #[test]
    fn test_activation_failures_are_isolated() {
        let mut catalog = healthy_catalog();
        catalog
            .register_with(
                ServiceDescriptor::new("mailer", ServiceLifetime::Singleton).background_service(),
                || Err("smtp host missing".to_string()),
            )
            .register_with(
                ServiceDescriptor::new("reporter", ServiceLifetime::Singleton).background_service(),
                || panic!("constructor panicked"),
            );

        let report = GraphValidator::for_container(Arc::new(catalog))
            .with_critical_services(vec!["ledger".to_string()])
            .validate();

        assert_eq!(report.status, Outcome::Fail);
        assert!(!report.structural_failure());
        assert_eq!(report.errors.len(), 3);
        assert!(report.errors.contains(&"critical service 'ledger' is not registered".to_string()));
        assert!(report
            .errors
            .contains(&"activation of 'mailer' failed: smtp host missing".to_string()));
        assert!(report.errors.contains(&"activation of 'reporter' panicked".to_string()));
    }
}
