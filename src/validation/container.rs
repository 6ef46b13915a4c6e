//! Narrow contracts onto the host's dependency-injection container, plus an
//! in-memory [`ServiceCatalog`] for hosts that wire services by hand.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceLifetime {
    Singleton,
    Scoped,
    Transient,
}

impl ServiceLifetime {
    /// A singleton holding a scoped service keeps it alive past its scope
    pub fn captures(&self, dependency: ServiceLifetime) -> bool {
        matches!(
            (self, dependency),
            (ServiceLifetime::Singleton, ServiceLifetime::Scoped)
        )
    }
}

/// Which allow-list a registration belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    Handler,
    BackgroundService,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub service: String,
    /// Resolution may legitimately yield nothing
    pub optional: bool,
    /// Resolves to all registrations, possibly none
    pub collection: bool,
}

impl DependencySpec {
    pub fn required(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            optional: false,
            collection: false,
        }
    }

    pub fn optional(service: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::required(service)
        }
    }

    pub fn collection(service: impl Into<String>) -> Self {
        Self {
            collection: true,
            ..Self::required(service)
        }
    }

    /// Whether a missing registration is an error
    pub fn must_resolve(&self) -> bool {
        !self.optional && !self.collection
    }
}

/// Read-only view of one registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service: String,
    pub lifetime: ServiceLifetime,
    pub kind: ServiceKind,
    pub dependencies: Vec<DependencySpec>,
}

impl ServiceDescriptor {
    pub fn new(service: impl Into<String>, lifetime: ServiceLifetime) -> Self {
        Self {
            service: service.into(),
            lifetime,
            kind: ServiceKind::Other,
            dependencies: Vec::new(),
        }
    }

    pub fn handler(mut self) -> Self {
        self.kind = ServiceKind::Handler;
        self
    }

    pub fn background_service(mut self) -> Self {
        self.kind = ServiceKind::BackgroundService;
        self
    }

    pub fn depends_on(mut self, dependency: DependencySpec) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

/// Structural introspection. Never constructs anything.
pub trait ContainerIntrospection: Send + Sync {
    fn registrations(&self) -> Vec<ServiceDescriptor>;
}

/// Creates isolated, disposable child scopes for activation smoke tests
pub trait ScopedActivation: Send + Sync {
    fn create_scope(&self) -> Result<Box<dyn ActivationScope + '_>, String>;
}

/// A child scope. Everything activated in it is released when it is dropped.
pub trait ActivationScope: Send {
    fn activate(&mut self, service: &str) -> Result<(), String>;
}

type Factory = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// Hand-wired service registrations with construction callbacks
#[derive(Default)]
pub struct ServiceCatalog {
    descriptors: Vec<ServiceDescriptor>,
    factories: BTreeMap<String, Factory>,
}

impl fmt::Debug for ServiceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCatalog")
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service whose construction always succeeds
    pub fn register(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        self.register_with(descriptor, || Ok(()))
    }

    pub fn register_with<F>(&mut self, descriptor: ServiceDescriptor, factory: F) -> &mut Self
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        self.factories
            .insert(descriptor.service.clone(), Arc::new(factory));
        self.descriptors.push(descriptor);
        self
    }

    fn descriptor(&self, service: &str) -> Option<&ServiceDescriptor> {
        self.descriptors.iter().rev().find(|d| d.service == service)
    }
}

impl ContainerIntrospection for ServiceCatalog {
    fn registrations(&self) -> Vec<ServiceDescriptor> {
        self.descriptors.clone()
    }
}

impl ScopedActivation for ServiceCatalog {
    fn create_scope(&self) -> Result<Box<dyn ActivationScope + '_>, String> {
        Ok(Box::new(CatalogScope {
            catalog: self,
            activated: HashSet::new(),
            resolving: Vec::new(),
        }))
    }
}

struct CatalogScope<'a> {
    catalog: &'a ServiceCatalog,
    activated: HashSet<String>,
    resolving: Vec<String>,
}

impl ActivationScope for CatalogScope<'_> {
    fn activate(&mut self, service: &str) -> Result<(), String> {
        if self.activated.contains(service) {
            return Ok(());
        }
        if self.resolving.iter().any(|s| s == service) {
            return Err(format!("circular construction of '{service}'"));
        }
        let catalog = self.catalog;
        let descriptor = catalog
            .descriptor(service)
            .ok_or_else(|| format!("'{service}' is not registered"))?;

        self.resolving.push(service.to_string());
        let dependencies = descriptor.dependencies.clone();
        let result = dependencies
            .iter()
            .filter(|dep| dep.must_resolve() || catalog.descriptor(&dep.service).is_some())
            .try_for_each(|dep| {
                self.activate(&dep.service)
                    .map_err(|e| format!("{service} -> {e}"))
            })
            .and_then(|()| match catalog.factories.get(service) {
                Some(factory) => factory(),
                None => Ok(()),
            });
        self.resolving.pop();

        result.map(|()| {
            self.activated.insert(service.to_string());
        })
    }
}
