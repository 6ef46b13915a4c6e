//! Static plugin discovery.
//!
//! Modules that own checks or scenarios implement [`DiagnosticPlugin`] and
//! are installed into the registry at startup, so adding a probe never means
//! editing a central list.

use super::{DiagnosticRegistry, RegistryError};

pub trait DiagnosticPlugin: Send + Sync {
    /// Name used in logs and registration errors
    fn name(&self) -> &str;

    fn register(&self, registry: &mut DiagnosticRegistry) -> Result<(), RegistryError>;
}
