//! Tenant sandbox leases.
//!
//! At most one run holds a tenant at a time. The lease is released when the
//! [`TenantLease`] is dropped, which the engine does only after every unit's
//! cleanup has finished.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::GateRejection;

#[derive(Debug, Clone, Default)]
pub struct TenantLeaseManager {
    active: Arc<DashMap<String, Uuid>>,
}

impl TenantLeaseManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, tenant_id: &str, run_id: Uuid) -> Result<TenantLease, GateRejection> {
        match self.active.entry(tenant_id.to_string()) {
            Entry::Occupied(held) => {
                debug!(tenant_id = %tenant_id, held_by = %held.get(), "Tenant lease busy");
                Err(GateRejection::TenantBusy(tenant_id.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(run_id);
                Ok(TenantLease {
                    active: self.active.clone(),
                    tenant_id: tenant_id.to_string(),
                    run_id,
                })
            }
        }
    }

    pub fn is_leased(&self, tenant_id: &str) -> bool {
        self.active.contains_key(tenant_id)
    }
}

#[derive(Debug)]
pub struct TenantLease {
    active: Arc<DashMap<String, Uuid>>,
    tenant_id: String,
    run_id: Uuid,
}

impl TenantLease {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}

impl Drop for TenantLease {
    fn drop(&mut self) {
        self.active
            .remove_if(&self.tenant_id, |_, holder| *holder == self.run_id);
        debug!(tenant_id = %self.tenant_id, run_id = %self.run_id, "Tenant lease released");
    }
}
