//! # Audit Trail
//!
//! Exactly one append-only [`AuditRecord`] is handed to the [`AuditSink`] per
//! invocation, whether the run was admitted or rejected. Persistence belongs
//! to the host; the default sink writes a structured `tracing` event.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::RunMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditDecision {
    Admitted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub run_id: Uuid,
    pub decision: AuditDecision,
    /// Requested mode, when it could be parsed
    pub mode: Option<RunMode>,
    pub tenant_id: String,
    pub correlation_id: Option<String>,
    pub environment: String,
    /// `PASS` / `PARTIAL` / `FAIL` for admitted runs, the rejection reason otherwise
    pub result: String,
    pub recorded_at: DateTime<Utc>,
}

pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, record: AuditRecord) {
        tracing::info!(
            target: "diagnostics::audit",
            run_id = %record.run_id,
            decision = ?record.decision,
            mode = ?record.mode,
            tenant_id = %record.tenant_id,
            correlation_id = ?record.correlation_id,
            environment = %record.environment,
            result = %record.result,
            recorded_at = %record.recorded_at.to_rfc3339(),
            "DIAGNOSTICS_AUDIT"
        );
    }
}

/// Keeps records in memory, for hosts that forward them in batches and for tests
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}
