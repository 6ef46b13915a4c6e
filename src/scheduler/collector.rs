//! Append-only, concurrency-safe result collection.

use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::warn;

use crate::results::ExecutionResult;

#[derive(Debug, Default)]
struct CollectorState {
    results: Vec<ExecutionResult>,
    ids: HashSet<String>,
}

/// Shared by every unit of a run. Accepts at most one result per unit id.
#[derive(Debug, Default)]
pub struct ResultCollector {
    state: Mutex<CollectorState>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result. Returns `false` (and drops it) if the unit already has one.
    pub fn record(&self, result: ExecutionResult) -> bool {
        let mut state = self.state.lock();
        if !state.ids.insert(result.id.clone()) {
            warn!(unit_id = %result.id, "Duplicate result for unit ignored");
            return false;
        }
        state.results.push(result);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Results ordered by layer then id, independent of completion order
    pub fn snapshot(&self) -> Vec<ExecutionResult> {
        let mut results = self.state.lock().results.clone();
        results.sort_by(|a, b| a.layer.cmp(&b.layer).then_with(|| a.id.cmp(&b.id)));
        results
    }
}
