//! # Snapshot Comparator
//!
//! Canonicalizes JSON output and diffs it against a reference document for
//! regression detection. Mismatches raise `ContractMismatch` on the report;
//! whether that also fails the run is governed by [`MismatchSeverity`].

pub mod canonical;
pub mod diff;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use canonical::{canonicalize, canonicalize_with, CanonicalizeOptions};
pub use diff::{diff, Mismatch, Side};

/// How a snapshot mismatch affects the verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchSeverity {
    /// Flag `ContractMismatch`, leave the status alone
    #[default]
    Warn,
    /// Flag `ContractMismatch` and force `FAIL`
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotComparator {
    options: CanonicalizeOptions,
}

impl SnapshotComparator {
    pub fn new(options: CanonicalizeOptions) -> Self {
        Self { options }
    }

    pub fn canonicalize(&self, value: &Value) -> Value {
        canonicalize_with(value, self.options)
    }

    /// Canonicalize both documents and list their structural differences
    pub fn compare(&self, reference: &Value, actual: &Value) -> Vec<Mismatch> {
        diff(&self.canonicalize(reference), &self.canonicalize(actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_volatile_fields_do_not_cause_mismatches() {
        let comparator = SnapshotComparator::default();
        let reference = json!({
            "id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
            "createdAt": "2024-03-01T10:00:00Z",
            "total": 42
        });
        let actual = json!({
            "total": 42,
            "createdAt": "2024-03-01T10:00:00+00:00",
            "id": "9c858901-8a57-4791-81fe-4c455b099bc9"
        });
        assert!(comparator.compare(&reference, &actual).is_empty());
    }

    #[test]
    fn test_masked_timestamps_ignore_time_drift() {
        let comparator = SnapshotComparator::new(CanonicalizeOptions {
            mask_timestamps: true,
        });
        let mismatches = comparator.compare(
            &json!({"at": "2024-03-01T10:00:00Z"}),
            &json!({"at": "2025-01-01T00:00:00Z"}),
        );
        assert!(mismatches.is_empty());
    }

    #[test]
    fn test_real_contract_changes_are_reported() {
        let comparator = SnapshotComparator::default();
        let mismatches = comparator.compare(
            &json!({"total": 42, "currency": "EUR"}),
            &json!({"total": 42.0, "currency": null}),
        );
        assert_eq!(mismatches.len(), 2);
    }

    #[test]
    fn test_numbers_keep_their_written_precision() {
        let parse = |text: &str| serde_json::from_str::<Value>(text).unwrap();
        let comparator = SnapshotComparator::default();

        let mismatches = comparator.compare(
            &parse(r#"{"total": 12345678901234567890123}"#),
            &parse(r#"{"total": 12345678901234567890124}"#),
        );
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].path, "/total");

        let mismatches =
            comparator.compare(&parse(r#"{"amount": 12.50}"#), &parse(r#"{"amount": 12.5}"#));
        assert_eq!(mismatches.len(), 1);

        assert!(comparator
            .compare(&parse(r#"{"amount": 12.50}"#), &parse(r#"{"amount": 12.50}"#))
            .is_empty());
    }
}
