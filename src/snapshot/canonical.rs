//! Canonicalization of JSON documents for structural comparison.
//!
//! Rules, applied recursively:
//! - object keys are sorted
//! - strings that parse as timestamps are rewritten to one RFC 3339 UTC form
//!   (or masked, when configured)
//! - identifier-looking strings (UUIDs, ULIDs, long hex ids) become placeholders
//!
//! Two things are deliberately left alone: an explicit `null` stays distinct
//! from an absent key, and numbers are kept exactly as parsed.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const UUID_PLACEHOLDER: &str = "<uuid>";
pub const ID_PLACEHOLDER: &str = "<id>";
pub const TIMESTAMP_PLACEHOLDER: &str = "<timestamp>";

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        )
        .expect("uuid pattern is a valid regex")
    })
}

fn opaque_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // ULIDs (Crockford base32, 26 chars) and hex ids of 24+ chars
        Regex::new(r"^(?:[0-9A-HJKMNP-TV-Z]{26}|[0-9a-fA-F]{24,})$")
            .expect("opaque id pattern is a valid regex")
    })
}

/// Canonicalization switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalizeOptions {
    /// Replace timestamps with a placeholder instead of normalizing their format
    pub mask_timestamps: bool,
}

/// Canonicalize with default options
pub fn canonicalize(value: &Value) -> Value {
    canonicalize_with(value, CanonicalizeOptions::default())
}

pub fn canonicalize_with(value: &Value, options: CanonicalizeOptions) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map
                .iter()
                .map(|(key, child)| (key, canonicalize_with(child, options)))
                .collect();
            let mut canonical = Map::with_capacity(sorted.len());
            for (key, child) in sorted {
                canonical.insert(key.clone(), child);
            }
            Value::Object(canonical)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| canonicalize_with(item, options))
                .collect(),
        ),
        Value::String(s) => Value::String(canonicalize_string(s, options)),
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
    }
}

fn canonicalize_string(s: &str, options: CanonicalizeOptions) -> String {
    if let Some(timestamp) = parse_timestamp(s) {
        return if options.mask_timestamps {
            TIMESTAMP_PLACEHOLDER.to_string()
        } else {
            timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        };
    }
    if uuid_pattern().is_match(s) {
        return UUID_PLACEHOLDER.to_string();
    }
    if opaque_id_pattern().is_match(s) {
        return ID_PLACEHOLDER.to_string();
    }
    s.to_string()
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    // Cheap pre-filter: every accepted form starts with a date
    let bytes = s.as_bytes();
    if bytes.len() < 19 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc())
}
