//! Structural diff between two (already canonical) documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// One side of a mismatch. `Absent` is not the same thing as `Present(null)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum Side {
    Absent,
    Present(Value),
}

/// A single difference, addressed by JSON pointer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub path: String,
    pub before: Side,
    pub after: Side,
}

/// Compare `before` against `after`, collecting every mismatch
pub fn diff(before: &Value, after: &Value) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    diff_at(String::new(), before, after, &mut mismatches);
    mismatches
}

fn diff_at(path: String, before: &Value, after: &Value, out: &mut Vec<Mismatch>) {
    match (before, after) {
        (Value::Object(left), Value::Object(right)) => {
            let keys: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
            for key in keys {
                let child_path = format!("{path}/{}", escape_pointer_token(key));
                match (left.get(key), right.get(key)) {
                    (Some(l), Some(r)) => diff_at(child_path, l, r, out),
                    (Some(l), None) => out.push(Mismatch {
                        path: child_path,
                        before: Side::Present(l.clone()),
                        after: Side::Absent,
                    }),
                    (None, Some(r)) => out.push(Mismatch {
                        path: child_path,
                        before: Side::Absent,
                        after: Side::Present(r.clone()),
                    }),
                    (None, None) => {}
                }
            }
        }
        (Value::Array(left), Value::Array(right)) => {
            for index in 0..left.len().max(right.len()) {
                let child_path = format!("{path}/{index}");
                match (left.get(index), right.get(index)) {
                    (Some(l), Some(r)) => diff_at(child_path, l, r, out),
                    (Some(l), None) => out.push(Mismatch {
                        path: child_path,
                        before: Side::Present(l.clone()),
                        after: Side::Absent,
                    }),
                    (None, Some(r)) => out.push(Mismatch {
                        path: child_path,
                        before: Side::Absent,
                        after: Side::Present(r.clone()),
                    }),
                    (None, None) => {}
                }
            }
        }
        (l, r) if l == r => {}
        (l, r) => out.push(Mismatch {
            path: if path.is_empty() { "/".to_string() } else { path },
            before: Side::Present(l.clone()),
            after: Side::Present(r.clone()),
        }),
    }
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_documents_have_no_mismatches() {
        let doc = json!({"a": [1, 2, {"b": null}]});
        assert!(diff(&doc, &doc).is_empty());
    }

    #[test]
    fn test_absent_and_null_are_reported_distinctly() {
        let mismatches = diff(&json!({}), &json!({"a": null}));
        assert_eq!(
            mismatches,
            vec![Mismatch {
                path: "/a".to_string(),
                before: Side::Absent,
                after: Side::Present(Value::Null),
            }]
        );
    }

    #[test]
    fn test_nested_paths_and_array_growth() {
        let before = json!({"items": [{"qty": 1}], "a/b": 1});
        let after = json!({"items": [{"qty": 2}, {"qty": 3}], "a/b": 1});
        let paths: Vec<_> = diff(&before, &after).into_iter().map(|m| m.path).collect();
        assert_eq!(paths, vec!["/items/0/qty", "/items/1"]);
    }

    #[test]
    fn test_root_scalar_mismatch_uses_root_pointer() {
        let mismatches = diff(&json!(1), &json!(2));
        assert_eq!(mismatches[0].path, "/");
    }

    #[test]
    fn test_pointer_tokens_are_escaped() {
        let mismatches = diff(&json!({"a/b": 1}), &json!({"a/b": 2}));
        assert_eq!(mismatches[0].path, "/a~1b");
    }
}
