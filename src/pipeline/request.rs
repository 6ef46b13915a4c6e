//! Declarative request templates, expectations and captures for pipeline
//! scenarios.
//!
//! Templates may reference `{{name}}` placeholders. A placeholder resolves to
//! a value captured by an earlier workflow step, or to one of the run-scoped
//! built-ins (`run_id`, `tenant_id`, `correlation_id`). A JSON string that is
//! exactly one placeholder is replaced by the captured value itself, keeping
//! its JSON type.

use axum::http::Method;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::context::RunContext;

/// Placeholders every template can use without a prior capture
pub const BUILTIN_PLACEHOLDERS: [&str; 3] = ["run_id", "tenant_id", "correlation_id"];

/// Characters escaped when a value is substituted into a request path
const PATH_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Values captured from earlier steps, keyed by capture name
pub type CarriedState = BTreeMap<String, Value>;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is a valid regex")
    })
}

/// Names of all placeholders referenced in `text`
pub fn placeholders_in(text: &str) -> Vec<String> {
    placeholder_pattern()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// A placeholder that had no value at render time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unresolved placeholder '{0}'")]
pub struct UnresolvedPlaceholder(pub String);

/// A fully rendered request ready to be submitted to the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl PipelineRequest {
    pub fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(header, _)| header.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestTemplate {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Every placeholder this template references
    pub fn referenced_placeholders(&self) -> Vec<String> {
        let mut names = placeholders_in(&self.path);
        for (_, value) in &self.headers {
            names.extend(placeholders_in(value));
        }
        if let Some(body) = &self.body {
            collect_body_placeholders(body, &mut names);
        }
        names.sort();
        names.dedup();
        names
    }

    /// Substitute placeholders from the carried state and run context
    pub fn render(
        &self,
        state: &CarriedState,
        ctx: &RunContext,
    ) -> Result<PipelineRequest, UnresolvedPlaceholder> {
        let resolver = Resolver { state, ctx };
        let path = resolver.interpolate_path(&self.path)?;
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), resolver.interpolate(value)?)))
            .collect::<Result<Vec<_>, UnresolvedPlaceholder>>()?;
        let body = self
            .body
            .as_ref()
            .map(|body| resolver.render_value(body))
            .transpose()?;

        Ok(PipelineRequest {
            method: self.method.clone(),
            path,
            headers,
            body,
        })
    }
}

fn collect_body_placeholders(value: &Value, names: &mut Vec<String>) {
    match value {
        Value::String(s) => names.extend(placeholders_in(s)),
        Value::Array(items) => items
            .iter()
            .for_each(|item| collect_body_placeholders(item, names)),
        Value::Object(map) => map
            .values()
            .for_each(|child| collect_body_placeholders(child, names)),
        _ => {}
    }
}

struct Resolver<'a> {
    state: &'a CarriedState,
    ctx: &'a RunContext,
}

impl Resolver<'_> {
    fn lookup(&self, name: &str) -> Result<Value, UnresolvedPlaceholder> {
        match name {
            "run_id" => Ok(Value::String(self.ctx.run_id().to_string())),
            "tenant_id" => Ok(Value::String(self.ctx.tenant_id().to_string())),
            "correlation_id" => Ok(Value::String(self.ctx.correlation_id().to_string())),
            _ => self
                .state
                .get(name)
                .cloned()
                .ok_or_else(|| UnresolvedPlaceholder(name.to_string())),
        }
    }

    fn interpolate(&self, text: &str) -> Result<String, UnresolvedPlaceholder> {
        self.substitute(text, |value, rendered| rendered.push_str(value))
    }

    /// Substituted values are percent-encoded so they stay within one path
    /// segment or query value
    fn interpolate_path(&self, text: &str) -> Result<String, UnresolvedPlaceholder> {
        self.substitute(text, |value, rendered| {
            rendered.extend(utf8_percent_encode(value, PATH_VALUE))
        })
    }

    fn substitute(
        &self,
        text: &str,
        push: impl Fn(&str, &mut String),
    ) -> Result<String, UnresolvedPlaceholder> {
        let mut rendered = String::with_capacity(text.len());
        let mut last = 0;
        for caps in placeholder_pattern().captures_iter(text) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            rendered.push_str(&text[last..whole.start]);
            match self.lookup(&caps[1])? {
                Value::String(s) => push(&s, &mut rendered),
                other => push(&other.to_string(), &mut rendered),
            }
            last = whole.end;
        }
        rendered.push_str(&text[last..]);
        Ok(rendered)
    }

    fn render_value(&self, value: &Value) -> Result<Value, UnresolvedPlaceholder> {
        match value {
            Value::String(s) => {
                let trimmed = s.trim();
                let whole_placeholder = placeholder_pattern()
                    .captures(trimmed)
                    .filter(|caps| caps.get(0).is_some_and(|m| m.as_str() == trimmed));
                match whole_placeholder {
                    Some(caps) => self.lookup(&caps[1]),
                    None => Ok(Value::String(self.interpolate(s)?)),
                }
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.render_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut rendered = serde_json::Map::with_capacity(map.len());
                for (key, child) in map {
                    rendered.insert(key.clone(), self.render_value(child)?);
                }
                Ok(Value::Object(rendered))
            }
            other => Ok(other.clone()),
        }
    }
}

/// Acceptable response statuses for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusExpectation {
    /// Any 2xx
    #[default]
    Success,
    Exact(u16),
    /// Anything below 500
    NonServerError,
}

impl StatusExpectation {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusExpectation::Success => (200..300).contains(&status),
            StatusExpectation::Exact(expected) => status == *expected,
            StatusExpectation::NonServerError => status < 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Bool,
    Object,
    Array,
    Null,
    Any,
}

impl FieldType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
            FieldType::Null => value.is_null(),
            FieldType::Any => true,
        }
    }
}

/// A field that must exist (at a JSON pointer) with a given type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldExpectation {
    pub pointer: String,
    pub field_type: FieldType,
}

/// Expected response shape
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expectation {
    pub status: StatusExpectation,
    pub fields: Vec<FieldExpectation>,
}

impl Expectation {
    pub fn status(status: StatusExpectation) -> Self {
        Self {
            status,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, pointer: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldExpectation {
            pointer: pointer.into(),
            field_type,
        });
        self
    }

    /// Fields are checked only against a JSON body
    pub fn requires_body(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// Copy a response field into the carried state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub name: String,
    pub pointer: String,
}

/// One request of a scenario, with its expectation and captures
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioStep {
    pub name: String,
    pub request: RequestTemplate,
    pub expect: Expectation,
    pub captures: Vec<Capture>,
}

impl ScenarioStep {
    pub fn new(name: impl Into<String>, request: RequestTemplate) -> Self {
        Self {
            name: name.into(),
            request,
            expect: Expectation::default(),
            captures: Vec::new(),
        }
    }

    pub fn expect(mut self, expect: Expectation) -> Self {
        self.expect = expect;
        self
    }

    pub fn expect_status(mut self, status: StatusExpectation) -> Self {
        self.expect.status = status;
        self
    }

    pub fn expect_field(mut self, pointer: impl Into<String>, field_type: FieldType) -> Self {
        self.expect = self.expect.with_field(pointer, field_type);
        self
    }

    pub fn capture(mut self, name: impl Into<String>, pointer: impl Into<String>) -> Self {
        self.captures.push(Capture {
            name: name.into(),
            pointer: pointer.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::RunMode;
    use serde_json::json;
    use std::time::Duration;

    fn ctx() -> RunContext {
        RunContext::new(
            RunMode::SafeWrite,
            "tenant-7",
            "test",
            "orders-api",
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_render_substitutes_captures_and_builtins() {
        let template = RequestTemplate::post(
            "/tenants/{{tenant_id}}/orders/{{order_id}}/items",
            json!({"orderId": "{{order_id}}", "note": "order {{order_id}} of {{tenant_id}}"}),
        )
        .with_header("x-trace", "{{correlation_id}}");

        let mut state = CarriedState::new();
        state.insert("order_id".to_string(), json!(42));

        let ctx = ctx();
        let request = template.render(&state, &ctx).unwrap();
        assert_eq!(request.path, "/tenants/tenant-7/orders/42/items");
        assert_eq!(
            request.body,
            Some(json!({"orderId": 42, "note": "order 42 of tenant-7"}))
        );
        assert_eq!(request.headers[0].1, ctx.correlation_id());
    }

    #[test]
    fn test_path_values_are_percent_encoded() {
        let template = RequestTemplate::get("/orders/{{order_id}}/items")
            .with_header("x-order", "{{order_id}}");
        let mut state = CarriedState::new();
        state.insert("order_id".to_string(), json!("a/b c?d%"));

        let request = template.render(&state, &ctx()).unwrap();
        assert_eq!(request.path, "/orders/a%2Fb%20c%3Fd%25/items");
        assert_eq!(request.headers[0].1, "a/b c?d%");
    }

    #[test]
    fn test_render_reports_unresolved_placeholder() {
        let template = RequestTemplate::get("/orders/{{order_id}}");
        let err = template.render(&CarriedState::new(), &ctx()).unwrap_err();
        assert_eq!(err, UnresolvedPlaceholder("order_id".to_string()));
    }

    #[test]
    fn test_referenced_placeholders_are_deduplicated() {
        let template = RequestTemplate::put(
            "/orders/{{ order_id }}",
            json!({"id": "{{order_id}}", "items": ["{{sku}}"]}),
        );
        assert_eq!(
            template.referenced_placeholders(),
            vec!["order_id".to_string(), "sku".to_string()]
        );
    }

    #[test]
    fn test_status_expectations() {
        assert!(StatusExpectation::Success.matches(204));
        assert!(!StatusExpectation::Success.matches(404));
        assert!(StatusExpectation::NonServerError.matches(404));
        assert!(!StatusExpectation::NonServerError.matches(503));
        assert!(StatusExpectation::Exact(201).matches(201));
    }
}
