//! In-process request harness.
//!
//! Scenarios are replayed through the host service's real request pipeline
//! (routing, auth filters, extractors, serialization), never by calling
//! handler functions directly. [`RouterPipeline`] drives an axum `Router`
//! with `tower::ServiceExt::oneshot`, so the request takes exactly the path a
//! network request would after the listener.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::Router;
use serde_json::Value;
use thiserror::Error;
use tower::ServiceExt;

use super::request::PipelineRequest;

/// Largest response body the harness will buffer
pub const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("request could not be constructed: {0}")]
    InvalidRequest(String),

    #[error("pipeline transport failure: {0}")]
    Transport(String),

    #[error("response body unreadable: {0}")]
    Body(String),
}

/// A response exactly as the pipeline produced it
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl PipelineResponse {
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

/// "Submit a request, receive the full response as the real pipeline would produce it"
#[async_trait]
pub trait RequestPipeline: Send + Sync {
    async fn submit(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError>;
}

/// Pipeline harness over an axum router
#[derive(Clone)]
pub struct RouterPipeline {
    router: Router,
}

impl RouterPipeline {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    fn build_request(request: PipelineRequest) -> Result<Request<Body>, PipelineError> {
        let mut builder = Request::builder()
            .method(request.method)
            .uri(request.path.as_str());

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| PipelineError::InvalidRequest(format!("header name: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| PipelineError::InvalidRequest(format!("header value: {e}")))?;
            builder = builder.header(name, value);
        }

        let body = match request.body {
            Some(body) => {
                let bytes = serde_json::to_vec(&body)
                    .map_err(|e| PipelineError::InvalidRequest(format!("body: {e}")))?;
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(bytes)
            }
            None => Body::empty(),
        };

        builder
            .body(body)
            .map_err(|e| PipelineError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl RequestPipeline for RouterPipeline {
    async fn submit(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        let request = Self::build_request(request)?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| PipelineError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = to_bytes(response.into_body(), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| PipelineError::Body(e.to_string()))?;

        Ok(PipelineResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
