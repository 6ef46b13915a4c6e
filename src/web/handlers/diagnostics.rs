//! # Diagnostics Run Handler
//!
//! `POST {web.route}`: authenticate, gate, run and report. The response is
//! 200 only when the computed status is `PASS`; any other status is 503. The
//! full report is the body either way.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::debug;

use crate::constants::headers;
use crate::engine::RunRequest;
use crate::web::auth::bearer_credential;
use crate::web::errors::ApiError;
use crate::web::state::AppState;

/// `?mode=` selector
#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    pub mode: Option<String>,
}

/// Optional JSON body; the query string wins when both name a mode
#[derive(Debug, Default, Deserialize)]
pub struct RunBody {
    pub mode: Option<String>,
}

fn header_value(request_headers: &HeaderMap, name: &str) -> Option<String> {
    request_headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub async fn run_diagnostics(
    State(state): State<AppState>,
    Query(query): Query<RunQuery>,
    request_headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let intent_header = &state.engine.config().gate.intent_header;
    let mut request = RunRequest {
        mode: query.mode,
        tenant_id: header_value(&request_headers, headers::TENANT_ID),
        credential: bearer_credential(&request_headers),
        intent: header_value(&request_headers, intent_header),
        correlation_id: header_value(&request_headers, headers::CORRELATION_ID),
    };

    if !body.iter().all(u8::is_ascii_whitespace) {
        match serde_json::from_slice::<RunBody>(&body) {
            Ok(body) => request.mode = request.mode.or(body.mode),
            Err(e) => {
                let reason = format!("request body is not valid JSON: {e}");
                return Err(state.engine.reject_malformed(&request, reason).into());
            }
        }
    }
    debug!(mode = ?request.mode, tenant_id = ?request.tenant_id, "Diagnostics run requested");

    let report = state.engine.run(request).await?;
    let status = if report.is_pass() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(report)).into_response())
}
