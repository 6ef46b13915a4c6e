//! # Web API Errors
//!
//! Every refusal, whether from the gate or from a malformed request, is
//! answered with the same rejection document and no diagnostics.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::RunRejection;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Rejected(#[from] RunRejection),
}

/// Body of every rejection response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionBody {
    pub run_id: Uuid,
    pub status: &'static str,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Rejected(rejection) = self;
        let status_code =
            StatusCode::from_u16(rejection.http_status()).unwrap_or(StatusCode::FORBIDDEN);
        let body = RejectionBody {
            run_id: rejection.run_id,
            status: "REJECTED",
            reason: rejection.reason.to_string(),
            timestamp: rejection.timestamp,
        };

        (status_code, Json(body)).into_response()
    }
}
