//! JSON gateway error handling
//!
//! Gateway handlers report failures as gRPC statuses. This module renders
//! them the way JSON gateways conventionally do: an HTTP status derived from
//! the gRPC code and a `{code, message, details}` body.

use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tonic::{Code, Status};

/// Error body returned by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Numeric gRPC status code
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

impl ErrorEnvelope {
    pub fn from_status(status: &Status) -> Self {
        Self {
            code: status.code() as i32,
            message: status.message().to_string(),
            details: Vec::new(),
        }
    }
}

/// HTTP status used for a gRPC code
pub fn http_status_from_code(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        // 499 Client Closed Request has no named constant
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::FailedPrecondition => StatusCode::BAD_REQUEST,
        Code::Aborted => StatusCode::CONFLICT,
        Code::OutOfRange => StatusCode::BAD_REQUEST,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A gRPC status rendered as a gateway error response
#[derive(Debug)]
pub struct GatewayError {
    status: Status,
}

impl GatewayError {
    pub fn status(&self) -> &Status {
        &self.status
    }
}

impl From<Status> for GatewayError {
    fn from(status: Status) -> Self {
        Self { status }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (
            http_status_from_code(self.status.code()),
            Json(ErrorEnvelope::from_status(&self.status)),
        )
            .into_response()
    }
}

/// Fallback for paths no gateway route matches
pub async fn not_found(uri: Uri) -> GatewayError {
    tracing::debug!(path = %uri.path(), "No gateway route");
    Status::not_found("Not Found").into()
}

#[cfg(test)]
#[path = "gateway_test.rs"]
mod tests;
