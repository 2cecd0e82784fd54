//! Error envelope returned by the API.
//!
//! Every failure of the proxy endpoint is rendered as
//! `{"error": true, "code": <status>, "message": .., "detail": ..}`.
//! Internal causes are logged, never sent.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::proxy::ProxyError;

const DETAIL: &str = "The server misbehave. That is all we know.";
const GENERIC_MESSAGE: &str = "Unable to proxy the request";

/// JSON body of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: bool,
    pub code: u16,
    pub message: String,
    pub detail: String,
}

impl ErrorEnvelope {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: true,
            code: status.as_u16(),
            message: message.into(),
            detail: DETAIL.to_string(),
        }
    }
}

/// A [`ProxyError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError {
    error: ProxyError,
    request_id: String,
}

impl ApiError {
    pub fn new(error: ProxyError, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: request_id.into(),
        }
    }

    pub fn envelope(&self) -> (StatusCode, ErrorEnvelope) {
        let status = self.error.status_code();
        let message = if status.is_server_error() && !matches!(self.error, ProxyError::Timeout(_)) {
            GENERIC_MESSAGE.to_string()
        } else {
            self.error.to_string()
        };
        (status, ErrorEnvelope::new(status, message))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, envelope) = self.envelope();
        if status.is_server_error() {
            tracing::error!(request_id = %self.request_id, error = %self.error, code = envelope.code, "Proxy call failed");
        } else {
            tracing::debug!(request_id = %self.request_id, error = %self.error, code = envelope.code, "Proxy call rejected");
        }
        (status, Json(envelope)).into_response()
    }
}
