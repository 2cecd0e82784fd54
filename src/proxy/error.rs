//! Errors surfaced to callers of the proxy endpoint.

use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::proxy::payload::MalformedDataUri;

/// Failure of a proxy operation itself.
///
/// Transport failures are not represented here: they resolve as a successful
/// [`ProxyResult`](crate::proxy::message::ProxyResult) with an error-shaped response.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Request body is not set")]
    EmptyBody,

    #[error("Request body is larger than {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Unable to read the request body: {0}")]
    UnreadableBody(String),

    #[error("Unprocessable Entity. The message is not a JSON.")]
    NotJson,

    #[error("Unprocessable Entity. Expecting HTTP request configuration.")]
    MissingRequest,

    #[error("Unprocessable Entity. Invalid HTTP request configuration: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    MalformedDataUri(#[from] MalformedDataUri),

    /// The pending operation was dropped by a global shutdown.
    #[error("The request was aborted before it completed")]
    Aborted,

    #[error("No result within {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status used when this error is returned by the API.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::EmptyBody | ProxyError::UnreadableBody(_) | ProxyError::MalformedDataUri(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::NotJson | ProxyError::MissingRequest | ProxyError::InvalidRequest(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Aborted | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ProxyError::EmptyBody => "empty_body",
            ProxyError::PayloadTooLarge(_) => "payload_too_large",
            ProxyError::UnreadableBody(_) => "unreadable_body",
            ProxyError::NotJson => "not_json",
            ProxyError::MissingRequest => "missing_request",
            ProxyError::InvalidRequest(_) => "invalid_request",
            ProxyError::MalformedDataUri(_) => "malformed_data_uri",
            ProxyError::Aborted => "aborted",
            ProxyError::Timeout(_) => "timeout",
            ProxyError::Internal(_) => "internal",
        }
    }
}
