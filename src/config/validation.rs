//! Configuration validation.
//!
//! Serde handles the syntax; this checks values. All problems are reported,
//! not just the first.

use axum::http::{HeaderName, Method};
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ServiceConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("listener.max_body_size must be greater than zero")]
    BodyLimit,

    #[error("listener.tls.{0} is empty")]
    TlsPath(&'static str),

    #[error("api.prefix `{0}` must start with `/`")]
    Prefix(String),

    #[error("cors.allow_origin is empty")]
    EmptyOrigin,

    #[error("cors.allow_methods contains invalid method `{0}`")]
    CorsMethod(String),

    #[error("cors.allow_headers contains invalid header `{0}`")]
    CorsHeader(String),

    #[error("timeouts.result_secs must be greater than zero")]
    ResultTimeout,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Check a parsed configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = &config.listener;
    if listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(listener.bind_address.clone()));
    }
    if listener.max_body_size == 0 {
        errors.push(ValidationError::BodyLimit);
    }
    if let Some(tls) = &listener.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::TlsPath("cert_path"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::TlsPath("key_path"));
        }
    }

    let prefix = &config.api.prefix;
    if !prefix.is_empty() && !prefix.starts_with('/') {
        errors.push(ValidationError::Prefix(prefix.clone()));
    }

    let cors = &config.cors;
    if cors.allow_origin.as_deref().is_some_and(|o| o.trim().is_empty()) {
        errors.push(ValidationError::EmptyOrigin);
    }
    for method in cors.allow_methods.iter().flatten() {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::CorsMethod(method.clone()));
        }
    }
    for header in cors.allow_headers.iter().flatten() {
        if HeaderName::from_bytes(header.as_bytes()).is_err() {
            errors.push(ValidationError::CorsHeader(header.clone()));
        }
    }

    if config.timeouts.result_secs == Some(0) {
        errors.push(ValidationError::ResultTimeout);
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(observability.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
