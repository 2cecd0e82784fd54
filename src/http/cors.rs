//! Cross-origin access to the proxy endpoint.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::CorsConfig;

/// Build the CORS layer. Unset settings mirror the preflight request.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origin = match &config.allow_origin {
        Some(origin) => match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Invalid CORS origin, reflecting request origin");
                AllowOrigin::mirror_request()
            }
        },
        None => AllowOrigin::mirror_request(),
    };

    let methods = match &config.allow_methods {
        Some(methods) => AllowMethods::list(
            methods
                .iter()
                .filter_map(|m| Method::from_bytes(m.trim().as_bytes()).ok()),
        ),
        None => AllowMethods::mirror_request(),
    };

    let headers = match &config.allow_headers {
        Some(headers) => AllowHeaders::list(
            headers
                .iter()
                .filter_map(|h| HeaderName::from_bytes(h.trim().as_bytes()).ok()),
        ),
        None => AllowHeaders::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
}
