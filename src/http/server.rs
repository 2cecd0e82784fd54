//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the proxy endpoint
//! - Wire up middleware (request ID, tracing, body limit, CORS)
//! - Bind the server to a listener, plain or TLS
//! - Abort pending proxy calls when the server shuts down

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::http::cors::cors_layer;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::proxy::{decode_message, ProxyError, ProxyResult, ProxyService};

/// Time allowed for open connections to finish after a TLS shutdown.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProxyService>,
    pub max_body_size: usize,
}

/// HTTP front end of the proxy service.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
    service: Arc<ProxyService>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServiceConfig) -> Self {
        let service = ProxyService::new().with_result_timeout(config.timeouts.result_timeout());
        Self::with_service(config, Arc::new(service))
    }

    /// Create a server around an existing proxy service.
    pub fn with_service(config: ServiceConfig, service: Arc<ProxyService>) -> Self {
        let state = AppState {
            service: service.clone(),
            max_body_size: config.listener.max_body_size,
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            service,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let router = Router::new()
            .route(&config.api.proxy_path(), post(proxy_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.listener.max_body_size))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer());

        if config.cors.enabled {
            router.layer(cors_layer(&config.cors))
        } else {
            router
        }
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            path = %self.config.api.proxy_path(),
            "HTTP server starting"
        );

        let service = self.service.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
                service.shutdown();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server with TLS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(
            address = %addr,
            path = %self.config.api.proxy_path(),
            "HTTPS server starting"
        );

        let handle = axum_server::Handle::new();
        let signal_handle = handle.clone();
        let service = self.service.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
            service.shutdown();
            signal_handle.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    /// Router with all layers applied, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn service(&self) -> &Arc<ProxyService> {
        &self.service
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

/// `POST {prefix}/proxy`: execute the described request.
async fn proxy_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ProxyResult>, ApiError> {
    let request_id = request_id(&headers).to_string();

    let message = body
        .map_err(|rejection| body_error(rejection, state.max_body_size))
        .and_then(|body| decode_message(&body))
        .map_err(|e| {
            metrics::record_rejected(e.reason());
            ApiError::new(e, request_id.as_str())
        })?;

    tracing::debug!(request_id = %request_id, "Proxy call received");

    match state.service.submit(message).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => Err(ApiError::new(e, request_id)),
    }
}

fn body_error(rejection: BytesRejection, limit: usize) -> ProxyError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ProxyError::PayloadTooLarge(limit)
    } else {
        ProxyError::UnreadableBody(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    use crate::http::response::ErrorEnvelope;

    fn post(path: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn envelope(response: axum::response::Response) -> ErrorEnvelope {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn rejects_bad_bodies() {
        let router = HttpServer::new(ServiceConfig::default()).router();

        let response = router.clone().oneshot(post("/proxy", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(envelope(response).await.message, "Request body is not set");

        let response = router.clone().oneshot(post("/proxy", "nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = router.clone().oneshot(post("/proxy", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            envelope(response).await.message,
            "Unprocessable Entity. Expecting HTTP request configuration."
        );

        let response = router
            .oneshot(post("/proxy", r#"{"request":{"url":"http://a/","blob":"data:nope"}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn transport_failure_is_a_200_result() {
        let router = HttpServer::new(ServiceConfig::default()).router();
        let response = router
            .oneshot(post("/proxy", r#"{"request":{"method":"GET","url":"ftp://localhost/"}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let result: ProxyResult = serde_json::from_slice(&body).unwrap();
        assert!(result.response.is_error());
        assert_eq!(result.response.status(), 0);
    }

    #[tokio::test]
    async fn prefix_moves_the_endpoint() {
        let mut config = ServiceConfig::default();
        config.api.prefix = "/v1".into();
        let router = HttpServer::new(config).router();

        let response = router.clone().oneshot(post("/proxy", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = router.oneshot(post("/v1/proxy", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn body_limit_applies() {
        let mut config = ServiceConfig::default();
        config.listener.max_body_size = 8;
        let router = HttpServer::new(config).router();
        let response = router
            .oneshot(post("/proxy", r#"{"request":{"url":"http://a/"}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(response.headers().contains_key("x-request-id"));
        let envelope = envelope(response).await;
        assert!(envelope.error);
        assert_eq!(envelope.code, 413);
        assert_eq!(envelope.message, "Request body is larger than 8 bytes");
    }
}
