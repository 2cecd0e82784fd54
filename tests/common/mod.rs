//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

use request_proxy::config::ServiceConfig;
use request_proxy::{HttpServer, Shutdown};

fn header_map(headers: &HeaderMap) -> Value {
    let map: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            )
        })
        .collect();
    Value::Object(map)
}

async fn echo_get(headers: HeaderMap) -> impl IntoResponse {
    (
        [("x-test-api", "echo-get")],
        Json(json!({ "headers": header_map(&headers) })),
    )
}

async fn echo_post(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    (
        [("x-test-api", "echo-post")],
        Json(json!({
            "headers": header_map(&headers),
            "body": String::from_utf8_lossy(&body),
        })),
    )
}

async fn slow() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(30)).await;
    StatusCode::NO_CONTENT
}

/// Start the echo backend on an ephemeral port.
///
/// - `GET /echo/get`: request headers as JSON
/// - `POST /echo/post`: request headers and body as JSON
/// - `GET /redirect`: 303 to `/echo/get`
/// - `GET /slow`: answers after 30 seconds
///
/// Wrong methods get 405.
pub async fn start_echo_backend() -> SocketAddr {
    let app = Router::new()
        .route("/echo/get", get(echo_get))
        .route("/echo/post", post(echo_post))
        .route("/redirect", get(|| async { Redirect::to("/echo/get") }))
        .route("/slow", get(slow));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// A running proxy service.
pub struct TestService {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub server: HttpServerHandle,
}

pub type HttpServerHandle = tokio::task::JoinHandle<Result<(), std::io::Error>>;

impl TestService {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/proxy", self.addr)
    }
}

/// Start the proxy service on an ephemeral port.
pub async fn start_service(mut config: ServiceConfig) -> TestService {
    config.listener.bind_address = "127.0.0.1:0".to_string();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let server_shutdown = shutdown.subscribe();
    let server = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    TestService {
        addr,
        shutdown,
        server,
    }
}

/// Client without pooling or system proxy settings.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
