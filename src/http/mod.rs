//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → cors.rs (preflight, allow headers) when enabled
//!     → proxy handler → ProxyService::submit
//!     → 200 JSON ProxyResult, or response.rs error envelope
//! ```

pub mod cors;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::{ApiError, ErrorEnvelope};
pub use server::HttpServer;
