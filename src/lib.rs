//! HTTP request proxy service library.
//!
//! Callers POST a JSON description of an HTTP request; the service performs
//! it against the target and answers with the response plus the exact bytes
//! that went on the wire.

// Core
pub mod proxy;

// Front end
pub mod config;
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::{ProxyError, ProxyMessage, ProxyResult, ProxyService};
