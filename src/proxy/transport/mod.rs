//! Transports that perform one HTTP exchange on behalf of the proxy.
//!
//! # Data Flow
//! ```text
//! Connector::connect(kind, id, InternalRequest, options)
//!     → Box<dyn Transport>            (sync failure → TransportFailure)
//!     → Transport::send()             (spawned by the dispatcher)
//!     → Ok(TransportOutput) | Err(TransportFailure)
//!     → result assembler, keyed by id
//! ```
//!
//! Two implementations ship with the service:
//! - `socket`: hyper HTTP/1.1 over a recorded TCP stream (default)
//! - `native`: reqwest client (TLS, redirect policy)

pub mod headers;
pub mod native;
pub mod recording;
pub mod socket;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::task::AbortHandle;

use crate::proxy::message::{ErrorResponse, InternalRequest};
use crate::proxy::registry::ProxyId;

pub use native::NativeTransport;
pub use socket::SocketTransport;

/// Which transport implementation executes a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Socket,
    Native,
}

impl TransportKind {
    pub fn from_native_flag(native: bool) -> Self {
        if native {
            TransportKind::Native
        } else {
            TransportKind::Socket
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Socket => "socket",
            TransportKind::Native => "native",
        }
    }
}

/// Transport options accepted in the per-call `config` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportOptions {
    /// Exchange timeout in milliseconds.
    pub timeout: Option<u64>,
    pub follow_redirects: bool,
    /// Verify TLS certificates (native transport).
    pub validate_certificates: bool,
    /// Add `user-agent` and `accept` when the request has none.
    pub default_headers: bool,
    pub default_user_agent: String,
    pub default_accept: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            follow_redirects: true,
            validate_certificates: false,
            default_headers: false,
            default_user_agent: concat!("request-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
            default_accept: "*/*".to_string(),
        }
    }
}

impl TransportOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_millis)
    }
}

/// Response as read from the target, body still raw.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: String,
    pub payload: Option<Bytes>,
    pub loading_time: u64,
}

/// Wire metadata collected by a transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportInfo {
    pub start_time: u64,
    pub end_time: u64,
    pub http_message: Option<Bytes>,
}

impl TransportInfo {
    pub fn started_at(start_time: u64) -> Self {
        Self {
            start_time,
            end_time: now_millis(),
            http_message: None,
        }
    }
}

/// Completion signal.
#[derive(Debug, Clone)]
pub struct TransportOutput {
    pub response: TransportResponse,
    pub info: TransportInfo,
}

/// Error signal, carrying whatever the transport managed to collect.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportFailure {
    pub message: String,
    pub info: Option<TransportInfo>,
    /// Explicit error response; used verbatim when present.
    pub response: Option<ErrorResponse>,
}

impl TransportFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            info: None,
            response: None,
        }
    }

    pub fn with_info(mut self, info: TransportInfo) -> Self {
        self.info = Some(info);
        self
    }

    pub fn with_response(mut self, response: ErrorResponse) -> Self {
        self.response = Some(response);
        self
    }
}

pub type SendFuture = BoxFuture<'static, Result<TransportOutput, TransportFailure>>;

/// One HTTP exchange, created for a single proxy id and never reused.
pub trait Transport: Send {
    /// Perform the exchange. Resolves exactly once.
    fn send(self: Box<Self>) -> SendFuture;
}

/// Builds transports for the dispatcher.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        kind: TransportKind,
        id: ProxyId,
        request: InternalRequest,
        options: TransportOptions,
    ) -> Result<Box<dyn Transport>, TransportFailure>;
}

/// Connector for the built-in socket and native transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnector;

impl Connector for DefaultConnector {
    fn connect(
        &self,
        kind: TransportKind,
        id: ProxyId,
        request: InternalRequest,
        options: TransportOptions,
    ) -> Result<Box<dyn Transport>, TransportFailure> {
        match kind {
            TransportKind::Socket => Ok(Box::new(SocketTransport::new(id, request, options)?)),
            TransportKind::Native => Ok(Box::new(NativeTransport::new(id, request, options)?)),
        }
    }
}

/// Handle used to terminate a running transport.
#[derive(Debug)]
pub struct TransportHandle {
    task: AbortHandle,
}

impl TransportHandle {
    pub fn new(task: AbortHandle) -> Self {
        Self { task }
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults() {
        let options: TransportOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, TransportOptions::default());
        assert!(options.follow_redirects);
        assert!(options.timeout().is_none());
    }

    #[test]
    fn kind_from_flag() {
        assert_eq!(TransportKind::from_native_flag(false), TransportKind::Socket);
        assert_eq!(TransportKind::from_native_flag(true), TransportKind::Native);
    }

    #[test]
    fn default_connector_rejects_unusable_url() {
        let request = InternalRequest {
            method: "GET".into(),
            url: "not a url".into(),
            headers: String::new(),
            payload: None,
        };
        let result = DefaultConnector.connect(
            TransportKind::Socket,
            ProxyId::new_v4(),
            request,
            TransportOptions::default(),
        );
        assert!(result.is_err());
    }
}
