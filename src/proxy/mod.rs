//! Request proxy core.
//!
//! A caller describes an HTTP request as JSON. The service executes it with a
//! transport, records the exact bytes sent, and returns the target's response
//! (or the transport error) together with that wire metadata.
//!
//! # Components
//! - `message`: wire types of the proxy endpoint
//! - `payload`: request body normalization, byte buffer encoding
//! - `registry`: pending operations keyed by UUID
//! - `transport`: socket and native HTTP exchanges
//! - `assembler`: transport signals → `ProxyResult`
//! - `dispatcher`: `ProxyService`, the end-to-end flow

pub mod assembler;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod payload;
pub mod registry;
pub mod transport;

pub use dispatcher::ProxyService;
pub use error::ProxyError;
pub use message::{decode_message, ProxyMessage, ProxyRequest, ProxyResponse, ProxyResult};
pub use registry::{PendingRegistry, ProxyId};
