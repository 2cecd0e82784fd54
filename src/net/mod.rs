//! Network layer.
//!
//! Plain TCP listeners come straight from tokio; this module only holds the
//! optional TLS setup for the listener.

pub mod tls;

pub use tls::{load_tls_config, TlsError};
