//! Registry of in-flight proxy operations.
//!
//! Every call to the proxy gets an entry keyed by a fresh UUID. The entry owns
//! the one-shot sender its caller is waiting on, so a result can be delivered
//! at most once: [`PendingRegistry::resolve`] removes the entry atomically and
//! consumes the sender.

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::proxy::message::{ProxyRequest, ProxyResult};
use crate::proxy::transport::TransportHandle;

/// Identifier of one proxy operation.
pub type ProxyId = Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No pending proxy operation with id {0}")]
    UnknownId(ProxyId),
}

/// State of one in-flight call.
#[derive(Debug)]
pub struct PendingOperation {
    request: ProxyRequest,
    aborted: bool,
    transport: Option<TransportHandle>,
    completion: oneshot::Sender<ProxyResult>,
}

impl PendingOperation {
    pub fn request(&self) -> &ProxyRequest {
        &self.request
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn transport(&self) -> Option<&TransportHandle> {
        self.transport.as_ref()
    }

    /// Mark aborted and stop the transport. Dropping the operation afterwards
    /// closes the caller's channel without a result.
    pub fn abort(&mut self) {
        self.aborted = true;
        if let Some(handle) = &self.transport {
            handle.abort();
        }
    }

    /// Hand the result to the waiting caller.
    ///
    /// Returns `false` if the operation was aborted or the caller went away.
    pub fn deliver(self, result: ProxyResult) -> bool {
        if self.aborted {
            return false;
        }
        self.completion.send(result).is_ok()
    }
}

/// Concurrent map of pending operations.
///
/// Cloning is cheap; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct PendingRegistry {
    inner: Arc<DashMap<ProxyId, PendingOperation>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new operation and return its id and the result channel.
    pub fn create(&self, request: ProxyRequest) -> (ProxyId, oneshot::Receiver<ProxyResult>) {
        let (completion, receiver) = oneshot::channel();
        let operation = PendingOperation {
            request,
            aborted: false,
            transport: None,
            completion,
        };
        let mut id = Uuid::new_v4();
        // v4 collisions are practically impossible; retry rather than overwrite.
        while self.inner.contains_key(&id) {
            id = Uuid::new_v4();
        }
        self.inner.insert(id, operation);
        (id, receiver)
    }

    /// Record the transport running an operation.
    pub fn attach(&self, id: ProxyId, handle: TransportHandle) -> Result<(), RegistryError> {
        match self.inner.get_mut(&id) {
            Some(mut entry) => {
                entry.transport = Some(handle);
                Ok(())
            }
            None => Err(RegistryError::UnknownId(id)),
        }
    }

    /// Remove and return an operation. `None` if it was already resolved.
    pub fn resolve(&self, id: ProxyId) -> Option<PendingOperation> {
        self.inner.remove(&id).map(|(_, operation)| operation)
    }

    /// Abort every pending operation and empty the registry.
    ///
    /// Returns the number of operations aborted.
    pub fn abort_all(&self) -> usize {
        let mut aborted = 0;
        self.inner.retain(|id, operation| {
            tracing::debug!(proxy_id = %id, "Aborting pending operation");
            operation.abort();
            aborted += 1;
            false
        });
        aborted
    }

    pub fn contains(&self, id: ProxyId) -> bool {
        self.inner.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
