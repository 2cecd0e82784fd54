//! Entry point for proxy calls.
//!
//! # Data Flow
//! ```text
//! ProxyMessage
//!     → validate, normalize body        (ProxyError on bad input)
//!     → registry.create                 (id + result channel)
//!     → connector.connect(kind, id, ..) (failure → error-shaped result)
//!     → spawn transport.send()          (handle attached to the entry)
//!     → assembler::complete | fail      (resolves the entry once)
//!     → ProxyResult back to the caller
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::observability::metrics;
use crate::proxy::assembler;
use crate::proxy::error::ProxyError;
use crate::proxy::message::{InternalRequest, ProxyMessage, ProxyResult};
use crate::proxy::registry::{PendingRegistry, ProxyId};
use crate::proxy::transport::{Connector, DefaultConnector, TransportHandle, TransportKind};

/// Executes proxy calls and tracks them until they resolve.
pub struct ProxyService {
    registry: PendingRegistry,
    connector: Arc<dyn Connector>,
    result_timeout: Option<Duration>,
}

impl Default for ProxyService {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyService {
    /// Service using the built-in transports and no result timeout.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(DefaultConnector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            registry: PendingRegistry::new(),
            connector,
            result_timeout: None,
        }
    }

    /// Give up on a call that has no result after `limit`.
    pub fn with_result_timeout(mut self, limit: Option<Duration>) -> Self {
        self.result_timeout = limit;
        self
    }

    pub fn registry(&self) -> &PendingRegistry {
        &self.registry
    }

    /// Run one proxy call to completion.
    ///
    /// Transport failures resolve as `Ok` with an error-shaped response.
    /// `Err` is reserved for invalid input, shutdown and the result timeout.
    pub async fn submit(&self, message: ProxyMessage) -> Result<ProxyResult, ProxyError> {
        let start = Instant::now();
        let Some(request) = message.request else {
            metrics::record_rejected(ProxyError::MissingRequest.reason());
            return Err(ProxyError::MissingRequest);
        };
        let options = message.config.unwrap_or_default();
        let internal = InternalRequest::from_descriptor(&request).map_err(|e| {
            let error = ProxyError::from(e);
            metrics::record_rejected(error.reason());
            error
        })?;
        let kind = TransportKind::from_native_flag(options.native);

        let (id, receiver) = self.registry.create(request);
        let _pending = PendingGuard {
            registry: &self.registry,
            id,
        };
        metrics::record_pending(self.registry.len());
        tracing::debug!(
            proxy_id = %id,
            transport = kind.as_str(),
            method = %internal.method,
            url = %internal.url,
            "Dispatching proxy request"
        );

        match self.connector.connect(kind, id, internal, options.transport) {
            Ok(transport) => {
                let registry = self.registry.clone();
                let task = tokio::spawn(async move {
                    match transport.send().await {
                        Ok(output) => assembler::complete(&registry, id, output),
                        Err(failure) => assembler::fail(&registry, id, failure),
                    }
                });
                // A missing entry here means it was resolved or aborted already.
                if self
                    .registry
                    .attach(id, TransportHandle::new(task.abort_handle()))
                    .is_err()
                {
                    task.abort();
                }
            }
            Err(failure) => {
                tracing::debug!(proxy_id = %id, error = %failure, "Transport could not be created");
                assembler::fail(&self.registry, id, failure);
            }
        }

        let outcome = match self.result_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    if let Some(mut operation) = self.registry.resolve(id) {
                        operation.abort();
                    }
                    metrics::record_pending(self.registry.len());
                    let error = ProxyError::Timeout(limit);
                    metrics::record_rejected(error.reason());
                    tracing::warn!(proxy_id = %id, timeout_ms = limit.as_millis() as u64, "Proxy request timed out");
                    return Err(error);
                }
            },
            None => receiver.await,
        };
        metrics::record_pending(self.registry.len());

        match outcome {
            Ok(result) => {
                let outcome = if result.response.is_error() { "error" } else { "success" };
                metrics::record_request(kind.as_str(), outcome, start);
                tracing::info!(
                    proxy_id = %id,
                    transport = kind.as_str(),
                    status = result.response.status(),
                    outcome,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Proxy request finished"
                );
                Ok(result)
            }
            Err(_) => {
                metrics::record_rejected(ProxyError::Aborted.reason());
                tracing::warn!(proxy_id = %id, "Proxy request aborted");
                Err(ProxyError::Aborted)
            }
        }
    }

    /// Abort every pending call. Their callers receive [`ProxyError::Aborted`].
    pub fn shutdown(&self) -> usize {
        let aborted = self.registry.abort_all();
        metrics::record_pending(self.registry.len());
        if aborted > 0 {
            tracing::info!(aborted, "Aborted pending proxy requests");
        }
        aborted
    }
}

/// Removes and aborts an operation whose caller stopped waiting.
struct PendingGuard<'a> {
    registry: &'a PendingRegistry,
    id: ProxyId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut operation) = self.registry.resolve(self.id) {
            tracing::debug!(proxy_id = %self.id, "Caller went away, aborting proxy request");
            operation.abort();
            metrics::record_pending(self.registry.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::message::{ProxyOptions, ProxyRequest, ProxyResponse};
    use crate::proxy::transport::{
        SendFuture, Transport, TransportFailure, TransportInfo, TransportOptions, TransportOutput,
        TransportResponse,
    };
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts transports whose exchange future was dropped.
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Serves `http://fake/echo/<delay_ms>` by echoing the URL, hangs on
    /// `http://fake/hang` and refuses anything else.
    #[derive(Default)]
    struct FakeConnector {
        dropped: Arc<AtomicUsize>,
    }

    struct FakeTransport {
        url: String,
        dropped: Arc<AtomicUsize>,
    }

    impl Connector for FakeConnector {
        fn connect(
            &self,
            _kind: TransportKind,
            _id: ProxyId,
            request: InternalRequest,
            _options: TransportOptions,
        ) -> Result<Box<dyn Transport>, TransportFailure> {
            if !request.url.starts_with("http://fake/") {
                return Err(TransportFailure::new("connect ECONNREFUSED"));
            }
            Ok(Box::new(FakeTransport {
                url: request.url,
                dropped: self.dropped.clone(),
            }))
        }
    }

    impl Transport for FakeTransport {
        fn send(self: Box<Self>) -> SendFuture {
            Box::pin(async move {
                let _guard = DropCounter(self.dropped.clone());
                let delay = match self.url.strip_prefix("http://fake/echo/") {
                    Some(ms) => Duration::from_millis(ms.parse().unwrap_or(0)),
                    None => Duration::from_secs(3600),
                };
                tokio::time::sleep(delay).await;
                Ok(TransportOutput {
                    response: TransportResponse {
                        status: 200,
                        status_text: "OK".into(),
                        headers: String::new(),
                        payload: Some(Bytes::from(self.url.clone())),
                        loading_time: delay.as_millis() as u64,
                    },
                    info: TransportInfo::default(),
                })
            })
        }
    }

    fn message(url: &str) -> ProxyMessage {
        ProxyMessage {
            request: Some(ProxyRequest {
                method: "GET".into(),
                url: url.into(),
                headers: None,
                payload: None,
                blob: None,
                multipart: None,
            }),
            config: Some(ProxyOptions::default()),
        }
    }

    fn service() -> (Arc<ProxyService>, Arc<AtomicUsize>) {
        let connector = FakeConnector::default();
        let dropped = connector.dropped.clone();
        (Arc::new(ProxyService::with_connector(Arc::new(connector))), dropped)
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn concurrent_calls_get_their_own_results() {
        let (service, _) = service();
        let delays = [60, 10, 40, 0, 25];
        let calls = delays.iter().map(|delay| {
            let service = service.clone();
            let url = format!("http://fake/echo/{delay}");
            async move { (url.clone(), service.submit(message(&url)).await) }
        });

        for (url, result) in futures_util::future::join_all(calls).await {
            let result = result.unwrap();
            let body = result.response.payload().unwrap().to_text_lossy();
            assert_eq!(body, url);
        }
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn connect_failure_is_an_error_shaped_result() {
        let (service, _) = service();
        let result = service.submit(message("http://127.0.0.1:1/")).await.unwrap();
        match result.response {
            ProxyResponse::Error(error) => {
                assert_eq!(error.status, 0);
                assert_eq!(error.error, "connect ECONNREFUSED");
            }
            other => panic!("unexpected response {other:?}"),
        }
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_dispatch() {
        let (service, _) = service();
        let missing = service.submit(ProxyMessage::default()).await;
        assert!(matches!(missing, Err(ProxyError::MissingRequest)));

        let mut bad_blob = message("http://fake/echo/0");
        if let Some(request) = bad_blob.request.as_mut() {
            request.blob = Some("not a data uri".into());
        }
        let malformed = service.submit(bad_blob).await;
        assert!(matches!(malformed, Err(ProxyError::MalformedDataUri(_))));
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn shutdown_aborts_pending_calls() {
        let (service, dropped) = service();
        let calls: Vec<_> = (0..3)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.submit(message("http://fake/hang")).await })
            })
            .collect();

        let registry = service.registry().clone();
        wait_until(|| registry.len() == 3).await;
        assert_eq!(service.shutdown(), 3);
        assert!(service.registry().is_empty());

        for call in calls {
            assert!(matches!(call.await.unwrap(), Err(ProxyError::Aborted)));
        }
        wait_until(|| dropped.load(Ordering::SeqCst) == 3).await;
    }

    #[tokio::test]
    async fn dropped_caller_aborts_the_transport() {
        let (service, dropped) = service();
        let call = {
            let service = service.clone();
            tokio::spawn(async move { service.submit(message("http://fake/hang")).await })
        };

        let registry = service.registry().clone();
        wait_until(|| registry.len() == 1).await;
        call.abort();
        assert!(call.await.unwrap_err().is_cancelled());

        wait_until(|| registry.is_empty()).await;
        wait_until(|| dropped.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn result_timeout_aborts_the_transport() {
        let connector = FakeConnector::default();
        let dropped = connector.dropped.clone();
        let service = ProxyService::with_connector(Arc::new(connector))
            .with_result_timeout(Some(Duration::from_millis(50)));

        let outcome = service.submit(message("http://fake/hang")).await;
        assert!(matches!(outcome, Err(ProxyError::Timeout(_))));
        assert!(service.registry().is_empty());
        wait_until(|| dropped.load(Ordering::SeqCst) == 1).await;

        let quick = service.submit(message("http://fake/echo/0")).await.unwrap();
        assert_eq!(quick.response.status(), 200);
    }
}
