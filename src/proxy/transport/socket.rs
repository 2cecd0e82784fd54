//! Raw socket transport.
//!
//! Opens a fresh TCP connection per exchange and drives it with hyper's
//! HTTP/1.1 client connection. The stream is wrapped in a
//! [`RecordingStream`] so the captured `httpMessage` is exactly what was
//! written to the socket.

use axum::http::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION};
use axum::http::{Method, Request, StatusCode};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::time::Instant;
use tokio::net::TcpStream;
use url::{Host, Url};

use crate::proxy::message::{ErrorResponse, InternalRequest};
use crate::proxy::payload::encode_for_wire;
use crate::proxy::registry::ProxyId;
use crate::proxy::transport::headers::{apply_default_headers, parse_header_block, render_header_block};
use crate::proxy::transport::recording::{RecordingStream, SentBytes};
use crate::proxy::transport::{
    now_millis, SendFuture, Transport, TransportFailure, TransportInfo, TransportOptions,
    TransportOutput, TransportResponse,
};

const MAX_REDIRECTS: usize = 10;

/// HTTP/1.1 over a plain TCP socket.
#[derive(Debug)]
pub struct SocketTransport {
    id: ProxyId,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
    options: TransportOptions,
}

/// One request/response pair on one connection.
struct Exchange {
    status: StatusCode,
    status_text: String,
    headers: HeaderMap,
    body: Bytes,
    message: Bytes,
}

impl Exchange {
    fn info(&self, start_time: u64) -> TransportInfo {
        TransportInfo {
            start_time,
            end_time: now_millis(),
            http_message: Some(self.message.clone()),
        }
    }

    fn into_error_response(self, error: &str) -> ErrorResponse {
        ErrorResponse {
            error: error.to_string(),
            status: self.status.as_u16(),
            status_text: Some(self.status_text),
            headers: Some(render_header_block(&self.headers)),
            payload: (!self.body.is_empty()).then(|| encode_for_wire(&self.body)),
        }
    }
}

impl SocketTransport {
    /// Validate the request up front; failures here take the error path.
    pub fn new(
        id: ProxyId,
        request: InternalRequest,
        options: TransportOptions,
    ) -> Result<Self, TransportFailure> {
        let method = Method::from_bytes(request.method.trim().as_bytes())
            .map_err(|_| TransportFailure::new(format!("Invalid HTTP method: {}", request.method)))?;
        let url = Url::parse(&request.url)
            .map_err(|e| TransportFailure::new(format!("Invalid URL {}: {}", request.url, e)))?;
        check_target(&url)?;

        let mut headers = parse_header_block(&request.headers)?;
        apply_default_headers(&mut headers, &options);

        Ok(Self {
            id,
            method,
            url,
            headers,
            body: request.payload,
            options,
        })
    }

    async fn run(self: Box<Self>) -> Result<TransportOutput, TransportFailure> {
        let start_time = now_millis();
        let started = Instant::now();

        // Shared across hops so a timeout can still report what was written.
        let sent = SentBytes::default();

        let exchange = match self.options.timeout() {
            Some(limit) => tokio::time::timeout(limit, self.perform(start_time, &sent))
                .await
                .map_err(|_| {
                    TransportFailure::new(format!("Request timeout after {} ms", limit.as_millis()))
                        .with_info(captured(&sent, start_time))
                })??,
            None => self.perform(start_time, &sent).await?,
        };

        tracing::debug!(
            proxy_id = %self.id,
            status = exchange.status.as_u16(),
            bytes = exchange.body.len(),
            "Socket exchange complete"
        );

        let info = exchange.info(start_time);
        Ok(TransportOutput {
            response: TransportResponse {
                status: exchange.status.as_u16(),
                status_text: exchange.status_text,
                headers: render_header_block(&exchange.headers),
                payload: (!exchange.body.is_empty()).then_some(exchange.body),
                loading_time: started.elapsed().as_millis() as u64,
            },
            info,
        })
    }

    /// Run the exchange, following redirects when enabled.
    async fn perform(&self, start_time: u64, sent: &SentBytes) -> Result<Exchange, TransportFailure> {
        let mut url = self.url.clone();
        let mut method = self.method.clone();
        let mut headers = self.headers.clone();
        let mut body = self.body.clone();
        let mut hops = 0;

        loop {
            let exchange = exchange(&url, &method, &headers, body.clone(), start_time, sent).await?;
            if !self.options.follow_redirects || !is_followed_redirect(exchange.status) {
                return Ok(exchange);
            }
            let Some(location) = exchange
                .headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
            else {
                return Ok(exchange);
            };

            if hops == MAX_REDIRECTS {
                let message = "Maximum number of redirects reached";
                let info = exchange.info(start_time);
                return Err(TransportFailure::new(message)
                    .with_info(info)
                    .with_response(exchange.into_error_response(message)));
            }

            let next = url.join(&location).map_err(|e| {
                TransportFailure::new(format!("Invalid redirect location {location}: {e}"))
                    .with_info(exchange.info(start_time))
            })?;
            check_target(&next).map_err(|f| f.with_info(exchange.info(start_time)))?;

            if matches!(
                exchange.status,
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
            ) && method != Method::HEAD
            {
                method = Method::GET;
                body = None;
                headers.remove(CONTENT_TYPE);
                headers.remove(CONTENT_LENGTH);
            }
            headers.remove(HOST);

            tracing::debug!(
                proxy_id = %self.id,
                status = exchange.status.as_u16(),
                location = %next,
                "Following redirect"
            );
            url = next;
            hops += 1;
        }
    }
}

impl Transport for SocketTransport {
    fn send(self: Box<Self>) -> SendFuture {
        Box::pin(self.run())
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn check_target(url: &Url) -> Result<(), TransportFailure> {
    match url.scheme() {
        "http" => {}
        "https" => {
            return Err(TransportFailure::new(
                "The socket transport does not support https. Set `native` to true in the request config.",
            ))
        }
        other => return Err(TransportFailure::new(format!("Unsupported protocol: {other}"))),
    }
    if url.host().is_none() {
        return Err(TransportFailure::new(format!("URL has no host: {url}")));
    }
    Ok(())
}

/// Host and port to dial, without IPv6 brackets.
fn dial_target(url: &Url) -> (String, u16) {
    let host = match url.host() {
        Some(Host::Ipv6(addr)) => addr.to_string(),
        Some(host) => host.to_string(),
        None => String::new(),
    };
    (host, url.port_or_known_default().unwrap_or(80))
}

/// Value of the `host` header for a URL.
fn host_header(url: &Url) -> Result<HeaderValue, TransportFailure> {
    let host = url.host_str().unwrap_or_default();
    let value = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).map_err(|_| TransportFailure::new(format!("Invalid host: {value}")))
}

fn build_request(
    url: &Url,
    method: &Method,
    headers: &HeaderMap,
    body: Option<Bytes>,
) -> Result<Request<Full<Bytes>>, TransportFailure> {
    let target = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };
    let mut request = Request::builder()
        .method(method.clone())
        .uri(target)
        .body(Full::new(body.unwrap_or_default()))
        .map_err(|e| TransportFailure::new(format!("Unable to build request: {e}")))?;

    let outgoing = request.headers_mut();
    outgoing.extend(headers.clone());
    if !outgoing.contains_key(HOST) {
        outgoing.insert(HOST, host_header(url)?);
    }
    Ok(request)
}

fn captured(sent: &SentBytes, start_time: u64) -> TransportInfo {
    TransportInfo {
        start_time,
        end_time: now_millis(),
        http_message: (!sent.is_empty()).then(|| sent.snapshot()),
    }
}

async fn exchange(
    url: &Url,
    method: &Method,
    headers: &HeaderMap,
    body: Option<Bytes>,
    start_time: u64,
    sent: &SentBytes,
) -> Result<Exchange, TransportFailure> {
    let request = build_request(url, method, headers, body)?;
    let (host, port) = dial_target(url);
    sent.clear();

    let stream = TcpStream::connect((host.as_str(), port)).await.map_err(|e| {
        TransportFailure::new(format!("connect {host}:{port} failed: {e}"))
            .with_info(TransportInfo::started_at(start_time))
    })?;
    let stream = RecordingStream::new(stream, sent.clone());

    let (mut sender, connection) = http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
        .await
        .map_err(|e| TransportFailure::new(e.to_string()).with_info(captured(sent, start_time)))?;

    // The sender is dropped once the body is read, which lets the
    // connection future finish.
    let roundtrip = async move {
        let response = sender.send_request(request).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok::<_, hyper::Error>((parts, body))
    };
    let (outcome, closed) = tokio::join!(roundtrip, connection);
    if let Err(e) = closed {
        tracing::trace!(error = %e, "Connection closed with error");
    }
    let (parts, body) = outcome
        .map_err(|e| TransportFailure::new(e.to_string()).with_info(captured(sent, start_time)))?;

    let status_text = parts
        .extensions
        .get::<hyper::ext::ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| parts.status.canonical_reason().map(str::to_string))
        .unwrap_or_default();

    Ok(Exchange {
        status: parts.status,
        status_text,
        headers: parts.headers,
        body,
        message: sent.snapshot(),
    })
}
