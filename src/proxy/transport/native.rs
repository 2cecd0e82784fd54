//! Native transport backed by `reqwest`.
//!
//! Handles TLS, redirects and certificate policy. The HTTP message it reports
//! is rebuilt from the request as it was handed to the client, since reqwest
//! does not expose the bytes it writes.

use axum::http::header::{HeaderValue, ACCEPT, HOST};
use bytes::{BufMut, Bytes, BytesMut};
use reqwest::redirect::Policy;
use std::time::Instant;

use crate::proxy::message::InternalRequest;
use crate::proxy::registry::ProxyId;
use crate::proxy::transport::headers::{apply_default_headers, parse_header_block, render_header_block};
use crate::proxy::transport::{
    now_millis, SendFuture, Transport, TransportFailure, TransportInfo, TransportOptions,
    TransportOutput, TransportResponse,
};

const MAX_REDIRECTS: usize = 10;

/// Exchange performed by a per-call `reqwest::Client`.
pub struct NativeTransport {
    id: ProxyId,
    client: reqwest::Client,
    request: reqwest::Request,
    message: Bytes,
}

impl NativeTransport {
    pub fn new(
        id: ProxyId,
        request: InternalRequest,
        options: TransportOptions,
    ) -> Result<Self, TransportFailure> {
        let method = reqwest::Method::from_bytes(request.method.trim().as_bytes())
            .map_err(|_| TransportFailure::new(format!("Invalid HTTP method: {}", request.method)))?;
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| TransportFailure::new(format!("Invalid URL {}: {}", request.url, e)))?;
        let mut headers = parse_header_block(&request.headers)?;
        apply_default_headers(&mut headers, &options);
        // reqwest adds this at execute time; set it here so the rendered message matches.
        headers
            .entry(ACCEPT)
            .or_insert_with(|| HeaderValue::from_static("*/*"));

        let redirect = if options.follow_redirects {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::none()
        };
        let mut builder = reqwest::Client::builder()
            .redirect(redirect)
            .danger_accept_invalid_certs(!options.validate_certificates)
            .pool_max_idle_per_host(0);
        if let Some(limit) = options.timeout() {
            builder = builder.timeout(limit);
        }
        let client = builder
            .build()
            .map_err(|e| TransportFailure::new(format!("Unable to create HTTP client: {e}")))?;

        let mut outgoing = client.request(method, url).headers(headers);
        if let Some(body) = request.payload {
            outgoing = outgoing.body(body);
        }
        let request = outgoing
            .build()
            .map_err(|e| TransportFailure::new(format!("Unable to build request: {e}")))?;
        let message = render_message(&request);

        Ok(Self {
            id,
            client,
            request,
            message,
        })
    }

    async fn run(self: Box<Self>) -> Result<TransportOutput, TransportFailure> {
        let NativeTransport {
            id,
            client,
            request,
            message,
        } = *self;
        let start_time = now_millis();
        let started = Instant::now();
        let info = |end_time| TransportInfo {
            start_time,
            end_time,
            http_message: Some(message.clone()),
        };

        let response = client
            .execute(request)
            .await
            .map_err(|e| TransportFailure::new(describe(&e)).with_info(info(now_millis())))?;

        let status = response.status();
        let headers = render_header_block(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportFailure::new(describe(&e)).with_info(info(now_millis())))?;

        tracing::debug!(
            proxy_id = %id,
            status = status.as_u16(),
            bytes = body.len(),
            "Native exchange complete"
        );

        Ok(TransportOutput {
            response: TransportResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                headers,
                payload: (!body.is_empty()).then_some(body),
                loading_time: started.elapsed().as_millis() as u64,
            },
            info: info(now_millis()),
        })
    }
}

impl Transport for NativeTransport {
    fn send(self: Box<Self>) -> SendFuture {
        Box::pin(self.run())
    }
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("Request timeout: {error}")
    } else {
        error.to_string()
    }
}

/// Serialize the request line, headers and body as HTTP/1.1.
fn render_message(request: &reqwest::Request) -> Bytes {
    let url = request.url();
    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut message = BytesMut::new();
    message.put_slice(format!("{} {} HTTP/1.1\r\n", request.method(), target).as_bytes());
    if !request.headers().contains_key(HOST) {
        let host = url.host_str().unwrap_or_default();
        let line = match url.port() {
            Some(port) => format!("host: {host}:{port}\r\n"),
            None => format!("host: {host}\r\n"),
        };
        message.put_slice(line.as_bytes());
    }
    for (name, value) in request.headers() {
        message.put_slice(name.as_str().as_bytes());
        message.put_slice(b": ");
        message.put_slice(value.as_bytes());
        message.put_slice(b"\r\n");
    }
    let body = request.body().and_then(|b| b.as_bytes()).unwrap_or_default();
    if !body.is_empty() && !request.headers().contains_key(reqwest::header::CONTENT_LENGTH) {
        message.put_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
    }
    message.put_slice(b"\r\n");
    message.put_slice(body);
    message.freeze()
}
