//! Wire types exchanged with callers of the proxy endpoint.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::proxy::error::ProxyError;
use crate::proxy::payload::{decode_request_body, MalformedDataUri, RequestPayload, TransformedPayload};
use crate::proxy::transport::TransportOptions;

/// Body of a `POST /proxy` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ProxyRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ProxyOptions>,
}

/// Description of the HTTP request to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    /// One `name: value` pair per line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<RequestPayload>,
    /// `data:` URI carrying a file body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
    /// Store-internal form data; never forwarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multipart: Option<Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Per-call execution options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyOptions {
    /// Use the native HTTP stack instead of the raw socket transport.
    #[serde(default)]
    pub native: bool,
    #[serde(flatten)]
    pub transport: TransportOptions,
}

/// Request handed to a transport: body normalized, store-only fields dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalRequest {
    pub method: String,
    pub url: String,
    pub headers: String,
    pub payload: Option<Bytes>,
}

impl InternalRequest {
    pub fn from_descriptor(request: &ProxyRequest) -> Result<Self, MalformedDataUri> {
        Ok(Self {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone().unwrap_or_default(),
            payload: decode_request_body(request)?,
        })
    }
}

/// Response received from the target server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    /// One `name: value` pair per line.
    #[serde(default)]
    pub headers: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TransformedPayload>,
    /// Milliseconds between sending the request and reading the whole body.
    #[serde(default)]
    pub loading_time: u64,
}

/// Transport-level failure reported in place of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TransformedPayload>,
}

impl ErrorResponse {
    /// Error with no response data and a zero status.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            status: 0,
            status_text: None,
            headers: None,
            payload: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProxyResponse {
    Error(ErrorResponse),
    Success(HttpResponse),
}

impl ProxyResponse {
    pub fn status(&self) -> u16 {
        match self {
            ProxyResponse::Error(e) => e.status,
            ProxyResponse::Success(r) => r.status,
        }
    }

    pub fn payload(&self) -> Option<&TransformedPayload> {
        match self {
            ProxyResponse::Error(e) => e.payload.as_ref(),
            ProxyResponse::Success(r) => r.payload.as_ref(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ProxyResponse::Error(_))
    }
}

/// Metadata about the bytes exchanged with the target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyTransportInfo {
    /// Milliseconds since the Unix epoch, before connecting.
    pub start_time: u64,
    /// Milliseconds since the Unix epoch, after the body was read.
    pub end_time: u64,
    /// The outbound HTTP message as written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_message: Option<TransformedPayload>,
}

/// Outcome of one proxied exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyResult {
    pub response: ProxyResponse,
    pub transport: ProxyTransportInfo,
}

/// Parse the raw body of a proxy call.
pub fn decode_message(body: &[u8]) -> Result<ProxyMessage, ProxyError> {
    if body.is_empty() {
        return Err(ProxyError::EmptyBody);
    }
    let value: Value = serde_json::from_slice(body).map_err(|_| ProxyError::NotJson)?;
    if value.get("request").map_or(true, Value::is_null) {
        return Err(ProxyError::MissingRequest);
    }
    serde_json::from_value(value).map_err(|e| ProxyError::InvalidRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::payload::{encode_for_wire, PayloadKind};

    #[test]
    fn decodes_minimal_message() {
        let msg = decode_message(br#"{"request":{"method":"GET","url":"http://localhost/echo/get"}}"#).unwrap();
        let request = msg.request.unwrap();
        assert_eq!(request.method, "GET");
        assert!(request.payload.is_none());
        assert!(msg.config.is_none());
    }

    #[test]
    fn decodes_options() {
        let msg = decode_message(
            br#"{"request":{"url":"http://a/"},"config":{"native":true,"timeout":500,"followRedirects":false,"hosts":[]}}"#,
        )
        .unwrap();
        let config = msg.config.unwrap();
        assert!(config.native);
        assert_eq!(config.transport.timeout, Some(500));
        assert!(!config.transport.follow_redirects);
        assert_eq!(msg.request.unwrap().method, "GET");
    }

    #[test]
    fn rejects_bad_bodies() {
        assert!(matches!(decode_message(b""), Err(ProxyError::EmptyBody)));
        assert!(matches!(decode_message(b"not json"), Err(ProxyError::NotJson)));
        assert!(matches!(decode_message(b"{}"), Err(ProxyError::MissingRequest)));
        assert!(matches!(decode_message(br#"{"request":null}"#), Err(ProxyError::MissingRequest)));
        assert!(matches!(
            decode_message(br#"{"request":{"method":"GET"}}"#),
            Err(ProxyError::InvalidRequest(_))
        ));
    }

    #[test]
    fn unknown_payload_shape_is_accepted() {
        let msg = decode_message(
            br#"{"request":{"method":"POST","url":"http://a/","payload":{"foo":1},"blob":"data:text/plain;base64,dGVzdA=="}}"#,
        )
        .unwrap();
        let internal = InternalRequest::from_descriptor(&msg.request.unwrap()).unwrap();
        assert_eq!(internal.payload, Some(Bytes::from_static(b"test")));

        let msg = decode_message(br#"{"request":{"url":"http://a/","payload":{"kind":"Foo","data":[1]}}}"#).unwrap();
        let internal = InternalRequest::from_descriptor(&msg.request.unwrap()).unwrap();
        assert!(internal.payload.is_none());
    }

    #[test]
    fn internal_request_strips_body_fields() {
        let request = ProxyRequest {
            method: "POST".into(),
            url: "http://a/".into(),
            headers: Some("content-type: text/plain".into()),
            payload: None,
            blob: Some("data:text/plain;base64,dGVzdA==".into()),
            multipart: Some(serde_json::json!([{"name": "f"}])),
        };
        let internal = InternalRequest::from_descriptor(&request).unwrap();
        assert_eq!(internal.payload, Some(Bytes::from_static(b"test")));
        assert_eq!(internal.headers, "content-type: text/plain");
    }

    #[test]
    fn responses_serialize_by_variant() {
        let ok = ProxyResponse::Success(HttpResponse {
            status: 200,
            status_text: "OK".into(),
            headers: "content-type: text/plain".into(),
            payload: Some(encode_for_wire(b"hi")),
            loading_time: 3,
        });
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["statusText"], "OK");
        assert_eq!(json["payload"]["kind"], "Bytes");

        let err = ProxyResponse::Error(ErrorResponse::from_message("connect ECONNREFUSED"));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({"error": "connect ECONNREFUSED", "status": 0}));

        let back: ProxyResponse = serde_json::from_value(json).unwrap();
        assert!(back.is_error());
        let back: ProxyResponse = serde_json::to_value(&ok)
            .and_then(serde_json::from_value)
            .unwrap();
        assert_eq!(back.payload().map(|p| p.kind), Some(PayloadKind::Bytes));
    }

    #[test]
    fn transport_info_omits_missing_message() {
        let json = serde_json::to_value(ProxyTransportInfo::default()).unwrap();
        assert_eq!(json, serde_json::json!({"startTime": 0, "endTime": 0}));
    }
}
