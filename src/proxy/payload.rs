//! Body codec.
//!
//! Converts the JSON shapes a caller may use for a request body (plain text,
//! a tagged byte buffer, or a `data:` URI) into a single byte buffer, and wraps
//! byte buffers back into the tagged form used in replies.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::proxy::message::ProxyRequest;

/// Lenient base64: padding optional, trailing bits tolerated.
const DATA_URI_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Source of a tagged byte buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadKind {
    #[default]
    #[serde(alias = "Buffer")]
    Bytes,
    ArrayBuffer,
}

/// Tagged byte buffer: `{"kind": "Bytes", "data": [..]}`.
///
/// Used for request bodies, response bodies and captured wire messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedPayload {
    #[serde(alias = "type")]
    pub kind: PayloadKind,
    pub data: Vec<u8>,
}

impl TransformedPayload {
    /// Collapse any buffer variant into the `Bytes` shape sent to callers.
    pub fn into_wire(self) -> Self {
        Self {
            kind: PayloadKind::Bytes,
            data: self.data,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Body as text, replacing invalid UTF-8 sequences.
    pub fn to_text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Request body as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestPayload {
    Text(String),
    Buffer(TransformedPayload),
    /// Any other JSON value. Carries no body; `blob` still applies.
    Other(Value),
}

/// The `blob` field did not hold a `data:<type>/<subtype>;base64,<payload>` URI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed data URI: {reason}")]
pub struct MalformedDataUri {
    reason: String,
}

impl MalformedDataUri {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Normalize the body of a request descriptor into bytes.
///
/// `payload` wins over `blob`. Returns `Ok(None)` when neither is set.
pub fn decode_request_body(request: &ProxyRequest) -> Result<Option<Bytes>, MalformedDataUri> {
    match &request.payload {
        Some(RequestPayload::Text(text)) => return Ok(Some(Bytes::copy_from_slice(text.as_bytes()))),
        Some(RequestPayload::Buffer(buffer)) => match buffer.kind {
            PayloadKind::Bytes | PayloadKind::ArrayBuffer => {
                return Ok(Some(Bytes::copy_from_slice(&buffer.data)))
            }
        },
        Some(RequestPayload::Other(value)) => {
            tracing::debug!(payload = %value, "Ignoring payload of unknown shape");
        }
        None => {}
    }
    match &request.blob {
        Some(blob) => decode_data_uri(blob).map(Some),
        None => Ok(None),
    }
}

/// Wrap a byte buffer for transmission to the caller.
pub fn encode_for_wire(bytes: &[u8]) -> TransformedPayload {
    TransformedPayload {
        kind: PayloadKind::Bytes,
        data: bytes.to_vec(),
    }
}

/// Decode `data:<type>/<subtype>;base64,<payload>`.
pub fn decode_data_uri(uri: &str) -> Result<Bytes, MalformedDataUri> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| MalformedDataUri::new("missing `data:` scheme"))?;
    let (mime, encoded) = rest
        .rsplit_once(";base64,")
        .ok_or_else(|| MalformedDataUri::new("missing `;base64,` marker"))?;

    match mime.split_once('/') {
        Some((top, sub)) if !top.is_empty() && !sub.is_empty() => {}
        _ => return Err(MalformedDataUri::new(format!("invalid media type `{mime}`"))),
    }

    let compact: Vec<u8> = encoded
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    DATA_URI_ENGINE
        .decode(compact)
        .map(Bytes::from)
        .map_err(|e| MalformedDataUri::new(format!("invalid base64 payload: {e}")))
}
