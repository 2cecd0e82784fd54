use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request the proxy should execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<String>,
    /// Text body, or a `{"kind": "Bytes", "data": [..]}` buffer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Body as a `data:<mime>;base64,<..>` URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

impl ProxyRequest {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            headers: None,
            payload: None,
            blob: None,
        }
    }

    /// Append a `name: value` header line.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let line = format!("{}: {}", name, value);
        self.headers = Some(match self.headers.take() {
            Some(block) => format!("{}\n{}", block, line),
            None => line,
        });
        self
    }

    pub fn text(mut self, body: &str) -> Self {
        self.payload = Some(Value::String(body.to_string()));
        self
    }

    pub fn bytes(mut self, body: &[u8]) -> Self {
        self.payload = Some(serde_json::json!({ "kind": "Bytes", "data": body }));
        self
    }

    pub fn blob(mut self, data_uri: &str) -> Self {
        self.blob = Some(data_uri.to_string());
        self
    }
}

/// Per-call options. Unset fields use the service defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyOptions {
    pub native: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_redirects: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate_certificates: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_headers: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ProxyMessage<'a> {
    request: &'a ProxyRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a ProxyOptions>,
}

/// Tagged byte buffer as sent by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buffer {
    pub kind: String,
    pub data: Vec<u8>,
}

impl Buffer {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Target response, or the transport error in its place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    /// Set when the exchange failed.
    pub error: Option<String>,
    /// Zero when no response was received.
    pub status: u16,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub headers: Option<String>,
    #[serde(default)]
    pub payload: Option<Buffer>,
    #[serde(default)]
    pub loading_time: Option<u64>,
}

impl ProxyResponse {
    /// Value of the first header named `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.as_deref()?.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    pub fn text(&self) -> Option<String> {
        self.payload.as_ref().map(Buffer::text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportInfo {
    pub start_time: u64,
    pub end_time: u64,
    #[serde(default)]
    pub http_message: Option<Buffer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyReply {
    pub response: ProxyResponse,
    pub transport: TransportInfo,
}

/// Error envelope returned for rejected calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: bool,
    pub code: u16,
    pub message: String,
    pub detail: String,
}

pub struct ProxyClient {
    client: Client,
    proxy_url: String,
}

impl ProxyClient {
    /// `proxy_url` is the service base URL, including any API prefix.
    pub fn new(proxy_url: &str) -> Self {
        Self {
            client: Client::new(),
            proxy_url: proxy_url.trim_end_matches('/').to_string(),
        }
    }

    /// Execute a request through the proxy.
    pub async fn proxy(
        &self,
        request: &ProxyRequest,
        options: Option<&ProxyOptions>,
    ) -> Result<ProxyReply, Box<dyn std::error::Error>> {
        let body = serde_json::to_vec(&ProxyMessage {
            request,
            config: options,
        })?;
        let resp = self.proxy_raw(body).await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return match serde_json::from_str::<ApiError>(&text) {
                Ok(api_error) => Err(format!("Proxy returned error {}: {}", api_error.code, api_error.message).into()),
                Err(_) => Err(format!("Proxy returned error status {}: {}", status, text).into()),
            };
        }

        match serde_json::from_str::<ProxyReply>(&text) {
            Ok(reply) => Ok(reply),
            Err(e) => Err(e.into()),
        }
    }

    /// POST an arbitrary body to the proxy endpoint.
    pub async fn proxy_raw(&self, body: impl Into<reqwest::Body>) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(format!("{}/proxy", self.proxy_url))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
    }
}
