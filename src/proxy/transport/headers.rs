//! Conversion between the `name: value` header block and `HeaderMap`.

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};

use crate::proxy::transport::{TransportFailure, TransportOptions};

/// Parse a header block, one `name: value` pair per line.
///
/// Blank lines and lines without a colon are skipped. Repeated names are kept.
pub fn parse_header_block(block: &str) -> Result<HeaderMap, TransportFailure> {
    let mut headers = HeaderMap::new();
    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            tracing::debug!(line = %line, "Skipping header line without a colon");
            continue;
        };
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| TransportFailure::new(format!("Invalid header name: {}", name.trim())))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| TransportFailure::new(format!("Invalid value for header {name}")))?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Add `user-agent` and `accept` from the options when they are missing.
pub fn apply_default_headers(headers: &mut HeaderMap, options: &TransportOptions) {
    if !options.default_headers {
        return;
    }
    let defaults = [
        (USER_AGENT, &options.default_user_agent),
        (ACCEPT, &options.default_accept),
    ];
    for (name, value) in defaults {
        if headers.contains_key(&name) {
            continue;
        }
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => tracing::warn!(header = %name, "Ignoring invalid default header value"),
        }
    }
}

/// Render headers as a `name: value` block joined by `\n`.
pub fn render_header_block(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes())))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines() {
        let headers = parse_header_block("content-type: application/json\r\nx-test-header: abc123\n\n").unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["x-test-header"], "abc123");
    }

    #[test]
    fn keeps_colons_in_values_and_duplicates() {
        let headers = parse_header_block("x-url: http://a:80/\nx-dup: 1\nx-dup: 2").unwrap();
        assert_eq!(headers["x-url"], "http://a:80/");
        assert_eq!(headers.get_all("x-dup").iter().count(), 2);
    }

    #[test]
    fn skips_garbage_and_rejects_bad_names() {
        assert!(parse_header_block("no colon here").unwrap().is_empty());
        assert!(parse_header_block("bad name: v").is_err());
    }

    #[test]
    fn default_headers_fill_gaps_only() {
        let mut options = TransportOptions {
            default_headers: true,
            ..TransportOptions::default()
        };
        options.default_accept = "application/json".into();
        let mut headers = parse_header_block("accept: text/html").unwrap();
        apply_default_headers(&mut headers, &options);
        assert_eq!(headers["accept"], "text/html");
        assert!(headers["user-agent"].to_str().unwrap().starts_with("request-proxy/"));

        let mut untouched = HeaderMap::new();
        apply_default_headers(&mut untouched, &TransportOptions::default());
        assert!(untouched.is_empty());
    }

    #[test]
    fn renders_block() {
        let headers = parse_header_block("a: 1\nb: 2").unwrap();
        assert_eq!(render_header_block(&headers), "a: 1\nb: 2");
    }
}
