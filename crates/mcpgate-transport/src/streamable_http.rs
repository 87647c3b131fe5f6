//! Streamable HTTP adapter: a single endpoint that accepts any JSON-RPC
//! message over POST and responds with either a plain JSON body or a
//! streamed reply, correlated by a session id carried in headers.

use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use mcpgate_core::error::GatewayResult;
use uuid::Uuid;

pub const DEFAULT_HTTP_PATH: &str = "/mcp";
pub const SESSION_HEADER: &str = "mcp-session-id";
pub const SESSION_HEADER_COMPAT: &str = "x-session-id";

/// Resolve (or mint) the session id for an inbound Streamable HTTP
/// request per the precedence order named in the component design:
/// `mcp-session-id` header, then `x-session-id`, then a generated UUIDv4.
pub fn extract_or_generate_session_id(headers: &HeaderMap) -> String {
    header_str(headers, SESSION_HEADER)
        .or_else(|| header_str(headers, SESSION_HEADER_COMPAT))
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Stamp the resolved session id onto a response so the client can bind
/// future requests to the same session; both header spellings are set
/// for compatibility with clients that only read one of them.
pub fn apply_session_headers(headers: &mut HeaderMap, session_id: &str) -> GatewayResult<()> {
    let value = HeaderValue::from_str(session_id)
        .map_err(|e| mcpgate_core::error::GatewayError::transport(e.to_string()))?;
    headers.insert(HeaderName::from_static(SESSION_HEADER), value.clone());
    headers.insert(HeaderName::from_static(SESSION_HEADER_COMPAT), value);
    Ok(())
}

/// Flatten an axum `HeaderMap` into the lower-cased string map the router
/// uses for header-propagation precedence merging.
pub fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn prefers_primary_session_header_over_compat() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("abc"));
        headers.insert(SESSION_HEADER_COMPAT, HeaderValue::from_static("xyz"));
        assert_eq!(extract_or_generate_session_id(&headers), "abc");
    }

    #[test]
    fn generates_a_session_id_when_absent() {
        let headers = HeaderMap::new();
        let id = extract_or_generate_session_id(&headers);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn applies_both_header_spellings() {
        let mut headers = HeaderMap::new();
        apply_session_headers(&mut headers, "sess-1").unwrap();
        assert_eq!(headers.get(SESSION_HEADER).unwrap(), "sess-1");
        assert_eq!(headers.get(SESSION_HEADER_COMPAT).unwrap(), "sess-1");
    }
}
