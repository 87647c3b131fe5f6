//! CORS origin normalization and outbound header merging, shared by every
//! HTTP-surfaced adapter (SSE, WebSocket upgrade, Streamable HTTP).

use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Accepts the four shapes a gateway operator might reasonably configure:
/// a single origin string, a comma-separated list, a boolean `true`
/// meaning "any origin", or an explicit list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorsConfig {
    AllowAny(bool),
    Single(String),
    List(Vec<String>),
}

impl CorsConfig {
    pub fn origins(&self) -> Vec<String> {
        match self {
            CorsConfig::AllowAny(_) => Vec::new(),
            CorsConfig::Single(s) => s.split(',').map(|o| o.trim().to_string()).collect(),
            CorsConfig::List(list) => list.clone(),
        }
    }

    pub fn allows_any(&self) -> bool {
        matches!(self, CorsConfig::AllowAny(true))
    }

    /// Build the `tower-http` layer this config describes, exposing the
    /// session-id headers on every response per the component design.
    pub fn to_layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .expose_headers([
                axum::http::HeaderName::from_static("mcp-session-id"),
                axum::http::HeaderName::from_static("x-session-id"),
            ])
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any);

        if self.allows_any() {
            return layer.allow_origin(tower_http::cors::Any);
        }

        let origins: Vec<_> = self
            .origins()
            .into_iter()
            .filter_map(|o| axum::http::HeaderValue::from_str(&o).ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig::AllowAny(false)
    }
}

/// Merge header sets in the precedence order the router's forwarding
/// logic requires: gateway defaults, then bridge-configured headers, then
/// the originating client's own headers, each overriding the last.
/// Hop-by-hop headers are stripped from the result.
pub fn merge_headers(
    layers: &[&std::collections::HashMap<String, String>],
) -> std::collections::HashMap<String, String> {
    const HOP_BY_HOP: &[&str] = &["host", "connection", "content-length", "accept-encoding"];
    let mut merged = std::collections::HashMap::new();
    for layer in layers {
        for (k, v) in layer.iter() {
            merged.insert(k.to_lowercase(), v.clone());
        }
    }
    for hop in HOP_BY_HOP {
        merged.remove(*hop);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn comma_list_splits_into_distinct_origins() {
        let cfg = CorsConfig::Single("https://a.com, https://b.com".to_string());
        assert_eq!(cfg.origins(), vec!["https://a.com", "https://b.com"]);
    }

    #[test]
    fn allow_any_bool_true_has_no_explicit_origin_list() {
        let cfg = CorsConfig::AllowAny(true);
        assert!(cfg.allows_any());
        assert!(cfg.origins().is_empty());
    }

    #[test]
    fn merge_prefers_client_headers_and_strips_hop_by_hop() {
        let mut defaults = HashMap::new();
        defaults.insert("x-gateway".to_string(), "default".to_string());
        defaults.insert("host".to_string(), "internal".to_string());

        let mut client = HashMap::new();
        client.insert("x-gateway".to_string(), "client-set".to_string());

        let merged = merge_headers(&[&defaults, &client]);
        assert_eq!(merged.get("x-gateway").unwrap(), "client-set");
        assert!(!merged.contains_key("host"));
    }
}
