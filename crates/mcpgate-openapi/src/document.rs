//! Loads an OpenAPI spec or an already-formed MCP tool template by file
//! extension, auto-detecting JSON vs YAML and which of the two shapes the
//! document is.

use std::path::Path;

use mcpgate_core::error::{GatewayError, GatewayResult};
use openapiv3::OpenAPI;
use serde_json::Value;

/// Either a raw OpenAPI 3 document to convert, or a document that is
/// already a ready-made MCP tool template to load (optionally) through
/// the merge logic in `template.rs`.
pub enum LoadedDocument {
    OpenApi(OpenAPI),
    Template(Value),
}

/// Which of the two text formats a document was written in. `load_from_file`
/// derives this from the path's extension, per the component design;
/// `load_from_url` has no extension to trust and falls back to sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    fn from_extension(path: &Path) -> GatewayResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            other => Err(GatewayError::configuration(format!(
                "unsupported document extension {other:?}, expected .json, .yaml, or .yml"
            ))),
        }
    }

    fn sniff(content: &str) -> Self {
        if content.trim_start().starts_with('{') {
            Self::Json
        } else {
            Self::Yaml
        }
    }
}

/// Parse a document of the given format, then classify it per the
/// detection rule named in the component design: `openapi` + `paths`
/// means an OpenAPI document; anything else is conservatively treated as
/// a ready-made MCP tool template.
pub fn parse_document(content: &str, format: DocumentFormat) -> GatewayResult<LoadedDocument> {
    let value = parse_as_value(content, format)?;

    let is_openapi = value.get("openapi").is_some() && value.get("paths").is_some();
    if is_openapi {
        let spec: OpenAPI = serde_json::from_value(value)
            .map_err(|e| GatewayError::configuration(format!("invalid OpenAPI document: {e}")))?;
        return Ok(LoadedDocument::OpenApi(spec));
    }

    Ok(LoadedDocument::Template(value))
}

fn parse_as_value(content: &str, format: DocumentFormat) -> GatewayResult<Value> {
    match format {
        DocumentFormat::Json => serde_json::from_str(content)
            .map_err(|e| GatewayError::configuration(format!("invalid JSON document: {e}"))),
        DocumentFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| GatewayError::configuration(format!("invalid YAML document: {e}"))),
    }
}

/// Loads by file extension (`.json` vs `.yaml`/`.yml`) rather than
/// sniffing content, so a YAML flow-mapping document that happens to
/// start with `{` is not misdetected as JSON.
pub fn load_from_file(path: &Path) -> GatewayResult<LoadedDocument> {
    let format = DocumentFormat::from_extension(path)?;
    let content = std::fs::read_to_string(path).map_err(GatewayError::Io)?;
    parse_document(&content, format)
}

/// A URL has no extension to trust, so this falls back to sniffing the
/// fetched body's leading character.
pub async fn load_from_url(url: &str) -> GatewayResult<LoadedDocument> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| GatewayError::transport(format!("fetching document: {e}")))?;
    if !response.status().is_success() {
        return Err(GatewayError::UpstreamStatus {
            status: response.status().as_u16(),
            body: "failed to fetch OpenAPI/template document".to_string(),
        });
    }
    let content = response
        .text()
        .await
        .map_err(|e| GatewayError::transport(e.to_string()))?;
    let format = DocumentFormat::sniff(&content);
    parse_document(&content, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPENAPI_JSON: &str = r#"{
        "openapi": "3.0.0",
        "info": { "title": "T", "version": "1" },
        "paths": {}
    }"#;

    const OPENAPI_YAML: &str = "openapi: \"3.0.0\"\ninfo:\n  title: T\n  version: \"1\"\npaths: {}\n";

    const TEMPLATE_JSON: &str = r#"{ "server": { "name": "x" }, "tools": [] }"#;

    #[test]
    fn detects_openapi_json() {
        assert!(matches!(
            parse_document(OPENAPI_JSON, DocumentFormat::Json).unwrap(),
            LoadedDocument::OpenApi(_)
        ));
    }

    #[test]
    fn detects_openapi_yaml() {
        assert!(matches!(
            parse_document(OPENAPI_YAML, DocumentFormat::Yaml).unwrap(),
            LoadedDocument::OpenApi(_)
        ));
    }

    #[test]
    fn detects_ready_template() {
        assert!(matches!(
            parse_document(TEMPLATE_JSON, DocumentFormat::Json).unwrap(),
            LoadedDocument::Template(_)
        ));
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        assert!(parse_document("{ not valid json", DocumentFormat::Json).is_err());
    }
}
