//! File-extension dispatch for document loading, exercised against real
//! files on disk rather than in-memory strings.

use mcpgate_openapi::{load_from_file, LoadedDocument};

const OPENAPI_JSON: &str = r#"{
    "openapi": "3.0.0",
    "info": { "title": "T", "version": "1" },
    "paths": {}
}"#;

#[test]
fn load_from_file_rejects_unrecognized_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spec.txt");
    std::fs::write(&path, OPENAPI_JSON).unwrap();
    assert!(load_from_file(&path).is_err());
}

#[test]
fn load_from_file_dispatches_on_yaml_extension_even_when_content_looks_like_json() {
    // A YAML flow-mapping document starts with '{', which content
    // sniffing alone would misclassify as JSON.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spec.yaml");
    std::fs::write(&path, "{openapi: \"3.0.0\", info: {title: T, version: \"1\"}, paths: {}}").unwrap();
    assert!(matches!(load_from_file(&path).unwrap(), LoadedDocument::OpenApi(_)));
}
