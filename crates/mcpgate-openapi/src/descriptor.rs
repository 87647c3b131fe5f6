//! Synthesizes `ToolDescriptor`s from a parsed OpenAPI document.
//!
//! Every `(path, method)` pair becomes exactly one tool; there is no
//! Tool/Resource split here the way an MCP SDK's OpenAPI bridge might
//! draw one for GET operations, since this gateway's bridge exposes
//! every operation uniformly as an invocable tool.

use openapiv3::{
    OpenAPI, Operation, Parameter, ParameterSchemaOrContent, ReferenceOr, Schema, StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgPosition {
    Path,
    Query,
    Body,
    Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ArgType {
    fn from_openapi_type(ty: Option<&str>) -> Self {
        match ty {
            Some("integer") => ArgType::Integer,
            Some("number") => ArgType::Number,
            Some("boolean") => ArgType::Boolean,
            Some("array") => ArgType::Array,
            Some("object") => ArgType::Object,
            _ => ArgType::String,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolArg {
    pub name: String,
    pub description: Option<String>,
    pub arg_type: ArgType,
    pub required: bool,
    pub position: ArgPosition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub url: String,
    pub method: String,
    pub static_headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseTemplate {
    pub prepend_body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub args: Vec<ToolArg>,
    pub request_template: RequestTemplate,
    pub response_template: ResponseTemplate,
}

/// Convert every operation in an OpenAPI document into a `ToolDescriptor`.
pub fn synthesize_tools(spec: &OpenAPI) -> Vec<ToolDescriptor> {
    let mut tools = Vec::new();
    for (path, path_item) in &spec.paths.paths {
        let ReferenceOr::Item(path_item) = path_item else {
            continue;
        };
        let methods: [(&str, &Option<Operation>); 5] = [
            ("GET", &path_item.get),
            ("POST", &path_item.post),
            ("PUT", &path_item.put),
            ("DELETE", &path_item.delete),
            ("PATCH", &path_item.patch),
        ];
        for (method, operation) in methods {
            if let Some(operation) = operation {
                tools.push(synthesize_tool(method, path, operation));
            }
        }
    }
    tools
}

fn synthesize_tool(method: &str, path: &str, operation: &Operation) -> ToolDescriptor {
    let name = tool_name(method, path, operation);
    let description = operation
        .description
        .clone()
        .or_else(|| operation.summary.clone())
        .unwrap_or_else(|| format!("{method} {path}"));

    let mut args: Vec<ToolArg> = operation
        .parameters
        .iter()
        .filter_map(|p| match p {
            ReferenceOr::Item(param) => Some(extract_parameter(param)),
            ReferenceOr::Reference { .. } => None,
        })
        .collect();

    let mut static_headers = Vec::new();
    if let Some(body_args) = extract_body_args(operation) {
        if matches!(method, "POST" | "PUT" | "PATCH") {
            static_headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        args.extend(body_args);
    }

    ToolDescriptor {
        name,
        description,
        args,
        request_template: RequestTemplate {
            url: path.to_string(),
            method: method.to_string(),
            static_headers,
        },
        response_template: ResponseTemplate {
            prepend_body: response_summary(operation),
        },
    }
}

/// Summarize the success response's documented shape, if any, as a prefix
/// shown before the actual body returned by a call.
fn response_summary(operation: &Operation) -> Option<String> {
    operation
        .responses
        .responses
        .iter()
        .find(|(status, _)| matches!(status, StatusCode::Code(200..=299) | StatusCode::Range(2)))
        .and_then(|(_, response)| match response {
            ReferenceOr::Item(response) if !response.description.is_empty() => {
                Some(format!("{}\n\n", response.description))
            }
            _ => None,
        })
}

fn tool_name(method: &str, path: &str, operation: &Operation) -> String {
    operation.operation_id.clone().unwrap_or_else(|| {
        let path_part = path
            .trim_start_matches('/')
            .replace('/', "_")
            .replace(['{', '}'], "");
        format!("{}_{}", method.to_lowercase(), path_part)
    })
}

fn extract_parameter(param: &Parameter) -> ToolArg {
    let (name, position, required, description, schema) = match param {
        Parameter::Query { parameter_data, .. } => (
            parameter_data.name.clone(),
            ArgPosition::Query,
            parameter_data.required,
            parameter_data.description.clone(),
            schema_of(&parameter_data.format),
        ),
        Parameter::Header { parameter_data, .. } => (
            parameter_data.name.clone(),
            ArgPosition::Header,
            parameter_data.required,
            parameter_data.description.clone(),
            schema_of(&parameter_data.format),
        ),
        Parameter::Path { parameter_data, .. } => (
            parameter_data.name.clone(),
            ArgPosition::Path,
            true,
            parameter_data.description.clone(),
            schema_of(&parameter_data.format),
        ),
        Parameter::Cookie { parameter_data, .. } => (
            parameter_data.name.clone(),
            ArgPosition::Query,
            parameter_data.required,
            parameter_data.description.clone(),
            schema_of(&parameter_data.format),
        ),
    };

    ToolArg {
        name,
        description,
        arg_type: ArgType::from_openapi_type(schema.as_deref()),
        required,
        position,
    }
}

fn schema_of(format: &ParameterSchemaOrContent) -> Option<String> {
    match format {
        ParameterSchemaOrContent::Schema(ReferenceOr::Item(schema)) => json_schema_type(schema),
        _ => None,
    }
}

fn json_schema_type(schema: &Schema) -> Option<String> {
    serde_json::to_value(schema)
        .ok()
        .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_string))
}

/// One arg per top-level property of a JSON request body's schema.
fn extract_body_args(operation: &Operation) -> Option<Vec<ToolArg>> {
    let body = match operation.request_body.as_ref()? {
        ReferenceOr::Item(body) => body,
        ReferenceOr::Reference { .. } => return None,
    };
    let schema = body.content.get("application/json")?.schema.as_ref()?;
    let ReferenceOr::Item(schema) = schema else {
        return None;
    };
    let value = serde_json::to_value(schema).ok()?;
    let properties = value.get("properties")?.as_object()?;
    let required: Vec<String> = value
        .get("required")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(
        properties
            .iter()
            .map(|(name, prop)| ToolArg {
                name: name.clone(),
                description: prop
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                arg_type: ArgType::from_openapi_type(
                    prop.get("type").and_then(Value::as_str),
                ),
                required: required.contains(name),
                position: ArgPosition::Body,
            })
            .collect(),
    )
}

/// Parse a `{{uuidv4}}`-style template string used in static headers.
pub fn expand_header_templates(value: &str) -> String {
    value.replace("{{uuidv4}}", &uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SPEC: &str = r#"{
        "openapi": "3.0.0",
        "info": { "title": "Test", "version": "1.0" },
        "paths": {
            "/users": {
                "get": { "operationId": "listUsers", "responses": { "200": { "description": "ok" } } },
                "post": {
                    "operationId": "createUser",
                    "requestBody": {
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "properties": { "name": { "type": "string" } },
                                    "required": ["name"]
                                }
                            }
                        }
                    },
                    "responses": { "201": { "description": "created" } }
                }
            },
            "/users/{id}": {
                "delete": {
                    "operationId": "deleteUser",
                    "parameters": [
                        { "name": "id", "in": "path", "required": true, "schema": { "type": "string" } }
                    ],
                    "responses": { "204": { "description": "deleted" } }
                }
            }
        }
    }"#;

    fn parse() -> OpenAPI {
        serde_json::from_str(TEST_SPEC).unwrap()
    }

    #[test]
    fn every_operation_becomes_a_tool_no_resource_split() {
        let tools = synthesize_tools(&parse());
        assert_eq!(tools.len(), 3);
    }

    #[test]
    fn path_param_is_always_required() {
        let tools = synthesize_tools(&parse());
        let delete_user = tools.iter().find(|t| t.name == "deleteUser").unwrap();
        let id_arg = delete_user.args.iter().find(|a| a.name == "id").unwrap();
        assert!(id_arg.required);
        assert_eq!(id_arg.position, ArgPosition::Path);
    }

    #[test]
    fn json_body_properties_become_body_args_with_content_type_header() {
        let tools = synthesize_tools(&parse());
        let create_user = tools.iter().find(|t| t.name == "createUser").unwrap();
        let name_arg = create_user.args.iter().find(|a| a.name == "name").unwrap();
        assert!(name_arg.required);
        assert_eq!(name_arg.position, ArgPosition::Body);
        assert!(create_user
            .request_template
            .static_headers
            .iter()
            .any(|(k, v)| k == "Content-Type" && v == "application/json"));
    }

    #[test]
    fn tool_name_falls_back_to_method_and_path_without_operation_id() {
        assert_eq!(
            tool_name(
                "DELETE",
                "/users/{id}",
                &Operation {
                    operation_id: None,
                    ..Default::default()
                }
            ),
            "delete_users_id"
        );
    }

    #[test]
    fn uuidv4_template_expands_to_a_valid_uuid() {
        let expanded = expand_header_templates("req-{{uuidv4}}");
        let uuid_part = expanded.strip_prefix("req-").unwrap();
        assert!(uuid::Uuid::parse_str(uuid_part).is_ok());
    }
}
