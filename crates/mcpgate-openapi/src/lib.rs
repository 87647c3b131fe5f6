//! OpenAPI-to-MCP bridge: loads an OpenAPI document or ready-made tool
//! template, synthesizes `tools/list` descriptors from it, and executes
//! `tools/call` as SSRF-checked outbound HTTP.

pub mod descriptor;
pub mod document;
pub mod invocation;
pub mod security;
pub mod template;

pub use descriptor::{
    synthesize_tools, ArgPosition, ArgType, RequestTemplate, ResponseTemplate, ToolArg,
    ToolDescriptor,
};
pub use document::{load_from_file, load_from_url, parse_document, LoadedDocument};
pub use invocation::{
    invoke, invoke_with_timeout, prepare_request, validate_args, wrap_as_text_content,
    InvocationContext, PreparedRequest, DEFAULT_TOOL_TIMEOUT_MS,
};
pub use security::SsrfPolicy;
pub use template::apply_template;
