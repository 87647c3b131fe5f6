//! Merges an optional operator-supplied template file over the tools
//! synthesized from an OpenAPI document.
//!
//! A `tools` array in the template file replaces the synthesized list
//! outright; a `tools` object is instead applied to every tool (args
//! merged in by name, header lists concatenated, everything else
//! last-write-wins) — the same builder-overlay idiom used to layer
//! optional config over a computed default elsewhere in this gateway.

use serde_json::Value;

use crate::descriptor::{ToolArg, ToolDescriptor};

pub fn apply_template(tools: Vec<ToolDescriptor>, template: &Value) -> Vec<ToolDescriptor> {
    let Some(patch) = template.get("tools") else {
        return tools;
    };

    match patch {
        Value::Array(replacement) => replacement
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
        Value::Object(per_tool_patch) => tools
            .into_iter()
            .map(|tool| apply_patch_object(tool, per_tool_patch))
            .collect(),
        _ => tools,
    }
}

fn apply_patch_object(
    mut tool: ToolDescriptor,
    patch: &serde_json::Map<String, Value>,
) -> ToolDescriptor {
    if let Some(headers) = patch
        .get("request_template")
        .and_then(|rt| rt.get("headers"))
        .and_then(Value::as_object)
    {
        for (k, v) in headers {
            if let Some(v) = v.as_str() {
                tool.request_template
                    .static_headers
                    .push((k.clone(), v.to_string()));
            }
        }
    }

    if let Some(prepend) = patch
        .get("response_template")
        .and_then(|rt| rt.get("prepend_body"))
        .and_then(Value::as_str)
    {
        tool.response_template.prepend_body = Some(prepend.to_string());
    }

    if let Some(extra_args) = patch.get("args").and_then(Value::as_array) {
        for raw in extra_args {
            let Ok(patched_arg) = serde_json::from_value::<ToolArg>(raw.clone()) else {
                continue;
            };
            match tool.args.iter_mut().find(|a| a.name == patched_arg.name) {
                Some(existing) => *existing = patched_arg,
                None => tool.args.push(patched_arg),
            }
        }
    }

    tool
}
