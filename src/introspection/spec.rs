//! Tool/Resource/Prompt descriptor types discovered via introspection.
//!
//! Opaque to the rest of the core except for name, human description, and
//! JSON-schema-shaped input descriptor; the Introspection component is
//! the only consumer that looks inside the schema, to synthesize example
//! parameter bags for the Postman collection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What `generate()` discovers about a transiently-started backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerSpec {
    pub tools: Vec<ToolSpec>,
    pub resources: Vec<ResourceSpec>,
    pub prompts: Vec<PromptSpec>,
}

impl ServerSpec {
    pub fn summary(&self) -> String {
        format!(
            "{} tools, {} resources, {} prompts",
            self.tools.len(),
            self.resources.len(),
            self.prompts.len()
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON-schema-shaped input descriptor, always an object schema per MCP.
    #[serde(default)]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Parses a `tools/list`-shaped JSON-RPC result into `ToolSpec`s, tolerating
/// entries that don't match the expected shape by skipping them.
pub fn parse_tools(result: &Value) -> Vec<ToolSpec> {
    result
        .get("tools")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|tool| {
            Some(ToolSpec {
                name: tool.get("name")?.as_str()?.to_string(),
                description: tool.get("description").and_then(Value::as_str).map(str::to_string),
                input_schema: tool.get("inputSchema").cloned().unwrap_or_else(|| Value::Object(Default::default())),
            })
        })
        .collect()
}

pub fn parse_resources(result: &Value) -> Vec<ResourceSpec> {
    result
        .get("resources")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|resource| {
            Some(ResourceSpec {
                uri: resource.get("uri")?.as_str()?.to_string(),
                name: resource.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                description: resource.get("description").and_then(Value::as_str).map(str::to_string),
                mime_type: resource.get("mimeType").and_then(Value::as_str).map(str::to_string),
            })
        })
        .collect()
}

pub fn parse_prompts(result: &Value) -> Vec<PromptSpec> {
    result
        .get("prompts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|prompt| {
            let name = prompt.get("name")?.as_str()?.to_string();
            let arguments = prompt
                .get("arguments")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|arg| {
                    Some(PromptArgument {
                        name: arg.get("name")?.as_str()?.to_string(),
                        description: arg.get("description").and_then(Value::as_str).map(str::to_string),
                        required: arg.get("required").and_then(Value::as_bool).unwrap_or(false),
                    })
                })
                .collect();
            Some(PromptSpec {
                name,
                description: prompt.get("description").and_then(Value::as_str).map(str::to_string),
                arguments,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tools_list_result() {
        let result = serde_json::json!({
            "tools": [
                {"name": "add", "description": "adds two numbers", "inputSchema": {"type": "object"}}
            ]
        });
        let tools = parse_tools(&result);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "add");
        assert_eq!(tools[0].description.as_deref(), Some("adds two numbers"));
    }

    #[test]
    fn skips_malformed_entries() {
        let result = serde_json::json!({ "tools": [{"description": "no name"}] });
        assert!(parse_tools(&result).is_empty());
    }

    #[test]
    fn parses_resources_and_prompts() {
        let resources = serde_json::json!({"resources": [{"uri": "file:///a", "name": "a"}]});
        assert_eq!(parse_resources(&resources).len(), 1);

        let prompts = serde_json::json!({"prompts": [{"name": "greet", "arguments": [{"name": "who", "required": true}]}]});
        let parsed = parse_prompts(&prompts);
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].arguments[0].required);
    }
}
