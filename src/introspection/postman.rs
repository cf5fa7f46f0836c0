//! Postman v2.1 collection synthesis from a discovered `ServerSpec`.

use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::{BackendSpec, Transport};

use super::spec::{PromptSpec, ResourceSpec, ServerSpec, ToolSpec};

/// Builds a Postman v2.1 collection document: one top-level folder per
/// non-empty capability class, one "General Operations" folder with the
/// four canonical discovery endpoints, an auto-chosen `server_id` variable,
/// and example parameter bags projected from each tool's JSON schema.
pub fn generate_collection(base_url: &str, spec: &BackendSpec, discovered: &ServerSpec) -> Value {
    let server_id = derive_server_id(spec);
    let mut items = vec![general_operations_folder()];

    if !discovered.tools.is_empty() {
        items.push(tools_folder(&discovered.tools));
    }
    if !discovered.resources.is_empty() {
        items.push(resources_folder(&discovered.resources));
    }
    if !discovered.prompts.is_empty() {
        items.push(prompts_folder(&discovered.prompts));
    }

    let mut variables = vec![
        variable("url", base_url),
        variable("server_id", &server_id),
    ];
    if let Some(token) = dynamic_auth_placeholder(spec) {
        variables.push(variable("auth_token", &token));
    }

    json!({
        "info": {
            "_postman_id": Uuid::new_v4().to_string(),
            "name": format!("{server_id} (MCP bridge)"),
            "schema": "https://schema.getpostman.com/json/collection/v2.1.0/collection.json",
        },
        "item": items,
        "variable": variables,
    })
}

fn variable(key: &str, value: &str) -> Value {
    json!({
        "key": key,
        "value": value,
        "type": "string",
        "unit": "",
        "values": [],
    })
}

/// Auto-chosen `server_id`: a substring heuristic over the URL/command,
/// falling back to a hostname-based identifier.
fn derive_server_id(spec: &BackendSpec) -> String {
    match &spec.transport {
        Transport::Stdio { command, .. } => std::path::Path::new(command)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(slugify)
            .unwrap_or_else(|| "server".to_string()),
        Transport::Http { url } | Transport::Sse { url, .. } => url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(slugify))
            .unwrap_or_else(|| {
                hostname_fallback()
            }),
    }
}

fn hostname_fallback() -> String {
    format!("server-{}", &Uuid::new_v4().to_string()[..8])
}

fn slugify(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

fn dynamic_auth_placeholder(spec: &BackendSpec) -> Option<String> {
    matches!(spec.transport, Transport::Http { .. } | Transport::Sse { .. }).then_some(String::new())
}

fn general_operations_folder() -> Value {
    json!({
        "name": "General Operations",
        "item": [
            request_item("GET", "Health Check", "{{url}}/health", None),
            request_item("GET", "List Tools", "{{url}}/servers/{{server_id}}/tools", None),
            request_item("GET", "List Resources", "{{url}}/servers/{{server_id}}/resources", None),
            request_item("GET", "List Prompts", "{{url}}/servers/{{server_id}}/prompts", None),
        ],
    })
}

fn tools_folder(tools: &[ToolSpec]) -> Value {
    let items: Vec<Value> = tools
        .iter()
        .map(|tool| {
            let example = example_body_from_schema(&tool.input_schema);
            request_item(
                "POST",
                &tool.name,
                &format!("{{{{url}}}}/servers/{{{{server_id}}}}/tools/{}", tool.name),
                Some(example),
            )
        })
        .collect();
    json!({ "name": "Tools", "item": items })
}

fn resources_folder(resources: &[ResourceSpec]) -> Value {
    let items: Vec<Value> = resources
        .iter()
        .map(|resource| {
            let encoded = urlencoding_light(&resource.uri);
            request_item(
                "GET",
                &resource.name,
                &format!("{{{{url}}}}/servers/{{{{server_id}}}}/resources/{encoded}"),
                None,
            )
        })
        .collect();
    json!({ "name": "Resources", "item": items })
}

fn prompts_folder(prompts: &[PromptSpec]) -> Value {
    let items: Vec<Value> = prompts
        .iter()
        .map(|prompt| {
            let mut body = serde_json::Map::new();
            for arg in &prompt.arguments {
                body.insert(arg.name.clone(), json!(format!("<{}>", arg.name)));
            }
            request_item(
                "POST",
                &prompt.name,
                &format!("{{{{url}}}}/servers/{{{{server_id}}}}/prompts/{}", prompt.name),
                Some(Value::Object(body)),
            )
        })
        .collect();
    json!({ "name": "Prompts", "item": items })
}

fn request_item(method: &str, name: &str, url: &str, body: Option<Value>) -> Value {
    let mut request = json!({
        "method": method,
        "header": [{"key": "Content-Type", "value": "application/json"}],
        "url": { "raw": url },
    });
    if let Some(body) = body {
        request["body"] = json!({
            "mode": "raw",
            "raw": serde_json::to_string_pretty(&body).unwrap_or_default(),
            "options": {"raw": {"language": "json"}},
        });
    }
    json!({ "name": name, "request": request })
}

/// Projects a JSON-schema-shaped input descriptor into an example
/// parameter bag, one placeholder value per declared property/type.
fn example_body_from_schema(schema: &Value) -> Value {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return json!({});
    };
    let mut body = serde_json::Map::new();
    for (name, prop) in properties {
        let value = match prop.get("type").and_then(Value::as_str) {
            Some("string") => json!(format!("<{name}>")),
            Some("number") | Some("integer") => json!(0),
            Some("boolean") => json!(false),
            Some("array") => json!([]),
            Some("object") => json!({}),
            _ => json!(format!("<{name}>")),
        };
        body.insert(name.clone(), value);
    }
    Value::Object(body)
}

/// Percent-encodes just enough of a URI to embed it as a single path
/// segment, avoiding a hard dependency on a full percent-encoding crate
/// for this one call site.
fn urlencoding_light(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn http_spec(url: &str) -> BackendSpec {
        BackendSpec {
            id: "x".into(),
            transport: Transport::Http { url: url.to_string() },
            risk_level: None,
            isolation: None,
            ssrf_protection: Default::default(),
        }
    }

    fn stdio_spec(command: &str) -> BackendSpec {
        BackendSpec {
            id: "x".into(),
            transport: Transport::Stdio { command: command.to_string(), args: vec![], env: HashMap::new() },
            risk_level: None,
            isolation: None,
            ssrf_protection: Default::default(),
        }
    }

    #[test]
    fn server_id_from_http_url_uses_host() {
        assert_eq!(derive_server_id(&http_spec("https://weather-api.example.com/mcp")), "weather-api-example-com");
    }

    #[test]
    fn server_id_from_stdio_uses_command_basename() {
        assert_eq!(derive_server_id(&stdio_spec("/usr/bin/node")), "node");
    }

    #[test]
    fn collection_omits_empty_capability_folders() {
        let spec = http_spec("https://example.com/mcp");
        let discovered = ServerSpec::default();
        let doc = generate_collection("https://example.com/mcp", &spec, &discovered);
        let folders: Vec<&str> = doc["item"].as_array().unwrap().iter().map(|f| f["name"].as_str().unwrap()).collect();
        assert_eq!(folders, vec!["General Operations"]);
    }

    #[test]
    fn collection_includes_tools_folder_when_present() {
        let spec = http_spec("https://example.com/mcp");
        let mut discovered = ServerSpec::default();
        discovered.tools.push(ToolSpec {
            name: "add".into(),
            description: Some("adds".into()),
            input_schema: json!({"type": "object", "properties": {"a": {"type": "number"}}}),
        });
        let doc = generate_collection("https://example.com/mcp", &spec, &discovered);
        let folders: Vec<&str> = doc["item"].as_array().unwrap().iter().map(|f| f["name"].as_str().unwrap()).collect();
        assert!(folders.contains(&"Tools"));
    }

    #[test]
    fn example_body_projects_types() {
        let schema = json!({"properties": {"a": {"type": "number"}, "name": {"type": "string"}}});
        let body = example_body_from_schema(&schema);
        assert_eq!(body["a"], json!(0));
        assert_eq!(body["name"], json!("<name>"));
    }
}
