//! JSON-RPC 2.0 envelope shared by every transport adapter.
//!
//! Loose JSON shapes never flow past this module: every adapter decodes into
//! these types at the boundary and the raw envelope is a single opaque
//! decode step from then on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request or response id: either a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: RpcId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: RpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A decoded JSON-RPC response. `id` is optional on the wire for malformed
/// error responses but every adapter treats a missing id as a decode error
/// during correlation.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<RpcId>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    /// Parses a single JSON-RPC response object, rejecting anything that is
    /// neither a `result` nor an `error` member (a malformed frame).
    pub fn parse(body: &str) -> Option<Self> {
        let response: Self = serde_json::from_str(body).ok()?;
        if response.result.is_some() || response.error.is_some() {
            Some(response)
        } else {
            None
        }
    }

    pub fn into_result(self) -> Result<Value, RpcErrorBody> {
        match (self.result, self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(error),
            (None, None) => Err(RpcErrorBody {
                code: -32603,
                message: "malformed response: neither result nor error present".to_string(),
                data: None,
            }),
        }
    }
}

/// Parses a raw HTTP response body as either a bare JSON-RPC frame or an
/// SSE-framed body whose `data:` lines carry the frame — open question #2:
/// both shapes are accepted regardless of the declared content type.
pub fn parse_response_body(body: &str, content_type: Option<&str>) -> Option<RpcResponse> {
    let looks_like_sse = content_type
        .map(|ct| ct.contains("text/event-stream"))
        .unwrap_or(false)
        || (!body.trim_start().starts_with('{') && body.contains("data:"));

    if looks_like_sse {
        for event in body.split("\n\n") {
            let mut data = String::new();
            for line in event.lines() {
                if let Some(chunk) = line.strip_prefix("data:") {
                    data.push_str(chunk.trim_start());
                }
            }
            if data.is_empty() {
                continue;
            }
            if let Some(response) = RpcResponse::parse(&data) {
                return Some(response);
            }
        }
        None
    } else {
        RpcResponse::parse(body.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_body() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#;
        let response = parse_response_body(body, Some("application/json")).unwrap();
        assert_eq!(response.id, Some(RpcId::Number(1)));
        assert_eq!(response.result.unwrap()["ok"], true);
    }

    #[test]
    fn parses_sse_framed_body() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":\"a\",\"result\":{}}\n\n";
        let response = parse_response_body(body, Some("text/event-stream")).unwrap();
        assert_eq!(response.id, Some(RpcId::String("a".into())));
    }

    #[test]
    fn rejects_malformed_frame() {
        let body = r#"{"jsonrpc":"2.0","id":1}"#;
        assert!(RpcResponse::parse(body).is_none());
    }

    #[test]
    fn error_body_surfaces_through_into_result() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"not found"}}"#;
        let response = RpcResponse::parse(body).unwrap();
        let err = response.into_result().unwrap_err();
        assert_eq!(err.code, -32601);
    }
}
