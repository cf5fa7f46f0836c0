//! HttpAdapter: plain HTTP POST of JSON-RPC against a pooled keep-alive client.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::error::{ProxyError, ProxyResult};
use crate::jsonrpc::{RpcId, RpcRequest, parse_response_body};

use super::INIT_DEADLINE;

pub struct HttpAdapter {
    client: Client,
    url: String,
    auth_token: Option<String>,
    next_id: AtomicI64,
}

impl HttpAdapter {
    pub fn new(url: String) -> ProxyResult<Self> {
        let client = Client::builder().build().map_err(ProxyError::Http)?;
        Ok(Self {
            client,
            url,
            auth_token: None,
            next_id: AtomicI64::new(1),
        })
    }

    /// Used by the Job Queue's dynamic-backend path, where a job targets a
    /// bare URL and optional auth token instead of a registered `BackendSpec`.
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    fn next_request_id(&self) -> RpcId {
        RpcId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn start(&self) -> ProxyResult<()> {
        let params = serde_json::json!({
            "protocolVersion": crate::MCP_PROTOCOL_VERSION,
            "clientInfo": {"name": "mcp-bridge", "version": env!("CARGO_PKG_VERSION")},
        });
        self.post("initialize", params, Some(INIT_DEADLINE)).await?;
        Ok(())
    }

    async fn post(&self, method: &str, params: Value, deadline: Option<Duration>) -> ProxyResult<Value> {
        let id = self.next_request_id();
        let request = RpcRequest::new(id.clone(), method, Some(params));
        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        let send = builder.send();

        let response = match deadline {
            Some(d) => tokio::time::timeout(d, send)
                .await
                .map_err(|_| ProxyError::Timeout(format!("http request '{method}'")))??,
            None => send.await?,
        };

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        let parsed = parse_response_body(&body, content_type.as_deref())
            .ok_or_else(|| ProxyError::upstream("malformed JSON-RPC response body"))?;

        parsed.into_result().map_err(|e| {
            ProxyError::upstream_with_details(e.message, serde_json::json!({ "code": e.code }))
        })
    }

    /// `None` deadline means indefinite, matching the background-job
    /// dispatch policy of waiting for the backend to finish.
    pub async fn request(&self, method: &str, params: Value, deadline: Option<Duration>) -> ProxyResult<Value> {
        self.post(method, params, deadline).await
    }

    pub async fn shutdown(&self) {}
}
