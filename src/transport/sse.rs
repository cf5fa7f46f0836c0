//! SseAdapter: the hard adapter. Every request opens its own event-stream
//! GET and interoperates with two session-discovery modes (header mode via
//! `MCP-Session-Id`, endpoint-frame mode via an early `data:` frame), then
//! demultiplexes the JSON-RPC response off the same event channel by id.

use std::time::Duration;
use std::sync::atomic::{AtomicI64, Ordering};

use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde_json::Value;

use crate::config::SseTuning;
use crate::error::{ProxyError, ProxyResult};
use crate::jsonrpc::{RpcId, RpcRequest, RpcResponse, parse_response_body};

pub const SESSION_ACQUIRE_DEADLINE: Duration = Duration::from_secs(30);
pub const RESPONSE_DEADLINE: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(15);

pub struct SseAdapter {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
    heartbeat_interval: Duration,
    next_id: AtomicI64,
}

impl SseAdapter {
    pub fn new(mut base_url: String, tuning: SseTuning) -> ProxyResult<Self> {
        if !base_url.ends_with("/sse") {
            base_url.push_str("/sse");
        }
        let client = Client::builder().build().map_err(ProxyError::Http)?;
        Ok(Self {
            client,
            base_url,
            auth_token: None,
            max_retries: tuning.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: tuning
                .retry_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_DELAY),
            heartbeat_interval: tuning
                .heartbeat_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HEARTBEAT),
            next_id: AtomicI64::new(1),
        })
    }

    /// Used by the Job Queue's dynamic-backend path, where a job targets a
    /// bare URL and optional auth token instead of a registered `BackendSpec`.
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    fn get_request(&self) -> reqwest::RequestBuilder {
        let builder = self.client.get(&self.base_url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn post_request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Startup merely registers the session; no connection opens until the
    /// first request.
    pub async fn start(&self) -> ProxyResult<()> {
        Ok(())
    }

    fn next_request_id(&self) -> RpcId {
        RpcId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn request(&self, method: &str, params: Value, _deadline: Option<Duration>) -> ProxyResult<Value> {
        let id = self.next_request_id();
        let request = RpcRequest::new(id.clone(), method, Some(params));

        let mut attempt = 0;
        loop {
            match self.try_once(&id, &request).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && err.is_retryable() => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "sse cycle failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_once(&self, id: &RpcId, request: &RpcRequest) -> ProxyResult<Value> {
        let get = self.get_request().send();
        let get_response = tokio::time::timeout(SESSION_ACQUIRE_DEADLINE, get)
            .await
            .map_err(|_| ProxyError::Timeout("sse session acquisition".into()))??;

        let session_header = get_response
            .headers()
            .get("MCP-Session-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match session_header {
            Some(session_id) => self.header_mode(session_id, id, request, get_response).await,
            None => self.endpoint_frame_mode(id, request, get_response).await,
        }
    }

    async fn header_mode(
        &self,
        session_id: String,
        id: &RpcId,
        request: &RpcRequest,
        get_response: reqwest::Response,
    ) -> ProxyResult<Value> {
        let post = self
            .post_request(&self.base_url)
            .header("MCP-Session-Id", &session_id)
            .json(request)
            .send();
        let post_response = tokio::time::timeout(RESPONSE_DEADLINE, post)
            .await
            .map_err(|_| ProxyError::Timeout("sse response".into()))??;

        let content_type = post_response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = post_response.text().await?;

        if let Some(response) = parse_response_body(&body, content_type.as_deref()) {
            if response.id.as_ref() == Some(id) {
                return unwrap_response(response);
            }
        }

        // Inline body was empty or didn't match: demultiplex off the event channel.
        let stream = get_response.bytes_stream();
        self.await_on_stream(stream, String::new(), id).await
    }

    async fn endpoint_frame_mode(
        &self,
        id: &RpcId,
        request: &RpcRequest,
        get_response: reqwest::Response,
    ) -> ProxyResult<Value> {
        let mut stream = get_response.bytes_stream();
        let mut buffer = String::new();

        let endpoint_search = async {
            loop {
                if let Some((event, rest)) = split_first_event(&buffer) {
                    buffer = rest;
                    if let Some(endpoint) = parse_endpoint_frame(&event) {
                        return Ok((endpoint, buffer.clone()));
                    }
                    continue;
                }
                match stream.next().await {
                    Some(Ok(chunk)) => buffer.push_str(&String::from_utf8_lossy(&chunk)),
                    Some(Err(e)) => return Err(ProxyError::Http(e)),
                    None => {
                        return Err(ProxyError::TransportClosed(
                            "sse stream closed before endpoint frame".into(),
                        ));
                    }
                }
            }
        };

        let (endpoint, remaining_buffer) = tokio::time::timeout(SESSION_ACQUIRE_DEADLINE, endpoint_search)
            .await
            .map_err(|_| ProxyError::Timeout("sse session acquisition".into()))??;

        let post_url = resolve_endpoint(&self.base_url, &endpoint);
        let post = self.post_request(&post_url).json(request).send();
        tokio::time::timeout(RESPONSE_DEADLINE, post)
            .await
            .map_err(|_| ProxyError::Timeout("sse response".into()))??;

        self.await_on_stream(stream, remaining_buffer, id).await
    }

    async fn await_on_stream(
        &self,
        mut stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
        mut buffer: String,
        id: &RpcId,
    ) -> ProxyResult<Value> {
        let deadline = tokio::time::Instant::now() + RESPONSE_DEADLINE;
        loop {
            if let Some((event, rest)) = split_first_event(&buffer) {
                buffer = rest;
                if let Some(response) = parse_event_as_response(&event) {
                    if response.id.as_ref() == Some(id) {
                        return unwrap_response(response);
                    }
                }
                continue;
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(ProxyError::Timeout("sse response".into()));
            }
            let tick = remaining.min(self.heartbeat_interval);

            match tokio::time::timeout(tick, stream.next()).await {
                Ok(Some(Ok(chunk))) => buffer.push_str(&String::from_utf8_lossy(&chunk)),
                Ok(Some(Err(e))) => return Err(ProxyError::Http(e)),
                Ok(None) => return Err(ProxyError::TransportClosed("sse stream closed".into())),
                Err(_) => continue, // heartbeat tick elapsed, stream still open
            }
        }
    }

    pub async fn shutdown(&self) {}
}

fn unwrap_response(response: RpcResponse) -> ProxyResult<Value> {
    response
        .into_result()
        .map_err(|e| ProxyError::upstream_with_details(e.message, serde_json::json!({ "code": e.code })))
}

fn split_first_event(buffer: &str) -> Option<(String, String)> {
    let idx = buffer.find("\n\n")?;
    Some((buffer[..idx].to_string(), buffer[idx + 2..].to_string()))
}

fn event_data(event: &str) -> String {
    let mut data = String::new();
    for line in event.lines() {
        if line.starts_with(':') {
            continue; // comment line
        }
        if let Some(chunk) = line.strip_prefix("data:") {
            data.push_str(chunk.trim_start());
        }
    }
    data
}

fn parse_event_as_response(event: &str) -> Option<RpcResponse> {
    let data = event_data(event);
    (!data.is_empty()).then(|| RpcResponse::parse(&data)).flatten()
}

fn parse_endpoint_frame(event: &str) -> Option<String> {
    let data = event_data(event);
    if data.is_empty() {
        return None;
    }
    if data.starts_with('/') {
        return Some(data);
    }
    if let Ok(value) = serde_json::from_str::<Value>(&data) {
        if let Some(endpoint) = value.get("endpoint").and_then(Value::as_str) {
            return Some(endpoint.to_string());
        }
    }
    if let Some(endpoint) = data.strip_prefix("endpoint=") {
        return Some(endpoint.to_string());
    }
    None
}

fn resolve_endpoint(base_url: &str, endpoint: &str) -> String {
    let root = base_url.strip_suffix("/sse").unwrap_or(base_url);
    format!("{root}{endpoint}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_events_on_double_newline() {
        let buffer = "data: a\n\ndata: b\n\n";
        let (first, rest) = split_first_event(buffer).unwrap();
        assert_eq!(first, "data: a");
        let (second, rest) = split_first_event(&rest).unwrap();
        assert_eq!(second, "data: b");
        assert!(rest.is_empty());
    }

    #[test]
    fn comment_lines_are_ignored() {
        let event = ": keep-alive\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}";
        let response = parse_event_as_response(event).unwrap();
        assert_eq!(response.id, Some(RpcId::Number(1)));
    }

    #[test]
    fn endpoint_frame_accepts_raw_path() {
        assert_eq!(parse_endpoint_frame("data: /mcp/abc"), Some("/mcp/abc".to_string()));
    }

    #[test]
    fn endpoint_frame_accepts_json_object() {
        assert_eq!(
            parse_endpoint_frame("data: {\"endpoint\":\"/mcp/xyz\"}"),
            Some("/mcp/xyz".to_string())
        );
    }

    #[test]
    fn endpoint_frame_accepts_form_encoded() {
        assert_eq!(parse_endpoint_frame("data: endpoint=/mcp/123"), Some("/mcp/123".to_string()));
    }

    #[test]
    fn resolve_endpoint_strips_sse_suffix() {
        assert_eq!(resolve_endpoint("https://example.com/sse", "/mcp/abc"), "https://example.com/mcp/abc");
    }
}
