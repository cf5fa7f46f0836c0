//! StdioAdapter: spawns a child process with a merged environment and
//! communicates newline-delimited JSON-RPC over its stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio as StdStdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};

use crate::config::IsolationDescriptor;
use crate::error::{ProxyError, ProxyResult};
use crate::jsonrpc::{RpcId, RpcNotification, RpcRequest, RpcResponse};

use super::INIT_DEADLINE;

type PendingMap = Arc<DashMap<RpcId, oneshot::Sender<RpcResponse>>>;

pub struct StdioAdapter {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    next_id: AtomicI64,
    reader_task: tokio::task::JoinHandle<()>,
}

impl StdioAdapter {
    /// Spawns the subprocess. When `high_risk` is set the executable vector
    /// is rewritten to route through the isolation runtime: the risk
    /// gate's only mutation happens here, at session start.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        isolation: Option<&IsolationDescriptor>,
        high_risk: bool,
    ) -> ProxyResult<Self> {
        let (program, full_args) = if high_risk {
            let descriptor = isolation.ok_or_else(|| {
                ProxyError::Configuration("high risk backend missing isolation descriptor".into())
            })?;
            rewrite_for_isolation(command, args, env, descriptor)
        } else {
            (command.to_string(), args.to_vec())
        };

        let mut cmd = Command::new(&program);
        cmd.args(&full_args)
            .envs(env)
            .stdin(StdStdio::piped())
            .stdout(StdStdio::piped())
            .stderr(StdStdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ProxyError::upstream(format!("failed to spawn backend: {e}")))?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        let pending: PendingMap = Arc::new(DashMap::new());
        let reader_pending = pending.clone();
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        // Unparseable line-fragments are tolerated until the next newline.
                        if line.is_empty() {
                            continue;
                        }
                        if let Some(response) = RpcResponse::parse(line) {
                            if let Some(id) = response.id.clone() {
                                if let Some((_, sender)) = reader_pending.remove(&id) {
                                    let _ = sender.send(response);
                                }
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            // Child crashed or closed stdout: every still-pending handler fails closed.
            reader_pending.clear();
        });

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicI64::new(1),
            reader_task,
        })
    }

    fn next_request_id(&self) -> RpcId {
        RpcId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn write_line(&self, line: &str) -> ProxyResult<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    pub async fn start(&self) -> ProxyResult<()> {
        let params = serde_json::json!({
            "protocolVersion": crate::MCP_PROTOCOL_VERSION,
            "clientInfo": {"name": "mcp-bridge", "version": env!("CARGO_PKG_VERSION")},
        });
        tokio::time::timeout(INIT_DEADLINE, self.send_request_raw("initialize", params))
            .await
            .map_err(|_| ProxyError::Timeout("stdio initialize handshake".into()))??;
        self.send_notification("notifications/initialized", serde_json::json!({}))
            .await
    }

    async fn send_request_raw(&self, method: &str, params: Value) -> ProxyResult<Value> {
        let id = self.next_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);

        let request = RpcRequest::new(id.clone(), method, Some(params));
        let line = serde_json::to_string(&request)?;
        if let Err(e) = self.write_line(&line).await {
            self.pending.remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(response) => response.into_result().map_err(|e| {
                ProxyError::upstream_with_details(e.message, serde_json::json!({ "code": e.code }))
            }),
            Err(_) => Err(ProxyError::TransportClosed("stdio backend closed".into())),
        }
    }

    /// `deadline == None` means no deadline — the background-job calling
    /// convention: jobs dispatched through the queue install no deadline
    /// and wait as long as the backend takes to respond.
    pub async fn request(&self, method: &str, params: Value, deadline: Option<Duration>) -> ProxyResult<Value> {
        match deadline {
            Some(d) => tokio::time::timeout(d, self.send_request_raw(method, params))
                .await
                .map_err(|_| ProxyError::Timeout(format!("stdio request '{method}'")))?,
            None => self.send_request_raw(method, params).await,
        }
    }

    async fn send_notification(&self, method: &str, params: Value) -> ProxyResult<()> {
        let notification = RpcNotification::new(method, Some(params));
        let line = serde_json::to_string(&notification)?;
        self.write_line(&line).await
    }

    pub async fn shutdown(&self) {
        self.reader_task.abort();
        if let Ok(mut child) = self.child.try_lock() {
            let _ = child.start_kill();
        }
    }
}

fn rewrite_for_isolation(
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
    descriptor: &IsolationDescriptor,
) -> (String, Vec<String>) {
    let mut rewritten = vec!["run".to_string(), "--rm".to_string()];
    for (key, value) in env {
        rewritten.push("-e".to_string());
        rewritten.push(format!("{key}={value}"));
    }
    for (key, value) in &descriptor.env {
        rewritten.push("-e".to_string());
        rewritten.push(format!("{key}={value}"));
    }
    for volume in &descriptor.volumes {
        rewritten.push("-v".to_string());
        rewritten.push(volume.clone());
    }
    if let Some(network) = &descriptor.network {
        rewritten.push("--network".to_string());
        rewritten.push(network.clone());
    }
    rewritten.push(descriptor.image.clone());
    rewritten.push(command.to_string());
    rewritten.extend(args.iter().cloned());
    ("isolation".to_string(), rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_builds_isolation_run_command() {
        let descriptor = IsolationDescriptor {
            image: "python:3.12".into(),
            env: HashMap::new(),
            volumes: vec!["/data:/data".into()],
            network: Some("none".into()),
        };
        let env = HashMap::new();
        let (program, args) = rewrite_for_isolation("python", &["server.py".to_string()], &env, &descriptor);
        assert_eq!(program, "isolation");
        assert_eq!(
            args,
            vec!["run", "--rm", "-v", "/data:/data", "--network", "none", "python:3.12", "python", "server.py"]
        );
    }
}
