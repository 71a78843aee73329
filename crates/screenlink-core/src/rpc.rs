//! Remote controller: a JSON-RPC 2.0 surface over TCP.
//!
//! External GUI/CLI clients drive the core through this endpoint. Requests
//! are newline-delimited JSON-RPC objects; each one becomes an [`RpcCall`]
//! answered on the dispatcher task, so everything state-mutating stays on
//! the cooperative scheduler.

use std::net::SocketAddr;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::node::Node;

pub const NODE_NAME: &str = "rpc";

/// One method call awaiting an answer from the dispatcher.
pub struct RpcCall {
    pub method: String,
    pub params: Value,
    pub reply: oneshot::Sender<Result<Value, String>>,
}

/// The RPC endpoint component.
pub struct RemoteControllerNode {
    endpoint: Option<SocketAddr>,
    calls_tx: mpsc::Sender<RpcCall>,
    server: Option<(CancellationToken, JoinHandle<()>)>,
}

impl RemoteControllerNode {
    /// `endpoint` of `None` disables the surface.
    #[must_use]
    pub fn new(endpoint: Option<SocketAddr>, calls_tx: mpsc::Sender<RpcCall>) -> Self {
        Self {
            endpoint,
            calls_tx,
            server: None,
        }
    }
}

#[async_trait]
impl Node for RemoteControllerNode {
    fn name(&self) -> &str {
        NODE_NAME
    }

    async fn setup(&mut self) -> Result<(), CoreError> {
        let Some(endpoint) = self.endpoint else {
            debug!("remote controller disabled");
            return Ok(());
        };
        let listener = TcpListener::bind(endpoint)
            .await
            .map_err(|e| CoreError::Config(format!("rpc bind {endpoint}: {e}")))?;
        info!(endpoint = %endpoint, "remote controller listening");

        let token = CancellationToken::new();
        let accept_token = token.clone();
        let calls_tx = self.calls_tx.clone();
        let handle = tokio::spawn(async move {
            loop {
                let (stream, remote) = tokio::select! {
                    () = accept_token.cancelled() => break,
                    result = listener.accept() => match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "rpc accept failed");
                            break;
                        }
                    }
                };
                debug!(remote = %remote, "rpc client connected");
                tokio::spawn(serve_connection(
                    stream,
                    calls_tx.clone(),
                    accept_token.child_token(),
                ));
            }
        });
        self.server = Some((token, handle));
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), CoreError> {
        if let Some((token, handle)) = self.server.take() {
            token.cancel();
            let _ = handle.await;
        }
        Ok(())
    }
}

/// Serve one connection: read request lines, answer each in order.
async fn serve_connection(
    stream: TcpStream,
    calls_tx: mpsc::Sender<RpcCall>,
    token: CancellationToken,
) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = tokio::select! {
            () = token.cancelled() => return,
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => return,
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_request(&line, &calls_tx).await;
        let mut payload = response.to_string();
        payload.push('\n');
        if write.write_all(payload.as_bytes()).await.is_err() {
            return;
        }
    }
}

async fn handle_request(line: &str, calls_tx: &mpsc::Sender<RpcCall>) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return error_response(Value::Null, -32700, &format!("parse error: {e}"));
        }
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return error_response(id, -32600, "missing method");
    };
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let (reply_tx, reply_rx) = oneshot::channel();
    let call = RpcCall {
        method: method.to_string(),
        params,
        reply: reply_tx,
    };
    if calls_tx.send(call).await.is_err() {
        return error_response(id, -32603, "service shutting down");
    }
    match reply_rx.await {
        Ok(Ok(result)) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Ok(Err(message)) => error_response(id, -32000, &message),
        Err(_) => error_response(id, -32603, "request dropped"),
    }
}

fn error_response(id: Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}
