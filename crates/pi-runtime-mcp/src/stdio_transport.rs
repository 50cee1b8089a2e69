//! Real stdio transport for MCP connections (§4.10): spawns the tokenized
//! command from `Transport::Stdio` and speaks newline-delimited JSON-RPC 2.0
//! over its stdin/stdout.
//!
//! One request is in flight at a time per connection — the reader and writer
//! share a single mutex spanning the full round trip — since a line-based
//! stdio server has no simple way to multiplex interleaved responses to
//! distinct calls. A host doing heavy concurrent tool use against one stdio
//! server should open multiple connections instead.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pi_runtime_core::RuntimeError;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::connection::{McpTransport, McpTransportFactory};
use crate::rpc::{BoxFuture, JsonRpcTransport, RpcCaller};
use crate::transport::Transport;

type ConnectFuture<T> = Pin<Box<dyn Future<Output = Result<T, RuntimeError>> + Send>>;

fn rpc_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::llm_error(message, None)
}

struct StdioRpcCaller {
    // Held only to keep the child alive and reaped (`kill_on_drop`) with the
    // transport; never read from directly.
    _child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    next_id: AtomicU64,
}

impl StdioRpcCaller {
    async fn spawn(command: &[String]) -> Result<Self, RuntimeError> {
        let (program, args) = command.split_first().ok_or_else(|| rpc_error("empty stdio command"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| rpc_error(format!("failed to spawn mcp stdio server '{program}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| rpc_error("spawned mcp stdio server has no stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| rpc_error("spawned mcp stdio server has no stdout handle"))?;

        Ok(Self {
            _child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            next_id: AtomicU64::new(1),
        })
    }
}

impl RpcCaller for StdioRpcCaller {
    fn call(self: Arc<Self>, method: &'static str, params: Value, timeout: Duration) -> BoxFuture<Value> {
        Box::pin(async move {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let mut line = serde_json::to_string(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
                .map_err(|e| rpc_error(format!("failed to encode mcp request: {e}")))?;
            line.push('\n');

            tokio::time::timeout(timeout, async {
                {
                    let mut stdin = self.stdin.lock().await;
                    stdin
                        .write_all(line.as_bytes())
                        .await
                        .map_err(|e| rpc_error(format!("failed to write to mcp stdio server: {e}")))?;
                    stdin
                        .flush()
                        .await
                        .map_err(|e| rpc_error(format!("failed to flush mcp stdio server stdin: {e}")))?;
                }

                let mut stdout = self.stdout.lock().await;
                loop {
                    let mut response_line = String::new();
                    let read = stdout
                        .read_line(&mut response_line)
                        .await
                        .map_err(|e| rpc_error(format!("failed to read from mcp stdio server: {e}")))?;
                    if read == 0 {
                        return Err(rpc_error("mcp stdio server closed its stdout"));
                    }
                    let trimmed = response_line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let response: Value =
                        serde_json::from_str(trimmed).map_err(|e| rpc_error(format!("mcp stdio server sent invalid json: {e}")))?;
                    if response.get("id").and_then(Value::as_u64) != Some(id) {
                        // Out-of-band notification interleaved with our response; keep reading.
                        continue;
                    }
                    if let Some(error) = response.get("error") {
                        let message = error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("mcp stdio server returned an error")
                            .to_string();
                        return Err(rpc_error(message));
                    }
                    return Ok(response.get("result").cloned().unwrap_or(Value::Null));
                }
            })
            .await
            .map_err(|_| RuntimeError::timeout())?
        })
    }
}

/// Speaks MCP's JSON-RPC-over-stdio wire format against a spawned process.
pub type StdioTransport = JsonRpcTransport<StdioRpcCaller>;

/// Opens [`StdioTransport`]s for any `Transport::Stdio` connect request,
/// spawning the tokenized command fresh per connection.
#[derive(Default)]
pub struct StdioTransportFactory;

impl McpTransportFactory for StdioTransportFactory {
    fn connect(
        &self,
        transport: Transport,
        _url: String,
        _timeout: Duration,
        _auth: Option<String>,
    ) -> ConnectFuture<Arc<dyn McpTransport>> {
        Box::pin(async move {
            match transport {
                Transport::Stdio { command } => {
                    let caller = StdioRpcCaller::spawn(&command).await?;
                    Ok(Arc::new(JsonRpcTransport::new(Arc::new(caller))) as Arc<dyn McpTransport>)
                }
                Transport::Http | Transport::Sse => Err(rpc_error(
                    "StdioTransportFactory cannot open an http/sse transport; compose it with HttpTransportFactory",
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_http_transports() {
        let factory = StdioTransportFactory;
        let err = factory
            .connect(Transport::Http, "https://example.com".to_string(), Duration::from_secs(1), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "llm_error");
    }

    #[tokio::test]
    async fn spawning_a_missing_command_fails_with_llm_error() {
        let factory = StdioTransportFactory;
        let err = factory
            .connect(
                Transport::Stdio { command: vec!["definitely-not-a-real-binary-xyz".into()] },
                "definitely-not-a-real-binary-xyz".to_string(),
                Duration::from_secs(1),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "llm_error");
    }
}
