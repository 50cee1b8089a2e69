//! Real HTTP transport for MCP connections (§4.10): one JSON-RPC 2.0 request
//! per call, POSTed to the connect URL.
//!
//! Backs both the `http://`/`https://` and `sse://`/`http+sse://` `detect()`
//! branches. The SSE variants get the same request/response call path; this
//! transport doesn't drive a persistent SSE stream for server-initiated
//! notifications (resource/tool list-changed, progress), so a host that needs
//! those should supply its own [`McpTransportFactory`] for those urls instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pi_runtime_core::RuntimeError;
use reqwest::Client;
use serde_json::{json, Value};

use crate::connection::{McpTransport, McpTransportFactory};
use crate::rpc::{BoxFuture, JsonRpcTransport, RpcCaller};
use crate::transport::Transport;

type ConnectFuture<T> = Pin<Box<dyn Future<Output = Result<T, RuntimeError>> + Send>>;

fn rpc_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::llm_error(message, None)
}

struct HttpRpcCaller {
    client: Client,
    url: String,
    auth: Option<String>,
    next_id: AtomicU64,
}

impl RpcCaller for HttpRpcCaller {
    fn call(self: Arc<Self>, method: &'static str, params: Value, timeout: Duration) -> BoxFuture<Value> {
        Box::pin(async move {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});

            let mut request = self.client.post(&self.url).json(&body).timeout(timeout);
            if let Some(token) = &self.auth {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| rpc_error(format!("mcp request to {} failed: {e}", self.url)))?;
            let status = response.status();

            let body: Value = response.json().await.map_err(|e| {
                RuntimeError::llm_error(format!("mcp response was not valid json: {e}"), Some(status.as_u16()))
            })?;

            if let Some(error) = body.get("error") {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("mcp server returned an error")
                    .to_string();
                return Err(RuntimeError::llm_error(message, Some(status.as_u16())));
            }

            Ok(body.get("result").cloned().unwrap_or(Value::Null))
        })
    }
}

/// Speaks MCP's JSON-RPC-over-HTTP wire format against a single endpoint.
pub type HttpTransport = JsonRpcTransport<HttpRpcCaller>;

impl HttpTransport {
    pub fn open(client: Client, url: String, auth: Option<String>) -> Self {
        JsonRpcTransport::new(Arc::new(HttpRpcCaller {
            client,
            url,
            auth,
            next_id: AtomicU64::new(1),
        }))
    }
}

/// Opens [`HttpTransport`]s for `http(s)://`/`sse://`/`http+sse://` connect
/// urls, and refuses stdio urls (the embedding host must compose in a
/// separate factory — e.g. [`crate::StdioTransportFactory`] — for those).
pub struct HttpTransportFactory {
    client: Client,
}

impl HttpTransportFactory {
    pub fn new() -> Result<Self, RuntimeError> {
        let client = Client::builder()
            .build()
            .map_err(|e| rpc_error(format!("failed to build mcp http client: {e}")))?;
        Ok(Self { client })
    }
}

impl Default for HttpTransportFactory {
    fn default() -> Self {
        Self::new().expect("default reqwest client construction cannot fail")
    }
}

impl McpTransportFactory for HttpTransportFactory {
    fn connect(
        &self,
        transport: Transport,
        url: String,
        _timeout: Duration,
        auth: Option<String>,
    ) -> ConnectFuture<Arc<dyn McpTransport>> {
        let client = self.client.clone();
        Box::pin(async move {
            match transport {
                Transport::Http | Transport::Sse => {
                    Ok(Arc::new(HttpTransport::open(client, url, auth)) as Arc<dyn McpTransport>)
                }
                Transport::Stdio { .. } => Err(rpc_error(
                    "HttpTransportFactory cannot open a stdio transport; compose it with a stdio-capable factory",
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_stdio_transports() {
        let factory = HttpTransportFactory::new().unwrap();
        let err = factory
            .connect(
                Transport::Stdio { command: vec!["my-server".into()] },
                "my-server".to_string(),
                Duration::from_secs(1),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "llm_error");
    }
}
