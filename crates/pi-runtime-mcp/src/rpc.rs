//! Generic JSON-RPC 2.0 dispatch shared by every concrete transport (§4.10).
//!
//! Each transport kind (HTTP, stdio) only needs to implement [`RpcCaller`] —
//! one request/response round trip over its own wire — and
//! [`JsonRpcTransport`] turns that into the full [`McpTransport`] contract by
//! mapping each trait method onto the MCP method names and result shapes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use pi_runtime_core::RuntimeError;
use serde_json::{json, Value};

use crate::connection::{McpPrompt, McpResource, McpTool, McpTransport, ResourceTemplatePage};

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, RuntimeError>> + Send>>;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// One JSON-RPC 2.0 request/response round trip over some wire. Takes
/// `Arc<Self>` so implementations can move their own handle into the
/// returned future without borrowing a non-`'static` `&self`.
pub(crate) trait RpcCaller: Send + Sync + 'static {
    fn call(self: Arc<Self>, method: &'static str, params: Value, timeout: Duration) -> BoxFuture<Value>;
}

fn field<T: serde::de::DeserializeOwned + Default>(value: &Value, key: &str) -> T {
    value
        .get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Adapts any [`RpcCaller`] into a full [`McpTransport`].
pub(crate) struct JsonRpcTransport<C: RpcCaller> {
    caller: Arc<C>,
}

impl<C: RpcCaller> JsonRpcTransport<C> {
    pub(crate) fn new(caller: Arc<C>) -> Self {
        Self { caller }
    }
}

impl<C: RpcCaller> McpTransport for JsonRpcTransport<C> {
    fn list_tools(&self) -> BoxFuture<Vec<McpTool>> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move {
            let result = caller.call("tools/list", json!({}), DEFAULT_CALL_TIMEOUT).await?;
            let tools = result.get("tools").and_then(Value::as_array).cloned().unwrap_or_default();
            Ok(tools
                .into_iter()
                .map(|t| McpTool {
                    name: field(&t, "name"),
                    description: t.get("description").and_then(Value::as_str).map(String::from),
                    input_schema: t.get("inputSchema").cloned().unwrap_or(Value::Null),
                })
                .collect())
        })
    }

    fn call_tool(&self, name: String, args: Value, timeout: Duration) -> BoxFuture<Value> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move { caller.call("tools/call", json!({"name": name, "arguments": args}), timeout).await })
    }

    fn list_resources(&self) -> BoxFuture<Vec<McpResource>> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move {
            let result = caller.call("resources/list", json!({}), DEFAULT_CALL_TIMEOUT).await?;
            let resources = result.get("resources").and_then(Value::as_array).cloned().unwrap_or_default();
            Ok(resources
                .into_iter()
                .map(|r| McpResource {
                    uri: field(&r, "uri"),
                    name: r.get("name").and_then(Value::as_str).map(String::from),
                    mime_type: r.get("mimeType").and_then(Value::as_str).map(String::from),
                })
                .collect())
        })
    }

    fn read_resource(&self, uri: String) -> BoxFuture<String> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move {
            let result = caller.call("resources/read", json!({"uri": uri}), DEFAULT_CALL_TIMEOUT).await?;
            let contents = result.get("contents").and_then(Value::as_array).cloned().unwrap_or_default();
            Ok(contents
                .first()
                .and_then(|c| c.get("text"))
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_default())
        })
    }

    fn subscribe_resource(&self, uri: String) -> BoxFuture<()> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move {
            caller.call("resources/subscribe", json!({"uri": uri}), DEFAULT_CALL_TIMEOUT).await?;
            Ok(())
        })
    }

    fn unsubscribe_resource(&self, uri: String) -> BoxFuture<()> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move {
            caller.call("resources/unsubscribe", json!({"uri": uri}), DEFAULT_CALL_TIMEOUT).await?;
            Ok(())
        })
    }

    fn list_prompts(&self) -> BoxFuture<Vec<McpPrompt>> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move {
            let result = caller.call("prompts/list", json!({}), DEFAULT_CALL_TIMEOUT).await?;
            let prompts = result.get("prompts").and_then(Value::as_array).cloned().unwrap_or_default();
            Ok(prompts
                .into_iter()
                .map(|p| McpPrompt {
                    name: field(&p, "name"),
                    description: p.get("description").and_then(Value::as_str).map(String::from),
                })
                .collect())
        })
    }

    fn get_prompt(&self, name: String, args: Value) -> BoxFuture<Value> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move { caller.call("prompts/get", json!({"name": name, "arguments": args}), DEFAULT_CALL_TIMEOUT).await })
    }

    fn list_resource_templates(&self) -> BoxFuture<Vec<Value>> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move {
            let result = caller.call("resources/templates/list", json!({}), DEFAULT_CALL_TIMEOUT).await?;
            Ok(result.get("resourceTemplates").and_then(Value::as_array).cloned().unwrap_or_default())
        })
    }

    fn list_resource_templates_paginated(&self, cursor: Option<String>) -> BoxFuture<ResourceTemplatePage> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move {
            let params = match cursor {
                Some(cursor) => json!({"cursor": cursor}),
                None => json!({}),
            };
            let result = caller.call("resources/templates/list", params, DEFAULT_CALL_TIMEOUT).await?;
            Ok(ResourceTemplatePage {
                templates: result.get("resourceTemplates").and_then(Value::as_array).cloned().unwrap_or_default(),
                next_cursor: result.get("nextCursor").and_then(Value::as_str).map(String::from),
            })
        })
    }

    fn set_roots(&self, roots: Vec<String>) -> BoxFuture<()> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move {
            let roots: Vec<Value> = roots.into_iter().map(|uri| json!({"uri": uri})).collect();
            caller.call("roots/set", json!({"roots": roots}), DEFAULT_CALL_TIMEOUT).await?;
            Ok(())
        })
    }

    fn get_instructions(&self) -> BoxFuture<Option<String>> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move {
            let result = caller.call("initialize", json!({}), DEFAULT_CALL_TIMEOUT).await?;
            Ok(result.get("instructions").and_then(Value::as_str).map(String::from))
        })
    }

    fn set_logging_level(&self, level: String) -> BoxFuture<()> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move {
            caller.call("logging/setLevel", json!({"level": level}), DEFAULT_CALL_TIMEOUT).await?;
            Ok(())
        })
    }

    fn ping(&self) -> BoxFuture<()> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move {
            caller.call("ping", json!({}), Duration::from_secs(10)).await?;
            Ok(())
        })
    }

    fn complete(&self, reference: Value, argument: Value) -> BoxFuture<Value> {
        let caller = Arc::clone(&self.caller);
        Box::pin(async move { caller.call("completion/complete", json!({"ref": reference, "argument": argument}), DEFAULT_CALL_TIMEOUT).await })
    }
}
