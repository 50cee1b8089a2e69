//! The pluggable transport contract (§4.10, §6's "external collaborators").
//!
//! The manager never speaks stdio/HTTP/SSE itself — a connect produces an
//! `Arc<dyn McpTransport>` from an injected [`McpTransportFactory`], the same
//! shape `pi_runtime_executor::LlmCall` uses for the LLM collaborator: this
//! crate owns admission, dedup, SSRF checks and failure bookkeeping, not wire
//! protocol plumbing.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use pi_runtime_core::RuntimeError;
use serde_json::Value;

use crate::transport::Transport;

/// A single MCP tool descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct McpTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// A single MCP resource descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct McpResource {
    pub uri: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
}

/// A single MCP prompt descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct McpPrompt {
    pub name: String,
    pub description: Option<String>,
}

/// A page of resource templates, per `listResourceTemplatesPaginated`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceTemplatePage {
    pub templates: Vec<Value>,
    pub next_cursor: Option<String>,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, RuntimeError>> + Send>>;

/// What a connected MCP server can do (§4.10's per-connection contract).
/// Implemented once per transport kind by the embedding host; this crate is
/// generic over it.
pub trait McpTransport: Send + Sync {
    fn list_tools(&self) -> BoxFuture<Vec<McpTool>>;
    fn call_tool(&self, name: String, args: Value, timeout: Duration) -> BoxFuture<Value>;
    fn list_resources(&self) -> BoxFuture<Vec<McpResource>>;
    fn read_resource(&self, uri: String) -> BoxFuture<String>;
    fn subscribe_resource(&self, uri: String) -> BoxFuture<()>;
    fn unsubscribe_resource(&self, uri: String) -> BoxFuture<()>;
    fn list_prompts(&self) -> BoxFuture<Vec<McpPrompt>>;
    fn get_prompt(&self, name: String, args: Value) -> BoxFuture<Value>;
    fn list_resource_templates(&self) -> BoxFuture<Vec<Value>>;
    fn list_resource_templates_paginated(&self, cursor: Option<String>) -> BoxFuture<ResourceTemplatePage>;
    fn set_roots(&self, roots: Vec<String>) -> BoxFuture<()>;
    fn get_instructions(&self) -> BoxFuture<Option<String>>;
    fn set_logging_level(&self, level: String) -> BoxFuture<()>;
    fn ping(&self) -> BoxFuture<()>;
    fn complete(&self, reference: Value, argument: Value) -> BoxFuture<Value>;
}

/// Opens a transport for a connect request. The embedding host supplies the
/// real implementation (stdio process spawn, HTTP client, SSE stream); tests
/// in this crate supply an in-memory stub.
pub trait McpTransportFactory: Send + Sync {
    fn connect(
        &self,
        transport: Transport,
        url: String,
        timeout: Duration,
        auth: Option<String>,
    ) -> BoxFuture<std::sync::Arc<dyn McpTransport>>;
}
