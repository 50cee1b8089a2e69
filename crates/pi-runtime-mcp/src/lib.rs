//! MCP connection manager (§4.10): opens/closes transports to external capability
//! servers, routes tool/resource/prompt calls, and dispatches notifications.
//!
//! `McpManager` owns the registry; it is generic over the actual wire protocol
//! through [`McpTransport`]/[`McpTransportFactory`], which an embedding host
//! implements once per transport kind (stdio process, HTTP client, SSE stream).
//! This crate's own job is dedup-by-id, the `maxConnections` cap, the SSRF check
//! before any outbound network connect, and the failure semantics that flip a
//! connection to `error` and collapse subsequent calls on it to `not_found`.

mod config;
mod connection;
mod http_transport;
mod manager;
mod rpc;
mod ssrf;
mod stdio_transport;
mod transport;

pub use config::{load as load_config, parse_strict as parse_config, McpServerConfig};
pub use connection::{McpPrompt, McpResource, McpTool, McpTransport, McpTransportFactory, ResourceTemplatePage};
pub use http_transport::{HttpTransport, HttpTransportFactory};
pub use manager::{
    ConnectRequest, ConnectionInfo, ConnectionStatus, McpManager, McpManagerConfig, McpNotification,
};
pub use stdio_transport::{StdioTransport, StdioTransportFactory};
pub use transport::Transport;
