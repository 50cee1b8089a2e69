//! `McpManager` (§4.10): connection registry, dedup-by-id, SSRF-guarded connect,
//! and the failure semantics that flip a connection to `error` and collapse
//! every later call on it to `not_found`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use pi_runtime_core::RuntimeError;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::connection::{
    McpPrompt, McpResource, McpTool, McpTransport, McpTransportFactory, ResourceTemplatePage,
};
use crate::ssrf;
use crate::transport::{self, Transport};

const DEFAULT_MAX_CONNECTIONS: usize = 10;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for an [`McpManager`] (§5 default: `mcpDefaultTimeoutMs=30s`).
#[derive(Debug, Clone)]
pub struct McpManagerConfig {
    pub max_connections: usize,
    pub default_timeout: Duration,
}

impl Default for McpManagerConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A request to open (or attach to) a connection.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub id: String,
    pub url: String,
    pub timeout: Option<Duration>,
    pub auth: Option<String>,
}

impl ConnectRequest {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            timeout: None,
            auth: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn auth(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(token.into());
        self
    }
}

/// Connection health as observed by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Error,
}

/// What `connect` returns — enough for a caller to know what it got without
/// reaching back into the registry.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: String,
    pub url: String,
    pub transport: Transport,
    pub status: ConnectionStatus,
}

/// An event delivered through the single notification callback (§4.10's
/// "unified event fan-out").
#[derive(Debug, Clone)]
pub enum McpNotification {
    ToolsListChanged { id: String },
    ResourcesListChanged { id: String },
    PromptsListChanged { id: String },
    LoggingLevelChanged { id: String, level: String },
    Progress { id: String, token: String, progress: f64, total: Option<f64> },
    Cancelled { id: String, reason: Option<String> },
    Disconnected { id: String, reason: String },
}

type NotificationCallback = Arc<dyn Fn(&McpNotification) + Send + Sync>;
type SamplingHandler = Arc<
    dyn Fn(Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, RuntimeError>> + Send>>
        + Send
        + Sync,
>;

struct ConnectionRecord {
    url: String,
    transport_kind: Transport,
    status: ConnectionStatus,
    timeout: Duration,
    transport: Arc<dyn McpTransport>,
    subscriptions: HashSet<String>,
}

/// Owns every MCP connection for this process (§5: "MCP connections are
/// per-process; their state is not shared cross-process").
pub struct McpManager {
    factory: Arc<dyn McpTransportFactory>,
    config: McpManagerConfig,
    connections: RwLock<HashMap<String, ConnectionRecord>>,
    notification_callback: RwLock<Option<NotificationCallback>>,
    sampling_handler: RwLock<Option<SamplingHandler>>,
    elicitation_handler: RwLock<Option<SamplingHandler>>,
}

impl McpManager {
    pub fn new(factory: Arc<dyn McpTransportFactory>, config: McpManagerConfig) -> Self {
        Self {
            factory,
            config,
            connections: RwLock::new(HashMap::new()),
            notification_callback: RwLock::new(None),
            sampling_handler: RwLock::new(None),
            elicitation_handler: RwLock::new(None),
        }
    }

    /// Registers the single callback used for every notification kind.
    /// Replaces any previously registered callback.
    pub async fn set_notification_callback<F>(&self, callback: F)
    where
        F: Fn(&McpNotification) + Send + Sync + 'static,
    {
        *self.notification_callback.write().await = Some(Arc::new(callback));
    }

    /// Registers the server→client `sampling/createMessage` handler.
    pub async fn set_sampling_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, RuntimeError>> + Send + 'static,
    {
        *self.sampling_handler.write().await = Some(Arc::new(move |v| Box::pin(handler(v))));
    }

    /// Registers the server→client `elicitation/create` handler.
    pub async fn set_elicitation_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, RuntimeError>> + Send + 'static,
    {
        *self.elicitation_handler.write().await = Some(Arc::new(move |v| Box::pin(handler(v))));
    }

    async fn notify(&self, event: McpNotification) {
        if let Some(callback) = self.notification_callback.read().await.as_ref() {
            callback(&event);
        }
    }

    /// Opens a connection for `req`, or returns the existing one if `req.id`
    /// is already connected (§9 S6: a second `connect` with the same id is not
    /// an error).
    pub async fn connect(&self, req: ConnectRequest) -> Result<ConnectionInfo, RuntimeError> {
        {
            let connections = self.connections.read().await;
            if let Some(existing) = connections.get(&req.id) {
                return Ok(ConnectionInfo {
                    id: req.id,
                    url: existing.url.clone(),
                    transport: existing.transport_kind.clone(),
                    status: existing.status,
                });
            }
            // Checked-then-insert, not atomic: two concurrent connects for distinct
            // ids can both pass this check. Acceptable since §5 has no hard admission
            // invariant for C10 the way it does for C5's reservation counters.
            if connections.len() >= self.config.max_connections {
                return Err(RuntimeError::runtime_limit(format!(
                    "mcp connection limit reached: {} active, max {}",
                    connections.len(),
                    self.config.max_connections
                )));
            }
        }

        let kind = transport::detect(&req.url);
        if matches!(kind, Transport::Http | Transport::Sse) {
            ssrf::check_url(&req.url).await?;
        }

        let timeout = req.timeout.unwrap_or(self.config.default_timeout);
        let transport = self
            .factory
            .connect(kind.clone(), req.url.clone(), timeout, req.auth)
            .await?;

        let mut connections = self.connections.write().await;
        // Lost the race against a concurrent connect for the same id: keep the
        // winner, discard the transport we just opened.
        let info = connections
            .entry(req.id.clone())
            .or_insert_with(|| ConnectionRecord {
                url: req.url.clone(),
                transport_kind: kind.clone(),
                status: ConnectionStatus::Connected,
                timeout,
                transport,
                subscriptions: HashSet::new(),
            });

        Ok(ConnectionInfo {
            id: req.id,
            url: info.url.clone(),
            transport: info.transport_kind.clone(),
            status: info.status,
        })
    }

    /// Removes `id` if present. Idempotent: disconnecting an unknown or
    /// already-disconnected id is not an error.
    pub async fn disconnect(&self, id: &str) -> Result<(), RuntimeError> {
        self.connections.write().await.remove(id);
        Ok(())
    }

    pub async fn disconnect_all(&self) {
        self.connections.write().await.clear();
    }

    pub async fn status(&self, id: &str) -> Option<ConnectionStatus> {
        self.connections.read().await.get(id).map(|c| c.status)
    }

    async fn transport_for(&self, id: &str) -> Result<Arc<dyn McpTransport>, RuntimeError> {
        let connections = self.connections.read().await;
        let record = connections.get(id).ok_or_else(|| RuntimeError::not_found(id))?;
        if record.status == ConnectionStatus::Error {
            return Err(RuntimeError::not_found(id));
        }
        Ok(Arc::clone(&record.transport))
    }

    async fn timeout_for(&self, id: &str) -> Duration {
        self.connections
            .read()
            .await
            .get(id)
            .map(|c| c.timeout)
            .unwrap_or(self.config.default_timeout)
    }

    async fn mark_error(&self, id: &str, err: &RuntimeError) {
        if let Some(record) = self.connections.write().await.get_mut(id) {
            record.status = ConnectionStatus::Error;
        }
        self.notify(McpNotification::Disconnected {
            id: id.to_string(),
            reason: err.to_string(),
        })
        .await;
    }

    /// Runs `op` against `id`'s transport; a failure flips the connection to
    /// `error` and fires a disconnect notification (§4.10's failure semantics),
    /// and the original error is returned to this call's caller.
    async fn call<T, F>(&self, id: &str, op: F) -> Result<T, RuntimeError>
    where
        F: FnOnce(
            Arc<dyn McpTransport>,
        )
            -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, RuntimeError>> + Send>>,
    {
        let transport = self.transport_for(id).await?;
        match op(transport).await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.mark_error(id, &err).await;
                Err(err)
            }
        }
    }

    pub async fn list_tools(&self, id: &str) -> Result<Vec<McpTool>, RuntimeError> {
        self.call(id, |t| t.list_tools()).await
    }

    pub async fn call_tool(
        &self,
        id: &str,
        name: &str,
        args: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, RuntimeError> {
        let name = name.to_string();
        let timeout = match timeout {
            Some(t) => t,
            None => self.timeout_for(id).await,
        };
        self.call(id, move |t| t.call_tool(name, args, timeout)).await
    }

    pub async fn list_resources(&self, id: &str) -> Result<Vec<McpResource>, RuntimeError> {
        self.call(id, |t| t.list_resources()).await
    }

    pub async fn read_resource(&self, id: &str, uri: &str) -> Result<String, RuntimeError> {
        let uri = uri.to_string();
        self.call(id, move |t| t.read_resource(uri)).await
    }

    pub async fn subscribe_resource(&self, id: &str, uri: &str) -> Result<(), RuntimeError> {
        let uri_owned = uri.to_string();
        self.call(id, {
            let uri_owned = uri_owned.clone();
            move |t| t.subscribe_resource(uri_owned)
        })
        .await?;
        if let Some(record) = self.connections.write().await.get_mut(id) {
            record.subscriptions.insert(uri_owned);
        }
        Ok(())
    }

    pub async fn unsubscribe_resource(&self, id: &str, uri: &str) -> Result<(), RuntimeError> {
        let uri_owned = uri.to_string();
        self.call(id, {
            let uri_owned = uri_owned.clone();
            move |t| t.unsubscribe_resource(uri_owned)
        })
        .await?;
        if let Some(record) = self.connections.write().await.get_mut(id) {
            record.subscriptions.remove(&uri_owned);
        }
        Ok(())
    }

    pub async fn get_subscriptions(&self, id: &str) -> Result<Vec<String>, RuntimeError> {
        let connections = self.connections.read().await;
        let record = connections.get(id).ok_or_else(|| RuntimeError::not_found(id))?;
        if record.status == ConnectionStatus::Error {
            return Err(RuntimeError::not_found(id));
        }
        Ok(record.subscriptions.iter().cloned().collect())
    }

    pub async fn list_prompts(&self, id: &str) -> Result<Vec<McpPrompt>, RuntimeError> {
        self.call(id, |t| t.list_prompts()).await
    }

    pub async fn get_prompt(&self, id: &str, name: &str, args: Value) -> Result<Value, RuntimeError> {
        let name = name.to_string();
        self.call(id, move |t| t.get_prompt(name, args)).await
    }

    pub async fn list_resource_templates(&self, id: &str) -> Result<Vec<Value>, RuntimeError> {
        self.call(id, |t| t.list_resource_templates()).await
    }

    pub async fn list_resource_templates_paginated(
        &self,
        id: &str,
        cursor: Option<String>,
    ) -> Result<ResourceTemplatePage, RuntimeError> {
        self.call(id, move |t| t.list_resource_templates_paginated(cursor)).await
    }

    pub async fn set_roots(&self, id: &str, roots: Vec<String>) -> Result<(), RuntimeError> {
        self.call(id, move |t| t.set_roots(roots)).await
    }

    pub async fn get_instructions(&self, id: &str) -> Result<Option<String>, RuntimeError> {
        self.call(id, |t| t.get_instructions()).await
    }

    pub async fn set_logging_level(&self, id: &str, level: &str) -> Result<(), RuntimeError> {
        let level = level.to_string();
        self.call(id, move |t| t.set_logging_level(level)).await
    }

    pub async fn ping(&self, id: &str) -> Result<(), RuntimeError> {
        self.call(id, |t| t.ping()).await
    }

    pub async fn complete(&self, id: &str, reference: Value, argument: Value) -> Result<Value, RuntimeError> {
        self.call(id, move |t| t.complete(reference, argument)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubTransport {
        fail_calls: Arc<std::sync::atomic::AtomicBool>,
    }

    impl McpTransport for StubTransport {
        fn list_tools(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<McpTool>, RuntimeError>> + Send>> {
            Box::pin(async { Ok(vec![]) })
        }

        fn call_tool(
            &self,
            _name: String,
            _args: Value,
            _timeout: Duration,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, RuntimeError>> + Send>> {
            let should_fail = self.fail_calls.load(Ordering::SeqCst);
            Box::pin(async move {
                if should_fail {
                    Err(RuntimeError::llm_error("upstream down", Some(502)))
                } else {
                    Ok(Value::String("ok".to_string()))
                }
            })
        }

        fn list_resources(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<McpResource>, RuntimeError>> + Send>> {
            Box::pin(async { Ok(vec![]) })
        }

        fn read_resource(&self, _uri: String) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, RuntimeError>> + Send>> {
            Box::pin(async { Ok(String::new()) })
        }

        fn subscribe_resource(&self, _uri: String) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), RuntimeError>> + Send>> {
            Box::pin(async { Ok(()) })
        }

        fn unsubscribe_resource(&self, _uri: String) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), RuntimeError>> + Send>> {
            Box::pin(async { Ok(()) })
        }

        fn list_prompts(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<McpPrompt>, RuntimeError>> + Send>> {
            Box::pin(async { Ok(vec![]) })
        }

        fn get_prompt(&self, _name: String, _args: Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, RuntimeError>> + Send>> {
            Box::pin(async { Ok(Value::Null) })
        }

        fn list_resource_templates(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Value>, RuntimeError>> + Send>> {
            Box::pin(async { Ok(vec![]) })
        }

        fn list_resource_templates_paginated(
            &self,
            _cursor: Option<String>,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ResourceTemplatePage, RuntimeError>> + Send>> {
            Box::pin(async { Ok(ResourceTemplatePage::default()) })
        }

        fn set_roots(&self, _roots: Vec<String>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), RuntimeError>> + Send>> {
            Box::pin(async { Ok(()) })
        }

        fn get_instructions(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<String>, RuntimeError>> + Send>> {
            Box::pin(async { Ok(None) })
        }

        fn set_logging_level(&self, _level: String) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), RuntimeError>> + Send>> {
            Box::pin(async { Ok(()) })
        }

        fn ping(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), RuntimeError>> + Send>> {
            Box::pin(async { Ok(()) })
        }

        fn complete(&self, _reference: Value, _argument: Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, RuntimeError>> + Send>> {
            Box::pin(async { Ok(Value::Null) })
        }
    }

    struct StubFactory {
        connect_calls: AtomicUsize,
        fail_calls: Arc<std::sync::atomic::AtomicBool>,
    }

    impl StubFactory {
        fn new() -> Self {
            Self {
                connect_calls: AtomicUsize::new(0),
                fail_calls: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            }
        }
    }

    impl McpTransportFactory for StubFactory {
        fn connect(
            &self,
            _transport: Transport,
            _url: String,
            _timeout: Duration,
            _auth: Option<String>,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Arc<dyn McpTransport>, RuntimeError>> + Send>>
        {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            let fail_calls = Arc::clone(&self.fail_calls);
            Box::pin(async move { Ok(Arc::new(StubTransport { fail_calls }) as Arc<dyn McpTransport>) })
        }
    }

    fn manager() -> (Arc<StubFactory>, McpManager) {
        let factory = Arc::new(StubFactory::new());
        let manager = McpManager::new(Arc::clone(&factory) as Arc<dyn McpTransportFactory>, McpManagerConfig::default());
        (factory, manager)
    }

    #[tokio::test]
    async fn connect_then_list_tools_succeeds() {
        let (_factory, manager) = manager();
        manager.connect(ConnectRequest::new("fs", "https://example.com/mcp")).await.unwrap();
        let tools = manager.list_tools("fs").await.unwrap();
        assert!(tools.is_empty());
    }

    #[tokio::test]
    async fn second_connect_with_same_id_returns_existing_connection() {
        let (factory, manager) = manager();
        manager.connect(ConnectRequest::new("fs", "https://example.com/mcp")).await.unwrap();
        manager.connect(ConnectRequest::new("fs", "https://example.com/mcp")).await.unwrap();
        assert_eq!(factory.connect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_then_connect_opens_a_fresh_connection() {
        let (factory, manager) = manager();
        manager.connect(ConnectRequest::new("fs", "https://example.com/mcp")).await.unwrap();
        manager.disconnect("fs").await.unwrap();
        manager.connect(ConnectRequest::new("fs", "https://example.com/mcp")).await.unwrap();
        assert_eq!(factory.connect_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn connect_beyond_max_connections_is_rejected() {
        let factory = Arc::new(StubFactory::new());
        let manager = McpManager::new(
            Arc::clone(&factory) as Arc<dyn McpTransportFactory>,
            McpManagerConfig { max_connections: 1, default_timeout: DEFAULT_TIMEOUT },
        );
        manager.connect(ConnectRequest::new("a", "https://example.com/mcp")).await.unwrap();
        let err = manager.connect(ConnectRequest::new("b", "https://example.com/mcp")).await.unwrap_err();
        assert_eq!(err.kind().as_str(), "runtime_limit");
    }

    #[tokio::test]
    async fn ssrf_blocked_url_never_reaches_the_factory() {
        let (factory, manager) = manager();
        let err = manager
            .connect(ConnectRequest::new("fs", "http://169.254.169.254/latest"))
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "ssrf_blocked");
        assert_eq!(factory.connect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_call_transitions_connection_to_error_and_future_calls_are_not_found() {
        let (factory, manager) = manager();
        factory.fail_calls.store(true, Ordering::SeqCst);
        manager.connect(ConnectRequest::new("fs", "https://example.com/mcp")).await.unwrap();

        let err = manager.call_tool("fs", "search", Value::Null, None).await.unwrap_err();
        assert_eq!(err.kind().as_str(), "llm_error");
        assert_eq!(manager.status("fs").await, Some(ConnectionStatus::Error));

        let err = manager.list_tools("fs").await.unwrap_err();
        assert_eq!(err.kind().as_str(), "not_found");
    }

    #[tokio::test]
    async fn failed_call_fires_disconnect_notification() {
        let (factory, manager) = manager();
        factory.fail_calls.store(true, Ordering::SeqCst);
        manager.connect(ConnectRequest::new("fs", "https://example.com/mcp")).await.unwrap();

        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        manager
            .set_notification_callback(move |event| {
                if let McpNotification::Disconnected { id, .. } = event {
                    *seen_clone.lock().unwrap() = Some(id.clone());
                }
            })
            .await;

        let _ = manager.call_tool("fs", "search", Value::Null, None).await;
        assert_eq!(seen.lock().unwrap().as_deref(), Some("fs"));
    }

    #[tokio::test]
    async fn subscribe_then_get_subscriptions_then_unsubscribe() {
        let (_factory, manager) = manager();
        manager.connect(ConnectRequest::new("fs", "https://example.com/mcp")).await.unwrap();
        manager.subscribe_resource("fs", "file:///a.txt").await.unwrap();
        assert_eq!(manager.get_subscriptions("fs").await.unwrap(), vec!["file:///a.txt".to_string()]);
        manager.unsubscribe_resource("fs", "file:///a.txt").await.unwrap();
        assert!(manager.get_subscriptions("fs").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stdio_transport_is_detected_and_not_ssrf_checked() {
        let (_factory, manager) = manager();
        let info = manager
            .connect(ConnectRequest::new("local", "my-mcp-server --stdio"))
            .await
            .unwrap();
        assert_eq!(info.transport, Transport::Stdio { command: vec!["my-mcp-server".into(), "--stdio".into()] });
    }
}
