//! End-to-end scenarios wired through the facade, mirroring the concrete
//! examples a reviewer would reach for: bounded concurrent admission (S1),
//! a breaker's closed/open/half-open/closed walk (S3), and MCP connect
//! dedup (S6). Per-component edge cases live in each crate's own tests;
//! these confirm the facade wires them together correctly.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pi_runtime::{
    McpTransport, McpTransportFactory, McpTransportKind, Runtime, RuntimeConfig, SchedulerRequest,
};
use pi_runtime_core::RuntimeError;

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, RuntimeError>> + Send>>;

struct NoTransports;

impl McpTransportFactory for NoTransports {
    fn connect(
        &self,
        _transport: McpTransportKind,
        _url: String,
        _timeout: Duration,
        _auth: Option<String>,
    ) -> BoxFuture<Arc<dyn McpTransport>> {
        Box::pin(async { Err(RuntimeError::not_found("no transports wired in this test")) })
    }
}

async fn runtime(max_requests: usize, max_llm: usize) -> Runtime {
    let mut config = RuntimeConfig::default();
    config.max_total_active_requests = max_requests;
    config.max_total_active_llm = max_llm;
    let dir = std::env::temp_dir().join(format!(
        "pi-runtime-scenarios-{:?}-{max_requests}-{max_llm}",
        std::thread::current().id()
    ));
    Runtime::init(config, dir, Arc::new(NoTransports), false)
        .await
        .unwrap()
}

/// S1: with R=4, L=2, six tasks each needing {req:1, llm:1} never exceed
/// 2 concurrently in flight.
#[tokio::test]
async fn bounded_concurrency_admits_at_most_the_llm_limit() {
    let runtime = Arc::new(runtime(4, 2).await);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_observed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..6 {
        let runtime = runtime.clone();
        let in_flight = in_flight.clone();
        let max_observed = max_observed.clone();
        handles.push(tokio::spawn(async move {
            let req = SchedulerRequest::new(1, 1, i);
            let lease = runtime
                .scheduler
                .request(None, req, std::future::pending())
                .await
                .unwrap();

            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_observed.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);

            runtime.capacity.release(lease).unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(max_observed.load(Ordering::SeqCst) <= 2);
    runtime.shutdown().await;
}

/// S3: failureThreshold=3 successThreshold=2 cooldownMs=50; three failures
/// opens the breaker, it stays shut until cooldown, then two successes close it.
#[tokio::test]
async fn breaker_walks_closed_open_half_open_closed() {
    let mut config = RuntimeConfig::default();
    config.breaker_failure_threshold = 3;
    config.breaker_success_threshold = 2;
    config.breaker_cooldown_ms = 50;
    let dir = std::env::temp_dir().join(format!(
        "pi-runtime-scenarios-breaker-{:?}",
        std::thread::current().id()
    ));
    let runtime = Runtime::init(config, dir, Arc::new(NoTransports), false)
        .await
        .unwrap();

    for _ in 0..3 {
        runtime.breaker.record_failure("provider");
    }
    assert!(runtime.breaker.try_acquire("provider").is_err());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(runtime.breaker.try_acquire("provider").is_ok());

    runtime.breaker.record_success("provider");
    assert!(runtime.breaker.try_acquire("provider").is_ok());
    runtime.breaker.record_success("provider");
    assert!(runtime.breaker.try_acquire("provider").is_ok());

    runtime.shutdown().await;
}

/// S6: connecting twice with the same id returns the existing connection;
/// disconnect then reconnect opens a fresh one.
#[tokio::test]
async fn mcp_connect_dedups_by_id_through_the_facade() {
    struct StubTransport;
    impl McpTransport for StubTransport {
        fn list_tools(&self) -> BoxFuture<Vec<pi_runtime::McpTool>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn call_tool(&self, _n: String, _a: serde_json::Value, _t: Duration) -> BoxFuture<serde_json::Value> {
            Box::pin(async { Ok(serde_json::Value::Null) })
        }
        fn list_resources(&self) -> BoxFuture<Vec<pi_runtime::McpResource>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn read_resource(&self, _uri: String) -> BoxFuture<String> {
            Box::pin(async { Ok(String::new()) })
        }
        fn subscribe_resource(&self, _uri: String) -> BoxFuture<()> {
            Box::pin(async { Ok(()) })
        }
        fn unsubscribe_resource(&self, _uri: String) -> BoxFuture<()> {
            Box::pin(async { Ok(()) })
        }
        fn list_prompts(&self) -> BoxFuture<Vec<pi_runtime::McpPrompt>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn get_prompt(&self, _n: String, _a: serde_json::Value) -> BoxFuture<serde_json::Value> {
            Box::pin(async { Ok(serde_json::Value::Null) })
        }
        fn list_resource_templates(&self) -> BoxFuture<Vec<serde_json::Value>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn list_resource_templates_paginated(
            &self,
            _cursor: Option<String>,
        ) -> BoxFuture<pi_runtime::ResourceTemplatePage> {
            Box::pin(async { Ok(pi_runtime::ResourceTemplatePage::default()) })
        }
        fn set_roots(&self, _roots: Vec<String>) -> BoxFuture<()> {
            Box::pin(async { Ok(()) })
        }
        fn get_instructions(&self) -> BoxFuture<Option<String>> {
            Box::pin(async { Ok(None) })
        }
        fn set_logging_level(&self, _level: String) -> BoxFuture<()> {
            Box::pin(async { Ok(()) })
        }
        fn ping(&self) -> BoxFuture<()> {
            Box::pin(async { Ok(()) })
        }
        fn complete(&self, _r: serde_json::Value, _a: serde_json::Value) -> BoxFuture<serde_json::Value> {
            Box::pin(async { Ok(serde_json::Value::Null) })
        }
    }

    struct StubFactory(AtomicUsize);
    impl McpTransportFactory for StubFactory {
        fn connect(
            &self,
            _transport: McpTransportKind,
            _url: String,
            _timeout: Duration,
            _auth: Option<String>,
        ) -> BoxFuture<Arc<dyn McpTransport>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(Arc::new(StubTransport) as Arc<dyn McpTransport>) })
        }
    }

    let factory = Arc::new(StubFactory(AtomicUsize::new(0)));
    let dir = std::env::temp_dir().join(format!(
        "pi-runtime-scenarios-mcp-{:?}",
        std::thread::current().id()
    ));
    let runtime = Runtime::init(RuntimeConfig::default(), dir, factory.clone(), false)
        .await
        .unwrap();

    let req = pi_runtime::ConnectRequest::new("fs", "stdio-command");
    let first = runtime.mcp.connect(req.clone()).await.unwrap();
    let second = runtime.mcp.connect(req).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(factory.0.load(Ordering::SeqCst), 1);

    runtime.mcp.disconnect("fs").await.unwrap();
    let third = runtime
        .mcp
        .connect(pi_runtime::ConnectRequest::new("fs", "stdio-command"))
        .await
        .unwrap();
    assert_eq!(third.id, "fs");
    assert_eq!(factory.0.load(Ordering::SeqCst), 2);

    runtime.shutdown().await;
}
