//! Wires a `Runtime`, requests capacity through its scheduler, and releases
//! the lease — the smallest possible round trip through C1/C5/C8.

use std::sync::Arc;

use pi_runtime::{McpTransport, McpTransportFactory, Runtime, RuntimeConfig};
use pi_runtime_core::RuntimeError;

struct NoTransports;

impl McpTransportFactory for NoTransports {
    fn connect(
        &self,
        _transport: pi_runtime::McpTransportKind,
        _url: String,
        _timeout: std::time::Duration,
        _auth: Option<String>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Arc<dyn McpTransport>, RuntimeError>> + Send>> {
        Box::pin(async { Err(RuntimeError::not_found("no transports configured in this example")) })
    }
}

#[tokio::main]
async fn main() -> Result<(), RuntimeError> {
    let state_dir = std::env::temp_dir().join("pi-runtime-basic-task-example");
    let runtime = Runtime::init(RuntimeConfig::default(), &state_dir, Arc::new(NoTransports), false).await?;

    let req = pi_runtime::SchedulerRequest::new(1, 0, std::process::id());
    let lease = runtime
        .scheduler
        .request(None, req, std::future::pending())
        .await?;
    println!("admitted, lease = {lease:?}");

    runtime.capacity.release(lease)?;
    runtime.shutdown().await;
    Ok(())
}
