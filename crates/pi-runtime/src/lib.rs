//! Single-process runtime orchestration core.
//!
//! Ten components cooperate to run LLM-backed tasks under shared concurrency
//! limits, fairness across peer processes, and resilience against failing
//! providers:
//!
//! - [`pi_runtime_store`] (C1) — the sidecar-file-backed state store every
//!   other component's persistent registries are built on.
//! - [`pi_runtime_limiter`] (C2) — per-key rate limiting.
//! - [`pi_runtime_breaker`] (C3) — per-key circuit breaking.
//! - [`pi_runtime_retry`] (C4) — retry with backoff, composed with C2/C3.
//! - [`pi_runtime_capacity`] (C5, C7) — capacity leases and the adaptive
//!   controller that shrinks/grows limits from observed outcomes.
//! - [`pi_runtime_coordinator`] (C6) — fair sharing of LLM concurrency
//!   across peer processes via a shared instance registry.
//! - [`pi_runtime_scheduler`] (C8) — the single entry point a task goes
//!   through before it is allowed to run.
//! - [`pi_runtime_executor`] (C9) — runs one task to completion: retry,
//!   heartbeat, structured-output parsing, adaptive outcome recording.
//! - [`pi_runtime_mcp`] (C10) — opens/closes MCP connections and routes
//!   tool/resource/prompt calls through them.
//!
//! [`Runtime`] wires C1 through C8 and C10 together from one [`RuntimeConfig`].
//! Building a [`pi_runtime_executor::TaskExecutor`] (C9) is left to the host,
//! since it needs a concrete `LlmCall` this crate cannot supply generically.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pi_runtime::{Runtime, RuntimeConfig};
//!
//! # async fn example(mcp_factory: Arc<dyn pi_runtime_mcp::McpTransportFactory>) -> Result<(), pi_runtime_core::RuntimeError> {
//! let runtime = Runtime::init(RuntimeConfig::default(), "./.pi/state", mcp_factory, true).await?;
//! // ... run tasks through runtime.scheduler, runtime.mcp, etc.
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod runtime;

pub use config::RuntimeConfig;
pub use runtime::Runtime;

pub use pi_runtime_core::{ErrorKind, RuntimeError};

pub use pi_runtime_breaker::{BreakerConfig, BreakerEvent, BreakerRegistry, CircuitMetrics, CircuitState};
pub use pi_runtime_capacity::{
    AdaptiveController, CapacityConfig, CapacityEvent, CapacityRegistry, LeaseId, Outcome, ReservationRequest,
    RuntimeSnapshot,
};
pub use pi_runtime_coordinator::{Coordinator, CoordinatorConfig, InstanceMetrics, InstanceRecord, InstanceToken};
pub use pi_runtime_executor::{LlmCall, StructuredOutput, TaskExecutor, TaskOutcome, TaskRequest};
pub use pi_runtime_limiter::{LimiterConfig, LimiterEvent, LimiterRegistry};
pub use pi_runtime_mcp::{
    load_config as load_mcp_config, parse_config as parse_mcp_config, ConnectRequest, ConnectionInfo,
    ConnectionStatus, HttpTransport, HttpTransportFactory, McpManager, McpManagerConfig, McpNotification,
    McpPrompt, McpResource, McpServerConfig, McpTool, McpTransport, McpTransportFactory, ResourceTemplatePage,
    StdioTransport, StdioTransportFactory, Transport as McpTransportKind,
};
pub use pi_runtime_retry::{retry, RetryEvent, RetryOptions, RetryOptionsBuilder, ShouldRetry};
pub use pi_runtime_scheduler::{Scheduler, SchedulerConfig, SchedulerRequest};
pub use pi_runtime_store::{StateStore, StoreConfig};
