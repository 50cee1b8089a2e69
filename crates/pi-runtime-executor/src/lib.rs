//! Task execution (§4.9): `TaskExecutor::run_task` reserves capacity (C5),
//! heartbeats the lease, retries an LLM callable through C4 (itself wrapping
//! C2's rate limiter and C3's circuit breaker), records the outcome for C7,
//! and parses the result against the shared structured-output contract.
//!
//! ```rust
//! use pi_runtime_executor::{TaskExecutor, TaskRequest};
//! use pi_runtime_breaker::{BreakerConfig, BreakerRegistry};
//! use pi_runtime_capacity::{CapacityConfig, CapacityRegistry};
//! use pi_runtime_limiter::{LimiterConfig, LimiterRegistry};
//! use pi_runtime_core::RuntimeError;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), RuntimeError> {
//! let executor = TaskExecutor::new(
//!     Arc::new(CapacityRegistry::new(CapacityConfig::builder().build())),
//!     Arc::new(BreakerRegistry::new(BreakerConfig::builder().build())),
//!     Arc::new(LimiterRegistry::new(LimiterConfig::builder().build())),
//!     Arc::new(|_prompt: String| async { Ok("SUMMARY: ok\nRESULT: done".to_string()) }),
//!     3,
//!     Duration::from_secs(90),
//! );
//!
//! let outcome = executor
//!     .run_task(TaskRequest::new("do the thing", "gpt-4", 1), CancellationToken::new())
//!     .await?;
//! assert_eq!(outcome.output.result.as_deref(), Some("done"));
//! # Ok(())
//! # }
//! ```

mod executor;
mod parser;

pub use executor::{LlmCall, TaskExecutor, TaskOutcome, TaskRequest};
pub use parser::StructuredOutput;
