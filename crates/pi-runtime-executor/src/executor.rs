//! Task execution (§4.9): reserve capacity, heartbeat, retry-wrapped LLM call,
//! structured-output parsing, guaranteed lease release.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pi_runtime_breaker::BreakerRegistry;
use pi_runtime_capacity::{AdaptiveController, CapacityRegistry, LeaseId, Outcome, ReservationRequest};
use pi_runtime_core::{CrateTelemetry, NoopTelemetry, OperationResult, RuntimeError};
use pi_runtime_limiter::LimiterRegistry;
use pi_runtime_retry::{retry, RetryOptions};
use tokio_util::sync::CancellationToken;

use crate::parser::{self, StructuredOutput};

/// A single task submission (§4.9's `runTask` contract).
pub struct TaskRequest {
    pub prompt: String,
    pub model: String,
    pub timeout: Duration,
    pub requests_needed: usize,
    pub llm_needed: usize,
    pub owner_pid: u32,
    pub rate_limit_key: Option<String>,
    pub breaker_key: Option<String>,
}

impl TaskRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>, owner_pid: u32) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            timeout: Duration::from_secs(120),
            requests_needed: 1,
            llm_needed: 1,
            owner_pid,
            rate_limit_key: None,
            breaker_key: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rate_limit_key(mut self, key: impl Into<String>) -> Self {
        self.rate_limit_key = Some(key.into());
        self
    }

    pub fn breaker_key(mut self, key: impl Into<String>) -> Self {
        self.breaker_key = Some(key.into());
        self
    }
}

/// Result of a completed task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub output: StructuredOutput,
    pub latency: Duration,
}

/// An LLM callable: given a (possibly format-reminder-rewritten) prompt, returns
/// the model's raw text output or an [`RuntimeError::llm_error`].
pub trait LlmCall: Send + Sync {
    fn call(
        &self,
        prompt: String,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<String, RuntimeError>> + Send>>;
}

impl<F, Fut> LlmCall for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, RuntimeError>> + Send + 'static,
{
    fn call(
        &self,
        prompt: String,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<String, RuntimeError>> + Send>> {
        Box::pin(self(prompt))
    }
}

async fn call_with_timeout(llm: &Arc<dyn LlmCall>, prompt: String, timeout: Duration) -> Result<String, RuntimeError> {
    match tokio::time::timeout(timeout, llm.call(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(RuntimeError::timeout()),
    }
}

fn spawn_heartbeat(
    capacity: Arc<CapacityRegistry>,
    lease: LeaseId,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if capacity.heartbeat(lease).is_err() {
                        return;
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    })
}

/// Runs the retry-wrapped LLM call and structured-output parse for an already
/// admitted lease. Free function (not a method) so it can be spawned as its
/// own task, isolating a panicking `llm` callable from the caller.
async fn execute_attempt(
    capacity: Arc<CapacityRegistry>,
    breaker: Arc<BreakerRegistry>,
    limiter: Arc<LimiterRegistry>,
    llm: Arc<dyn LlmCall>,
    adaptive: Option<Arc<AdaptiveController>>,
    max_retries: usize,
    heartbeat_interval: Duration,
    req: TaskRequest,
    cancel: CancellationToken,
    lease: LeaseId,
) -> Result<StructuredOutput, RuntimeError> {
    let heartbeat = spawn_heartbeat(Arc::clone(&capacity), lease, heartbeat_interval, cancel.clone());

    let mut opts_builder = RetryOptions::builder().max_retries(max_retries);
    if let Some(key) = &req.rate_limit_key {
        opts_builder = opts_builder.rate_limit_key(key.clone());
    }
    if let Some(key) = &req.breaker_key {
        opts_builder = opts_builder.circuit_breaker_key(key.clone());
    }
    let opts = opts_builder.build();

    let timeout = req.timeout;
    let prompt = req.prompt.clone();

    // `retry` only observes `cancel` between attempts (breaker/limiter checks,
    // backoff sleep); race the whole call so an in-flight LLM request is also
    // abandoned promptly on cancellation, per §5's cancellation guarantee.
    let raw = tokio::select! {
        result = retry(
            {
                let llm = Arc::clone(&llm);
                move || {
                    let llm = Arc::clone(&llm);
                    let prompt = prompt.clone();
                    async move { call_with_timeout(&llm, prompt, timeout).await }
                }
            },
            &opts,
            Some(&breaker),
            Some(&limiter),
            &cancel,
        ) => result,
        _ = cancel.cancelled() => Err(RuntimeError::cancelled()),
    };

    heartbeat.abort();

    if let Some(adaptive) = &adaptive {
        let outcome = match &raw {
            Ok(_) => Outcome::Success,
            Err(e) if e.is_timeout() => Outcome::Timeout,
            Err(e) if e.kind().as_str() == "rate_limited" => Outcome::RateLimit,
            Err(_) => Outcome::Error,
        };
        adaptive.record_outcome(&req.model, outcome);
    }

    let raw = raw?;
    match parser::parse(&raw) {
        Ok(output) => Ok(output),
        Err(_) => {
            let reminder_prompt = parser::with_format_reminder(&req.prompt);
            let retried = call_with_timeout(&llm, reminder_prompt, req.timeout).await?;
            parser::parse(&retried)
        }
    }
}

/// Wires C5 (capacity), C4 (retry, wrapping C2+C3), and the structured-output
/// contract into a single `run_task` entrypoint, per §4.9's algorithm.
pub struct TaskExecutor {
    capacity: Arc<CapacityRegistry>,
    breaker: Arc<BreakerRegistry>,
    limiter: Arc<LimiterRegistry>,
    llm: Arc<dyn LlmCall>,
    adaptive: Option<Arc<AdaptiveController>>,
    telemetry: Arc<dyn CrateTelemetry>,
    max_retries: usize,
    heartbeat_interval: Duration,
}

impl TaskExecutor {
    pub fn new(
        capacity: Arc<CapacityRegistry>,
        breaker: Arc<BreakerRegistry>,
        limiter: Arc<LimiterRegistry>,
        llm: Arc<dyn LlmCall>,
        max_retries: usize,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            capacity,
            breaker,
            limiter,
            llm,
            adaptive: None,
            telemetry: Arc::new(NoopTelemetry),
            max_retries,
            heartbeat_interval: lease_ttl / 3,
        }
    }

    /// Attaches the C7 adaptive controller that `model`-keyed outcomes are
    /// reported to after each attempt (§4.9 step 4, §2's telemetry-to-C7 flow).
    pub fn with_adaptive_controller(mut self, adaptive: Arc<AdaptiveController>) -> Self {
        self.adaptive = Some(adaptive);
        self
    }

    /// Attaches the structured-logger collaborator (§6) that `run_task` reports
    /// `startOperation`/`endOperation` to. Defaults to [`NoopTelemetry`].
    pub fn with_telemetry(mut self, telemetry: Arc<dyn CrateTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> &Arc<CapacityRegistry> {
        &self.capacity
    }

    /// Runs a single task to completion, following §4.9's six-step algorithm.
    /// The lease acquired in step 1 is released on every exit path, including
    /// cancellation and a panicking LLM callable (the attempt itself runs in
    /// its own task so a panic there can't skip the release below).
    pub async fn run_task(
        &self,
        req: TaskRequest,
        cancel: CancellationToken,
    ) -> Result<TaskOutcome, RuntimeError> {
        let started_at = Instant::now();
        let operation_id = self.telemetry.start_operation("task");

        let reservation = ReservationRequest::new(req.requests_needed, req.llm_needed, req.owner_pid)
            .model(req.model.clone());
        let lease = match self.capacity.reserve(reservation, cancel.cancelled()).await {
            Ok(lease) => lease,
            Err(err) => {
                self.telemetry.end_operation(operation_id, OperationResult::Failure);
                return Err(err);
            }
        };

        let attempt = tokio::spawn(execute_attempt(
            Arc::clone(&self.capacity),
            Arc::clone(&self.breaker),
            Arc::clone(&self.limiter),
            Arc::clone(&self.llm),
            self.adaptive.clone(),
            self.max_retries,
            self.heartbeat_interval,
            req,
            cancel,
            lease,
        ));

        let result = match attempt.await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::llm_error("task execution panicked", None)),
        };

        let _ = self.capacity.release(lease);

        self.telemetry.end_operation(
            operation_id,
            if result.is_ok() {
                OperationResult::Success
            } else {
                OperationResult::Failure
            },
        );

        result.map(|output| TaskOutcome {
            output,
            latency: started_at.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pi_runtime_breaker::BreakerConfig;
    use pi_runtime_capacity::CapacityConfig;
    use pi_runtime_limiter::LimiterConfig;

    fn executor(llm: Arc<dyn LlmCall>) -> TaskExecutor {
        TaskExecutor::new(
            Arc::new(CapacityRegistry::new(CapacityConfig::builder().build())),
            Arc::new(BreakerRegistry::new(BreakerConfig::builder().build())),
            Arc::new(LimiterRegistry::new(LimiterConfig::builder().build())),
            llm,
            1,
            Duration::from_secs(90),
        )
    }

    #[tokio::test]
    async fn well_formed_output_succeeds() {
        let executor = executor(Arc::new(|_: String| async {
            Ok("SUMMARY: did it\nRESULT: ok".to_string())
        }));

        let outcome = executor
            .run_task(TaskRequest::new("do it", "gpt", 1), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.output.result.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn malformed_output_retries_once_with_format_reminder() {
        let attempt = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let attempt_clone = Arc::clone(&attempt);
        let llm: Arc<dyn LlmCall> = Arc::new(move |prompt: String| {
            let attempt = Arc::clone(&attempt_clone);
            async move {
                let n = attempt.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n == 0 {
                    Ok("no labelled fields here".to_string())
                } else {
                    assert!(prompt.contains("SUMMARY"));
                    Ok("SUMMARY: fixed\nRESULT: ok".to_string())
                }
            }
        });

        let executor = executor(llm);
        let outcome = executor
            .run_task(TaskRequest::new("do it", "gpt", 1), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.output.summary.as_deref(), Some("fixed"));
    }

    #[tokio::test]
    async fn lease_is_released_on_llm_error() {
        let llm: Arc<dyn LlmCall> =
            Arc::new(|_: String| async { Err(RuntimeError::llm_error("upstream failed", Some(500))) });
        let executor = executor(llm);
        let capacity = Arc::clone(executor.capacity());

        let result = executor
            .run_task(TaskRequest::new("do it", "gpt", 1), CancellationToken::new())
            .await;
        assert!(result.is_err());
        assert_eq!(capacity.snapshot().active_llm, 0);
    }

    #[tokio::test]
    async fn lease_is_released_when_llm_call_panics() {
        let llm: Arc<dyn LlmCall> = Arc::new(|_: String| async { panic!("boom") });
        let executor = executor(llm);
        let capacity = Arc::clone(executor.capacity());

        let result = executor
            .run_task(TaskRequest::new("do it", "gpt", 1), CancellationToken::new())
            .await;
        assert!(result.is_err());
        assert_eq!(capacity.snapshot().active_llm, 0);
    }

    #[tokio::test]
    async fn successful_call_records_success_with_adaptive_controller() {
        let llm: Arc<dyn LlmCall> = Arc::new(|_: String| async {
            Ok("SUMMARY: ok\nRESULT: done".to_string())
        });
        let adaptive = Arc::new(pi_runtime_capacity::AdaptiveController::new(10, 3));
        let executor = executor(llm).with_adaptive_controller(Arc::clone(&adaptive));

        executor
            .run_task(TaskRequest::new("do it", "gpt-4", 1), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(adaptive.penalty("gpt-4"), 1.0);
    }

    #[tokio::test]
    async fn telemetry_sees_one_start_and_matching_end_per_task() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Mutex;

        struct RecordingTelemetry {
            started: AtomicUsize,
            ended: Mutex<Vec<(u64, OperationResult)>>,
        }

        impl CrateTelemetry for RecordingTelemetry {
            fn start_operation(&self, _operation_type: &str) -> u64 {
                self.started.fetch_add(1, Ordering::SeqCst) as u64
            }

            fn end_operation(&self, id: u64, result: OperationResult) {
                self.ended.lock().unwrap().push((id, result));
            }
        }

        let telemetry = Arc::new(RecordingTelemetry {
            started: AtomicUsize::new(0),
            ended: Mutex::new(Vec::new()),
        });

        let llm: Arc<dyn LlmCall> = Arc::new(|_: String| async {
            Ok("SUMMARY: ok\nRESULT: done".to_string())
        });
        let executor = executor(llm).with_telemetry(Arc::clone(&telemetry) as Arc<dyn CrateTelemetry>);

        executor
            .run_task(TaskRequest::new("do it", "gpt", 1), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(telemetry.started.load(Ordering::SeqCst), 1);
        assert_eq!(*telemetry.ended.lock().unwrap(), vec![(0, OperationResult::Success)]);
    }

    #[tokio::test]
    async fn cancellation_releases_the_lease() {
        let cancel = CancellationToken::new();
        let cancel_for_llm = cancel.clone();
        let llm: Arc<dyn LlmCall> = Arc::new(move |_: String| {
            let cancel = cancel_for_llm.clone();
            async move {
                cancel.cancel();
                std::future::pending::<()>().await;
                #[allow(unreachable_code)]
                Ok(String::new())
            }
        });
        let executor = executor(llm);
        let capacity = Arc::clone(executor.capacity());

        let result = executor.run_task(TaskRequest::new("do it", "gpt", 1), cancel).await;
        assert!(result.is_err());
        assert_eq!(capacity.snapshot().active_llm, 0);
    }
}
