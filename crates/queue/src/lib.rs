//! Reliable order-job queue.
//!
//! The pipeline depends only on the [`OrderQueue`] semantics: at-least-once
//! delivery, bounded parallelism, exponential backoff retries, and retention
//! of completed and dead-lettered jobs. Two adapters provide them: Redis for
//! deployments, an in-process channel for development and tests.

pub mod error;
pub mod memory;
pub mod redis_queue;

pub use error::{QueueError, Result};
pub use memory::MemoryQueue;
pub use redis_queue::{redis_url_from_parts, RedisQueue};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::OrderJob;
use tokio::sync::watch;
use tracing::warn;

/// Failure returned by a job handler.
///
/// `fatal` failures skip the retry policy: retrying them would deterministically
/// repeat (for example a token pair that does not match the winning pool).
#[derive(Debug, Clone)]
pub struct JobError {
    pub message: String,
    pub fatal: bool,
}

impl JobError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for JobError {}

/// Exponential backoff retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub exponent: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2_000),
            exponent: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * self.exponent.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Consumer-side processing hook.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Process one delivery. The job is mutable so the handler's progress
    /// (signature, last error) survives into retries of the same delivery.
    async fn handle(&self, job: &mut OrderJob) -> std::result::Result<(), JobError>;

    /// Called once after the final failed attempt, before dead-lettering.
    async fn on_exhausted(&self, job: &OrderJob, error: &str);
}

/// Queue abstraction the intake service and worker are wired against.
#[async_trait]
pub trait OrderQueue: Send + Sync {
    async fn enqueue(&self, job: &OrderJob) -> Result<()>;

    /// Drain the queue with `concurrency` parallel consumers until `shutdown`
    /// flips to `true`. In-flight jobs finish before `run` returns.
    async fn run(
        self: Arc<Self>,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()>;
}

/// Drive one delivery through the handler with the retry policy applied.
/// Returns the final job state and whether it ultimately succeeded.
pub(crate) async fn process_with_retries(
    handler: &Arc<dyn JobHandler>,
    mut job: OrderJob,
    policy: &RetryPolicy,
) -> (OrderJob, bool) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        job.attempt = attempt;
        match handler.handle(&mut job).await {
            Ok(()) => return (job, true),
            Err(err) => {
                warn!(
                    order_id = %job.order_id,
                    attempt,
                    fatal = err.fatal,
                    error = %err,
                    "job attempt failed"
                );
                job.last_error = Some(err.message.clone());
                if err.fatal || attempt >= policy.max_attempts {
                    handler.on_exhausted(&job, &err.message).await;
                    return (job, false);
                }
                tokio::time::sleep(policy.delay(attempt)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderRequest, OrderType};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn job() -> OrderJob {
        OrderJob::new(
            "ORD1".into(),
            OrderRequest {
                token_in: "TOKA".into(),
                token_out: "TOKB".into(),
                amount: 1,
                order_type: OrderType::Market,
            },
        )
    }

    struct FlakyHandler {
        fail_first: u32,
        fatal: bool,
        attempts: AtomicU32,
        exhausted_with: Mutex<Option<String>>,
    }

    impl FlakyHandler {
        fn new(fail_first: u32, fatal: bool) -> Arc<Self> {
            Arc::new(Self {
                fail_first,
                fatal,
                attempts: AtomicU32::new(0),
                exhausted_with: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl JobHandler for FlakyHandler {
        async fn handle(&self, _job: &mut OrderJob) -> std::result::Result<(), JobError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                if self.fatal {
                    return Err(JobError::fatal("bad direction"));
                }
                return Err(JobError::retryable("transient"));
            }
            Ok(())
        }

        async fn on_exhausted(&self, _job: &OrderJob, error: &str) {
            *self.exhausted_with.lock().unwrap() = Some(error.to_string());
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            exponent: 2,
        }
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay(3), Duration::from_millis(8_000));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let handler = FlakyHandler::new(2, false);
        let dyn_handler: Arc<dyn JobHandler> = handler.clone();
        let (final_job, ok) = process_with_retries(&dyn_handler, job(), &fast_policy()).await;
        assert!(ok);
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(final_job.attempt, 3);
        assert!(handler.exhausted_with.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let handler = FlakyHandler::new(10, false);
        let dyn_handler: Arc<dyn JobHandler> = handler.clone();
        let (final_job, ok) = process_with_retries(&dyn_handler, job(), &fast_policy()).await;
        assert!(!ok);
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(final_job.last_error.as_deref(), Some("transient"));
        assert_eq!(
            handler.exhausted_with.lock().unwrap().as_deref(),
            Some("transient")
        );
    }

    #[tokio::test]
    async fn fatal_errors_skip_retries() {
        let handler = FlakyHandler::new(10, true);
        let dyn_handler: Arc<dyn JobHandler> = handler.clone();
        let (_, ok) = process_with_retries(&dyn_handler, job(), &fast_policy()).await;
        assert!(!ok);
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 1);
    }
}
