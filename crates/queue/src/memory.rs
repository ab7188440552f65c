//! In-process queue adapter.
//!
//! Backs local development without Redis and the worker test suite. Delivery,
//! retry, and retention semantics match the Redis adapter; durability across
//! process restarts is the only difference.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::OrderJob;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::debug;

use crate::error::{QueueError, Result};
use crate::{process_with_retries, JobHandler, OrderQueue, RetryPolicy};

pub struct MemoryQueue {
    tx: mpsc::UnboundedSender<OrderJob>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<OrderJob>>>,
    policy: RetryPolicy,
    completed: Mutex<Vec<OrderJob>>,
    dead: Mutex<Vec<OrderJob>>,
}

impl MemoryQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            policy,
            completed: Mutex::new(Vec::new()),
            dead: Mutex::new(Vec::new()),
        }
    }

    /// Jobs that ran to completion, kept for inspection.
    pub fn completed(&self) -> Vec<OrderJob> {
        self.completed.lock().expect("queue lock poisoned").clone()
    }

    /// Jobs that exhausted their attempts.
    pub fn dead_letters(&self) -> Vec<OrderJob> {
        self.dead.lock().expect("queue lock poisoned").clone()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl OrderQueue for MemoryQueue {
    async fn enqueue(&self, job: &OrderJob) -> Result<()> {
        self.tx
            .send(job.clone())
            .map_err(|_| QueueError::Closed("queue consumer dropped".into()))
    }

    async fn run(
        self: Arc<Self>,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut rx = self
            .rx
            .lock()
            .expect("queue lock poisoned")
            .take()
            .ok_or_else(|| QueueError::Closed("consumer already running".into()))?;

        let concurrency = concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                received = rx.recv() => {
                    let Some(job) = received else { break };
                    let permit = semaphore
                        .clone()
                        .acquire_owned()
                        .await
                        .map_err(|_| QueueError::Closed("semaphore closed".into()))?;
                    let handler = handler.clone();
                    let queue = self.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        debug!(order_id = %job.order_id, "dequeued job");
                        let (job, ok) = process_with_retries(&handler, job, &queue.policy).await;
                        let bucket = if ok { &queue.completed } else { &queue.dead };
                        bucket.lock().expect("queue lock poisoned").push(job);
                    });
                }
            }
        }

        // Wait for in-flight jobs to finish.
        let _ = semaphore.acquire_many(concurrency as u32).await;
        Ok(())
    }
}
