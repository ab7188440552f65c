//! Execution worker: drains the order queue and drives each job through the
//! lifecycle state machine.
//!
//! ```text
//! (enter) → queued → routing → building → submitted → confirmed
//!                                  ↓
//!                               failed  ← (from any non-terminal, on error)
//! ```
//!
//! Every transition is recorded to history first and broadcast to the
//! subscriber hub only when history accepted it, which makes redeliveries of
//! the same job harmless: a status that is already on the trail is neither
//! re-recorded nor re-broadcast. `failed` is the exception — each attempt may
//! record a fresh entry with its own detail.

pub mod rate_limit;

pub use rate_limit::FixedWindowLimiter;

use std::sync::Arc;

use async_trait::async_trait;
use chain::{ChainSubmitter, ExplorerLinks};
use common::{OrderJob, OrderStatus};
use dex::{build_transaction, DexError, DexRouter};
use history::{HistoryStore, StatusUpdate};
use hub::StatusHub;
use metrics::counter;
use queue::{JobError, JobHandler};
use solana_sdk::pubkey::Pubkey;
use tracing::{error, info};

pub struct ExecutionWorker {
    router: Arc<DexRouter>,
    history: Arc<dyn HistoryStore>,
    hub: Arc<StatusHub>,
    submitter: Arc<dyn ChainSubmitter>,
    limiter: FixedWindowLimiter,
    signer: Pubkey,
    explorer: ExplorerLinks,
}

impl ExecutionWorker {
    pub fn new(
        router: Arc<DexRouter>,
        history: Arc<dyn HistoryStore>,
        hub: Arc<StatusHub>,
        submitter: Arc<dyn ChainSubmitter>,
        limiter: FixedWindowLimiter,
        signer: Pubkey,
        explorer: ExplorerLinks,
    ) -> Self {
        Self {
            router,
            history,
            hub,
            submitter,
            limiter,
            signer,
            explorer,
        }
    }

    /// Record a transition and broadcast it iff history accepted the entry.
    async fn record(&self, update: StatusUpdate) -> Result<(), JobError> {
        let order_id = update.order_id.clone();
        let status = update.status;
        let detail = update.detail.clone();
        let link = update.link.clone();
        let appended = self
            .history
            .append_status(update)
            .await
            .map_err(|e| JobError::retryable(format!("history write failed: {e}")))?;
        if appended {
            counter!("order_status_emitted_total", "status" => status.as_str()).increment(1);
            self.hub.send_status(&order_id, status, detail, link);
        }
        Ok(())
    }

    async fn execute(&self, job: &mut OrderJob) -> Result<(), JobError> {
        self.record(StatusUpdate::new(&job.order_id, OrderStatus::Queued))
            .await?;
        self.record(StatusUpdate::new(&job.order_id, OrderStatus::Routing))
            .await?;

        self.limiter.acquire().await;

        let plan = self
            .router
            .find_best_route(job)
            .await
            .map_err(|e| JobError::retryable(e.to_string()))?;
        self.history
            .record_routing_decision(&job.order_id, &plan.quote)
            .await
            .map_err(|e| JobError::retryable(format!("history write failed: {e}")))?;

        self.record(StatusUpdate::new(&job.order_id, OrderStatus::Building))
            .await?;
        let built = build_transaction(&plan, job, &self.signer)
            .await
            .map_err(map_dex_error)?;

        let signature = self
            .submitter
            .submit(built)
            .await
            .map_err(|e| JobError::retryable(e.to_string()))?;
        job.last_tx_signature = Some(signature.clone());

        // Surface the signature immediately; confirmation is awaited after.
        let link = self.explorer.tx(&signature);
        let mut submitted = StatusUpdate::new(&job.order_id, OrderStatus::Submitted);
        submitted.detail = Some(signature.clone());
        submitted.link = Some(link.clone());
        submitted.tx_hash = Some(signature.clone());
        submitted.venue = Some(plan.venue.clone());
        self.record(submitted).await?;

        self.submitter
            .confirm(&signature)
            .await
            .map_err(|e| JobError::retryable(e.to_string()))?;

        let mut confirmed = StatusUpdate::new(&job.order_id, OrderStatus::Confirmed);
        confirmed.detail = Some(signature.clone());
        confirmed.link = Some(link);
        confirmed.tx_hash = Some(signature);
        confirmed.executed_amount = Some(plan.quote.estimated_out.to_string());
        confirmed.venue = Some(plan.venue.clone());
        self.record(confirmed).await?;

        counter!("orders_confirmed_total").increment(1);
        info!(order_id = %job.order_id, venue = %plan.venue, "order confirmed");
        Ok(())
    }
}

fn map_dex_error(err: DexError) -> JobError {
    match err {
        // Retrying the same pair against the same pool would repeat.
        DexError::InvalidDirection => JobError::fatal(err.to_string()),
        other => JobError::retryable(other.to_string()),
    }
}

#[async_trait]
impl JobHandler for ExecutionWorker {
    async fn handle(&self, job: &mut OrderJob) -> Result<(), JobError> {
        match self.execute(job).await {
            Ok(()) => Ok(()),
            Err(err) => {
                job.last_error = Some(err.message.clone());
                error!(
                    order_id = %job.order_id,
                    attempt = job.attempt,
                    error = %err,
                    "order execution failed"
                );
                let mut failed = StatusUpdate::new(&job.order_id, OrderStatus::Failed);
                failed.detail = Some(err.message.clone());
                failed.last_error = Some(err.message.clone());
                if let Err(record_err) = self.record(failed).await {
                    error!(order_id = %job.order_id, error = %record_err, "failed to record failure");
                }
                counter!("orders_failed_total").increment(1);
                Err(err)
            }
        }
    }

    async fn on_exhausted(&self, job: &OrderJob, error: &str) {
        // The queue gave up on this job; pin the terminal failure to the trail.
        let mut failed = StatusUpdate::new(&job.order_id, OrderStatus::Failed);
        failed.detail = Some(error.to_string());
        failed.last_error = Some(error.to_string());
        if let Err(record_err) = self.record(failed).await {
            error!(order_id = %job.order_id, error = %record_err, "failed to record terminal failure");
        }
    }
}
