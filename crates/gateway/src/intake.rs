//! Order intake: validation, ID assignment, initial history row, enqueue.

use std::sync::Arc;

use common::{order_id, OrderJob, OrderRequest, OrderStatus, OrderType};
use history::HistoryStore;
use hub::StatusHub;
use metrics::counter;
use queue::OrderQueue;
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;

/// Detail carried by the initial `pending` entry.
pub const ACCEPT_DETAIL: &str = "Order accepted";

/// Loosely-typed intake payload. Every field is optional so validation can
/// report all issues instead of failing on the first deserialization error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawOrderRequest {
    pub token_in: Option<String>,
    pub token_out: Option<String>,
    pub amount: Option<f64>,
    pub order_type: Option<String>,
}

/// Check a raw payload against the market-order schema.
pub fn validate(raw: &RawOrderRequest) -> Result<OrderRequest, Vec<String>> {
    let mut issues = Vec::new();

    let token_in = raw.token_in.as_deref().map(str::trim).unwrap_or_default();
    if token_in.is_empty() {
        issues.push("tokenIn must be a non-empty string".to_string());
    }
    let token_out = raw.token_out.as_deref().map(str::trim).unwrap_or_default();
    if token_out.is_empty() {
        issues.push("tokenOut must be a non-empty string".to_string());
    }
    if !token_in.is_empty() && token_in == token_out {
        issues.push("tokenIn and tokenOut must differ".to_string());
    }

    let amount = match raw.amount {
        Some(amount) if amount > 0.0 => amount as u64,
        _ => {
            issues.push("amount must be a positive number".to_string());
            0
        }
    };

    if raw.order_type.as_deref() != Some("market") {
        issues.push("orderType must be \"market\"".to_string());
    }

    if !issues.is_empty() {
        return Err(issues);
    }
    Ok(OrderRequest {
        token_in: token_in.to_string(),
        token_out: token_out.to_string(),
        amount,
        order_type: OrderType::Market,
    })
}

/// Accepts validated orders into the pipeline.
pub struct Intake {
    history: Arc<dyn HistoryStore>,
    queue: Arc<dyn OrderQueue>,
    hub: Arc<StatusHub>,
}

impl Intake {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        queue: Arc<dyn OrderQueue>,
        hub: Arc<StatusHub>,
    ) -> Self {
        Self {
            history,
            queue,
            hub,
        }
    }

    /// Validate, assign an ID, record the `pending` row, broadcast `pending`,
    /// and enqueue. The pending message reaches any attached subscriber
    /// before the HTTP response is produced.
    pub async fn submit(&self, raw: RawOrderRequest) -> Result<OrderJob, ApiError> {
        let request = validate(&raw).map_err(ApiError::Validation)?;
        let job = OrderJob::new(order_id(), request);

        self.history
            .insert(&job, ACCEPT_DETAIL)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to record order: {e}")))?;
        self.hub.send_status(
            &job.order_id,
            OrderStatus::Pending,
            Some(ACCEPT_DETAIL.to_string()),
            None,
        );
        self.queue
            .enqueue(&job)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to enqueue order: {e}")))?;

        counter!("orders_accepted_total").increment(1);
        info!(
            order_id = %job.order_id,
            token_in = %job.request.token_in,
            token_out = %job.request.token_out,
            amount = job.request.amount,
            "order accepted"
        );
        Ok(job)
    }
}
