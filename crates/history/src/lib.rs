//! Durable order history: one row per order, carrying the latest status, the
//! full status trail, and the routing decision.
//!
//! Two implementations share the [`HistoryStore`] trait: Postgres for
//! deployments and an in-memory map used in tests and when no `POSTGRES_URL`
//! is configured.
//!
//! `append_status` doubles as the pipeline's idempotence gate: it refuses to
//! record a non-`failed` status twice for the same order and reports whether
//! the entry landed, so callers broadcast a status only when history accepted
//! it. Queue redeliveries therefore cannot duplicate lifecycle entries.

pub mod error;
pub mod memory;
pub mod pg;

pub use error::{HistoryError, Result};
pub use memory::MemoryHistoryStore;
pub use pg::PgHistoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderJob, OrderStatus, OrderType, QuoteResponse};
use serde::{Deserialize, Serialize};

/// One entry in an order's status trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// A lifecycle transition plus the side fields it refines.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub order_id: String,
    pub status: OrderStatus,
    pub detail: Option<String>,
    pub link: Option<String>,
    pub venue: Option<String>,
    pub tx_hash: Option<String>,
    pub executed_amount: Option<String>,
    pub last_error: Option<String>,
}

impl StatusUpdate {
    pub fn new(order_id: impl Into<String>, status: OrderStatus) -> Self {
        Self {
            order_id: order_id.into(),
            status,
            detail: None,
            link: None,
            venue: None,
            tx_hash: None,
            executed_amount: None,
            last_error: None,
        }
    }
}

/// The stored shape of one order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub order_id: String,
    pub order_type: OrderType,
    pub token_in: String,
    pub token_out: String,
    pub amount: u64,
    pub status: OrderStatus,
    pub status_history: Vec<StatusEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_link: Option<String>,
    pub received_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One page of history rows, newest first.
#[derive(Debug)]
pub struct HistoryPage {
    pub rows: Vec<OrderRecord>,
    /// `updated_at` of the last row when a full page was returned.
    pub next_cursor: Option<DateTime<Utc>>,
}

/// Page size bounds for [`HistoryStore::list`].
pub fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, 200)
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Create the order row with an initial `pending` trail entry.
    /// Idempotent on `order_id`.
    async fn insert(&self, job: &OrderJob, detail: &str) -> Result<()>;

    /// Record a lifecycle transition.
    ///
    /// Returns `true` when the entry was appended; `false` when the status
    /// was already present (non-`failed` statuses record at most once) or
    /// the order row is missing. A missing row logs a warning and succeeds.
    async fn append_status(&self, update: StatusUpdate) -> Result<bool>;

    /// Store the winning quote on the order row without touching the trail.
    async fn record_routing_decision(&self, order_id: &str, quote: &QuoteResponse) -> Result<()>;

    /// Rows ordered by `updated_at` descending; `cursor` excludes rows at or
    /// after it. `limit` is clamped to `[1, 200]`.
    async fn list(&self, limit: u32, cursor: Option<DateTime<Utc>>) -> Result<HistoryPage>;

    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>>;
}
