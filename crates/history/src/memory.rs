//! In-memory history store.
//!
//! Backs local development without Postgres and doubles as the test double
//! for the worker and gateway suites. Semantics mirror the Postgres
//! implementation exactly, including the append-once idempotence gate.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderJob, OrderStatus, QuoteResponse};
use tracing::warn;

use crate::error::Result;
use crate::{clamp_limit, HistoryPage, HistoryStore, OrderRecord, StatusEntry, StatusUpdate};

#[derive(Default)]
pub struct MemoryHistoryStore {
    records: Mutex<HashMap<String, OrderRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn insert(&self, job: &OrderJob, detail: &str) -> Result<()> {
        let mut records = self.records.lock().expect("history lock poisoned");
        if records.contains_key(&job.order_id) {
            return Ok(());
        }
        records.insert(
            job.order_id.clone(),
            OrderRecord {
                order_id: job.order_id.clone(),
                order_type: job.request.order_type,
                token_in: job.request.token_in.clone(),
                token_out: job.request.token_out.clone(),
                amount: job.request.amount,
                status: OrderStatus::Pending,
                status_history: vec![StatusEntry {
                    status: OrderStatus::Pending,
                    detail: Some(detail.to_string()),
                    link: None,
                    recorded_at: job.received_at,
                }],
                venue: None,
                tx_hash: None,
                executed_amount: None,
                quote_response: None,
                last_error: None,
                explorer_link: None,
                received_at: job.received_at,
                updated_at: job.received_at,
            },
        );
        Ok(())
    }

    async fn append_status(&self, update: StatusUpdate) -> Result<bool> {
        let mut records = self.records.lock().expect("history lock poisoned");
        let Some(record) = records.get_mut(&update.order_id) else {
            warn!(order_id = %update.order_id, "status update for unknown order");
            return Ok(false);
        };

        let duplicate = update.status != OrderStatus::Failed
            && record
                .status_history
                .iter()
                .any(|entry| entry.status == update.status);
        if duplicate {
            return Ok(false);
        }

        let now = Utc::now();
        record.status = update.status;
        record.status_history.push(StatusEntry {
            status: update.status,
            detail: update.detail,
            link: update.link.clone(),
            recorded_at: now,
        });
        if update.venue.is_some() {
            record.venue = update.venue;
        }
        if update.tx_hash.is_some() {
            record.tx_hash = update.tx_hash;
        }
        if update.executed_amount.is_some() {
            record.executed_amount = update.executed_amount;
        }
        if update.last_error.is_some() {
            record.last_error = update.last_error;
        }
        if update.link.is_some() {
            record.explorer_link = update.link;
        }
        record.updated_at = now;
        Ok(true)
    }

    async fn record_routing_decision(&self, order_id: &str, quote: &QuoteResponse) -> Result<()> {
        let mut records = self.records.lock().expect("history lock poisoned");
        let Some(record) = records.get_mut(order_id) else {
            warn!(order_id, "routing decision for unknown order");
            return Ok(());
        };
        record.venue = Some(quote.venue.clone());
        record.quote_response = Some(serde_json::to_value(quote)?);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn list(&self, limit: u32, cursor: Option<DateTime<Utc>>) -> Result<HistoryPage> {
        let limit = clamp_limit(limit) as usize;
        let records = self.records.lock().expect("history lock poisoned");
        let mut rows: Vec<OrderRecord> = records
            .values()
            .filter(|r| cursor.map_or(true, |c| r.updated_at < c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        rows.truncate(limit);
        let next_cursor = (rows.len() == limit)
            .then(|| rows.last().map(|r| r.updated_at))
            .flatten();
        Ok(HistoryPage { rows, next_cursor })
    }

    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>> {
        let records = self.records.lock().expect("history lock poisoned");
        Ok(records.get(order_id).cloned())
    }
}
