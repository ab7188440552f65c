//! Postgres-backed history store.
//!
//! Single table `order_history`, keyed by `order_id`, with JSONB columns for
//! the status trail and the routing decision. The duplicate-status gate runs
//! inside the UPDATE itself (a JSONB containment probe), so concurrent
//! callers for the same order cannot double-record a status.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderJob, OrderStatus, QuoteResponse};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use crate::error::{HistoryError, Result};
use crate::{clamp_limit, HistoryPage, HistoryStore, OrderRecord, StatusEntry, StatusUpdate};

const SELECT_COLUMNS: &str = "order_id, order_type, token_in, token_out, amount, status, \
     status_history, venue, tx_hash, executed_amount, quote_response, last_error, \
     explorer_link, received_at, updated_at";

pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    /// Connect and make sure the schema exists.
    pub async fn connect(url: &str, pool_max: u32, idle_timeout_ms: u64) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_max)
            .idle_timeout(Duration::from_millis(idle_timeout_ms))
            .connect(url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        info!("connected to Postgres history store");
        Ok(store)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            create table if not exists order_history (
                order_id        text primary key,
                order_type      text not null,
                token_in        text not null,
                token_out       text not null,
                amount          bigint not null,
                status          text not null,
                venue           text,
                tx_hash         text,
                executed_amount text,
                quote_response  jsonb,
                status_history  jsonb not null default '[]'::jsonb,
                last_error      text,
                explorer_link   text,
                received_at     timestamptz not null,
                updated_at      timestamptz not null
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "create index if not exists order_history_updated_at_idx on order_history (updated_at desc)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("create index if not exists order_history_status_idx on order_history (status)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<OrderRecord> {
        let order_type: String = row.try_get("order_type")?;
        let status: String = row.try_get("status")?;
        let amount: i64 = row.try_get("amount")?;
        let status_history: serde_json::Value = row.try_get("status_history")?;
        let status_history: Vec<StatusEntry> = serde_json::from_value(status_history)?;

        Ok(OrderRecord {
            order_id: row.try_get("order_id")?,
            order_type: serde_json::from_value(serde_json::Value::String(order_type))?,
            token_in: row.try_get("token_in")?,
            token_out: row.try_get("token_out")?,
            amount: amount as u64,
            status: status
                .parse()
                .map_err(HistoryError::Internal)?,
            status_history,
            venue: row.try_get("venue")?,
            tx_hash: row.try_get("tx_hash")?,
            executed_amount: row.try_get("executed_amount")?,
            quote_response: row.try_get("quote_response")?,
            last_error: row.try_get("last_error")?,
            explorer_link: row.try_get("explorer_link")?,
            received_at: row.try_get("received_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn insert(&self, job: &OrderJob, detail: &str) -> Result<()> {
        let amount = i64::try_from(job.request.amount)
            .map_err(|_| HistoryError::Internal("amount exceeds storable range".into()))?;
        let seed = serde_json::to_value(vec![StatusEntry {
            status: OrderStatus::Pending,
            detail: Some(detail.to_string()),
            link: None,
            recorded_at: job.received_at,
        }])?;

        sqlx::query(
            r#"
            insert into order_history (
                order_id, order_type, token_in, token_out, amount,
                status, status_history, received_at, updated_at
            ) values ($1, $2, $3, $4, $5, 'pending', $6, $7, $7)
            on conflict (order_id) do nothing
            "#,
        )
        .bind(&job.order_id)
        .bind(job.request.order_type.to_string())
        .bind(&job.request.token_in)
        .bind(&job.request.token_out)
        .bind(amount)
        .bind(seed)
        .bind(job.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_status(&self, update: StatusUpdate) -> Result<bool> {
        let now = Utc::now();
        let entry = serde_json::to_value(vec![StatusEntry {
            status: update.status,
            detail: update.detail.clone(),
            link: update.link.clone(),
            recorded_at: now,
        }])?;
        let probe = serde_json::json!([{ "status": update.status }]);

        let result = sqlx::query(
            r#"
            update order_history set
                status = $2,
                status_history = status_history || $3::jsonb,
                updated_at = $4,
                venue = coalesce($5, venue),
                tx_hash = coalesce($6, tx_hash),
                executed_amount = coalesce($7, executed_amount),
                last_error = coalesce($8, last_error),
                explorer_link = coalesce($9, explorer_link)
            where order_id = $1
              and ($2 = 'failed' or not status_history @> $10::jsonb)
            "#,
        )
        .bind(&update.order_id)
        .bind(update.status.as_str())
        .bind(entry)
        .bind(now)
        .bind(update.venue.as_deref())
        .bind(update.tx_hash.as_deref())
        .bind(update.executed_amount.as_deref())
        .bind(update.last_error.as_deref())
        .bind(update.link.as_deref())
        .bind(probe)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool =
            sqlx::query_scalar("select exists (select 1 from order_history where order_id = $1)")
                .bind(&update.order_id)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            warn!(order_id = %update.order_id, "status update for unknown order");
        }
        Ok(false)
    }

    async fn record_routing_decision(&self, order_id: &str, quote: &QuoteResponse) -> Result<()> {
        let result = sqlx::query(
            "update order_history set venue = $2, quote_response = $3, updated_at = $4 where order_id = $1",
        )
        .bind(order_id)
        .bind(&quote.venue)
        .bind(serde_json::to_value(quote)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(order_id, "routing decision for unknown order");
        }
        Ok(())
    }

    async fn list(&self, limit: u32, cursor: Option<DateTime<Utc>>) -> Result<HistoryPage> {
        let limit = clamp_limit(limit);
        let query = format!(
            "select {SELECT_COLUMNS} from order_history \
             where ($2::timestamptz is null or updated_at < $2) \
             order by updated_at desc limit $1"
        );
        let rows = sqlx::query(&query)
            .bind(limit as i64)
            .bind(cursor)
            .fetch_all(&self.pool)
            .await?;

        let rows: Vec<OrderRecord> = rows
            .iter()
            .map(Self::row_to_record)
            .collect::<Result<_>>()?;
        let next_cursor = (rows.len() == limit as usize)
            .then(|| rows.last().map(|r| r.updated_at))
            .flatten();
        Ok(HistoryPage { rows, next_cursor })
    }

    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>> {
        let query = format!("select {SELECT_COLUMNS} from order_history where order_id = $1");
        let row = sqlx::query(&query)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_record).transpose()
    }
}
