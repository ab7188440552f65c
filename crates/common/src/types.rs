//! Core order, lifecycle, and quote types shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order type. Only immediate-execution market orders are supported; the
/// enum leaves room for future conditional types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "market"),
        }
    }
}

/// A validated client swap intent.
///
/// `amount` is in the smallest on-chain unit of `token_in`. Invariants
/// (tokens non-empty and distinct, amount > 0) are enforced by intake
/// validation before this type is constructed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Mint address of the token being sold.
    pub token_in: String,
    /// Mint address of the token being bought.
    pub token_out: String,
    /// Input amount in base units of `token_in`.
    pub amount: u64,
    pub order_type: OrderType,
}

/// The unit of work that flows through the queue and the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderJob {
    pub order_id: String,
    #[serde(flatten)]
    pub request: OrderRequest,
    pub received_at: DateTime<Utc>,
    /// Delivery attempt, stamped by the queue consumer (1-based).
    #[serde(default)]
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tx_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl OrderJob {
    pub fn new(order_id: String, request: OrderRequest) -> Self {
        Self {
            order_id,
            request,
            received_at: Utc::now(),
            attempt: 0,
            last_tx_signature: None,
            last_error: None,
        }
    }
}

/// Lifecycle status of an order.
///
/// First occurrences follow the total order
/// `pending → queued → routing → building → submitted → confirmed`;
/// `failed` is terminal and reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Queued,
    Routing,
    Building,
    Submitted,
    Confirmed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Queued => "queued",
            OrderStatus::Routing => "routing",
            OrderStatus::Building => "building",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Failed)
    }

    /// Position in the happy-path sequence, used by tests to assert ordering.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Queued => 1,
            OrderStatus::Routing => 2,
            OrderStatus::Building => 3,
            OrderStatus::Submitted => 4,
            OrderStatus::Confirmed => 5,
            OrderStatus::Failed => 6,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "queued" => Ok(OrderStatus::Queued),
            "routing" => Ok(OrderStatus::Routing),
            "building" => Ok(OrderStatus::Building),
            "submitted" => Ok(OrderStatus::Submitted),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// One lifecycle update, delivered to subscribers as a single JSON frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl StatusMessage {
    pub fn new(
        order_id: impl Into<String>,
        status: OrderStatus,
        detail: Option<String>,
        link: Option<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            status,
            detail,
            link,
        }
    }
}

/// Request sent to every venue when routing an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub token_in: String,
    pub token_out: String,
    pub amount: u64,
    /// Slippage tolerance in basis points, within `[1, 10000]`.
    pub slippage_bps: u32,
}

/// A venue's priced offer for a [`QuoteRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub venue: String,
    /// Expected output in base units of `token_out`.
    pub estimated_out: u64,
    /// Post-slippage floor embedded in the on-chain transaction.
    pub min_out: u64,
    pub price_impact_bps: u32,
    pub fee_bps: u32,
    pub pool_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_meta: Option<serde_json::Value>,
    pub request: QuoteRequest,
}

/// `floor(estimated_out * (10000 - slippage_bps) / 10000)`.
pub fn min_out_floor(estimated_out: u64, slippage_bps: u32) -> u64 {
    let slippage_bps = slippage_bps.min(10_000) as u128;
    ((estimated_out as u128 * (10_000 - slippage_bps)) / 10_000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(OrderStatus::Confirmed.to_string(), "confirmed");
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Confirmed.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
    }

    #[test]
    fn min_out_floor_matches_formula() {
        // floor(2_000_000 * 9950 / 10000) = 1_990_000
        assert_eq!(min_out_floor(2_000_000, 50), 1_990_000);
        // 1 bps of 3 floors to 2
        assert_eq!(min_out_floor(3, 10_000), 0);
        assert_eq!(min_out_floor(1_000, 1), 999);
        assert!(min_out_floor(u64::MAX, 1) <= u64::MAX);
    }

    #[test]
    fn status_message_omits_empty_fields() {
        let msg = StatusMessage::new("ORD1", OrderStatus::Queued, None, None);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"orderId": "ORD1", "status": "queued"})
        );
    }

    #[test]
    fn order_job_round_trips_with_camel_case_wire_names() {
        let job = OrderJob::new(
            "ORD1".into(),
            OrderRequest {
                token_in: "So1111".into(),
                token_out: "USDC11".into(),
                amount: 42,
                order_type: OrderType::Market,
            },
        );
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["tokenIn"], "So1111");
        assert_eq!(json["orderType"], "market");
        let back: OrderJob = serde_json::from_value(json).unwrap();
        assert_eq!(back.request, job.request);
    }
}
