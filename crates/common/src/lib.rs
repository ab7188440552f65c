//! Common types and utilities for the swap execution service.

pub mod id;
pub mod types;

pub use id::order_id;
pub use types::{
    min_out_floor, OrderJob, OrderRequest, OrderStatus, OrderType, QuoteRequest, QuoteResponse,
    StatusMessage,
};
