//! HTTP/WebSocket surface and process wiring for the swap execution service.
//!
//! This crate:
//! - Accepts market swap orders over `POST /api/orders/execute`
//! - Upgrades `GET /api/orders/execute?orderId=` to a per-order status stream
//! - Serves paginated order history from the durable store
//! - Wires intake → queue → worker → hub at process start
//!
//! ## Architecture
//!
//! ```text
//! POST /api/orders/execute ──▶ Intake ──▶ history + hub + queue
//!                                               │
//! GET  /api/orders/execute (WS) ◀── StatusHub ◀─┤
//!                                               ▼
//!                                        ExecutionWorker
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod intake;
pub mod ws;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::ApiError;
pub use intake::{Intake, RawOrderRequest};
