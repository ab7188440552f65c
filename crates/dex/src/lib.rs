//! DEX venue clients and the quote router.
//!
//! This crate provides:
//! - `DexClient` trait for venue-specific quoting and swap building
//! - `RaydiumClient` and `OrcaClient` venue implementations
//! - `DexRouter` for fanning out quotes and picking the best venue
//!
//! # Architecture
//!
//! ```text
//!                      ORDER
//!                        │
//!                        ▼
//!                    DexRouter
//!                        │ concurrent quotes, per-venue deadline
//!               ┌────────┴────────┐
//!               ▼                 ▼
//!         RaydiumClient      OrcaClient
//!               │                 │
//!               └────────┬────────┘
//!                        ▼
//!                    RoutePlan ──▶ build_transaction()
//! ```
//!
//! New venue = new `DexClient` impl + `register`; the router never branches
//! on a concrete venue.

pub mod amm;
pub mod client;
pub mod error;
pub mod orca;
pub mod raydium;
pub mod router;

pub use client::DexClient;
pub use error::{DexError, RouterError};
pub use orca::OrcaClient;
pub use raydium::RaydiumClient;
pub use router::{build_transaction, slippage_to_bps, DexRouter, RoutePlan, RouterConfig};
