//! Venue and router error types.

use thiserror::Error;

/// Errors a venue client can produce while quoting or building a swap.
#[derive(Debug, Error)]
pub enum DexError {
    /// No pool exists for the requested pair (or reserves are empty).
    #[error("no pool available for pair")]
    NoPool,

    /// The venue's pool data is too old to price against.
    #[error("stale pool data")]
    StaleData,

    /// The pool backing an accepted quote no longer matches it.
    #[error("pool changed since quote")]
    PoolChanged,

    /// The requested token pair does not match the winning pool.
    #[error("token pair does not match pool")]
    InvalidDirection,

    /// The pool cannot absorb the requested input amount.
    #[error("insufficient pool balance for amount")]
    InsufficientBalance,

    /// Transport-level failure talking to the venue.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for DexError {
    fn from(err: reqwest::Error) -> Self {
        DexError::Transport(err.to_string())
    }
}

/// Routing failures. Quote retries are the queue's job, not the router's,
/// so the only error is the terminal "nobody quoted".
#[derive(Debug, Error)]
pub enum RouterError {
    /// Every registered venue failed or timed out; carries per-venue reasons.
    #[error("Unable to fetch quotes from any venue: {}", reasons.join("; "))]
    NoQuotes { reasons: Vec<String> },
}
