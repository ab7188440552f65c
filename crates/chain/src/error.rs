//! Chain-layer error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChainError>;

#[derive(Debug, Error)]
pub enum ChainError {
    /// The wallet secret could not be decoded in any supported encoding.
    #[error("invalid wallet key: {0}")]
    InvalidKey(String),

    /// RPC transport or submission failure.
    #[error("chain rpc error: {0}")]
    Rpc(String),

    /// The transaction was submitted but failed on chain.
    #[error("transaction failed on chain: {0}")]
    Execution(String),

    /// Confirmation did not reach the requested commitment in time.
    #[error("confirmation timed out for {0}")]
    ConfirmationTimeout(String),
}

impl From<solana_client::client_error::ClientError> for ChainError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        ChainError::Rpc(err.to_string())
    }
}
