//! Chain-side collaborators: signer key loading, transaction submission,
//! confirmation polling, and explorer link formatting.
//!
//! The rest of the pipeline treats a built transaction as opaque; everything
//! Solana-specific funnels through this crate and the venue clients.

pub mod error;
pub mod submitter;
pub mod wallet;

pub use error::{ChainError, Result};
pub use submitter::{ChainSubmitter, RpcSubmitter};
pub use wallet::load_keypair;

use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::transaction::Transaction;

pub use solana_sdk::signature::Keypair;

/// A transaction prepared by a venue client, ready to sign and submit.
///
/// `extra_signers` holds ephemeral keypairs the venue requires beyond the
/// service wallet (for example a throwaway wrapped-SOL account).
pub struct BuiltTransaction {
    pub transaction: Transaction,
    pub extra_signers: Vec<Keypair>,
}

impl BuiltTransaction {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            extra_signers: Vec::new(),
        }
    }
}

/// Parse a `SOLANA_COMMITMENT` value; unknown values fall back to `confirmed`.
pub fn parse_commitment(value: &str) -> CommitmentConfig {
    match value.to_ascii_lowercase().as_str() {
        "processed" => CommitmentConfig::processed(),
        "finalized" => CommitmentConfig::finalized(),
        _ => CommitmentConfig::confirmed(),
    }
}

/// Builds explorer URLs for submitted transactions.
#[derive(Debug, Clone)]
pub struct ExplorerLinks {
    base: String,
    cluster: String,
}

impl ExplorerLinks {
    pub fn new(base: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            cluster: cluster.into(),
        }
    }

    pub fn tx(&self, signature: &str) -> String {
        format!("{}/tx/{}?cluster={}", self.base, signature, self.cluster)
    }
}

impl Default for ExplorerLinks {
    fn default() -> Self {
        Self::new("https://explorer.solana.com", "devnet")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explorer_link_format() {
        let links = ExplorerLinks::default();
        assert_eq!(
            links.tx("SIG-1"),
            "https://explorer.solana.com/tx/SIG-1?cluster=devnet"
        );
    }

    #[test]
    fn commitment_parsing_defaults_to_confirmed() {
        assert_eq!(parse_commitment("processed"), CommitmentConfig::processed());
        assert_eq!(parse_commitment("FINALIZED"), CommitmentConfig::finalized());
        assert_eq!(parse_commitment("bogus"), CommitmentConfig::confirmed());
    }
}
