//! Transaction submission and confirmation against a Solana RPC node.

use std::time::Duration;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use tracing::debug;

use crate::error::{ChainError, Result};
use crate::BuiltTransaction;

/// Submits built transactions to the chain and awaits confirmation.
///
/// `submit` returns as soon as the RPC node accepts the transaction so the
/// caller can surface the signature before confirmation completes.
#[async_trait]
pub trait ChainSubmitter: Send + Sync {
    async fn submit(&self, built: BuiltTransaction) -> Result<String>;

    /// Await the signature reaching the configured commitment level.
    async fn confirm(&self, signature: &str) -> Result<()>;
}

/// [`ChainSubmitter`] backed by a Solana JSON-RPC endpoint.
pub struct RpcSubmitter {
    rpc: RpcClient,
    wallet: Keypair,
    commitment: CommitmentConfig,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl RpcSubmitter {
    pub fn new(rpc_url: &str, wallet: Keypair, commitment: CommitmentConfig) -> Self {
        Self {
            rpc: RpcClient::new_with_commitment(rpc_url.to_string(), commitment),
            wallet,
            commitment,
            confirm_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn signer_pubkey(&self) -> Pubkey {
        self.wallet.pubkey()
    }
}

#[async_trait]
impl ChainSubmitter for RpcSubmitter {
    async fn submit(&self, built: BuiltTransaction) -> Result<String> {
        let BuiltTransaction {
            mut transaction,
            extra_signers,
        } = built;

        let blockhash = self.rpc.get_latest_blockhash().await?;

        {
            let mut signers: Vec<&dyn Signer> = Vec::with_capacity(1 + extra_signers.len());
            signers.push(&self.wallet);
            for keypair in &extra_signers {
                signers.push(keypair);
            }
            transaction
                .try_sign(&signers, blockhash)
                .map_err(|e| ChainError::Rpc(format!("signing failed: {e}")))?;
        }

        let signature = self.rpc.send_transaction(&transaction).await?;
        debug!(%signature, "transaction submitted");
        Ok(signature.to_string())
    }

    async fn confirm(&self, signature: &str) -> Result<()> {
        let signature: Signature = signature
            .parse()
            .map_err(|e| ChainError::Rpc(format!("bad signature: {e}")))?;

        let deadline = tokio::time::Instant::now() + self.confirm_timeout;
        loop {
            let statuses = self.rpc.get_signature_statuses(&[signature]).await?;
            if let Some(Some(status)) = statuses.value.first() {
                if let Some(err) = &status.err {
                    return Err(ChainError::Execution(err.to_string()));
                }
                if status.satisfies_commitment(self.commitment) {
                    debug!(%signature, "transaction confirmed");
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ChainError::ConfirmationTimeout(signature.to_string()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
