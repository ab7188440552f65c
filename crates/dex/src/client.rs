//! Venue client trait.

use async_trait::async_trait;
use chain::BuiltTransaction;
use common::{OrderJob, QuoteRequest, QuoteResponse};
use solana_sdk::pubkey::Pubkey;

use crate::error::DexError;

/// Uniform interface over DEX backends.
///
/// # Contract
///
/// - `quote` must be safe for concurrent calls and price the request against
///   current pool reserves with the venue's fee schedule.
/// - `build_swap` must embed `quote.min_out` as the on-chain minimum-output
///   floor and must not re-apply slippage. Its only permitted side effect is
///   an idempotent preparatory account instruction (associated token account
///   creation, wrapped-SOL funding) baked into the returned transaction.
#[async_trait]
pub trait DexClient: Send + Sync {
    /// Stable venue name, used for registration order and routing decisions.
    fn venue(&self) -> &'static str;

    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, DexError>;

    async fn build_swap(
        &self,
        order: &OrderJob,
        quote: &QuoteResponse,
        signer: &Pubkey,
    ) -> Result<BuiltTransaction, DexError>;
}
