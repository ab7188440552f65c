//! Raydium AMM (V4) venue client.
//!
//! Quotes are priced locally against pool reserves fetched from the public
//! Raydium V3 API; swaps are encoded as `SwapBaseIn` instructions against the
//! AMM program.

use async_trait::async_trait;
use chain::BuiltTransaction;
use common::{min_out_floor, OrderJob, QuoteRequest, QuoteResponse};
use reqwest::Client;
use serde::Deserialize;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use solana_sdk::{pubkey, system_instruction};
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use tracing::debug;

use crate::amm::{constant_product_out, price_impact_bps, to_base_units};
use crate::client::DexClient;
use crate::error::DexError;

const RAYDIUM_API: &str = "https://api-v3.raydium.io";
const AMM_PROGRAM: Pubkey = pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
const AMM_AUTHORITY: Pubkey = pubkey!("5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1");

/// Upper bound on pools evaluated per quote.
const MAX_POOL_FANOUT: usize = 3;

/// `SwapBaseIn` tag in the AMM instruction enum.
const SWAP_BASE_IN_TAG: u8 = 9;

#[derive(Debug, Deserialize)]
struct MintPageResponse {
    success: bool,
    data: MintPage,
}

#[derive(Debug, Deserialize)]
struct MintPage {
    #[serde(default)]
    data: Vec<PoolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolInfo {
    id: String,
    mint_a: PoolMint,
    mint_b: PoolMint,
    mint_amount_a: f64,
    mint_amount_b: f64,
    fee_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct PoolMint {
    address: String,
    decimals: u8,
}

struct Oriented {
    reserve_in: u64,
    reserve_out: u64,
    a_to_b: bool,
}

/// Orient pool reserves to the requested trade direction.
fn orient(pool: &PoolInfo, token_in: &str, token_out: &str) -> Option<Oriented> {
    let reserve_a = to_base_units(pool.mint_amount_a, pool.mint_a.decimals);
    let reserve_b = to_base_units(pool.mint_amount_b, pool.mint_b.decimals);
    if pool.mint_a.address == token_in && pool.mint_b.address == token_out {
        Some(Oriented {
            reserve_in: reserve_a,
            reserve_out: reserve_b,
            a_to_b: true,
        })
    } else if pool.mint_b.address == token_in && pool.mint_a.address == token_out {
        Some(Oriented {
            reserve_in: reserve_b,
            reserve_out: reserve_a,
            a_to_b: false,
        })
    } else {
        None
    }
}

fn swap_base_in_data(amount_in: u64, min_out: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(17);
    data.push(SWAP_BASE_IN_TAG);
    data.extend_from_slice(&amount_in.to_le_bytes());
    data.extend_from_slice(&min_out.to_le_bytes());
    data
}

fn parse_pubkey(value: &str) -> Result<Pubkey, DexError> {
    value
        .parse()
        .map_err(|_| DexError::Transport(format!("invalid address: {value}")))
}

/// Raydium venue client.
pub struct RaydiumClient {
    http: Client,
    base_url: String,
}

impl RaydiumClient {
    pub fn new() -> Self {
        Self::with_base_url(RAYDIUM_API)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn fetch_pair_pools(&self, request: &QuoteRequest) -> Result<Vec<PoolInfo>, DexError> {
        let url = format!(
            "{}/pools/info/mint?mint1={}&mint2={}&poolType=standard&poolSortField=liquidity&sortType=desc&pageSize={}&page=1",
            self.base_url, request.token_in, request.token_out, MAX_POOL_FANOUT
        );
        let body: MintPageResponse = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !body.success {
            return Err(DexError::StaleData);
        }
        Ok(body.data.data)
    }

    /// The ids endpoint returns an array that may contain nulls for
    /// unknown pools.
    async fn fetch_pool(&self, pool_id: &str) -> Result<Option<PoolInfo>, DexError> {
        let url = format!("{}/pools/info/ids?ids={}", self.base_url, pool_id);
        let body: serde_json::Value = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let Some(raw) = body
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|pools| pools.iter().find(|p| !p.is_null()))
        else {
            return Ok(None);
        };
        serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|e| DexError::Transport(format!("bad pool payload: {e}")))
    }
}

impl Default for RaydiumClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DexClient for RaydiumClient {
    fn venue(&self) -> &'static str {
        "raydium"
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, DexError> {
        let pools = self.fetch_pair_pools(request).await?;

        let mut best: Option<(u64, u32, Oriented, PoolInfo)> = None;
        for pool in pools.into_iter().take(MAX_POOL_FANOUT) {
            let Some(oriented) = orient(&pool, &request.token_in, &request.token_out) else {
                continue;
            };
            let fee_bps = (pool.fee_rate * 10_000.0).round() as u32;
            let Some(out) = constant_product_out(
                request.amount,
                oriented.reserve_in,
                oriented.reserve_out,
                fee_bps,
            ) else {
                continue;
            };
            if out == 0 {
                continue;
            }
            if best.as_ref().map_or(true, |(b, ..)| out > *b) {
                best = Some((out, fee_bps, oriented, pool));
            }
        }

        let (estimated_out, fee_bps, oriented, pool) = best.ok_or(DexError::NoPool)?;
        debug!(pool = %pool.id, estimated_out, "raydium quote");
        Ok(QuoteResponse {
            venue: self.venue().to_string(),
            estimated_out,
            min_out: min_out_floor(estimated_out, request.slippage_bps),
            price_impact_bps: price_impact_bps(
                request.amount,
                oriented.reserve_in,
                oriented.reserve_out,
                estimated_out,
            ),
            fee_bps,
            pool_id: pool.id,
            route_meta: Some(serde_json::json!({
                "program": AMM_PROGRAM.to_string(),
                "poolType": "standard",
            })),
            request: request.clone(),
        })
    }

    async fn build_swap(
        &self,
        order: &OrderJob,
        quote: &QuoteResponse,
        signer: &Pubkey,
    ) -> Result<BuiltTransaction, DexError> {
        let pool = self
            .fetch_pool(&quote.pool_id)
            .await?
            .ok_or(DexError::PoolChanged)?;
        let oriented = orient(&pool, &order.request.token_in, &order.request.token_out)
            .ok_or(DexError::InvalidDirection)?;
        if order.request.amount >= oriented.reserve_in {
            return Err(DexError::InsufficientBalance);
        }

        let in_mint = parse_pubkey(&order.request.token_in)?;
        let out_mint = parse_pubkey(&order.request.token_out)?;
        let pool_key = parse_pubkey(&pool.id)?;
        let source = get_associated_token_address(signer, &in_mint);
        let destination = get_associated_token_address(signer, &out_mint);

        let mut instructions = vec![create_associated_token_account_idempotent(
            signer,
            signer,
            &out_mint,
            &spl_token::id(),
        )];
        if in_mint == spl_token::native_mint::id() {
            // Fund and sync a wrapped-SOL account; idempotent when it exists.
            instructions.push(create_associated_token_account_idempotent(
                signer,
                signer,
                &in_mint,
                &spl_token::id(),
            ));
            instructions.push(system_instruction::transfer(
                signer,
                &source,
                order.request.amount,
            ));
            instructions.push(
                spl_token::instruction::sync_native(&spl_token::id(), &source)
                    .map_err(|e| DexError::Transport(e.to_string()))?,
            );
        }

        instructions.push(Instruction {
            program_id: AMM_PROGRAM,
            accounts: vec![
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new(pool_key, false),
                AccountMeta::new_readonly(AMM_AUTHORITY, false),
                AccountMeta::new(source, false),
                AccountMeta::new(destination, false),
                AccountMeta::new_readonly(*signer, true),
            ],
            data: swap_base_in_data(order.request.amount, quote.min_out),
        });

        let message = Message::new(&instructions, Some(signer));
        Ok(BuiltTransaction::new(Transaction::new_unsigned(message)))
    }
}
