//! Orca Whirlpool venue client.
//!
//! Pool state comes from the public Orca v2 API. Pricing treats the vault
//! balances as constant-product reserves, which is a close approximation for
//! in-range liquidity and keeps the quote path uniform across venues.

use async_trait::async_trait;
use chain::BuiltTransaction;
use common::{min_out_floor, OrderJob, QuoteRequest, QuoteResponse};
use reqwest::Client;
use serde::Deserialize;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use tracing::debug;

use crate::amm::{constant_product_out, price_impact_bps, to_base_units};
use crate::client::DexClient;
use crate::error::DexError;

const ORCA_API: &str = "https://api.orca.so";
const WHIRLPOOL_PROGRAM: Pubkey = pubkey!("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc");

/// Upper bound on pools evaluated per quote.
const MAX_POOL_FANOUT: usize = 3;

/// Anchor discriminator for the whirlpool `swap` instruction.
const SWAP_DISCRIMINATOR: [u8; 8] = [248, 198, 158, 145, 225, 117, 135, 200];

#[derive(Debug, Deserialize)]
struct PoolsResponse {
    #[serde(default)]
    data: Vec<WhirlpoolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhirlpoolInfo {
    address: String,
    /// Fee rate in hundredths of a basis point (3000 = 0.30%).
    fee_rate: u32,
    token_a: WhirlpoolToken,
    token_b: WhirlpoolToken,
    token_vault_a: String,
    token_vault_b: String,
    token_balance_a: String,
    token_balance_b: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WhirlpoolToken {
    address: String,
    decimals: u8,
}

struct Oriented {
    reserve_in: u64,
    reserve_out: u64,
    a_to_b: bool,
}

fn orient(pool: &WhirlpoolInfo, token_in: &str, token_out: &str) -> Option<Oriented> {
    let balance_a = pool.token_balance_a.parse::<f64>().unwrap_or(0.0);
    let balance_b = pool.token_balance_b.parse::<f64>().unwrap_or(0.0);
    let reserve_a = to_base_units(balance_a, pool.token_a.decimals);
    let reserve_b = to_base_units(balance_b, pool.token_b.decimals);
    if pool.token_a.address == token_in && pool.token_b.address == token_out {
        Some(Oriented {
            reserve_in: reserve_a,
            reserve_out: reserve_b,
            a_to_b: true,
        })
    } else if pool.token_b.address == token_in && pool.token_a.address == token_out {
        Some(Oriented {
            reserve_in: reserve_b,
            reserve_out: reserve_a,
            a_to_b: false,
        })
    } else {
        None
    }
}

fn swap_data(amount: u64, other_amount_threshold: u64, a_to_b: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(42);
    data.extend_from_slice(&SWAP_DISCRIMINATOR);
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&other_amount_threshold.to_le_bytes());
    data.extend_from_slice(&0u128.to_le_bytes()); // sqrt_price_limit: venue default
    data.push(1); // amount_specified_is_input
    data.push(a_to_b as u8);
    data
}

fn parse_pubkey(value: &str) -> Result<Pubkey, DexError> {
    value
        .parse()
        .map_err(|_| DexError::Transport(format!("invalid address: {value}")))
}

/// Orca venue client.
pub struct OrcaClient {
    http: Client,
    base_url: String,
}

impl OrcaClient {
    pub fn new() -> Self {
        Self::with_base_url(ORCA_API)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn fetch_pair_pools(
        &self,
        token_in: &str,
        token_out: &str,
    ) -> Result<Vec<WhirlpoolInfo>, DexError> {
        let url = format!(
            "{}/v2/solana/pools?tokensBothOf={},{}&size={}",
            self.base_url, token_in, token_out, MAX_POOL_FANOUT
        );
        let body: PoolsResponse = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.data)
    }

    async fn fetch_pool(&self, address: &str) -> Result<Option<WhirlpoolInfo>, DexError> {
        let url = format!("{}/v2/solana/pools/{}", self.base_url, address);
        let response = self.http.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        #[derive(Deserialize)]
        struct PoolResponse {
            data: WhirlpoolInfo,
        }
        let body: PoolResponse = response.error_for_status()?.json().await?;
        Ok(Some(body.data))
    }
}

impl Default for OrcaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DexClient for OrcaClient {
    fn venue(&self) -> &'static str {
        "orca"
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, DexError> {
        let pools = self
            .fetch_pair_pools(&request.token_in, &request.token_out)
            .await?;

        let mut best: Option<(u64, u32, Oriented, WhirlpoolInfo)> = None;
        for pool in pools.into_iter().take(MAX_POOL_FANOUT) {
            let Some(oriented) = orient(&pool, &request.token_in, &request.token_out) else {
                continue;
            };
            let fee_bps = pool.fee_rate / 100;
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
        debug!(pool = %pool.address, estimated_out, "orca quote");
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
            pool_id: pool.address,
            route_meta: Some(serde_json::json!({
                "program": WHIRLPOOL_PROGRAM.to_string(),
                "poolType": "whirlpool",
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
        let whirlpool = parse_pubkey(&pool.address)?;
        let vault_a = parse_pubkey(&pool.token_vault_a)?;
        let vault_b = parse_pubkey(&pool.token_vault_b)?;
        let ata_in = get_associated_token_address(signer, &in_mint);
        let ata_out = get_associated_token_address(signer, &out_mint);

        let (user_a, user_b) = if oriented.a_to_b {
            (ata_in, ata_out)
        } else {
            (ata_out, ata_in)
        };

        let mut instructions = vec![create_associated_token_account_idempotent(
            signer,
            signer,
            &out_mint,
            &spl_token::id(),
        )];
        if in_mint == spl_token::native_mint::id() {
            instructions.push(create_associated_token_account_idempotent(
                signer,
                signer,
                &in_mint,
                &spl_token::id(),
            ));
            instructions.push(solana_sdk::system_instruction::transfer(
                signer,
                &ata_in,
                order.request.amount,
            ));
            instructions.push(
                spl_token::instruction::sync_native(&spl_token::id(), &ata_in)
                    .map_err(|e| DexError::Transport(e.to_string()))?,
            );
        }

        instructions.push(Instruction {
            program_id: WHIRLPOOL_PROGRAM,
            accounts: vec![
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new_readonly(*signer, true),
                AccountMeta::new(whirlpool, false),
                AccountMeta::new(user_a, false),
                AccountMeta::new(vault_a, false),
                AccountMeta::new(user_b, false),
                AccountMeta::new(vault_b, false),
            ],
            data: swap_data(order.request.amount, quote.min_out, oriented.a_to_b),
        });

        let message = Message::new(&instructions, Some(signer));
        Ok(BuiltTransaction::new(Transaction::new_unsigned(message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> WhirlpoolInfo {
        WhirlpoolInfo {
            address: "WPOOL1".into(),
            fee_rate: 3000,
            token_a: WhirlpoolToken {
                address: "SOL".into(),
                decimals: 9,
            },
            token_b: WhirlpoolToken {
                address: "USDC".into(),
                decimals: 6,
            },
            token_vault_a: "VAULTA".into(),
            token_vault_b: "VAULTB".into(),
            token_balance_a: "250.5".into(),
            token_balance_b: "40000".into(),
        }
    }

    #[test]
    fn orients_and_scales_balances() {
        let p = pool();
        let fwd = orient(&p, "SOL", "USDC").unwrap();
        assert!(fwd.a_to_b);
        assert_eq!(fwd.reserve_in, 250_500_000_000);
        assert_eq!(fwd.reserve_out, 40_000_000_000);
        assert!(orient(&p, "USDC", "BONK").is_none());
    }

    #[test]
    fn swap_data_layout() {
        let data = swap_data(5, 3, true);
        assert_eq!(data.len(), 42);
        assert_eq!(&data[..8], &SWAP_DISCRIMINATOR);
        assert_eq!(u64::from_le_bytes(data[8..16].try_into().unwrap()), 5);
        assert_eq!(u64::from_le_bytes(data[16..24].try_into().unwrap()), 3);
        assert_eq!(data[40], 1);
        assert_eq!(data[41], 1);
    }

    #[test]
    fn unparseable_balance_yields_empty_reserves() {
        let mut p = pool();
        p.token_balance_a = "n/a".into();
        let fwd = orient(&p, "SOL", "USDC").unwrap();
        assert_eq!(fwd.reserve_in, 0);
    }
}
