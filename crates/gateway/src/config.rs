//! Environment-driven configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use queue::redis_url_from_parts;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub metrics_port: u16,
    pub solana_rpc_url: String,
    pub solana_cluster: String,
    pub solana_commitment: String,
    pub wallet_private_key: Option<String>,
    pub redis_url: Option<String>,
    pub postgres_url: Option<String>,
    pub postgres_pool_max: u32,
    pub postgres_idle_timeout_ms: u64,
    pub slippage_bps: u32,
    pub route_timeout: Duration,
    pub worker_concurrency: usize,
    pub rate_limit: u32,
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let redis_url = env::var("REDIS_URL").ok().or_else(|| {
            let host = env::var("REDIS_HOST").ok()?;
            Some(redis_url_from_parts(
                &host,
                parse_env("REDIS_PORT", 6379),
                env::var("REDIS_USERNAME").ok().as_deref(),
                env::var("REDIS_PASSWORD").ok().as_deref(),
                parse_env("REDIS_DB", 0),
            ))
        });

        let slippage: f64 = parse_env("SLIPPAGE", 0.01);

        Self {
            port: parse_env("PORT", 8080),
            metrics_port: parse_env("METRICS_PORT", 9100),
            solana_rpc_url: env::var("SOLANA_RPC_URL")
                .unwrap_or_else(|_| "https://api.devnet.solana.com".to_string()),
            solana_cluster: env::var("SOLANA_CLUSTER").unwrap_or_else(|_| "devnet".to_string()),
            solana_commitment: env::var("SOLANA_COMMITMENT")
                .unwrap_or_else(|_| "confirmed".to_string()),
            wallet_private_key: env::var("WALLET_PRIVATE_KEY").ok(),
            redis_url,
            postgres_url: env::var("POSTGRES_URL").ok(),
            postgres_pool_max: parse_env("POSTGRES_POOL_MAX", 10),
            postgres_idle_timeout_ms: parse_env("POSTGRES_IDLE_TIMEOUT_MS", 30_000),
            slippage_bps: dex::slippage_to_bps(slippage),
            route_timeout: Duration::from_millis(parse_env("ROUTE_TIMEOUT_MS", 5_000)),
            worker_concurrency: parse_env("WORKER_CONCURRENCY", 10),
            rate_limit: parse_env("RATE_LIMIT", 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_falls_back_on_missing_or_garbage() {
        env::remove_var("CFG_TEST_MISSING");
        assert_eq!(parse_env("CFG_TEST_MISSING", 42u32), 42);

        env::set_var("CFG_TEST_GARBAGE", "not-a-number");
        assert_eq!(parse_env("CFG_TEST_GARBAGE", 7u16), 7);
        env::remove_var("CFG_TEST_GARBAGE");

        env::set_var("CFG_TEST_SET", "123");
        assert_eq!(parse_env("CFG_TEST_SET", 0u32), 123);
        env::remove_var("CFG_TEST_SET");
    }
}
