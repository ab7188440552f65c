//! Quote fan-out and venue selection.

use std::sync::Arc;
use std::time::Duration;

use chain::BuiltTransaction;
use common::{OrderJob, QuoteRequest, QuoteResponse};
use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

use crate::client::DexClient;
use crate::error::{DexError, RouterError};

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Slippage tolerance applied to every quote request.
    pub slippage_bps: u32,
    /// Per-venue quote deadline.
    pub quote_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            slippage_bps: 100,
            quote_timeout: Duration::from_millis(5_000),
        }
    }
}

/// `max(1, floor(slippage * 10000))` for a fractional `SLIPPAGE` setting.
pub fn slippage_to_bps(slippage: f64) -> u32 {
    ((slippage * 10_000.0).floor() as u32).max(1)
}

/// The routing outcome: the winning venue handle and its quote.
///
/// A plain record rather than a deferred closure, so the worker calls
/// [`build_transaction`] explicitly with the order and signer in hand.
pub struct RoutePlan {
    pub venue: String,
    pub quote: QuoteResponse,
    winner: Arc<dyn DexClient>,
}

impl std::fmt::Debug for RoutePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutePlan")
            .field("venue", &self.venue)
            .field("quote", &self.quote)
            .finish_non_exhaustive()
    }
}

/// Build the swap transaction on the plan's winning venue.
pub async fn build_transaction(
    plan: &RoutePlan,
    order: &OrderJob,
    signer: &Pubkey,
) -> Result<BuiltTransaction, DexError> {
    plan.winner.build_swap(order, &plan.quote, signer).await
}

/// Routes each order to the venue quoting the highest output.
///
/// Stateless across calls and safe for concurrent use. The router never
/// retries a venue; retries belong to the queue.
pub struct DexRouter {
    venues: Vec<Arc<dyn DexClient>>,
    config: RouterConfig,
}

impl DexRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            venues: Vec::new(),
            config,
        }
    }

    /// Register a venue. Registration order is the tie-break order.
    pub fn register(&mut self, client: Arc<dyn DexClient>) {
        info!("Registering venue: {}", client.venue());
        self.venues.push(client);
    }

    /// Names of all registered venues, in registration order.
    pub fn venues(&self) -> Vec<&'static str> {
        self.venues.iter().map(|v| v.venue()).collect()
    }

    /// Fan out the quote request to every venue and pick the best admitted
    /// quote. A venue is admitted iff it answers within the deadline without
    /// error; ties keep the earlier-registered venue.
    pub async fn find_best_route(&self, order: &OrderJob) -> Result<RoutePlan, RouterError> {
        let request = QuoteRequest {
            token_in: order.request.token_in.clone(),
            token_out: order.request.token_out.clone(),
            amount: order.request.amount,
            slippage_bps: self.config.slippage_bps,
        };

        let timeout = self.config.quote_timeout;
        let futures = self.venues.iter().map(|venue| {
            let venue = venue.clone();
            let request = request.clone();
            async move {
                let name = venue.venue();
                match tokio::time::timeout(timeout, venue.quote(&request)).await {
                    Ok(Ok(quote)) => (name, Ok(quote)),
                    Ok(Err(err)) => (name, Err(err.to_string())),
                    Err(_) => (name, Err(format!("quote timed out after {timeout:?}"))),
                }
            }
        });
        let outcomes: Vec<(&'static str, Result<QuoteResponse, String>)> =
            join_all(futures).await;

        let decision: Vec<serde_json::Value> = outcomes
            .iter()
            .map(|(name, outcome)| match outcome {
                Ok(quote) => serde_json::json!({
                    "venue": name,
                    "estimatedOut": quote.estimated_out,
                    "minOut": quote.min_out,
                    "poolId": quote.pool_id,
                }),
                Err(reason) => serde_json::json!({ "venue": name, "error": reason }),
            })
            .collect();

        let mut winner: Option<(usize, QuoteResponse)> = None;
        for (index, (_, outcome)) in outcomes.iter().enumerate() {
            if let Ok(quote) = outcome {
                let better = winner
                    .as_ref()
                    .map_or(true, |(_, best)| quote.estimated_out > best.estimated_out);
                if better {
                    winner = Some((index, quote.clone()));
                }
            }
        }

        if let Some((index, quote)) = winner {
            info!(
                order_id = %order.order_id,
                winner = %quote.venue,
                estimated_out = quote.estimated_out,
                quotes = %serde_json::Value::Array(decision),
                "routing decision"
            );
            return Ok(RoutePlan {
                venue: quote.venue.clone(),
                quote,
                winner: self.venues[index].clone(),
            });
        }

        let reasons: Vec<String> = outcomes
            .into_iter()
            .filter_map(|(name, outcome)| outcome.err().map(|reason| format!("{name}: {reason}")))
            .collect();
        warn!(order_id = %order.order_id, ?reasons, "no venue produced a quote");
        Err(RouterError::NoQuotes { reasons })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{min_out_floor, OrderRequest, OrderType};
    use solana_sdk::transaction::Transaction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Quote(u64),
        Fail(&'static str),
        Sleep(Duration, u64),
    }

    struct StubVenue {
        name: &'static str,
        behavior: Behavior,
        builds: AtomicUsize,
    }

    impl StubVenue {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                builds: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DexClient for StubVenue {
        fn venue(&self) -> &'static str {
            self.name
        }

        async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, DexError> {
            let estimated_out = match self.behavior {
                Behavior::Quote(out) => out,
                Behavior::Fail(reason) => return Err(DexError::Transport(reason.into())),
                Behavior::Sleep(delay, out) => {
                    tokio::time::sleep(delay).await;
                    out
                }
            };
            Ok(QuoteResponse {
                venue: self.name.to_string(),
                estimated_out,
                min_out: min_out_floor(estimated_out, request.slippage_bps),
                price_impact_bps: 5,
                fee_bps: 25,
                pool_id: format!("{}-pool", self.name),
                route_meta: None,
                request: request.clone(),
            })
        }

        async fn build_swap(
            &self,
            _order: &OrderJob,
            _quote: &QuoteResponse,
            _signer: &Pubkey,
        ) -> Result<BuiltTransaction, DexError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(BuiltTransaction::new(Transaction::default()))
        }
    }

    fn order() -> OrderJob {
        OrderJob::new(
            "ORDER1".into(),
            OrderRequest {
                token_in: "TOKA".into(),
                token_out: "TOKB".into(),
                amount: 1_000_000,
                order_type: OrderType::Market,
            },
        )
    }

    fn router(venues: Vec<Arc<StubVenue>>, timeout: Duration) -> DexRouter {
        let mut router = DexRouter::new(RouterConfig {
            slippage_bps: 50,
            quote_timeout: timeout,
        });
        for venue in venues {
            router.register(venue);
        }
        router
    }

    #[tokio::test]
    async fn picks_highest_estimated_out() {
        let v1 = StubVenue::new("v1", Behavior::Quote(2_000_000));
        let v2 = StubVenue::new("v2", Behavior::Quote(1_800_000));
        let router = router(vec![v1, v2], Duration::from_secs(1));

        let plan = router.find_best_route(&order()).await.unwrap();
        assert_eq!(plan.venue, "v1");
        assert_eq!(plan.quote.estimated_out, 2_000_000);
        assert!(plan.quote.min_out <= plan.quote.estimated_out);
    }

    #[tokio::test]
    async fn falls_back_when_best_venue_errors() {
        let v1 = StubVenue::new("v1", Behavior::Fail("connection refused"));
        let v2 = StubVenue::new("v2", Behavior::Quote(1_600_000));
        let router = router(vec![v1, v2], Duration::from_secs(1));

        let plan = router.find_best_route(&order()).await.unwrap();
        assert_eq!(plan.venue, "v2");
    }

    #[tokio::test]
    async fn single_success_wins_regardless_of_magnitude() {
        let v1 = StubVenue::new("v1", Behavior::Fail("boom"));
        let v2 = StubVenue::new("v2", Behavior::Quote(1));
        let router = router(vec![v1, v2], Duration::from_secs(1));

        let plan = router.find_best_route(&order()).await.unwrap();
        assert_eq!(plan.venue, "v2");
        assert_eq!(plan.quote.estimated_out, 1);
    }

    #[tokio::test]
    async fn all_failures_carry_every_reason() {
        let v1 = StubVenue::new("v1", Behavior::Fail("no pool data"));
        let v2 = StubVenue::new("v2", Behavior::Sleep(Duration::from_millis(200), 1));
        let router = router(vec![v1, v2], Duration::from_millis(20));

        let err = router.find_best_route(&order()).await.unwrap_err();
        let RouterError::NoQuotes { reasons } = err;
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].contains("v1") && reasons[0].contains("no pool data"));
        assert!(reasons[1].contains("v2") && reasons[1].contains("timed out"));
    }

    #[tokio::test]
    async fn timed_out_venue_is_skipped_not_fatal() {
        let slow = StubVenue::new("slow", Behavior::Sleep(Duration::from_millis(200), 9_999_999));
        let fast = StubVenue::new("fast", Behavior::Quote(100));
        let router = router(vec![slow, fast], Duration::from_millis(20));

        let plan = router.find_best_route(&order()).await.unwrap();
        assert_eq!(plan.venue, "fast");
    }

    #[tokio::test]
    async fn ties_keep_registration_order() {
        let v1 = StubVenue::new("v1", Behavior::Quote(500));
        let v2 = StubVenue::new("v2", Behavior::Quote(500));
        let router = router(vec![v1, v2], Duration::from_secs(1));

        let plan = router.find_best_route(&order()).await.unwrap();
        assert_eq!(plan.venue, "v1");
    }

    #[tokio::test]
    async fn build_goes_to_winner_only() {
        let v1 = StubVenue::new("v1", Behavior::Quote(2_000_000));
        let v2 = StubVenue::new("v2", Behavior::Quote(1_800_000));
        let router = router(vec![v1.clone(), v2.clone()], Duration::from_secs(1));

        let order = order();
        let plan = router.find_best_route(&order).await.unwrap();
        build_transaction(&plan, &order, &Pubkey::new_unique())
            .await
            .unwrap();

        assert_eq!(v1.builds.load(Ordering::SeqCst), 1);
        assert_eq!(v2.builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn slippage_fraction_to_bps() {
        assert_eq!(slippage_to_bps(0.01), 100);
        assert_eq!(slippage_to_bps(0.5), 5_000);
        // Tiny and zero slippage clamp up to 1 bps.
        assert_eq!(slippage_to_bps(0.00004), 1);
        assert_eq!(slippage_to_bps(0.0), 1);
    }
}
