//! Swap execution service entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chain::{load_keypair, parse_commitment, ExplorerLinks, Keypair, RpcSubmitter};
use dex::{DexRouter, OrcaClient, RaydiumClient, RouterConfig};
use gateway::{create_router, AppState, Config, Intake};
use history::{HistoryStore, MemoryHistoryStore, PgHistoryStore};
use hub::StatusHub;
use metrics_exporter_prometheus::PrometheusBuilder;
use queue::{MemoryQueue, OrderQueue, RedisQueue, RetryPolicy};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use worker::{ExecutionWorker, FixedWindowLimiter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let filter = std::env::var("LOG_LEVEL")
        .map(EnvFilter::new)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting swap execution service");

    let config = Config::from_env();
    info!("Configuration:");
    info!("  PORT: {}", config.port);
    info!("  METRICS_PORT: {}", config.metrics_port);
    info!("  SOLANA_RPC_URL: {}", config.solana_rpc_url);
    info!("  SOLANA_CLUSTER: {}", config.solana_cluster);
    info!("  SOLANA_COMMITMENT: {}", config.solana_commitment);
    info!("  SLIPPAGE_BPS: {}", config.slippage_bps);
    info!("  ROUTE_TIMEOUT_MS: {}", config.route_timeout.as_millis());
    info!("  WORKER_CONCURRENCY: {}", config.worker_concurrency);
    info!("  RATE_LIMIT: {}/min", config.rate_limit);

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()
        .context("failed to start Prometheus exporter")?;
    info!("Prometheus exporter on port {}", config.metrics_port);

    let wallet = match &config.wallet_private_key {
        Some(raw) => load_keypair(raw).context("WALLET_PRIVATE_KEY is not a valid key")?,
        None => {
            warn!("WALLET_PRIVATE_KEY not set; using an ephemeral keypair");
            Keypair::new()
        }
    };

    // History store: Postgres when configured, in-memory otherwise.
    let (history, pg): (Arc<dyn HistoryStore>, Option<Arc<PgHistoryStore>>) =
        match &config.postgres_url {
            Some(url) => {
                let store = Arc::new(
                    PgHistoryStore::connect(
                        url,
                        config.postgres_pool_max,
                        config.postgres_idle_timeout_ms,
                    )
                    .await
                    .context("failed to connect to Postgres")?,
                );
                (store.clone(), Some(store))
            }
            None => {
                warn!("POSTGRES_URL not set; order history is in-memory only");
                (Arc::new(MemoryHistoryStore::new()), None)
            }
        };

    let order_queue: Arc<dyn OrderQueue> = match &config.redis_url {
        Some(url) => {
            info!("Using Redis queue");
            Arc::new(
                RedisQueue::new(url, RetryPolicy::default())
                    .context("invalid Redis configuration")?,
            )
        }
        None => {
            warn!("Redis not configured; using the in-process queue");
            Arc::new(MemoryQueue::new(RetryPolicy::default()))
        }
    };

    let hub = Arc::new(StatusHub::new());

    let mut router = DexRouter::new(RouterConfig {
        slippage_bps: config.slippage_bps,
        quote_timeout: config.route_timeout,
    });
    router.register(Arc::new(RaydiumClient::new()));
    router.register(Arc::new(OrcaClient::new()));
    let venues = router.venues();
    let router = Arc::new(router);

    let submitter = Arc::new(RpcSubmitter::new(
        &config.solana_rpc_url,
        wallet,
        parse_commitment(&config.solana_commitment),
    ));
    let signer = submitter.signer_pubkey();
    info!("Signer: {signer}");

    let worker = Arc::new(ExecutionWorker::new(
        router,
        history.clone(),
        hub.clone(),
        submitter,
        FixedWindowLimiter::per_minute(config.rate_limit),
        signer,
        ExplorerLinks::new("https://explorer.solana.com", config.solana_cluster.clone()),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = tokio::spawn(order_queue.clone().run(
        worker,
        config.worker_concurrency,
        shutdown_rx,
    ));
    info!(
        "Queue consumer started (concurrency {})",
        config.worker_concurrency
    );

    let state = Arc::new(AppState {
        intake: Intake::new(history.clone(), order_queue, hub.clone()),
        history,
        hub,
        venues,
    });
    let app = create_router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    info!("Listening on port {}", config.port);
    info!("Endpoints:");
    info!("  POST /api/orders/execute   - submit a market order");
    info!("  GET  /api/orders/execute   - WebSocket status stream");
    info!("  GET  /api/orders/history   - order history");
    info!("  GET  /health               - health check");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining queue consumer");
    let _ = shutdown_tx.send(true);
    let drained = tokio::time::timeout(Duration::from_secs(10), async {
        if let Some(store) = &pg {
            let _ = tokio::join!(consumer, store.close());
        } else {
            let _ = consumer.await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("shutdown timed out; exiting with jobs in flight");
    }

    info!("Service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
