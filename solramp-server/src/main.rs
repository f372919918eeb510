//! solramp on-ramp HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p solramp-server --release
//!
//! # Run with custom config path
//! CONFIG=/path/to/config.toml cargo run -p solramp-server
//!
//! # Configure logging level
//! RUST_LOG=info cargo run -p solramp-server
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to TOML configuration file (default: `config.toml`)
//! - `HOST` — Override bind address (default: `0.0.0.0`)
//! - `PORT` — Override port (default: `4080`)
//! - `RUST_LOG` — Log level filter (default: `info`)

use std::net::SocketAddr;
use std::sync::Arc;

use solramp::{MemoryStore, SessionStore};
use solramp_svm::executor::SettlementExecutor;
use solramp_svm::lend::LendingDepositBuilder;
use solramp_svm::provider::{RpcProvider, SolanaProvider};
use solramp_svm::quote::SwapQuoteClient;
use solramp_svm::signer::FundingSigner;
use tracing_subscriber::EnvFilter;
use url::Url;

use solramp_server::checkout::CheckoutService;
use solramp_server::handlers::{AppState, app_router};
use solramp_server::oracle::HttpPriceOracle;
use solramp_server::payments::{HostedCheckoutClient, PaymentProvider};
use solramp_server::{ServerConfig, SharedState};

#[tokio::main]
async fn main() {
    // Initialize tracing with RUST_LOG env filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        rpc_url = %config.rpc_url,
        confirmation = ?config.confirmation,
        "Loaded configuration"
    );

    let funding_secret = config.funding_secret.trim();
    if funding_secret.is_empty() || funding_secret.starts_with('$') {
        return Err("funding_secret not resolved (missing env var?)".into());
    }
    let signer = Arc::new(FundingSigner::from_secret(funding_secret)?);
    tracing::info!(funding = %signer.pubkey(), "Loaded funding signer");

    let provider: Arc<dyn SolanaProvider> = Arc::new(RpcProvider::new(config.rpc_url.clone()));
    let store = Arc::new(MemoryStore::new());
    let quotes = SwapQuoteClient::new(&config.aggregator_url)?;
    let oracle = Arc::new(HttpPriceOracle::new(&config.price_oracle_url)?);
    let payments: Arc<dyn PaymentProvider> = Arc::new(HostedCheckoutClient::new(
        &config.payment_provider.base_url,
        config.payment_provider.secret_key.clone(),
    )?);

    let success_url = match &config.payment_provider.success_url {
        Some(url) => url.clone(),
        None => Url::parse(&format!(
            "http://{}:{}/payment-success",
            config.host, config.port
        ))?,
    };

    let mut pools = std::collections::HashMap::new();
    for (name, pool_cfg) in &config.lend.pools {
        pools.insert(name.clone(), pool_cfg.parse(name)?);
    }
    if !pools.is_empty() {
        tracing::info!(pools = ?pools.keys().collect::<Vec<_>>(), "Configured lending pools");
    }

    let executor = SettlementExecutor::new(
        Arc::clone(&provider),
        signer,
        Arc::clone(&store) as Arc<dyn SessionStore>,
        quotes.clone(),
        config.confirmation,
    );
    let checkout = CheckoutService::new(
        Arc::clone(&store) as Arc<dyn SessionStore>,
        oracle,
        Arc::clone(&payments),
        config.checkout.clone(),
        success_url,
    );
    let lending = Arc::new(LendingDepositBuilder::new(Arc::clone(&provider), pools));

    let state: SharedState = Arc::new(AppState {
        store: store as Arc<dyn SessionStore>,
        checkout,
        executor,
        payments,
        quotes,
        lending,
    });
    let app = app_router(state);

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("On-ramp listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
