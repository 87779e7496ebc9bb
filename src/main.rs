//! PEGBOT — Stablecoin Mean-Reversion Rebalancing Agent
//!
//! Entry point. Loads configuration and credentials, initialises
//! structured logging, validates pairs against the exchange, and runs
//! the poll→classify→rebalance loop with graceful shutdown.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pegbot::config::AppConfig;
use pegbot::credentials;
use pegbot::engine::TradingEngine;
use pegbot::exchange::BinanceSpot;
use pegbot::status::{SharedView, StatusFeed, StatusUpdate};

const BANNER: &str = r#"
 ____  _____ ____ ____   ___ _____
|  _ \| ____/ ___| __ ) / _ \_   _|
| |_) |  _|| |  _|  _ \| | | || |
|  __/| |__| |_| | |_) | |_| || |
|_|   |_____\____|____/ \___/ |_|

  Stablecoin Mean-Reversion Rebalancing Agent
  v0.1.0 — Unattended
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        poll_interval_secs = cfg.trading.poll_interval_secs,
        pairs = cfg.trading.pairs.len(),
        quote = %cfg.trading.quote_asset,
        "PEGBOT starting up"
    );

    let creds = credentials::resolve(None)?
        .context("No API credentials: set PEGBOT_API_KEY/PEGBOT_API_SECRET or provide pegbot_credentials.json")?;

    let exchange = Arc::new(BinanceSpot::new(
        cfg.exchange.base_url.clone(),
        creds,
        cfg.exchange.recv_window_ms,
    )?);

    let view = SharedView::new();
    let (feed, mut updates) = StatusFeed::channel();

    // Status consumer: turns feed events into log lines.
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            match update {
                StatusUpdate::Trade(conversion) => info!(%conversion, "Trade"),
                StatusUpdate::Skipped { coin, direction, reason } => {
                    info!(%coin, %direction, %reason, "Skipped")
                }
                StatusUpdate::Health { state, failures } => {
                    info!(%state, failures, "Health")
                }
                StatusUpdate::CredentialAlert { detail } => {
                    error!(%detail, "CREDENTIAL ALERT")
                }
                StatusUpdate::Prices { quotes, .. } => info!(pairs = quotes.len(), "Prices"),
                StatusUpdate::Balances { balances, .. } => {
                    info!(coins = balances.len(), "Balances")
                }
                StatusUpdate::Message(msg) => info!("{msg}"),
            }
        }
    });

    let mut engine = TradingEngine::new(exchange, &cfg, view, feed);
    engine.start().await.context("Engine startup failed")?;

    // Ctrl+C raises the flag; the loop finishes its current cycle first.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Shutdown signal received, finishing current cycle");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    match engine.run(shutdown).await {
        Ok(()) => info!("PEGBOT stopped cleanly"),
        Err(err) => {
            error!(error = %err, "Session terminated");
            return Err(err.into());
        }
    }
    Ok(())
}

/// Structured logging via `tracing`. `RUST_LOG` overrides the default
/// filter; `PEGBOT_LOG_JSON=1` switches to JSON output for collectors.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pegbot=info"));

    let json = std::env::var("PEGBOT_LOG_JSON").map(|v| v == "1").unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
