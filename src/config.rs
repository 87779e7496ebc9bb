//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API key/secret) never live here — they come from the
//! credential file or environment, see `crate::credentials`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;

use crate::types::TradingPair;

/// Top-level application configuration. Immutable once loaded.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub base_url: String,
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    /// Seconds between poll cycles.
    pub poll_interval_secs: u64,
    /// Minimum seconds between rebalance passes.
    pub rebalance_cooldown_secs: u64,
    /// Number of completed candles in the moving average.
    pub ma_period: usize,
    /// Candle interval, e.g. "1m", "1h", "4h", "1d".
    pub candle_interval: String,
    /// Minimum |price - MA| / MA to leave the Neutral band.
    pub deviation_threshold: f64,
    /// Deviation above which the aggressive tier kicks in.
    pub aggressive_breakpoint: f64,
    /// Balance fraction for conservative-tier trades.
    pub conservative_trade_fraction: f64,
    /// The single reference stable asset every pair quotes against.
    pub quote_asset: String,
    /// Fixed set of coins that may appear in signals or balances.
    pub supported_coins: Vec<String>,
    /// Pairs to trade, in declaration order.
    pub pairs: Vec<TradingPair>,
}

fn default_recv_window() -> u64 {
    5000
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Enforce the structural invariants: exactly one quote asset, every
    /// pair quoted in it, every pair base in the supported set.
    pub fn validate(&self) -> Result<()> {
        let t = &self.trading;

        if t.ma_period == 0 {
            bail!("ma_period must be at least 1");
        }
        if !(0.0..=1.0).contains(&t.conservative_trade_fraction) {
            bail!(
                "conservative_trade_fraction must be in [0, 1], got {}",
                t.conservative_trade_fraction
            );
        }
        if !t.supported_coins.contains(&t.quote_asset) {
            bail!(
                "quote asset {} missing from supported_coins",
                t.quote_asset
            );
        }
        for pair in &t.pairs {
            if pair.base == pair.quote {
                bail!("pair {pair} trades the quote asset against itself");
            }
            if pair.quote != t.quote_asset {
                bail!(
                    "pair {pair} is not quoted in the reference asset {}",
                    t.quote_asset
                );
            }
            if !t.supported_coins.contains(&pair.base) {
                bail!("pair {pair} has unsupported base coin {}", pair.base);
            }
        }
        Ok(())
    }
}
