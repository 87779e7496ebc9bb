//! Shared types for the PEGBOT agent.
//!
//! These types form the data model used across all modules: trading pairs,
//! candles, signals, order fills, and the error taxonomy. They are designed
//! to be stable so that the exchange, strategy, and engine modules can
//! depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange-imposed minimum market-order quantity, in whole units.
/// All in-scope pegged pairs share the same lot-size floor.
pub const MIN_LOT: f64 = 5.0;

/// Balance fraction used when a deviation exceeds the aggressive breakpoint.
pub const AGGRESSIVE_FRACTION: f64 = 0.5;

// ---------------------------------------------------------------------------
// Trading pair
// ---------------------------------------------------------------------------

/// A spot trading pair. The quote side is always the configured reference
/// stable asset; this is enforced by `AppConfig::validate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        }
    }

    /// Exchange symbol form, e.g. "USDCUSDT".
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Parse the "BASE/QUOTE" display form.
impl std::str::FromStr for TradingPair {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, quote)) if !base.trim().is_empty() && !quote.trim().is_empty() => {
                Ok(TradingPair::new(base.trim(), quote.trim()))
            }
            _ => Err(anyhow::anyhow!("Invalid trading pair: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// One kline/candlestick as returned by the exchange. Ordered oldest to
/// newest when batched; the final element of a batch is the in-progress
/// candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Latest observation for one pair: current price plus the moving average
/// of the most recent completed candles. Overwritten each poll cycle; no
/// history is retained beyond this.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairQuote {
    pub price: f64,
    pub moving_average: f64,
    pub observed_at: DateTime<Utc>,
}

impl PairQuote {
    /// Relative deviation of price from the moving average.
    pub fn deviation(&self) -> f64 {
        (self.price - self.moving_average).abs() / self.moving_average
    }
}

impl fmt::Display for PairQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "price={:.4} ma={:.4} dev={:.4}%",
            self.price,
            self.moving_average,
            self.deviation() * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Where the price sits relative to the moving average, after the deviation
/// threshold is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Above,
    Below,
    Neutral,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Above => write!(f, "ABOVE"),
            Direction::Below => write!(f, "BELOW"),
            Direction::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// How much of the available balance a conversion may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeedTier {
    Conservative,
    Aggressive,
}

impl SpeedTier {
    /// The balance fraction this tier trades. The conservative fraction is
    /// operator-configured; the aggressive fraction is fixed.
    pub fn fraction(&self, conservative_fraction: f64) -> f64 {
        match self {
            SpeedTier::Conservative => conservative_fraction,
            SpeedTier::Aggressive => AGGRESSIVE_FRACTION,
        }
    }
}

impl fmt::Display for SpeedTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedTier::Conservative => write!(f, "conservative"),
            SpeedTier::Aggressive => write!(f, "aggressive"),
        }
    }
}

/// A per-coin trade signal, derived fresh every cycle and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub coin: String,
    pub direction: Direction,
    pub deviation: f64,
    pub tier: SpeedTier,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} dev={:.4}% ({})",
            self.coin,
            self.direction,
            self.deviation * 100.0,
            self.tier,
        )
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a filled market order. The realized counter-amount always
/// comes from `cumulative_quote_qty`, never from a pre-trade price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub order_id: u64,
    pub executed_qty: f64,
    pub cumulative_quote_qty: f64,
}

impl fmt::Display for OrderFill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "order {} filled qty={:.2} quote={:.2}",
            self.order_id, self.executed_qty, self.cumulative_quote_qty,
        )
    }
}

/// Lot-size filter reported by the exchange for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LotFilter {
    pub quantity_precision: u32,
    pub min_qty: f64,
}

impl Default for LotFilter {
    fn default() -> Self {
        // Exchange defaults when the filter is missing from symbol info.
        Self {
            quantity_precision: 8,
            min_qty: 0.0001,
        }
    }
}

/// A completed balance conversion, one or two market legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub from_coin: String,
    pub to_coin: String,
    pub from_amount: f64,
    pub to_amount: f64,
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.0} {} -> {:.2} {}",
            self.from_amount, self.from_coin, self.to_amount, self.to_coin,
        )
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Errors surfaced by the exchange boundary, classified so callers can
/// decide between retry, pair disablement, and session termination.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("Invalid API credentials: {0}")]
    InvalidCredentials(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Rate limited by exchange")]
    RateLimited,

    #[error("Exchange server error (HTTP {status})")]
    ServerError { status: u16 },

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Order rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },
}

impl ExchangeError {
    /// Whether a bounded retry with fixed delay is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::NetworkUnreachable(_)
                | ExchangeError::RateLimited
                | ExchangeError::ServerError { .. }
        )
    }

    /// Credential-class failures end the session; they are never retried.
    pub fn is_credential(&self) -> bool {
        matches!(self, ExchangeError::InvalidCredentials(_))
    }
}

/// Errors from the order execution engine.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Trade size below minimum lot for {coin} (free balance {balance:.2})")]
    InsufficientLotSize { coin: String, balance: f64 },

    #[error("No current price for pair {0}")]
    MissingPrice(TradingPair),

    #[error(
        "Partial conversion: {resting_quote:.2} quote units left resting after sell leg; {cause}"
    )]
    PartialConversion {
        resting_quote: f64,
        #[source]
        cause: Box<ConvertError>,
    },

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
