//! Market-data polling.
//!
//! Fetches candles for each configured pair and derives the current
//! price and moving average. Per-pair failures are reported, never
//! allowed to sink the whole pass.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::exchange::{RetryPolicy, SpotExchange};
use crate::types::{ExchangeError, PairQuote, TradingPair};

/// Why a pair yielded no quote this pass.
#[derive(Debug, Clone)]
pub enum PairFailure {
    /// Network, rate-limit, or server trouble. Retried and still failing.
    Transient(ExchangeError),
    /// The exchange does not recognise the symbol.
    InvalidSymbol,
    /// The exchange rejected our credentials. Fatal for the session.
    InvalidCredentials(String),
    /// Fewer closed candles than the moving-average period needs.
    InsufficientHistory { have: usize, need: usize },
}

#[derive(Debug, Clone)]
pub enum PairSnapshot {
    Available(PairQuote),
    Unavailable(PairFailure),
}

pub struct MarketDataPoller {
    exchange: Arc<dyn SpotExchange>,
    interval: String,
    ma_period: usize,
    retry: RetryPolicy,
}

impl MarketDataPoller {
    pub fn new(exchange: Arc<dyn SpotExchange>, interval: String, ma_period: usize) -> Self {
        Self {
            exchange,
            interval,
            ma_period,
            retry: RetryPolicy::transient(),
        }
    }

    /// Fetch one pair's quote: the latest (still-forming) candle's close
    /// as the price, and the mean of the preceding `ma_period` closed
    /// candles as the moving average.
    pub async fn fetch_pair(&self, pair: &TradingPair) -> PairSnapshot {
        let symbol = pair.symbol();
        let limit = self.ma_period + 1;

        let result = self
            .retry
            .run(&symbol, || {
                self.exchange.candles(&symbol, &self.interval, limit)
            })
            .await;

        let candles = match result {
            Ok(candles) => candles,
            Err(ExchangeError::InvalidSymbol(_)) => {
                return PairSnapshot::Unavailable(PairFailure::InvalidSymbol)
            }
            Err(err) if err.is_credential() => {
                return PairSnapshot::Unavailable(PairFailure::InvalidCredentials(err.to_string()))
            }
            Err(err) => return PairSnapshot::Unavailable(PairFailure::Transient(err)),
        };

        if candles.len() < limit {
            return PairSnapshot::Unavailable(PairFailure::InsufficientHistory {
                have: candles.len().saturating_sub(1),
                need: self.ma_period,
            });
        }

        // Exclude the forming candle from the average.
        let closed = &candles[candles.len() - limit..candles.len() - 1];
        let moving_average = closed.iter().map(|c| c.close).sum::<f64>() / closed.len() as f64;
        let price = candles
            .last()
            .map(|c| c.close)
            .unwrap_or(moving_average);

        PairSnapshot::Available(PairQuote {
            price,
            moving_average,
            observed_at: Utc::now(),
        })
    }

    /// Fetch all pairs sequentially, collecting per-pair outcomes.
    pub async fn fetch_all(&self, pairs: &[TradingPair]) -> HashMap<TradingPair, PairSnapshot> {
        let mut snapshots = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            let snapshot = self.fetch_pair(pair).await;
            if let PairSnapshot::Unavailable(failure) = &snapshot {
                warn!(pair = %pair, ?failure, "Pair unavailable this pass");
            }
            snapshots.insert(pair.clone(), snapshot);
        }
        snapshots
    }
}
