//! Exchange integration.
//!
//! Defines the `SpotExchange` trait and provides the Binance spot
//! implementation plus a transient-error retry policy.

pub mod binance;
pub mod retry;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::types::{Candle, ExchangeError, LotFilter, OrderFill, OrderSide};

pub use binance::BinanceSpot;
pub use retry::RetryPolicy;

/// Abstraction over a spot exchange account.
///
/// Implementors provide market data, account balances, and market-order
/// execution. All methods return the shared [`ExchangeError`] taxonomy so
/// callers can classify failures uniformly.
#[async_trait]
pub trait SpotExchange: Send + Sync {
    /// Free balances for every asset in the account, keyed by asset code.
    async fn account_balances(&self) -> Result<HashMap<String, f64>, ExchangeError>;

    /// Most recent `limit` candles for a symbol, oldest first.
    /// The final candle is the still-forming one.
    async fn candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// All symbols currently tradeable on the exchange.
    async fn exchange_symbols(&self) -> Result<HashSet<String>, ExchangeError>;

    /// Lot-size constraints for a symbol.
    async fn lot_filter(&self, symbol: &str) -> Result<LotFilter, ExchangeError>;

    /// Place a market order for `quantity` of the base asset.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderFill, ExchangeError>;

    /// Lightweight connectivity probe.
    async fn ping(&self) -> Result<(), ExchangeError>;

    /// Latest traded price for a symbol.
    async fn ticker_price(&self, symbol: &str) -> Result<f64, ExchangeError>;

    /// Exchange name for logging.
    fn name(&self) -> &str;
}

#[cfg(test)]
mockall::mock! {
    pub Exchange {}

    #[async_trait]
    impl SpotExchange for Exchange {
        async fn account_balances(&self) -> Result<HashMap<String, f64>, ExchangeError>;
        async fn candles(
            &self,
            symbol: &str,
            interval: &str,
            limit: usize,
        ) -> Result<Vec<Candle>, ExchangeError>;
        async fn exchange_symbols(&self) -> Result<HashSet<String>, ExchangeError>;
        async fn lot_filter(&self, symbol: &str) -> Result<LotFilter, ExchangeError>;
        async fn place_market_order(
            &self,
            symbol: &str,
            side: OrderSide,
            quantity: f64,
        ) -> Result<OrderFill, ExchangeError>;
        async fn ping(&self) -> Result<(), ExchangeError>;
        async fn ticker_price(&self, symbol: &str) -> Result<f64, ExchangeError>;
        fn name(&self) -> &str;
    }
}
