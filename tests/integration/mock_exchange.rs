//! Scripted exchange for integration testing.
//!
//! A deterministic `SpotExchange` implementation backed by in-memory
//! balances and per-symbol candle scripts. Market orders fill at the
//! latest scripted close and move balances accordingly, so full engine
//! cycles run with no external dependencies.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use pegbot::exchange::SpotExchange;
use pegbot::types::{Candle, ExchangeError, LotFilter, OrderFill, OrderSide};

/// One recorded market order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
}

/// A scripted spot exchange. All state is in-memory and fully
/// controllable from test code.
pub struct ScriptedExchange {
    balances: Arc<Mutex<HashMap<String, f64>>>,
    candles: Mutex<HashMap<String, Vec<Candle>>>,
    listed: Mutex<HashSet<String>>,
    orders: Arc<Mutex<Vec<RecordedOrder>>>,
    /// If set, all operations return a clone of this error.
    force_error: Mutex<Option<ExchangeError>>,
    next_order_id: AtomicU64,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self {
            balances: Arc::new(Mutex::new(HashMap::new())),
            candles: Mutex::new(HashMap::new()),
            listed: Mutex::new(HashSet::new()),
            orders: Arc::new(Mutex::new(Vec::new())),
            force_error: Mutex::new(None),
            next_order_id: AtomicU64::new(1),
        }
    }

    pub fn set_balance(&self, coin: &str, amount: f64) {
        self.balances.lock().unwrap().insert(coin.to_string(), amount);
    }

    pub fn balance(&self, coin: &str) -> f64 {
        self.balances.lock().unwrap().get(coin).copied().unwrap_or(0.0)
    }

    /// List a symbol and script its history: `period` closed candles at
    /// `ma_close` followed by a forming candle at `last_close`.
    pub fn script_flat_history(&self, symbol: &str, ma_close: f64, last_close: f64, period: usize) {
        const FOUR_HOURS_MS: i64 = 4 * 3600 * 1000;
        let start: i64 = 1_700_000_000_000;
        let mut candles: Vec<Candle> = (0..period)
            .map(|i| Candle {
                open_time: start + FOUR_HOURS_MS * i as i64,
                open: ma_close,
                high: ma_close,
                low: ma_close,
                close: ma_close,
                volume: 10_000.0,
            })
            .collect();
        candles.push(Candle {
            open_time: start + FOUR_HOURS_MS * period as i64,
            open: last_close,
            high: last_close,
            low: last_close,
            close: last_close,
            volume: 10_000.0,
        });

        self.listed.lock().unwrap().insert(symbol.to_string());
        self.candles.lock().unwrap().insert(symbol.to_string(), candles);
    }

    /// List a symbol without scripting any candle history.
    pub fn list_symbol(&self, symbol: &str) {
        self.listed.lock().unwrap().insert(symbol.to_string());
    }

    /// Force all subsequent operations to fail.
    pub fn set_error(&self, err: ExchangeError) {
        *self.force_error.lock().unwrap() = Some(err);
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn recorded_orders(&self) -> Vec<RecordedOrder> {
        self.orders.lock().unwrap().clone()
    }

    fn check_error(&self) -> Result<(), ExchangeError> {
        match &*self.force_error.lock().unwrap() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn last_close(&self, symbol: &str) -> Result<f64, ExchangeError> {
        self.candles
            .lock()
            .unwrap()
            .get(symbol)
            .and_then(|c| c.last())
            .map(|c| c.close)
            .ok_or_else(|| ExchangeError::InvalidSymbol(symbol.to_string()))
    }
}

impl Default for ScriptedExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpotExchange for ScriptedExchange {
    async fn account_balances(&self) -> Result<HashMap<String, f64>, ExchangeError> {
        self.check_error()?;
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn candles(
        &self,
        symbol: &str,
        _interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.check_error()?;
        let candles = self.candles.lock().unwrap();
        let script = candles
            .get(symbol)
            .ok_or_else(|| ExchangeError::InvalidSymbol(symbol.to_string()))?;
        let start = script.len().saturating_sub(limit);
        Ok(script[start..].to_vec())
    }

    async fn exchange_symbols(&self) -> Result<HashSet<String>, ExchangeError> {
        self.check_error()?;
        Ok(self.listed.lock().unwrap().clone())
    }

    async fn lot_filter(&self, _symbol: &str) -> Result<LotFilter, ExchangeError> {
        self.check_error()?;
        Ok(LotFilter::default())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderFill, ExchangeError> {
        self.check_error()?;
        let price = self.last_close(symbol)?;

        // Tests only use USDT-quoted symbols.
        let base = symbol.trim_end_matches("USDT").to_string();
        let quote_amount = quantity * price;

        {
            let mut balances = self.balances.lock().unwrap();
            let base_balance = balances.get(&base).copied().unwrap_or(0.0);
            let quote_balance = balances.get("USDT").copied().unwrap_or(0.0);
            match side {
                OrderSide::Sell => {
                    if base_balance < quantity {
                        return Err(ExchangeError::InsufficientBalance(base));
                    }
                    balances.insert(base.clone(), base_balance - quantity);
                    balances.insert("USDT".to_string(), quote_balance + quote_amount);
                }
                OrderSide::Buy => {
                    if quote_balance < quote_amount {
                        return Err(ExchangeError::InsufficientBalance("USDT".to_string()));
                    }
                    balances.insert(base.clone(), base_balance + quantity);
                    balances.insert("USDT".to_string(), quote_balance - quote_amount);
                }
            }
        }

        self.orders.lock().unwrap().push(RecordedOrder {
            symbol: symbol.to_string(),
            side,
            quantity,
        });

        Ok(OrderFill {
            order_id: self.next_order_id.fetch_add(1, Ordering::SeqCst),
            executed_qty: quantity,
            cumulative_quote_qty: quote_amount,
        })
    }

    async fn ping(&self) -> Result<(), ExchangeError> {
        self.check_error()
    }

    async fn ticker_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        self.check_error()?;
        self.last_close(symbol)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
