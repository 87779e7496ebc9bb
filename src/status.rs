//! Runtime status reporting.
//!
//! Two complementary surfaces: a bounded [`StatusFeed`] channel carrying
//! discrete events (trades, skips, health changes) and a [`SharedView`]
//! holding the latest prices and balances for point-in-time inspection.

use crate::types::{Conversion, Direction, PairQuote, TradingPair};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

/// Capacity of the status channel. Events beyond this are dropped,
/// never allowed to block the trading loop.
const FEED_CAPACITY: usize = 100;

// ---- Status events ----

#[derive(Debug, Clone)]
pub enum StatusUpdate {
    /// A completed market-data pass.
    Prices {
        quotes: HashMap<TradingPair, PairQuote>,
        at: DateTime<Utc>,
    },
    /// A completed balance refresh.
    Balances {
        balances: HashMap<String, f64>,
        at: DateTime<Utc>,
    },
    /// Connectivity state change.
    Health { state: String, failures: u32 },
    /// A completed conversion (either leg of a cross counts separately).
    Trade(Conversion),
    /// A coin was flagged by a signal but no order was placed.
    Skipped {
        coin: String,
        direction: Direction,
        reason: String,
    },
    /// Credentials were rejected by the exchange. Fatal.
    CredentialAlert { detail: String },
    /// Free-form progress note.
    Message(String),
}

// ---- Feed ----

/// Non-blocking producer handle for status events.
#[derive(Clone)]
pub struct StatusFeed {
    tx: mpsc::Sender<StatusUpdate>,
}

impl StatusFeed {
    pub fn channel() -> (Self, mpsc::Receiver<StatusUpdate>) {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        (Self { tx }, rx)
    }

    /// Publish an event, dropping it if the consumer has fallen behind.
    pub fn publish(&self, update: StatusUpdate) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(update) {
            warn!("Status feed full, dropping update");
        }
    }
}

// ---- Shared view ----

#[derive(Debug, Default)]
struct ViewInner {
    quotes: HashMap<TradingPair, PairQuote>,
    balances: HashMap<String, f64>,
    balances_at: Option<DateTime<Utc>>,
}

/// Latest observed market state, safe to read from any task. The lock
/// is only ever held for a copy, never across an await point.
#[derive(Clone, Default)]
pub struct SharedView {
    inner: Arc<Mutex<ViewInner>>,
}

impl SharedView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_quotes(&self, quotes: HashMap<TradingPair, PairQuote>) {
        self.inner.lock().unwrap().quotes = quotes;
    }

    pub fn set_balances(&self, balances: HashMap<String, f64>, at: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        inner.balances = balances;
        inner.balances_at = Some(at);
    }

    pub fn quotes(&self) -> HashMap<TradingPair, PairQuote> {
        self.inner.lock().unwrap().quotes.clone()
    }

    pub fn balances(&self) -> HashMap<String, f64> {
        self.inner.lock().unwrap().balances.clone()
    }

    pub fn balances_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().unwrap().balances_at
    }
}
