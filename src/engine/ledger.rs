//! Account balance ledger.
//!
//! A local snapshot of exchange balances, refreshed explicitly. Reads
//! never hit the network; refreshes overwrite the whole snapshot so a
//! coin missing from the account reads as zero.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::exchange::{RetryPolicy, SpotExchange};
use crate::types::ExchangeError;

pub struct BalanceLedger {
    exchange: Arc<dyn SpotExchange>,
    coins: Vec<String>,
    balances: HashMap<String, f64>,
    refreshed_at: Option<DateTime<Utc>>,
    retry: RetryPolicy,
}

impl BalanceLedger {
    pub fn new(exchange: Arc<dyn SpotExchange>, coins: Vec<String>) -> Self {
        Self {
            exchange,
            coins,
            balances: HashMap::new(),
            refreshed_at: None,
            retry: RetryPolicy::transient(),
        }
    }

    /// Re-fetch account balances and replace the snapshot entirely.
    pub async fn refresh(&mut self) -> Result<(), ExchangeError> {
        let fetched = self
            .retry
            .run("account_balances", || self.exchange.account_balances())
            .await?;

        self.balances = self
            .coins
            .iter()
            .map(|coin| (coin.clone(), fetched.get(coin).copied().unwrap_or(0.0)))
            .collect();
        self.refreshed_at = Some(Utc::now());

        debug!(coins = self.balances.len(), "Balance snapshot refreshed");
        Ok(())
    }

    /// Free balance for a coin. Zero for anything not in the snapshot.
    pub fn get(&self, coin: &str) -> f64 {
        self.balances.get(coin).copied().unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.balances.clone()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }
}
