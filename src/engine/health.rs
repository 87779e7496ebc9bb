//! Network health tracking.
//!
//! Counts consecutive connectivity failures and pauses trading after a
//! run of them. While paused, a lightweight probe (ping plus one ticker
//! read) gates re-entry; any success clears the counter.

use std::sync::Arc;
use tracing::{info, warn};

use crate::exchange::SpotExchange;
use crate::types::ExchangeError;

/// Consecutive failures before the agent pauses.
const PAUSE_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Connected,
    /// Some failures, still trading.
    Degraded,
    /// Too many failures, trading suspended until a probe succeeds.
    Paused,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthState::Connected => "connected",
            HealthState::Degraded => "degraded",
            HealthState::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

pub struct NetworkHealthMonitor {
    exchange: Arc<dyn SpotExchange>,
    probe_symbol: String,
    consecutive_failures: u32,
}

impl NetworkHealthMonitor {
    pub fn new(exchange: Arc<dyn SpotExchange>, probe_symbol: String) -> Self {
        Self {
            exchange,
            probe_symbol,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> HealthState {
        match self.consecutive_failures {
            0 => HealthState::Connected,
            n if n < PAUSE_THRESHOLD => HealthState::Degraded,
            _ => HealthState::Paused,
        }
    }

    pub fn failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Record the outcome of a trading cycle.
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            info!(
                failures = self.consecutive_failures,
                "Connectivity recovered"
            );
        }
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        warn!(
            failures = self.consecutive_failures,
            threshold = PAUSE_THRESHOLD,
            "Connectivity failure recorded"
        );
        if self.state() == HealthState::Paused {
            warn!("Trading paused until connectivity probe succeeds");
        }
    }

    /// Active probe used while paused: ping plus one public ticker read.
    /// Success clears the failure counter.
    pub async fn probe(&mut self) -> Result<(), ExchangeError> {
        self.exchange.ping().await?;
        self.exchange.ticker_price(&self.probe_symbol).await?;
        self.record_success();
        Ok(())
    }
}
