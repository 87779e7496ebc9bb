//! Core engine — the poll → classify → rebalance loop.

pub mod converter;
pub mod health;
pub mod ledger;
pub mod poller;
pub mod scheduler;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::exchange::SpotExchange;
use crate::status::{SharedView, StatusFeed, StatusUpdate};
use crate::strategy::{self, Thresholds};
use crate::types::{ConvertError, Signal, SpeedTier, TradingPair, MIN_LOT};

use converter::OrderExecutor;
use health::{HealthState, NetworkHealthMonitor};
use ledger::BalanceLedger;
use poller::{MarketDataPoller, PairFailure, PairSnapshot};
use scheduler::RebalanceScheduler;

/// Delay between cycles while the network monitor is paused.
const PAUSE_INTERVAL: Duration = Duration::from_secs(60);

/// Errors that end the trading session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("exchange rejected credentials: {0}")]
    Credentials(String),
    #[error("none of the configured pairs trade on the exchange")]
    NoValidPairs,
    #[error("startup failed: {0}")]
    Startup(#[from] crate::types::ExchangeError),
}

/// What a single cycle did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Paused and the recovery probe failed.
    Paused,
    /// Probe failed or no pair yielded a quote.
    NoData,
    /// Quotes gathered, no pass attempted (cooldown or all neutral).
    Observed,
    /// A rebalance pass ran.
    Rebalanced { orders: usize },
}

pub struct TradingEngine {
    exchange: Arc<dyn SpotExchange>,
    pairs: Vec<TradingPair>,
    quote_asset: String,
    thresholds: Thresholds,
    conservative_fraction: f64,
    poll_interval: Duration,
    poller: MarketDataPoller,
    ledger: BalanceLedger,
    executor: OrderExecutor,
    scheduler: RebalanceScheduler,
    health: NetworkHealthMonitor,
    view: SharedView,
    feed: StatusFeed,
}

impl TradingEngine {
    pub fn new(
        exchange: Arc<dyn SpotExchange>,
        cfg: &AppConfig,
        view: SharedView,
        feed: StatusFeed,
    ) -> Self {
        let trading = &cfg.trading;
        let probe_symbol = trading
            .pairs
            .first()
            .map(|p| p.symbol())
            .unwrap_or_else(|| format!("USDC{}", trading.quote_asset));

        Self {
            pairs: trading.pairs.clone(),
            quote_asset: trading.quote_asset.clone(),
            thresholds: Thresholds {
                deviation: trading.deviation_threshold,
                aggressive_breakpoint: trading.aggressive_breakpoint,
            },
            conservative_fraction: trading.conservative_trade_fraction,
            poll_interval: Duration::from_secs(trading.poll_interval_secs),
            poller: MarketDataPoller::new(
                exchange.clone(),
                trading.candle_interval.clone(),
                trading.ma_period,
            ),
            ledger: BalanceLedger::new(exchange.clone(), trading.supported_coins.clone()),
            executor: OrderExecutor::new(exchange.clone(), trading.quote_asset.clone()),
            scheduler: RebalanceScheduler::new(trading.rebalance_cooldown_secs),
            health: NetworkHealthMonitor::new(exchange.clone(), probe_symbol),
            exchange,
            view,
            feed,
        }
    }

    /// Validate configured pairs against the exchange and take the first
    /// balance snapshot. Pairs the exchange doesn't list are dropped; a
    /// session with no tradeable pair refuses to start.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let listed = self.exchange.exchange_symbols().await?;

        let before = self.pairs.len();
        self.pairs.retain(|pair| {
            let ok = listed.contains(&pair.symbol());
            if !ok {
                warn!(pair = %pair, "Pair not listed on exchange, dropping");
            }
            ok
        });
        if self.pairs.is_empty() {
            return Err(SessionError::NoValidPairs);
        }
        info!(
            tradeable = self.pairs.len(),
            dropped = before - self.pairs.len(),
            "Pair validation complete"
        );

        match self.ledger.refresh().await {
            Ok(()) => {
                self.view
                    .set_balances(self.ledger.snapshot(), Utc::now());
            }
            Err(err) if err.is_credential() => {
                self.alert_credentials(&err.to_string());
                return Err(SessionError::Credentials(err.to_string()));
            }
            Err(err) => return Err(SessionError::Startup(err)),
        }
        Ok(())
    }

    pub fn health_state(&self) -> HealthState {
        self.health.state()
    }

    fn alert_credentials(&self, detail: &str) {
        error!(detail, "Credentials rejected, terminating session");
        self.feed.publish(StatusUpdate::CredentialAlert {
            detail: detail.to_string(),
        });
    }

    fn publish_health(&self) {
        self.feed.publish(StatusUpdate::Health {
            state: self.health.state().to_string(),
            failures: self.health.failures(),
        });
    }

    fn fraction_for(&self, tier: SpeedTier) -> f64 {
        tier.fraction(self.conservative_fraction)
    }

    /// One full cycle: probe, poll, classify, and rebalance when due.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, SessionError> {
        // -- Connectivity probe --------------------------------------------

        let was_paused = self.health.state() == HealthState::Paused;
        if let Err(err) = self.health.probe().await {
            if err.is_credential() {
                self.alert_credentials(&err.to_string());
                return Err(SessionError::Credentials(err.to_string()));
            }
            self.health.record_failure();
            self.publish_health();
            return Ok(if was_paused {
                CycleOutcome::Paused
            } else {
                CycleOutcome::NoData
            });
        }
        if was_paused {
            self.publish_health();
        }

        // -- Balances ------------------------------------------------------

        match self.ledger.refresh().await {
            Ok(()) => {
                self.view.set_balances(self.ledger.snapshot(), Utc::now());
                self.feed.publish(StatusUpdate::Balances {
                    balances: self.ledger.snapshot(),
                    at: Utc::now(),
                });
            }
            Err(err) if err.is_credential() => {
                self.alert_credentials(&err.to_string());
                return Err(SessionError::Credentials(err.to_string()));
            }
            // Stale balances are still usable; sizing re-checks at order time.
            Err(err) => warn!(error = %err, "Balance refresh failed, keeping last snapshot"),
        }

        // -- Market data ---------------------------------------------------

        let snapshots = self.poller.fetch_all(&self.pairs).await;

        let mut quotes = HashMap::new();
        let mut invalid: Vec<TradingPair> = Vec::new();
        for (pair, snapshot) in &snapshots {
            match snapshot {
                PairSnapshot::Available(quote) => {
                    quotes.insert(pair.clone(), quote.clone());
                }
                PairSnapshot::Unavailable(PairFailure::InvalidCredentials(detail)) => {
                    self.alert_credentials(detail);
                    return Err(SessionError::Credentials(detail.clone()));
                }
                PairSnapshot::Unavailable(PairFailure::InvalidSymbol) => {
                    invalid.push(pair.clone());
                }
                PairSnapshot::Unavailable(_) => {}
            }
        }

        // An invalid symbol stays invalid; drop the pair for the session.
        for pair in invalid {
            warn!(pair = %pair, "Symbol rejected by exchange, disabling pair");
            self.feed
                .publish(StatusUpdate::Message(format!("Pair {pair} disabled")));
            self.pairs.retain(|p| p != &pair);
        }

        if quotes.is_empty() {
            return Ok(CycleOutcome::NoData);
        }

        self.view.set_quotes(quotes.clone());
        self.feed.publish(StatusUpdate::Prices {
            quotes: quotes.clone(),
            at: Utc::now(),
        });

        // -- Signals -------------------------------------------------------

        let signals: Vec<Signal> = self
            .pairs
            .iter()
            .filter_map(|pair| quotes.get(pair).map(|q| (pair, q)))
            .map(|(pair, quote)| {
                strategy::classify(&pair.base, quote.price, quote.moving_average, &self.thresholds)
            })
            .collect();

        let now = Utc::now();
        if !self.scheduler.due(now) {
            return Ok(CycleOutcome::Observed);
        }

        // -- Rebalance pass ------------------------------------------------

        // The window restarts on every due cycle, tradeable signals or not.
        self.scheduler.begin_pass(now);

        let (above, below) = scheduler::partition(&signals);
        if above.is_empty() && below.is_empty() {
            return Ok(CycleOutcome::Observed);
        }
        info!(above = above.len(), below = below.len(), "Rebalance pass starting");

        let mut orders = 0;

        // Each above-average coin gets one attempt: a cross into the
        // first below-average coin, or a plain sell when nothing is below.
        for signal in &above {
            if signal.coin == self.quote_asset {
                continue;
            }
            let fraction = self.fraction_for(signal.tier);
            let target = below.first().map(|s| s.coin.clone());
            let to = target.as_deref().unwrap_or(&self.quote_asset);

            match self
                .executor
                .convert(&mut self.ledger, &signal.coin, to, fraction, &quotes)
                .await
            {
                Ok(conversion) => {
                    orders += 1;
                    self.feed.publish(StatusUpdate::Trade(conversion));
                }
                Err(err) => {
                    if self.handle_convert_error(signal, err)? {
                        orders += 1;
                    }
                }
            }
        }

        // Spend resting quote balance on below-average coins, re-reading
        // the balance each time since earlier buys consume it. When the
        // quote asset itself trades rich, hold it instead.
        if !above.iter().any(|s| s.coin == self.quote_asset) {
            for signal in &below {
                if signal.coin == self.quote_asset || self.ledger.get(&self.quote_asset) < MIN_LOT {
                    continue;
                }
                let fraction = self.fraction_for(signal.tier);
                match self
                    .executor
                    .convert(&mut self.ledger, &self.quote_asset, &signal.coin, fraction, &quotes)
                    .await
                {
                    Ok(conversion) => {
                        orders += 1;
                        self.feed.publish(StatusUpdate::Trade(conversion));
                    }
                    Err(err) => {
                        if self.handle_convert_error(signal, err)? {
                            orders += 1;
                        }
                    }
                }
            }
        }

        self.view.set_balances(self.ledger.snapshot(), Utc::now());
        self.feed.publish(StatusUpdate::Balances {
            balances: self.ledger.snapshot(),
            at: Utc::now(),
        });

        Ok(CycleOutcome::Rebalanced { orders })
    }

    /// Classify a conversion failure. Returns whether an order filled
    /// anyway (partial conversions completed their sell leg). Credential
    /// rejections end the session.
    fn handle_convert_error(
        &self,
        signal: &Signal,
        err: ConvertError,
    ) -> Result<bool, SessionError> {
        match &err {
            ConvertError::Exchange(ex) if ex.is_credential() => {
                self.alert_credentials(&ex.to_string());
                return Err(SessionError::Credentials(ex.to_string()));
            }
            ConvertError::PartialConversion { cause, .. } => {
                if let ConvertError::Exchange(ex) = cause.as_ref() {
                    if ex.is_credential() {
                        self.alert_credentials(&ex.to_string());
                        return Err(SessionError::Credentials(ex.to_string()));
                    }
                }
            }
            _ => {}
        }

        let partial = matches!(err, ConvertError::PartialConversion { .. });
        warn!(coin = %signal.coin, error = %err, "Conversion skipped");
        self.feed.publish(StatusUpdate::Skipped {
            coin: signal.coin.clone(),
            direction: signal.direction,
            reason: err.to_string(),
        });
        Ok(partial)
    }

    /// Main loop. Checks the shutdown flag between cycles so an in-flight
    /// order is never abandoned mid-leg.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<(), SessionError> {
        info!(
            poll_secs = self.poll_interval.as_secs(),
            pairs = self.pairs.len(),
            "Entering trading loop"
        );

        while !shutdown.load(Ordering::Relaxed) {
            match self.run_cycle().await {
                Ok(outcome) => {
                    if let CycleOutcome::Rebalanced { orders } = outcome {
                        info!(orders, "Rebalance pass complete");
                    }
                }
                Err(err) => return Err(err),
            }

            let delay = if self.health.state() == HealthState::Paused {
                PAUSE_INTERVAL
            } else {
                self.poll_interval
            };
            tokio::time::sleep(delay).await;
        }

        info!("Shutdown flag set, leaving trading loop");
        Ok(())
    }
}
