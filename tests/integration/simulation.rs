//! Full-cycle simulations against the scripted exchange.

use std::sync::Arc;

use pegbot::config::{AgentConfig, AppConfig, ExchangeConfig, TradingConfig};
use pegbot::engine::{CycleOutcome, SessionError, TradingEngine};
use pegbot::engine::health::HealthState;
use pegbot::status::{SharedView, StatusFeed, StatusUpdate};
use pegbot::types::{ExchangeError, OrderSide, TradingPair};

use crate::mock_exchange::ScriptedExchange;

const MA_PERIOD: usize = 3;

fn test_config(pairs: &[&str]) -> AppConfig {
    AppConfig {
        agent: AgentConfig {
            name: "PEGBOT-TEST".to_string(),
        },
        exchange: ExchangeConfig {
            base_url: "http://localhost:9".to_string(),
            recv_window_ms: 5000,
        },
        trading: TradingConfig {
            poll_interval_secs: 5,
            rebalance_cooldown_secs: 3600,
            ma_period: MA_PERIOD,
            candle_interval: "4h".to_string(),
            deviation_threshold: 0.0001,
            aggressive_breakpoint: 0.0005,
            conservative_trade_fraction: 0.10,
            quote_asset: "USDT".to_string(),
            supported_coins: vec![
                "USDT".to_string(),
                "USDC".to_string(),
                "FDUSD".to_string(),
                "DAI".to_string(),
            ],
            pairs: pairs.iter().map(|p| p.parse::<TradingPair>().unwrap()).collect(),
        },
    }
}

fn engine_for(
    exchange: &Arc<ScriptedExchange>,
    cfg: &AppConfig,
) -> (TradingEngine, tokio::sync::mpsc::Receiver<StatusUpdate>) {
    let (feed, rx) = StatusFeed::channel();
    let engine = TradingEngine::new(exchange.clone(), cfg, SharedView::new(), feed);
    (engine, rx)
}

#[tokio::test]
async fn test_rebalance_sells_rich_and_buys_cheap() {
    let exchange = Arc::new(ScriptedExchange::new());
    // DAI trades rich (aggressive), USDC trades cheap (aggressive).
    exchange.script_flat_history("DAIUSDT", 1.0, 1.0006, MA_PERIOD);
    exchange.script_flat_history("USDCUSDT", 1.0, 0.999, MA_PERIOD);
    exchange.set_balance("DAI", 100.0);
    exchange.set_balance("USDT", 0.0);

    let cfg = test_config(&["DAI/USDT", "USDC/USDT"]);
    let (mut engine, _rx) = engine_for(&exchange, &cfg);
    engine.start().await.unwrap();

    // One cross conversion: a sell leg and a buy leg.
    let outcome = engine.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Rebalanced { orders: 1 });

    let orders = exchange.recorded_orders();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].symbol, "DAIUSDT");
    assert_eq!(orders[0].side, OrderSide::Sell);
    // Aggressive tier sells half the balance.
    assert_eq!(orders[0].quantity, 50.0);
    assert_eq!(orders[1].symbol, "USDCUSDT");
    assert_eq!(orders[1].side, OrderSide::Buy);

    assert_eq!(exchange.balance("DAI"), 50.0);
    assert!(exchange.balance("USDC") > 49.0);
}

#[tokio::test]
async fn test_cooldown_blocks_second_pass() {
    let exchange = Arc::new(ScriptedExchange::new());
    exchange.script_flat_history("DAIUSDT", 1.0, 1.0006, MA_PERIOD);
    exchange.set_balance("DAI", 100.0);

    let cfg = test_config(&["DAI/USDT"]);
    let (mut engine, _rx) = engine_for(&exchange, &cfg);
    engine.start().await.unwrap();

    // No below coin, so the rich coin just sells into the quote asset.
    let first = engine.run_cycle().await.unwrap();
    assert_eq!(first, CycleOutcome::Rebalanced { orders: 1 });
    assert_eq!(exchange.recorded_orders().len(), 1);

    // Still rich, but the cooldown window is open.
    let second = engine.run_cycle().await.unwrap();
    assert_eq!(second, CycleOutcome::Observed);
    assert_eq!(exchange.recorded_orders().len(), 1);
}

#[tokio::test]
async fn test_due_neutral_cycle_still_resets_cooldown() {
    let exchange = Arc::new(ScriptedExchange::new());
    exchange.script_flat_history("DAIUSDT", 1.0, 1.0, MA_PERIOD);
    exchange.set_balance("DAI", 100.0);

    let cfg = test_config(&["DAI/USDT"]);
    let (mut engine, _rx) = engine_for(&exchange, &cfg);
    engine.start().await.unwrap();

    // All-neutral but due: the cooldown window restarts anyway.
    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::Observed);

    // A signal appearing moments later waits out the fresh window.
    exchange.script_flat_history("DAIUSDT", 1.0, 1.0006, MA_PERIOD);
    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::Observed);
    assert!(exchange.recorded_orders().is_empty());
}

#[tokio::test]
async fn test_cycle_refreshes_balances_into_view() {
    let exchange = Arc::new(ScriptedExchange::new());
    exchange.script_flat_history("DAIUSDT", 1.0, 1.0, MA_PERIOD);
    exchange.set_balance("DAI", 100.0);

    let cfg = test_config(&["DAI/USDT"]);
    let view = SharedView::new();
    let (feed, _rx) = StatusFeed::channel();
    let mut engine = TradingEngine::new(exchange.clone(), &cfg, view.clone(), feed);
    engine.start().await.unwrap();
    assert_eq!(view.balances().get("DAI"), Some(&100.0));

    // A deposit landing mid-session shows up after the next cycle.
    exchange.set_balance("DAI", 42.0);
    engine.run_cycle().await.unwrap();
    assert_eq!(view.balances().get("DAI"), Some(&42.0));
}

#[tokio::test]
async fn test_rich_quote_asset_is_held_not_spent() {
    let exchange = Arc::new(ScriptedExchange::new());
    // The quote asset itself trades rich while USDC trades cheap.
    exchange.script_flat_history("USDTUSDT", 1.0, 1.0006, MA_PERIOD);
    exchange.script_flat_history("USDCUSDT", 1.0, 0.999, MA_PERIOD);
    exchange.set_balance("USDT", 100.0);

    let cfg = test_config(&["USDT/USDT", "USDC/USDT"]);
    let (mut engine, _rx) = engine_for(&exchange, &cfg);
    engine.start().await.unwrap();

    let outcome = engine.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Rebalanced { orders: 0 });
    assert!(exchange.recorded_orders().is_empty());
    assert_eq!(exchange.balance("USDT"), 100.0);
}

#[tokio::test]
async fn test_neutral_market_places_no_orders() {
    let exchange = Arc::new(ScriptedExchange::new());
    exchange.script_flat_history("DAIUSDT", 1.0, 1.00005, MA_PERIOD);
    exchange.script_flat_history("USDCUSDT", 1.0, 0.99995, MA_PERIOD);
    exchange.set_balance("DAI", 100.0);
    exchange.set_balance("USDT", 100.0);

    let cfg = test_config(&["DAI/USDT", "USDC/USDT"]);
    let (mut engine, _rx) = engine_for(&exchange, &cfg);
    engine.start().await.unwrap();

    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::Observed);
    assert!(exchange.recorded_orders().is_empty());
}

#[tokio::test]
async fn test_conservative_tier_sells_small_fraction() {
    let exchange = Arc::new(ScriptedExchange::new());
    // Deviation of 0.0003: flagged, but inside the aggressive breakpoint.
    exchange.script_flat_history("DAIUSDT", 1.0, 1.0003, MA_PERIOD);
    exchange.set_balance("DAI", 100.0);

    let cfg = test_config(&["DAI/USDT"]);
    let (mut engine, _rx) = engine_for(&exchange, &cfg);
    engine.start().await.unwrap();

    engine.run_cycle().await.unwrap();
    let orders = exchange.recorded_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].quantity, 10.0);
}

#[tokio::test]
async fn test_unlisted_pairs_are_dropped_at_startup() {
    let exchange = Arc::new(ScriptedExchange::new());
    exchange.script_flat_history("DAIUSDT", 1.0, 1.0, MA_PERIOD);
    // USDCUSDT is never listed.
    exchange.set_balance("USDT", 100.0);

    let cfg = test_config(&["DAI/USDT", "USDC/USDT"]);
    let (mut engine, _rx) = engine_for(&exchange, &cfg);
    engine.start().await.unwrap();

    // Only the listed pair is polled; the cycle completes without error.
    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::Observed);
}

#[tokio::test]
async fn test_invalid_symbol_disables_pair_for_session() {
    let exchange = Arc::new(ScriptedExchange::new());
    exchange.script_flat_history("DAIUSDT", 1.0, 1.0, MA_PERIOD);
    // Listed in exchange info, but every market-data call rejects it.
    exchange.list_symbol("USDCUSDT");
    exchange.set_balance("USDT", 100.0);

    let cfg = test_config(&["DAI/USDT", "USDC/USDT"]);
    let (mut engine, mut rx) = engine_for(&exchange, &cfg);
    engine.start().await.unwrap();

    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::Observed);

    let mut disabled = false;
    while let Ok(update) = rx.try_recv() {
        if let StatusUpdate::Message(msg) = update {
            if msg.contains("USDC/USDT") && msg.contains("disabled") {
                disabled = true;
            }
        }
    }
    assert!(disabled);
}

#[tokio::test]
async fn test_startup_fails_with_no_tradeable_pairs() {
    let exchange = Arc::new(ScriptedExchange::new());
    exchange.set_balance("USDT", 100.0);

    let cfg = test_config(&["DAI/USDT", "USDC/USDT"]);
    let (mut engine, _rx) = engine_for(&exchange, &cfg);

    assert!(matches!(
        engine.start().await,
        Err(SessionError::NoValidPairs)
    ));
}

#[tokio::test]
async fn test_credential_rejection_terminates_session() {
    let exchange = Arc::new(ScriptedExchange::new());
    exchange.script_flat_history("DAIUSDT", 1.0, 1.0, MA_PERIOD);
    exchange.set_balance("USDT", 100.0);

    let cfg = test_config(&["DAI/USDT"]);
    let (mut engine, mut rx) = engine_for(&exchange, &cfg);
    engine.start().await.unwrap();

    exchange.set_error(ExchangeError::InvalidCredentials("key revoked".to_string()));
    assert!(matches!(
        engine.run_cycle().await,
        Err(SessionError::Credentials(_))
    ));

    // The alert reaches the status feed before the session ends.
    let mut alerted = false;
    while let Ok(update) = rx.try_recv() {
        if matches!(update, StatusUpdate::CredentialAlert { .. }) {
            alerted = true;
        }
    }
    assert!(alerted);
}

#[tokio::test(start_paused = true)]
async fn test_outage_pauses_then_probe_recovers() {
    let exchange = Arc::new(ScriptedExchange::new());
    exchange.script_flat_history("DAIUSDT", 1.0, 1.0, MA_PERIOD);
    exchange.set_balance("USDT", 100.0);

    let cfg = test_config(&["DAI/USDT"]);
    let (mut engine, _rx) = engine_for(&exchange, &cfg);
    engine.start().await.unwrap();

    exchange.set_error(ExchangeError::NetworkUnreachable("down".to_string()));
    for _ in 0..5 {
        assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::NoData);
    }
    assert_eq!(engine.health_state(), HealthState::Paused);

    // While still down, the probe fails and the pause holds.
    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::Paused);

    exchange.clear_error();
    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::Observed);
    assert_eq!(engine.health_state(), HealthState::Connected);
}
