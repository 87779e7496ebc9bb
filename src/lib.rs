//! PEGBOT — unattended stablecoin mean-reversion rebalancing agent.
//!
//! Watches a set of stablecoin pairs on one spot exchange account,
//! classifies each coin's deviation from its moving average, and shifts
//! balance from rich coins to cheap ones through the quote asset.

pub mod config;
pub mod credentials;
pub mod engine;
pub mod exchange;
pub mod status;
pub mod strategy;
pub mod types;
