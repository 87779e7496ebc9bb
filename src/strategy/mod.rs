//! Signal generation.
//!
//! Pure mean-reversion logic: classify each coin's deviation from its
//! moving average into a directional signal with a speed tier.

pub mod signal;

pub use signal::{classify, Thresholds};
