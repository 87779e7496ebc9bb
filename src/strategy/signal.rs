//! Deviation classification.

use crate::types::{Direction, Signal, SpeedTier};
use tracing::debug;

/// Deviation cutoffs, both expressed as fractions of the moving average.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// Minimum absolute deviation for a signal to fire at all.
    pub deviation: f64,
    /// Absolute deviation beyond which the aggressive tier applies.
    pub aggressive_breakpoint: f64,
}

/// Classify a coin's price against its moving average.
///
/// Deviation is `(price - ma) / ma`. Deviations at or inside the
/// threshold are neutral. Beyond it, the sign picks the direction and
/// the magnitude picks the tier; the breakpoint itself is still
/// conservative.
pub fn classify(coin: &str, price: f64, moving_average: f64, thresholds: &Thresholds) -> Signal {
    let deviation = (price - moving_average) / moving_average;
    let magnitude = deviation.abs();

    let direction = if magnitude <= thresholds.deviation {
        Direction::Neutral
    } else if deviation > 0.0 {
        Direction::Above
    } else {
        Direction::Below
    };

    let tier = if magnitude > thresholds.aggressive_breakpoint {
        SpeedTier::Aggressive
    } else {
        SpeedTier::Conservative
    };

    debug!(coin, price, moving_average, deviation, %direction, "Classified");

    Signal {
        coin: coin.to_string(),
        direction,
        deviation,
        tier,
    }
}
