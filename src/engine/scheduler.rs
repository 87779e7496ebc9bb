//! Rebalance pass gating.
//!
//! A pass runs at most once per cooldown window. The window starts when
//! a pass begins, whether or not any order fills, so a pass that only
//! produced skips still backs off.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::types::{Direction, Signal};

pub struct RebalanceScheduler {
    cooldown: Duration,
    last_pass: Option<DateTime<Utc>>,
}

impl RebalanceScheduler {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown: Duration::seconds(cooldown_secs as i64),
            last_pass: None,
        }
    }

    /// Whether a pass may start at `now`.
    pub fn due(&self, now: DateTime<Utc>) -> bool {
        match self.last_pass {
            None => true,
            Some(last) => now - last >= self.cooldown,
        }
    }

    /// Mark a pass as started. Resets the window unconditionally.
    pub fn begin_pass(&mut self, now: DateTime<Utc>) {
        debug!(%now, "Rebalance pass starting, cooldown reset");
        self.last_pass = Some(now);
    }

    pub fn last_pass(&self) -> Option<DateTime<Utc>> {
        self.last_pass
    }
}

/// Split signals into above-average and below-average groups, preserving
/// the configured pair order. Neutral signals drop out.
pub fn partition(signals: &[Signal]) -> (Vec<Signal>, Vec<Signal>) {
    let mut above = Vec::new();
    let mut below = Vec::new();
    for signal in signals {
        match signal.direction {
            Direction::Above => above.push(signal.clone()),
            Direction::Below => below.push(signal.clone()),
            Direction::Neutral => {}
        }
    }
    (above, below)
}
