//! Reservoir safety interlock and alert rate limiting.
//!
//! The interlock is the last word on every valve actuation: no schedule,
//! manual press or sensor reading can open a valve while the shared
//! reservoir is at or below the threshold.

use std::collections::HashMap;

use crate::domain::RoomId;

/// Valves may only open while the reservoir is strictly above this (%).
pub const RESERVOIR_INTERLOCK_PCT: f64 = 5.0;
/// Reservoir consumed per open valve per minute (%)
pub const RESERVOIR_DRAIN_PER_MIN: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReservoirInterlock;

impl ReservoirInterlock {
    pub fn permits(&self, reservoir_level: f64) -> bool {
        reservoir_level > RESERVOIR_INTERLOCK_PCT
    }

    /// Reservoir after `open_valves` have run for `minutes`, floored at zero.
    pub fn drain(&self, reservoir_level: f64, open_valves: usize, minutes: f64) -> f64 {
        (reservoir_level - RESERVOIR_DRAIN_PER_MIN * open_valves as f64 * minutes).max(0.0)
    }
}

/// Emits at most one alert per room per window of virtual time.
#[derive(Debug, Clone)]
pub struct AlertLimiter {
    interval_min: f64,
    last_alert_min: HashMap<RoomId, f64>,
}

impl AlertLimiter {
    pub fn new(interval_min: f64) -> Self {
        Self {
            interval_min: interval_min.max(0.0),
            last_alert_min: HashMap::new(),
        }
    }

    /// Returns true if an alert for `room` may be emitted at `now_min`
    /// (monotonic elapsed minutes), and records it.
    pub fn should_alert(&mut self, room: RoomId, now_min: f64) -> bool {
        match self.last_alert_min.get(&room) {
            Some(&last) if now_min - last < self.interval_min => false,
            _ => {
                self.last_alert_min.insert(room, now_min);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_alert_min.clear();
    }
}
