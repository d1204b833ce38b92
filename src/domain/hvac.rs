use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HvacMode {
    Idle,
    Cooling,
    Heating,
    LockedOut,
}

/// Thermal controller state of one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HvacState {
    pub mode: HvacMode,
    pub cool_relay: bool,
    pub heat_relay: bool,
    /// Elapsed simulation minute at which a relay last switched off
    pub last_cycle_off_time_min: Option<f64>,
    pub lockout_remaining_min: f64,
    pub diagnostic: String,
}

impl HvacState {
    pub fn startup() -> Self {
        Self {
            mode: HvacMode::Idle,
            cool_relay: false,
            heat_relay: false,
            last_cycle_off_time_min: None,
            lockout_remaining_min: 0.0,
            diagnostic: "SYSTEM STARTUP".to_string(),
        }
    }

    pub fn needs_cooling(&self) -> bool {
        self.cool_relay
    }
}

impl Default for HvacState {
    fn default() -> Self {
        Self::startup()
    }
}
