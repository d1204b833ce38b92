use serde::{Deserialize, Serialize};

/// Fault-injection switches. Nothing here is applied unless `enabled`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChaosSettings {
    pub enabled: bool,
    /// Drift amplitude in percent (0-50)
    pub sensor_drift: f64,
    pub sensor_failure: bool,
    pub valve_stuck_open: bool,
    pub flood_active: bool,
    pub blackout_active: bool,
}

impl ChaosSettings {
    pub fn apply_patch(&mut self, patch: &ChaosPatch) {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(drift) = patch.sensor_drift {
            self.sensor_drift = if drift.is_finite() { drift.clamp(0.0, 50.0) } else { 0.0 };
        }
        if let Some(failure) = patch.sensor_failure {
            self.sensor_failure = failure;
        }
        if let Some(stuck) = patch.valve_stuck_open {
            self.valve_stuck_open = stuck;
        }
        if let Some(flood) = patch.flood_active {
            self.flood_active = flood;
        }
        if let Some(blackout) = patch.blackout_active {
            self.blackout_active = blackout;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChaosPatch {
    pub enabled: Option<bool>,
    pub sensor_drift: Option<f64>,
    pub sensor_failure: Option<bool>,
    pub valve_stuck_open: Option<bool>,
    pub flood_active: Option<bool>,
    pub blackout_active: Option<bool>,
}
