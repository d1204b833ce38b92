use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::ConfigError;

/// Per-room control configuration. Durations are minutes unless noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_room_config"))]
pub struct RoomConfig {
    #[validate(range(min = 0.0, max = 23.99))]
    pub lights_on_hour: f64,
    /// Photoperiod in hours
    #[validate(range(min = 0.0, max = 24.0))]
    pub day_length: f64,

    // Irrigation
    #[validate(range(min = 0.0))]
    pub p0_duration: f64,
    #[validate(range(min = 0.0))]
    pub p1_duration: f64,
    #[validate(range(min = 0.1))]
    pub p1_interval: f64,
    /// Explicit P1 shot count; derived from duration/interval when unset
    pub p1_shots: Option<u32>,
    #[validate(range(min = 0.1))]
    pub p2_interval: f64,
    #[validate(range(min = 0.0))]
    pub p2_cutoff: f64,
    /// Shot length in seconds
    #[validate(range(min = 0.0, max = 3600.0))]
    pub shot_duration: f64,

    // HVAC, synced to lights (°F)
    #[validate(range(min = 32.0, max = 120.0))]
    pub day_temp_low: f64,
    #[validate(range(min = 32.0, max = 120.0))]
    pub day_temp_high: f64,
    #[validate(range(min = 32.0, max = 120.0))]
    pub night_temp_low: f64,
    #[validate(range(min = 32.0, max = 120.0))]
    pub night_temp_high: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub day_rh_target: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub night_rh_target: f64,
    #[validate(range(min = 400.0, max = 2000.0))]
    pub co2_target: f64,

    /// 0-100 %
    #[validate(range(min = 0.0, max = 100.0))]
    pub light_intensity: f64,
}

fn validate_room_config(cfg: &RoomConfig) -> Result<(), ValidationError> {
    let values = [
        cfg.lights_on_hour,
        cfg.day_length,
        cfg.p0_duration,
        cfg.p1_duration,
        cfg.p1_interval,
        cfg.p2_interval,
        cfg.p2_cutoff,
        cfg.shot_duration,
        cfg.day_temp_low,
        cfg.day_temp_high,
        cfg.night_temp_low,
        cfg.night_temp_high,
        cfg.day_rh_target,
        cfg.night_rh_target,
        cfg.co2_target,
        cfg.light_intensity,
    ];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ValidationError::new("non_finite_value"));
    }
    if cfg.day_temp_low > cfg.day_temp_high || cfg.night_temp_low > cfg.night_temp_high {
        return Err(ValidationError::new("inverted_temperature_band"));
    }
    Ok(())
}

impl RoomConfig {
    /// 12/12 flower room defaults.
    pub fn flower(lights_on_hour: f64) -> Self {
        Self {
            lights_on_hour,
            day_length: 12.0,
            p0_duration: 60.0,
            p1_duration: 180.0,
            p1_interval: 20.0,
            p1_shots: None,
            p2_interval: 60.0,
            p2_cutoff: 120.0,
            shot_duration: 30.0,
            day_temp_low: 76.0,
            day_temp_high: 82.0,
            night_temp_low: 68.0,
            night_temp_high: 74.0,
            day_rh_target: 60.0,
            night_rh_target: 55.0,
            co2_target: 1200.0,
            light_intensity: 100.0,
        }
    }

    /// 18/6 veg room defaults.
    pub fn veg(lights_on_hour: f64) -> Self {
        Self {
            day_length: 18.0,
            day_temp_low: 80.0,
            day_temp_high: 85.0,
            night_temp_low: 75.0,
            night_temp_high: 78.0,
            day_rh_target: 70.0,
            night_rh_target: 65.0,
            co2_target: 800.0,
            ..Self::flower(lights_on_hour)
        }
    }

    pub fn lights_on_min(&self) -> f64 {
        self.lights_on_hour * 60.0
    }

    pub fn day_length_min(&self) -> f64 {
        self.day_length * 60.0
    }

    pub fn effective_p1_shots(&self) -> u32 {
        match self.p1_shots {
            Some(shots) => shots,
            None if self.p1_interval > 0.0 => (self.p1_duration / self.p1_interval).floor() as u32,
            None => 0,
        }
    }

    /// Shot length converted to timer minutes.
    pub fn shot_minutes(&self) -> f64 {
        self.shot_duration / 60.0
    }

    /// `(low, high)` temperature band for the given photoperiod half.
    pub fn temp_band(&self, is_day: bool) -> (f64, f64) {
        if is_day {
            (self.day_temp_low, self.day_temp_high)
        } else {
            (self.night_temp_low, self.night_temp_high)
        }
    }

    /// Merge a partial update. The config is left untouched when the merged
    /// result fails validation.
    pub fn apply_patch(&mut self, patch: &RoomConfigPatch) -> Result<(), ConfigError> {
        let mut candidate = self.clone();
        macro_rules! merge {
            ($($field:ident),+ $(,)?) => {
                $( if let Some(value) = patch.$field { candidate.$field = value; } )+
            };
        }
        merge!(
            lights_on_hour,
            day_length,
            p0_duration,
            p1_duration,
            p1_interval,
            p2_interval,
            p2_cutoff,
            shot_duration,
            day_temp_low,
            day_temp_high,
            night_temp_low,
            night_temp_high,
            day_rh_target,
            night_rh_target,
            co2_target,
            light_intensity,
        );
        if let Some(shots) = patch.p1_shots {
            candidate.p1_shots = Some(shots);
        }
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }
}

/// Partial room config as carried by a `SetConfig` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomConfigPatch {
    pub lights_on_hour: Option<f64>,
    pub day_length: Option<f64>,
    pub p0_duration: Option<f64>,
    pub p1_duration: Option<f64>,
    pub p1_interval: Option<f64>,
    pub p1_shots: Option<u32>,
    pub p2_interval: Option<f64>,
    pub p2_cutoff: Option<f64>,
    pub shot_duration: Option<f64>,
    pub day_temp_low: Option<f64>,
    pub day_temp_high: Option<f64>,
    pub night_temp_low: Option<f64>,
    pub night_temp_high: Option<f64>,
    pub day_rh_target: Option<f64>,
    pub night_rh_target: Option<f64>,
    pub co2_target: Option<f64>,
    pub light_intensity: Option<f64>,
}
