use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::error::ConfigError;
use crate::simulation::{ArbitrationMode, EngineConfig};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "GROWROOM__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SimulationSettings {
    /// Real-time interval between tick loop wakeups
    #[validate(range(min = 1, max = 60_000))]
    pub tick_interval_ms: u64,
    #[validate(range(min = 1, max = 60_000))]
    pub snapshot_interval_ms: u64,
    /// Fixed physics step in simulated minutes
    #[validate(range(min = 0.01, max = 60.0))]
    pub step_minutes: f64,
    #[validate(range(min = 0.1, max = 1000.0))]
    pub initial_speed: f64,
    #[validate(range(min = 0.0, max = 1439.99))]
    pub start_time_of_day_min: f64,
    pub seed: u64,
    #[validate(range(min = 1, max = 3650))]
    pub stress_test_days: u32,
    pub arbitration: ArbitrationMode,
    #[validate(range(min = 0.0, max = 100.0))]
    pub shared_cooling_capacity: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub secondary_share_pct: f64,
    /// Virtual minutes between repeated interlock alerts for one room
    #[validate(range(min = 0.0, max = 1440.0))]
    pub alert_interval_min: f64,
    #[validate(range(min = 0.0, max = 5.0))]
    pub sensor_jitter: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            snapshot_interval_ms: 200,
            step_minutes: 0.1,
            initial_speed: 1.0,
            start_time_of_day_min: 360.0,
            seed: 42,
            stress_test_days: 65,
            arbitration: ArbitrationMode::PrimaryPriority,
            shared_cooling_capacity: 5.0,
            secondary_share_pct: 10.0,
            alert_interval_min: 15.0,
            sensor_jitter: 0.02,
        }
    }
}

impl SimulationSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms.max(1))
    }
}

impl From<&SimulationSettings> for EngineConfig {
    fn from(s: &SimulationSettings) -> Self {
        EngineConfig {
            step_minutes: s.step_minutes,
            initial_speed: s.initial_speed,
            start_time_of_day_min: s.start_time_of_day_min,
            start_timestamp: None,
            seed: s.seed,
            arbitration: s.arbitration,
            shared_cooling_capacity: s.shared_cooling_capacity,
            secondary_share_pct: s.secondary_share_pct,
            alert_interval_min: s.alert_interval_min,
            sensor_jitter: s.sensor_jitter,
            stress_test_days: s.stress_test_days,
        }
    }
}

impl Settings {
    /// Defaults, then `config/default.toml`, then `GROWROOM__*` env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Settings::default()))
                .merge(Toml::file(DEFAULT_CONFIG_PATH))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Result<Settings, ConfigError> {
        Settings::from_figment(
            Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(toml)),
        )
    }

    #[test]
    fn test_defaults_validate() {
        assert!(Settings::default().validate().is_ok());
        assert_eq!(from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn test_toml_overrides_merge_over_defaults() {
        let settings = from_toml(
            r#"
            [simulation]
            seed = 7
            arbitration = "independent"
            step_minutes = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(settings.simulation.seed, 7);
        assert_eq!(settings.simulation.arbitration, ArbitrationMode::Independent);
        assert_eq!(settings.simulation.tick_interval_ms, 100);

        let engine = EngineConfig::from(&settings.simulation);
        assert_eq!(engine.step_minutes, 0.5);
        assert_eq!(engine.seed, 7);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        assert!(matches!(
            from_toml("[simulation]\nstep_minutes = 0.0"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            from_toml("[simulation]\ninitial_speed = 5000.0"),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_arbitration_mode_fails_to_load() {
        assert!(matches!(
            from_toml("[simulation]\narbitration = \"round_robin\""),
            Err(ConfigError::Load(_))
        ));
    }
}
