use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;

use super::FacilitySnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Action,
    Warn,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlantHealth {
    Survived,
    Died,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyInterventions {
    /// Actuations denied by the reservoir interlock
    pub success: u64,
    /// Steps where a valve was open against a depleted reservoir
    pub fail: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressTestReport {
    pub total_simulated_days: u32,
    pub total_valve_cycles: u64,
    pub safety_interventions: SafetyInterventions,
    pub plant_health: PlantHealth,
    pub duration_seconds: f64,
}

/// Everything the engine emits to observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimEvent {
    StateUpdate(Arc<FacilitySnapshot>),
    Log { level: LogLevel, message: String },
    News(String),
    StressTestReport(StressTestReport),
}
