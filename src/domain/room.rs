use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::{ActiveMilestone, HistoryBuffer, HvacState, RoomConfig, StrainProfile};

/// Identity of a room in the facility.
///
/// `A` and `B` are the two conditioned flower rooms that share the cooling
/// plant (`A` has priority); `V` is the auxiliary veg/nursery room.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString, EnumIter,
)]
pub enum RoomId {
    A,
    B,
    V,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomKind {
    Flower,
    Veg,
}

impl RoomKind {
    /// Only flower rooms run the automated P0-P3 shot schedule.
    pub fn automated_irrigation(&self) -> bool {
        matches!(self, RoomKind::Flower)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecyclePhase {
    Idle,
    Veg,
    Flower,
}

/// Irrigation sub-phase of the daily cycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IrrigationPhase {
    /// Lights off
    Night,
    /// Dormancy after lights-on
    P0,
    /// Ramp, scheduled shots
    P1,
    /// Maintenance
    P2,
    /// Taper / flush before lights-off
    P3,
}

impl IrrigationPhase {
    /// Chart ordinal used by history points.
    pub fn ordinal(&self) -> u8 {
        match self {
            IrrigationPhase::Night => 0,
            IrrigationPhase::P0 => 1,
            IrrigationPhase::P1 => 2,
            IrrigationPhase::P2 => 3,
            IrrigationPhase::P3 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorStatus {
    Ok,
    Error,
    Drifting,
}

/// One substrate probe in a room's sensor array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorProbe {
    pub id: u32,
    pub vwc: f64,
    pub ec: f64,
    pub temp: f64,
}

/// The environmental readings of a room, as one copyable value.
///
/// The chaos overlay corrupts a copy of this, never the room itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readings {
    pub temp: f64,
    pub canopy_temp: f64,
    pub rh: f64,
    pub vwc: f64,
    pub co2: f64,
    pub vpd: f64,
    pub ec: f64,
}

/// Complete state of one room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub id: RoomId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RoomKind,

    // Chronology
    pub current_batch_id: Option<String>,
    pub current_lifecycle_phase: LifecyclePhase,
    pub veg_start_date: Option<DateTime<Utc>>,
    pub flower_start_date: Option<DateTime<Utc>>,
    pub strains: Vec<StrainProfile>,
    pub day_of_cycle: u32,
    pub active_milestones: Vec<ActiveMilestone>,

    // Irrigation
    pub phase: IrrigationPhase,
    pub is_day: bool,
    pub lights_on: bool,
    /// Minutes until the next scheduled shot
    pub next_shot_min: u32,
    pub shots_fired_today: u32,
    pub valve_open: bool,
    pub valve_open_since: Option<DateTime<Utc>>,
    /// Shared facility reservoir, mirrored per room (0-100 %)
    pub reservoir_level: f64,

    // Environment
    pub temp: f64,
    pub canopy_temp: f64,
    pub rh: f64,
    pub vwc: f64,
    pub co2: f64,
    pub ec: f64,
    pub vpd: f64,
    pub sensors: Vec<SensorProbe>,
    pub sensor_status: SensorStatus,

    // Climate
    pub hvac: HvacState,
    /// Share of the cooling plant routed to this room (0-100 %)
    pub damper_pos: f64,

    pub config: RoomConfig,
    pub dryback_24h: f64,
    pub history: HistoryBuffer,
}

impl RoomState {
    pub fn readings(&self) -> Readings {
        Readings {
            temp: self.temp,
            canopy_temp: self.canopy_temp,
            rh: self.rh,
            vwc: self.vwc,
            co2: self.co2,
            vpd: self.vpd,
            ec: self.ec,
        }
    }

    pub fn set_readings(&mut self, readings: &Readings) {
        self.temp = readings.temp;
        self.canopy_temp = readings.canopy_temp;
        self.rh = readings.rh;
        self.vwc = readings.vwc;
        self.co2 = readings.co2;
        self.vpd = readings.vpd;
        self.ec = readings.ec;
    }

    pub fn has_crop(&self) -> bool {
        !self.strains.is_empty()
    }

    /// Average of the probe array, or the current value if there are no probes.
    pub fn probe_average_vwc(&self) -> f64 {
        if self.sensors.is_empty() {
            return self.vwc;
        }
        self.sensors.iter().map(|s| s.vwc).sum::<f64>() / self.sensors.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_phase_ordinals_are_chart_order() {
        let ordinals: Vec<u8> = IrrigationPhase::iter().map(|p| p.ordinal()).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_room_id_round_trips_through_str() {
        assert_eq!(RoomId::from_str("B").unwrap(), RoomId::B);
        assert_eq!(RoomId::V.to_string(), "V");
        assert!(RoomId::from_str("Z").is_err());
    }

    #[test]
    fn test_only_flower_rooms_automate() {
        assert!(RoomKind::Flower.automated_irrigation());
        assert!(!RoomKind::Veg.automated_irrigation());
    }
}
