use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChaosPatch, IrrigationPhase, RoomConfigPatch, RoomId, StrainProfile};

/// Sensor spoofing for one room. Unset fields follow the physics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvOverrides {
    pub temp: Option<f64>,
    pub rh: Option<f64>,
    pub co2: Option<f64>,
    pub canopy_temp: Option<f64>,
    pub vwc: Option<f64>,
    pub reservoir_level: Option<f64>,
}

impl EnvOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Control messages applied between ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimCommand {
    SetSpeed(f64),
    Pause,
    Resume,
    SetConfig {
        room: RoomId,
        patch: RoomConfigPatch,
    },
    ToggleValve(RoomId),
    ToggleLights(RoomId),
    SetReservoirLevel(f64),
    SetChaos(ChaosPatch),
    SetBypass(bool),
    SetEnvOverride {
        room: RoomId,
        overrides: EnvOverrides,
    },
    ClearEnvOverride(RoomId),
    SetSimDate(DateTime<Utc>),
    TriggerIrrigation {
        room: RoomId,
        phase: IrrigationPhase,
    },
    RunStressTest,
    HarvestBatch(RoomId),
    FlipToFlower(RoomId),
    AddStrain {
        room: RoomId,
        strain_id: String,
    },
    AddCustomStrain {
        room: RoomId,
        strain: StrainProfile,
    },
    RemoveStrain {
        room: RoomId,
        index: usize,
    },
    UpdateStrain {
        room: RoomId,
        index: usize,
        strain: StrainProfile,
    },
    SetDay {
        room: RoomId,
        day: u32,
    },
    SetStartDate {
        room: RoomId,
        date: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_use_tagged_wire_shape() {
        let cmd: SimCommand =
            serde_json::from_str(r#"{"type":"SET_SPEED","payload":25.0}"#).unwrap();
        assert_eq!(cmd, SimCommand::SetSpeed(25.0));

        let cmd: SimCommand = serde_json::from_str(
            r#"{"type":"TRIGGER_IRRIGATION","payload":{"room":"A","phase":"P2"}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            SimCommand::TriggerIrrigation {
                room: RoomId::A,
                phase: IrrigationPhase::P2
            }
        );

        let cmd: SimCommand = serde_json::from_str(r#"{"type":"PAUSE"}"#).unwrap();
        assert_eq!(cmd, SimCommand::Pause);
    }
}
