use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BatchRecord, RoomId, RoomState};

/// Immutable, post-chaos view of the facility handed to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitySnapshot {
    pub room_states: Vec<RoomState>,
    pub time_of_day_min: f64,
    pub virtual_timestamp: DateTime<Utc>,
    pub speed: f64,
    pub paused: bool,
    pub bypass_active: bool,
    pub reservoir_level: f64,
}

impl FacilitySnapshot {
    pub fn room(&self, id: RoomId) -> Option<&RoomState> {
        self.room_states.iter().find(|r| r.id == id)
    }
}

/// Save/restore payload owned by an external persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedState {
    pub virtual_timestamp: DateTime<Utc>,
    pub time_of_day_min: f64,
    pub reservoir_level: f64,
    pub rooms: Vec<RoomState>,
    #[serde(default)]
    pub completed_batches: Vec<BatchRecord>,
}
