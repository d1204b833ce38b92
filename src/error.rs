use thiserror::Error;

use crate::domain::{LifecyclePhase, RoomId};

/// Invalid numeric configuration, rejected at the update boundary.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Failed to load settings: {0}")]
    Load(String),
}

/// Errors surfaced by the simulation engine's command and init boundary.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Strain data missing: {0}")]
    MissingStrainData(String),

    #[error("Unknown strain: {0}")]
    UnknownStrain(String),

    #[error("Room {room} has no strain at index {index}")]
    StrainIndex { room: RoomId, index: usize },

    #[error("Room {0} has no active batch")]
    NoActiveBatch(RoomId),

    #[error("Room {room} must be in VEG to flip (currently {phase})")]
    NotInVeg { room: RoomId, phase: LifecyclePhase },

    #[error("Room {0} is not part of this facility")]
    UnknownRoom(RoomId),

    #[error("Saved state does not match this facility: {0}")]
    RestoreMismatch(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
