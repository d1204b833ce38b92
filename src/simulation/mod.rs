//! # Facility Simulation Module
//!
//! Deterministic, fixed-step model of a multi-room cultivation facility.
//!
//! ## Components
//!
//! - **Clock**: Turns wall-clock time and a speed multiplier into fixed physics steps
//! - **Irrigation**: NIGHT/P0-P3 shot schedule, manual shots and the valve decision
//! - **Interlock**: Shared reservoir drain and the low-level valve lockout
//! - **HVAC**: Hysteresis thermostat with compressor lockout, plus the shared cooling arbiter
//! - **Physics**: Temperature, humidity, CO2, VPD and substrate moisture integration
//! - **Chaos**: Fault injection applied to reported readings only
//! - **History**: 5-minute chart sampling into a 24h ring buffer
//! - **Lifecycle**: Batches, strains, day counting and milestones
//! - **Engine**: Owns all of the above and runs the per-step pipeline
//!
//! ## Usage
//!
//! ```rust,no_run
//! use growroom_sim::domain::{SimCommand, StrainCatalog};
//! use growroom_sim::simulation::{EngineConfig, SimulationEngine};
//!
//! let mut engine = SimulationEngine::new(StrainCatalog::house_defaults(), EngineConfig::default())?;
//! engine.apply(SimCommand::SetSpeed(60.0))?;
//!
//! // One real second at 60x is one simulated minute
//! engine.advance(std::time::Duration::from_secs(1));
//! let snapshot = engine.snapshot();
//! # Ok::<(), growroom_sim::error::SimError>(())
//! ```

pub mod chaos;
pub mod clock;
pub mod engine;
pub mod facility;
pub mod history;
pub mod hvac;
pub mod interlock;
pub mod irrigation;
pub mod lifecycle;
pub mod physics;
pub mod stress;

pub use chaos::{ChaosOverlay, Reported};
pub use clock::{ClockStep, SimulationClock};
pub use engine::{EngineConfig, SafetyCounters, SimulationEngine};
pub use history::HistoryRecorder;
pub use hvac::{ArbitrationMode, CoolingAllocation, CoolingArbiter, HvacStateMachine};
pub use interlock::{AlertLimiter, ReservoirInterlock};
pub use irrigation::{IrrigationStateMachine, ManualToggle, ValveDecision};
