//! # HVAC State Machine & Cooling Arbiter
//!
//! Per-room thermal control with a hysteresis band and a minimum off-time
//! lockout, plus the arbiter that splits the shared cooling plant between
//! the two flower rooms.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::domain::{HvacMode, HvacState};

use super::physics::round_to;

pub const LOCKOUT_MINUTES: f64 = 3.0;
pub const HYSTERESIS_F: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HvacStateMachine {
    pub lockout_min: f64,
    pub hysteresis: f64,
}

impl Default for HvacStateMachine {
    fn default() -> Self {
        Self {
            lockout_min: LOCKOUT_MINUTES,
            hysteresis: HYSTERESIS_F,
        }
    }
}

impl HvacStateMachine {
    /// Next controller state for `temp` against the `(low, high)` band.
    ///
    /// `now_min` is the monotonic elapsed clock; lockout timing never wraps
    /// at midnight.
    pub fn step(&self, current: &HvacState, temp: f64, band: (f64, f64), now_min: f64) -> HvacState {
        let (low, high) = band;
        let remaining = current
            .last_cycle_off_time_min
            .map(|off| (self.lockout_min - (now_min - off)).max(0.0))
            .unwrap_or(0.0);
        let locked = remaining > 0.0;

        let mut next = current.clone();
        next.lockout_remaining_min = round_to(remaining, 1);

        if current.cool_relay {
            if temp <= high {
                next.cool_relay = false;
                next.mode = HvacMode::Idle;
                next.last_cycle_off_time_min = Some(now_min);
                next.lockout_remaining_min = self.lockout_min;
                next.diagnostic = "CYCLE COMPLETE".to_string();
            } else {
                next.mode = HvacMode::Cooling;
                next.diagnostic = format!("COOLING TO {high}°F");
            }
            return next;
        }

        if current.heat_relay {
            if temp >= low {
                next.heat_relay = false;
                next.mode = HvacMode::Idle;
                next.last_cycle_off_time_min = Some(now_min);
                next.lockout_remaining_min = self.lockout_min;
                next.diagnostic = "CYCLE COMPLETE".to_string();
            } else {
                next.mode = HvacMode::Heating;
                next.diagnostic = format!("HEATING TO {low}°F");
            }
            return next;
        }

        if locked {
            next.mode = HvacMode::LockedOut;
            next.diagnostic = format!("SAFETY DELAY ({:.1}m)", remaining);
        } else if temp >= high + self.hysteresis {
            next.cool_relay = true;
            next.mode = HvacMode::Cooling;
            next.diagnostic = "COOLING START".to_string();
        } else if temp <= low - self.hysteresis {
            next.heat_relay = true;
            next.mode = HvacMode::Heating;
            next.diagnostic = "HEATING START".to_string();
        } else {
            next.mode = HvacMode::Idle;
            next.diagnostic = "IDLE (IN RANGE)".to_string();
        }
        next
    }

    /// Drop relays and forget lockout history.
    pub fn neutral() -> HvacState {
        HvacState::startup()
    }
}

/// How the shared cooling plant is divided between the primary and the
/// secondary room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ArbitrationMode {
    /// Primary room takes the plant whenever it calls for cooling
    #[default]
    PrimaryPriority,
    /// Each room gets full capacity
    Independent,
}

/// Cooling granted to one room for a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoolingAllocation {
    /// Fraction of plant capacity (0-1) that reaches the room
    pub share: f64,
    /// Damper position reported to the UI (0-100)
    pub damper_pos: f64,
    /// Plant capacity routed to the room, whether or not its relay is on
    pub capacity: f64,
    /// Capacity actually consumed this step (0 when the relay is off)
    pub draw: f64,
}

impl CoolingAllocation {
    fn new(share: f64, relay_on: bool, capacity: f64) -> Self {
        Self {
            share,
            damper_pos: (share * 100.0).round(),
            capacity: share * capacity,
            draw: if relay_on { share * capacity } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoolingArbiter {
    pub mode: ArbitrationMode,
    pub capacity: f64,
    /// Share left to the secondary room while the primary is cooling (0-1)
    pub secondary_share: f64,
}

impl Default for CoolingArbiter {
    fn default() -> Self {
        Self {
            mode: ArbitrationMode::PrimaryPriority,
            capacity: 5.0,
            secondary_share: 0.1,
        }
    }
}

impl CoolingArbiter {
    pub fn new(mode: ArbitrationMode, capacity: f64, secondary_share_pct: f64) -> Self {
        Self {
            mode,
            capacity: capacity.max(0.0),
            secondary_share: (secondary_share_pct / 100.0).clamp(0.0, 1.0),
        }
    }

    /// Split the plant between the primary and secondary rooms given their
    /// relay states.
    ///
    /// Under `PrimaryPriority` the secondary room is throttled whenever the
    /// primary calls for cooling, whether or not it needs cooling itself.
    pub fn allocate(
        &self,
        primary_cooling: bool,
        secondary_cooling: bool,
    ) -> (CoolingAllocation, CoolingAllocation) {
        let secondary_share = match self.mode {
            ArbitrationMode::PrimaryPriority if primary_cooling => self.secondary_share,
            _ => 1.0,
        };
        (
            CoolingAllocation::new(1.0, primary_cooling, self.capacity),
            CoolingAllocation::new(secondary_share, secondary_cooling, self.capacity),
        )
    }

    /// Rooms outside the arbitrated pair have their own plant.
    pub fn dedicated(&self, cooling: bool) -> CoolingAllocation {
        CoolingAllocation::new(1.0, cooling, self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DAY_BAND: (f64, f64) = (76.0, 82.0);

    fn run(sm: &HvacStateMachine, start: HvacState, temp: f64, now: f64) -> HvacState {
        sm.step(&start, temp, DAY_BAND, now)
    }

    #[test]
    fn test_hysteresis_gates_cooling_start() {
        let sm = HvacStateMachine::default();
        let idle = HvacState::startup();

        let s = run(&sm, idle.clone(), 82.4, 0.0);
        assert_eq!(s.mode, HvacMode::Idle);
        assert!(!s.cool_relay);

        let s = run(&sm, idle, 82.5, 0.0);
        assert_eq!(s.mode, HvacMode::Cooling);
        assert!(s.cool_relay);
    }

    #[test]
    fn test_cooling_runs_until_band_high() {
        let sm = HvacStateMachine::default();
        let cooling = run(&sm, HvacState::startup(), 90.0, 0.0);

        let s = run(&sm, cooling.clone(), 82.1, 1.0);
        assert_eq!(s.mode, HvacMode::Cooling);

        let s = run(&sm, cooling, 82.0, 1.0);
        assert_eq!(s.mode, HvacMode::Idle);
        assert!(!s.cool_relay);
        assert_eq!(s.last_cycle_off_time_min, Some(1.0));
    }

    #[test]
    fn test_lockout_blocks_restart_for_window() {
        let sm = HvacStateMachine::default();
        let cooling = run(&sm, HvacState::startup(), 90.0, 0.0);
        let off = run(&sm, cooling, 82.0, 10.0);

        // Re-crossing the threshold immediately stays locked out
        let s = run(&sm, off.clone(), 95.0, 10.1);
        assert_eq!(s.mode, HvacMode::LockedOut);
        assert!(!s.cool_relay && !s.heat_relay);
        assert_eq!(s.lockout_remaining_min, 2.9);

        let s = run(&sm, off.clone(), 50.0, 12.9);
        assert_eq!(s.mode, HvacMode::LockedOut);

        let s = run(&sm, off, 95.0, 13.0);
        assert_eq!(s.mode, HvacMode::Cooling);
        assert_eq!(s.lockout_remaining_min, 0.0);
    }

    #[test]
    fn test_lockout_does_not_wrap_at_midnight() {
        let sm = HvacStateMachine::default();
        let mut state = HvacState::startup();
        state.last_cycle_off_time_min = Some(1439.0);
        // A full day later the lockout is long gone
        let s = run(&sm, state, 95.0, 1439.0 + 1440.0 + 0.5);
        assert_eq!(s.mode, HvacMode::Cooling);
    }

    #[test]
    fn test_heating_mirrors_cooling() {
        let sm = HvacStateMachine::default();
        let heating = run(&sm, HvacState::startup(), 75.5, 0.0);
        assert_eq!(heating.mode, HvacMode::Heating);
        let s = run(&sm, heating.clone(), 75.9, 1.0);
        assert!(s.heat_relay);
        let s = run(&sm, heating, 76.0, 1.0);
        assert_eq!(s.mode, HvacMode::Idle);
        assert_eq!(s.last_cycle_off_time_min, Some(1.0));
    }

    #[test]
    fn test_primary_priority_starves_secondary() {
        let arbiter = CoolingArbiter::default();

        let (a, b) = arbiter.allocate(true, true);
        assert_eq!(a.share, 1.0);
        assert_eq!(a.draw, 5.0);
        assert_eq!(b.damper_pos, 10.0);
        assert!((b.draw - 0.5).abs() < 1e-12);
        assert!((b.capacity - 0.5).abs() < 1e-12);

        let (a, b) = arbiter.allocate(false, true);
        assert_eq!(a.draw, 0.0);
        assert_eq!(b.share, 1.0);
        assert_eq!(b.damper_pos, 100.0);
    }

    #[test]
    fn test_secondary_throttled_even_when_idle() {
        let (_, b) = CoolingArbiter::default().allocate(true, false);
        assert_eq!(b.damper_pos, 10.0);
        assert_eq!(b.draw, 0.0);
    }

    #[test]
    fn test_independent_mode_gives_full_capacity() {
        let arbiter = CoolingArbiter::new(ArbitrationMode::Independent, 5.0, 10.0);
        let (a, b) = arbiter.allocate(true, true);
        assert_eq!(a.share, 1.0);
        assert_eq!(b.share, 1.0);
        assert_eq!(b.capacity, 5.0);
    }

    #[test]
    fn test_mode_parses_from_config_strings() {
        assert_eq!(
            "primary_priority".parse::<ArbitrationMode>().unwrap(),
            ArbitrationMode::PrimaryPriority
        );
        assert_eq!(ArbitrationMode::Independent.to_string(), "independent");
    }

    proptest! {
        #[test]
        fn prop_relays_never_both_on(temps in prop::collection::vec(40.0f64..110.0, 1..200)) {
            let sm = HvacStateMachine::default();
            let mut state = HvacState::startup();
            for (i, temp) in temps.into_iter().enumerate() {
                state = sm.step(&state, temp, DAY_BAND, i as f64 * 0.1);
                prop_assert!(!(state.cool_relay && state.heat_relay));
                if state.mode == HvacMode::LockedOut {
                    prop_assert!(!state.cool_relay && !state.heat_relay);
                }
            }
        }
    }
}
