//! # Irrigation State Machine
//!
//! Daily phase schedule (NIGHT -> P0 -> P1 -> P2 -> P3) and valve actuation
//! for one room. The phase is a pure function of time of day and config;
//! the only hidden state is the pair of shot timers owned here.
//!
//! ```text
//! lights on                                         lights off
//!     |-- P0 --|---- P1 (ramp) ----|--- P2 (maint) ---|-- P3 --|-- NIGHT --
//!     p0Duration   p1Duration           until dayLength - p2Cutoff
//! ```

use crate::domain::{IrrigationPhase, RoomConfig, RoomKind};

use super::interlock::ReservoirInterlock;

/// Manual shot length used when the room has no shot duration configured (s)
pub const DEFAULT_MANUAL_SHOT_SECONDS: f64 = 60.0;
/// A triggered P3 flush runs this many shot lengths
pub const FLUSH_SHOT_MULTIPLIER: f64 = 4.0;

/// Where in the daily schedule a room is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseState {
    pub phase: IrrigationPhase,
    pub is_day: bool,
    /// Minutes until the next scheduled shot (0 when nothing is scheduled)
    pub next_shot_min: f64,
}

/// A scheduled shot fired during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledShot {
    pub phase: IrrigationPhase,
    /// Shots batched into this actuation
    pub count: u32,
}

/// Outcome of evaluating the schedule for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleOutcome {
    pub state: PhaseState,
    pub shot: Option<ScheduledShot>,
    pub shots_fired_today: u32,
}

/// Per-step valve decision. Denial is an ordinary outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValveDecision {
    Closed,
    /// Open for `active_minutes` of this step
    Open { active_minutes: f64 },
    DeniedReservoirLow,
}

impl ValveDecision {
    pub fn is_open(&self) -> bool {
        matches!(self, ValveDecision::Open { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManualToggle {
    Opened { seconds: f64 },
    Closed,
    BlockedReservoirLow,
    BlockedBypass,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerOutcome {
    Fired { minutes: f64 },
    QuotaSpent { fired: u32, quota: u32 },
    BlockedBypass,
    Unsupported,
}

/// Relative position of `time_of_day` within the room's photoperiod.
fn minutes_since_lights_on(cfg: &RoomConfig, time_of_day: f64) -> f64 {
    (time_of_day - cfg.lights_on_min()).rem_euclid(1440.0)
}

/// Phase and lights-on flag at `time_of_day`.
pub fn phase_at(cfg: &RoomConfig, kind: RoomKind, time_of_day: f64) -> PhaseState {
    let rel = minutes_since_lights_on(cfg, time_of_day);
    let day_len = cfg.day_length_min();
    let is_day = rel < day_len;

    let p0_end = cfg.p0_duration;
    let p1_end = p0_end + cfg.p1_duration;
    let p2_end = day_len - cfg.p2_cutoff;

    let (phase, next_shot) = if !is_day {
        (IrrigationPhase::Night, (1440.0 - rel) + p0_end)
    } else if rel < p0_end {
        (IrrigationPhase::P0, p0_end - rel)
    } else if rel < p1_end {
        let into = rel - p0_end;
        (IrrigationPhase::P1, cfg.p1_interval - into % cfg.p1_interval)
    } else if rel < p2_end {
        let into = rel - p1_end;
        (IrrigationPhase::P2, cfg.p2_interval - into % cfg.p2_interval)
    } else {
        (IrrigationPhase::P3, (1440.0 - rel) + p0_end)
    };

    PhaseState {
        phase,
        is_day,
        next_shot_min: if kind.automated_irrigation() { next_shot } else { 0.0 },
    }
}

/// Number of interval boundaries crossed between `prev` and `curr`, counting
/// the entry edge (prev < 0 <= curr) as a boundary.
fn boundaries_crossed(prev: f64, curr: f64, interval: f64) -> u32 {
    let curr_idx = (curr / interval).floor();
    let prev_idx = (prev / interval).floor();
    let entered = prev < 0.0 && curr >= 0.0;
    if curr_idx > prev_idx || entered {
        (curr_idx - prev_idx.max(-1.0)).max(1.0) as u32
    } else {
        0
    }
}

/// Owns the shot timers of one room.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrrigationStateMachine {
    /// Remaining minutes of a scheduled shot
    pub schedule_timer: f64,
    /// Remaining minutes of a user shot
    pub manual_timer: f64,
    /// Set while a scheduled shot ran since the last history sample
    pub history_valve_latch: bool,
}

impl IrrigationStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requesting(&self) -> bool {
        self.schedule_timer > 0.0 || self.manual_timer > 0.0
    }

    pub fn manual_active(&self) -> bool {
        self.manual_timer > 0.0
    }

    /// Zero both timers.
    pub fn reset(&mut self) {
        self.schedule_timer = 0.0;
        self.manual_timer = 0.0;
        self.history_valve_latch = false;
    }

    /// Count timers down by one step. Returns true if the manual shot ran out
    /// on this step.
    pub fn decrement_timers(&mut self, step: f64) -> bool {
        if self.schedule_timer > 0.0 {
            self.schedule_timer = (self.schedule_timer - step).max(0.0);
            self.history_valve_latch = true;
        }
        if self.manual_timer > 0.0 {
            self.manual_timer -= step;
            if self.manual_timer <= 1e-9 {
                self.manual_timer = 0.0;
                return true;
            }
        }
        false
    }

    /// Evaluate the schedule for the step ending at `time_of_day`.
    ///
    /// P1 fires on interval boundaries while the day's quota lasts; several
    /// boundaries crossed in one step become one batched shot. P2 fires once
    /// per interval. Nothing is armed while the bypass is active.
    pub fn evaluate(
        &mut self,
        cfg: &RoomConfig,
        kind: RoomKind,
        time_of_day: f64,
        step: f64,
        shots_fired_today: u32,
        bypass_active: bool,
    ) -> ScheduleOutcome {
        let state = phase_at(cfg, kind, time_of_day);
        let mut shots_fired_today = shots_fired_today;
        let mut shot = None;

        if kind.automated_irrigation() && state.is_day {
            let rel = minutes_since_lights_on(cfg, time_of_day);
            match state.phase {
                IrrigationPhase::P1 => {
                    let quota = cfg.effective_p1_shots();
                    if shots_fired_today < quota {
                        let curr = rel - cfg.p0_duration;
                        let crossed = boundaries_crossed(curr - step, curr, cfg.p1_interval);
                        let count = crossed.min(quota - shots_fired_today);
                        if count > 0 {
                            shots_fired_today += count;
                            shot = Some(ScheduledShot {
                                phase: IrrigationPhase::P1,
                                count,
                            });
                        }
                    }
                }
                IrrigationPhase::P2 => {
                    // Maintenance shots start one interval into P2, never at entry
                    let curr = rel - cfg.p0_duration - cfg.p1_duration;
                    let prev = (curr - step).max(0.0);
                    if curr > 0.0 && boundaries_crossed(prev, curr, cfg.p2_interval) > 0 {
                        shot = Some(ScheduledShot {
                            phase: IrrigationPhase::P2,
                            count: 1,
                        });
                    }
                }
                _ => {}
            }
        }

        if let Some(fired) = shot {
            if !bypass_active {
                self.schedule_timer = cfg.shot_minutes() * fired.count.max(1) as f64;
            }
        }

        ScheduleOutcome {
            state,
            shot,
            shots_fired_today,
        }
    }

    /// Actual valve state for this step. A request needs the bypass off and
    /// the interlock's permission.
    pub fn valve(&self, step: f64, reservoir_level: f64, bypass_active: bool) -> ValveDecision {
        if !self.is_requesting() || bypass_active {
            return ValveDecision::Closed;
        }
        if !ReservoirInterlock.permits(reservoir_level) {
            return ValveDecision::DeniedReservoirLow;
        }
        let remaining = self.schedule_timer.max(self.manual_timer);
        ValveDecision::Open {
            active_minutes: step.min(remaining),
        }
    }

    /// First press opens a timed manual shot; a press while a shot runs or
    /// the valve is open cancels it.
    pub fn toggle_manual(
        &mut self,
        cfg: &RoomConfig,
        valve_open: bool,
        reservoir_level: f64,
        bypass_active: bool,
    ) -> ManualToggle {
        if bypass_active {
            return ManualToggle::BlockedBypass;
        }
        if self.manual_active() || valve_open {
            self.manual_timer = 0.0;
            return ManualToggle::Closed;
        }
        if !ReservoirInterlock.permits(reservoir_level) {
            return ManualToggle::BlockedReservoirLow;
        }
        let seconds = if cfg.shot_duration > 0.0 {
            cfg.shot_duration
        } else {
            DEFAULT_MANUAL_SHOT_SECONDS
        };
        self.manual_timer = seconds / 60.0;
        ManualToggle::Opened { seconds }
    }

    /// Operator-triggered shot of the given phase's kind.
    pub fn trigger(
        &mut self,
        cfg: &RoomConfig,
        phase: IrrigationPhase,
        shots_fired_today: &mut u32,
        bypass_active: bool,
    ) -> TriggerOutcome {
        if bypass_active {
            return TriggerOutcome::BlockedBypass;
        }
        let minutes = match phase {
            IrrigationPhase::P1 => {
                let quota = cfg.effective_p1_shots();
                if *shots_fired_today >= quota {
                    return TriggerOutcome::QuotaSpent {
                        fired: *shots_fired_today,
                        quota,
                    };
                }
                *shots_fired_today += 1;
                cfg.shot_minutes()
            }
            IrrigationPhase::P2 => cfg.shot_minutes(),
            IrrigationPhase::P3 => cfg.shot_minutes() * FLUSH_SHOT_MULTIPLIER,
            IrrigationPhase::Night | IrrigationPhase::P0 => return TriggerOutcome::Unsupported,
        };
        self.schedule_timer = self.schedule_timer.max(minutes);
        TriggerOutcome::Fired { minutes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const STEP: f64 = 0.1;

    /// Run the schedule for a whole day at `step`, returning shots fired per phase.
    fn run_day(cfg: &RoomConfig, step: f64) -> (u32, u32) {
        let mut sm = IrrigationStateMachine::new();
        let mut fired_today = 0;
        let (mut p1, mut p2) = (0, 0);
        let steps = (1440.0 / step).round() as u64;
        for i in 1..=steps {
            let tod = (i as f64 * step).rem_euclid(1440.0);
            let out = sm.evaluate(cfg, RoomKind::Flower, tod, step, fired_today, false);
            fired_today = out.shots_fired_today;
            if let Some(shot) = out.shot {
                match shot.phase {
                    IrrigationPhase::P1 => p1 += shot.count,
                    IrrigationPhase::P2 => p2 += 1,
                    _ => unreachable!(),
                }
            }
        }
        (p1, p2)
    }

    #[rstest]
    #[case(0.0, IrrigationPhase::Night)]
    #[case(359.9, IrrigationPhase::Night)]
    #[case(360.0, IrrigationPhase::P0)]
    #[case(420.0, IrrigationPhase::P1)]
    #[case(600.0, IrrigationPhase::P2)]
    #[case(960.0, IrrigationPhase::P3)]
    #[case(1079.9, IrrigationPhase::P3)]
    #[case(1080.0, IrrigationPhase::Night)]
    fn test_phase_boundaries(#[case] tod: f64, #[case] expected: IrrigationPhase) {
        let cfg = RoomConfig::flower(6.0);
        assert_eq!(phase_at(&cfg, RoomKind::Flower, tod).phase, expected);
    }

    #[test]
    fn test_photoperiod_wraps_midnight() {
        let cfg = RoomConfig::flower(18.0);
        let state = phase_at(&cfg, RoomKind::Flower, 60.0);
        assert!(state.is_day);
        assert_eq!(state.phase, IrrigationPhase::P2);
        assert!(!phase_at(&cfg, RoomKind::Flower, 600.0).is_day);
    }

    #[test]
    fn test_full_day_fires_p1_quota_and_hourly_p2() {
        let cfg = RoomConfig::flower(6.0);
        let (p1, p2) = run_day(&cfg, STEP);
        assert_eq!(p1, cfg.effective_p1_shots());
        // P2 spans 240..600 rel minutes: shots 60, 120, ... 300 minutes in
        assert_eq!(p2, 5);
    }

    #[test]
    fn test_coarse_steps_batch_instead_of_dropping() {
        let cfg = RoomConfig::flower(6.0);
        let (fine, _) = run_day(&cfg, STEP);
        let (coarse, _) = run_day(&cfg, 45.0);
        assert_eq!(fine, coarse);
    }

    #[test]
    fn test_batched_shot_extends_timer() {
        let cfg = RoomConfig::flower(6.0);
        let mut sm = IrrigationStateMachine::new();
        // One 45 minute step from rel 59 to rel 104 crosses the entry edge and two boundaries
        let out = sm.evaluate(&cfg, RoomKind::Flower, 360.0 + 104.0, 45.0, 0, false);
        let shot = out.shot.unwrap();
        assert_eq!(shot.count, 3);
        assert_eq!(out.shots_fired_today, 3);
        assert!((sm.schedule_timer - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_veg_room_never_fires_scheduled_shots() {
        let cfg = RoomConfig::veg(6.0);
        let mut sm = IrrigationStateMachine::new();
        for i in 1..=14_400u64 {
            let out = sm.evaluate(&cfg, RoomKind::Veg, i as f64 * STEP % 1440.0, STEP, 0, false);
            assert!(out.shot.is_none());
            assert_eq!(out.state.next_shot_min, 0.0);
        }
        assert_eq!(sm.schedule_timer, 0.0);
    }

    #[test]
    fn test_bypass_prevents_arming() {
        let cfg = RoomConfig::flower(6.0);
        let mut sm = IrrigationStateMachine::new();
        let out = sm.evaluate(&cfg, RoomKind::Flower, 420.05, STEP, 0, true);
        assert!(out.shot.is_some());
        assert_eq!(sm.schedule_timer, 0.0);
    }

    #[test]
    fn test_valve_respects_interlock_and_bypass() {
        let mut sm = IrrigationStateMachine::new();
        assert_eq!(sm.valve(STEP, 80.0, false), ValveDecision::Closed);

        sm.schedule_timer = 0.05;
        assert_eq!(
            sm.valve(STEP, 80.0, false),
            ValveDecision::Open { active_minutes: 0.05 }
        );
        assert_eq!(sm.valve(STEP, 5.0, false), ValveDecision::DeniedReservoirLow);
        assert_eq!(sm.valve(STEP, 80.0, true), ValveDecision::Closed);
    }

    #[test]
    fn test_manual_toggle_cycle() {
        let cfg = RoomConfig::flower(6.0);
        let mut sm = IrrigationStateMachine::new();

        assert_eq!(
            sm.toggle_manual(&cfg, false, 3.0, false),
            ManualToggle::BlockedReservoirLow
        );
        assert_eq!(
            sm.toggle_manual(&cfg, false, 80.0, false),
            ManualToggle::Opened { seconds: 30.0 }
        );
        assert!((sm.manual_timer - 0.5).abs() < 1e-12);
        assert_eq!(sm.toggle_manual(&cfg, true, 80.0, false), ManualToggle::Closed);
        assert_eq!(sm.manual_timer, 0.0);
    }

    #[test]
    fn test_manual_timer_expires_after_shot_length() {
        let cfg = RoomConfig::flower(6.0);
        let mut sm = IrrigationStateMachine::new();
        sm.toggle_manual(&cfg, false, 80.0, false);
        let expired_at = (1..=10).find(|_| sm.decrement_timers(STEP));
        assert_eq!(expired_at, Some(5));
        assert!(!sm.is_requesting());
    }

    #[test]
    fn test_zero_shot_duration_falls_back_to_default_manual_length() {
        let mut cfg = RoomConfig::flower(6.0);
        cfg.shot_duration = 0.0;
        let mut sm = IrrigationStateMachine::new();
        assert_eq!(
            sm.toggle_manual(&cfg, false, 80.0, false),
            ManualToggle::Opened { seconds: 60.0 }
        );
    }

    #[test]
    fn test_trigger_counts_p1_and_flushes_p3() {
        let cfg = RoomConfig::flower(6.0);
        let mut sm = IrrigationStateMachine::new();
        let mut fired = cfg.effective_p1_shots() - 1;

        assert!(matches!(
            sm.trigger(&cfg, IrrigationPhase::P1, &mut fired, false),
            TriggerOutcome::Fired { .. }
        ));
        assert!(matches!(
            sm.trigger(&cfg, IrrigationPhase::P1, &mut fired, false),
            TriggerOutcome::QuotaSpent { .. }
        ));
        assert_eq!(fired, cfg.effective_p1_shots());

        sm.reset();
        assert_eq!(
            sm.trigger(&cfg, IrrigationPhase::P3, &mut fired, false),
            TriggerOutcome::Fired { minutes: 2.0 }
        );
        assert_eq!(
            sm.trigger(&cfg, IrrigationPhase::P0, &mut fired, false),
            TriggerOutcome::Unsupported
        );
    }
}
