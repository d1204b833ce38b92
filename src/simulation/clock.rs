//! # Simulation Clock
//!
//! Converts wall-clock time into virtual minutes and hands them out as
//! fixed-size physics steps. The step count is the source of truth: time of
//! day, the virtual timestamp and the monotonic elapsed counter are all
//! derived from it, so nothing drifts no matter how many steps run.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

pub const MINUTES_PER_DAY: f64 = 1440.0;
pub const DEFAULT_STEP_MINUTES: f64 = 0.1;
pub const MIN_STEP_MINUTES: f64 = 0.01;
pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 1000.0;

/// Absorbs float error when draining the step budget.
const BUDGET_EPSILON: f64 = 1e-6;

/// One fixed physics step handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockStep {
    /// Time of day before the step (minutes)
    pub prev_time_of_day: f64,
    /// Time of day after the step (minutes, `[0, 1440)`)
    pub time_of_day: f64,
    /// Step size in simulated minutes
    pub minutes: f64,
    /// True on exactly the step that wrapped midnight
    pub rolled_over: bool,
    /// Monotonic simulated minutes since the clock was created
    pub elapsed_min: f64,
}

#[derive(Debug, Clone)]
pub struct SimulationClock {
    step_minutes: f64,
    speed: f64,
    paused: bool,
    budget_min: f64,

    /// Timestamp and time of day at the last anchor (creation or jump)
    anchor_timestamp: DateTime<Utc>,
    anchor_time_of_day: f64,
    steps_since_anchor: u64,

    /// Never reset, drives lockout timing
    total_steps: u64,
}

impl SimulationClock {
    pub fn new(start: DateTime<Utc>, start_time_of_day_min: f64, step_minutes: f64) -> Self {
        let step_minutes = if step_minutes.is_finite() {
            step_minutes.max(MIN_STEP_MINUTES)
        } else {
            DEFAULT_STEP_MINUTES
        };
        let tod = if start_time_of_day_min.is_finite() {
            start_time_of_day_min.rem_euclid(MINUTES_PER_DAY)
        } else {
            0.0
        };

        Self {
            step_minutes,
            speed: 1.0,
            paused: false,
            budget_min: 0.0,
            anchor_timestamp: start,
            anchor_time_of_day: tod,
            steps_since_anchor: 0,
            total_steps: 0,
        }
    }

    pub fn step_minutes(&self) -> f64 {
        self.step_minutes
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Clamp into `[MIN_SPEED, MAX_SPEED]`; non-finite input falls back to 1x.
    /// Returns the speed actually applied.
    pub fn set_speed(&mut self, speed: f64) -> f64 {
        self.speed = if speed.is_finite() {
            speed.clamp(MIN_SPEED, MAX_SPEED)
        } else {
            1.0
        };
        self.speed
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resuming never bursts: any budget left over from before the pause is
    /// dropped.
    pub fn resume(&mut self) {
        self.paused = false;
        self.budget_min = 0.0;
    }

    /// Add real elapsed time to the step budget. At 1x one real minute is one
    /// simulated minute.
    pub fn advance(&mut self, real: Duration) {
        if self.paused {
            return;
        }
        self.budget_min += real.as_secs_f64() / 60.0 * self.speed;
    }

    /// Take one fixed step out of the budget, if a full one is available.
    pub fn next_step(&mut self) -> Option<ClockStep> {
        if self.paused || self.budget_min + BUDGET_EPSILON < self.step_minutes {
            return None;
        }
        self.budget_min = (self.budget_min - self.step_minutes).max(0.0);
        Some(self.tick())
    }

    /// Advance exactly one step regardless of budget. Used by backfills and
    /// the stress test.
    pub fn tick(&mut self) -> ClockStep {
        let prev_abs = self.absolute_minutes();
        self.steps_since_anchor += 1;
        self.total_steps += 1;
        let abs = self.absolute_minutes();

        let prev_day = (prev_abs / MINUTES_PER_DAY).floor();
        let day = (abs / MINUTES_PER_DAY).floor();

        ClockStep {
            prev_time_of_day: prev_abs.rem_euclid(MINUTES_PER_DAY),
            time_of_day: abs.rem_euclid(MINUTES_PER_DAY),
            minutes: self.step_minutes,
            rolled_over: day > prev_day,
            elapsed_min: self.elapsed_min(),
        }
    }

    pub fn time_of_day(&self) -> f64 {
        self.absolute_minutes().rem_euclid(MINUTES_PER_DAY)
    }

    pub fn elapsed_min(&self) -> f64 {
        self.total_steps as f64 * self.step_minutes
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        let millis = (self.steps_since_anchor as f64 * self.step_minutes * 60_000.0).round();
        self.anchor_timestamp + ChronoDuration::milliseconds(millis as i64)
    }

    /// Re-anchor the virtual timestamp. Time of day, the elapsed counter and
    /// the step budget are left alone; nothing is replayed.
    pub fn jump_to(&mut self, timestamp: DateTime<Utc>) {
        self.anchor_time_of_day = self.time_of_day();
        self.anchor_timestamp = timestamp;
        self.steps_since_anchor = 0;
    }

    fn absolute_minutes(&self) -> f64 {
        self.anchor_time_of_day + self.steps_since_anchor as f64 * self.step_minutes
    }
}
