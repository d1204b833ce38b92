//! History sampling at a 5-minute virtual cadence.

use crate::domain::{HistoryBuffer, HistoryPoint, IrrigationPhase, Readings};

pub const SAMPLE_INTERVAL_MIN: f64 = 5.0;

/// What to record for the step that just ran.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Time of day at the start of the step
    pub time: f64,
    /// Time of day at the end of the step
    pub next_time: f64,
    pub readings: Readings,
    pub phase: IrrigationPhase,
    /// Reported valve state
    pub valve_open: bool,
    /// A scheduled shot ran since the previous sample
    pub latched: bool,
    /// A manual shot is in progress
    pub manual_active: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistoryRecorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Appended,
    Patched,
    Skipped,
}

impl HistoryRecorder {
    /// True when the step from `prev` to `next` (times of day) crosses a
    /// sample boundary. Midnight is a boundary.
    pub fn crosses_boundary(prev: f64, next: f64, step: f64) -> bool {
        let prev_slot = (prev / SAMPLE_INTERVAL_MIN).floor();
        let next_slot = (next / SAMPLE_INTERVAL_MIN).floor();
        step >= SAMPLE_INTERVAL_MIN || next < prev || next_slot > prev_slot
    }

    /// Append on a boundary (or into an empty buffer); otherwise live-patch
    /// the latest point while water is flowing. Returns what happened so the
    /// caller can clear its latch.
    pub fn record(&self, history: &mut HistoryBuffer, sample: &Sample, step: f64) -> Recorded {
        if history.is_empty() || Self::crosses_boundary(sample.time, sample.next_time, step) {
            history.push(HistoryPoint {
                time: sample.time,
                vwc: sample.readings.vwc,
                temp: sample.readings.temp,
                rh: sample.readings.rh,
                vpd: sample.readings.vpd,
                ec: sample.readings.ec,
                co2: sample.readings.co2,
                phase: sample.phase.ordinal(),
                valve: u8::from(sample.valve_open || sample.latched),
            });
            return Recorded::Appended;
        }

        if sample.manual_active || sample.valve_open {
            if let Some(last) = history.last_mut() {
                last.vwc = sample.readings.vwc;
                last.valve = 1;
                return Recorded::Patched;
            }
        }
        Recorded::Skipped
    }
}
