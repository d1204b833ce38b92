//! Warp-speed endurance run.
//!
//! Drives a silent, fault-free copy of the engine through many simulated
//! days with the real physics and the real interlock, then reports what the
//! safety layer did. The live engine is never touched.

use std::time::Instant;
use tracing::info;

use crate::domain::{PlantHealth, SafetyInterventions, StressTestReport};

use super::clock::MINUTES_PER_DAY;
use super::engine::SimulationEngine;

/// Substrate below this (% VWC) counts as a dead crop.
pub const WILT_THRESHOLD_VWC: f64 = 5.0;

pub fn run(engine: &SimulationEngine, days: u32) -> StressTestReport {
    let started = Instant::now();
    let mut sim = engine.isolated_copy();
    let steps = (days as f64 * MINUTES_PER_DAY / sim.clock().step_minutes()).round() as u64;

    for _ in 0..steps {
        sim.step_once();
    }

    let counters = sim.counters();
    let plant_health = match counters.min_crop_vwc {
        Some(vwc) if vwc < WILT_THRESHOLD_VWC => PlantHealth::Died,
        _ => PlantHealth::Survived,
    };
    let report = StressTestReport {
        total_simulated_days: days,
        total_valve_cycles: counters.valve_cycles,
        safety_interventions: SafetyInterventions {
            success: counters.denied_actuations,
            fail: counters.interlock_failures,
        },
        plant_health,
        duration_seconds: started.elapsed().as_secs_f64(),
    };
    info!(
        days,
        steps,
        valve_cycles = report.total_valve_cycles,
        interventions = report.safety_interventions.success,
        failures = report.safety_interventions.fail,
        health = ?report.plant_health,
        "stress test finished"
    );
    report
}
