//! Endurance runs
//!
//! - The full-length stress test (a whole crop cycle at the fixed step)
//! - The real-time loop at maximum speed must keep its heartbeat fresh and
//!   keep publishing while commands are flooding in

use chrono::{TimeZone, Utc};
use std::time::{Duration, Instant};

use growroom_sim::config::SimulationSettings;
use growroom_sim::controller::spawn_simulation;
use growroom_sim::domain::{RoomId, SimCommand, StrainCatalog};
use growroom_sim::simulation::{stress, EngineConfig, SimulationEngine};

fn engine(settings: &SimulationSettings) -> SimulationEngine {
    SimulationEngine::new(
        StrainCatalog::house_defaults(),
        EngineConfig {
            start_timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap()),
            ..EngineConfig::from(settings)
        },
    )
    .unwrap()
}

#[test]
#[ignore]
fn full_cycle_stress_run() {
    let settings = SimulationSettings::default();
    let engine = engine(&settings);

    let report = stress::run(&engine, settings.stress_test_days);

    println!(
        "{} days, {} valve cycles, {} interventions, {} failures in {:.1}s",
        report.total_simulated_days,
        report.total_valve_cycles,
        report.safety_interventions.success,
        report.safety_interventions.fail,
        report.duration_seconds
    );
    assert_eq!(report.safety_interventions.fail, 0);
    assert!(report.total_valve_cycles > 0);
    // The reservoir never refills, so a long run ends in interlock denials
    assert!(report.safety_interventions.success > 0);
    println!("plant health: {:?}", report.plant_health);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore]
async fn max_speed_loop_stays_responsive_under_command_flood() {
    let settings = SimulationSettings::default();
    let handle = spawn_simulation(engine(&settings), &settings);
    handle.send(SimCommand::SetSpeed(1000.0)).await.unwrap();
    let start = handle.snapshot().virtual_timestamp;

    let began = Instant::now();
    while began.elapsed() < Duration::from_secs(5) {
        for room in [RoomId::A, RoomId::B, RoomId::V] {
            handle.send(SimCommand::ToggleLights(room)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(handle.is_responsive(Duration::from_secs(1)));
    }

    let simulated = handle.snapshot().virtual_timestamp - start;
    println!("simulated {} minutes in 5s", simulated.num_minutes());
    // 5 s at 1000x is ~83 virtual minutes
    assert!(simulated.num_minutes() >= 60);
    handle.shutdown().await.unwrap();
}
