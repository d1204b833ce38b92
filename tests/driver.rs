//! The async tick loop: command queue, snapshot publication, event stream.

use chrono::{TimeZone, Utc};
use growroom_sim::config::SimulationSettings;
use growroom_sim::controller::spawn_simulation;
use growroom_sim::domain::{LogLevel, RoomId, SimCommand, SimEvent, StrainCatalog};
use growroom_sim::simulation::{EngineConfig, SimulationEngine};
use std::time::Duration;
use tokio::time::timeout;

fn settings() -> SimulationSettings {
    SimulationSettings {
        tick_interval_ms: 10,
        snapshot_interval_ms: 20,
        stress_test_days: 1,
        ..Default::default()
    }
}

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

#[tokio::test]
async fn stress_test_report_arrives_on_event_stream() {
    let settings = settings();
    let handle = spawn_simulation(engine(&settings), &settings);
    let mut events = handle.subscribe();

    handle.send(SimCommand::RunStressTest).await.unwrap();

    let report = timeout(Duration::from_secs(30), async {
        loop {
            match events.recv().await {
                Ok(SimEvent::StressTestReport(report)) => break report,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {e}"),
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(report.total_simulated_days, 1);
    assert_eq!(report.safety_interventions.fail, 0);
    assert_eq!(handle.snapshot().speed, 1.0);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn refused_command_becomes_a_warning() {
    let settings = settings();
    let handle = spawn_simulation(engine(&settings), &settings);
    let mut events = handle.subscribe();

    // Room A is mid-flower, so it cannot be flipped
    handle.send(SimCommand::FlipToFlower(RoomId::A)).await.unwrap();

    let level = timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(SimEvent::Log { level, .. }) = events.recv().await {
                break level;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(level, LogLevel::Warn);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_returns_the_engine_for_persistence() {
    let settings = settings();
    let handle = spawn_simulation(engine(&settings), &settings);
    handle.send(SimCommand::HarvestBatch(RoomId::B)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let engine = handle.shutdown().await.unwrap();
    let saved = engine.export();
    assert_eq!(saved.completed_batches.len(), 1);
    assert_eq!(saved.completed_batches[0].room_id, RoomId::B);
}
