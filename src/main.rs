use anyhow::Result;
use growroom_sim::config::Settings;
use growroom_sim::controller::{self, SimulationObserver};
use growroom_sim::domain::{SimEvent, StrainCatalog};
use growroom_sim::simulation::{EngineConfig, SimulationEngine};
use growroom_sim::telemetry::{init_tracing, shutdown_signal};
use std::time::Duration;
use tracing::{info, warn};

/// Logs a one-line facility summary every `every` state updates.
struct SummaryLogger {
    every: u64,
    seen: u64,
}

impl SimulationObserver for SummaryLogger {
    fn on_event(&mut self, event: &SimEvent) {
        match event {
            SimEvent::StateUpdate(snapshot) => {
                self.seen += 1;
                if self.seen % self.every != 0 {
                    return;
                }
                for room in &snapshot.room_states {
                    info!(
                        room = %room.id,
                        phase = %room.phase,
                        temp = room.temp,
                        rh = room.rh,
                        vwc = room.vwc,
                        hvac = %room.hvac.mode,
                        valve = room.valve_open,
                        "room status"
                    );
                }
                info!(
                    time = %snapshot.virtual_timestamp,
                    speed = snapshot.speed,
                    reservoir = snapshot.reservoir_level,
                    "facility status"
                );
            }
            SimEvent::News(text) => info!(news = %text, "news"),
            SimEvent::StressTestReport(report) => info!(?report, "stress test report"),
            // Already mirrored to tracing by the engine
            SimEvent::Log { .. } => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::load()?;
    let engine = SimulationEngine::new(
        StrainCatalog::house_defaults(),
        EngineConfig::from(&settings.simulation),
    )?;

    info!(
        seed = settings.simulation.seed,
        step_minutes = settings.simulation.step_minutes,
        arbitration = %settings.simulation.arbitration,
        "starting Grow Room Simulator"
    );

    let handle = controller::spawn_simulation(engine, &settings.simulation);
    let observer = controller::spawn_observer(
        &handle,
        SummaryLogger {
            every: 50,
            seen: 0,
        },
    );

    let watchdog_period = settings.simulation.tick_interval() * 50;
    let mut watchdog = tokio::time::interval(watchdog_period.max(Duration::from_secs(1)));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = watchdog.tick() => {
                if !handle.is_responsive(watchdog_period) {
                    warn!("simulation loop heartbeat is stale");
                }
            }
        }
    }

    let engine = handle.shutdown().await?;
    observer.await?;
    let saved = engine.export();
    info!(
        time = %saved.virtual_timestamp,
        batches = saved.completed_batches.len(),
        "shutdown complete"
    );
    Ok(())
}
