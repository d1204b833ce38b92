//! # Simulation Driver
//!
//! Runs a [`SimulationEngine`] on a tokio task. Control messages arrive on an
//! mpsc queue and are applied strictly between ticks; the last committed
//! snapshot is published on a watch channel and every event on a broadcast
//! channel. Cancellation returns the engine to the caller.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::SimulationSettings;
use crate::domain::{FacilitySnapshot, LogLevel, SimCommand, SimEvent};
use crate::simulation::SimulationEngine;

const COMMAND_QUEUE_DEPTH: usize = 256;
const EVENT_BUFFER: usize = 1024;

/// Consumer of the outgoing event stream (dashboards, recorders).
#[cfg_attr(test, mockall::automock)]
pub trait SimulationObserver: Send + 'static {
    fn on_event(&mut self, event: &SimEvent);
}

/// Control surface of a running simulation task.
pub struct SimulationHandle {
    commands: mpsc::Sender<SimCommand>,
    snapshot: watch::Receiver<Arc<FacilitySnapshot>>,
    events: broadcast::Sender<SimEvent>,
    cancel: CancellationToken,
    heartbeat: Arc<RwLock<std::time::Instant>>,
    task: JoinHandle<SimulationEngine>,
}

impl SimulationHandle {
    pub async fn send(&self, command: SimCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .context("simulation loop is not running")
    }

    /// Last committed snapshot.
    pub fn snapshot(&self) -> Arc<FacilitySnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<Arc<FacilitySnapshot>> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.events.subscribe()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// False once the loop has not stamped its heartbeat for `max_age`.
    pub fn is_responsive(&self, max_age: Duration) -> bool {
        self.heartbeat.read().elapsed() <= max_age
    }

    /// Stop the loop after the current tick and hand the engine back.
    pub async fn shutdown(self) -> Result<SimulationEngine> {
        self.cancel.cancel();
        self.task.await.context("simulation task failed")
    }
}

struct Channels {
    snapshot: watch::Sender<Arc<FacilitySnapshot>>,
    events: broadcast::Sender<SimEvent>,
}

impl Channels {
    fn forward(&self, engine: &mut SimulationEngine) {
        for event in engine.drain_events() {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    fn publish(&self, engine: &SimulationEngine) {
        let snapshot = Arc::new(engine.snapshot());
        self.snapshot.send_replace(snapshot.clone());
        let _ = self.events.send(SimEvent::StateUpdate(snapshot));
    }
}

pub fn spawn_simulation(engine: SimulationEngine, settings: &SimulationSettings) -> SimulationHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(engine.snapshot()));
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
    let cancel = CancellationToken::new();
    let heartbeat = Arc::new(RwLock::new(std::time::Instant::now()));

    let channels = Channels {
        snapshot: snapshot_tx,
        events: event_tx.clone(),
    };
    let task = tokio::spawn(run_loop(
        engine,
        settings.tick_interval(),
        settings.snapshot_interval(),
        command_rx,
        channels,
        cancel.clone(),
        heartbeat.clone(),
    ));

    SimulationHandle {
        commands: command_tx,
        snapshot: snapshot_rx,
        events: event_tx,
        cancel,
        heartbeat,
        task,
    }
}

async fn run_loop(
    mut engine: SimulationEngine,
    tick_every: Duration,
    publish_every: Duration,
    mut commands: mpsc::Receiver<SimCommand>,
    channels: Channels,
    cancel: CancellationToken,
    heartbeat: Arc<RwLock<std::time::Instant>>,
) -> SimulationEngine {
    let mut tick = interval(tick_every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut publish = interval(publish_every);
    publish.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_tick = Instant::now();

    info!(
        tick_ms = tick_every.as_millis() as u64,
        publish_ms = publish_every.as_millis() as u64,
        "simulation loop started"
    );
    channels.forward(&mut engine);
    channels.publish(&engine);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            Some(command) = commands.recv() => {
                let was_paused = engine.is_paused();
                engine.dispatch(command);
                let paused = engine.is_paused();
                if was_paused && !paused {
                    // No catch-up for time spent paused
                    tick.reset();
                    publish.reset();
                    last_tick = Instant::now();
                }
                channels.forward(&mut engine);
                if engine.take_publish_request() || was_paused != paused {
                    channels.publish(&engine);
                }
            }

            _ = tick.tick() => {
                *heartbeat.write() = std::time::Instant::now();
                let now = Instant::now();
                let real = now - last_tick;
                last_tick = now;
                if engine.is_paused() {
                    continue;
                }

                let checkpoint = engine.clone();
                match catch_unwind(AssertUnwindSafe(|| engine.advance(real))) {
                    Ok(steps) => trace!(steps, "tick"),
                    Err(_) => {
                        engine = checkpoint;
                        error!("simulation tick panicked; state rolled back");
                        let _ = channels.events.send(SimEvent::Log {
                            level: LogLevel::Critical,
                            message: "Simulation tick failed; state rolled back.".to_string(),
                        });
                    }
                }
                channels.forward(&mut engine);
                if engine.take_publish_request() {
                    channels.publish(&engine);
                }
            }

            _ = publish.tick() => {
                if !engine.is_paused() {
                    channels.publish(&engine);
                }
            }
        }
    }

    channels.forward(&mut engine);
    warn!("simulation loop stopped");
    engine
}

/// Feed the event stream of `handle` into `observer` until cancellation.
pub fn spawn_observer<O: SimulationObserver>(
    handle: &SimulationHandle,
    mut observer: O,
) -> JoinHandle<()> {
    let mut events = handle.subscribe();
    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => observer.on_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "observer lagging behind event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}
