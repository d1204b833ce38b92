//! # Simulation Engine
//!
//! Owns every piece of mutable simulation state: the clock, the rooms and
//! their scheduling contexts, the shared reservoir, fault injection and the
//! outgoing event queue. Nothing here is global, so independent engines can
//! run side by side (the stress test runs on a clone).
//!
//! Per fixed step:
//!
//! 1. midnight bookkeeping, shot timers count down
//! 2. per room: overrides -> irrigation schedule -> valve decision -> HVAC
//! 3. cooling arbitration across the flower rooms
//! 4. per room: climate and moisture physics, post-physics overrides
//! 5. reservoir drain and interlock enforcement
//! 6. per room: chaos on a reported copy, then history sampling

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::domain::{
    BatchRecord, ChaosSettings, EnvOverrides, FacilitySnapshot, IrrigationPhase, LogLevel,
    Readings, RoomId, RoomKind, RoomState, SavedState, SimCommand, SimEvent, StrainCatalog,
};
use crate::error::SimError;

use super::chaos::{ChaosOverlay, Reported};
use super::clock::{ClockStep, SimulationClock, DEFAULT_STEP_MINUTES, MINUTES_PER_DAY};
use super::facility::{self, LAYOUT};
use super::history::{HistoryRecorder, Recorded, Sample};
use super::hvac::{ArbitrationMode, CoolingAllocation, CoolingArbiter, HvacStateMachine};
use super::interlock::{AlertLimiter, ReservoirInterlock};
use super::irrigation::{
    IrrigationStateMachine, ManualToggle, TriggerOutcome, ValveDecision,
};
use super::lifecycle;
use super::physics::{self, round_to, ClimateDrivers, TranspirationInputs};
use super::stress;

/// Separates the chaos stream from the physics stream.
const CHAOS_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub step_minutes: f64,
    pub initial_speed: f64,
    pub start_time_of_day_min: f64,
    /// Virtual start timestamp; wall clock when unset
    pub start_timestamp: Option<DateTime<Utc>>,
    pub seed: u64,
    pub arbitration: ArbitrationMode,
    pub shared_cooling_capacity: f64,
    pub secondary_share_pct: f64,
    pub alert_interval_min: f64,
    /// Peak-to-peak probe noise per step (% VWC), Gaussian inside the band
    pub sensor_jitter: f64,
    pub stress_test_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_minutes: DEFAULT_STEP_MINUTES,
            initial_speed: 1.0,
            start_time_of_day_min: 360.0,
            start_timestamp: None,
            seed: 42,
            arbitration: ArbitrationMode::PrimaryPriority,
            shared_cooling_capacity: 5.0,
            secondary_share_pct: 10.0,
            alert_interval_min: 15.0,
            sensor_jitter: 0.02,
            stress_test_days: 65,
        }
    }
}

/// Running safety statistics. Read by the stress test.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SafetyCounters {
    /// Closed -> open valve transitions
    pub valve_cycles: u64,
    /// Actuation requests refused by the reservoir interlock
    pub denied_actuations: u64,
    /// Steps ending with a valve open against a depleted reservoir
    pub interlock_failures: u64,
    /// Lowest true VWC seen in a cropped, automatically irrigated room
    pub min_crop_vwc: Option<f64>,
}

/// Queued events plus the "publish now" flag.
#[derive(Debug, Clone, Default)]
struct Outbox {
    events: Vec<SimEvent>,
    muted: bool,
    publish_requested: bool,
}

impl Outbox {
    fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.muted {
            return;
        }
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Action => info!(?level, "{message}"),
            LogLevel::Warn => warn!(?level, "{message}"),
            LogLevel::Critical => error!(?level, "{message}"),
        }
        self.events.push(SimEvent::Log { level, message });
    }

    fn news(&mut self, text: impl Into<String>) {
        if !self.muted {
            self.events.push(SimEvent::News(text.into()));
        }
    }

    fn push(&mut self, event: SimEvent) {
        if !self.muted {
            self.events.push(event);
        }
    }
}

/// A room plus the state only the engine may see.
#[derive(Debug, Clone)]
struct RoomSlot {
    state: RoomState,
    irrigation: IrrigationStateMachine,
    overrides: EnvOverrides,
    /// Manual light override, dropped at the next photoperiod transition
    lights_override: Option<bool>,
    cooling: CoolingAllocation,
    reported: Reported,
    /// Last step's valve decision was a reservoir denial
    denied: bool,
}

/// Today's date at `time_of_day_min`, so virtual midnight and calendar
/// midnight coincide.
fn today_at(time_of_day_min: f64) -> DateTime<Utc> {
    let minutes = if time_of_day_min.is_finite() {
        time_of_day_min.rem_euclid(MINUTES_PER_DAY)
    } else {
        0.0
    };
    let midnight = Utc.from_utc_datetime(&Utc::now().date_naive().and_time(NaiveTime::MIN));
    midnight + ChronoDuration::milliseconds((minutes * 60_000.0).round() as i64)
}

/// Readings rounded the way the dashboard shows them.
fn displayed(readings: Readings) -> Readings {
    Readings {
        temp: round_to(readings.temp, 1),
        canopy_temp: round_to(readings.canopy_temp, 1),
        rh: round_to(readings.rh, 1),
        vwc: round_to(readings.vwc, 1),
        co2: readings.co2.round(),
        vpd: readings.vpd,
        ec: round_to(readings.ec, 2),
    }
}

fn sanitize_overrides(overrides: EnvOverrides) -> Result<EnvOverrides, SimError> {
    let values = [
        overrides.temp,
        overrides.rh,
        overrides.co2,
        overrides.canopy_temp,
        overrides.vwc,
        overrides.reservoir_level,
    ];
    if values.iter().flatten().any(|v| !v.is_finite()) {
        return Err(SimError::InvalidArgument(
            "environment overrides must be finite".to_string(),
        ));
    }
    Ok(EnvOverrides {
        rh: overrides.rh.map(|v| v.clamp(0.0, 100.0)),
        co2: overrides.co2.map(|v| v.clamp(physics::CO2_MIN, physics::CO2_MAX)),
        vwc: overrides.vwc.map(|v| v.clamp(0.0, 100.0)),
        reservoir_level: overrides.reservoir_level.map(|v| v.clamp(0.0, 100.0)),
        ..overrides
    })
}

#[derive(Debug, Clone)]
pub struct SimulationEngine {
    config: EngineConfig,
    clock: SimulationClock,
    slots: Vec<RoomSlot>,
    catalog: StrainCatalog,
    completed_batches: Vec<BatchRecord>,

    reservoir_level: f64,
    bypass_active: bool,

    hvac: HvacStateMachine,
    arbiter: CoolingArbiter,
    chaos: ChaosOverlay,
    interlock: ReservoirInterlock,
    alerts: AlertLimiter,

    rng: StdRng,
    chaos_rng: StdRng,
    counters: SafetyCounters,
    outbox: Outbox,
}

impl SimulationEngine {
    /// Build the facility. A missing or empty strain catalog is fatal.
    pub fn new(catalog: StrainCatalog, config: EngineConfig) -> Result<Self, SimError> {
        if catalog.flower.is_empty() {
            return Err(SimError::MissingStrainData(
                "no flower strains supplied".to_string(),
            ));
        }

        let start = config
            .start_timestamp
            .unwrap_or_else(|| today_at(config.start_time_of_day_min));
        let mut clock = SimulationClock::new(start, config.start_time_of_day_min, config.step_minutes);
        clock.set_speed(config.initial_speed);

        let mut rng = StdRng::seed_from_u64(config.seed);
        let chaos_rng = StdRng::seed_from_u64(config.seed ^ CHAOS_SEED_SALT);
        let arbiter = CoolingArbiter::new(
            config.arbitration,
            config.shared_cooling_capacity,
            config.secondary_share_pct,
        );
        let time_of_day = clock.time_of_day();

        let mut slots = Vec::with_capacity(LAYOUT.len());
        for layout in LAYOUT {
            let mut state = facility::seeded_room(layout.id, &catalog, start, &mut rng)?;
            if layout.kind == RoomKind::Flower {
                facility::backfill_history(&mut state);
            }
            let phase = super::irrigation::phase_at(&state.config, state.kind, time_of_day);
            state.phase = phase.phase;
            state.is_day = phase.is_day;
            state.lights_on = phase.is_day;
            state.next_shot_min = phase.next_shot_min.round() as u32;

            slots.push(RoomSlot {
                reported: Reported {
                    readings: displayed(state.readings()),
                    status: state.sensor_status,
                    valve_open: false,
                },
                cooling: arbiter.dedicated(false),
                state,
                irrigation: IrrigationStateMachine::new(),
                overrides: EnvOverrides::default(),
                lights_override: None,
                denied: false,
            });
        }

        let mut engine = Self {
            alerts: AlertLimiter::new(config.alert_interval_min),
            reservoir_level: facility::INITIAL_RESERVOIR_PCT,
            config,
            clock,
            slots,
            catalog,
            completed_batches: Vec::new(),
            bypass_active: false,
            hvac: HvacStateMachine::default(),
            arbiter,
            chaos: ChaosOverlay::new(ChaosSettings::default()),
            interlock: ReservoirInterlock,
            rng,
            chaos_rng,
            counters: SafetyCounters::default(),
            outbox: Outbox::default(),
        };
        engine.outbox.log(
            LogLevel::Info,
            format!("Physics engine initialized (seed {}).", engine.config.seed),
        );
        engine.outbox.publish_requested = true;
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    pub fn counters(&self) -> SafetyCounters {
        self.counters
    }

    pub fn reservoir_level(&self) -> f64 {
        self.reservoir_level
    }

    pub fn completed_batches(&self) -> &[BatchRecord] {
        &self.completed_batches
    }

    /// True (uncorrupted) state of a room.
    pub fn room(&self, id: RoomId) -> Option<&RoomState> {
        self.slots.iter().find(|s| s.state.id == id).map(|s| &s.state)
    }

    pub fn cooling_allocation(&self, id: RoomId) -> Option<CoolingAllocation> {
        self.slots.iter().find(|s| s.state.id == id).map(|s| s.cooling)
    }

    fn slot_index(&self, id: RoomId) -> Result<usize, SimError> {
        self.slots
            .iter()
            .position(|s| s.state.id == id)
            .ok_or(SimError::UnknownRoom(id))
    }

    fn slot_mut(&mut self, id: RoomId) -> Result<&mut RoomSlot, SimError> {
        self.slots
            .iter_mut()
            .find(|s| s.state.id == id)
            .ok_or(SimError::UnknownRoom(id))
    }

    /// Feed real elapsed time and run every fixed step it pays for.
    /// Returns the number of steps run.
    pub fn advance(&mut self, real: Duration) -> usize {
        self.clock.advance(real);
        let mut steps = 0;
        while let Some(step) = self.clock.next_step() {
            self.integrate(step);
            steps += 1;
        }
        steps
    }

    /// Run exactly one fixed step, ignoring speed and pause.
    pub fn step_once(&mut self) {
        let step = self.clock.tick();
        self.integrate(step);
    }

    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.outbox.events)
    }

    /// True once after anything that should reach observers immediately.
    pub fn take_publish_request(&mut self) -> bool {
        std::mem::take(&mut self.outbox.publish_requested)
    }

    /// Copy for the stress test: silent, fault-free, fresh counters.
    pub(crate) fn isolated_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.outbox = Outbox {
            muted: true,
            ..Outbox::default()
        };
        copy.chaos = ChaosOverlay::new(ChaosSettings::default());
        copy.counters = SafetyCounters::default();
        copy
    }

    fn reservoir_pin(&self) -> Option<f64> {
        self.slots.iter().find_map(|s| s.overrides.reservoir_level)
    }

    /// Close any valve the reservoir can no longer feed and mirror the level
    /// into every room.
    fn enforce_interlock(&mut self) {
        let permitted = self.interlock.permits(self.reservoir_level);
        for slot in &mut self.slots {
            slot.state.reservoir_level = self.reservoir_level;
            if !permitted && slot.state.valve_open {
                slot.state.valve_open = false;
                slot.state.valve_open_since = None;
            }
            slot.reported.valve_open = self.chaos.reported_valve(slot.state.valve_open);
        }
    }

    fn integrate(&mut self, step: ClockStep) {
        let now = self.clock.timestamp();
        let dt = step.minutes;

        if step.rolled_over {
            for slot in &mut self.slots {
                let room = &mut slot.state;
                if let Some(day) = lifecycle::start_new_day(room, now) {
                    self.outbox.log(
                        LogLevel::Info,
                        format!(
                            "[{}] New Day: {} ({}). Resetting shot count.",
                            room.id, day, room.current_lifecycle_phase
                        ),
                    );
                    for m in &room.active_milestones {
                        self.outbox.news(format!(
                            "ROOM {}: {} ({})",
                            room.id, m.milestone.title, m.strain_name
                        ));
                    }
                }
            }
        }

        for slot in &mut self.slots {
            if slot.irrigation.decrement_timers(dt) {
                slot.state.valve_open = false;
                slot.state.valve_open_since = None;
                self.outbox
                    .log(LogLevel::Action, format!("[{}] Manual Valve Auto-Closed.", slot.state.id));
                self.outbox.publish_requested = true;
            }
        }

        if let Some(level) = self.reservoir_pin() {
            self.reservoir_level = level;
        }
        let reservoir = self.reservoir_level;
        let bypass = self.bypass_active;

        // Control decisions
        let mut decisions = Vec::with_capacity(self.slots.len());
        for slot in &mut self.slots {
            let room = &mut slot.state;
            if let Some(temp) = slot.overrides.temp {
                room.temp = temp;
            }
            if let Some(rh) = slot.overrides.rh {
                room.rh = rh;
            }
            if slot.overrides.temp.is_some() || slot.overrides.rh.is_some() {
                room.vpd = physics::vpd(room.temp, room.rh);
            }

            let outcome = slot.irrigation.evaluate(
                &room.config,
                room.kind,
                step.time_of_day,
                dt,
                room.shots_fired_today,
                bypass,
            );
            if outcome.state.is_day != room.is_day {
                slot.lights_override = None;
            }
            room.phase = outcome.state.phase;
            room.is_day = outcome.state.is_day;
            room.next_shot_min = outcome.state.next_shot_min.round().max(0.0) as u32;
            room.shots_fired_today = outcome.shots_fired_today;
            room.lights_on = slot
                .lights_override
                .unwrap_or(outcome.state.is_day && room.config.light_intensity > 0.0);

            if let (Some(shot), false) = (outcome.shot, bypass) {
                let message = match shot.phase {
                    IrrigationPhase::P1 => format!(
                        "[{}] P1 IRRIGATION x{} ({}/{})",
                        room.id,
                        shot.count,
                        room.shots_fired_today,
                        room.config.effective_p1_shots()
                    ),
                    _ => format!("[{}] P2 MAINTENANCE SHOT", room.id),
                };
                self.outbox.log(LogLevel::Action, message);
            }

            let decision = slot.irrigation.valve(dt, reservoir, bypass);
            let denied = decision == ValveDecision::DeniedReservoirLow;
            if denied && !slot.denied {
                self.counters.denied_actuations += 1;
            }
            if denied && self.alerts.should_alert(room.id, step.elapsed_min) {
                self.outbox.log(
                    LogLevel::Critical,
                    format!("[{}] IRRIGATION BLOCKED: RESERVOIR LOW ({:.1}%)", room.id, reservoir),
                );
            }
            slot.denied = denied;

            let band = room.config.temp_band(room.is_day);
            room.hvac = self.hvac.step(&room.hvac, room.temp, band, step.elapsed_min);
            decisions.push(decision);
        }

        // Shared cooling plant
        let relay = |id: RoomId| {
            self.slots
                .iter()
                .any(|s| s.state.id == id && s.state.hvac.cool_relay)
        };
        let (primary, secondary) = self.arbiter.allocate(relay(RoomId::A), relay(RoomId::B));
        for slot in &mut self.slots {
            slot.cooling = match slot.state.id {
                RoomId::A => primary,
                RoomId::B => secondary,
                RoomId::V => self.arbiter.dedicated(slot.state.hvac.cool_relay),
            };
            slot.state.damper_pos = slot.cooling.damper_pos;
        }

        // Physics
        // Gaussian probe noise, truncated at +/- half the configured jitter
        let jitter = self.config.sensor_jitter.max(0.0) / 2.0;
        let noise = Normal::new(0.0, jitter / 2.0).ok().filter(|_| jitter > 0.0);
        let mut open_valves = 0;
        for (slot, decision) in self.slots.iter_mut().zip(&decisions) {
            let room = &mut slot.state;
            let has_crop = room.has_crop();

            if slot.overrides.temp.is_some() {
                room.co2 = physics::integrate_co2(
                    room.co2,
                    room.config.co2_target,
                    room.lights_on,
                    has_crop,
                    dt,
                );
            } else {
                let drivers = ClimateDrivers {
                    cool_relay: room.hvac.cool_relay,
                    heat_relay: room.hvac.heat_relay,
                    cooling_capacity: slot.cooling.capacity,
                    lights_on: room.lights_on,
                    has_crop,
                };
                physics::integrate_climate(room, &drivers, dt);
            }

            let inputs = TranspirationInputs {
                is_day: room.is_day,
                temp: room.temp,
                vpd: room.vpd,
                plant_scalar: physics::plant_size_scalar(room.kind, room.day_of_cycle, has_crop),
                has_crop,
                vwc: room.vwc,
            };
            let mut moisture = physics::transpiration_delta(&inputs, dt);
            if let ValveDecision::Open { active_minutes } = *decision {
                moisture += physics::irrigation_delta(active_minutes);
            }
            for probe in &mut room.sensors {
                let jitter_sample = noise
                    .map_or(0.0, |n| n.sample(&mut self.rng))
                    .clamp(-jitter, jitter);
                probe.vwc = (probe.vwc + moisture + jitter_sample).clamp(0.0, 100.0);
            }
            room.vwc = room.probe_average_vwc().clamp(0.0, 100.0);

            let was_open = room.valve_open;
            room.valve_open = decision.is_open();
            if room.valve_open {
                open_valves += 1;
                if !was_open {
                    self.counters.valve_cycles += 1;
                    room.valve_open_since = Some(now);
                }
            } else {
                room.valve_open_since = None;
            }

            room.canopy_temp = slot
                .overrides
                .canopy_temp
                .unwrap_or_else(|| physics::canopy_temp(room.temp, room.lights_on));
            if let Some(vwc) = slot.overrides.vwc {
                room.vwc = vwc;
                room.sensors.iter_mut().for_each(|p| p.vwc = vwc);
            }
            if let Some(co2) = slot.overrides.co2 {
                room.co2 = co2;
            }

            trace!(
                room = %room.id,
                temp = room.temp,
                rh = room.rh,
                vwc = room.vwc,
                co2 = room.co2,
                mode = %room.hvac.mode,
                valve = room.valve_open,
                "physics step"
            );
        }

        // Reservoir
        self.reservoir_level = match self.reservoir_pin() {
            Some(level) => level,
            None => self.interlock.drain(self.reservoir_level, open_valves, dt),
        };
        self.enforce_interlock();
        if !self.interlock.permits(self.reservoir_level)
            && self.slots.iter().any(|s| s.state.valve_open)
        {
            self.counters.interlock_failures += 1;
        }

        // Reporting
        for slot in &mut self.slots {
            let room = &mut slot.state;
            slot.reported = self
                .chaos
                .apply(displayed(room.readings()), room.valve_open, &mut self.chaos_rng);
            room.sensor_status = slot.reported.status;

            let sample = Sample {
                time: step.prev_time_of_day,
                next_time: step.time_of_day,
                readings: slot.reported.readings,
                phase: room.phase,
                valve_open: slot.reported.valve_open,
                latched: slot.irrigation.history_valve_latch,
                manual_active: slot.irrigation.manual_active(),
            };
            if HistoryRecorder.record(&mut room.history, &sample, dt) == Recorded::Appended {
                slot.irrigation.history_valve_latch = false;
                room.dryback_24h = round_to(room.history.vwc_range(), 1);
            }

            if room.has_crop() && room.kind.automated_irrigation() {
                let low = self.counters.min_crop_vwc.map_or(room.vwc, |m| m.min(room.vwc));
                self.counters.min_crop_vwc = Some(low);
            }
        }
    }

    /// Immutable, post-chaos view for observers.
    pub fn snapshot(&self) -> FacilitySnapshot {
        let room_states = self
            .slots
            .iter()
            .map(|slot| {
                let mut room = slot.state.clone();
                room.set_readings(&slot.reported.readings);
                room.sensor_status = slot.reported.status;
                room.valve_open = slot.reported.valve_open;
                room
            })
            .collect();

        FacilitySnapshot {
            room_states,
            time_of_day_min: self.clock.time_of_day(),
            virtual_timestamp: self.clock.timestamp(),
            speed: self.clock.speed(),
            paused: self.clock.is_paused(),
            bypass_active: self.bypass_active,
            reservoir_level: round_to(self.reservoir_level, 1),
        }
    }

    /// Apply a command, surfacing refusals as a WARN log line.
    pub fn dispatch(&mut self, command: SimCommand) {
        debug!(?command, "applying command");
        if let Err(e) = self.apply(command) {
            self.outbox.log(LogLevel::Warn, e.to_string());
        }
    }

    /// Apply one control message between steps.
    pub fn apply(&mut self, command: SimCommand) -> Result<(), SimError> {
        let now = self.clock.timestamp();
        match command {
            SimCommand::SetSpeed(speed) => {
                let applied = self.clock.set_speed(speed);
                self.outbox
                    .log(LogLevel::Info, format!("Simulation Speed Set to {applied}x"));
            }
            SimCommand::Pause => {
                self.clock.pause();
                self.outbox.log(LogLevel::Info, "Simulation paused.");
            }
            SimCommand::Resume => {
                self.clock.resume();
                self.outbox.log(LogLevel::Info, "Simulation resumed.");
            }
            SimCommand::SetConfig { room, patch } => {
                let slot = self.slot_mut(room)?;
                slot.state.config.apply_patch(&patch)?;
                self.outbox
                    .log(LogLevel::Info, format!("[{room}] Configuration updated."));
            }
            SimCommand::ToggleValve(room) => self.toggle_valve(room, now)?,
            SimCommand::ToggleLights(room) => {
                let slot = self.slot_mut(room)?;
                let lights_on = !slot.state.lights_on;
                slot.lights_override = Some(lights_on);
                slot.state.lights_on = lights_on;
                let state = if lights_on { "ON" } else { "OFF" };
                self.outbox
                    .log(LogLevel::Action, format!("[{room}] Lights manually switched {state}."));
                self.outbox.publish_requested = true;
            }
            SimCommand::SetReservoirLevel(level) => {
                if !level.is_finite() {
                    return Err(SimError::InvalidArgument(format!(
                        "reservoir level {level} is not a number"
                    )));
                }
                self.reservoir_level = level.clamp(0.0, 100.0);
                self.enforce_interlock();
                self.outbox.log(
                    LogLevel::Info,
                    format!("Reservoir level set to {:.1}%.", self.reservoir_level),
                );
                self.outbox.publish_requested = true;
            }
            SimCommand::SetChaos(patch) => {
                self.chaos.settings.apply_patch(&patch);
                self.enforce_interlock();
                self.outbox.log(
                    LogLevel::Warn,
                    format!(
                        "Fault injection {}.",
                        if self.chaos.is_active() { "armed" } else { "disarmed" }
                    ),
                );
            }
            SimCommand::SetBypass(active) => {
                self.bypass_active = active;
                if active {
                    for slot in &mut self.slots {
                        slot.irrigation.reset();
                        slot.state.valve_open = false;
                        slot.state.valve_open_since = None;
                    }
                    self.enforce_interlock();
                }
                self.outbox.log(
                    LogLevel::Warn,
                    format!(
                        "Recirculation bypass {}.",
                        if active { "ENGAGED: irrigation blocked" } else { "released" }
                    ),
                );
                self.outbox.publish_requested = true;
            }
            SimCommand::SetEnvOverride { room, overrides } => {
                let overrides = sanitize_overrides(overrides)?;
                self.slot_mut(room)?.overrides = overrides;
                if let Some(level) = overrides.reservoir_level {
                    self.reservoir_level = level;
                    self.enforce_interlock();
                }
                self.outbox
                    .log(LogLevel::Info, format!("[{room}] Environment override applied."));
            }
            SimCommand::ClearEnvOverride(room) => {
                self.slot_mut(room)?.overrides = EnvOverrides::default();
                self.outbox
                    .log(LogLevel::Info, format!("[{room}] Environment override cleared."));
            }
            SimCommand::SetSimDate(timestamp) => self.jump_to(timestamp),
            SimCommand::TriggerIrrigation { room, phase } => {
                let bypass = self.bypass_active;
                let slot = self.slot_mut(room)?;
                let outcome = slot.irrigation.trigger(
                    &slot.state.config,
                    phase,
                    &mut slot.state.shots_fired_today,
                    bypass,
                );
                match outcome {
                    TriggerOutcome::Fired { minutes } => self.outbox.log(
                        LogLevel::Action,
                        format!("[{room}] MANUAL {phase} SHOT TRIGGERED ({minutes:.1}m)"),
                    ),
                    TriggerOutcome::QuotaSpent { fired, quota } => self.outbox.log(
                        LogLevel::Warn,
                        format!("[{room}] P1 quota reached ({fired}/{quota}). Shot refused."),
                    ),
                    TriggerOutcome::BlockedBypass => self.outbox.log(
                        LogLevel::Warn,
                        format!("[{room}] Irrigation blocked: bypass active."),
                    ),
                    TriggerOutcome::Unsupported => {
                        return Err(SimError::InvalidArgument(format!(
                            "{phase} has no irrigation shot"
                        )))
                    }
                }
            }
            SimCommand::RunStressTest => self.run_stress_test(),
            SimCommand::HarvestBatch(room) => {
                let idx = self.slot_index(room)?;
                let slot = &mut self.slots[idx];
                let record = lifecycle::harvest(&mut slot.state, now)?;
                slot.irrigation.reset();
                slot.reported.valve_open = self.chaos.reported_valve(false);
                self.outbox.log(
                    LogLevel::Action,
                    format!("[{room}] HARVEST COMPLETED. Batch {} Archived.", record.batch_id),
                );
                self.outbox.news(format!(
                    "HARVEST COMPLETE IN ROOM {room}. YIELD DATA PROCESSING..."
                ));
                self.completed_batches.push(record);
                self.outbox.publish_requested = true;
            }
            SimCommand::FlipToFlower(room) => {
                lifecycle::flip_to_flower(&mut self.slot_mut(room)?.state, now)?;
                self.outbox.log(
                    LogLevel::Action,
                    format!("[{room}] FLIPPED TO FLOWER. Config updated to 12/12."),
                );
                self.outbox
                    .news(format!("ROOM {room} FLIPPED TO FLOWER PHASE."));
            }
            SimCommand::AddStrain { room, strain_id } => {
                let strain = self
                    .catalog
                    .find_flower(&strain_id)
                    .cloned()
                    .ok_or(SimError::UnknownStrain(strain_id))?;
                let name = strain.name.clone();
                let idx = self.slot_index(room)?;
                lifecycle::add_strain(&mut self.slots[idx].state, strain, now, &mut self.rng);
                self.outbox
                    .log(LogLevel::Info, format!("[{room}] Added strain {name}."));
            }
            SimCommand::AddCustomStrain { room, strain } => {
                let name = strain.name.clone();
                let idx = self.slot_index(room)?;
                lifecycle::add_strain(&mut self.slots[idx].state, strain, now, &mut self.rng);
                self.outbox
                    .log(LogLevel::Info, format!("[{room}] Added custom strain {name}."));
            }
            SimCommand::RemoveStrain { room, index } => {
                let removed = lifecycle::remove_strain(&mut self.slot_mut(room)?.state, index)?;
                self.outbox
                    .log(LogLevel::Info, format!("[{room}] Removed strain {}.", removed.name));
                self.outbox.publish_requested = true;
            }
            SimCommand::UpdateStrain {
                room,
                index,
                strain,
            } => {
                lifecycle::update_strain(&mut self.slot_mut(room)?.state, index, strain, now)?;
            }
            SimCommand::SetDay { room, day } => {
                lifecycle::set_day(&mut self.slot_mut(room)?.state, day, now)?;
            }
            SimCommand::SetStartDate { room, date } => {
                lifecycle::set_start_date(&mut self.slot_mut(room)?.state, date, now);
                self.outbox
                    .log(LogLevel::Info, format!("[{room}] Start Date Manually Updated."));
                self.outbox.publish_requested = true;
            }
        }
        Ok(())
    }

    fn toggle_valve(&mut self, room: RoomId, now: DateTime<Utc>) -> Result<(), SimError> {
        let reservoir = self.reservoir_level;
        let bypass = self.bypass_active;
        let idx = self.slot_index(room)?;
        let slot = &mut self.slots[idx];
        let outcome = slot.irrigation.toggle_manual(
            &slot.state.config,
            slot.state.valve_open,
            reservoir,
            bypass,
        );

        let (level, message) = match outcome {
            ManualToggle::Opened { seconds } => {
                slot.state.valve_open = true;
                slot.state.valve_open_since = Some(now);
                if let Some(last) = slot.state.history.last_mut() {
                    last.valve = 1;
                }
                self.counters.valve_cycles += 1;
                (
                    LogLevel::Action,
                    format!("[{room}] Manual Valve OPEN (Safety Timeout: {seconds}s)."),
                )
            }
            ManualToggle::Closed => {
                slot.state.valve_open = false;
                slot.state.valve_open_since = None;
                if let Some(last) = slot.state.history.last_mut() {
                    last.valve = 0;
                }
                (
                    LogLevel::Action,
                    format!("[{room}] Manual Valve CLOSED (User Cancel)."),
                )
            }
            ManualToggle::BlockedReservoirLow => {
                self.counters.denied_actuations += 1;
                (
                    LogLevel::Critical,
                    format!("[{room}] CANNOT OPEN VALVE. RESERVOIR LOW ({reservoir:.1}%)."),
                )
            }
            ManualToggle::BlockedBypass => (
                LogLevel::Warn,
                format!("[{room}] Valve locked: bypass active."),
            ),
        };
        slot.reported.valve_open = self.chaos.reported_valve(slot.state.valve_open);
        self.outbox.log(level, message);
        self.outbox.publish_requested = true;
        Ok(())
    }

    /// Move the virtual date without replaying physics. Timers, valves and
    /// HVAC lockouts go back to neutral and lifecycles are re-derived. Landing
    /// on another calendar date also starts a fresh shot count.
    fn jump_to(&mut self, timestamp: DateTime<Utc>) {
        let new_date = self.clock.timestamp().date_naive() != timestamp.date_naive();
        self.clock.jump_to(timestamp);
        for slot in &mut self.slots {
            Self::reseed(slot);
            if new_date {
                slot.state.shots_fired_today = 0;
            }
            lifecycle::synchronize(&mut slot.state, timestamp);
        }
        self.alerts.reset();
        self.enforce_interlock();
        self.outbox.log(
            LogLevel::Warn,
            format!("Simulation Time Jumped to {}", timestamp.format("%Y-%m-%d %H:%M")),
        );
        self.outbox.publish_requested = true;
    }

    fn reseed(slot: &mut RoomSlot) {
        slot.irrigation.reset();
        slot.lights_override = None;
        slot.denied = false;
        slot.state.valve_open = false;
        slot.state.valve_open_since = None;
        slot.state.hvac = HvacStateMachine::neutral();
    }

    fn run_stress_test(&mut self) {
        self.outbox
            .log(LogLevel::Critical, "--- STARTING WARP-SPEED STRESS TEST ---");
        let report = stress::run(self, self.config.stress_test_days);
        self.outbox.log(
            LogLevel::Critical,
            format!(
                "--- STRESS TEST COMPLETE: {} days in {:.2}s ---",
                report.total_simulated_days, report.duration_seconds
            ),
        );
        self.outbox.push(SimEvent::StressTestReport(report));
        self.clock.set_speed(1.0);
        self.clock.resume();
    }

    /// Persistable state: true room states, never the chaos view.
    pub fn export(&self) -> SavedState {
        SavedState {
            virtual_timestamp: self.clock.timestamp(),
            time_of_day_min: self.clock.time_of_day(),
            reservoir_level: self.reservoir_level,
            rooms: self.slots.iter().map(|s| s.state.clone()).collect(),
            completed_batches: self.completed_batches.clone(),
        }
    }

    /// Load saved state. Scheduling contexts are re-seeded to neutral rather
    /// than inferred, so no stale shot timer survives a restore.
    pub fn restore(&mut self, saved: SavedState) -> Result<(), SimError> {
        for slot in &self.slots {
            if !saved.rooms.iter().any(|r| r.id == slot.state.id) {
                return Err(SimError::RestoreMismatch(format!(
                    "room {} missing",
                    slot.state.id
                )));
            }
        }
        if let Some(room) = saved
            .rooms
            .iter()
            .find(|r| r.kind != facility::layout(r.id).kind)
        {
            return Err(SimError::RestoreMismatch(format!(
                "room {} has type {}",
                room.id, room.kind
            )));
        }

        let speed = self.clock.speed();
        let paused = self.clock.is_paused();
        self.clock = SimulationClock::new(
            saved.virtual_timestamp,
            saved.time_of_day_min,
            self.config.step_minutes,
        );
        self.clock.set_speed(speed);
        if paused {
            self.clock.pause();
        }

        let now = saved.virtual_timestamp;
        for room in saved.rooms {
            let chaos = &self.chaos;
            if let Some(slot) = self.slots.iter_mut().find(|s| s.state.id == room.id) {
                slot.state = room;
                Self::reseed(slot);
                slot.overrides = EnvOverrides::default();
                lifecycle::synchronize(&mut slot.state, now);
                slot.reported = Reported {
                    readings: displayed(slot.state.readings()),
                    status: slot.state.sensor_status,
                    valve_open: chaos.reported_valve(false),
                };
            }
        }

        self.reservoir_level = if saved.reservoir_level.is_finite() {
            saved.reservoir_level.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.completed_batches = saved.completed_batches;
        self.alerts.reset();
        self.enforce_interlock();
        self.outbox.log(LogLevel::Info, "Saved state restored.");
        self.outbox.publish_requested = true;
        Ok(())
    }
}
