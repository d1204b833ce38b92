//! Facility layout and initial room seeding.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::Rng;

use crate::domain::{
    HistoryBuffer, HistoryPoint, HvacState, IrrigationPhase, LifecyclePhase, RoomConfig, RoomId,
    RoomKind, RoomState, SensorProbe, SensorStatus, StrainCatalog,
};
use crate::error::SimError;

use super::clock::MINUTES_PER_DAY;
use super::history::SAMPLE_INTERVAL_MIN;
use super::irrigation::{IrrigationStateMachine, ValveDecision};
use super::lifecycle;
use super::physics::{self, round_to, TranspirationInputs};

pub const INITIAL_RESERVOIR_PCT: f64 = 85.0;
pub const FLOWER_START_DAY: u32 = 21;
pub const VEG_START_DAY: u32 = 14;

/// Static description of a room slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomLayout {
    pub id: RoomId,
    pub name: &'static str,
    pub kind: RoomKind,
    pub lights_on_hour: f64,
    pub probes: u32,
}

/// Two flower rooms on staggered photoperiods plus the nursery.
pub const LAYOUT: [RoomLayout; 3] = [
    RoomLayout {
        id: RoomId::A,
        name: "FLOWER ROOM A",
        kind: RoomKind::Flower,
        lights_on_hour: 6.0,
        probes: 10,
    },
    RoomLayout {
        id: RoomId::B,
        name: "FLOWER ROOM B",
        kind: RoomKind::Flower,
        lights_on_hour: 18.0,
        probes: 10,
    },
    RoomLayout {
        id: RoomId::V,
        name: "VEG / NURSERY",
        kind: RoomKind::Veg,
        lights_on_hour: 6.0,
        probes: 4,
    },
];

pub fn layout(id: RoomId) -> RoomLayout {
    match id {
        RoomId::A => LAYOUT[0],
        RoomId::B => LAYOUT[1],
        RoomId::V => LAYOUT[2],
    }
}

fn default_config(layout: &RoomLayout) -> RoomConfig {
    match layout.kind {
        RoomKind::Flower => RoomConfig::flower(layout.lights_on_hour),
        RoomKind::Veg => RoomConfig::veg(layout.lights_on_hour),
    }
}

/// An idle, empty room with neutral readings and evenly wet probes.
pub fn empty_room(id: RoomId) -> RoomState {
    let layout = layout(id);
    let config = default_config(&layout);
    let vwc = 45.0;
    RoomState {
        id,
        name: layout.name.to_string(),
        kind: layout.kind,
        current_batch_id: None,
        current_lifecycle_phase: LifecyclePhase::Idle,
        veg_start_date: None,
        flower_start_date: None,
        strains: Vec::new(),
        day_of_cycle: 0,
        active_milestones: Vec::new(),
        phase: IrrigationPhase::P0,
        is_day: true,
        lights_on: true,
        next_shot_min: 0,
        shots_fired_today: 0,
        valve_open: false,
        valve_open_since: None,
        reservoir_level: INITIAL_RESERVOIR_PCT,
        temp: 78.5,
        canopy_temp: 78.5,
        rh: 62.0,
        vwc,
        co2: config.co2_target,
        ec: 3.2,
        vpd: 1.2,
        sensors: (1..=layout.probes)
            .map(|id| SensorProbe {
                id,
                vwc,
                ec: 3.2,
                temp: 75.0,
            })
            .collect(),
        sensor_status: SensorStatus::Ok,
        hvac: HvacState::startup(),
        damper_pos: 100.0,
        config,
        dryback_24h: 0.0,
        history: HistoryBuffer::new(),
    }
}

/// A room mid-cycle: flower rooms on day 21 with the first catalog strain,
/// the nursery on day 14 of veg with the mother stock.
pub fn seeded_room(
    id: RoomId,
    catalog: &StrainCatalog,
    now: DateTime<Utc>,
    rng: &mut StdRng,
) -> Result<RoomState, SimError> {
    let mut room = empty_room(id);

    let (strain, base_vwc, base_ec, ec_spread, day) = match room.kind {
        RoomKind::Flower => {
            let strain = catalog
                .flower
                .first()
                .cloned()
                .ok_or_else(|| SimError::MissingStrainData("flower catalog is empty".into()))?;
            (strain, 40.0, 3.0, 0.5, FLOWER_START_DAY)
        }
        RoomKind::Veg => (catalog.veg.clone(), 55.0, 2.0, 0.3, VEG_START_DAY),
    };

    for probe in &mut room.sensors {
        probe.vwc = base_vwc + rng.gen::<f64>() * 5.0;
        probe.ec = base_ec + rng.gen::<f64>() * ec_spread;
        probe.temp = 75.0 + rng.gen::<f64>();
    }
    room.vwc = room.probe_average_vwc();
    room.ec = room.sensors.iter().map(|p| p.ec).sum::<f64>() / room.sensors.len().max(1) as f64;

    lifecycle::add_strain(&mut room, strain, now, rng);
    room.current_batch_id = Some(format!("BATCH-{id}-INIT"));
    match room.kind {
        RoomKind::Flower => {
            // Back-date the batch so it sits on the requested flower day
            let veg_days = lifecycle::veg_duration_days(&room) as i64;
            let veg_start = now - Duration::days(day as i64 - 1 + veg_days);
            lifecycle::set_start_date(&mut room, veg_start, now);
        }
        RoomKind::Veg => lifecycle::set_day(&mut room, day, now)?,
    }
    Ok(room)
}

/// Synthesize the last 24h of chart data by replaying one day of the shot
/// schedule and substrate moisture at the sample cadence. Climate is held
/// at the room's current readings.
pub fn backfill_history(room: &mut RoomState) {
    let mut sim = room.clone();
    let mut irrigation = IrrigationStateMachine::new();
    let has_crop = sim.has_crop();
    let plant_scalar = physics::plant_size_scalar(sim.kind, sim.day_of_cycle, has_crop);
    let slots = (MINUTES_PER_DAY / SAMPLE_INTERVAL_MIN) as usize;

    room.history.clear();
    for slot in 0..slots {
        let time = slot as f64 * SAMPLE_INTERVAL_MIN;
        let outcome = irrigation.evaluate(
            &sim.config,
            sim.kind,
            time,
            SAMPLE_INTERVAL_MIN,
            sim.shots_fired_today,
            false,
        );
        sim.shots_fired_today = outcome.shots_fired_today;
        let decision = irrigation.valve(SAMPLE_INTERVAL_MIN, sim.reservoir_level, false);

        let inputs = TranspirationInputs {
            is_day: outcome.state.is_day,
            temp: sim.temp,
            vpd: sim.vpd,
            plant_scalar,
            has_crop,
            vwc: sim.vwc,
        };
        let mut delta = physics::transpiration_delta(&inputs, SAMPLE_INTERVAL_MIN);
        if let ValveDecision::Open { active_minutes } = decision {
            delta += physics::irrigation_delta(active_minutes);
        }
        sim.vwc = (sim.vwc + delta).clamp(0.0, 100.0);
        irrigation.schedule_timer = (irrigation.schedule_timer - SAMPLE_INTERVAL_MIN).max(0.0);

        room.history.push(HistoryPoint {
            time,
            vwc: round_to(sim.vwc, 1),
            temp: round_to(sim.temp, 1),
            rh: round_to(sim.rh, 1),
            vpd: sim.vpd,
            ec: round_to(sim.ec, 2),
            co2: sim.co2.round(),
            phase: outcome.state.phase.ordinal(),
            valve: u8::from(decision.is_open()),
        });
    }
    room.dryback_24h = round_to(room.history.vwc_range(), 1);
}
