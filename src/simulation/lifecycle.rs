//! Crop lifecycle: batches, strains, day counting and milestones.
//!
//! Lifecycle phase and day of cycle are always derived from the batch's
//! start dates and the virtual clock, never counted incrementally, so a
//! time jump only needs a [`synchronize`].

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use uuid::Builder;

use crate::domain::{
    ActiveMilestone, BatchRecord, GrowthStage, LifecyclePhase, RoomState, StrainProfile,
};
use crate::error::SimError;

pub const DEFAULT_VEG_DAYS: u32 = 14;
pub const FLIP_DAY_LENGTH_H: f64 = 12.0;
pub const FLIP_DAY_TEMP_LOW: f64 = 76.0;
pub const FLIP_DAY_TEMP_HIGH: f64 = 82.0;

fn days(n: i64) -> Duration {
    Duration::days(n)
}

/// Longest veg period among the room's strains.
pub fn veg_duration_days(room: &RoomState) -> u32 {
    room.strains
        .iter()
        .map(|s| if s.veg_days > 0 { s.veg_days } else { DEFAULT_VEG_DAYS })
        .max()
        .unwrap_or(DEFAULT_VEG_DAYS)
}

/// Random v4-style id drawn from the caller's generator, so seeded runs
/// produce the same batch ids.
pub fn new_batch_id(room: &RoomState, rng: &mut impl Rng) -> String {
    let tag = Builder::from_random_bytes(rng.gen()).into_uuid().simple().to_string();
    format!("BATCH-{}-{}", &tag[..6].to_uppercase(), room.id)
}

/// Re-derive lifecycle phase, day of cycle and milestones from the start
/// dates. Rooms without a veg start date are left alone.
pub fn synchronize(room: &mut RoomState, now: DateTime<Utc>) {
    let Some(veg_start) = room.veg_start_date else {
        return;
    };
    // Calendar days, so the day count turns over at midnight
    let alive = (now.date_naive() - veg_start.date_naive()).num_days();
    let veg_days = veg_duration_days(room) as i64;

    if alive < veg_days {
        room.current_lifecycle_phase = LifecyclePhase::Veg;
        room.day_of_cycle = (alive + 1).max(1) as u32;
        room.flower_start_date = None;
    } else {
        room.current_lifecycle_phase = LifecyclePhase::Flower;
        room.day_of_cycle = (alive - veg_days + 1).max(1) as u32;
        room.flower_start_date = Some(veg_start + days(veg_days));
    }
    room.active_milestones = active_milestones(room);
}

/// Milestones of every strain that fall on today.
pub fn active_milestones(room: &RoomState) -> Vec<ActiveMilestone> {
    let stage = match room.current_lifecycle_phase {
        LifecyclePhase::Idle => return Vec::new(),
        LifecyclePhase::Veg => GrowthStage::Veg,
        LifecyclePhase::Flower => GrowthStage::Flower,
    };
    room.strains
        .iter()
        .flat_map(|strain| {
            strain
                .milestones
                .iter()
                .filter(|m| m.phase == stage && m.day == room.day_of_cycle)
                .map(|m| ActiveMilestone {
                    strain_name: strain.name.clone(),
                    milestone: m.clone(),
                })
        })
        .collect()
}

/// Midnight bookkeeping. Returns the new day when the room has a crop.
pub fn start_new_day(room: &mut RoomState, now: DateTime<Utc>) -> Option<u32> {
    synchronize(room, now);
    room.shots_fired_today = 0;
    (room.current_lifecycle_phase != LifecyclePhase::Idle).then_some(room.day_of_cycle)
}

/// Place the room on `day` of its current phase by shifting the start dates.
pub fn set_day(room: &mut RoomState, day: u32, now: DateTime<Utc>) -> Result<(), SimError> {
    let back = days(day.max(1) as i64 - 1);
    match room.current_lifecycle_phase {
        LifecyclePhase::Idle => return Err(SimError::NoActiveBatch(room.id)),
        LifecyclePhase::Flower => {
            let new_flower = now - back;
            let shift = new_flower - room.flower_start_date.unwrap_or(now);
            room.flower_start_date = Some(new_flower);
            room.veg_start_date = Some(match room.veg_start_date {
                Some(veg) => veg + shift,
                None => new_flower - days(veg_duration_days(room) as i64),
            });
        }
        LifecyclePhase::Veg => {
            let new_veg = now - back;
            let shift = new_veg - room.veg_start_date.unwrap_or(now);
            room.veg_start_date = Some(new_veg);
            room.flower_start_date = room.flower_start_date.map(|f| f + shift);
        }
    }
    synchronize(room, now);
    Ok(())
}

pub fn set_start_date(room: &mut RoomState, date: DateTime<Utc>, now: DateTime<Utc>) {
    room.veg_start_date = Some(date);
    synchronize(room, now);
}

fn ensure_batch(room: &mut RoomState, now: DateTime<Utc>, rng: &mut impl Rng) {
    if room.current_lifecycle_phase == LifecyclePhase::Idle {
        room.current_lifecycle_phase = LifecyclePhase::Veg;
        room.veg_start_date = Some(now);
        room.flower_start_date = None;
        room.day_of_cycle = 1;
        room.current_batch_id = Some(new_batch_id(room, rng));
    }
}

/// Add a strain; an idle room starts a new batch in veg.
pub fn add_strain(
    room: &mut RoomState,
    strain: StrainProfile,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) {
    ensure_batch(room, now, rng);
    room.strains.push(strain);
    room.active_milestones = active_milestones(room);
}

/// Remove a strain; removing the last one returns the room to idle.
pub fn remove_strain(room: &mut RoomState, index: usize) -> Result<StrainProfile, SimError> {
    if index >= room.strains.len() {
        return Err(SimError::StrainIndex {
            room: room.id,
            index,
        });
    }
    let removed = room.strains.remove(index);
    if room.strains.is_empty() {
        room.current_lifecycle_phase = LifecyclePhase::Idle;
        room.current_batch_id = None;
        room.active_milestones.clear();
    }
    Ok(removed)
}

pub fn update_strain(
    room: &mut RoomState,
    index: usize,
    strain: StrainProfile,
    now: DateTime<Utc>,
) -> Result<(), SimError> {
    let slot = room.strains.get_mut(index).ok_or(SimError::StrainIndex {
        room: room.id,
        index,
    })?;
    *slot = strain;
    synchronize(room, now);
    Ok(())
}

/// Archive the batch and reset the room to an empty idle state. Shot
/// counters are zeroed here; the caller owns the timers.
pub fn harvest(room: &mut RoomState, now: DateTime<Utc>) -> Result<BatchRecord, SimError> {
    let batch_id = match (&room.current_batch_id, room.current_lifecycle_phase) {
        (Some(id), phase) if phase != LifecyclePhase::Idle => id.clone(),
        _ => return Err(SimError::NoActiveBatch(room.id)),
    };

    let veg_days = match (room.veg_start_date, room.flower_start_date) {
        (Some(veg), Some(flower)) => (flower - veg).num_days().max(0) as u32,
        _ => 0,
    };
    let record = BatchRecord {
        batch_id,
        room_id: room.id,
        strains: room.strains.iter().map(|s| s.name.clone()).collect(),
        veg_start_date: room.veg_start_date.unwrap_or(now),
        flower_start_date: room.flower_start_date,
        harvest_date: now,
        total_days: room.day_of_cycle + veg_days,
    };

    room.current_batch_id = None;
    room.current_lifecycle_phase = LifecyclePhase::Idle;
    room.veg_start_date = None;
    room.flower_start_date = None;
    room.strains.clear();
    room.day_of_cycle = 0;
    room.active_milestones.clear();
    room.shots_fired_today = 0;
    room.config.light_intensity = 0.0;
    room.valve_open = false;
    room.valve_open_since = None;

    Ok(record)
}

/// VEG -> FLOWER: day 1 of flower with a 12h photoperiod.
pub fn flip_to_flower(room: &mut RoomState, now: DateTime<Utc>) -> Result<(), SimError> {
    if room.current_lifecycle_phase != LifecyclePhase::Veg {
        return Err(SimError::NotInVeg {
            room: room.id,
            phase: room.current_lifecycle_phase,
        });
    }
    // Veg start moves so that the derived flower start lands on today
    room.veg_start_date = Some(now - days(veg_duration_days(room) as i64));
    room.current_lifecycle_phase = LifecyclePhase::Flower;
    room.flower_start_date = Some(now);
    room.day_of_cycle = 1;
    room.config.day_length = FLIP_DAY_LENGTH_H;
    room.config.day_temp_low = FLIP_DAY_TEMP_LOW;
    room.config.day_temp_high = FLIP_DAY_TEMP_HIGH;
    room.active_milestones = active_milestones(room);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RoomId, StrainCatalog};
    use crate::simulation::facility::empty_room as blank_room;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    fn athena() -> StrainProfile {
        StrainCatalog::house_defaults().flower[0].clone()
    }

    #[test]
    fn test_adding_strain_to_idle_room_starts_veg_batch() {
        let mut room = blank_room(RoomId::A);
        add_strain(&mut room, athena(), now(), &mut rng());
        assert_eq!(room.current_lifecycle_phase, LifecyclePhase::Veg);
        assert_eq!(room.veg_start_date, Some(now()));
        assert!(room.current_batch_id.as_deref().unwrap().ends_with("-A"));
        assert_eq!(room.day_of_cycle, 1);
    }

    #[test]
    fn test_batch_ids_follow_the_seed() {
        let mut first = blank_room(RoomId::A);
        let mut second = blank_room(RoomId::A);
        add_strain(&mut first, athena(), now(), &mut rng());
        add_strain(&mut second, athena(), now(), &mut rng());
        assert_eq!(first.current_batch_id, second.current_batch_id);

        let other = new_batch_id(&first, &mut StdRng::seed_from_u64(12));
        assert_ne!(first.current_batch_id.as_deref(), Some(other.as_str()));
    }

    #[test]
    fn test_synchronize_crosses_into_flower_after_veg_period() {
        let mut room = blank_room(RoomId::A);
        add_strain(&mut room, athena(), now(), &mut rng());

        synchronize(&mut room, now() + days(13));
        assert_eq!(room.current_lifecycle_phase, LifecyclePhase::Veg);
        assert_eq!(room.day_of_cycle, 14);

        synchronize(&mut room, now() + days(14));
        assert_eq!(room.current_lifecycle_phase, LifecyclePhase::Flower);
        assert_eq!(room.day_of_cycle, 1);
        assert_eq!(room.flower_start_date, Some(now() + days(14)));
    }

    #[test]
    fn test_set_day_in_flower_shifts_both_dates() {
        let mut room = blank_room(RoomId::A);
        add_strain(&mut room, athena(), now() - days(30), &mut rng());
        synchronize(&mut room, now());
        assert_eq!(room.current_lifecycle_phase, LifecyclePhase::Flower);

        set_day(&mut room, 21, now()).unwrap();
        assert_eq!(room.day_of_cycle, 21);
        assert_eq!(room.flower_start_date, Some(now() - days(20)));
        assert_eq!(room.veg_start_date, Some(now() - days(34)));
    }

    #[test]
    fn test_milestones_match_day_and_stage() {
        let mut room = blank_room(RoomId::A);
        add_strain(&mut room, athena(), now() - days(30), &mut rng());
        synchronize(&mut room, now());
        set_day(&mut room, 21, now()).unwrap();
        let titles: Vec<_> = room
            .active_milestones
            .iter()
            .map(|m| m.milestone.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Day 21 Strip"]);
    }

    #[test]
    fn test_harvest_archives_and_resets() {
        let mut room = blank_room(RoomId::A);
        add_strain(&mut room, athena(), now() - days(40), &mut rng());
        synchronize(&mut room, now());
        room.shots_fired_today = 4;

        let record = harvest(&mut room, now()).unwrap();
        assert_eq!(record.total_days, 40 - 14 + 1 + 14);
        assert_eq!(record.strains, vec!["Athena OG (House)".to_string()]);
        assert_eq!(room.current_lifecycle_phase, LifecyclePhase::Idle);
        assert!(room.strains.is_empty());
        assert_eq!(room.shots_fired_today, 0);
        assert_eq!(room.config.light_intensity, 0.0);

        assert!(matches!(
            harvest(&mut room, now()),
            Err(SimError::NoActiveBatch(RoomId::A))
        ));
    }

    #[test]
    fn test_flip_requires_veg() {
        let mut room = blank_room(RoomId::V);
        assert!(matches!(
            flip_to_flower(&mut room, now()),
            Err(SimError::NotInVeg { .. })
        ));

        add_strain(&mut room, athena(), now(), &mut rng());
        flip_to_flower(&mut room, now()).unwrap();
        assert_eq!(room.current_lifecycle_phase, LifecyclePhase::Flower);
        assert_eq!(room.config.day_length, 12.0);
        assert_eq!(room.day_of_cycle, 1);

        // Survives the next midnight resync
        synchronize(&mut room, now() + days(1));
        assert_eq!(room.current_lifecycle_phase, LifecyclePhase::Flower);
        assert_eq!(room.day_of_cycle, 2);
    }

    #[test]
    fn test_removing_last_strain_idles_room() {
        let mut room = blank_room(RoomId::B);
        add_strain(&mut room, athena(), now(), &mut rng());
        assert!(remove_strain(&mut room, 3).is_err());
        remove_strain(&mut room, 0).unwrap();
        assert_eq!(room.current_lifecycle_phase, LifecyclePhase::Idle);
        assert!(room.current_batch_id.is_none());
    }
}
