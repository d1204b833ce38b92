//! # Environment Physics
//!
//! Stateless per-step integration of room climate and substrate moisture.
//! Units are °F, % RH, kPa, ppm and % VWC; `step` is simulated minutes.
//!
//! The model is a deliberately simplified approximation tuned so that the
//! VPD thresholds used elsewhere (0.8 / 1.2 / 1.6 / 2.5 kPa) behave sensibly.

use crate::domain::{RoomKind, RoomState};

/// Cooling per unit of granted plant capacity (°F/min); the default 5-unit
/// plant pulls 0.144 °F/min
pub const COOLING_POWER: f64 = 0.0288;
/// Heating (°F/min)
pub const HEATING_POWER: f64 = 0.12;
/// Light heat load while lights are on (°F/min)
pub const LIGHT_HEAT: f64 = 0.09;
/// Lights alone cannot push the room past this
pub const LIGHT_HEAT_CEILING_F: f64 = 85.0;
pub const AMBIENT_BASELINE_F: f64 = 70.0;
/// Fraction of the gap to ambient closed per minute while HVAC is idle
pub const AMBIENT_DECAY: f64 = 0.02;

/// RH added per minute by transpiration under lights (%/min)
pub const TRANSPIRATION_RH: f64 = 0.15;
/// Moisture removed by the cooling coil per unit of granted capacity (%/min)
pub const COIL_DEHUMIDIFICATION: f64 = 0.04;
/// Heating dries the air at half the rate the same warming would otherwise
pub const HEATING_RH_COUPLING: f64 = 0.5;
pub const RH_MIN: f64 = 20.0;
pub const RH_MAX: f64 = 99.0;

pub const CO2_MIN: f64 = 400.0;
pub const CO2_MAX: f64 = 2000.0;
pub const CO2_CONSUMPTION: f64 = 2.0;
pub const CO2_INJECTION: f64 = 5.0;
pub const CO2_VENTING: f64 = 0.5;

/// Base substrate drawdown (%/min)
pub const BASE_DRYBACK: f64 = 0.01;
/// Night transpiration relative to day
pub const NIGHT_DRYBACK_FACTOR: f64 = 0.2;
/// Evaporation from an empty room's media during the day (%/min)
pub const EMPTY_MEDIA_EVAPORATION: f64 = 0.005;
/// VWC gained per minute of open valve
pub const IRRIGATION_RATE: f64 = 8.0;

pub const HOT_ROOM_F: f64 = 77.0;
pub const VPD_THIRST_THRESHOLD: f64 = 0.8;
pub const VPD_STOMATAL_CLOSURE: f64 = 2.5;
pub const STOMATAL_THROTTLE: f64 = 0.3;

/// Vapor-pressure deficit in kPa, rounded to 2 decimals.
///
/// Magnus/Tetens saturation pressure: `0.61078 * exp(17.27 T / (T + 237.3))`.
pub fn vpd(temp_f: f64, rh: f64) -> f64 {
    let temp_c = (temp_f - 32.0) * 5.0 / 9.0;
    let svp = 0.61078 * ((17.27 * temp_c) / (temp_c + 237.3)).exp();
    round_to(svp * (1.0 - rh / 100.0), 2)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// External drivers of one room's climate for a single step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateDrivers {
    pub cool_relay: bool,
    pub heat_relay: bool,
    /// Plant capacity granted by the arbiter, in capacity units
    pub cooling_capacity: f64,
    pub lights_on: bool,
    pub has_crop: bool,
}

impl ClimateDrivers {
    fn hvac_idle(&self) -> bool {
        !self.cool_relay && !self.heat_relay
    }
}

pub fn temperature_delta(temp: f64, drivers: &ClimateDrivers, step: f64) -> f64 {
    let mut delta = 0.0;

    if drivers.cool_relay {
        delta -= COOLING_POWER * drivers.cooling_capacity.max(0.0) * step;
    } else if drivers.heat_relay {
        delta += HEATING_POWER * step;
    }

    if drivers.lights_on && temp < LIGHT_HEAT_CEILING_F {
        delta += LIGHT_HEAT * step;
    }

    if drivers.hvac_idle() {
        delta += (AMBIENT_BASELINE_F - temp) * AMBIENT_DECAY * step;
    }

    delta
}

pub fn humidity_delta(temp_delta: f64, drivers: &ClimateDrivers, step: f64) -> f64 {
    let mut delta = if temp_delta > 0.0 {
        let coupling = if drivers.heat_relay { HEATING_RH_COUPLING } else { 1.0 };
        -temp_delta * coupling
    } else {
        -temp_delta
    };

    if drivers.cool_relay {
        delta -= COIL_DEHUMIDIFICATION * drivers.cooling_capacity.max(0.0) * step;
    }

    if drivers.lights_on && drivers.has_crop {
        delta += TRANSPIRATION_RH * step;
    }

    delta
}

/// CO2 after one step, clamped to the injector/vent envelope.
pub fn integrate_co2(co2: f64, target: f64, lights_on: bool, has_crop: bool, step: f64) -> f64 {
    let mut delta = 0.0;
    if lights_on && has_crop {
        delta -= CO2_CONSUMPTION * step;
    }
    if co2 < target {
        delta += CO2_INJECTION * step;
    } else {
        delta -= CO2_VENTING * step;
    }
    (co2 + delta).clamp(CO2_MIN, CO2_MAX)
}

/// Display-only canopy temperature.
pub fn canopy_temp(temp: f64, lights_on: bool) -> f64 {
    if lights_on {
        round_to(temp + 2.0, 1)
    } else {
        round_to(temp - 1.0, 1)
    }
}

/// Integrate temperature, humidity, VPD and CO2 for one step.
///
/// Returns the applied temperature delta.
pub fn integrate_climate(room: &mut RoomState, drivers: &ClimateDrivers, step: f64) -> f64 {
    let temp_delta = temperature_delta(room.temp, drivers, step);
    let rh_delta = humidity_delta(temp_delta, drivers, step);

    room.temp += temp_delta;
    room.rh = (room.rh + rh_delta).clamp(RH_MIN, RH_MAX);
    room.vpd = vpd(room.temp, room.rh);
    room.co2 = integrate_co2(
        room.co2,
        room.config.co2_target,
        drivers.lights_on,
        drivers.has_crop,
        step,
    );

    temp_delta
}

/// Water demand multiplier from plant size.
///
/// Flower rooms ramp linearly 0.5x -> 1.5x over the first 21 days, then
/// 1.5x -> 3.0x over the next 40, capped at 3.0x. Empty rooms draw nothing.
pub fn plant_size_scalar(kind: RoomKind, day_of_cycle: u32, has_crop: bool) -> f64 {
    if !has_crop {
        return 0.0;
    }
    if kind != RoomKind::Flower {
        return 1.0;
    }
    let day = day_of_cycle as f64;
    let scalar = if day < 21.0 {
        0.5 + (day / 21.0) * 1.0
    } else {
        1.5 + ((day - 21.0) / 40.0) * 1.5
    };
    scalar.min(3.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranspirationInputs {
    pub is_day: bool,
    pub temp: f64,
    pub vpd: f64,
    pub plant_scalar: f64,
    pub has_crop: bool,
    pub vwc: f64,
}

/// Substrate moisture lost to the crop (and bare media) over one step.
/// Always `<= 0`.
pub fn transpiration_delta(inputs: &TranspirationInputs, step: f64) -> f64 {
    let mut delta = -BASE_DRYBACK * step;

    if inputs.is_day {
        let temp_multiplier = if inputs.temp > HOT_ROOM_F { 2.0 } else { 1.0 };
        let vpd_multiplier = if inputs.vpd > VPD_THIRST_THRESHOLD {
            1.0 + (inputs.vpd - VPD_THIRST_THRESHOLD) * 0.8
        } else {
            1.0
        };
        delta *= inputs.plant_scalar * temp_multiplier * vpd_multiplier;
    } else {
        delta *= NIGHT_DRYBACK_FACTOR;
    }

    if inputs.vpd > VPD_STOMATAL_CLOSURE {
        delta *= STOMATAL_THROTTLE;
    }

    if inputs.is_day && inputs.vwc > 0.0 && !inputs.has_crop {
        delta -= EMPTY_MEDIA_EVAPORATION * step;
    }

    delta
}

pub fn irrigation_delta(active_minutes: f64) -> f64 {
    IRRIGATION_RATE * active_minutes.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn drivers(cool: bool, heat: bool, capacity: f64, lights: bool) -> ClimateDrivers {
        ClimateDrivers {
            cool_relay: cool,
            heat_relay: heat,
            cooling_capacity: capacity,
            lights_on: lights,
            has_crop: true,
        }
    }

    #[test]
    fn test_vpd_reference_value() {
        // 78°F = 25.56°C, SVP ≈ 3.274 kPa
        assert_eq!(vpd(78.0, 60.0), 1.31);
        assert_eq!(vpd(78.0, 100.0), 0.0);
    }

    proptest! {
        #[test]
        fn prop_vpd_decreases_with_rh(temp in 50.0f64..100.0, rh in 0.0f64..95.0, bump in 5.0f64..20.0) {
            let hi = (rh + bump).min(100.0);
            prop_assert!(vpd(temp, hi) <= vpd(temp, rh));
        }

        #[test]
        fn prop_vpd_increases_with_temp(temp in 50.0f64..95.0, rh in 0.0f64..90.0, bump in 1.0f64..10.0) {
            prop_assert!(vpd(temp + bump, rh) >= vpd(temp, rh));
        }

        #[test]
        fn prop_co2_stays_in_envelope(co2 in 0.0f64..5000.0, target in 400.0f64..2000.0, lights: bool, crop: bool) {
            let next = integrate_co2(co2, target, lights, crop, 0.1);
            prop_assert!((CO2_MIN..=CO2_MAX).contains(&next));
        }

        #[test]
        fn prop_transpiration_never_adds_water(
            is_day: bool,
            temp in 60.0f64..95.0,
            vpd_in in 0.0f64..4.0,
            scalar in 0.0f64..3.0,
            crop: bool,
        ) {
            let inputs = TranspirationInputs { is_day, temp, vpd: vpd_in, plant_scalar: scalar, has_crop: crop, vwc: 40.0 };
            prop_assert!(transpiration_delta(&inputs, 0.1) <= 0.0);
        }
    }

    #[test]
    fn test_reduced_cooling_capacity_cools_slower() {
        let full = temperature_delta(90.0, &drivers(true, false, 5.0, false), 1.0);
        let starved = temperature_delta(90.0, &drivers(true, false, 0.5, false), 1.0);
        assert!(full < starved);
        assert!((full + 0.144).abs() < 1e-12);
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(5.0, -0.144)]
    #[case(50.0, -1.44)]
    fn test_cooling_scales_with_capacity(#[case] capacity: f64, #[case] expected: f64) {
        let delta = temperature_delta(90.0, &drivers(true, false, capacity, false), 1.0);
        assert!((delta - expected).abs() < 1e-9);
    }

    #[test]
    fn test_light_heat_capped_at_ceiling() {
        let below = temperature_delta(80.0, &drivers(false, true, 5.0, true), 1.0);
        let above = temperature_delta(86.0, &drivers(false, true, 5.0, true), 1.0);
        assert!((below - (HEATING_POWER + LIGHT_HEAT)).abs() < 1e-12);
        assert!((above - HEATING_POWER).abs() < 1e-12);
    }

    #[test]
    fn test_idle_room_decays_toward_ambient() {
        let warm = temperature_delta(80.0, &drivers(false, false, 5.0, false), 1.0);
        let cold = temperature_delta(60.0, &drivers(false, false, 5.0, false), 1.0);
        assert!(warm < 0.0);
        assert!(cold > 0.0);
    }

    #[test]
    fn test_cooling_dehumidifies() {
        let d = drivers(true, false, 5.0, false);
        let temp_delta = temperature_delta(85.0, &d, 1.0);
        assert!(humidity_delta(temp_delta, &d, 1.0) < 0.0);
    }

    #[test]
    fn test_heating_dries_less_than_equal_passive_warming() {
        let heating = drivers(false, true, 5.0, false);
        let passive = drivers(false, false, 5.0, false);
        assert!(humidity_delta(0.5, &heating, 1.0) > humidity_delta(0.5, &passive, 1.0));
    }

    #[rstest]
    #[case(0, 0.5)]
    #[case(21, 1.5)]
    #[case(41, 2.25)]
    #[case(61, 3.0)]
    #[case(90, 3.0)]
    fn test_flower_growth_curve(#[case] day: u32, #[case] expected: f64) {
        assert!((plant_size_scalar(RoomKind::Flower, day, true) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_empty_room_has_no_plant_demand() {
        assert_eq!(plant_size_scalar(RoomKind::Flower, 30, false), 0.0);
        assert_eq!(plant_size_scalar(RoomKind::Veg, 30, true), 1.0);
    }

    #[test]
    fn test_stomatal_closure_throttles_transpiration() {
        let base = TranspirationInputs {
            is_day: true,
            temp: 80.0,
            vpd: 2.4,
            plant_scalar: 1.5,
            has_crop: true,
            vwc: 40.0,
        };
        let stressed = TranspirationInputs { vpd: 2.6, ..base };
        assert!(transpiration_delta(&stressed, 1.0).abs() < transpiration_delta(&base, 1.0).abs());
    }

    #[test]
    fn test_canopy_offset() {
        assert_eq!(canopy_temp(78.0, true), 80.0);
        assert_eq!(canopy_temp(78.0, false), 77.0);
    }
}
