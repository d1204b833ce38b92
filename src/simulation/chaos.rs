//! Fault injection on reported readings.
//!
//! The overlay only ever sees a copy of a room's readings. Physics and the
//! control loops keep running on the true state.

use rand::rngs::StdRng;
use rand::Rng;

use crate::domain::{ChaosSettings, Readings, SensorStatus};

/// Readings as the dashboard would see them after fault injection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reported {
    pub readings: Readings,
    pub status: SensorStatus,
    pub valve_open: bool,
}

#[derive(Debug, Clone)]
pub struct ChaosOverlay {
    pub settings: ChaosSettings,
}

impl ChaosOverlay {
    pub fn new(settings: ChaosSettings) -> Self {
        Self { settings }
    }

    pub fn is_active(&self) -> bool {
        self.settings.enabled
    }

    /// Valve state as reported by the (possibly stuck) position sensor.
    pub fn reported_valve(&self, valve_open: bool) -> bool {
        valve_open || (self.settings.enabled && self.settings.valve_stuck_open)
    }

    /// Corrupt a copy of `readings`. Blackout wins over everything else.
    pub fn apply(&self, readings: Readings, valve_open: bool, rng: &mut StdRng) -> Reported {
        let mut out = Reported {
            readings,
            status: SensorStatus::Ok,
            valve_open: self.reported_valve(valve_open),
        };
        if !self.settings.enabled {
            return out;
        }

        if self.settings.blackout_active {
            out.readings = Readings {
                temp: 0.0,
                canopy_temp: 0.0,
                rh: 0.0,
                vwc: 0.0,
                co2: 0.0,
                vpd: 0.0,
                ec: 0.0,
            };
            out.status = SensorStatus::Error;
            return out;
        }

        if self.settings.flood_active {
            out.readings.vwc = 100.0;
        }

        if self.settings.sensor_drift > 0.0 {
            let amplitude = self.settings.sensor_drift / 100.0;
            let noise = rng.gen_range(-amplitude..=amplitude);
            out.readings.vwc = (out.readings.vwc * (1.0 + noise)).clamp(0.0, 100.0);
            out.status = SensorStatus::Drifting;
        }

        if self.settings.sensor_failure {
            out.readings.vwc = 0.0;
            out.status = SensorStatus::Error;
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn readings() -> Readings {
        Readings {
            temp: 78.0,
            canopy_temp: 80.0,
            rh: 60.0,
            vwc: 45.0,
            co2: 1200.0,
            vpd: 1.31,
            ec: 3.2,
        }
    }

    fn overlay(f: impl FnOnce(&mut ChaosSettings)) -> ChaosOverlay {
        let mut settings = ChaosSettings {
            enabled: true,
            ..Default::default()
        };
        f(&mut settings);
        ChaosOverlay::new(settings)
    }

    #[test]
    fn test_disabled_overlay_is_identity() {
        let chaos = ChaosOverlay::new(ChaosSettings {
            enabled: false,
            blackout_active: true,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(1);
        let out = chaos.apply(readings(), false, &mut rng);
        assert_eq!(out.readings, readings());
        assert_eq!(out.status, SensorStatus::Ok);
    }

    #[test]
    fn test_blackout_short_circuits() {
        let chaos = overlay(|s| {
            s.blackout_active = true;
            s.flood_active = true;
            s.sensor_drift = 20.0;
        });
        let mut rng = StdRng::seed_from_u64(1);
        let out = chaos.apply(readings(), false, &mut rng);
        assert_eq!(out.readings.vwc, 0.0);
        assert_eq!(out.readings.temp, 0.0);
        assert_eq!(out.status, SensorStatus::Error);
    }

    #[test]
    fn test_failure_overrides_flood() {
        let chaos = overlay(|s| {
            s.flood_active = true;
            s.sensor_failure = true;
        });
        let mut rng = StdRng::seed_from_u64(1);
        let out = chaos.apply(readings(), false, &mut rng);
        assert_eq!(out.readings.vwc, 0.0);
        assert_eq!(out.status, SensorStatus::Error);
    }

    #[test]
    fn test_stuck_valve_only_touches_reported_flag() {
        let chaos = overlay(|s| s.valve_stuck_open = true);
        let mut rng = StdRng::seed_from_u64(1);
        let out = chaos.apply(readings(), false, &mut rng);
        assert!(out.valve_open);
        assert_eq!(out.readings, readings());
    }

    proptest! {
        #[test]
        fn prop_drift_stays_within_band(drift in 0.1f64..50.0, vwc in 0.0f64..100.0, seed: u64) {
            let chaos = overlay(|s| s.sensor_drift = drift);
            let mut rng = StdRng::seed_from_u64(seed);
            let input = Readings { vwc, ..readings() };
            let out = chaos.apply(input, false, &mut rng);
            prop_assert_eq!(out.status, SensorStatus::Drifting);
            prop_assert!(out.readings.vwc >= 0.0 && out.readings.vwc <= 100.0);
            prop_assert!((out.readings.vwc - vwc).abs() <= vwc * drift / 100.0 + 1e-9);
        }
    }
}
