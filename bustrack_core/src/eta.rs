//! Arrival-time projection from a live position.

use bustrack_env::{Coordinates, Stop};
use chrono::{DateTime, TimeDelta, Utc};

use crate::config::TrackingConfig;
use crate::geo_math::{distance_km, mps_to_kmh};

/// Projects straight-line arrival times at the bus's current speed.
///
/// Speeds under `min_moving_speed_kmh` are treated as a stop at a light or
/// a boarding halt, and `default_cruising_speed_kmh` is assumed instead.
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    min_moving_speed_kmh: f64,
    default_cruising_speed_kmh: f64,
}

impl EtaEstimator {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            min_moving_speed_kmh: config.min_moving_speed_kmh,
            default_cruising_speed_kmh: config.default_cruising_speed_kmh,
        }
    }

    /// Speed used for projection, in km/h.
    pub fn effective_speed_kmh(&self, speed_mps: f64) -> f64 {
        let kmh = mps_to_kmh(speed_mps);
        if kmh >= self.min_moving_speed_kmh {
            kmh
        } else {
            self.default_cruising_speed_kmh
        }
    }

    /// Arrival at `next` for a bus at `position` that last passed `current`.
    ///
    /// Falls back to the timetable of `next` when either stop is not
    /// geocoded.
    pub fn estimate(
        &self,
        position: &Coordinates,
        speed_mps: f64,
        next: &Stop,
        current: &Stop,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if current.location.is_none() {
            return scheduled_arrival(next, now);
        }
        self.estimate_to(position, speed_mps, next, now)
    }

    /// Arrival at `target` from `position`, or its timetable entry when
    /// `target` is not geocoded.
    pub fn estimate_to(
        &self,
        position: &Coordinates,
        speed_mps: f64,
        target: &Stop,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let Some(location) = target.location.as_ref() else {
            return scheduled_arrival(target, now);
        };

        let distance = distance_km(position, location);
        let speed = self.effective_speed_kmh(speed_mps);
        let minutes = (distance / speed * 60.0).ceil();
        if !minutes.is_finite() {
            return None;
        }

        Some(now + TimeDelta::minutes(minutes as i64))
    }
}

impl Default for EtaEstimator {
    fn default() -> Self {
        Self::new(&TrackingConfig::default())
    }
}

/// The stop's timetabled arrival on `now`'s date.
fn scheduled_arrival(stop: &Stop, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let time = stop.scheduled_arrival?;
    Some(now.date_naive().and_time(time).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_math::calculate_distance_km;
    use chrono::{NaiveTime, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn b() -> Stop {
        Stop::new(2, "B", 2, 13.05, 80.00)
    }

    fn c() -> Stop {
        Stop::new(3, "C", 3, 13.10, 80.00)
    }

    #[test]
    fn test_effective_speed() {
        let eta = EtaEstimator::default();
        assert_eq!(eta.effective_speed_kmh(0.0), 25.0);
        assert_eq!(eta.effective_speed_kmh(1.0), 25.0);
        assert!((eta.effective_speed_kmh(10.0) - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_projection_at_reported_speed() {
        let eta = EtaEstimator::default();
        let at_b = Coordinates::new(13.05, 80.00);
        let speed_mps = 30.0 / 3.6;

        let expected_minutes = (calculate_distance_km(13.05, 80.0, 13.10, 80.0) / 30.0 * 60.0).ceil() as i64;
        let arrival = eta.estimate(&at_b, speed_mps, &c(), &b(), now()).unwrap();

        assert_eq!(arrival, now() + TimeDelta::minutes(expected_minutes));
        // ~5.56 km at 30 km/h
        assert_eq!(expected_minutes, 12);
    }

    #[test]
    fn test_stationary_bus_uses_cruising_speed() {
        let eta = EtaEstimator::default();
        let at_b = Coordinates::new(13.05, 80.00);

        let arrival = eta.estimate(&at_b, 0.0, &c(), &b(), now()).unwrap();
        // ~5.56 km at 25 km/h = 13.3 min
        assert_eq!(arrival, now() + TimeDelta::minutes(14));
    }

    #[test]
    fn test_falls_back_to_timetable() {
        let eta = EtaEstimator::default();
        let at_b = Coordinates::new(13.05, 80.00);
        let scheduled = NaiveTime::from_hms_opt(8, 20, 0).unwrap();

        let next = c().without_location().with_scheduled_arrival(scheduled);
        let arrival = eta.estimate(&at_b, 8.0, &next, &b(), now()).unwrap();
        assert_eq!(arrival, Utc.with_ymd_and_hms(2024, 3, 1, 8, 20, 0).unwrap());

        let current = b().without_location();
        let next = c().with_scheduled_arrival(scheduled);
        let arrival = eta.estimate(&at_b, 8.0, &next, &current, now()).unwrap();
        assert_eq!(arrival, Utc.with_ymd_and_hms(2024, 3, 1, 8, 20, 0).unwrap());
    }

    #[test]
    fn test_no_estimate_without_coordinates_or_timetable() {
        let eta = EtaEstimator::default();
        let at_b = Coordinates::new(13.05, 80.00);
        assert!(eta.estimate(&at_b, 8.0, &c().without_location(), &b(), now()).is_none());
    }
}
