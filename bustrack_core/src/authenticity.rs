//! Authenticity gates applied to every incoming location report.
//!
//! A report is accepted only if it passes the route-membership pre-check and
//! then every gate in [`GATES`], in order. The first failing gate decides the
//! rejection reason; later gates are not evaluated.
//!
//! ```text
//! report ──► route membership ──► speed ──► movement ──► geofence ──► temporal ──► accept
//!                 │                  │          │            │            │
//!              OffRoute           TooFast     Unsafe   OutsideCorridor   Stale
//! ```

use bustrack_env::{Bus, Stop};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::TrackingConfig;
use crate::error::RejectionReason;
use crate::geo_math::distance_km;
use crate::model::LocationReport;
use crate::stop_topology::{located, ordered};

/// Signature shared by every gate predicate.
type GateFn = fn(&AuthenticityScorer, &LocationReport, &[Stop], DateTime<Utc>) -> Result<(), RejectionReason>;

/// A named authenticity predicate.
pub struct Gate {
    pub name: &'static str,
    check: GateFn,
}

/// The authenticity pipeline, in evaluation order.
pub const GATES: [Gate; 4] = [
    Gate { name: "speed", check: AuthenticityScorer::check_speed },
    Gate { name: "movement", check: AuthenticityScorer::check_movement },
    Gate { name: "geofence", check: AuthenticityScorer::check_geofence },
    Gate { name: "temporal", check: AuthenticityScorer::check_temporal },
];

/// Decides whether a report plausibly comes from a rider on the bus.
///
/// Stateless apart from its thresholds; "now" is always passed in so the
/// caller's clock (real or simulated) is the only time source.
#[derive(Debug, Clone)]
pub struct AuthenticityScorer {
    config: TrackingConfig,
}

impl AuthenticityScorer {
    pub fn new(config: TrackingConfig) -> Self {
        Self { config }
    }

    /// Pre-check: the report must be near at least one stop of the route.
    ///
    /// Routes without any geocoded stop cannot be checked and pass.
    pub fn check_route_membership(&self, report: &LocationReport, stops: &[Stop]) -> Result<(), RejectionReason> {
        let point = report.coordinates();
        let mut any_located = false;

        for location in stops.iter().filter_map(|s| s.location.as_ref()) {
            any_located = true;
            if distance_km(&point, location) < self.config.route_membership_radius_km {
                return Ok(());
            }
        }

        if any_located {
            Err(RejectionReason::OffRoute)
        } else {
            Ok(())
        }
    }

    /// Runs every gate in order and returns the first rejection.
    pub fn evaluate(
        &self,
        report: &LocationReport,
        bus: &Bus,
        stops: &[Stop],
        now: DateTime<Utc>,
    ) -> Result<(), RejectionReason> {
        for gate in GATES.iter() {
            if let Err(reason) = (gate.check)(self, report, stops, now) {
                warn!(
                    gate = gate.name,
                    bus = %bus.number,
                    user = %report.user_id,
                    code = reason.code(),
                    "Report rejected: {}",
                    reason
                );
                return Err(reason);
            }
        }
        Ok(())
    }

    /// Boolean form of [`evaluate`](Self::evaluate).
    pub fn accept(&self, report: &LocationReport, bus: &Bus, stops: &[Stop], now: DateTime<Utc>) -> bool {
        self.evaluate(report, bus, stops, now).is_ok()
    }

    fn check_speed(&self, report: &LocationReport, _stops: &[Stop], _now: DateTime<Utc>) -> Result<(), RejectionReason> {
        let speed_kmh = report.speed_kmh();
        // NaN and negative readings fail the range check too
        if !(0.0..=self.config.max_speed_kmh).contains(&speed_kmh) {
            return Err(RejectionReason::TooFast { speed_kmh });
        }
        Ok(())
    }

    /// No per-rider trajectory is retained, so there is nothing to compare
    /// against. Always passes; [`RejectionReason::Unsafe`] is reserved for it.
    fn check_movement(&self, _report: &LocationReport, _stops: &[Stop], _now: DateTime<Utc>) -> Result<(), RejectionReason> {
        Ok(())
    }

    fn check_geofence(&self, report: &LocationReport, stops: &[Stop], _now: DateTime<Utc>) -> Result<(), RejectionReason> {
        let route = located(stops);
        if route.is_empty() {
            return Ok(());
        }

        let point = report.coordinates();
        if route
            .iter()
            .any(|(_, loc)| distance_km(&point, loc) <= self.config.stop_radius_km)
        {
            return Ok(());
        }

        // A pair with an unlocated endpoint never forms a corridor segment
        let in_corridor = ordered(stops).windows(2).any(|pair| match (&pair[0].location, &pair[1].location) {
            (Some(a), Some(b)) => distance_km(&point, a).min(distance_km(&point, b)) <= self.config.corridor_buffer_km,
            _ => false,
        });
        if in_corridor {
            return Ok(());
        }

        Err(RejectionReason::OutsideCorridor)
    }

    fn check_temporal(&self, report: &LocationReport, _stops: &[Stop], now: DateTime<Utc>) -> Result<(), RejectionReason> {
        let skew = report.timestamp - now;
        if skew.abs() > self.config.freshness_window() {
            return Err(RejectionReason::Stale { skew_minutes: skew.num_minutes() });
        }
        Ok(())
    }
}

impl Default for AuthenticityScorer {
    fn default() -> Self {
        Self::new(TrackingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bustrack_env::{BusId, LocationRef, UserId};
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn bus() -> Bus {
        Bus {
            id: BusId(1),
            name: "Express".to_string(),
            number: "TN-01".to_string(),
            from: LocationRef::new(10, "Chennai"),
            to: LocationRef::new(20, "Vellore"),
        }
    }

    fn stops() -> Vec<Stop> {
        vec![
            Stop::new(1, "A", 1, 13.00, 80.00),
            Stop::new(2, "B", 2, 13.05, 80.00),
            Stop::new(3, "C", 3, 13.10, 80.00),
        ]
    }

    fn report(lat: f64, lng: f64, speed_mps: f64) -> LocationReport {
        LocationReport {
            bus_id: BusId(1),
            stop_id: None,
            user_id: UserId::new("rider-1"),
            timestamp: now(),
            latitude: lat,
            longitude: lng,
            accuracy_meters: 10.0,
            speed_mps,
            heading_degrees: 0.0,
            device_info: None,
        }
    }

    #[test]
    fn test_gate_order() {
        let names: Vec<&str> = GATES.iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["speed", "movement", "geofence", "temporal"]);
    }

    #[test]
    fn test_plausible_report_accepted() {
        let scorer = AuthenticityScorer::default();
        let r = report(13.05, 80.0, 8.0);
        assert!(scorer.check_route_membership(&r, &stops()).is_ok());
        assert!(scorer.accept(&r, &bus(), &stops(), now()));
    }

    #[test]
    fn test_speed_gate_boundary() {
        let scorer = AuthenticityScorer::default();

        // 33.3 m/s = 119.88 km/h
        let ok = report(13.05, 80.0, 33.3);
        assert!(scorer.evaluate(&ok, &bus(), &stops(), now()).is_ok());

        // 40 m/s = 144 km/h
        let fast = report(13.05, 80.0, 40.0);
        match scorer.evaluate(&fast, &bus(), &stops(), now()) {
            Err(RejectionReason::TooFast { speed_kmh }) => assert!((speed_kmh - 144.0).abs() < 1e-9),
            other => panic!("expected TooFast, got {:?}", other),
        }
    }

    #[test]
    fn test_speed_checked_before_time() {
        let scorer = AuthenticityScorer::default();
        let mut r = report(13.05, 80.0, 40.0);
        r.timestamp = now() - TimeDelta::hours(2);

        assert!(matches!(
            scorer.evaluate(&r, &bus(), &stops(), now()),
            Err(RejectionReason::TooFast { .. })
        ));
    }

    #[test]
    fn test_temporal_gate_both_directions() {
        let scorer = AuthenticityScorer::default();

        let mut old = report(13.05, 80.0, 8.0);
        old.timestamp = now() - TimeDelta::minutes(31);
        assert_eq!(
            scorer.evaluate(&old, &bus(), &stops(), now()),
            Err(RejectionReason::Stale { skew_minutes: -31 })
        );

        let mut future = report(13.05, 80.0, 8.0);
        future.timestamp = now() + TimeDelta::minutes(45);
        assert_eq!(
            scorer.evaluate(&future, &bus(), &stops(), now()),
            Err(RejectionReason::Stale { skew_minutes: 45 })
        );

        let mut edge = report(13.05, 80.0, 8.0);
        edge.timestamp = now() - TimeDelta::minutes(30);
        assert!(scorer.evaluate(&edge, &bus(), &stops(), now()).is_ok());
    }

    #[test]
    fn test_geofence_corridor() {
        let scorer = AuthenticityScorer::default();

        // ~2.7 km east of B: outside every stop radius, inside the corridor
        let near = report(13.05, 80.025, 8.0);
        assert!(scorer.evaluate(&near, &bus(), &stops(), now()).is_ok());

        // ~11 km east of the route
        let far = report(13.05, 80.10, 8.0);
        assert_eq!(
            scorer.evaluate(&far, &bus(), &stops(), now()),
            Err(RejectionReason::OutsideCorridor)
        );
    }

    #[test]
    fn test_geofence_single_stop_uses_stop_radius() {
        let scorer = AuthenticityScorer::default();
        let single = vec![Stop::new(1, "Depot", 1, 13.0, 80.0)];

        // ~2.7 km away: no pair to form a corridor, outside the 2 km radius
        let r = report(13.0, 80.025, 8.0);
        assert_eq!(
            scorer.evaluate(&r, &bus(), &single, now()),
            Err(RejectionReason::OutsideCorridor)
        );
    }

    #[test]
    fn test_unlocated_route_passes_spatial_checks() {
        let scorer = AuthenticityScorer::default();
        let unlocated: Vec<Stop> = stops().into_iter().map(Stop::without_location).collect();
        let r = report(45.0, 10.0, 8.0);

        assert!(scorer.check_route_membership(&r, &unlocated).is_ok());
        assert!(scorer.check_route_membership(&r, &[]).is_ok());
        assert!(scorer.evaluate(&r, &bus(), &unlocated, now()).is_ok());
    }

    #[test]
    fn test_route_membership_radius() {
        let scorer = AuthenticityScorer::default();

        // ~330 m from B
        let close = report(13.053, 80.0, 8.0);
        assert!(scorer.check_route_membership(&close, &stops()).is_ok());

        // ~2.8 km from the nearest stop
        let away = report(13.025, 80.0, 8.0);
        assert_eq!(scorer.check_route_membership(&away, &stops()), Err(RejectionReason::OffRoute));
    }

    #[test]
    fn test_speed_gate_rejects_nan_and_negative() {
        let scorer = AuthenticityScorer::default();

        let nan = report(13.05, 80.0, f64::NAN);
        assert!(matches!(
            scorer.evaluate(&nan, &bus(), &stops(), now()),
            Err(RejectionReason::TooFast { speed_kmh }) if speed_kmh.is_nan()
        ));

        let backwards = report(13.05, 80.0, -100.0);
        assert!(matches!(
            scorer.evaluate(&backwards, &bus(), &stops(), now()),
            Err(RejectionReason::TooFast { .. })
        ));

        let parked = report(13.05, 80.0, 0.0);
        assert!(scorer.evaluate(&parked, &bus(), &stops(), now()).is_ok());
    }

    #[test]
    fn test_corridor_pair_needs_both_stops_located() {
        let scorer = AuthenticityScorer::default();
        // ~2.7 km east of A: outside the stop radius, within the corridor buffer of A
        let r = report(13.00, 80.025, 8.0);

        let full = stops();
        assert!(scorer.evaluate(&r, &bus(), &full, now()).is_ok());

        // B unlocated: A-B and B-C both lose an endpoint, A and C are never paired
        let mut gap = stops();
        gap[1] = gap[1].clone().without_location();
        assert_eq!(
            scorer.evaluate(&r, &bus(), &gap, now()),
            Err(RejectionReason::OutsideCorridor)
        );
    }

    #[test]
    fn test_route_membership_radius_is_exclusive() {
        let scorer = AuthenticityScorer::new(TrackingConfig {
            route_membership_radius_km: 0.0,
            ..TrackingConfig::default()
        });

        // Exactly on stop A: distance 0 is not strictly inside a 0 km radius
        let on_stop = report(13.00, 80.0, 8.0);
        assert_eq!(scorer.check_route_membership(&on_stop, &stops()), Err(RejectionReason::OffRoute));
    }
}
