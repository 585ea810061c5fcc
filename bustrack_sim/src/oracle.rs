//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the "God's eye view" of the simulated city:
//! - True positions of all buses along their stop sequences
//! - Bus kinematics (constant cruising speed, stop at the terminus)
//! - Rider reports generated from the truth (with GPS noise)
//! - Spoofed reports from riders who are not on the bus

use bustrack_core::LocationReport;
use bustrack_env::{Bus, BusId, Coordinates, LocationRef, Stop, UserId};
use chrono::{DateTime, TimeDelta, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;

/// Kilometres per degree of latitude on the mean-radius sphere.
const KM_PER_DEG_LAT: f64 = 111.195;

/// Origin of the first route (central Chennai).
const ORIGIN: Coordinates = Coordinates {
    latitude: 13.0827,
    longitude: 80.2707,
};

/// Longitude offset between parallel routes (~22 km)
const ROUTE_SPACING_DEG: f64 = 0.2;

/// Converts a north/east offset in metres to a coordinate.
fn offset(origin: &Coordinates, north_m: f64, east_m: f64) -> Coordinates {
    let lat = origin.latitude + north_m / 1000.0 / KM_PER_DEG_LAT;
    let lng = origin.longitude + east_m / 1000.0 / (KM_PER_DEG_LAT * origin.latitude.to_radians().cos());
    Coordinates::new(lat, lng)
}

/// A ground truth bus driving due north along its stops.
#[derive(Debug, Clone)]
pub struct SimBus {
    pub bus: Bus,
    pub stops: Vec<Stop>,

    /// Cruising speed in km/h
    pub speed_kmh: f64,

    /// Distance travelled from the first stop (km)
    pub travelled_km: f64,

    start: Coordinates,
    route_length_km: f64,
}

impl SimBus {
    /// True position of the bus.
    pub fn position(&self) -> Coordinates {
        offset(&self.start, self.travelled_km * 1000.0, 0.0)
    }

    /// True when the bus has reached its last stop.
    pub fn at_terminus(&self) -> bool {
        self.travelled_km >= self.route_length_km
    }

    /// Current speed in m/s (zero once parked at the terminus).
    pub fn speed_mps(&self) -> f64 {
        if self.at_terminus() {
            0.0
        } else {
            self.speed_kmh / 3.6
        }
    }
}

/// How a spoofer forges its report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoofKind {
    /// Correct position, but moving at car/train speed
    CarSpeed,
    /// Plausible speed, several kilometres off the route
    OffRoute,
    /// An honest-looking report replayed long after the fact
    Replay,
}

/// A rider who reports for one bus.
#[derive(Debug, Clone)]
pub struct SimRider {
    pub user: UserId,
    pub bus_id: BusId,

    /// GPS accuracy of the rider's phone (metres, 1-sigma per axis)
    pub accuracy_m: f64,

    /// `None` for honest riders
    pub spoof: Option<SpoofKind>,
}

/// The Oracle - maintains ground truth and generates rider reports.
pub struct Oracle {
    /// RNG for physics (noise, speeds)
    physics_rng: ChaCha8Rng,

    buses: BTreeMap<BusId, SimBus>,
    riders: Vec<SimRider>,

    next_rider_seed: u64,

    /// Current simulation time (seconds)
    current_time: f64,
}

impl Oracle {
    /// Creates a new Oracle with the given physics seed.
    ///
    /// The physics seed should be derived separately from the context seed
    /// so that changing the scenario timeline doesn't affect trajectories.
    pub fn new(physics_seed: u64) -> Self {
        Self {
            physics_rng: ChaCha8Rng::seed_from_u64(physics_seed),
            buses: BTreeMap::new(),
            riders: Vec::new(),
            next_rider_seed: physics_seed.wrapping_mul(0x9e3779b97f4a7c15),
            current_time: 0.0,
        }
    }

    /// Adds a bus with `num_stops` stops spaced `stop_spacing_km` apart and
    /// a cruising speed drawn from `speed_range_kmh`.
    pub fn add_bus(
        &mut self,
        id: i64,
        num_stops: u32,
        stop_spacing_km: f64,
        speed_range_kmh: (f64, f64),
    ) -> BusId {
        let bus_id = BusId(id);
        let index = self.buses.len() as f64;
        let start = Coordinates::new(ORIGIN.latitude, ORIGIN.longitude + index * ROUTE_SPACING_DEG);

        let stops: Vec<Stop> = (0..num_stops)
            .map(|i| {
                let at = offset(&start, i as f64 * stop_spacing_km * 1000.0, 0.0);
                Stop::new(id * 100 + i as i64, format!("Stop {}-{}", id, i + 1), i + 1, at.latitude, at.longitude)
            })
            .collect();

        let (lo, hi) = speed_range_kmh;
        let speed_kmh = if hi > lo { self.physics_rng.gen_range(lo..hi) } else { lo };

        let bus = Bus {
            id: bus_id,
            name: format!("Route {} Express", id),
            number: format!("SIM-{:03}", id),
            from: LocationRef::new(1, "Central Depot"),
            to: LocationRef::new(2, "North Terminus"),
        };

        self.buses.insert(
            bus_id,
            SimBus {
                bus,
                stops,
                speed_kmh,
                travelled_km: 0.0,
                start,
                route_length_km: num_stops.saturating_sub(1) as f64 * stop_spacing_km,
            },
        );
        bus_id
    }

    /// Adds a rider for `bus_id` and returns their id.
    pub fn add_rider(&mut self, bus_id: BusId, accuracy_m: f64, spoof: Option<SpoofKind>) -> UserId {
        let user = UserId::from_seed(self.next_rider_seed);
        self.next_rider_seed = self.next_rider_seed.wrapping_add(1);

        self.riders.push(SimRider {
            user: user.clone(),
            bus_id,
            accuracy_m,
            spoof,
        });
        user
    }

    /// Removes a rider (they got off the bus).
    pub fn remove_rider(&mut self, user: &UserId) {
        self.riders.retain(|r| &r.user != user);
    }

    /// Advances physics by dt seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;

        for bus in self.buses.values_mut() {
            let travelled = bus.travelled_km + bus.speed_kmh * dt / 3600.0;
            bus.travelled_km = travelled.min(bus.route_length_km);
        }
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.current_time
    }

    pub fn buses(&self) -> impl Iterator<Item = &SimBus> {
        self.buses.values()
    }

    pub fn bus(&self, id: BusId) -> Option<&SimBus> {
        self.buses.get(&id)
    }

    pub fn riders(&self) -> &[SimRider] {
        &self.riders
    }

    /// Generates one report per rider, honest and spoofed alike.
    pub fn generate_reports(&mut self, now: DateTime<Utc>) -> Vec<(SimRider, LocationReport)> {
        let riders = self.riders.clone();
        riders
            .into_iter()
            .filter_map(|rider| {
                let report = self.report_for(&rider, now)?;
                Some((rider, report))
            })
            .collect()
    }

    /// Generates a report from `rider` at `now`.
    pub fn report_for(&mut self, rider: &SimRider, now: DateTime<Utc>) -> Option<LocationReport> {
        let bus = self.buses.get(&rider.bus_id)?.clone();
        let truth = bus.position();

        let (north_m, east_m) = self.gps_noise(rider.accuracy_m);
        let speed_noise = self.gps_noise(0.3).0;

        let mut report = LocationReport {
            bus_id: rider.bus_id,
            stop_id: None,
            user_id: rider.user.clone(),
            timestamp: now,
            latitude: 0.0,
            longitude: 0.0,
            accuracy_meters: rider.accuracy_m,
            speed_mps: (bus.speed_mps() + speed_noise).max(0.0),
            heading_degrees: 0.0,
            device_info: Some("bustrack-sim".to_string()),
        };

        let position = match rider.spoof {
            None => offset(&truth, north_m, east_m),
            Some(SpoofKind::CarSpeed) => {
                report.speed_mps = 45.0;
                offset(&truth, north_m, east_m)
            }
            Some(SpoofKind::OffRoute) => offset(&truth, north_m, 5000.0 + east_m),
            Some(SpoofKind::Replay) => {
                report.timestamp = now - TimeDelta::minutes(45);
                offset(&truth, north_m, east_m)
            }
        };
        report.latitude = position.latitude;
        report.longitude = position.longitude;

        Some(report)
    }

    /// Gaussian (north, east) offset in metres.
    fn gps_noise(&mut self, sigma_m: f64) -> (f64, f64) {
        match Normal::new(0.0, sigma_m) {
            Ok(normal) => (normal.sample(&mut self.physics_rng), normal.sample(&mut self.physics_rng)),
            Err(_) => (0.0, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bustrack_core::calculate_distance_km;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(19723)
    }

    #[test]
    fn test_stops_are_evenly_spaced() {
        let mut oracle = Oracle::new(42);
        let id = oracle.add_bus(1, 4, 0.8, (30.0, 30.0));
        let bus = oracle.bus(id).unwrap();

        assert_eq!(bus.stops.len(), 4);
        let a = bus.stops[0].location.unwrap();
        let b = bus.stops[1].location.unwrap();
        let d = calculate_distance_km(a.latitude, a.longitude, b.latitude, b.longitude);
        assert!((d - 0.8).abs() < 0.01, "got {d}");
    }

    #[test]
    fn test_bus_stops_at_terminus() {
        let mut oracle = Oracle::new(42);
        let id = oracle.add_bus(1, 3, 0.8, (36.0, 36.0));

        // 36 km/h for 60 s = 600 m
        oracle.step(60.0);
        assert!((oracle.bus(id).unwrap().travelled_km - 0.6).abs() < 1e-9);

        oracle.step(3600.0);
        let bus = oracle.bus(id).unwrap();
        assert!(bus.at_terminus());
        assert_eq!(bus.speed_mps(), 0.0);
        assert!((bus.travelled_km - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_honest_report_is_near_truth() {
        let mut oracle = Oracle::new(7);
        let id = oracle.add_bus(1, 5, 0.8, (30.0, 30.0));
        oracle.add_rider(id, 5.0, None);
        oracle.step(30.0);

        let reports = oracle.generate_reports(now());
        assert_eq!(reports.len(), 1);
        let (_, report) = &reports[0];

        let truth = oracle.bus(id).unwrap().position();
        let err_m = calculate_distance_km(truth.latitude, truth.longitude, report.latitude, report.longitude) * 1000.0;
        assert!(err_m < 50.0, "got {err_m}");
        assert_eq!(report.timestamp, now());
    }

    #[test]
    fn test_spoofed_reports() {
        let mut oracle = Oracle::new(7);
        let id = oracle.add_bus(1, 5, 0.8, (30.0, 30.0));
        oracle.add_rider(id, 5.0, Some(SpoofKind::CarSpeed));
        oracle.add_rider(id, 5.0, Some(SpoofKind::OffRoute));
        oracle.add_rider(id, 5.0, Some(SpoofKind::Replay));

        let reports = oracle.generate_reports(now());
        let truth = oracle.bus(id).unwrap().position();

        assert!(reports[0].1.speed_mps * 3.6 > 120.0);

        let off = &reports[1].1;
        let d = calculate_distance_km(truth.latitude, truth.longitude, off.latitude, off.longitude);
        assert!(d > 4.5, "got {d}");

        assert_eq!(reports[2].1.timestamp, now() - TimeDelta::minutes(45));
    }

    #[test]
    fn test_deterministic_noise() {
        let run = |seed| {
            let mut oracle = Oracle::new(seed);
            let id = oracle.add_bus(1, 5, 0.8, (20.0, 40.0));
            oracle.add_rider(id, 8.0, None);
            oracle.step(10.0);
            oracle.generate_reports(now())[0].1.clone()
        };

        // Same seed = same reports
        assert_eq!(run(42), run(42));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn honest_reports_stay_near_a_stop(seed in any::<u64>(), elapsed in 0.0f64..1800.0) {
                let mut oracle = Oracle::new(seed);
                let id = oracle.add_bus(1, 12, 0.8, (20.0, 40.0));
                oracle.add_rider(id, 8.0, None);
                oracle.step(elapsed);

                let (_, report) = oracle.generate_reports(now()).remove(0);
                let nearest_km = oracle
                    .bus(id)
                    .unwrap()
                    .stops
                    .iter()
                    .filter_map(|s| s.location)
                    .map(|c| calculate_distance_km(c.latitude, c.longitude, report.latitude, report.longitude))
                    .fold(f64::INFINITY, f64::min);

                prop_assert!(nearest_km < 0.5, "nearest stop {nearest_km} km away");
            }
        }
    }
}
