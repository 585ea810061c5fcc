//! SimWorld - The simulation harness container.

use crate::context::SimContext;
use crate::directory::{SimDirectory, SimDirectoryController};
use crate::exporter::{BusFrame, SimEvent, SimFrame};
use crate::oracle::{Oracle, SimRider};

use bustrack_core::{
    calculate_distance_km, RejectionReason, ReportReceipt, SledHistorySink, TrackingConfig, TrackingService,
};
use bustrack_env::{BusId, TrackingContext, UserId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of buses on parallel routes
    pub num_buses: usize,

    /// Honest riders per bus at start
    pub riders_per_bus: usize,

    /// Stops per route
    pub stops_per_route: u32,

    /// Distance between consecutive stops (km)
    pub stop_spacing_km: f64,

    /// Cruising speed range (km/h)
    pub speed_range_kmh: (f64, f64),

    /// Seconds between report rounds
    pub tick_secs: f64,

    /// Maximum simulation duration in seconds
    pub max_duration_secs: f64,

    /// Phone GPS accuracy (metres, 1-sigma)
    pub gps_accuracy_m: f64,

    /// Thresholds for the tracking service under test
    pub tracking: TrackingConfig,

    /// Persist every published position to a temporary sled sink
    pub record_history: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_buses: 3,
            riders_per_bus: 3,
            stops_per_route: 12,
            stop_spacing_km: 0.8,
            speed_range_kmh: (20.0, 40.0),
            tick_secs: 10.0,
            max_duration_secs: 600.0,
            gps_accuracy_m: 8.0,
            tracking: TrackingConfig::default(),
            record_history: false,
        }
    }
}

/// Outcome of one submitted report.
#[derive(Debug, Clone)]
pub struct Submission {
    pub rider: SimRider,
    pub outcome: Result<ReportReceipt, RejectionReason>,
}

impl Submission {
    pub fn accepted(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_spoofed(&self) -> bool {
        self.rider.spoof.is_some()
    }
}

/// The service under test, wired to the simulated clock and directory.
pub type SimService = TrackingService<SimContext, SimDirectory>;

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// Ground truth oracle
    pub oracle: Oracle,

    /// Directory fault injection
    pub directory_controller: Arc<SimDirectoryController>,

    /// Tracking service under test
    pub service: Arc<SimService>,

    /// Current tick count
    tick_count: u64,
}

impl SimWorld {
    /// Creates a new SimWorld with the given configuration.
    ///
    /// Buses are registered with the directory and each gets
    /// `riders_per_bus` honest riders.
    pub fn new(config: SimConfig) -> Self {
        // Derive separate seeds for different subsystems
        let context_seed = config.seed;
        let physics_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);

        let context = SimContext::shared(context_seed);
        let directory_controller = SimDirectoryController::shared();
        let directory = Arc::new(SimDirectory::new(Arc::clone(&directory_controller)));

        let mut oracle = Oracle::new(physics_seed);
        for i in 0..config.num_buses {
            let bus_id = oracle.add_bus(
                i as i64 + 1,
                config.stops_per_route,
                config.stop_spacing_km,
                config.speed_range_kmh,
            );
            for _ in 0..config.riders_per_bus {
                oracle.add_rider(bus_id, config.gps_accuracy_m, None);
            }
        }
        for bus in oracle.buses() {
            directory.insert_route(bus.bus.clone(), bus.stops.clone());
        }

        let mut service = TrackingService::new(Arc::clone(&context), directory, config.tracking.clone());
        if config.record_history {
            match SledHistorySink::open_temp() {
                Ok(sink) => service = service.with_history(Arc::new(sink)),
                Err(e) => warn!("History disabled: {}", e),
            }
        }

        Self {
            config,
            context,
            oracle,
            directory_controller,
            service: Arc::new(service),
            tick_count: 0,
        }
    }

    /// Advances simulation by one tick.
    pub fn tick(&mut self) {
        self.advance(self.config.tick_secs);
        self.tick_count += 1;
    }

    /// Advances clock and physics by `secs` without counting a tick.
    pub fn advance(&mut self, secs: f64) {
        self.context.advance_time(Duration::from_secs_f64(secs));
        self.oracle.step(secs);
    }

    /// Every rider submits one report; returns the outcomes in rider order.
    pub async fn submit_round(&mut self) -> Vec<Submission> {
        let now = self.context.wall_clock();
        let reports = self.oracle.generate_reports(now);

        let mut submissions = Vec::with_capacity(reports.len());
        for (rider, report) in reports {
            let outcome = self.service.submit_report(report).await;
            submissions.push(Submission { rider, outcome });
        }

        let accepted = submissions.iter().filter(|s| s.accepted()).count();
        debug!(
            "  t={:.0}s | reports={} | accepted={}",
            self.time(),
            submissions.len(),
            accepted
        );
        submissions
    }

    /// Distance between fused and true position of a bus, in metres.
    ///
    /// `None` while the bus has no fused position.
    pub fn position_error_m(&self, bus_id: BusId) -> Option<f64> {
        let truth = self.oracle.bus(bus_id)?.position();
        let fused = self.service.current_position(bus_id);
        if fused.is_unknown() {
            return None;
        }
        Some(calculate_distance_km(truth.latitude, truth.longitude, fused.latitude, fused.longitude) * 1000.0)
    }

    /// Worst position error over all tracked buses.
    pub fn max_position_error_m(&self) -> Option<f64> {
        self.bus_ids()
            .into_iter()
            .filter_map(|id| self.position_error_m(id))
            .reduce(f64::max)
    }

    pub fn bus_ids(&self) -> Vec<BusId> {
        self.oracle.buses().map(|b| b.bus.id).collect()
    }

    /// Runs the disembarkation sweep on every bus.
    pub fn disembark_all(&self) -> usize {
        self.bus_ids()
            .into_iter()
            .map(|id| self.service.process_disembarkation(id))
            .sum()
    }

    pub fn rider_points(&self, user: &UserId) -> u64 {
        self.service.reward_balance(user).total_points
    }

    /// Captures truth vs fused state for export.
    pub fn frame(&self, events: Vec<SimEvent>) -> SimFrame {
        let buses = self
            .oracle
            .buses()
            .map(|bus| {
                let truth = bus.position();
                let fused = self.service.current_position(bus.bus.id);
                BusFrame {
                    bus_id: bus.bus.id.0,
                    truth_lat: truth.latitude,
                    truth_lng: truth.longitude,
                    fused_lat: (!fused.is_unknown()).then_some(fused.latitude),
                    fused_lng: (!fused.is_unknown()).then_some(fused.longitude),
                    error_m: self.position_error_m(bus.bus.id),
                    confidence: fused.confidence_score,
                    reporter_count: fused.reporter_count,
                    next_stop: fused.next_stop_name,
                }
            })
            .collect();

        SimFrame {
            time_sec: self.time(),
            buses,
            events,
        }
    }

    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Number of ticks that fit into the configured duration.
    pub fn target_ticks(&self) -> u64 {
        (self.config.max_duration_secs / self.config.tick_secs).floor() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_world_creation() {
        let config = SimConfig {
            seed: 42,
            num_buses: 2,
            riders_per_bus: 4,
            ..Default::default()
        };

        let world = SimWorld::new(config);
        assert_eq!(world.bus_ids(), vec![BusId(1), BusId(2)]);
        assert_eq!(world.oracle.riders().len(), 8);
        assert_eq!(world.tick_count(), 0);
        assert_eq!(world.target_ticks(), 60);
    }

    #[tokio::test]
    async fn test_first_round_is_accepted() {
        let mut world = SimWorld::new(SimConfig::default());
        world.tick();

        let round = world.submit_round().await;
        assert_eq!(round.len(), 9);
        assert!(round.iter().all(|s| s.accepted()), "{:?}", round.iter().map(|s| &s.outcome).collect::<Vec<_>>());

        let err = world.max_position_error_m().unwrap();
        assert!(err < 100.0, "got {err}");
    }

    #[test]
    fn test_tick_advances_time() {
        let mut world = SimWorld::new(SimConfig::default());
        world.tick();
        world.tick();

        assert_eq!(world.tick_count(), 2);
        assert!((world.time() - 20.0).abs() < 1e-9);
        assert!((world.oracle.time() - 20.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_sweeper_leaves_virtual_clock_alone() {
        let mut world = SimWorld::new(SimConfig {
            num_buses: 1,
            ..Default::default()
        });
        world.tick();
        world.submit_round().await;
        assert_eq!(world.service.active_tracker_count(BusId(1)), 3);

        world.service.start_tracker_sweeper(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(world.context.now(), Duration::from_secs(10));

        // Riders go idle in virtual time; the next timer tick sweeps them
        world.advance(400.0);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(world.service.active_tracker_count(BusId(1)), 0);
        assert_eq!(world.context.now(), Duration::from_secs(410));
    }
}
