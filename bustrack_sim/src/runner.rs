//! Scenario runner - executes simulation scenarios against the tracking service.

use crate::exporter::{SimEvent, SimExport};
use crate::oracle::SpoofKind;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld, Submission};

use bustrack_core::{MetricsSnapshot, QueryError, RejectionReason, TrackingConfig};
use bustrack_env::{BusId, TrackingContext, UserId};
use tracing::{debug, info, warn};

/// Worst tolerated distance between fused and true position (metres).
///
/// GPS noise is 8 m 1-sigma per axis; 100 m is far outside its tail.
const MAX_FUSED_ERROR_M: f64 = 100.0;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Reports submitted by all riders
    pub reports_submitted: u64,

    /// Reports accepted by the service
    pub reports_accepted: u64,

    /// Reports submitted by spoofers
    pub spoofed_submitted: u64,

    /// Spoofed reports the service accepted (must stay 0)
    pub spoofed_accepted: u64,

    /// Worst fused-position error observed (metres)
    pub max_error_m: f64,

    /// Service counters at the end of the run
    pub service: MetricsSnapshot,
}

impl ScenarioMetrics {
    fn record_round(&mut self, round: &[Submission]) {
        for submission in round {
            self.reports_submitted += 1;
            if submission.accepted() {
                self.reports_accepted += 1;
            }
            if submission.is_spoofed() {
                self.spoofed_submitted += 1;
                if submission.accepted() {
                    self.spoofed_accepted += 1;
                }
            }
        }
    }

    fn observe_error(&mut self, error_m: f64) {
        self.max_error_m = self.max_error_m.max(error_m);
    }
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    /// Thresholds for the service under test
    tracking: TrackingConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_duration_secs: 600.0,
            tracking: TrackingConfig::default(),
        }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Sets the tracking thresholds.
    pub fn with_tracking_config(mut self, tracking: TrackingConfig) -> Self {
        self.tracking = tracking;
        self
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_with_export(scenario).await.0
    }

    /// Runs a scenario, recording one frame per tick.
    pub async fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut world = SimWorld::new(self.config_for(scenario));
        let mut export = SimExport::new(scenario.name(), self.seed);
        let mut metrics = ScenarioMetrics::default();

        let outcome = match scenario {
            ScenarioId::MorningCommute => self.run_morning_commute(&mut world, &mut export, &mut metrics).await,
            ScenarioId::SpeedSpoofers => self.run_speed_spoofers(&mut world, &mut export, &mut metrics).await,
            ScenarioId::ReplayAttack => self.run_replay_attack(&mut world, &mut export, &mut metrics).await,
            ScenarioId::DirectoryOutage => self.run_directory_outage(&mut world, &mut export, &mut metrics).await,
            ScenarioId::CrowdSurge => self.run_crowd_surge(&mut world, &mut export, &mut metrics).await,
        };

        metrics.service = world.service.metrics();
        let failure_reason = outcome.err();
        let passed = failure_reason.is_none();
        export.finalize(passed, world.max_position_error_m());

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: world.tick_count(),
            final_time_secs: world.time(),
            failure_reason,
            metrics,
        };
        (result, export)
    }

    fn config_for(&self, scenario: ScenarioId) -> SimConfig {
        let base = SimConfig {
            seed: self.seed,
            max_duration_secs: self.max_duration_secs,
            tracking: self.tracking.clone(),
            ..Default::default()
        };

        match scenario {
            ScenarioId::MorningCommute => SimConfig {
                record_history: true,
                ..base
            },
            ScenarioId::SpeedSpoofers => SimConfig {
                num_buses: 2,
                ..base
            },
            ScenarioId::ReplayAttack => SimConfig {
                num_buses: 1,
                ..base
            },
            ScenarioId::DirectoryOutage => {
                let mut tracking = base.tracking.clone();
                tracking.repository_timeout_ms = 25;
                SimConfig {
                    num_buses: 2,
                    tracking,
                    ..base
                }
            }
            ScenarioId::CrowdSurge => SimConfig {
                num_buses: 1,
                riders_per_bus: 0,
                ..base
            },
        }
    }

    /// Ticks to run, never fewer than `min`.
    fn ticks(world: &SimWorld, min: u64) -> u64 {
        world.target_ticks().max(min)
    }

    /// Fails if any bus's fused position drifted beyond the error bound.
    fn check_error_bound(world: &SimWorld, metrics: &mut ScenarioMetrics) -> Result<(), String> {
        if let Some(err) = world.max_position_error_m() {
            metrics.observe_error(err);
            if err > MAX_FUSED_ERROR_M {
                return Err(format!(
                    "Fused position error {:.1}m exceeds {:.0}m at t={:.0}s",
                    err,
                    MAX_FUSED_ERROR_M,
                    world.time()
                ));
            }
        }
        Ok(())
    }

    /// Fails if an honest report was rejected or a spoofed one accepted.
    fn check_round(world: &SimWorld, round: &[Submission]) -> Result<(), String> {
        for submission in round {
            match (&submission.outcome, submission.rider.spoof) {
                (Err(reason), None) => {
                    return Err(format!(
                        "Honest rider {} rejected at t={:.0}s: {}",
                        submission.rider.user,
                        world.time(),
                        reason
                    ));
                }
                (Ok(_), Some(kind)) => {
                    return Err(format!(
                        "{:?} spoofer {} accepted at t={:.0}s",
                        kind,
                        submission.rider.user,
                        world.time()
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Riders leave; after the inactivity window every tracker must be swept.
    fn check_disembarkation(world: &mut SimWorld, expected: usize) -> Result<(), String> {
        let riders: Vec<UserId> = world.oracle.riders().iter().map(|r| r.user.clone()).collect();
        for user in &riders {
            world.oracle.remove_rider(user);
        }

        let idle = world.config.tracking.tracker_inactivity_secs as f64 + 60.0;
        world.advance(idle);

        let removed = world.disembark_all();
        if removed != expected {
            return Err(format!("Disembarkation removed {} trackers, expected {}", removed, expected));
        }

        for bus_id in world.bus_ids() {
            if world.service.active_tracker_count(bus_id) != 0 {
                return Err(format!("Bus {} still has active trackers", bus_id));
            }
            if world.service.current_position(bus_id).is_unknown() {
                return Err(format!("Bus {} lost its position after disembarkation", bus_id));
            }
        }
        Ok(())
    }

    /// SIM-001: MorningCommute - honest riders on parallel routes.
    async fn run_morning_commute(
        &self,
        world: &mut SimWorld,
        export: &mut SimExport,
        metrics: &mut ScenarioMetrics,
    ) -> Result<(), String> {
        info!("SIM-001: MorningCommute - honest riders, fused error bound");

        let ticks = Self::ticks(world, 1);
        let start = world.context.wall_clock();

        for _ in 0..ticks {
            world.tick();
            let round = world.submit_round().await;
            metrics.record_round(&round);
            Self::check_round(world, &round)?;
            Self::check_error_bound(world, metrics)?;
            export.add_frame(world.frame(Vec::new()));
        }

        for bus_id in world.bus_ids() {
            let position = world.service.current_position(bus_id);
            if position.reporter_count as usize != world.config.riders_per_bus {
                return Err(format!(
                    "Bus {} shows {} reporters, expected {}",
                    bus_id, position.reporter_count, world.config.riders_per_bus
                ));
            }

            // Riders in one round share a timestamp, so one history entry per round
            let history = world.service.position_history(bus_id, start);
            if history.len() as u64 != ticks {
                return Err(format!("Bus {} history has {} entries, expected {}", bus_id, history.len(), ticks));
            }

            let at_terminus = world.oracle.bus(bus_id).map(|b| b.at_terminus()).unwrap_or(true);
            if let (false, Some(last)) = (at_terminus, world.oracle.bus(bus_id).and_then(|b| b.stops.last())) {
                let eta = world
                    .service
                    .estimated_arrival(bus_id, last.id)
                    .await
                    .map_err(|e| format!("No ETA for bus {}: {}", bus_id, e))?;
                if eta.estimated_arrival < world.context.wall_clock() {
                    return Err(format!("ETA for bus {} is in the past", bus_id));
                }
            }
        }

        let expected = world.config.num_buses * world.config.riders_per_bus;
        Self::check_disembarkation(world, expected)
    }

    /// SIM-002: SpeedSpoofers - car-speed and off-route impostors.
    async fn run_speed_spoofers(
        &self,
        world: &mut SimWorld,
        export: &mut SimExport,
        metrics: &mut ScenarioMetrics,
    ) -> Result<(), String> {
        info!("SIM-002: SpeedSpoofers - impostors must never be accepted");

        let accuracy = world.config.gps_accuracy_m;
        let spoofers = vec![
            world.oracle.add_rider(BusId(1), accuracy, Some(SpoofKind::CarSpeed)),
            world.oracle.add_rider(BusId(1), accuracy, Some(SpoofKind::OffRoute)),
            world.oracle.add_rider(BusId(2), accuracy, Some(SpoofKind::CarSpeed)),
        ];

        for _ in 0..Self::ticks(world, 1) {
            world.tick();
            let round = world.submit_round().await;
            metrics.record_round(&round);
            Self::check_round(world, &round)?;
            Self::check_error_bound(world, metrics)?;

            for submission in round.iter().filter(|s| s.is_spoofed()) {
                let expected = match submission.rider.spoof {
                    Some(SpoofKind::CarSpeed) => "TOO_FAST",
                    Some(SpoofKind::OffRoute) => "OFF_ROUTE",
                    _ => continue,
                };
                if let Err(reason) = &submission.outcome {
                    if reason.code() != expected {
                        return Err(format!("Spoofer rejected as {} instead of {}", reason.code(), expected));
                    }
                }
            }

            // Spoofers never count as trackers
            for bus_id in world.bus_ids() {
                let trackers = world.service.active_tracker_count(bus_id);
                if trackers != world.config.riders_per_bus {
                    return Err(format!("Bus {} has {} trackers, expected {}", bus_id, trackers, world.config.riders_per_bus));
                }
            }

            let events = round
                .iter()
                .filter_map(|s| s.outcome.as_ref().err())
                .map(|reason| SimEvent::warn(format!("rejected: {}", reason.code())))
                .collect();
            export.add_frame(world.frame(events));
        }

        for spoofer in &spoofers {
            if world.rider_points(spoofer) != 0 {
                return Err(format!("Spoofer {} earned reward points", spoofer));
            }
        }

        let snapshot = world.service.metrics();
        if snapshot.too_fast + snapshot.off_route != metrics.spoofed_submitted {
            return Err(format!(
                "Expected {} spoof rejections, service counted {}",
                metrics.spoofed_submitted,
                snapshot.too_fast + snapshot.off_route
            ));
        }
        Ok(())
    }

    /// SIM-003: ReplayAttack - stale reports replayed after the fact.
    async fn run_replay_attack(
        &self,
        world: &mut SimWorld,
        export: &mut SimExport,
        metrics: &mut ScenarioMetrics,
    ) -> Result<(), String> {
        info!("SIM-003: ReplayAttack - replayed reports are stale");

        let accuracy = world.config.gps_accuracy_m;
        let replayers = vec![
            world.oracle.add_rider(BusId(1), accuracy, Some(SpoofKind::Replay)),
            world.oracle.add_rider(BusId(1), accuracy, Some(SpoofKind::Replay)),
        ];

        for _ in 0..Self::ticks(world, 1) {
            world.tick();
            let round = world.submit_round().await;
            metrics.record_round(&round);
            Self::check_round(world, &round)?;
            Self::check_error_bound(world, metrics)?;

            for submission in round.iter().filter(|s| s.is_spoofed()) {
                match &submission.outcome {
                    Err(RejectionReason::Stale { skew_minutes }) if *skew_minutes <= -30 => {}
                    other => return Err(format!("Replay not rejected as stale: {:?}", other)),
                }
            }
            export.add_frame(world.frame(Vec::new()));
        }

        for replayer in &replayers {
            if world.rider_points(replayer) != 0 {
                return Err(format!("Replayer {} earned reward points", replayer));
            }
        }
        if world.service.metrics().stale != metrics.spoofed_submitted {
            return Err("Stale counter does not match replayed reports".to_string());
        }
        Ok(())
    }

    /// SIM-004: DirectoryOutage - hard outage, then latency past the timeout.
    async fn run_directory_outage(
        &self,
        world: &mut SimWorld,
        export: &mut SimExport,
        metrics: &mut ScenarioMetrics,
    ) -> Result<(), String> {
        info!("SIM-004: DirectoryOutage - failures are retryable and leave state intact");

        let ticks = Self::ticks(world, 9);
        let outage_start = ticks / 3;
        let slow_start = 2 * ticks / 3;
        let slow_end = slow_start + 3;
        let slow_latency_ms = world.config.tracking.repository_timeout_ms * 4;

        let riders: Vec<UserId> = world.oracle.riders().iter().map(|r| r.user.clone()).collect();
        let probe_bus = BusId(1);
        let probe_stop = world
            .oracle
            .bus(probe_bus)
            .and_then(|b| b.stops.last())
            .map(|s| s.id)
            .ok_or("Probe bus has no stops")?;

        for tick in 0..ticks {
            let mut events = Vec::new();
            if tick == outage_start {
                warn!("Directory outage at t={:.0}s", world.time());
                world.directory_controller.take_down();
                events.push(SimEvent::warn("directory down"));
            } else if tick == slow_start {
                world.directory_controller.restore();
                world.directory_controller.set_latency(slow_latency_ms);
                events.push(SimEvent::warn(format!("directory slow ({}ms)", slow_latency_ms)));
            } else if tick == slow_end {
                world.directory_controller.set_latency(0);
                events.push(SimEvent::info("directory recovered"));
            }
            let faulty = tick >= outage_start && tick < slow_end;

            world.tick();
            let positions_before = world.service.active_bus_positions();
            let balances_before: Vec<u64> = riders.iter().map(|u| world.rider_points(u)).collect();

            let round = world.submit_round().await;
            metrics.record_round(&round);

            if faulty {
                for submission in &round {
                    match &submission.outcome {
                        Err(reason @ RejectionReason::RepositoryUnavailable(_)) if reason.is_retryable() => {}
                        other => return Err(format!("Expected RepositoryUnavailable during outage, got {:?}", other)),
                    }
                }
                if world.service.active_bus_positions() != positions_before {
                    return Err("Positions changed during directory outage".to_string());
                }
                let balances_after: Vec<u64> = riders.iter().map(|u| world.rider_points(u)).collect();
                if balances_after != balances_before {
                    return Err("Reward balances changed during directory outage".to_string());
                }

                if world.service.predict_next_stop(probe_bus).await.is_some() {
                    return Err("Next-stop prediction served during outage".to_string());
                }
                if !matches!(
                    world.service.estimated_arrival(probe_bus, probe_stop).await,
                    Err(QueryError::RepositoryUnavailable(_))
                ) {
                    return Err("ETA query did not report the outage".to_string());
                }
            } else {
                Self::check_round(world, &round)?;
                Self::check_error_bound(world, metrics)?;
            }

            debug!("  tick={} faulty={} calls={}", tick, faulty, world.directory_controller.calls());
            export.add_frame(world.frame(events));
        }

        if world.directory_controller.failed_calls() == 0 {
            return Err("Outage never hit the directory".to_string());
        }
        Ok(())
    }

    /// SIM-005: CrowdSurge - riders board one per tick, then all leave.
    async fn run_crowd_surge(
        &self,
        world: &mut SimWorld,
        export: &mut SimExport,
        metrics: &mut ScenarioMetrics,
    ) -> Result<(), String> {
        info!("SIM-005: CrowdSurge - confidence grows with the crowd");

        const BOARDING: usize = 6;
        let bus_id = BusId(1);
        let accuracy = world.config.gps_accuracy_m;
        let mut last_confidence = 0u8;

        for tick in 0..Self::ticks(world, BOARDING as u64) {
            let boarding = (tick as usize) < BOARDING;
            if boarding {
                world.oracle.add_rider(bus_id, accuracy, None);
            }

            world.tick();
            let round = world.submit_round().await;
            metrics.record_round(&round);
            Self::check_round(world, &round)?;
            Self::check_error_bound(world, metrics)?;

            let position = world.service.current_position(bus_id);
            if boarding {
                let riders = world.oracle.riders().len();
                if position.reporter_count as usize != riders {
                    return Err(format!("Reporter count {} but {} riders aboard", position.reporter_count, riders));
                }
                if position.confidence_score < last_confidence {
                    return Err(format!(
                        "Confidence fell from {} to {} as rider {} boarded",
                        last_confidence, position.confidence_score, riders
                    ));
                }
                last_confidence = position.confidence_score;
            }
            export.add_frame(world.frame(Vec::new()));
        }

        if last_confidence < 90 {
            return Err(format!("Confidence peaked at {} with a full crowd", last_confidence));
        }

        Self::check_disembarkation(world, BOARDING)
    }
}
