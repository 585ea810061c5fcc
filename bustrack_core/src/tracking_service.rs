//! The tracking service: report ingestion and read-side queries.
//!
//! Write path for one report:
//!
//! 1. Resolve the bus and its stops through the [`BusDirectory`]
//! 2. Route-membership pre-check, then the authenticity gates
//! 3. Derive stop context (nearest stop, next stop, ETA)
//! 4. Refresh the rider's tracker entry and count active riders
//! 5. Score confidence, publish the fused position, credit the rider
//! 6. Append to the history sink, if one is installed
//!
//! Nothing is written to shared state until step 4, so a rejected report
//! leaves positions, trackers and balances exactly as they were.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bustrack_env::{Bus, BusDirectory, BusId, EnvError, LocationId, Stop, StopId, TrackingContext, UserId};
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::authenticity::AuthenticityScorer;
use crate::config::TrackingConfig;
use crate::confidence::ConfidenceScorer;
use crate::error::{QueryError, RejectionReason};
use crate::eta::EtaEstimator;
use crate::history::PositionHistorySink;
use crate::metrics::{MetricsSnapshot, ServiceMetrics};
use crate::model::{ArrivalEstimate, FusedPosition, LocationReport, ReportReceipt, RewardLedgerEntry, StopContext};
use crate::position_store::PositionStore;
use crate::reward_ledger::RewardLedger;
use crate::stop_topology::{nearest_stop, next_stop};

/// Fuses crowd-sourced reports into per-bus positions.
///
/// Generic over the clock and the directory so the same service runs under
/// tokio in production and under a virtual clock in simulation.
pub struct TrackingService<Ctx: TrackingContext, Dir: BusDirectory> {
    ctx: Arc<Ctx>,
    directory: Arc<Dir>,
    config: TrackingConfig,

    authenticity: AuthenticityScorer,
    confidence: ConfidenceScorer,
    eta: EtaEstimator,

    positions: PositionStore,
    ledger: RewardLedger,
    metrics: ServiceMetrics,
    history: Option<Arc<dyn PositionHistorySink>>,
}

impl<Ctx: TrackingContext, Dir: BusDirectory> TrackingService<Ctx, Dir> {
    pub fn new(ctx: Arc<Ctx>, directory: Arc<Dir>, config: TrackingConfig) -> Self {
        Self {
            ctx,
            directory,
            authenticity: AuthenticityScorer::new(config.clone()),
            confidence: ConfidenceScorer::new(),
            eta: EtaEstimator::new(&config),
            positions: PositionStore::new(config.tracker_inactivity()),
            ledger: RewardLedger::new(config.rewards.clone()),
            metrics: ServiceMetrics::new(),
            history: None,
            config,
        }
    }

    /// Installs a sink that receives every published position.
    pub fn with_history(mut self, sink: Arc<dyn PositionHistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.ctx
    }

    // ========================================================================
    // WRITE PATH
    // ========================================================================

    /// Validates a report and, if accepted, publishes the bus's new position
    /// and credits the rider.
    #[instrument(skip(self, report), fields(bus = %report.bus_id, user = %report.user_id))]
    pub async fn submit_report(&self, report: LocationReport) -> Result<ReportReceipt, RejectionReason> {
        match self.ingest(&report).await {
            Ok(receipt) => {
                self.metrics.record_accepted();
                Ok(receipt)
            }
            Err(reason) => {
                self.metrics.record_rejected(&reason);
                Err(reason)
            }
        }
    }

    async fn ingest(&self, report: &LocationReport) -> Result<ReportReceipt, RejectionReason> {
        let bus = match self.lookup_bus(report.bus_id).await {
            Ok(Some(bus)) => bus,
            Ok(None) => return Err(self.rejected("bus", report, RejectionReason::UnknownBus(report.bus_id))),
            Err(e) => return Err(self.rejected("directory", report, e.into())),
        };

        let stops = match self.lookup_stops(&bus).await {
            Ok(stops) => stops,
            Err(e) => return Err(self.rejected("directory", report, e.into())),
        };

        if let Err(reason) = self.authenticity.check_route_membership(report, &stops) {
            return Err(self.rejected("route", report, reason));
        }

        let now = self.ctx.wall_clock();
        self.authenticity.evaluate(report, &bus, &stops, now)?;

        let stop_context = self.stop_context(report, &stops, now);
        debug!(
            last_stop = ?stop_context.last_reported_stop_name,
            next_stop = ?stop_context.next_stop_name,
            eta = ?stop_context.estimated_arrival_time,
            "Derived stop context"
        );

        // All checks passed; shared state changes from here on
        let reporter_count = self.positions.refresh_tracker(bus.id, &report.user_id, now);
        let confidence = self.confidence.score(report, reporter_count);

        let position = FusedPosition::from_report(
            report,
            &bus,
            stop_context,
            u32::try_from(reporter_count).unwrap_or(u32::MAX),
            confidence,
        );
        self.positions.publish(position.clone());

        let rewards = self
            .ledger
            .award_report(&report.user_id, bus.id, report.accuracy_meters, now);

        self.record_history(&position);

        info!(
            reporters = reporter_count,
            confidence,
            points = rewards.points_from_last_activity,
            "Accepted report for bus {}",
            bus.number
        );

        Ok(ReportReceipt { position, rewards })
    }

    fn rejected(&self, gate: &'static str, report: &LocationReport, reason: RejectionReason) -> RejectionReason {
        warn!(
            gate,
            bus = %report.bus_id,
            user = %report.user_id,
            code = reason.code(),
            "Report rejected: {}",
            reason
        );
        reason
    }

    fn stop_context(&self, report: &LocationReport, stops: &[Stop], now: DateTime<Utc>) -> StopContext {
        let position = report.coordinates();

        // Fall back to the rider's own stop pick when nothing is geocoded
        let current = nearest_stop(&position, stops)
            .or_else(|| report.stop_id.and_then(|id| stops.iter().find(|s| s.id == id)));
        let Some(current) = current else {
            return StopContext::default();
        };

        let next = next_stop(current.id, stops);
        StopContext {
            last_reported_stop_name: Some(current.name.clone()),
            next_stop_name: next.map(|s| s.name.clone()),
            estimated_arrival_time: next
                .and_then(|n| self.eta.estimate(&position, report.speed_mps, n, current, now)),
        }
    }

    fn record_history(&self, position: &FusedPosition) {
        let Some(sink) = &self.history else {
            return;
        };
        if let Err(e) = sink.record(position) {
            self.metrics.record_history_failure();
            warn!(bus = %position.bus_id, "Failed to record position history: {}", e);
        }
    }

    // ========================================================================
    // TRACKER MAINTENANCE
    // ========================================================================

    /// Evicts riders of `bus_id` idle longer than the inactivity window.
    pub fn process_disembarkation(&self, bus_id: BusId) -> usize {
        self.positions.sweep_inactive(bus_id, self.ctx.wall_clock())
    }

    /// Evicts idle riders on every bus.
    pub fn sweep_all_trackers(&self) -> usize {
        self.positions.sweep_all_inactive(self.ctx.wall_clock())
    }

    /// Spawns a background task sweeping idle riders every `interval`.
    ///
    /// Ticks come from the tokio timer, never from [`TrackingContext::sleep`],
    /// so a virtual clock is only read here and never advanced. The task holds
    /// a weak reference and exits once the service is dropped.
    pub fn start_tracker_sweeper(self: &Arc<Self>, interval: Duration) {
        let service = Arc::downgrade(self);

        self.ctx.spawn("tracker-sweeper", async move {
            let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                let removed = service.sweep_all_trackers();
                if removed > 0 {
                    debug!(removed, "Periodic tracker sweep");
                }
            }
        });
    }

    pub fn active_tracker_count(&self, bus_id: BusId) -> usize {
        self.positions.active_tracker_count(bus_id)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// The bus's fused position, or the placeholder if it was never reported.
    pub fn current_position(&self, bus_id: BusId) -> FusedPosition {
        self.positions
            .current(bus_id)
            .unwrap_or_else(|| FusedPosition::unknown(bus_id, self.ctx.wall_clock()))
    }

    /// Every tracked bus's position.
    pub fn active_bus_positions(&self) -> HashMap<BusId, FusedPosition> {
        self.positions.snapshot()
    }

    /// Positions of tracked buses running from `from` to `to`, by bus id.
    pub async fn active_positions_for_route(
        &self,
        from: LocationId,
        to: LocationId,
    ) -> Result<Vec<FusedPosition>, QueryError> {
        let buses = self
            .bounded(self.directory.find_buses_between(from, to))
            .await?;

        Ok(buses
            .iter()
            .filter_map(|bus| self.positions.current(bus.id))
            .collect())
    }

    pub fn reward_balance(&self, user: &UserId) -> RewardLedgerEntry {
        self.ledger.balance(user)
    }

    /// The stop after the one nearest the bus's current position.
    ///
    /// `None` if the bus is untracked, has no geocoded stops, is at its last
    /// stop, or the directory cannot be reached.
    pub async fn predict_next_stop(&self, bus_id: BusId) -> Option<Stop> {
        let position = self.positions.current(bus_id)?;
        let stops = match self.stops_for(bus_id).await {
            Ok(stops) => stops,
            Err(e) => {
                warn!(bus = %bus_id, "Next-stop prediction unavailable: {}", e);
                return None;
            }
        };

        let current = nearest_stop(&position.coordinates(), &stops)?;
        next_stop(current.id, &stops).cloned()
    }

    /// Projects when the bus will reach `stop_id` from its current position.
    pub async fn estimated_arrival(&self, bus_id: BusId, stop_id: StopId) -> Result<ArrivalEstimate, QueryError> {
        let position = self
            .positions
            .current(bus_id)
            .ok_or(QueryError::BusNotTracked(bus_id))?;

        let stops = self.stops_for(bus_id).await?;
        let target = stops
            .iter()
            .find(|s| s.id == stop_id)
            .ok_or(QueryError::StopNotOnRoute { bus: bus_id, stop: stop_id })?;

        let estimated_arrival = self
            .eta
            .estimate_to(&position.coordinates(), position.speed, target, self.ctx.wall_clock())
            .ok_or(QueryError::NoEstimate(stop_id))?;

        Ok(ArrivalEstimate {
            bus_id,
            stop_id,
            stop_name: target.name.clone(),
            estimated_arrival,
            confidence: position.confidence_score,
        })
    }

    /// Positions of the bus published at or after `since`, oldest first.
    ///
    /// Without a history sink only the current position is known.
    pub fn position_history(&self, bus_id: BusId, since: DateTime<Utc>) -> Vec<FusedPosition> {
        if let Some(sink) = &self.history {
            match sink.since(bus_id, since) {
                Ok(positions) => return positions,
                Err(e) => warn!(bus = %bus_id, "History read failed, serving current position: {}", e),
            }
        }

        self.positions
            .current(bus_id)
            .filter(|p| p.timestamp >= since)
            .into_iter()
            .collect()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ========================================================================
    // DIRECTORY ACCESS
    // ========================================================================

    /// Runs a directory call under the configured timeout.
    async fn bounded<T, F>(&self, call: F) -> Result<T, EnvError>
    where
        F: Future<Output = Result<T, EnvError>>,
    {
        match tokio::time::timeout(self.config.repository_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(EnvError::Timeout(self.config.repository_timeout_ms)),
        }
    }

    async fn lookup_bus(&self, bus_id: BusId) -> Result<Option<Bus>, EnvError> {
        self.bounded(self.directory.find_bus_by_id(bus_id)).await
    }

    async fn lookup_stops(&self, bus: &Bus) -> Result<Vec<Stop>, EnvError> {
        self.bounded(self.directory.find_stops_for_bus(bus)).await
    }

    /// Stops of a bus for read queries; unknown buses have none.
    async fn stops_for(&self, bus_id: BusId) -> Result<Vec<Stop>, EnvError> {
        match self.lookup_bus(bus_id).await? {
            Some(bus) => self.lookup_stops(&bus).await,
            None => Ok(Vec::new()),
        }
    }
}
