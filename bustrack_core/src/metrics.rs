//! Report Ingestion Metrics
//! ========================
//!
//! Lock-free counters for the write path:
//! - **Accepted**: reports that passed every gate and were published
//! - **Rejected**: one counter per rejection reason
//!
//! Counters are monotonic; [`ServiceMetrics::snapshot`] reads them into a
//! plain serializable struct.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::RejectionReason;

/// Live counters owned by a tracking service.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    accepted: AtomicU64,
    unknown_bus: AtomicU64,
    off_route: AtomicU64,
    outside_corridor: AtomicU64,
    too_fast: AtomicU64,
    stale: AtomicU64,
    unsafe_movement: AtomicU64,
    repository_unavailable: AtomicU64,
    history_failures: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, reason: &RejectionReason) {
        let counter = match reason {
            RejectionReason::UnknownBus(_) => &self.unknown_bus,
            RejectionReason::OffRoute => &self.off_route,
            RejectionReason::OutsideCorridor => &self.outside_corridor,
            RejectionReason::TooFast { .. } => &self.too_fast,
            RejectionReason::Stale { .. } => &self.stale,
            RejectionReason::Unsafe => &self.unsafe_movement,
            RejectionReason::RepositoryUnavailable(_) => &self.repository_unavailable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// A history write failed after the report was accepted.
    pub fn record_history_failure(&self) {
        self.history_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            unknown_bus: self.unknown_bus.load(Ordering::Relaxed),
            off_route: self.off_route.load(Ordering::Relaxed),
            outside_corridor: self.outside_corridor.load(Ordering::Relaxed),
            too_fast: self.too_fast.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            unsafe_movement: self.unsafe_movement.load(Ordering::Relaxed),
            repository_unavailable: self.repository_unavailable.load(Ordering::Relaxed),
            history_failures: self.history_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ServiceMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub accepted: u64,
    pub unknown_bus: u64,
    pub off_route: u64,
    pub outside_corridor: u64,
    pub too_fast: u64,
    pub stale: u64,
    pub unsafe_movement: u64,
    pub repository_unavailable: u64,
    pub history_failures: u64,
}

impl MetricsSnapshot {
    pub fn rejected(&self) -> u64 {
        self.unknown_bus
            + self.off_route
            + self.outside_corridor
            + self.too_fast
            + self.stale
            + self.unsafe_movement
            + self.repository_unavailable
    }

    pub fn total(&self) -> u64 {
        self.accepted + self.rejected()
    }

    /// Accepted / total, or 0.0 before any report.
    pub fn acceptance_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.accepted as f64 / total as f64,
        }
    }
}
