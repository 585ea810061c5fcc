//! Per-bus fused positions and active-tracker sets.
//!
//! Both maps are sharded (`DashMap`), so a write for one bus never blocks
//! reads of another. Positions are installed whole; a reader sees either the
//! previous position or the new one.

use std::collections::HashMap;

use bustrack_env::{BusId, UserId};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::model::FusedPosition;

/// Owner of every [`FusedPosition`] and of the riders currently tracking
/// each bus.
#[derive(Debug)]
pub struct PositionStore {
    positions: DashMap<BusId, FusedPosition>,

    /// bus -> rider -> last accepted report time
    trackers: DashMap<BusId, DashMap<UserId, DateTime<Utc>>>,

    inactivity_window: TimeDelta,
}

impl PositionStore {
    pub fn new(inactivity_window: TimeDelta) -> Self {
        Self {
            positions: DashMap::new(),
            trackers: DashMap::new(),
            inactivity_window,
        }
    }

    /// Replaces the bus's position (last write wins).
    pub fn publish(&self, position: FusedPosition) {
        self.positions.insert(position.bus_id, position);
    }

    /// The bus's position, if any report was ever accepted for it.
    pub fn current(&self, bus_id: BusId) -> Option<FusedPosition> {
        self.positions.get(&bus_id).map(|p| p.value().clone())
    }

    /// Copy of every tracked bus's position.
    pub fn snapshot(&self) -> HashMap<BusId, FusedPosition> {
        self.positions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn tracked_bus_count(&self) -> usize {
        self.positions.len()
    }

    /// Marks `user` as tracking `bus_id` at `now` and returns the number of
    /// active trackers, the caller included.
    ///
    /// Idle trackers on the same bus are evicted first.
    pub fn refresh_tracker(&self, bus_id: BusId, user: &UserId, now: DateTime<Utc>) -> usize {
        let set = self.trackers.entry(bus_id).or_default();
        let cutoff = self.cutoff(now);
        set.retain(|_, last_seen| *last_seen >= cutoff);
        set.insert(user.clone(), now);
        set.len()
    }

    /// Drops riders idle for longer than the inactivity window.
    ///
    /// Returns how many were removed. Entries refreshed concurrently carry a
    /// timestamp near `now` and survive.
    pub fn sweep_inactive(&self, bus_id: BusId, now: DateTime<Utc>) -> usize {
        let Some(set) = self.trackers.get(&bus_id) else {
            return 0;
        };

        let cutoff = self.cutoff(now);
        let before = set.len();
        set.retain(|_, last_seen| *last_seen >= cutoff);
        let removed = before.saturating_sub(set.len());

        if removed > 0 {
            debug!(bus = %bus_id, removed, remaining = set.len(), "Evicted idle trackers");
        }
        removed
    }

    /// Sweeps every bus; returns the total number of riders removed.
    pub fn sweep_all_inactive(&self, now: DateTime<Utc>) -> usize {
        let buses: Vec<BusId> = self.trackers.iter().map(|entry| *entry.key()).collect();
        buses.into_iter().map(|bus_id| self.sweep_inactive(bus_id, now)).sum()
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.inactivity_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Riders currently tracking the bus (without evicting).
    pub fn active_tracker_count(&self, bus_id: BusId) -> usize {
        self.trackers.get(&bus_id).map(|set| set.len()).unwrap_or(0)
    }
}
