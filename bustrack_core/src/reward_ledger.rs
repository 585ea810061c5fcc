//! Rider reward balances.

use bustrack_env::{BusId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::RewardPolicy;
use crate::model::{RewardActivity, RewardLedgerEntry};

/// Owner of every [`RewardLedgerEntry`].
///
/// Awards are read-modify-write under the rider's entry guard, so two
/// concurrent awards for the same rider both land.
#[derive(Debug)]
pub struct RewardLedger {
    entries: DashMap<UserId, RewardLedgerEntry>,
    policy: RewardPolicy,
}

impl RewardLedger {
    pub fn new(policy: RewardPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
        }
    }

    /// Credits one accepted report and returns the rider's updated entry.
    pub fn award_report(
        &self,
        user: &UserId,
        bus_id: BusId,
        accuracy_m: f64,
        timestamp: DateTime<Utc>,
    ) -> RewardLedgerEntry {
        let points = self.policy.points_for(accuracy_m);
        let activity = RewardActivity::bus_report(points, bus_id, timestamp);

        let mut entry = self
            .entries
            .entry(user.clone())
            .or_insert_with(|| RewardLedgerEntry::empty(user.clone()));

        let updated = entry.credited(activity, self.policy.activity_log_capacity);
        *entry = updated.clone();
        updated
    }

    /// The rider's balance, or the zero-state if they never earned points.
    pub fn balance(&self, user: &UserId) -> RewardLedgerEntry {
        self.entries
            .get(user)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| RewardLedgerEntry::empty(user.clone()))
    }

    pub fn rider_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for RewardLedger {
    fn default() -> Self {
        Self::new(RewardPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_unseen_rider_has_zero_balance() {
        let ledger = RewardLedger::default();
        let entry = ledger.balance(&UserId::new("nobody"));

        assert_eq!(entry.total_points, 0);
        assert_eq!(entry.user_rank, "BEGINNER");
        assert_eq!(entry.leaderboard_position, 0);
        assert!(entry.recent_activities.is_empty());
        assert_eq!(ledger.rider_count(), 0);
    }

    #[test]
    fn test_accuracy_bonus() {
        let ledger = RewardLedger::default();
        let user = UserId::new("rider");

        let entry = ledger.award_report(&user, BusId(1), 5.0, Utc::now());
        assert_eq!(entry.points_from_last_activity, 7);

        let entry = ledger.award_report(&user, BusId(1), 25.0, Utc::now());
        assert_eq!(entry.points_from_last_activity, 5);
        assert_eq!(entry.total_points, 12);
        assert_eq!(entry.recent_activities[0].activity_type, "BUS_REPORT");
        assert_eq!(ledger.balance(&user), entry);
    }

    #[test]
    fn test_activity_log_is_bounded() {
        let ledger = RewardLedger::default();
        let user = UserId::new("rider");
        for _ in 0..25 {
            ledger.award_report(&user, BusId(1), 50.0, Utc::now());
        }

        let entry = ledger.balance(&user);
        assert_eq!(entry.recent_activities.len(), 20);
        assert_eq!(entry.total_points, 125);
        assert_eq!(entry.lifetime_points, 125);
    }

    #[test]
    fn test_concurrent_awards_all_count() {
        let ledger = Arc::new(RewardLedger::default());
        let user = UserId::new("busy");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let user = user.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        ledger.award_report(&user, BusId(1), 50.0, Utc::now());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.balance(&user).total_points, 8 * 50 * 5);
    }
}
