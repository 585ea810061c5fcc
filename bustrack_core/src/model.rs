//! Value types flowing through the tracking pipeline.
//!
//! Everything here is an immutable snapshot: stores replace values
//! wholesale and hand out clones, never references into shared state.

use bustrack_env::{Bus, BusId, Coordinates, StopId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo_math::mps_to_kmh;

// ============================================================================
// LOCATION REPORT (Input)
// ============================================================================

/// A single GPS fix submitted by a rider's phone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    pub bus_id: BusId,

    /// Stop the rider claims to be at, if they picked one
    pub stop_id: Option<StopId>,

    pub user_id: UserId,

    /// Device timestamp of the fix
    pub timestamp: DateTime<Utc>,

    pub latitude: f64,
    pub longitude: f64,

    /// Horizontal accuracy radius reported by the device (metres)
    pub accuracy_meters: f64,

    pub speed_mps: f64,

    /// Direction of travel, degrees clockwise from north
    pub heading_degrees: f64,

    /// Free-form device description, logged only
    pub device_info: Option<String>,
}

impl LocationReport {
    #[inline]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    #[inline]
    pub fn speed_kmh(&self) -> f64 {
        mps_to_kmh(self.speed_mps)
    }
}

// ============================================================================
// FUSED POSITION (Per-bus state)
// ============================================================================

/// The trusted current location of one bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedPosition {
    pub bus_id: BusId,
    pub bus_name: String,
    pub bus_number: String,
    pub from_location_name: String,
    pub to_location_name: String,

    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,

    /// Metres per second, as reported
    pub speed: f64,
    pub heading: f64,

    /// Timestamp of the report this position was fused from
    pub timestamp: DateTime<Utc>,

    pub last_reported_stop_name: Option<String>,
    pub next_stop_name: Option<String>,
    pub estimated_arrival_time: Option<DateTime<Utc>>,

    /// Active trackers for the bus when this position was published
    pub reporter_count: u32,

    /// Advisory trust indicator in [0, 100]
    pub confidence_score: u8,

    /// Rider whose report produced this position (`None` for the default)
    pub reported_by: Option<UserId>,
}

/// Stop context attached to a fused position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopContext {
    pub last_reported_stop_name: Option<String>,
    pub next_stop_name: Option<String>,
    pub estimated_arrival_time: Option<DateTime<Utc>>,
}

impl FusedPosition {
    /// Name shown for buses no accepted report has mentioned yet.
    pub const UNKNOWN_BUS_NAME: &'static str = "Unknown Bus";

    /// Confidence shown for buses nobody has reported yet.
    pub const UNKNOWN_CONFIDENCE: u8 = 50;

    /// The documented placeholder returned for untracked buses.
    pub fn unknown(bus_id: BusId, now: DateTime<Utc>) -> Self {
        Self {
            bus_id,
            bus_name: Self::UNKNOWN_BUS_NAME.to_string(),
            bus_number: "N/A".to_string(),
            from_location_name: "Unknown".to_string(),
            to_location_name: "Unknown".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            accuracy: 0.0,
            speed: 0.0,
            heading: 0.0,
            timestamp: now,
            last_reported_stop_name: None,
            next_stop_name: None,
            estimated_arrival_time: None,
            reporter_count: 0,
            confidence_score: Self::UNKNOWN_CONFIDENCE,
            reported_by: None,
        }
    }

    /// Builds the position published for an accepted report.
    pub fn from_report(
        report: &LocationReport,
        bus: &Bus,
        stops: StopContext,
        reporter_count: u32,
        confidence_score: u8,
    ) -> Self {
        Self {
            bus_id: bus.id,
            bus_name: bus.name.clone(),
            bus_number: bus.number.clone(),
            from_location_name: bus.from.name.clone(),
            to_location_name: bus.to.name.clone(),
            latitude: report.latitude,
            longitude: report.longitude,
            accuracy: report.accuracy_meters,
            speed: report.speed_mps,
            heading: report.heading_degrees,
            timestamp: report.timestamp,
            last_reported_stop_name: stops.last_reported_stop_name,
            next_stop_name: stops.next_stop_name,
            estimated_arrival_time: stops.estimated_arrival_time,
            reporter_count,
            confidence_score,
            reported_by: Some(report.user_id.clone()),
        }
    }

    #[inline]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// True for the placeholder handed out for untracked buses.
    pub fn is_unknown(&self) -> bool {
        self.reported_by.is_none()
    }
}

// ============================================================================
// REWARDS
// ============================================================================

/// One line of a rider's activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardActivity {
    pub activity_type: String,
    pub points_earned: u32,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl RewardActivity {
    pub const BUS_REPORT: &'static str = "BUS_REPORT";

    pub fn bus_report(points: u32, bus_id: BusId, timestamp: DateTime<Utc>) -> Self {
        Self {
            activity_type: Self::BUS_REPORT.to_string(),
            points_earned: points,
            timestamp,
            description: format!("Bus location report submitted for bus {}", bus_id),
        }
    }
}

/// A rider's reward balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardLedgerEntry {
    pub user_id: UserId,
    pub total_points: u64,
    pub points_from_last_activity: u32,
    pub lifetime_points: u64,

    /// Rank label, maintained outside this core
    pub user_rank: String,

    /// Leaderboard slot, maintained outside this core
    pub leaderboard_position: u32,

    /// Most recent activity last
    pub recent_activities: Vec<RewardActivity>,
}

impl RewardLedgerEntry {
    pub const DEFAULT_RANK: &'static str = "BEGINNER";

    /// The zero-state returned for riders who never had a report accepted.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            total_points: 0,
            points_from_last_activity: 0,
            lifetime_points: 0,
            user_rank: Self::DEFAULT_RANK.to_string(),
            leaderboard_position: 0,
            recent_activities: Vec::new(),
        }
    }

    /// Returns a new entry with `activity` credited, keeping at most
    /// `capacity` activities.
    pub fn credited(&self, activity: RewardActivity, capacity: usize) -> Self {
        let points = activity.points_earned;

        let mut recent_activities = self.recent_activities.clone();
        recent_activities.push(activity);
        if recent_activities.len() > capacity {
            let excess = recent_activities.len() - capacity;
            recent_activities.drain(..excess);
        }

        Self {
            user_id: self.user_id.clone(),
            total_points: self.total_points + points as u64,
            points_from_last_activity: points,
            lifetime_points: self.lifetime_points + points as u64,
            user_rank: self.user_rank.clone(),
            leaderboard_position: self.leaderboard_position,
            recent_activities,
        }
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// What an accepted report produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportReceipt {
    pub position: FusedPosition,
    pub rewards: RewardLedgerEntry,
}

/// Projected arrival of a bus at a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalEstimate {
    pub bus_id: BusId,
    pub stop_id: StopId,
    pub stop_name: String,
    pub estimated_arrival: DateTime<Utc>,

    /// Confidence of the fused position the estimate was projected from
    pub confidence: u8,
}
