//! Runtime configuration for the tracking service.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// TRACKING CONFIG
// ============================================================================

/// Thresholds used by the gates, scorers and stores.
///
/// All fields have defaults; a JSON file only needs to name the ones it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Reports faster than this are treated as car/train travel (default: 120 km/h)
    pub max_speed_kmh: f64,

    /// Half-width of the stop-to-stop corridor (default: 3 km)
    pub corridor_buffer_km: f64,

    /// Radius around any single stop that always counts as on-corridor,
    /// covering depots and bus stations (default: 2 km)
    pub stop_radius_km: f64,

    /// Route-membership pre-check radius around stops (default: 0.5 km)
    pub route_membership_radius_km: f64,

    /// Maximum |report time - now| (default: 30 min)
    pub freshness_window_secs: u64,

    /// Trackers idle longer than this are evicted (default: 5 min)
    pub tracker_inactivity_secs: u64,

    /// Below this a reported speed is treated as transient (default: 5 km/h)
    pub min_moving_speed_kmh: f64,

    /// Speed assumed for ETAs when the bus looks stopped (default: 25 km/h)
    pub default_cruising_speed_kmh: f64,

    /// Upper bound on any single directory lookup (default: 2000 ms)
    pub repository_timeout_ms: u64,

    /// Points awarded per accepted report
    pub rewards: RewardPolicy,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_speed_kmh: 120.0,
            corridor_buffer_km: 3.0,
            stop_radius_km: 2.0,
            route_membership_radius_km: 0.5,
            freshness_window_secs: 30 * 60,
            tracker_inactivity_secs: 5 * 60,
            min_moving_speed_kmh: 5.0,
            default_cruising_speed_kmh: 25.0,
            repository_timeout_ms: 2000,
            rewards: RewardPolicy::default(),
        }
    }
}

impl TrackingConfig {
    /// Parses a (possibly partial) JSON configuration.
    ///
    /// Windows too long to express as a [`TimeDelta`] are rejected.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(json)?;
        for (field, secs) in [
            ("freshness_window_secs", config.freshness_window_secs),
            ("tracker_inactivity_secs", config.tracker_inactivity_secs),
        ] {
            if window(secs).is_none() {
                return Err(serde::de::Error::custom(format!("{field} out of range: {secs}")));
            }
        }
        Ok(config)
    }

    /// Saturates at [`TimeDelta::MAX`] for configs built without `from_json`.
    #[inline]
    pub fn freshness_window(&self) -> TimeDelta {
        window(self.freshness_window_secs).unwrap_or(TimeDelta::MAX)
    }

    #[inline]
    pub fn tracker_inactivity(&self) -> TimeDelta {
        window(self.tracker_inactivity_secs).unwrap_or(TimeDelta::MAX)
    }

    #[inline]
    pub fn repository_timeout(&self) -> Duration {
        Duration::from_millis(self.repository_timeout_ms)
    }
}

fn window(secs: u64) -> Option<TimeDelta> {
    i64::try_from(secs).ok().and_then(TimeDelta::try_seconds)
}

// ============================================================================
// REWARD POLICY
// ============================================================================

/// How many points an accepted report earns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardPolicy {
    /// Points for any accepted report (default: 5)
    pub base_points: u32,

    /// Extra points for a tight GPS fix (default: 2)
    pub accuracy_bonus_points: u32,

    /// Fixes strictly below this accuracy earn the bonus (default: 10 m)
    pub accuracy_bonus_threshold_m: f64,

    /// Activity entries kept per rider, oldest dropped first (default: 20)
    pub activity_log_capacity: usize,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            base_points: 5,
            accuracy_bonus_points: 2,
            accuracy_bonus_threshold_m: 10.0,
            activity_log_capacity: 20,
        }
    }
}

impl RewardPolicy {
    /// Points earned by a report with the given GPS accuracy.
    pub fn points_for(&self, accuracy_m: f64) -> u32 {
        if accuracy_m < self.accuracy_bonus_threshold_m {
            self.base_points + self.accuracy_bonus_points
        } else {
            self.base_points
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackingConfig::default();
        assert_eq!(config.max_speed_kmh, 120.0);
        assert_eq!(config.freshness_window(), TimeDelta::minutes(30));
        assert_eq!(config.tracker_inactivity(), TimeDelta::minutes(5));
        assert_eq!(config.repository_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = TrackingConfig::from_json(r#"{ "max_speed_kmh": 90.0, "rewards": { "base_points": 3 } }"#)
            .unwrap();
        assert_eq!(config.max_speed_kmh, 90.0);
        assert_eq!(config.corridor_buffer_km, 3.0);
        assert_eq!(config.rewards.base_points, 3);
        assert_eq!(config.rewards.accuracy_bonus_points, 2);
    }

    #[test]
    fn test_points_for_accuracy() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.points_for(5.0), 7);
        assert_eq!(policy.points_for(9.99), 7);
        assert_eq!(policy.points_for(10.0), 5);
        assert_eq!(policy.points_for(50.0), 5);
    }

    #[test]
    fn test_out_of_range_windows_rejected() {
        let huge = format!(r#"{{ "freshness_window_secs": {} }}"#, u64::MAX);
        assert!(TrackingConfig::from_json(&huge).is_err());

        let overflow_millis = format!(r#"{{ "tracker_inactivity_secs": {} }}"#, i64::MAX / 1000 + 1);
        let err = TrackingConfig::from_json(&overflow_millis).unwrap_err();
        assert!(err.to_string().contains("tracker_inactivity_secs"));

        // Built directly, the helpers saturate instead of wrapping negative
        let config = TrackingConfig {
            freshness_window_secs: u64::MAX,
            ..TrackingConfig::default()
        };
        assert_eq!(config.freshness_window(), TimeDelta::MAX);
    }
}
