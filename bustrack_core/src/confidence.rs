//! Advisory confidence score for fused positions.
//!
//! ```text
//! score = min(100, crowd + accuracy + speed_band)
//!
//! crowd      = min(reporters * 20, 60)
//! accuracy   = trunc(max(0, 30 - accuracy_m / 10))
//! speed_band = 10 if 5 < km/h < 80
//!               0 if km/h >= 80
//!               5 if km/h <= 5
//! ```
//!
//! The score never gates acceptance; it is shown to riders next to the
//! position.

use crate::geo_math::mps_to_kmh;
use crate::model::LocationReport;

const POINTS_PER_REPORTER: u32 = 20;
const MAX_CROWD_POINTS: u32 = 60;
const MAX_ACCURACY_POINTS: f64 = 30.0;
const MAX_SCORE: u32 = 100;

/// Scores reports by crowd size, GPS accuracy and speed plausibility.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Scores `report` given the number of riders currently tracking its bus.
    pub fn score(&self, report: &LocationReport, reporter_count: usize) -> u8 {
        score_components(reporter_count, report.accuracy_meters, mps_to_kmh(report.speed_mps))
    }
}

fn score_components(reporter_count: usize, accuracy_m: f64, speed_kmh: f64) -> u8 {
    let crowd = (reporter_count.min(u32::MAX as usize) as u32)
        .saturating_mul(POINTS_PER_REPORTER)
        .min(MAX_CROWD_POINTS);

    // Truncation toward zero; NaN accuracy earns nothing
    let accuracy = (MAX_ACCURACY_POINTS - accuracy_m / 10.0).max(0.0) as u32;

    let speed_band = if speed_kmh > 5.0 && speed_kmh < 80.0 {
        10
    } else if speed_kmh >= 80.0 {
        0
    } else {
        5
    };

    (crowd + accuracy + speed_band).min(MAX_SCORE) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use bustrack_env::{BusId, UserId};
    use chrono::Utc;
    use proptest::prelude::*;

    fn report(accuracy_meters: f64, speed_kmh: f64) -> LocationReport {
        LocationReport {
            bus_id: BusId(1),
            stop_id: None,
            user_id: UserId::new("rider"),
            timestamp: Utc::now(),
            latitude: 13.0,
            longitude: 80.0,
            accuracy_meters,
            speed_mps: speed_kmh / 3.6,
            heading_degrees: 0.0,
            device_info: None,
        }
    }

    #[test]
    fn test_three_riders_tight_fix() {
        // 60 + trunc(30 - 0.5) + 10
        let scorer = ConfidenceScorer::new();
        assert_eq!(scorer.score(&report(5.0, 40.0), 3), 99);
    }

    #[test]
    fn test_lone_stationary_rider() {
        // 20 + 29 + 5
        let scorer = ConfidenceScorer::new();
        assert_eq!(scorer.score(&report(10.0, 0.0), 1), 54);
    }

    #[test]
    fn test_speed_bands() {
        assert_eq!(score_components(0, 300.0, 5.0), 5);
        assert_eq!(score_components(0, 300.0, 5.1), 10);
        assert_eq!(score_components(0, 300.0, 79.9), 10);
        assert_eq!(score_components(0, 300.0, 80.0), 0);
        assert_eq!(score_components(0, 300.0, 110.0), 0);
    }

    #[test]
    fn test_poor_accuracy_earns_nothing() {
        assert_eq!(score_components(1, 500.0, 40.0), 30);
        assert_eq!(score_components(1, f64::NAN, 40.0), 30);
    }

    #[test]
    fn test_capped_at_100() {
        assert_eq!(score_components(10, 0.0, 40.0), 100);
    }

    proptest! {
        #[test]
        fn prop_non_decreasing_in_reporters(
            count in 0usize..50,
            accuracy in 0.0f64..500.0,
            speed in 0.0f64..150.0,
        ) {
            let a = score_components(count, accuracy, speed);
            let b = score_components(count + 1, accuracy, speed);
            prop_assert!(b >= a);
        }

        #[test]
        fn prop_bounded(
            count in 0usize..1000,
            accuracy in -100.0f64..1000.0,
            speed in -10.0f64..500.0,
        ) {
            prop_assert!(score_components(count, accuracy, speed) <= 100);
        }
    }
}
