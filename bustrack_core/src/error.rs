//! Error types for report ingestion and queries.

use bustrack_env::{BusId, EnvError, StopId};
use thiserror::Error;

/// Why a location report was not accepted.
///
/// Every variant except [`RejectionReason::RepositoryUnavailable`] is a
/// terminal verdict on the report itself; resubmitting it unchanged will be
/// rejected again.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectionReason {
    #[error("Unknown bus: {0}")]
    UnknownBus(BusId),

    /// Report is not within reach of any stop on the bus's route
    #[error("Report is not near the bus route")]
    OffRoute,

    /// Report is outside the stop-to-stop corridor
    #[error("Report is outside the route corridor")]
    OutsideCorridor,

    #[error("Reported speed {speed_kmh:.1} km/h is too fast for a bus")]
    TooFast { speed_kmh: f64 },

    #[error("Report timestamp is {skew_minutes} minutes away from now")]
    Stale { skew_minutes: i64 },

    /// Movement pattern rejected
    #[error("Movement pattern is not plausible")]
    Unsafe,

    #[error("Bus directory unavailable: {0}")]
    RepositoryUnavailable(String),
}

impl RejectionReason {
    /// Returns true if the same report may be accepted on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RepositoryUnavailable(_))
    }

    /// Stable machine-readable code for the rejection.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownBus(_) => "UNKNOWN_BUS",
            Self::OffRoute => "OFF_ROUTE",
            Self::OutsideCorridor => "OUTSIDE_CORRIDOR",
            Self::TooFast { .. } => "TOO_FAST",
            Self::Stale { .. } => "STALE",
            Self::Unsafe => "UNSAFE",
            Self::RepositoryUnavailable(_) => "REPOSITORY_UNAVAILABLE",
        }
    }

    /// Text safe to show to the rider who submitted the report.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UnknownBus(_) => "This bus is not in our records.",
            Self::OffRoute | Self::OutsideCorridor => {
                "Your location does not appear to be on this bus's route."
            }
            Self::TooFast { .. } => "You seem to be moving too fast to be on a bus.",
            Self::Stale { .. } => "Your device clock or location fix is out of date.",
            Self::Unsafe => "Your movement does not look like bus travel.",
            Self::RepositoryUnavailable(_) => "Tracking is temporarily unavailable. Please try again.",
        }
    }
}

impl From<EnvError> for RejectionReason {
    fn from(err: EnvError) -> Self {
        Self::RepositoryUnavailable(err.to_string())
    }
}

/// Errors returned by read-side queries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("Bus {0} has no tracked position")]
    BusNotTracked(BusId),

    #[error("Stop {stop} is not on the route of bus {bus}")]
    StopNotOnRoute { bus: BusId, stop: StopId },

    /// Neither coordinates nor a timetable entry to project from
    #[error("No arrival estimate available for stop {0}")]
    NoEstimate(StopId),

    #[error("Bus directory unavailable: {0}")]
    RepositoryUnavailable(String),
}

impl From<EnvError> for QueryError {
    fn from(err: EnvError) -> Self {
        Self::RepositoryUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_repository_failures_are_retryable() {
        assert!(RejectionReason::RepositoryUnavailable("down".into()).is_retryable());
        assert!(!RejectionReason::OffRoute.is_retryable());
        assert!(!RejectionReason::TooFast { speed_kmh: 150.0 }.is_retryable());
        assert!(!RejectionReason::UnknownBus(BusId(1)).is_retryable());
    }

    #[test]
    fn test_env_error_maps_to_repository_unavailable() {
        let reason: RejectionReason = EnvError::Timeout(2000).into();
        assert_eq!(reason.code(), "REPOSITORY_UNAVAILABLE");

        let query: QueryError = EnvError::unavailable("pool exhausted").into();
        assert!(matches!(query, QueryError::RepositoryUnavailable(msg) if msg.contains("pool exhausted")));
    }

    #[test]
    fn test_display_includes_details() {
        let reason = RejectionReason::TooFast { speed_kmh: 144.04 };
        assert_eq!(reason.to_string(), "Reported speed 144.0 km/h is too fast for a bus");

        let err = QueryError::StopNotOnRoute { bus: BusId(3), stop: StopId(9) };
        assert_eq!(err.to_string(), "Stop 9 is not on the route of bus 3");
    }
}
