//! BusTrack Core - Crowd-Sourced Bus Position Fusion
//!
//! Riders' phones report where their bus is; this library decides which
//! reports to trust and turns them into one live position per bus:
//! 1. **Authenticity**: route membership plus speed, movement, geofence and freshness gates
//! 2. **Fusion**: last accepted report wins, annotated with stop context and ETA
//! 3. **Confidence**: advisory score from crowd size, GPS accuracy and speed
//! 4. **Rewards**: points credited to riders for every accepted report

pub mod authenticity;
pub mod confidence;
pub mod config;
pub mod error;
pub mod eta;
pub mod geo_math;
pub mod history;
pub mod metrics;
pub mod model;
pub mod position_store;
pub mod reward_ledger;
pub mod stop_topology;
pub mod tracking_service;

// Re-export key types for convenience
pub use authenticity::AuthenticityScorer;
pub use confidence::ConfidenceScorer;
pub use config::{RewardPolicy, TrackingConfig};
pub use error::{QueryError, RejectionReason};
pub use eta::EtaEstimator;
pub use geo_math::calculate_distance_km;
pub use history::{HistoryError, PositionHistorySink, SledHistorySink};
pub use metrics::{MetricsSnapshot, ServiceMetrics};
pub use model::{ArrivalEstimate, FusedPosition, LocationReport, ReportReceipt, RewardActivity, RewardLedgerEntry};
pub use tracking_service::TrackingService;
