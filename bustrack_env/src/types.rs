//! Common types shared between the directory seam and the tracking core.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a bus in the external directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BusId(pub i64);

impl std::fmt::Display for BusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a stop in the external directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StopId(pub i64);

impl std::fmt::Display for StopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a named place (route origin / destination).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId(pub i64);

/// Anonymous rider identifier.
///
/// Phones report under an opaque string id; nothing else about the
/// rider is known to the core.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Creates a user id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a deterministic anonymous id from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes).to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        let short = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "{}", short)
    }
}

/// WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A named place referenced by a route (origin or destination).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRef {
    pub id: LocationId,
    pub name: String,
}

impl LocationRef {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: LocationId(id),
            name: name.into(),
        }
    }
}

/// A bus as known to the external directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    pub number: String,
    pub from: LocationRef,
    pub to: LocationRef,
}

/// A stop on a bus's route.
///
/// `sequence` is the position within the route; directories are expected to
/// return stops ordered by it but consumers must not rely on that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: StopId,
    pub name: String,
    pub sequence: u32,

    /// Missing for stops that were entered without geocoding
    pub location: Option<Coordinates>,

    /// Timetabled arrival, used when no live estimate can be computed
    pub scheduled_arrival: Option<NaiveTime>,
}

impl Stop {
    /// Creates a geocoded stop without a timetable entry.
    pub fn new(id: i64, name: impl Into<String>, sequence: u32, latitude: f64, longitude: f64) -> Self {
        Self {
            id: StopId(id),
            name: name.into(),
            sequence,
            location: Some(Coordinates::new(latitude, longitude)),
            scheduled_arrival: None,
        }
    }

    /// Sets the timetabled arrival.
    pub fn with_scheduled_arrival(mut self, time: NaiveTime) -> Self {
        self.scheduled_arrival = Some(time);
        self
    }

    /// Drops the coordinates (stop known by name only).
    pub fn without_location(mut self) -> Self {
        self.location = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_from_seed_is_deterministic() {
        assert_eq!(UserId::from_seed(7), UserId::from_seed(7));
        assert_ne!(UserId::from_seed(7), UserId::from_seed(8));
    }

    #[test]
    fn test_user_id_display_is_short() {
        let id = UserId::new("0123456789abcdef");
        assert_eq!(id.to_string(), "01234567");

        let short = UserId::new("abc");
        assert_eq!(short.to_string(), "abc");
    }
}
