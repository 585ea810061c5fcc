//! Position history persistence.
//!
//! Every accepted position can be appended to a [`PositionHistorySink`].
//! Writes are best-effort: the tracking service logs sink failures and
//! carries on, so history may have gaps but live tracking never stalls on it.

use std::path::Path;

use bustrack_env::BusId;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::FusedPosition;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Append-only store of published positions.
pub trait PositionHistorySink: Send + Sync {
    /// Appends a published position.
    fn record(&self, position: &FusedPosition) -> Result<(), HistoryError>;

    /// Positions of `bus_id` with `timestamp >= since`, oldest first.
    fn since(&self, bus_id: BusId, since: DateTime<Utc>) -> Result<Vec<FusedPosition>, HistoryError>;
}

/// Sled-backed history sink
///
/// Keys are `bus id ++ timestamp millis`, both big-endian with the sign bit
/// flipped, so one bus's positions are contiguous and sorted by time.
/// Values are JSON.
pub struct SledHistorySink {
    db: sled::Db,
}

impl SledHistorySink {
    /// Open a persistent sink at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HistoryError> {
        let db = sled::open(path)
            .map_err(|e| HistoryError::Storage(format!("Failed to open sled DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Create a sink that is deleted when dropped
    pub fn open_temp() -> Result<Self, HistoryError> {
        let config = sled::Config::new().temporary(true);
        let db = config
            .open()
            .map_err(|e| HistoryError::Storage(format!("Failed to open temp DB: {}", e)))?;
        Ok(Self { db })
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

fn ordered_bytes(value: i64) -> [u8; 8] {
    ((value as u64) ^ (1 << 63)).to_be_bytes()
}

fn key(bus_id: BusId, timestamp_millis: i64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&ordered_bytes(bus_id.0));
    key[8..].copy_from_slice(&ordered_bytes(timestamp_millis));
    key
}

impl PositionHistorySink for SledHistorySink {
    fn record(&self, position: &FusedPosition) -> Result<(), HistoryError> {
        let value = serde_json::to_vec(position)?;
        self.db
            .insert(key(position.bus_id, position.timestamp.timestamp_millis()), value)
            .map_err(|e| HistoryError::Storage(format!("Insert failed: {}", e)))?;
        Ok(())
    }

    fn since(&self, bus_id: BusId, since: DateTime<Utc>) -> Result<Vec<FusedPosition>, HistoryError> {
        let start = key(bus_id, since.timestamp_millis());
        let end = key(bus_id, i64::MAX);

        let mut positions = Vec::new();
        for result in self.db.range(start..=end) {
            let (_, value) = result
                .map_err(|e| HistoryError::Storage(format!("Iteration failed: {}", e)))?;
            positions.push(serde_json::from_slice(&value)?);
        }
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn position(bus: i64, secs: i64, lat: f64) -> FusedPosition {
        let mut p = FusedPosition::unknown(BusId(bus), at(secs));
        p.latitude = lat;
        p
    }

    #[test]
    fn test_since_filters_by_bus_and_time() {
        let sink = SledHistorySink::open_temp().unwrap();
        sink.record(&position(1, 0, 13.00)).unwrap();
        sink.record(&position(1, 60, 13.01)).unwrap();
        sink.record(&position(1, 120, 13.02)).unwrap();
        sink.record(&position(2, 90, 12.00)).unwrap();

        let history = sink.since(BusId(1), at(60)).unwrap();
        let lats: Vec<f64> = history.iter().map(|p| p.latitude).collect();
        assert_eq!(lats, vec![13.01, 13.02]);

        assert_eq!(sink.since(BusId(2), at(0)).unwrap().len(), 1);
        assert!(sink.since(BusId(3), at(0)).unwrap().is_empty());
        assert_eq!(sink.len(), 4);
    }

    #[test]
    fn test_keys_sort_across_sign() {
        assert!(key(BusId(-1), 0) < key(BusId(0), 0));
        assert!(key(BusId(1), -5) < key(BusId(1), 5));
    }

    #[test]
    fn test_positions_roundtrip_intact() {
        let sink = SledHistorySink::open_temp().unwrap();
        let original = position(7, 30, 13.5);
        sink.record(&original).unwrap();

        assert_eq!(sink.since(BusId(7), at(0)).unwrap(), vec![original]);
    }
}
