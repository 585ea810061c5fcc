//! Bus directory abstraction - the only I/O the tracking core performs.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{Bus, BusId, LocationId, Stop};

/// Read-only lookup interface over the relational bus/stop repository.
///
/// # Implementations
///
/// - **Production**: a database-backed adapter owned by the web layer
/// - **Tests / Simulation**: `InMemoryDirectory`, optionally wrapped with
///   fault injection
///
/// # Call Flow
///
/// ```text
/// TrackingService              Directory
///   |                              |
///   |-- find_bus_by_id(id) ------->|
///   |<---------- Some(bus) --------|
///   |-- find_stops_for_bus(bus) -->|
///   |<---------- [A, B, C] --------|
/// ```
///
/// Callers wrap every call in a timeout; implementations need not enforce one.
#[async_trait]
pub trait BusDirectory: Send + Sync + 'static {
    /// Looks up a bus by id.
    ///
    /// # Returns
    /// * `Ok(Some(bus))` - The bus exists
    /// * `Ok(None)` - No such bus
    /// * `Err(EnvError)` - The directory could not answer
    async fn find_bus_by_id(&self, id: BusId) -> Result<Option<Bus>, EnvError>;

    /// Returns the stops served by a bus, ordered by sequence.
    ///
    /// An empty list means the route is not known, not that the bus has
    /// no stops.
    async fn find_stops_for_bus(&self, bus: &Bus) -> Result<Vec<Stop>, EnvError>;

    /// Returns all buses running from `from` to `to`.
    async fn find_buses_between(&self, from: LocationId, to: LocationId) -> Result<Vec<Bus>, EnvError>;
}
