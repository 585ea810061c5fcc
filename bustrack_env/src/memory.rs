//! In-memory bus directory for tests and simulation.

use crate::directory::BusDirectory;
use crate::error::EnvError;
use crate::types::{Bus, BusId, LocationId, Stop};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Directory backed by plain hash maps.
///
/// Stops are stored per bus in insertion order; `find_stops_for_bus`
/// returns them sorted by sequence like a real repository would.
#[derive(Default)]
pub struct InMemoryDirectory {
    buses: RwLock<HashMap<BusId, Bus>>,
    stops: RwLock<HashMap<BusId, Vec<Stop>>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped directory for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Registers a bus together with its stops, replacing any previous entry.
    pub fn insert_route(&self, bus: Bus, stops: Vec<Stop>) {
        let id = bus.id;
        write_lock(&self.buses).insert(id, bus);
        write_lock(&self.stops).insert(id, stops);
    }

    /// Registers a bus with no known stops.
    pub fn insert_bus(&self, bus: Bus) {
        self.insert_route(bus, Vec::new());
    }

    /// Returns the number of registered buses.
    pub fn bus_count(&self) -> usize {
        read_lock(&self.buses).len()
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    // Map writes are single inserts; a poisoned guard still holds a consistent map
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl BusDirectory for InMemoryDirectory {
    async fn find_bus_by_id(&self, id: BusId) -> Result<Option<Bus>, EnvError> {
        Ok(read_lock(&self.buses).get(&id).cloned())
    }

    async fn find_stops_for_bus(&self, bus: &Bus) -> Result<Vec<Stop>, EnvError> {
        let mut stops = read_lock(&self.stops)
            .get(&bus.id)
            .cloned()
            .unwrap_or_default();
        stops.sort_by_key(|s| s.sequence);
        Ok(stops)
    }

    async fn find_buses_between(&self, from: LocationId, to: LocationId) -> Result<Vec<Bus>, EnvError> {
        let mut buses: Vec<Bus> = read_lock(&self.buses)
            .values()
            .filter(|b| b.from.id == from && b.to.id == to)
            .cloned()
            .collect();
        buses.sort_by_key(|b| b.id);
        Ok(buses)
    }
}
