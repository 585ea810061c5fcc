//! Simulated bus directory with fault injection.

use async_trait::async_trait;
use bustrack_env::{Bus, BusDirectory, BusId, EnvError, InMemoryDirectory, LocationId, Stop};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Directory backed by an in-memory route table, with outages and latency
/// controlled through a [`SimDirectoryController`].
pub struct SimDirectory {
    routes: InMemoryDirectory,
    controller: Arc<SimDirectoryController>,
}

impl SimDirectory {
    /// Creates a directory sharing the given controller.
    pub fn new(controller: Arc<SimDirectoryController>) -> Self {
        Self {
            routes: InMemoryDirectory::new(),
            controller,
        }
    }

    /// Registers a route.
    pub fn insert_route(&self, bus: Bus, stops: Vec<Stop>) {
        self.routes.insert_route(bus, stops);
    }

    pub fn controller(&self) -> &Arc<SimDirectoryController> {
        &self.controller
    }

    /// Applies the injected faults before a lookup.
    async fn before_call(&self) -> Result<(), EnvError> {
        self.controller.calls.fetch_add(1, Ordering::Relaxed);

        let latency_ms = self.controller.latency_ms();
        if latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        }

        if self.controller.is_down() {
            self.controller.failed_calls.fetch_add(1, Ordering::Relaxed);
            return Err(EnvError::unavailable("simulated outage"));
        }
        Ok(())
    }
}

#[async_trait]
impl BusDirectory for SimDirectory {
    async fn find_bus_by_id(&self, id: BusId) -> Result<Option<Bus>, EnvError> {
        self.before_call().await?;
        self.routes.find_bus_by_id(id).await
    }

    async fn find_stops_for_bus(&self, bus: &Bus) -> Result<Vec<Stop>, EnvError> {
        self.before_call().await?;
        self.routes.find_stops_for_bus(bus).await
    }

    async fn find_buses_between(&self, from: LocationId, to: LocationId) -> Result<Vec<Bus>, EnvError> {
        self.before_call().await?;
        self.routes.find_buses_between(from, to).await
    }
}

/// Fault injection switches for a [`SimDirectory`].
#[derive(Default)]
pub struct SimDirectoryController {
    /// Every call fails while set
    outage: Mutex<bool>,

    /// Added to every call, in milliseconds
    latency_ms: Mutex<u64>,

    calls: AtomicU64,
    failed_calls: AtomicU64,
}

fn guard<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimDirectoryController {
    /// Creates a controller with no faults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Starts a hard outage: every call fails immediately.
    pub fn take_down(&self) {
        *guard(&self.outage) = true;
    }

    /// Ends the outage.
    pub fn restore(&self) {
        *guard(&self.outage) = false;
    }

    pub fn is_down(&self) -> bool {
        *guard(&self.outage)
    }

    /// Sets the latency added to every call.
    pub fn set_latency(&self, latency_ms: u64) {
        *guard(&self.latency_ms) = latency_ms;
    }

    pub fn latency_ms(&self) -> u64 {
        *guard(&self.latency_ms)
    }

    /// Calls attempted so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Calls failed by the injected outage.
    pub fn failed_calls(&self) -> u64 {
        self.failed_calls.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bustrack_env::LocationRef;

    fn bus() -> Bus {
        Bus {
            id: BusId(1),
            name: "Sim".to_string(),
            number: "SIM-1".to_string(),
            from: LocationRef::new(1, "Depot"),
            to: LocationRef::new(2, "Terminus"),
        }
    }

    #[tokio::test]
    async fn test_outage_and_restore() {
        let controller = SimDirectoryController::shared();
        let dir = SimDirectory::new(Arc::clone(&controller));
        dir.insert_route(bus(), vec![Stop::new(1, "A", 1, 13.0, 80.0)]);

        assert!(dir.find_bus_by_id(BusId(1)).await.unwrap().is_some());

        controller.take_down();
        let err = dir.find_bus_by_id(BusId(1)).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(controller.failed_calls(), 1);

        controller.restore();
        assert_eq!(dir.find_stops_for_bus(&bus()).await.unwrap().len(), 1);
        assert_eq!(controller.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_calls() {
        let controller = SimDirectoryController::shared();
        let dir = SimDirectory::new(Arc::clone(&controller));
        dir.insert_route(bus(), Vec::new());
        controller.set_latency(250);

        let start = tokio::time::Instant::now();
        dir.find_bus_by_id(BusId(1)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
