//! Bus Tracking Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the tracking core run in
//! both **Production** (tokio, database-backed directory) and **Simulation**
//! (virtual clock, in-memory directory with injected faults).
//!
//! # Core Concept
//!
//! The core only ever touches the outside world through two handles:
//! - Time (`wall_clock()`, `sleep()`) via [`TrackingContext`]
//! - Bus/stop lookups via [`BusDirectory`]
//!
//! Swapping both makes every acceptance decision reproducible.
//!
//! # Example
//!
//! ```ignore
//! use bustrack_env::{BusDirectory, InMemoryDirectory, TokioContext};
//!
//! let ctx = TokioContext::shared();
//! let directory = InMemoryDirectory::shared();
//! directory.insert_route(bus, stops);
//! ```

mod context;
mod directory;
mod error;
mod memory;
mod tokio_impl;
mod types;

pub use context::TrackingContext;
pub use directory::BusDirectory;
pub use error::EnvError;
pub use memory::InMemoryDirectory;
pub use tokio_impl::TokioContext;
pub use types::{Bus, BusId, Coordinates, LocationId, LocationRef, Stop, StopId, UserId};
