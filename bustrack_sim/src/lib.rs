//! BusTrack Deterministic Simulation Harness
//!
//! Runs the tracking service against simulated buses and riders whose
//! ground truth is known, so fused positions, rejections and rewards can
//! be checked exactly.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances only when the harness ticks
//! - **Directory**: In-memory routes with injectable outages and latency
//! - **Randomness**: All entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────┐   reports   ┌──────────────────────────┐  │
//! │  │    Oracle    │────────────►│     TrackingService      │  │
//! │  │ buses+riders │             │ (SimContext, SimDirectory)│  │
//! │  └──────────────┘             └──────────────────────────┘  │
//! │         ▲ truth                          │ fused            │
//! │         └──────────── compare ◄──────────┘                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bustrack_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::SpeedSpoofers).await;
//! assert!(result.passed);
//! ```

mod context;
mod directory;
mod exporter;
mod oracle;
mod runner;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use directory::{SimDirectory, SimDirectoryController};
pub use exporter::{BusFrame, SimEvent, SimExport, SimFrame};
pub use oracle::{Oracle, SimBus, SimRider, SpoofKind};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use world::{SimConfig, SimService, SimWorld, Submission};
