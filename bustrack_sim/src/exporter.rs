//! JSON exporter for offline plotting.
//!
//! Exports simulation frames (true vs fused bus positions) as JSON.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Per-bus truth and fused state
    pub buses: Vec<BusFrame>,

    /// Events (outages, spoofers rejected, etc.)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SimEvent>,
}

/// One bus in a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusFrame {
    pub bus_id: i64,
    pub truth_lat: f64,
    pub truth_lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fused_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fused_lng: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_m: Option<f64>,
    pub confidence: u8,
    pub reporter_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_stop: Option<String>,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    /// Worst fused-position error at the end, if any bus was tracked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_max_error_m: Option<f64>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            final_max_error_m: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, max_error_m: Option<f64>) {
        self.passed = passed;
        self.final_max_error_m = max_error_m;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
