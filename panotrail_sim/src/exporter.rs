//! JSON exporter for session traces.
//!
//! Exports one frame per dispatched event: the event, the resulting
//! navigation state and every display command it caused.

use crate::displays::DisplayCommand;
use panotrail_core::{NavEvent, NavigationState};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Virtual time in milliseconds
    pub time_ms: u64,

    /// What was dispatched; `None` for load completions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<NavEvent>,

    /// State after the event
    pub state: NavigationState,

    /// Load generation after the event
    pub generation: u64,

    /// Display commands emitted while handling the event
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<DisplayCommand>,

    /// Notes (load outcomes, injected faults)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Number of survey points
    pub points: usize,

    /// Virtual duration in milliseconds
    pub duration_ms: u64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, points: usize) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            points,
            duration_ms: 0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_ms = frame.time_ms;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_serialization_omits_empty_fields() {
        let mut export = SimExport::new("boundary_walk", 42, 3);
        export.add_frame(SimFrame {
            time_ms: 140,
            event: Some(NavEvent::Next),
            state: NavigationState::default(),
            generation: 2,
            commands: vec![],
            notes: vec![],
        });
        export.finalize(true, None);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["duration_ms"], 140);
        assert_eq!(json["frames"][0]["event"], "Next");
        assert!(json["frames"][0].get("commands").is_none());
        assert!(json.get("failure_reason").is_none());
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let export = SimExport::new("boundary_walk", 42, 3);
        let path = std::env::temp_dir().join("panotrail_missing_dir").join("nested").join("trace.json");
        assert!(export.write_to_file(path.to_str().unwrap()).is_err());
    }
}
