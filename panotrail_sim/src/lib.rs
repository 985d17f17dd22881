//! Panotrail Deterministic Session Harness
//!
//! Runs a complete browsing session (navigation state machine, display
//! fan-out, image loads and the graph provider) with every source of
//! non-determinism under control:
//! - **Time**: a virtual clock; the viewer init delay and fetch latency cost nothing
//! - **Network**: an in-memory fetcher with 404s and seeded transport failures
//! - **Input**: map, viewer and engine events drawn from a single 64-bit seed
//!
//! An [`Oracle`] re-derives what every display should show after each event
//! and compares it with what a [`RecordingDisplays`] actually received.
//!
//! # Usage
//!
//! ```ignore
//! use panotrail_sim::{ScenarioRunner, SimConfig};
//! use panotrail_sim::scenarios::ScenarioId;
//!
//! let runner = ScenarioRunner::new(SimConfig { seed: 42, ..Default::default() })?;
//! let result = runner.run(ScenarioId::RandomWalk).await;
//! assert!(result.passed);
//! ```

mod context;
mod displays;
mod exporter;
mod fetcher;
mod oracle;
mod runner;
pub mod scenarios;
mod world;

pub use context::SimContext;
pub use displays::{DisplayCommand, RecordingDisplays};
pub use exporter::{SimExport, SimFrame};
pub use fetcher::SimFetcher;
pub use oracle::{Oracle, Violation};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{survey_track, SimConfig, SimWorld};
