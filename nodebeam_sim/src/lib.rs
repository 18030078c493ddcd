//! Nodebeam Deterministic Scenario Harness
//!
//! Drives the parallel step scheduler with a manually advanced clock and a
//! seeded, lossy network so every run is a pure function of its seed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ Scheduler (worker pool, barriers, floating origin)   │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼────┐   snapshots  ┌────▼────┐                       │
//! │  │ Source  │─────────────►│ Mirror  │   (Networked)         │
//! │  │  truck  │  SimNetwork  │  truck  │                       │
//! │  └─────────┘ loss/jitter  └─────────┘                       │
//! │       ▲                                                     │
//! │  ┌────┴───────────────┐  ┌─────────────────────────┐        │
//! │  │ ManualClock        │  │ Terrain (flat/height)   │        │
//! │  └────────────────────┘  └─────────────────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use nodebeam_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 4).with_duration(3.0).run(ScenarioId::BeamBreak);
//! assert!(result.passed);
//! ```

pub mod blueprints;
mod error;
mod exporter;
mod network;
mod runner;
pub mod scenarios;
mod world;

pub use error::SimError;
pub use exporter::{SimEvent, SimExport, SimFrame, VehicleFrame};
pub use network::{LinkParams, NetworkStats, SimNetwork, SimNetworkController, SimNetworkHub};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{ReplicationStats, SimConfig, SimWorld};
