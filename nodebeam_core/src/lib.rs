//! nodebeam Core - Node-beam soft-body vehicle physics
//!
//! A vehicle is a mesh of point masses (nodes) joined by spring-damper
//! beams. This crate advances such meshes in fixed sub-steps:
//! 1. **Force Solver**: beam, body and actuator forces, symplectic Euler
//! 2. **Collision Resolver**: terrain penalty contact with Stribeck friction,
//!    node/triangle contact between and within vehicles
//! 3. **Slide-Nodes**: nodes constrained to rails
//! 4. **Parallel Step Scheduler**: a worker pool stepping disjoint vehicle
//!    partitions in lockstep behind a cyclic barrier
//! 5. **Replication**: wire codec and network sync adapter for vehicles
//!    driven by a remote simulator

pub mod attachment;
pub mod barrier;
pub mod builder;
pub mod collision;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod ground;
pub mod netsync;
pub mod replay;
pub mod scheduler;
pub mod slidenode;
pub mod snapshot;
pub mod solver;
pub mod storage;
pub mod store;
pub mod truck;
pub mod wheel;
pub mod wire;

// Re-export key types for convenience
pub use barrier::{BarrierBroken, CyclicBarrier};
pub use builder::TruckBuilder;
pub use collision::CollisionProxy;
pub use config::{CollisionConfig, NetSyncConfig, SchedulerConfig, SolverConfig, TruckConfig};
pub use error::PhysicsError;
pub use ground::{FlatGround, GroundModel, GroundModelId, GroundModelSet, HeightField, TerrainQuery};
pub use netsync::{NetworkSync, PacketOutcome, SyncStatus};
pub use scheduler::{FrameReport, Scheduler, SchedulerPhase};
pub use snapshot::{BlinkType, LightState, NodeStateFrame, StateSnapshot};
pub use store::{BeamKind, BeamSpec, BeamState, NodeBeamStore};
pub use truck::{SimState, Truck, VehicleId};
