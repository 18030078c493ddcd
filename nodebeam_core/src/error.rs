//! Error types for the physics core.

use thiserror::Error;

/// Errors raised by the physics core.
///
/// Beam overstress is deliberately absent: breaking is a modelled outcome,
/// not a failure. Stale or duplicate network packets are reported through
/// `PacketOutcome` and never surface here either.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("Numerical fault on node {node}: {detail}")]
    NumericalFault { node: usize, detail: String },
    
    #[error("Invalid node index: {0}")]
    InvalidNode(usize),
    
    #[error("Invalid beam index: {0}")]
    InvalidBeam(usize),
    
    #[error("Invalid rail reference: {0}")]
    InvalidRail(usize),
    
    #[error("Position slot {slot} out of range (1..={capacity})")]
    SlotOutOfRange { slot: usize, capacity: usize },
    
    #[error("Position slot {0} is empty")]
    EmptySlot(usize),
    
    #[error("Topology changed since save (saved {saved:#018x}, current {current:#018x})")]
    TopologyChanged { saved: u64, current: u64 },
    
    #[error("Worker fault: {0}")]
    WorkerFault(String),
    
    #[error("Wire decode error: {0}")]
    WireDecode(String),
    
    #[error("Node count mismatch: expected {expected}, got {got}")]
    NodeCountMismatch { expected: usize, got: usize },
    
    #[error("Vehicle is not networked")]
    NotNetworked,
    
    #[error("Unknown vehicle: {0}")]
    UnknownVehicle(usize),
    
    #[error("No rail within {0} m of slide-node")]
    NoRailInRange(f64),
    
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),
}

impl PhysicsError {
    /// Creates a numerical fault for a node.
    pub fn numerical(node: usize, detail: impl Into<String>) -> Self {
        Self::NumericalFault { node, detail: detail.into() }
    }
    
    /// Creates a wire decode error.
    pub fn wire(msg: impl Into<String>) -> Self {
        Self::WireDecode(msg.into())
    }
    
    /// True for faults that freeze the owning vehicle until reset.
    pub fn is_fatal_to_vehicle(&self) -> bool {
        matches!(self, Self::NumericalFault { .. } | Self::WorkerFault(_))
    }
}
