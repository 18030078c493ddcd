//! Node/Beam Store - flat arena of point masses and elastic connectors.
//!
//! Indices handed out by the store are stable for the vehicle's lifetime:
//! nothing is ever removed. Broken beams stay in the array, flagged, so that
//! connectivity graphs, replication and position storage keep addressing the
//! same slots. Growth only happens between steps and bumps the topology
//! revision.

use crate::error::PhysicsError;
use crate::ground::GroundModelId;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

// ============================================================================
// NODE
// ============================================================================

/// A point mass in the soft-body mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Position in the local (origin-relative) frame, metres
    pub position: Vector3<f64>,

    /// Velocity in m/s
    pub velocity: Vector3<f64>,

    /// Force accumulator, cleared by every integration
    pub force: Vector3<f64>,

    /// Mass in kg
    pub mass: f64,

    /// Cached 1 / mass
    pub inv_mass: f64,

    /// Pinned in place: excluded from integration
    pub locked: bool,

    /// Participates in terrain and vehicle contact
    pub contacter: bool,

    /// Touched terrain during the last sub-step
    pub in_contact: bool,

    /// Last terrain query found no ground data
    pub off_map: bool,

    /// Ground model matched at the last terrain contact
    pub ground_model: Option<GroundModelId>,

    /// Index into the owning vehicle's slide-node list
    pub slide_node: Option<usize>,
}

impl Node {
    /// Creates a free node at rest.
    pub fn new(position: Vector3<f64>, mass: f64) -> Self {
        let mass = if mass > 0.0 { mass } else { 1.0 };
        Self {
            position,
            velocity: Vector3::zeros(),
            force: Vector3::zeros(),
            mass,
            inv_mass: 1.0 / mass,
            locked: false,
            contacter: true,
            in_contact: false,
            off_map: false,
            ground_model: None,
            slide_node: None,
        }
    }

    /// Changes the mass, keeping the inverse in sync.
    pub fn set_mass(&mut self, mass: f64) {
        if mass > 0.0 {
            self.mass = mass;
            self.inv_mass = 1.0 / mass;
        }
    }

    /// Kinetic energy ½mv².
    #[inline]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.velocity.norm_squared()
    }
}

// ============================================================================
// BEAM
// ============================================================================

/// Behaviour layered on top of the base spring-damper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BeamKind {
    /// Plain structural beam
    Normal,

    /// Rest length follows the hydraulic state: `base * (1 - ratio * state)`
    Hydraulic { ratio: f64 },

    /// Tension only; slack under compression
    Rope,

    /// Rest length follows command keys within `[-short_bound, long_bound]`
    Command {
        short_bound: f64,
        long_bound: f64,
        rate: f64,
        short_key: usize,
        long_key: usize,
    },

    /// Compression only; slack under extension
    Support,
}

/// Deformation state. `Broken` is terminal until an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeamState {
    Intact,
    Deformed,
    Broken,
}

/// Resolved parameters for a new beam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamSpec {
    /// Spring stiffness in N/m
    pub spring: f64,

    /// Damping coefficient in N·s/m
    pub damping: f64,

    /// |force| above which the beam breaks (default: never)
    pub strength: f64,

    /// |force| above which the rest length yields (default: never)
    pub deform_threshold: f64,

    /// Special behaviour
    pub kind: BeamKind,

    /// Explicit rest length; `None` uses the spawn distance
    pub rest_length: Option<f64>,
}

impl BeamSpec {
    /// A normal beam that never breaks or yields.
    pub fn new(spring: f64, damping: f64) -> Self {
        Self {
            spring,
            damping,
            strength: f64::INFINITY,
            deform_threshold: f64::INFINITY,
            kind: BeamKind::Normal,
            rest_length: None,
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_deform_threshold(mut self, threshold: f64) -> Self {
        self.deform_threshold = threshold;
        self
    }

    pub fn with_rest_length(mut self, rest_length: f64) -> Self {
        self.rest_length = Some(rest_length);
        self
    }

    pub fn with_kind(mut self, kind: BeamKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn rope(self) -> Self {
        self.with_kind(BeamKind::Rope)
    }

    pub fn support(self) -> Self {
        self.with_kind(BeamKind::Support)
    }

    pub fn hydraulic(self, ratio: f64) -> Self {
        self.with_kind(BeamKind::Hydraulic { ratio })
    }
}

/// An elastic, damped connector between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beam {
    /// First end
    pub node1: usize,

    /// Second end
    pub node2: usize,

    /// Reference length hydraulics and commands scale from; plastic yield moves it
    pub base_length: f64,

    /// Rest length used in the last force evaluation
    pub rest_length: f64,

    /// Spring stiffness in N/m
    pub spring: f64,

    /// Damping coefficient in N·s/m
    pub damping: f64,

    /// Breaking threshold on |force|
    pub strength: f64,

    /// Plastic yield threshold on |force|; work-hardens as the beam yields
    pub deform_threshold: f64,

    pub kind: BeamKind,

    pub state: BeamState,

    /// Disabled beams (unattached ties, ropes, hooks) exert no force
    pub enabled: bool,

    /// Commanded length ratio for command beams
    pub command_ratio: f64,

    /// Signed force from the last evaluation, positive in tension
    pub stress: f64,
}

impl Beam {
    /// True when the beam currently exerts force.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.enabled && self.state != BeamState::Broken
    }

    #[inline]
    pub fn is_broken(&self) -> bool {
        self.state == BeamState::Broken
    }

    /// Returns the opposite end, if `node` is an end of this beam.
    pub fn other_end(&self, node: usize) -> Option<usize> {
        if self.node1 == node {
            Some(self.node2)
        } else if self.node2 == node {
            Some(self.node1)
        } else {
            None
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Arena of nodes and beams with an explicit topology revision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeBeamStore {
    nodes: Vec<Node>,
    beams: Vec<Beam>,

    /// Bumped on every structural change (node/beam added, beam re-attached)
    revision: u64,

    /// Set when a beam breaks or changes ends; the connectivity graph is stale
    connectivity_dirty: bool,
}

impl NodeBeamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node and returns its stable index.
    pub fn add_node(&mut self, position: Vector3<f64>, mass: f64) -> usize {
        self.nodes.push(Node::new(position, mass));
        self.revision += 1;
        self.connectivity_dirty = true;
        self.nodes.len() - 1
    }

    /// Appends a beam between two existing nodes and returns its stable index.
    pub fn add_beam(&mut self, node1: usize, node2: usize, spec: BeamSpec) -> Result<usize, PhysicsError> {
        let p1 = self.node(node1)?.position;
        let p2 = self.node(node2)?.position;
        if node1 == node2 {
            return Err(PhysicsError::InvalidDefinition(format!(
                "beam connects node {} to itself",
                node1
            )));
        }

        let length = spec.rest_length.unwrap_or_else(|| (p2 - p1).norm());
        self.beams.push(Beam {
            node1,
            node2,
            base_length: length,
            rest_length: length,
            spring: spec.spring,
            damping: spec.damping,
            strength: spec.strength,
            deform_threshold: spec.deform_threshold,
            kind: spec.kind,
            state: BeamState::Intact,
            enabled: true,
            command_ratio: 0.0,
            stress: 0.0,
        });
        self.revision += 1;
        self.connectivity_dirty = true;
        Ok(self.beams.len() - 1)
    }

    /// Appends a disabled beam anchored only at `node`, to be attached later.
    pub fn add_detached_beam(&mut self, node: usize, spec: BeamSpec) -> Result<usize, PhysicsError> {
        self.node(node)?;
        let length = spec.rest_length.unwrap_or(0.0);
        self.beams.push(Beam {
            node1: node,
            node2: node,
            base_length: length,
            rest_length: length,
            spring: spec.spring,
            damping: spec.damping,
            strength: spec.strength,
            deform_threshold: spec.deform_threshold,
            kind: spec.kind,
            state: BeamState::Intact,
            enabled: false,
            command_ratio: 0.0,
            stress: 0.0,
        });
        self.revision += 1;
        Ok(self.beams.len() - 1)
    }

    /// Points an existing beam at a new second node (ties, ropes, hooks).
    pub fn reattach_beam(&mut self, beam: usize, node2: usize, enabled: bool) -> Result<(), PhysicsError> {
        self.node(node2)?;
        let b = self.beams.get_mut(beam).ok_or(PhysicsError::InvalidBeam(beam))?;
        b.node2 = node2;
        b.enabled = enabled;
        self.revision += 1;
        self.connectivity_dirty = true;
        Ok(())
    }

    pub fn node(&self, index: usize) -> Result<&Node, PhysicsError> {
        self.nodes.get(index).ok_or(PhysicsError::InvalidNode(index))
    }

    pub fn node_mut(&mut self, index: usize) -> Result<&mut Node, PhysicsError> {
        self.nodes.get_mut(index).ok_or(PhysicsError::InvalidNode(index))
    }

    pub fn beam(&self, index: usize) -> Result<&Beam, PhysicsError> {
        self.beams.get(index).ok_or(PhysicsError::InvalidBeam(index))
    }

    pub fn beam_mut(&mut self, index: usize) -> Result<&mut Beam, PhysicsError> {
        self.beams.get_mut(index).ok_or(PhysicsError::InvalidBeam(index))
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    #[inline]
    pub fn beams(&self) -> &[Beam] {
        &self.beams
    }

    #[inline]
    pub fn beams_mut(&mut self) -> &mut [Beam] {
        &mut self.beams
    }

    /// Split borrow for the solver: beams read/written alongside nodes.
    #[inline]
    pub fn split_mut(&mut self) -> (&mut [Node], &mut [Beam]) {
        (&mut self.nodes, &mut self.beams)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn beam_count(&self) -> usize {
        self.beams.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Hash of the current connection layout: node count plus each beam's
    /// ends, enabled flag and broken flag.
    ///
    /// Unlike [`revision`](Self::revision) it comes back to its old value when
    /// an attachment is released or a reset repairs the spawn beams.
    pub fn topology_fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.nodes.len().hash(&mut hasher);
        for beam in &self.beams {
            (beam.node1, beam.node2, beam.enabled, beam.is_broken()).hash(&mut hasher);
        }
        hasher.finish()
    }

    pub fn connectivity_dirty(&self) -> bool {
        self.connectivity_dirty
    }

    pub fn mark_connectivity_dirty(&mut self) {
        self.connectivity_dirty = true;
    }

    pub fn clear_connectivity_dirty(&mut self) {
        self.connectivity_dirty = false;
    }

    /// Replaces every beam wholesale (reset path). Beam count must match.
    pub fn restore_beams(&mut self, beams: &[Beam]) -> Result<(), PhysicsError> {
        if beams.len() != self.beams.len() {
            return Err(PhysicsError::InvalidDefinition(format!(
                "restoring {} beams into a store of {}",
                beams.len(),
                self.beams.len()
            )));
        }
        self.beams.clone_from_slice(beams);
        self.connectivity_dirty = true;
        Ok(())
    }

    /// Sum of node masses, optionally skipping locked nodes.
    pub fn total_mass(&self, with_locked: bool) -> f64 {
        self.nodes
            .iter()
            .filter(|n| with_locked || !n.locked)
            .map(|n| n.mass)
            .sum()
    }

    pub fn broken_beam_count(&self) -> usize {
        self.beams.iter().filter(|b| b.is_broken()).count()
    }

    /// Zeroes velocities and force accumulators.
    pub fn clear_motion(&mut self) {
        for node in &mut self.nodes {
            node.velocity = Vector3::zeros();
            node.force = Vector3::zeros();
        }
    }

    /// Translates every node.
    pub fn translate(&mut self, offset: Vector3<f64>) {
        for node in &mut self.nodes {
            node.position += offset;
        }
    }

    /// Mean node position.
    pub fn centroid(&self) -> Vector3<f64> {
        if self.nodes.is_empty() {
            return Vector3::zeros();
        }
        let sum: Vector3<f64> = self.nodes.iter().map(|n| n.position).sum();
        sum / self.nodes.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pair() -> NodeBeamStore {
        let mut store = NodeBeamStore::new();
        store.add_node(Vector3::zeros(), 1.0);
        store.add_node(Vector3::new(0.0, 2.0, 0.0), 3.0);
        store
    }

    #[test]
    fn test_beam_rest_length_defaults_to_spawn_distance() {
        let mut store = pair();
        let b = store.add_beam(0, 1, BeamSpec::new(100.0, 1.0)).unwrap();
        assert_relative_eq!(store.beams()[b].rest_length, 2.0);
        assert_eq!(store.beams()[b].state, BeamState::Intact);
    }

    #[test]
    fn test_beam_to_missing_node_rejected() {
        let mut store = pair();
        assert_eq!(
            store.add_beam(0, 7, BeamSpec::new(1.0, 0.0)),
            Err(PhysicsError::InvalidNode(7))
        );
        assert!(store.add_beam(1, 1, BeamSpec::new(1.0, 0.0)).is_err());
    }

    #[test]
    fn test_revision_tracks_structural_changes() {
        let mut store = pair();
        let r0 = store.revision();
        let b = store.add_beam(0, 1, BeamSpec::new(1.0, 0.0)).unwrap();
        assert!(store.revision() > r0);

        let r1 = store.revision();
        store.beams_mut()[b].state = BeamState::Broken;
        assert_eq!(store.revision(), r1);
    }

    #[test]
    fn test_fingerprint_follows_connections_not_history() {
        let mut store = pair();
        store.add_node(Vector3::new(1.0, 0.0, 0.0), 1.0);
        let b = store.add_beam(0, 1, BeamSpec::new(1.0, 0.0)).unwrap();
        let d = store.add_detached_beam(0, BeamSpec::new(1.0, 0.0)).unwrap();
        let f0 = store.topology_fingerprint();

        store.reattach_beam(d, 2, true).unwrap();
        assert_ne!(store.topology_fingerprint(), f0);
        store.reattach_beam(d, 0, false).unwrap();
        assert_eq!(store.topology_fingerprint(), f0);

        let spawn = store.beams().to_vec();
        store.beams_mut()[b].state = BeamState::Broken;
        assert_ne!(store.topology_fingerprint(), f0);
        store.restore_beams(&spawn).unwrap();
        assert_eq!(store.topology_fingerprint(), f0);

        store.beams_mut()[b].state = BeamState::Deformed;
        store.beams_mut()[b].rest_length = 0.5;
        assert_eq!(store.topology_fingerprint(), f0);
    }

    #[test]
    fn test_total_mass_with_and_without_locked() {
        let mut store = pair();
        store.nodes_mut()[0].locked = true;
        assert_relative_eq!(store.total_mass(true), 4.0);
        assert_relative_eq!(store.total_mass(false), 3.0);
    }

    #[test]
    fn test_other_end() {
        let mut store = pair();
        let b = store.add_beam(0, 1, BeamSpec::new(1.0, 0.0)).unwrap();
        let beam = &store.beams()[b];
        assert_eq!(beam.other_end(0), Some(1));
        assert_eq!(beam.other_end(1), Some(0));
        assert_eq!(beam.other_end(5), None);
    }

    #[test]
    fn test_non_positive_mass_is_sanitised() {
        let node = Node::new(Vector3::zeros(), 0.0);
        assert_eq!(node.mass, 1.0);
        assert_eq!(node.inv_mass, 1.0);
    }
}
