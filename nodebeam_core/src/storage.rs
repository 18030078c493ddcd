//! Position storage: numbered slots holding full node-position snapshots.
//!
//! Slots are 1-based. A snapshot remembers the store's topology fingerprint
//! and refuses to load while the connection layout differs: an attachment is
//! still hooked on or a beam broke since the save. Releasing the attachment
//! or resetting the vehicle makes the slot loadable again.

use crate::error::PhysicsError;
use crate::store::NodeBeamStore;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A saved node-position snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSlot {
    pub positions: Vec<Vector3<f64>>,
    pub topology: u64,
}

/// Fixed set of position slots `1..=capacity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionStorage {
    slots: Vec<Option<PositionSlot>>,
}

impl PositionStorage {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn index(&self, slot: usize) -> Result<usize, PhysicsError> {
        if slot == 0 || slot > self.slots.len() {
            return Err(PhysicsError::SlotOutOfRange { slot, capacity: self.slots.len() });
        }
        Ok(slot - 1)
    }

    /// Captures the current node positions into `slot`, replacing any previous save.
    pub fn save(&mut self, slot: usize, store: &NodeBeamStore) -> Result<(), PhysicsError> {
        let index = self.index(slot)?;
        self.slots[index] = Some(PositionSlot {
            positions: store.nodes().iter().map(|n| n.position).collect(),
            topology: store.topology_fingerprint(),
        });
        Ok(())
    }

    /// Overwrites live node positions from `slot` and zeroes velocities and forces.
    pub fn load(&self, slot: usize, store: &mut NodeBeamStore) -> Result<(), PhysicsError> {
        let index = self.index(slot)?;
        let saved = self.slots[index].as_ref().ok_or(PhysicsError::EmptySlot(slot))?;
        let current = store.topology_fingerprint();
        if saved.topology != current {
            return Err(PhysicsError::TopologyChanged {
                saved: saved.topology,
                current,
            });
        }
        if saved.positions.len() != store.node_count() {
            return Err(PhysicsError::NodeCountMismatch {
                expected: store.node_count(),
                got: saved.positions.len(),
            });
        }
        for (node, position) in store.nodes_mut().iter_mut().zip(&saved.positions) {
            node.position = *position;
        }
        store.clear_motion();
        Ok(())
    }

    pub fn get(&self, slot: usize) -> Result<Option<&PositionSlot>, PhysicsError> {
        let index = self.index(slot)?;
        Ok(self.slots[index].as_ref())
    }

    pub fn is_saved(&self, slot: usize) -> bool {
        self.get(slot).map(|s| s.is_some()).unwrap_or(false)
    }

    /// Shifts every saved snapshot (floating-origin recentering).
    pub fn translate(&mut self, offset: &Vector3<f64>) {
        for saved in self.slots.iter_mut().flatten() {
            for p in &mut saved.positions {
                *p += offset;
            }
        }
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

impl Default for PositionStorage {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BeamSpec, BeamState};

    fn store() -> NodeBeamStore {
        let mut store = NodeBeamStore::new();
        store.add_node(Vector3::new(0.0, 1.0, 0.0), 1.0);
        store.add_node(Vector3::new(1.0, 1.0, 0.0), 1.0);
        store.add_beam(0, 1, BeamSpec::new(100.0, 1.0)).unwrap();
        store
    }

    #[test]
    fn test_save_load_restores_exactly() {
        let mut store = store();
        let mut storage = PositionStorage::new(3);
        storage.save(2, &store).unwrap();
        let saved: Vec<_> = store.nodes().iter().map(|n| n.position).collect();

        for node in store.nodes_mut() {
            node.position += Vector3::new(0.3, -0.7, 0.1);
            node.velocity = Vector3::new(5.0, 5.0, 5.0);
            node.force = Vector3::new(1.0, 2.0, 3.0);
        }
        storage.load(2, &mut store).unwrap();

        for (node, p) in store.nodes().iter().zip(&saved) {
            assert_eq!(node.position, *p);
            assert_eq!(node.velocity, Vector3::zeros());
            assert_eq!(node.force, Vector3::zeros());
        }
    }

    #[test]
    fn test_slot_bounds() {
        let store = store();
        let mut storage = PositionStorage::new(2);
        assert_eq!(storage.save(0, &store), Err(PhysicsError::SlotOutOfRange { slot: 0, capacity: 2 }));
        assert!(storage.save(3, &store).is_err());
        assert!(storage.save(2, &store).is_ok());
    }

    #[test]
    fn test_empty_slot() {
        let mut store = store();
        let storage = PositionStorage::new(2);
        assert_eq!(storage.load(1, &mut store), Err(PhysicsError::EmptySlot(1)));
        assert!(!storage.is_saved(1));
    }

    #[test]
    fn test_topology_change_rejected() {
        let mut store = store();
        let mut storage = PositionStorage::new(2);
        storage.save(1, &store).unwrap();
        store.add_node(Vector3::zeros(), 1.0);
        assert!(matches!(storage.load(1, &mut store), Err(PhysicsError::TopologyChanged { .. })));
    }

    #[test]
    fn test_broken_beam_blocks_load_until_repaired() {
        let mut store = store();
        let spawn = store.beams().to_vec();
        let mut storage = PositionStorage::new(1);
        storage.save(1, &store).unwrap();

        store.beams_mut()[0].state = BeamState::Broken;
        assert!(matches!(storage.load(1, &mut store), Err(PhysicsError::TopologyChanged { .. })));

        store.restore_beams(&spawn).unwrap();
        assert_eq!(storage.load(1, &mut store), Ok(()));
    }

    #[test]
    fn test_released_attachment_loads_again() {
        let mut store = store();
        store.add_node(Vector3::new(2.0, 1.0, 0.0), 1.0);
        let hook = store.add_detached_beam(1, BeamSpec::new(100.0, 1.0)).unwrap();
        let mut storage = PositionStorage::new(1);
        storage.save(1, &store).unwrap();

        store.reattach_beam(hook, 2, true).unwrap();
        assert!(storage.load(1, &mut store).is_err());
        store.reattach_beam(hook, 1, false).unwrap();
        assert_eq!(storage.load(1, &mut store), Ok(()));
    }

    #[test]
    fn test_resave_overwrites() {
        let mut store = store();
        let mut storage = PositionStorage::new(1);
        storage.save(1, &store).unwrap();
        store.nodes_mut()[0].position = Vector3::new(9.0, 9.0, 9.0);
        storage.save(1, &store).unwrap();
        store.nodes_mut()[0].position = Vector3::zeros();
        storage.load(1, &mut store).unwrap();
        assert_eq!(store.nodes()[0].position, Vector3::new(9.0, 9.0, 9.0));
    }
}
