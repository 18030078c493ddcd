//! Node-to-node and node-to-beam adjacency, derived from the beam array.
//!
//! Rebuilt lazily: the store marks itself dirty when a beam is added, breaks
//! or changes ends, and the owning vehicle rebuilds before the next sub-step.

use crate::store::NodeBeamStore;

/// Adjacency lists keyed by node index. Lists are sorted and deduplicated.
#[derive(Debug, Clone, Default)]
pub struct Connectivity {
    node_to_nodes: Vec<Vec<usize>>,
    node_to_beams: Vec<Vec<usize>>,
    built_revision: Option<u64>,
}

impl Connectivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph for a store from scratch.
    pub fn build(store: &NodeBeamStore) -> Self {
        let mut graph = Self::new();
        graph.rebuild(store);
        graph
    }

    /// Recomputes adjacency, reusing the existing list allocations.
    ///
    /// Broken and disabled beams are skipped: a snapped beam no longer
    /// shields its ends from colliding with each other.
    pub fn rebuild(&mut self, store: &NodeBeamStore) {
        let n = store.node_count();
        self.node_to_nodes.resize_with(n, Vec::new);
        self.node_to_beams.resize_with(n, Vec::new);
        self.node_to_nodes.truncate(n);
        self.node_to_beams.truncate(n);
        for list in self.node_to_nodes.iter_mut().chain(self.node_to_beams.iter_mut()) {
            list.clear();
        }

        for (index, beam) in store.beams().iter().enumerate() {
            if !beam.is_active() || beam.node1 >= n || beam.node2 >= n {
                continue;
            }
            self.node_to_nodes[beam.node1].push(beam.node2);
            self.node_to_nodes[beam.node2].push(beam.node1);
            self.node_to_beams[beam.node1].push(index);
            self.node_to_beams[beam.node2].push(index);
        }

        for list in self.node_to_nodes.iter_mut().chain(self.node_to_beams.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }
        self.built_revision = Some(store.revision());
    }

    /// Nodes sharing an active beam with `node`.
    pub fn neighbours(&self, node: usize) -> &[usize] {
        self.node_to_nodes.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Active beams touching `node`.
    pub fn beams_of(&self, node: usize) -> &[usize] {
        self.node_to_beams.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if `a` and `b` share an active beam.
    pub fn are_connected(&self, a: usize, b: usize) -> bool {
        self.neighbours(a).binary_search(&b).is_ok()
    }

    /// Store revision the graph was last built against.
    pub fn built_revision(&self) -> Option<u64> {
        self.built_revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BeamSpec, BeamState};
    use nalgebra::Vector3;

    fn triangle() -> NodeBeamStore {
        let mut store = NodeBeamStore::new();
        store.add_node(Vector3::new(0.0, 0.0, 0.0), 1.0);
        store.add_node(Vector3::new(1.0, 0.0, 0.0), 1.0);
        store.add_node(Vector3::new(0.0, 1.0, 0.0), 1.0);
        store.add_node(Vector3::new(5.0, 5.0, 5.0), 1.0);
        store.add_beam(0, 1, BeamSpec::new(1.0, 0.0)).unwrap();
        store.add_beam(1, 2, BeamSpec::new(1.0, 0.0)).unwrap();
        store.add_beam(2, 0, BeamSpec::new(1.0, 0.0)).unwrap();
        store.add_beam(0, 1, BeamSpec::new(1.0, 0.0)).unwrap();
        store
    }

    #[test]
    fn test_neighbours_sorted_and_deduped() {
        let graph = Connectivity::build(&triangle());
        assert_eq!(graph.neighbours(0), &[1, 2]);
        assert_eq!(graph.beams_of(0), &[0, 2, 3]);
        assert!(graph.neighbours(3).is_empty());
        assert!(graph.neighbours(99).is_empty());
    }

    #[test]
    fn test_broken_beam_removed_on_rebuild() {
        let mut store = triangle();
        let mut graph = Connectivity::build(&store);
        assert!(graph.are_connected(1, 2));

        store.beams_mut()[1].state = BeamState::Broken;
        graph.rebuild(&store);
        assert!(!graph.are_connected(1, 2));
        assert!(graph.are_connected(0, 1));
    }

    #[test]
    fn test_tracks_built_revision() {
        let mut store = triangle();
        let graph = Connectivity::build(&store);
        assert_eq!(graph.built_revision(), Some(store.revision()));
        store.add_node(Vector3::zeros(), 1.0);
        assert_ne!(graph.built_revision(), Some(store.revision()));
    }
}
