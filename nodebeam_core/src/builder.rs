//! Vehicle construction from a resolved definition.
//!
//! Loader code (outside this crate) parses vehicle files and feeds the
//! numeric result through [`TruckBuilder`]. Every index is validated as it is
//! added, so `build` only has to check whole-vehicle invariants.

use crate::attachment::{Attachment, AttachmentKind};
use crate::config::TruckConfig;
use crate::error::PhysicsError;
use crate::slidenode::{RailGroup, SlideNode};
use crate::store::{BeamSpec, NodeBeamStore};
use crate::truck::{CameraNodes, Truck, TruckParts};
use crate::wheel::Wheel;
use nalgebra::Vector3;

/// Incrementally assembles a [`Truck`].
#[derive(Debug, Clone, Default)]
pub struct TruckBuilder {
    store: NodeBeamStore,
    wheels: Vec<Wheel>,
    rails: Vec<RailGroup>,
    slide_nodes: Vec<SlideNode>,
    triangles: Vec<[usize; 3]>,
    attachments: Vec<Attachment>,
    anchors: Vec<usize>,
    camera: Option<CameraNodes>,
}

impl TruckBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, position: Vector3<f64>, mass: f64) -> usize {
        self.store.add_node(position, mass)
    }

    /// Pins a node in place.
    pub fn lock_node(&mut self, node: usize) -> Result<&mut Self, PhysicsError> {
        self.store.node_mut(node)?.locked = true;
        Ok(self)
    }

    /// Includes or excludes a node from contact.
    pub fn set_contacter(&mut self, node: usize, contacter: bool) -> Result<&mut Self, PhysicsError> {
        self.store.node_mut(node)?.contacter = contacter;
        Ok(self)
    }

    pub fn add_beam(&mut self, node1: usize, node2: usize, spec: BeamSpec) -> Result<usize, PhysicsError> {
        self.store.add_beam(node1, node2, spec)
    }

    pub fn add_wheel(
        &mut self,
        axle: (usize, usize),
        rim: Vec<usize>,
        radius: f64,
        braked: bool,
    ) -> Result<usize, PhysicsError> {
        self.store.node(axle.0)?;
        self.store.node(axle.1)?;
        for &n in &rim {
            self.store.node(n)?;
        }
        if axle.0 == axle.1 || radius <= 0.0 {
            return Err(PhysicsError::InvalidDefinition(format!(
                "wheel with axle {:?} and radius {}",
                axle, radius
            )));
        }
        self.wheels.push(Wheel { axle, rim, radius, braked });
        Ok(self.wheels.len() - 1)
    }

    pub fn add_rail(&mut self, nodes: Vec<usize>) -> Result<usize, PhysicsError> {
        for &n in &nodes {
            self.store.node(n)?;
        }
        self.rails.push(RailGroup::new(nodes)?);
        Ok(self.rails.len() - 1)
    }

    /// Registers a slide-node on `rail`, or on the nearest rail when `None`.
    /// Locking always re-picks the nearest rail within `attach_distance`.
    pub fn add_slide_node(&mut self, node: usize, rail: Option<usize>, attach_distance: f64) -> Result<usize, PhysicsError> {
        self.store.node(node)?;
        if let Some(r) = rail {
            if r >= self.rails.len() {
                return Err(PhysicsError::InvalidRail(r));
            }
        }
        let index = self.slide_nodes.len();
        self.slide_nodes.push(SlideNode::new(node, rail, attach_distance));
        self.store.node_mut(node)?.slide_node = Some(index);
        Ok(index)
    }

    pub fn add_collision_triangle(&mut self, triangle: [usize; 3]) -> Result<usize, PhysicsError> {
        for &n in &triangle {
            self.store.node(n)?;
        }
        if triangle[0] == triangle[1] || triangle[1] == triangle[2] || triangle[0] == triangle[2] {
            return Err(PhysicsError::InvalidDefinition(format!("degenerate triangle {:?}", triangle)));
        }
        self.triangles.push(triangle);
        Ok(self.triangles.len() - 1)
    }

    /// Marks a node that ties, ropes and hooks may attach to.
    pub fn add_anchor(&mut self, node: usize) -> Result<&mut Self, PhysicsError> {
        self.store.node(node)?;
        if !self.anchors.contains(&node) {
            self.anchors.push(node);
        }
        Ok(self)
    }

    fn add_attachment(
        &mut self,
        kind: AttachmentKind,
        source: usize,
        group: i32,
        reach: f64,
        max_stress: f64,
        spec: BeamSpec,
    ) -> Result<usize, PhysicsError> {
        let beam = self.store.add_detached_beam(source, spec)?;
        self.attachments.push(Attachment {
            kind,
            beam,
            source,
            group,
            reach,
            max_stress,
            target: None,
        });
        Ok(self.attachments.len() - 1)
    }

    pub fn add_tie(&mut self, source: usize, group: i32, reach: f64, max_stress: f64, spec: BeamSpec) -> Result<usize, PhysicsError> {
        self.add_attachment(AttachmentKind::Tie, source, group, reach, max_stress, spec)
    }

    pub fn add_rope(&mut self, source: usize, group: i32, reach: f64, spec: BeamSpec) -> Result<usize, PhysicsError> {
        self.add_attachment(AttachmentKind::Rope, source, group, reach, f64::INFINITY, spec)
    }

    pub fn add_hook(&mut self, source: usize, group: i32, reach: f64, spec: BeamSpec) -> Result<usize, PhysicsError> {
        self.add_attachment(AttachmentKind::Hook, source, group, reach, f64::INFINITY, spec)
    }

    /// Reference and forward-direction nodes used for heading.
    pub fn set_camera_nodes(&mut self, reference: usize, direction: usize) -> Result<&mut Self, PhysicsError> {
        self.store.node(reference)?;
        self.store.node(direction)?;
        self.camera = Some(CameraNodes { reference, direction });
        Ok(self)
    }

    pub fn node_count(&self) -> usize {
        self.store.node_count()
    }

    /// Finishes the vehicle.
    pub fn build(self, name: impl Into<String>, config: TruckConfig) -> Result<Truck, PhysicsError> {
        if self.store.node_count() == 0 {
            return Err(PhysicsError::InvalidDefinition("vehicle has no nodes".to_string()));
        }
        Ok(Truck::from_parts(
            name.into(),
            TruckParts {
                store: self.store,
                wheels: self.wheels,
                rails: self.rails,
                slide_nodes: self.slide_nodes,
                triangles: self.triangles,
                attachments: self.attachments,
                anchors: self.anchors,
                camera: self.camera,
            },
            config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_indices() {
        let mut builder = TruckBuilder::new();
        let a = builder.add_node(Vector3::zeros(), 1.0);
        let b = builder.add_node(Vector3::new(1.0, 0.0, 0.0), 1.0);
        assert!(builder.add_beam(a, 9, BeamSpec::new(1.0, 0.0)).is_err());
        assert!(builder.add_rail(vec![a]).is_err());
        assert!(builder.add_slide_node(a, Some(3), 1.0).is_err());
        assert!(builder.add_collision_triangle([a, b, b]).is_err());
        assert!(builder.add_wheel((a, a), vec![b], 0.4, true).is_err());
    }

    #[test]
    fn test_empty_vehicle_rejected() {
        assert!(TruckBuilder::new().build("empty", TruckConfig::default()).is_err());
    }

    #[test]
    fn test_build_links_slide_nodes() {
        let mut builder = TruckBuilder::new();
        let a = builder.add_node(Vector3::zeros(), 1.0);
        let b = builder.add_node(Vector3::new(2.0, 0.0, 0.0), 1.0);
        let s = builder.add_node(Vector3::new(1.0, 0.1, 0.0), 1.0);
        let rail = builder.add_rail(vec![a, b]).unwrap();
        builder.add_slide_node(s, Some(rail), 0.5).unwrap();
        builder.lock_node(a).unwrap().lock_node(b).unwrap();

        let truck = builder.build("rail", TruckConfig::default()).unwrap();
        assert_eq!(truck.node_count(), 3);
        assert_eq!(truck.nodes()[s].slide_node, Some(0));
        assert!(truck.nodes()[a].locked);
    }
}
