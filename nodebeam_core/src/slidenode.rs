//! Slide-Nodes - nodes constrained to a rail of connected segments.
//!
//! A rail is an ordered list of nodes; consecutive pairs form segments. While
//! locked, a slide-node is pulled toward its rail during the force phase and
//! then snapped onto the nearest point of its current segment after
//! integration, walking to a neighbouring segment when it slides past an end.
//! Rails belong to the vehicle and deform with it.

use crate::error::PhysicsError;
use crate::store::Node;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Ordered chain of nodes forming a rail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailGroup {
    pub nodes: Vec<usize>,
}

impl RailGroup {
    /// A rail needs at least one segment.
    pub fn new(nodes: Vec<usize>) -> Result<Self, PhysicsError> {
        if nodes.len() < 2 {
            return Err(PhysicsError::InvalidDefinition(format!(
                "rail needs at least 2 nodes, got {}",
                nodes.len()
            )));
        }
        Ok(Self { nodes })
    }

    pub fn segment_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// End nodes of a segment.
    pub fn segment(&self, index: usize) -> Option<(usize, usize)> {
        Some((*self.nodes.get(index)?, *self.nodes.get(index + 1)?))
    }
}

/// A node that can lock onto a rail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideNode {
    /// Constrained node
    pub node: usize,

    /// Rail the node is attached to
    pub rail: Option<usize>,

    /// Current segment within the rail
    pub segment: usize,

    /// Maximum distance at which the node attaches to a rail
    pub attach_distance: f64,

    /// Constraint active
    pub locked: bool,
}

impl SlideNode {
    pub fn new(node: usize, rail: Option<usize>, attach_distance: f64) -> Self {
        Self {
            node,
            rail,
            segment: 0,
            attach_distance,
            locked: false,
        }
    }
}

/// Closest point on segment `ab` to `p`.
///
/// Returns the point, the clamped parameter and the raw (unclamped) one.
pub fn project_on_segment(p: &Vector3<f64>, a: &Vector3<f64>, b: &Vector3<f64>) -> (Vector3<f64>, f64, f64) {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < 1e-18 {
        return (*a, 0.0, 0.0);
    }
    let raw = (p - a).dot(&ab) / len2;
    let t = raw.clamp(0.0, 1.0);
    (a + ab * t, t, raw)
}

/// Nearest segment of a rail to `p`: (segment, point, distance).
///
/// Ties go to the lower segment index.
pub fn closest_on_rail(rail: &RailGroup, nodes: &[Node], p: &Vector3<f64>) -> Option<(usize, Vector3<f64>, f64)> {
    let mut best: Option<(usize, Vector3<f64>, f64)> = None;
    for segment in 0..rail.segment_count() {
        let Some((a, b)) = rail.segment(segment) else { continue };
        let (Some(na), Some(nb)) = (nodes.get(a), nodes.get(b)) else { continue };
        let (q, _, _) = project_on_segment(p, &na.position, &nb.position);
        let distance = (q - p).norm();
        if best.map_or(true, |(_, _, d)| distance < d) {
            best = Some((segment, q, distance));
        }
    }
    best
}

/// Nearest rail among `rails` to `p`: (rail, segment, distance).
pub fn closest_rail(rails: &[RailGroup], nodes: &[Node], p: &Vector3<f64>) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for (index, rail) in rails.iter().enumerate() {
        if let Some((segment, _, distance)) = closest_on_rail(rail, nodes, p) {
            if best.map_or(true, |(_, _, d)| distance < d) {
                best = Some((index, segment, distance));
            }
        }
    }
    best
}

/// Locks every slide-node onto the nearest rail within its attach distance.
///
/// Returns the number of nodes that locked. Nodes with no rail in range stay
/// free.
pub fn attach_slide_nodes(slide_nodes: &mut [SlideNode], rails: &[RailGroup], nodes: &[Node]) -> usize {
    let choices: Vec<Option<(usize, f64)>> = slide_nodes
        .iter()
        .map(|slide| {
            let node = nodes.get(slide.node)?;
            closest_rail(rails, nodes, &node.position).map(|(rail, _, d)| (rail, d))
        })
        .collect();
    lock_to_rails(slide_nodes, &choices, rails, nodes)
}

/// Locks each slide-node onto its chosen `(rail, distance)` when the
/// distance is within its attach distance; the rest are unlocked.
///
/// `choices` is parallel to `slide_nodes`. Returns the number locked.
pub fn lock_to_rails(
    slide_nodes: &mut [SlideNode],
    choices: &[Option<(usize, f64)>],
    rails: &[RailGroup],
    nodes: &[Node],
) -> usize {
    let mut locked = 0;
    for (slide, choice) in slide_nodes.iter_mut().zip(choices) {
        let segment = match (*choice, nodes.get(slide.node)) {
            (Some((rail, distance)), Some(node)) if distance <= slide.attach_distance => rails
                .get(rail)
                .and_then(|r| closest_on_rail(r, nodes, &node.position))
                .map(|(segment, _, _)| (rail, segment)),
            _ => None,
        };
        match segment {
            Some((rail, segment)) => {
                slide.rail = Some(rail);
                slide.segment = segment;
                slide.locked = true;
                locked += 1;
            }
            None => slide.locked = false,
        }
    }
    locked
}

/// Unlocks every slide-node; they behave as ordinary nodes afterwards.
pub fn detach_slide_nodes(slide_nodes: &mut [SlideNode]) {
    for slide in slide_nodes.iter_mut() {
        slide.locked = false;
    }
}

/// Recomputes each slide-node's rail attachment from its current position.
///
/// Nodes without a rail take the nearest one; every node then takes the
/// nearest segment of its rail. Lock state is left alone.
pub fn reset_slide_nodes(slide_nodes: &mut [SlideNode], rails: &[RailGroup], nodes: &[Node]) {
    for slide in slide_nodes.iter_mut() {
        let Some(node) = nodes.get(slide.node) else { continue };
        if slide.rail.is_none() {
            slide.rail = closest_rail(rails, nodes, &node.position).map(|(rail, _, _)| rail);
        }
        let Some(rail) = slide.rail.and_then(|r| rails.get(r)) else { continue };
        if let Some((segment, _, _)) = closest_on_rail(rail, nodes, &node.position) {
            slide.segment = segment;
        }
    }
}

fn segment_nodes(rail: &RailGroup, segment: usize, nodes: &[Node]) -> Option<(usize, usize)> {
    let (a, b) = rail.segment(segment)?;
    (a < nodes.len() && b < nodes.len()).then_some((a, b))
}

/// Spring pull toward the current segment; the reaction is split over the
/// segment's end nodes by the projection parameter.
pub fn apply_rail_forces(slide_nodes: &[SlideNode], rails: &[RailGroup], nodes: &mut [Node], stiffness: f64) {
    for slide in slide_nodes.iter().filter(|s| s.locked) {
        let Some(rail) = slide.rail.and_then(|r| rails.get(r)) else { continue };
        let Some((a, b)) = segment_nodes(rail, slide.segment, nodes) else { continue };
        if slide.node >= nodes.len() || slide.node == a || slide.node == b {
            continue;
        }
        let (q, t, _) = project_on_segment(&nodes[slide.node].position, &nodes[a].position, &nodes[b].position);
        let force = (q - nodes[slide.node].position) * stiffness;
        nodes[slide.node].force += force;
        nodes[a].force -= force * (1.0 - t);
        nodes[b].force -= force * t;
    }
}

/// Walks from `segment` to whichever neighbour is closer to `p`, until the
/// projection stops falling off the segment ends.
fn advance_segment(rail: &RailGroup, mut segment: usize, p: &Vector3<f64>, nodes: &[Node]) -> usize {
    let project = |s: usize| {
        segment_nodes(rail, s, nodes).map(|(a, b)| project_on_segment(p, &nodes[a].position, &nodes[b].position))
    };
    for _ in 0..rail.segment_count() {
        let Some((q, _, raw)) = project(segment) else { break };
        let current = (q - p).norm();
        let next = if raw < 0.0 && segment > 0 {
            segment - 1
        } else if raw > 1.0 && segment + 1 < rail.segment_count() {
            segment + 1
        } else {
            break;
        };
        match project(next) {
            Some((q, _, _)) if (q - p).norm() < current => segment = next,
            _ => break,
        }
    }
    segment
}

/// Snaps locked slide-nodes onto their rail after integration.
///
/// The node moves to the nearest of the current and adjacent segments,
/// repeatedly, so a fast node can advance several segments. Its velocity
/// keeps its own component along the segment and takes the rail's motion
/// across it.
pub fn enforce_rail_constraints(slide_nodes: &mut [SlideNode], rails: &[RailGroup], nodes: &mut [Node]) {
    for slide in slide_nodes.iter_mut().filter(|s| s.locked) {
        let Some(rail) = slide.rail.and_then(|r| rails.get(r)) else { continue };
        if slide.node >= nodes.len() || rail.segment_count() == 0 {
            continue;
        }
        let p = nodes[slide.node].position;

        let segment = advance_segment(rail, slide.segment.min(rail.segment_count() - 1), &p, nodes);
        slide.segment = segment;

        let Some((a, b)) = segment_nodes(rail, segment, nodes) else { continue };
        let (pa, pb) = (nodes[a].position, nodes[b].position);
        let (va, vb) = (nodes[a].velocity, nodes[b].velocity);
        let (q, t, _) = project_on_segment(&p, &pa, &pb);

        let axis = pb - pa;
        let node = &mut nodes[slide.node];
        node.position = q;
        if axis.norm() > 1e-12 {
            let u = axis.normalize();
            let rail_velocity = va * (1.0 - t) + vb * t;
            let across = rail_velocity - u * rail_velocity.dot(&u);
            node.velocity = across + u * node.velocity.dot(&u);
        }
    }
}

/// Distance from a slide-node to its current segment.
pub fn rail_error(slide: &SlideNode, rails: &[RailGroup], nodes: &[Node]) -> Option<f64> {
    let rail = rails.get(slide.rail?)?;
    let (a, b) = segment_nodes(rail, slide.segment, nodes)?;
    let p = nodes.get(slide.node)?.position;
    let (q, _, _) = project_on_segment(&p, &nodes[a].position, &nodes[b].position);
    Some((q - p).norm())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    /// Rail nodes 0..k along the given points, plus one free node at the end.
    fn rig(points: &[Vector3<f64>], free: Vector3<f64>) -> (Vec<Node>, Vec<RailGroup>, Vec<SlideNode>) {
        let mut nodes: Vec<Node> = points.iter().map(|p| Node::new(*p, 1.0)).collect();
        nodes.push(Node::new(free, 1.0));
        let rail = RailGroup::new((0..points.len()).collect()).unwrap();
        let slide = SlideNode::new(points.len(), Some(0), 1.0);
        (nodes, vec![rail], vec![slide])
    }

    fn l_rail() -> Vec<Vector3<f64>> {
        vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 2.0)]
    }

    #[test]
    fn test_rail_requires_a_segment() {
        assert!(RailGroup::new(vec![3]).is_err());
        assert_eq!(RailGroup::new(vec![0, 1, 2]).unwrap().segment_count(), 2);
    }

    #[test]
    fn test_projection_clamps_to_segment() {
        let a = Vector3::zeros();
        let b = Vector3::new(1.0, 0.0, 0.0);
        let (q, t, raw) = project_on_segment(&Vector3::new(2.0, 1.0, 0.0), &a, &b);
        assert_eq!(q, b);
        assert_eq!(t, 1.0);
        assert_relative_eq!(raw, 2.0);
    }

    #[test]
    fn test_attach_respects_distance() {
        let (nodes, rails, mut slides) = rig(&l_rail(), Vector3::new(1.0, 0.5, 0.0));
        assert_eq!(attach_slide_nodes(&mut slides, &rails, &nodes), 1);
        assert!(slides[0].locked);
        assert_eq!(slides[0].segment, 0);

        let (nodes, rails, mut slides) = rig(&l_rail(), Vector3::new(1.0, 5.0, 0.0));
        assert_eq!(attach_slide_nodes(&mut slides, &rails, &nodes), 0);
        assert!(!slides[0].locked);
    }

    #[test]
    fn test_enforce_walks_to_next_segment() {
        let (mut nodes, rails, mut slides) = rig(&l_rail(), Vector3::new(1.0, 0.0, 0.0));
        attach_slide_nodes(&mut slides, &rails, &nodes);

        nodes[3].position = Vector3::new(2.1, 0.3, 1.0);
        nodes[3].velocity = Vector3::new(0.0, 1.0, 2.0);
        enforce_rail_constraints(&mut slides, &rails, &mut nodes);

        assert_eq!(slides[0].segment, 1);
        assert_relative_eq!(nodes[3].position, Vector3::new(2.0, 0.0, 1.0), epsilon = 1e-12);
        // Only the along-rail component survives on a static rail
        assert_relative_eq!(nodes[3].velocity, Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_clamps_at_rail_end() {
        let (mut nodes, rails, mut slides) = rig(&l_rail(), Vector3::new(1.0, 0.0, 0.0));
        attach_slide_nodes(&mut slides, &rails, &nodes);
        nodes[3].position = Vector3::new(-3.0, 0.0, 0.0);
        enforce_rail_constraints(&mut slides, &rails, &mut nodes);
        assert_eq!(slides[0].segment, 0);
        assert_relative_eq!(nodes[3].position, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_rail_force_reaction_balances() {
        let (mut nodes, rails, mut slides) = rig(&l_rail(), Vector3::new(0.5, 0.2, 0.0));
        attach_slide_nodes(&mut slides, &rails, &nodes);
        apply_rail_forces(&slides, &rails, &mut nodes, 1000.0);
        let total: Vector3<f64> = nodes.iter().map(|n| n.force).sum();
        assert_relative_eq!(total, Vector3::zeros(), epsilon = 1e-9);
        assert_relative_eq!(nodes[3].force.y, -200.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reset_reseeks_segment() {
        let (mut nodes, rails, mut slides) = rig(&l_rail(), Vector3::new(1.0, 0.0, 0.0));
        attach_slide_nodes(&mut slides, &rails, &nodes);
        nodes[3].position = Vector3::new(2.0, 0.0, 1.5);
        reset_slide_nodes(&mut slides, &rails, &nodes);
        assert_eq!(slides[0].segment, 1);
    }

    #[test]
    fn test_reset_picks_nearest_rail_when_unassigned() {
        let mut nodes: Vec<Node> = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(0.0, 3.0, 0.0),
            Vector3::new(2.0, 3.0, 0.0),
        ]
        .iter()
        .map(|p| Node::new(*p, 1.0))
        .collect();
        nodes.push(Node::new(Vector3::new(1.0, 2.5, 0.0), 1.0));
        let rails = vec![RailGroup::new(vec![0, 1]).unwrap(), RailGroup::new(vec![2, 3]).unwrap()];
        let mut slides = vec![SlideNode::new(4, None, 0.1)];

        reset_slide_nodes(&mut slides, &rails, &nodes);
        assert_eq!(slides[0].rail, Some(1));
        assert_eq!(slides[0].segment, 0);
        assert!(!slides[0].locked);
    }

    #[test]
    fn test_lock_to_rails_honours_attach_distance() {
        let (nodes, rails, mut slides) = rig(&l_rail(), Vector3::new(2.0, 0.5, 1.5));
        assert_eq!(lock_to_rails(&mut slides, &[Some((0, 0.5))], &rails, &nodes), 1);
        assert_eq!(slides[0].segment, 1);
        assert_eq!(lock_to_rails(&mut slides, &[Some((0, 1.5))], &rails, &nodes), 0);
        assert!(!slides[0].locked);
        assert_eq!(lock_to_rails(&mut slides, &[None], &rails, &nodes), 0);
    }

    fn point() -> impl Strategy<Value = Vector3<f64>> {
        (-5.0f64..5.0, -5.0f64..5.0, -5.0f64..5.0).prop_map(|(x, y, z)| Vector3::new(x, y, z))
    }

    proptest! {
        #[test]
        fn test_locked_node_lies_on_segment(
            rail_points in prop::collection::vec(point(), 3..7),
            start in point(),
            moved in point(),
        ) {
            let (mut nodes, rails, mut slides) = rig(&rail_points, start);
            slides[0].attach_distance = f64::INFINITY;
            attach_slide_nodes(&mut slides, &rails, &nodes);
            prop_assert!(slides[0].locked);

            let free = nodes.len() - 1;
            nodes[free].position = moved;
            enforce_rail_constraints(&mut slides, &rails, &mut nodes);
            let error = rail_error(&slides[0], &rails, &nodes).unwrap();
            prop_assert!(error < 1e-4, "off rail by {}", error);
        }
    }
}
