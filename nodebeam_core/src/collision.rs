//! Collision Resolver - terrain penalty contact and node/triangle contact.
//!
//! Terrain contact queries [`TerrainQuery`] at each contacter node's world
//! position and applies a penalty force along the surface normal plus
//! regularised Stribeck friction from the matched ground model.
//!
//! Vehicle contact tests nodes against collision triangles inside a thin
//! shell (`contact_range`). Cross-vehicle pairs are evaluated only from
//! published [`CollisionProxy`] snapshots of the previous sub-step, and each
//! vehicle evaluates both directions of a pair (its nodes against the other's
//! triangles, the other's nodes against its triangles) applying only the
//! forces that land on its own nodes. Both vehicles therefore see the exact
//! same pair forces no matter which worker runs them.

use crate::config::CollisionConfig;
use crate::connectivity::Connectivity;
use crate::ground::{GroundModelId, TerrainQuery};
use crate::store::Node;
use nalgebra::Vector3;
use std::collections::HashMap;

// ============================================================================
// BOUNDING BOXES
// ============================================================================

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Aabb {
    /// An inverted box that contains nothing and grows on the first point.
    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f64::INFINITY),
            max: Vector3::repeat(f64::NEG_INFINITY),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vector3<f64>>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.grow(p);
        }
        aabb
    }

    pub fn grow(&mut self, p: &Vector3<f64>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min: self.min - Vector3::repeat(margin),
            max: self.max + Vector3::repeat(margin),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x
            && p.y >= self.min.y && p.y <= self.max.y
            && p.z >= self.min.z && p.z <= self.max.z
    }
}

// ============================================================================
// SPATIAL GRID
// ============================================================================

type CellKey = (i64, i64, i64);

/// Uniform hash grid of node indices. Cell vectors are kept between rebuilds.
#[derive(Debug, Clone)]
pub struct PointGrid {
    cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
}

/// Rebuilds with more live cells than this start from an empty map.
const MAX_RETAINED_CELLS: usize = 4096;

impl PointGrid {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: cell_size.max(1e-3),
            cells: HashMap::new(),
        }
    }

    #[inline]
    fn key(&self, p: &Vector3<f64>) -> CellKey {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }

    pub fn clear(&mut self) {
        if self.cells.len() > MAX_RETAINED_CELLS {
            self.cells.clear();
        } else {
            for cell in self.cells.values_mut() {
                cell.clear();
            }
        }
    }

    pub fn insert(&mut self, index: usize, p: &Vector3<f64>) {
        let key = self.key(p);
        self.cells.entry(key).or_default().push(index);
    }

    /// Collects indices stored in cells overlapping `bounds` into `out`.
    ///
    /// Cells are visited in ascending key order so the result is stable.
    pub fn query(&self, bounds: &Aabb, out: &mut Vec<usize>) {
        out.clear();
        if bounds.is_empty() {
            return;
        }
        let lo = self.key(&bounds.min);
        let hi = self.key(&bounds.max);
        for x in lo.0..=hi.0 {
            for y in lo.1..=hi.1 {
                for z in lo.2..=hi.2 {
                    if let Some(cell) = self.cells.get(&(x, y, z)) {
                        out.extend_from_slice(cell);
                    }
                }
            }
        }
    }
}

/// Per-vehicle reusable buffers for contact queries.
#[derive(Debug, Clone)]
pub struct ContactScratch {
    pub grid: PointGrid,
    candidates: Vec<usize>,
}

impl ContactScratch {
    pub fn new(cell_size: f64) -> Self {
        Self {
            grid: PointGrid::new(cell_size),
            candidates: Vec::new(),
        }
    }
}

// ============================================================================
// TERRAIN CONTACT
// ============================================================================

/// Outcome of one terrain pass over a vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TerrainReport {
    /// Nodes below the surface this sub-step
    pub contacts: usize,

    /// Nodes whose query returned no ground data
    pub off_map: usize,

    /// Nodes hard-clamped out of deep penetration
    pub clamped: usize,

    /// Ground model of the last node in contact
    pub last_model: Option<GroundModelId>,
}

/// Regularised Coulomb friction with a Stribeck coefficient, opposing `vt`.
///
/// The magnitude never exceeds what would stop the node in one sub-step.
fn friction_force(vt: &Vector3<f64>, mu: f64, normal_force: f64, mass: f64, dt: f64, reg: f64) -> Vector3<f64> {
    let speed = vt.norm();
    if speed < 1e-12 || normal_force <= 0.0 {
        return Vector3::zeros();
    }
    let magnitude = (mu * normal_force * (speed / reg.max(1e-6)).tanh()).min(mass * speed / dt);
    -vt * (magnitude / speed)
}

/// Applies terrain penalty and friction forces to every contacter node.
///
/// `origin` converts local positions to the world coordinates terrain is
/// queried in.
pub fn resolve_terrain(
    nodes: &mut [Node],
    terrain: &dyn TerrainQuery,
    origin: &Vector3<f64>,
    config: &CollisionConfig,
    dt: f64,
) -> TerrainReport {
    let mut report = TerrainReport::default();
    for node in nodes.iter_mut() {
        node.in_contact = false;
        if !node.contacter || node.locked {
            continue;
        }
        let world = node.position + origin;
        let Some(sample) = terrain.sample(world.x, world.z) else {
            node.off_map = true;
            report.off_map += 1;
            continue;
        };
        node.off_map = false;

        let n = sample.normal;
        let depth = (sample.height - world.y) * n.y;
        if depth <= 0.0 {
            continue;
        }
        node.in_contact = true;
        node.ground_model = Some(sample.model);
        report.contacts += 1;
        report.last_model = Some(sample.model);

        let model = terrain.ground_model(sample.model);
        let (bounce, stiffness_scale) = model.map(|m| (m.bounce, m.stiffness_scale)).unwrap_or((0.0, 1.0));

        if depth > config.max_penetration {
            node.position += n * depth;
            let vn = node.velocity.dot(&n);
            if vn < 0.0 {
                node.velocity -= n * vn;
            }
            report.clamped += 1;
            continue;
        }

        let vn = node.velocity.dot(&n);
        let normal_force = (config.ground_stiffness * stiffness_scale * depth
            - config.ground_damping * (1.0 - bounce) * vn)
            .max(0.0);
        node.force += n * normal_force;

        if let Some(model) = model {
            let vt = node.velocity - n * vn;
            let mu = model.effective_mu(vt.norm());
            node.force += friction_force(&vt, mu, normal_force, node.mass, dt, config.friction_regularization);
        }
    }
    report
}

// ============================================================================
// NODE / TRIANGLE CONTACT
// ============================================================================

/// Published, read-only state of one vehicle for cross-vehicle contact.
#[derive(Debug, Clone)]
pub struct CollisionProxy {
    /// Owning vehicle id
    pub owner: usize,

    /// Bounds of all contacter nodes and triangle vertices
    pub aabb: Aabb,

    pub positions: Vec<Vector3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    pub masses: Vec<f64>,

    /// Nodes that can touch other vehicles' triangles
    pub contacters: Vec<usize>,

    /// Collision surface
    pub triangles: Vec<[usize; 3]>,
}

impl CollisionProxy {
    /// Snapshots a vehicle's nodes. Triangles referencing missing nodes are dropped.
    pub fn capture(owner: usize, nodes: &[Node], triangles: &[[usize; 3]]) -> Self {
        let mut proxy = Self::empty(owner);
        proxy.refresh(nodes, triangles);
        proxy
    }

    /// A proxy that overlaps nothing.
    pub fn empty(owner: usize) -> Self {
        Self {
            owner,
            aabb: Aabb::empty(),
            positions: Vec::new(),
            velocities: Vec::new(),
            masses: Vec::new(),
            contacters: Vec::new(),
            triangles: Vec::new(),
        }
    }

    /// Re-captures in place, reusing the buffers.
    pub fn refresh(&mut self, nodes: &[Node], triangles: &[[usize; 3]]) {
        self.triangles.clear();
        self.triangles
            .extend(triangles.iter().copied().filter(|t| t.iter().all(|&i| i < nodes.len())));
        self.contacters.clear();
        self.contacters
            .extend(nodes.iter().enumerate().filter(|(_, n)| n.contacter).map(|(i, _)| i));
        self.positions.clear();
        self.positions.extend(nodes.iter().map(|n| n.position));
        self.velocities.clear();
        self.velocities.extend(nodes.iter().map(|n| n.velocity));
        self.masses.clear();
        self.masses.extend(nodes.iter().map(|n| n.mass));

        self.aabb = Aabb::empty();
        for &i in &self.contacters {
            self.aabb.grow(&self.positions[i]);
        }
        for t in &self.triangles {
            for &i in t {
                self.aabb.grow(&self.positions[i]);
            }
        }
    }

    /// Drops all state so the proxy overlaps nothing.
    pub fn clear(&mut self) {
        self.aabb = Aabb::empty();
        self.positions.clear();
        self.velocities.clear();
        self.masses.clear();
        self.contacters.clear();
        self.triangles.clear();
    }
}

/// Barycentric coordinates of `p` (assumed in-plane) in triangle `abc`.
fn barycentric(p: &Vector3<f64>, a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> Option<[f64; 3]> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-18 {
        return None;
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Some([1.0 - v - w, v, w])
}

/// One side of a node/triangle pair.
#[derive(Debug, Clone, Copy)]
pub struct ContactPoint {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub mass: f64,
}

/// Contact force on a node from a triangle, and the barycentric weights the
/// reaction is split by. `None` when the node is outside the contact shell.
pub fn node_triangle_contact(
    node: &ContactPoint,
    tri: &[Vector3<f64>; 3],
    tri_vel: &[Vector3<f64>; 3],
    config: &CollisionConfig,
    dt: f64,
) -> Option<(Vector3<f64>, [f64; 3])> {
    let normal = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
    let area2 = normal.norm();
    if area2 < 1e-12 {
        return None;
    }
    let n = normal / area2;
    let distance = (node.position - tri[0]).dot(&n);
    if distance.abs() >= config.contact_range {
        return None;
    }
    let projected = node.position - n * distance;
    let bary = barycentric(&projected, &tri[0], &tri[1], &tri[2])?;
    if bary.iter().any(|&w| w < 0.0) {
        return None;
    }

    let push = if distance >= 0.0 { n } else { -n };
    let penetration = config.contact_range - distance.abs();
    let surface_velocity = tri_vel[0] * bary[0] + tri_vel[1] * bary[1] + tri_vel[2] * bary[2];
    let relative = node.velocity - surface_velocity;
    let vn = relative.dot(&push);
    let normal_force = (config.contact_stiffness * penetration - config.contact_damping * vn).max(0.0);
    let vt = relative - push * vn;
    let friction = friction_force(
        &vt,
        config.contact_friction,
        normal_force,
        node.mass,
        dt,
        config.friction_regularization,
    );
    Some((push * normal_force + friction, bary))
}

/// Fills the grid with the proxy's contacters that fall inside `region`.
fn fill_grid(grid: &mut PointGrid, proxy: &CollisionProxy, region: &Aabb) {
    grid.clear();
    for &i in &proxy.contacters {
        let p = &proxy.positions[i];
        if region.contains(p) {
            grid.insert(i, p);
        }
    }
}

fn triangle_bounds(positions: &[Vector3<f64>], tri: &[usize; 3], margin: f64) -> Aabb {
    Aabb::from_points(tri.iter().map(|&i| &positions[i])).expanded(margin)
}

/// Evaluates every pair `nodes_of` x `triangles_of` and calls `apply` with the
/// node index, triangle, force on the node and barycentric weights.
fn for_each_pair(
    nodes_of: &CollisionProxy,
    triangles_of: &CollisionProxy,
    scratch: &mut ContactScratch,
    config: &CollisionConfig,
    dt: f64,
    mut apply: impl FnMut(usize, &[usize; 3], Vector3<f64>, [f64; 3]),
) -> usize {
    let margin = config.contact_range;
    fill_grid(&mut scratch.grid, nodes_of, &triangles_of.aabb.expanded(margin));
    let mut contacts = 0;
    for tri in &triangles_of.triangles {
        let bounds = triangle_bounds(&triangles_of.positions, tri, margin);
        scratch.grid.query(&bounds, &mut scratch.candidates);
        if scratch.candidates.is_empty() {
            continue;
        }
        let tp = [
            triangles_of.positions[tri[0]],
            triangles_of.positions[tri[1]],
            triangles_of.positions[tri[2]],
        ];
        let tv = [
            triangles_of.velocities[tri[0]],
            triangles_of.velocities[tri[1]],
            triangles_of.velocities[tri[2]],
        ];
        for &n in &scratch.candidates {
            let point = ContactPoint {
                position: nodes_of.positions[n],
                velocity: nodes_of.velocities[n],
                mass: nodes_of.masses[n],
            };
            if let Some((force, bary)) = node_triangle_contact(&point, &tp, &tv, config, dt) {
                apply(n, tri, force, bary);
                contacts += 1;
            }
        }
    }
    contacts
}

/// Cross-vehicle contact for `own` against every other published proxy.
///
/// Forces are added to `nodes`, the live store of `own.owner`. `others` must
/// be in a fixed order (ascending owner id) for reproducible summation.
pub fn resolve_vehicle_contacts(
    own: &CollisionProxy,
    others: &[CollisionProxy],
    nodes: &mut [Node],
    scratch: &mut ContactScratch,
    config: &CollisionConfig,
    dt: f64,
) -> usize {
    let mut contacts = 0;
    let own_bounds = own.aabb.expanded(config.contact_range);
    for other in others {
        if other.owner == own.owner || !own_bounds.overlaps(&other.aabb) {
            continue;
        }

        contacts += for_each_pair(own, other, scratch, config, dt, |n, _, force, _| {
            if let Some(node) = nodes.get_mut(n) {
                node.force += force;
            }
        });

        contacts += for_each_pair(other, own, scratch, config, dt, |_, tri, force, bary| {
            for (k, &i) in tri.iter().enumerate() {
                if let Some(node) = nodes.get_mut(i) {
                    node.force -= force * bary[k];
                }
            }
        });
    }
    contacts
}

/// Self contact between a vehicle's nodes and its own triangles.
///
/// Triangle vertices and their direct neighbours are excluded for each
/// triangle so a mesh never collides with its own connected structure.
pub fn resolve_self_contacts(
    nodes: &mut [Node],
    triangles: &[[usize; 3]],
    connectivity: &Connectivity,
    scratch: &mut ContactScratch,
    config: &CollisionConfig,
    dt: f64,
) -> usize {
    let margin = config.contact_range;
    scratch.grid.clear();
    for (i, node) in nodes.iter().enumerate() {
        if node.contacter {
            scratch.grid.insert(i, &node.position);
        }
    }

    let mut contacts = 0;
    for tri in triangles {
        if tri.iter().any(|&i| i >= nodes.len()) {
            continue;
        }
        let tp = [nodes[tri[0]].position, nodes[tri[1]].position, nodes[tri[2]].position];
        let tv = [nodes[tri[0]].velocity, nodes[tri[1]].velocity, nodes[tri[2]].velocity];
        let bounds = Aabb::from_points(tp.iter()).expanded(margin);
        scratch.grid.query(&bounds, &mut scratch.candidates);

        for &n in &scratch.candidates {
            let excluded = tri
                .iter()
                .any(|&t| t == n || connectivity.are_connected(t, n));
            if excluded {
                continue;
            }
            let point = ContactPoint {
                position: nodes[n].position,
                velocity: nodes[n].velocity,
                mass: nodes[n].mass,
            };
            if let Some((force, bary)) = node_triangle_contact(&point, &tp, &tv, config, dt) {
                nodes[n].force += force;
                for (k, &i) in tri.iter().enumerate() {
                    nodes[i].force -= force * bary[k];
                }
                contacts += 1;
            }
        }
    }
    contacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::ground::FlatGround;
    use crate::solver::{accumulate_body_forces, integrate};
    use crate::store::{BeamSpec, NodeBeamStore};
    use approx::assert_relative_eq;

    const DT: f64 = 0.0005;

    fn node_at(p: Vector3<f64>, mass: f64) -> Node {
        Node::new(p, mass)
    }

    #[test]
    fn test_aabb_overlap() {
        let a = Aabb::from_points([Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0)].iter());
        let b = Aabb::from_points([Vector3::new(0.5, 0.5, 0.5), Vector3::new(2.0, 2.0, 2.0)].iter());
        let c = Aabb::from_points([Vector3::new(3.0, 3.0, 3.0)].iter());
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!Aabb::empty().overlaps(&a));
        assert!(a.expanded(2.0).overlaps(&c));
    }

    #[test]
    fn test_grid_query_finds_neighbouring_cells() {
        let mut grid = PointGrid::new(1.0);
        grid.insert(0, &Vector3::new(0.5, 0.5, 0.5));
        grid.insert(1, &Vector3::new(1.5, 0.5, 0.5));
        grid.insert(2, &Vector3::new(9.5, 0.5, 0.5));
        let mut out = Vec::new();
        grid.query(&Aabb::from_points([Vector3::new(0.9, 0.0, 0.0), Vector3::new(1.1, 1.0, 1.0)].iter()), &mut out);
        assert_eq!(out, vec![0, 1]);

        grid.clear();
        grid.query(&Aabb::from_points([Vector3::new(0.0, 0.0, 0.0)].iter()).expanded(20.0), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_node_above_ground_untouched() {
        let mut nodes = vec![node_at(Vector3::new(0.0, 1.0, 0.0), 1.0)];
        let report = resolve_terrain(&mut nodes, &FlatGround::new(0.0), &Vector3::zeros(), &CollisionConfig::default(), DT);
        assert_eq!(report.contacts, 0);
        assert_eq!(nodes[0].force, Vector3::zeros());
        assert!(!nodes[0].in_contact);
    }

    #[test]
    fn test_penalty_proportional_to_depth() {
        let config = CollisionConfig::default();
        let mut nodes = vec![node_at(Vector3::new(0.0, -0.01, 0.0), 1.0)];
        let report = resolve_terrain(&mut nodes, &FlatGround::new(0.0), &Vector3::zeros(), &config, DT);
        assert_eq!(report.contacts, 1);
        assert_eq!(report.last_model, Some(GroundModelId(0)));
        assert_relative_eq!(nodes[0].force.y, config.ground_stiffness * 0.01, epsilon = 1e-6);
        assert_eq!(nodes[0].ground_model, Some(GroundModelId(0)));
    }

    #[test]
    fn test_origin_shifts_terrain_query() {
        // Local y = 0.5 but the frame origin sits 1 m lower: node is 0.5 m under
        let mut nodes = vec![node_at(Vector3::new(0.0, 0.5, 0.0), 1.0)];
        let config = CollisionConfig { max_penetration: 10.0, ..CollisionConfig::default() };
        let report = resolve_terrain(&mut nodes, &FlatGround::new(0.0), &Vector3::new(0.0, -1.0, 0.0), &config, DT);
        assert_eq!(report.contacts, 1);
    }

    #[test]
    fn test_off_map_node_flagged_and_free() {
        let ground = FlatGround::new(0.0).with_extent(1.0);
        let mut nodes = vec![node_at(Vector3::new(5.0, -1.0, 0.0), 1.0)];
        let report = resolve_terrain(&mut nodes, &ground, &Vector3::zeros(), &CollisionConfig::default(), DT);
        assert_eq!(report.off_map, 1);
        assert!(nodes[0].off_map);
        assert_eq!(nodes[0].force, Vector3::zeros());
    }

    #[test]
    fn test_deep_penetration_clamped() {
        let mut nodes = vec![node_at(Vector3::new(0.0, -2.0, 0.0), 1.0)];
        nodes[0].velocity = Vector3::new(1.0, -3.0, 0.0);
        let report = resolve_terrain(&mut nodes, &FlatGround::new(0.0), &Vector3::zeros(), &CollisionConfig::default(), DT);
        assert_eq!(report.clamped, 1);
        assert_relative_eq!(nodes[0].position.y, 0.0);
        assert_relative_eq!(nodes[0].velocity.y, 0.0);
        assert_relative_eq!(nodes[0].velocity.x, 1.0);
    }

    #[test]
    fn test_friction_never_reverses_sliding() {
        let mut nodes = vec![node_at(Vector3::new(0.0, -0.001, 0.0), 1.0)];
        nodes[0].velocity = Vector3::new(0.001, 0.0, 0.0);
        resolve_terrain(&mut nodes, &FlatGround::new(0.0), &Vector3::zeros(), &CollisionConfig::default(), DT);
        let dv = nodes[0].force.x * DT;
        assert!(dv <= 0.0);
        assert!(nodes[0].velocity.x + dv >= -1e-12);
    }

    #[test]
    fn test_terrain_settle_near_zero_penetration() {
        let solver = SolverConfig::default();
        let config = CollisionConfig::default();
        let ground = FlatGround::new(0.0);
        let mut store = NodeBeamStore::new();
        store.add_node(Vector3::new(0.0, 1.0, 0.0), 10.0);
        store.nodes_mut()[0].velocity = Vector3::new(0.0, -2.0, 0.0);

        for _ in 0..6000 {
            let nodes = store.nodes_mut();
            accumulate_body_forces(nodes, &solver);
            resolve_terrain(nodes, &ground, &Vector3::zeros(), &config, DT);
            integrate(nodes, DT, &solver).unwrap();
        }
        let node = &store.nodes()[0];
        assert!(node.position.y.abs() < 1e-3, "settled at {}", node.position.y);
        assert!(node.velocity.norm() < 1e-2);
    }

    fn floor_triangle() -> [Vector3<f64>; 3] {
        [Vector3::new(-1.0, 0.0, -1.0), Vector3::new(1.0, 0.0, -1.0), Vector3::new(0.0, 0.0, 1.0)]
    }

    #[test]
    fn test_node_triangle_shell() {
        let config = CollisionConfig::default();
        let tri = floor_triangle();
        let still = [Vector3::zeros(); 3];
        let inside = ContactPoint { position: Vector3::new(0.0, 0.02, 0.0), velocity: Vector3::zeros(), mass: 1.0 };
        let (force, bary) = node_triangle_contact(&inside, &tri, &still, &config, DT).unwrap();
        assert!(force.norm() > 0.0);
        assert_relative_eq!(bary.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(force.norm(), config.contact_stiffness * 0.03, epsilon = 1e-6);

        let far = ContactPoint { position: Vector3::new(0.0, 0.2, 0.0), ..inside };
        assert!(node_triangle_contact(&far, &tri, &still, &config, DT).is_none());
        let outside = ContactPoint { position: Vector3::new(5.0, 0.01, 0.0), ..inside };
        assert!(node_triangle_contact(&outside, &tri, &still, &config, DT).is_none());
    }

    fn plate(owner: usize, y: f64) -> (Vec<Node>, CollisionProxy) {
        let nodes = vec![
            node_at(Vector3::new(-1.0, y, -1.0), 1.0),
            node_at(Vector3::new(1.0, y, -1.0), 1.0),
            node_at(Vector3::new(0.0, y, 1.0), 1.0),
            node_at(Vector3::new(0.0, y + 0.03, 0.0), 1.0),
        ];
        let proxy = CollisionProxy::capture(owner, &nodes, &[[0, 1, 2]]);
        (nodes, proxy)
    }

    #[test]
    fn test_cross_vehicle_forces_are_equal_and_opposite() {
        let config = CollisionConfig::default();
        let (mut a_nodes, a) = plate(0, 0.0);
        let (mut b_nodes, b) = plate(1, 0.04);
        let proxies = vec![a.clone(), b.clone()];
        let mut scratch = ContactScratch::new(config.grid_cell_size);

        let ca = resolve_vehicle_contacts(&a, &proxies, &mut a_nodes, &mut scratch, &config, DT);
        let cb = resolve_vehicle_contacts(&b, &proxies, &mut b_nodes, &mut scratch, &config, DT);
        assert!(ca > 0);
        assert_eq!(ca, cb);

        let total_a: Vector3<f64> = a_nodes.iter().map(|n| n.force).sum();
        let total_b: Vector3<f64> = b_nodes.iter().map(|n| n.force).sum();
        assert_relative_eq!(total_a, -total_b, epsilon = 1e-9);
    }

    #[test]
    fn test_self_contact_skips_connected_nodes() {
        let config = CollisionConfig::default();
        let mut store = NodeBeamStore::new();
        store.add_node(Vector3::new(-1.0, 0.0, -1.0), 1.0);
        store.add_node(Vector3::new(1.0, 0.0, -1.0), 1.0);
        store.add_node(Vector3::new(0.0, 0.0, 1.0), 1.0);
        store.add_node(Vector3::new(0.0, 0.02, 0.0), 1.0);
        let triangles = [[0, 1, 2]];
        let mut scratch = ContactScratch::new(config.grid_cell_size);

        let graph = Connectivity::build(&store);
        let hits = resolve_self_contacts(store.nodes_mut(), &triangles, &graph, &mut scratch, &config, DT);
        assert_eq!(hits, 1);

        store.add_beam(0, 3, BeamSpec::new(10.0, 0.0)).unwrap();
        let graph = Connectivity::build(&store);
        for node in store.nodes_mut() {
            node.force = Vector3::zeros();
        }
        let hits = resolve_self_contacts(store.nodes_mut(), &triangles, &graph, &mut scratch, &config, DT);
        assert_eq!(hits, 0);
    }
}
