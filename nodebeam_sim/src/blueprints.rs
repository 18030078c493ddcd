//! Procedural vehicle blueprints.
//!
//! The harness has no vehicle-file loader; these functions feed resolved
//! definitions straight into `TruckBuilder`. Every blueprint is a pure
//! function of its arguments, so two calls build identical vehicles (needed
//! for mirrors of replicated vehicles).

use nalgebra::Vector3;
use nodebeam_core::{BeamSpec, PhysicsError, Truck, TruckBuilder, TruckConfig};

/// Chassis grid of the lattice truck: X stations, Y levels, Z sides.
const CHASSIS_X: [f64; 3] = [-2.0, 0.0, 2.0];
const CHASSIS_Y: [f64; 2] = [0.5, 1.3];
const CHASSIS_Z: [f64; 2] = [-0.9, 0.9];

const WHEEL_RADIUS: f64 = 0.45;
const RIM_NODES: usize = 8;

/// Two nodes joined by one beam.
pub fn node_pair(center: Vector3<f64>, config: TruckConfig) -> Result<Truck, PhysicsError> {
    let mut b = TruckBuilder::new();
    let a = b.add_node(center - Vector3::new(0.5, 0.0, 0.0), 5.0);
    let c = b.add_node(center + Vector3::new(0.5, 0.0, 0.0), 5.0);
    b.add_beam(a, c, BeamSpec::new(2.0e5, 300.0))?;
    b.set_camera_nodes(a, c)?;
    b.build("node_pair", config)
}

/// Fully braced cube with a triangulated hull.
pub fn cube(center: Vector3<f64>, size: f64, node_mass: f64, config: TruckConfig) -> Result<Truck, PhysicsError> {
    let mut b = TruckBuilder::new();
    let h = size * 0.5;
    let mut n = [0usize; 8];
    for (i, slot) in n.iter_mut().enumerate() {
        let offset = Vector3::new(
            if i & 1 == 0 { -h } else { h },
            if i & 2 == 0 { -h } else { h },
            if i & 4 == 0 { -h } else { h },
        );
        *slot = b.add_node(center + offset, node_mass);
    }
    for i in 0..8 {
        for j in (i + 1)..8 {
            b.add_beam(n[i], n[j], BeamSpec::new(2.0e5, 500.0))?;
        }
    }
    for [p, q, r, s] in [[0, 1, 3, 2], [4, 6, 7, 5], [0, 4, 5, 1], [2, 3, 7, 6], [0, 2, 6, 4], [1, 5, 7, 3]] {
        quad(&mut b, [n[p], n[q], n[r], n[s]])?;
    }
    b.set_camera_nodes(n[0], n[1])?;
    b.build("cube", config)
}

/// Box-lattice truck on four braked wheels.
///
/// `base` is the point under the chassis centre where the tyres touch the
/// ground. The front bottom node carries a hook (group 0) that reaches the
/// front top node.
pub fn lattice_truck(base: Vector3<f64>, config: TruckConfig) -> Result<Truck, PhysicsError> {
    let mut b = TruckBuilder::new();
    let chassis_spec = BeamSpec::new(1.0e6, 2000.0).with_deform_threshold(2.0e5);
    let wheel_spec = BeamSpec::new(4.0e5, 400.0);

    let mut chassis = [[[0usize; 2]; 2]; 3];
    let mut placed = Vec::with_capacity(12);
    for (ix, x) in CHASSIS_X.iter().enumerate() {
        for (iy, y) in CHASSIS_Y.iter().enumerate() {
            for (iz, z) in CHASSIS_Z.iter().enumerate() {
                let p = base + Vector3::new(*x, *y, *z);
                chassis[ix][iy][iz] = b.add_node(p, 40.0);
                placed.push((chassis[ix][iy][iz], p));
            }
        }
    }
    // Brace every pair within one bay; skips only the end-to-end diagonals
    for (k, &(i, pi)) in placed.iter().enumerate() {
        for &(j, pj) in &placed[k + 1..] {
            if (pi - pj).norm() < 3.0 {
                b.add_beam(i, j, chassis_spec)?;
            }
        }
    }

    // Hull: top, bottom, both sides, both ends
    for ix in 0..2 {
        let c = &chassis;
        quad(&mut b, [c[ix][1][0], c[ix + 1][1][0], c[ix + 1][1][1], c[ix][1][1]])?;
        quad(&mut b, [c[ix][0][0], c[ix][0][1], c[ix + 1][0][1], c[ix + 1][0][0]])?;
        quad(&mut b, [c[ix][0][0], c[ix + 1][0][0], c[ix + 1][1][0], c[ix][1][0]])?;
        quad(&mut b, [c[ix][0][1], c[ix][1][1], c[ix + 1][1][1], c[ix + 1][0][1]])?;
    }
    for ix in [0, 2] {
        let c = &chassis;
        quad(&mut b, [c[ix][0][0], c[ix][1][0], c[ix][1][1], c[ix][0][1]])?;
    }

    for ix in [0, 2] {
        for (iz, side) in [-1.0, 1.0].iter().enumerate() {
            let center = base + Vector3::new(CHASSIS_X[ix], WHEEL_RADIUS, 1.25 * side);
            let inner = b.add_node(center - Vector3::new(0.0, 0.0, 0.2 * side), 10.0);
            let outer = b.add_node(center + Vector3::new(0.0, 0.0, 0.2 * side), 10.0);
            b.add_beam(inner, outer, chassis_spec)?;
            for axle in [inner, outer] {
                b.add_beam(axle, chassis[ix][0][iz], chassis_spec)?;
                b.add_beam(axle, chassis[ix][1][iz], chassis_spec)?;
                b.add_beam(axle, chassis[1][0][iz], chassis_spec)?;
            }

            let mut rim = Vec::with_capacity(RIM_NODES);
            for k in 0..RIM_NODES {
                let angle = k as f64 * std::f64::consts::TAU / RIM_NODES as f64;
                let offset = Vector3::new(angle.cos(), angle.sin(), 0.0) * WHEEL_RADIUS;
                rim.push(b.add_node(center + offset, 5.0));
            }
            for k in 0..RIM_NODES {
                b.add_beam(rim[k], rim[(k + 1) % RIM_NODES], wheel_spec)?;
                b.add_beam(rim[k], inner, wheel_spec)?;
                b.add_beam(rim[k], outer, wheel_spec)?;
            }
            b.add_wheel((inner, outer), rim, WHEEL_RADIUS, true)?;
        }
    }

    let front_bottom = chassis[2][0][0];
    let front_top = chassis[2][1][0];
    b.add_anchor(front_top)?;
    b.add_hook(front_bottom, 0, 1.0, BeamSpec::new(2.0e5, 200.0))?;
    b.set_camera_nodes(chassis[0][1][0], chassis[2][1][0])?;
    b.build("lattice_truck", config)
}

/// Locked anchor with a bob hanging on a rope that starts `slack` metres slack.
pub fn rope_pendulum(anchor: Vector3<f64>, length: f64, slack: f64, config: TruckConfig) -> Result<Truck, PhysicsError> {
    let mut b = TruckBuilder::new();
    let top = b.add_node(anchor, 1.0);
    b.lock_node(top)?;
    let bob = b.add_node(anchor - Vector3::new(0.0, length - slack, 0.0), 10.0);
    b.add_beam(top, bob, BeamSpec::new(1.0e5, 1000.0).rope().with_rest_length(length))?;
    b.build("rope_pendulum", config)
}

/// Locked anchor holding a weight on a beam weaker than its load.
pub fn hanging_weight(anchor: Vector3<f64>, strength: f64, config: TruckConfig) -> Result<Truck, PhysicsError> {
    let mut b = TruckBuilder::new();
    let top = b.add_node(anchor, 1.0);
    b.lock_node(top)?;
    let weight = b.add_node(anchor - Vector3::new(0.0, 1.0, 0.0), 10.0);
    b.add_beam(top, weight, BeamSpec::new(1.0e4, 50.0).with_strength(strength))?;
    b.build("hanging_weight", config)
}

/// Sloped three-node rail with one slide-node resting just above it.
///
/// The slide-node is unlocked; call `toggle_slide_node_lock` to attach it.
pub fn rail_cart(origin: Vector3<f64>, config: TruckConfig) -> Result<Truck, PhysicsError> {
    let mut b = TruckBuilder::new();
    let rail: Vec<usize> = [(-2.0, 1.5), (0.0, 1.25), (2.0, 1.0)]
        .iter()
        .map(|&(x, y)| b.add_node(origin + Vector3::new(x, y, 0.0), 1.0))
        .collect();
    for &n in &rail {
        b.lock_node(n)?.set_contacter(n, false)?;
    }
    let cart = b.add_node(origin + Vector3::new(-1.5, 1.4375 + 0.03, 0.0), 5.0);
    let rail_index = b.add_rail(rail)?;
    b.add_slide_node(cart, Some(rail_index), 0.5)?;
    b.build("rail_cart", config)
}

/// Two nodes whose beam is far too stiff for the sub-step; diverges at once.
pub fn unstable_pair(center: Vector3<f64>, config: TruckConfig) -> Result<Truck, PhysicsError> {
    let mut b = TruckBuilder::new();
    let a = b.add_node(center - Vector3::new(0.5, 0.0, 0.0), 1.0);
    let c = b.add_node(center + Vector3::new(0.5, 0.0, 0.0), 1.0);
    b.add_beam(a, c, BeamSpec::new(1.0e12, 0.0).with_rest_length(0.5))?;
    b.build("unstable_pair", config)
}

fn quad(b: &mut TruckBuilder, [p, q, r, s]: [usize; 4]) -> Result<(), PhysicsError> {
    b.add_collision_triangle([p, q, r])?;
    b.add_collision_triangle([p, r, s])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lattice_truck_layout() {
        let truck = lattice_truck(Vector3::zeros(), TruckConfig::default()).unwrap();
        // 12 chassis + 4 wheels of (2 axle + 8 rim)
        assert_eq!(truck.node_count(), 52);
        assert_eq!(truck.wheels().len(), 4);
        assert_eq!(truck.attachments().len(), 1);
        assert_eq!(truck.triangles().len(), 20);
        let lowest = truck.lowest_node().unwrap();
        assert_relative_eq!(truck.nodes()[lowest].position.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(truck.heading_direction_angle(), std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_blueprints_are_reproducible() {
        let a = lattice_truck(Vector3::new(3.0, 0.0, 1.0), TruckConfig::default()).unwrap();
        let b = lattice_truck(Vector3::new(3.0, 0.0, 1.0), TruckConfig::default()).unwrap();
        assert_eq!(a.node_positions(), b.node_positions());
        assert_eq!(a.beam_count(), b.beam_count());
    }

    #[test]
    fn test_rope_pendulum_starts_slack() {
        let truck = rope_pendulum(Vector3::new(0.0, 5.0, 0.0), 1.5, 0.5, TruckConfig::default()).unwrap();
        let beam = &truck.beams()[0];
        assert_relative_eq!(beam.rest_length, 1.5);
        let d = (truck.nodes()[1].position - truck.nodes()[0].position).norm();
        assert_relative_eq!(d, 1.0);
    }

    #[test]
    fn test_rail_cart_within_attach_range() {
        let truck = rail_cart(Vector3::zeros(), TruckConfig::default()).unwrap();
        assert_eq!(truck.rails().len(), 1);
        assert_eq!(truck.slide_nodes().len(), 1);
        assert!(!truck.nodes()[0].contacter);
    }
}
