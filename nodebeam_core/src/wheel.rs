//! Wheels: rim nodes spinning around a two-node axle, with friction brakes.

use crate::store::Node;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A wheel described by its axle nodes and rim nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wheel {
    /// Axle end nodes
    pub axle: (usize, usize),

    /// Rim (tyre contact) nodes
    pub rim: Vec<usize>,

    /// Rolling radius in metres
    pub radius: f64,

    /// Responds to the service brake
    pub braked: bool,
}

/// Axle frame of a wheel: centre, centre velocity and unit axis.
fn axle_frame(wheel: &Wheel, nodes: &[Node]) -> Option<(Vector3<f64>, Vector3<f64>, Vector3<f64>)> {
    let a = nodes.get(wheel.axle.0)?;
    let b = nodes.get(wheel.axle.1)?;
    let axis = b.position - a.position;
    let len = axis.norm();
    if len < 1e-9 {
        return None;
    }
    Some((
        (a.position + b.position) * 0.5,
        (a.velocity + b.velocity) * 0.5,
        axis / len,
    ))
}

/// Decomposes a rim node's motion relative to the axle.
///
/// Returns the signed tangential speed about the axis, the tangential
/// velocity vector and the radial distance.
fn rim_motion(
    node: &Node,
    center: &Vector3<f64>,
    center_velocity: &Vector3<f64>,
    axis: &Vector3<f64>,
) -> Option<(f64, Vector3<f64>, f64)> {
    let mut radial = node.position - center;
    radial -= axis * radial.dot(axis);
    let r = radial.norm();
    if r < 1e-9 {
        return None;
    }
    let radial_dir = radial / r;
    let spin_dir = axis.cross(&radial_dir);
    let relative = node.velocity - center_velocity;
    let speed = relative.dot(&spin_dir);
    Some((speed, spin_dir * speed, r))
}

/// Signed rim speed in m/s, scaled to the wheel's rolling radius.
pub fn wheel_speed(wheel: &Wheel, nodes: &[Node]) -> f64 {
    let Some((center, center_velocity, axis)) = axle_frame(wheel, nodes) else {
        return 0.0;
    };
    let mut sum = 0.0;
    let mut count = 0usize;
    for &i in &wheel.rim {
        let Some(node) = nodes.get(i) else { continue };
        if let Some((speed, _, r)) = rim_motion(node, &center, &center_velocity, &axis) {
            sum += speed / r * wheel.radius;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Applies braking torque as tangential forces on rim nodes, reacted on the axle.
///
/// `brake` is the pressure in `0..=1` and `force` the full-pressure force per
/// wheel. A rim node's brake force never exceeds what would stop its
/// relative spin within one sub-step.
pub fn apply_brake(wheel: &Wheel, nodes: &mut [Node], brake: f64, force: f64, dt: f64) {
    if brake <= 0.0 || wheel.rim.is_empty() {
        return;
    }
    let Some((center, center_velocity, axis)) = axle_frame(wheel, nodes) else {
        return;
    };
    let per_node = force * brake.min(1.0) / wheel.rim.len() as f64;
    for &i in &wheel.rim {
        let Some(node) = nodes.get(i) else { continue };
        let Some((speed, tangential, _)) = rim_motion(node, &center, &center_velocity, &axis) else {
            continue;
        };
        let magnitude = speed.abs();
        if magnitude < 1e-9 {
            continue;
        }
        let f = -tangential / magnitude * per_node.min(node.mass * magnitude / dt);
        nodes[i].force += f;
        nodes[wheel.axle.0].force -= f * 0.5;
        nodes[wheel.axle.1].force -= f * 0.5;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Axle along Z through the origin, four rim nodes spinning at `omega`.
    fn spinning(omega: f64) -> (Wheel, Vec<Node>) {
        let mut nodes = vec![
            Node::new(Vector3::new(0.0, 0.0, -0.1), 1.0),
            Node::new(Vector3::new(0.0, 0.0, 0.1), 1.0),
        ];
        let axis = Vector3::z();
        for k in 0..4 {
            let angle = k as f64 * std::f64::consts::FRAC_PI_2;
            let radial = Vector3::new(angle.cos(), angle.sin(), 0.0) * 0.5;
            let mut node = Node::new(radial, 1.0);
            node.velocity = axis.cross(&radial) * omega;
            nodes.push(node);
        }
        let wheel = Wheel { axle: (0, 1), rim: vec![2, 3, 4, 5], radius: 0.5, braked: true };
        (wheel, nodes)
    }

    #[test]
    fn test_wheel_speed_from_spin() {
        let (wheel, nodes) = spinning(4.0);
        assert_relative_eq!(wheel_speed(&wheel, &nodes), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_brake_opposes_spin_and_balances() {
        let (wheel, mut nodes) = spinning(4.0);
        apply_brake(&wheel, &mut nodes, 1.0, 400.0, 0.0005);
        let total: Vector3<f64> = nodes.iter().map(|n| n.force).sum();
        assert_relative_eq!(total, Vector3::zeros(), epsilon = 1e-9);

        let rim_velocity = nodes[2].velocity;
        assert!(nodes[2].force.dot(&rim_velocity) < 0.0);
        assert_relative_eq!(nodes[2].force.norm(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_brake_clamped_near_standstill() {
        let (wheel, mut nodes) = spinning(0.0001);
        apply_brake(&wheel, &mut nodes, 1.0, 1.0e6, 0.0005);
        // 1 kg at 5e-5 m/s stops within one sub-step with 0.1 N
        assert_relative_eq!(nodes[2].force.norm(), 0.1, epsilon = 1e-9);
    }
}
