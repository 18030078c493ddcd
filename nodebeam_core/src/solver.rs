//! Force Solver - beam spring/damper forces, body forces, symplectic Euler.
//!
//! One sub-step accumulates every force into the node accumulators, then
//! [`integrate`] advances `v += F/m * dt; p += v * dt` and clears them. The
//! functions here work on borrowed slices of a single vehicle's store and
//! never allocate, so disjoint vehicles can be solved on different threads.

use crate::config::SolverConfig;
use crate::error::PhysicsError;
use crate::store::{Beam, BeamKind, BeamState, Node};
use nalgebra::Vector3;
use tracing::debug;

/// Lengths below this are treated as coincident nodes and exert no force.
const MIN_BEAM_LENGTH: f64 = 1e-9;

// ============================================================================
// REST LENGTHS
// ============================================================================

/// Rest length for the current actuator state.
///
/// Hydraulics scale the base length by `1 - ratio * hydro_state`; command
/// beams by `1 + command_ratio`. Everything else uses the base length.
#[inline]
pub fn effective_rest_length(beam: &Beam, hydro_state: f64) -> f64 {
    match beam.kind {
        BeamKind::Hydraulic { ratio } => beam.base_length * (1.0 - ratio * hydro_state),
        BeamKind::Command { .. } => beam.base_length * (1.0 + beam.command_ratio),
        BeamKind::Normal | BeamKind::Rope | BeamKind::Support => beam.base_length,
    }
}

/// Moves each command beam's ratio by its key inputs, clamped to its bounds.
///
/// `keys[i]` is the pressure on command key `i` in `0..=1`; unknown keys read 0.
pub fn update_command_beams(beams: &mut [Beam], keys: &[f64], dt: f64) {
    for beam in beams.iter_mut().filter(|b| b.is_active()) {
        if let BeamKind::Command { short_bound, long_bound, rate, short_key, long_key } = beam.kind {
            let short = keys.get(short_key).copied().unwrap_or(0.0);
            let long = keys.get(long_key).copied().unwrap_or(0.0);
            beam.command_ratio = (beam.command_ratio + rate * dt * (long - short)).clamp(-short_bound, long_bound);
        }
    }
}

/// Moves the hydraulic state toward `command` by at most `speed * dt`.
#[inline]
pub fn step_hydro_state(state: f64, command: f64, speed: f64, dt: f64) -> f64 {
    let max_step = speed * dt;
    state + (command - state).clamp(-max_step, max_step)
}

// ============================================================================
// BEAM FORCES
// ============================================================================

/// Signed axial force of a beam, positive in tension.
///
/// `dir` points from node 1 to node 2. Rope beams only pull, support beams
/// only push; either returns zero when slack.
pub fn beam_force(
    beam: &Beam,
    rest_length: f64,
    length: f64,
    relative_speed: f64,
    damping_scale: f64,
) -> f64 {
    let diff = length - rest_length;
    let force = beam.spring * diff + beam.damping * damping_scale * relative_speed;
    match beam.kind {
        BeamKind::Rope if diff < 0.0 => 0.0,
        BeamKind::Rope => force.max(0.0),
        BeamKind::Support if diff > 0.0 => 0.0,
        BeamKind::Support => force.min(0.0),
        _ => force,
    }
}

/// Accumulates the force of every active beam into its end nodes.
///
/// Beams whose |force| exceeds `strength` break and contribute nothing from
/// this sub-step on. Beams above their deform threshold yield plastically.
/// Returns the number of beams that broke during this call.
pub fn accumulate_beam_forces(
    nodes: &mut [Node],
    beams: &mut [Beam],
    config: &SolverConfig,
    hydro_state: f64,
) -> usize {
    let mut broken = 0;
    for (index, beam) in beams.iter_mut().enumerate() {
        if !beam.is_active() {
            beam.stress = 0.0;
            continue;
        }
        let (i, j) = (beam.node1, beam.node2);
        if i >= nodes.len() || j >= nodes.len() || i == j {
            continue;
        }

        let delta = nodes[j].position - nodes[i].position;
        let length = delta.norm();
        if length < MIN_BEAM_LENGTH {
            beam.stress = 0.0;
            continue;
        }
        let dir = delta / length;
        let relative_speed = (nodes[j].velocity - nodes[i].velocity).dot(&dir);

        let rest = effective_rest_length(beam, hydro_state);
        beam.rest_length = rest;
        let force = beam_force(beam, rest, length, relative_speed, config.global_damping_scale);
        let magnitude = force.abs();

        if magnitude > beam.strength {
            beam.state = BeamState::Broken;
            beam.stress = 0.0;
            broken += 1;
            debug!("Beam {} ({}-{}) broke at {:.1} N", index, i, j, magnitude);
            continue;
        }

        if magnitude > beam.deform_threshold && beam.spring > 0.0 {
            let yield_length = (magnitude - beam.deform_threshold) / beam.spring;
            let sign = if length >= rest { 1.0 } else { -1.0 };
            beam.base_length += sign * yield_length;
            beam.deform_threshold = magnitude;
            beam.state = BeamState::Deformed;
        }

        beam.stress = force;
        let f = dir * force;
        nodes[i].force += f;
        nodes[j].force -= f;
    }
    broken
}

// ============================================================================
// BODY FORCES
// ============================================================================

/// Gravity `m * g` plus quadratic drag `-c * rho * |v| * v` on every free node.
pub fn accumulate_body_forces(nodes: &mut [Node], config: &SolverConfig) {
    let drag = if config.disable_drag {
        0.0
    } else {
        config.node_drag_coefficient * config.air_density
    };
    for node in nodes.iter_mut().filter(|n| !n.locked) {
        node.force += config.gravity * node.mass;
        if drag > 0.0 {
            let speed = node.velocity.norm();
            node.force -= node.velocity * (drag * speed);
        }
    }
}

/// Spring pull `strength * (target - p)` on a single node.
pub fn accumulate_pull(node: &mut Node, target: Vector3<f64>, strength: f64) {
    node.force += (target - node.position) * strength;
}

// ============================================================================
// INTEGRATION
// ============================================================================

/// Symplectic Euler over all nodes, then clears the accumulators.
///
/// Locked nodes keep their position and have their velocity zeroed. A
/// non-finite or out-of-bounds result is reported as a numerical fault on
/// the first offending node; the state is left as computed.
pub fn integrate(nodes: &mut [Node], dt: f64, config: &SolverConfig) -> Result<(), PhysicsError> {
    let mut fault = None;
    for (index, node) in nodes.iter_mut().enumerate() {
        if node.locked {
            node.velocity = Vector3::zeros();
            node.force = Vector3::zeros();
            continue;
        }
        node.velocity += node.force * (node.inv_mass * dt);
        node.position += node.velocity * dt;
        node.force = Vector3::zeros();

        if fault.is_none() {
            fault = check_node(index, node, config);
        }
    }
    match fault {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn check_node(index: usize, node: &Node, config: &SolverConfig) -> Option<PhysicsError> {
    let p = &node.position;
    let v = &node.velocity;
    if !(p.iter().all(|x| x.is_finite()) && v.iter().all(|x| x.is_finite())) {
        return Some(PhysicsError::numerical(index, "non-finite state"));
    }
    if p.amax() > config.max_position {
        return Some(PhysicsError::numerical(index, format!("position {:.3e} m out of bounds", p.amax())));
    }
    if v.norm() > config.max_velocity {
        return Some(PhysicsError::numerical(index, format!("velocity {:.3e} m/s out of bounds", v.norm())));
    }
    None
}

// ============================================================================
// ENERGY
// ============================================================================

/// Total kinetic energy of the nodes.
pub fn kinetic_energy(nodes: &[Node]) -> f64 {
    nodes.iter().map(Node::kinetic_energy).sum()
}

/// Elastic energy ½k(len - rest)² stored in active beams.
pub fn spring_energy(nodes: &[Node], beams: &[Beam], hydro_state: f64) -> f64 {
    beams
        .iter()
        .filter(|b| b.is_active())
        .filter_map(|b| {
            let p1 = nodes.get(b.node1)?.position;
            let p2 = nodes.get(b.node2)?.position;
            let diff = (p2 - p1).norm() - effective_rest_length(b, hydro_state);
            let slack = match b.kind {
                BeamKind::Rope => diff < 0.0,
                BeamKind::Support => diff > 0.0,
                _ => false,
            };
            Some(if slack { 0.0 } else { 0.5 * b.spring * diff * diff })
        })
        .sum()
}
