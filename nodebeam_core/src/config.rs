//! Solver, collision, scheduler and replication parameters.
//!
//! Every struct deserializes from partial JSON: missing fields fall back to
//! the documented defaults.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Global parameters for the force solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Gravity vector in m/s² (default: -9.81 on Y, Y is up)
    pub gravity: Vector3<f64>,
    
    /// Multiplier applied to every beam damping coefficient (default: 1.0)
    pub global_damping_scale: f64,
    
    /// Air density proxy in kg/m³ used by node drag (default: 1.225)
    pub air_density: f64,
    
    /// Per-node drag area coefficient in m² (default: 0.0005)
    pub node_drag_coefficient: f64,
    
    /// Hydraulic actuator speed in state units per second (default: 1.0)
    pub hydro_speed: f64,
    
    /// Tie contraction speed in m/s (default: 0.5)
    pub tie_contract_rate: f64,
    
    /// Absolute position bound before a numerical fault is raised (default: 1e6 m)
    pub max_position: f64,
    
    /// Absolute velocity bound before a numerical fault is raised (default: 1e4 m/s)
    pub max_velocity: f64,
    
    /// Brake force per wheel at full pressure in N (default: 5000)
    pub brake_force: f64,
    
    /// Spring stiffness pulling slide-nodes toward their rail (default: 1e5 N/m)
    pub slide_node_stiffness: f64,
    
    /// Skip aerodynamic node drag entirely (default: false)
    pub disable_drag: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            global_damping_scale: 1.0,
            air_density: 1.225,
            node_drag_coefficient: 0.0005,
            hydro_speed: 1.0,
            tie_contract_rate: 0.5,
            max_position: 1.0e6,
            max_velocity: 1.0e4,
            brake_force: 5000.0,
            slide_node_stiffness: 1.0e5,
            disable_drag: false,
        }
    }
}

impl SolverConfig {
    /// A configuration with no gravity and no drag, for isolated tests.
    pub fn vacuum() -> Self {
        Self {
            gravity: Vector3::zeros(),
            node_drag_coefficient: 0.0,
            ..Self::default()
        }
    }
}

/// Contact parameters for terrain and vehicle-vehicle collisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Terrain penalty stiffness in N/m (default: 1e6)
    pub ground_stiffness: f64,
    
    /// Terrain normal damping in N·s/m (default: 2000)
    pub ground_damping: f64,
    
    /// Penetration beyond which a node is hard-clamped to the surface (default: 0.5 m)
    pub max_penetration: f64,
    
    /// Velocity below which friction is smoothed toward zero (default: 0.01 m/s)
    pub friction_regularization: f64,
    
    /// Node-to-triangle contact shell thickness (default: 0.05 m)
    pub contact_range: f64,
    
    /// Node-to-triangle penalty stiffness in N/m (default: 2e5)
    pub contact_stiffness: f64,
    
    /// Node-to-triangle normal damping in N·s/m (default: 500)
    pub contact_damping: f64,
    
    /// Friction coefficient between vehicles (default: 0.5)
    pub contact_friction: f64,
    
    /// Cell size of the node lookup grid (default: 0.5 m)
    pub grid_cell_size: f64,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            ground_stiffness: 1.0e6,
            ground_damping: 2000.0,
            max_penetration: 0.5,
            friction_regularization: 0.01,
            contact_range: 0.05,
            contact_stiffness: 2.0e5,
            contact_damping: 500.0,
            contact_friction: 0.5,
            grid_cell_size: 0.5,
        }
    }
}

/// Per-vehicle parameters handed to `TruckBuilder::build`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TruckConfig {
    pub solver: SolverConfig,
    
    pub collision: CollisionConfig,
    
    /// Position storage slots, numbered from 1 (default: 10)
    pub position_slots: usize,
    
    /// Replay frames kept (default: 200)
    pub replay_capacity: usize,
    
    /// Skip contacts between this vehicle's nodes and its own triangles (default: false)
    pub disable_self_collisions: bool,
    
    /// Skip contacts with other vehicles (default: false)
    pub disable_truck_truck_collisions: bool,
}

impl Default for TruckConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            collision: CollisionConfig::default(),
            position_slots: 10,
            replay_capacity: 200,
            disable_self_collisions: false,
            disable_truck_truck_collisions: false,
        }
    }
}

/// Parameters of the parallel step scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker threads (default: 2, minimum 1)
    pub workers: usize,
    
    /// Upper bound on sub-steps per frame; excess time is dropped (default: 200)
    pub max_substeps_per_frame: usize,
    
    /// Target sub-step size in seconds (default: 0.0005 = 2 kHz)
    pub substep_dt: f64,
    
    /// Distance from origin that triggers recentering, 0 disables (default: 0)
    pub floating_origin_threshold: f64,
    
    /// Seconds between replay captures (default: 0.1)
    pub replay_interval: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_substeps_per_frame: 200,
            substep_dt: 0.0005,
            floating_origin_threshold: 0.0,
            replay_interval: 0.1,
        }
    }
}

/// Smoothing parameters for networked vehicles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetSyncConfig {
    /// How far behind the newest snapshot playback runs (default: 0.1 s)
    pub interpolation_delay: f64,
    
    /// Extrapolation horizon past the newest snapshot before freezing (default: 0.5 s)
    pub max_extrapolation: f64,
    
    /// Playback lag beyond which the playout clock snaps forward (default: 1.0 s)
    pub resync_threshold: f64,
}

impl Default for NetSyncConfig {
    fn default() -> Self {
        Self {
            interpolation_delay: 0.1,
            max_extrapolation: 0.5,
            resync_threshold: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_solver_config_default() {
        let config = SolverConfig::default();
        assert_eq!(config.global_damping_scale, 1.0);
        assert_eq!(config.gravity.y, -9.81);
    }
    
    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SchedulerConfig = serde_json::from_str(r#"{ "workers": 4 }"#).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_substeps_per_frame, 200);
    }
    
    #[test]
    fn test_vacuum_has_no_external_forces() {
        let config = SolverConfig::vacuum();
        assert_eq!(config.gravity, Vector3::zeros());
        assert_eq!(config.node_drag_coefficient, 0.0);
    }
}
