//! Truck - one soft-body vehicle: its node/beam store plus everything that
//! acts on it during a sub-step.
//!
//! Control setters only write pending command state; it is latched at the
//! start of the next sub-step. Inspection accessors read state between steps.
//! A truck is either simulated locally, driven from replicated network state,
//! or faulted (frozen until [`Truck::reset`]).

use crate::attachment::{self, Attachment, AttachmentKind};
use crate::collision::{
    resolve_self_contacts, resolve_terrain, resolve_vehicle_contacts, CollisionProxy, ContactScratch,
};
use crate::config::{CollisionConfig, NetSyncConfig, SolverConfig, TruckConfig};
use crate::connectivity::Connectivity;
use crate::error::PhysicsError;
use crate::ground::{GroundModelId, TerrainQuery};
use crate::netsync::{NetworkSync, PacketOutcome, SyncStatus};
use crate::replay::ReplayBuffer;
use crate::slidenode::{
    self, apply_rail_forces, detach_slide_nodes, enforce_rail_constraints, RailGroup, SlideNode,
};
use crate::snapshot::{BlinkType, LightState, NodeStateFrame, StateSnapshot};
use crate::solver::{
    accumulate_beam_forces, accumulate_body_forces, accumulate_pull, integrate, step_hydro_state, update_command_beams,
};
use crate::storage::PositionStorage;
use crate::store::{Beam, Node, NodeBeamStore};
use crate::wheel::{self, Wheel};
use nalgebra::Vector3;
use nodebeam_env::{StatePacketEnvelope, StreamId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Brake pressure above which the brake lights show.
const BRAKE_LIGHT_THRESHOLD: f64 = 0.15;

/// Highest command key index accepted by [`Truck::set_command_key`].
pub const MAX_COMMAND_KEYS: usize = 128;

/// Smoothing factor of the g-force estimate per sub-step.
const G_FORCE_SMOOTHING: f64 = 0.01;

const STANDARD_GRAVITY: f64 = 9.81;

// ============================================================================
// TYPES
// ============================================================================

/// Scheduler-assigned vehicle identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct VehicleId(pub usize);

impl std::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who drives the vehicle's nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimState {
    /// Local force solver
    Simulated,
    /// Replicated state from a remote simulator
    Networked,
    /// Frozen after a numerical or worker fault
    Faulted(String),
}

/// Nodes defining the vehicle's forward direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraNodes {
    pub reference: usize,
    pub direction: usize,
}

/// Validated pieces handed over by the builder.
#[derive(Debug, Clone)]
pub(crate) struct TruckParts {
    pub store: NodeBeamStore,
    pub wheels: Vec<Wheel>,
    pub rails: Vec<RailGroup>,
    pub slide_nodes: Vec<SlideNode>,
    pub triangles: Vec<[usize; 3]>,
    pub attachments: Vec<Attachment>,
    pub anchors: Vec<usize>,
    pub camera: Option<CameraNodes>,
}

/// Continuous command state.
#[derive(Debug, Clone, Default, PartialEq)]
struct Controls {
    brake: f64,
    parking_brake: bool,
    hydro_command: f64,
    command_keys: Vec<f64>,
}

/// Discrete commands applied at the start of the next sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    Attachment(AttachmentKind, i32),
    SlideNodeLock,
}

#[derive(Debug, Clone, Copy)]
struct MouseGrab {
    node: usize,
    target: Vector3<f64>,
    force: f64,
}

/// Counters accumulated over the vehicle's lifetime (reset clears them).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TruckStats {
    pub substeps: u64,
    pub broken_beams: usize,
    pub terrain_contacts: usize,
    pub vehicle_contacts: usize,
    pub self_contacts: usize,
}

// ============================================================================
// TRUCK
// ============================================================================

#[derive(Debug)]
pub struct Truck {
    id: VehicleId,
    name: String,
    state: SimState,

    store: NodeBeamStore,
    connectivity: Connectivity,
    solver: SolverConfig,
    collision: CollisionConfig,

    spawn_positions: Vec<Vector3<f64>>,
    spawn_beams: Vec<Beam>,

    wheels: Vec<Wheel>,
    rails: Vec<RailGroup>,
    slide_nodes: Vec<SlideNode>,
    slide_nodes_locked: bool,
    triangles: Vec<[usize; 3]>,
    attachments: Vec<Attachment>,
    anchors: Vec<usize>,
    camera: Option<CameraNodes>,

    pending: Controls,
    active: Controls,
    toggles: Vec<Toggle>,
    hydro_state: f64,
    lights: LightState,
    mouse: Option<MouseGrab>,

    disable_self_collisions: bool,
    disable_truck_truck_collisions: bool,
    scratch: ContactScratch,
    off_map: bool,
    last_fuzzy_ground_model: Option<GroundModelId>,

    /// World position of the local frame's zero
    origin: Vector3<f64>,

    storage: PositionStorage,
    replay: ReplayBuffer,
    replay_mode: bool,
    replay_position: usize,
    replay_live: Vec<Vector3<f64>>,

    netsync: Option<NetworkSync>,
    reset_request: Option<bool>,

    mean_velocity: Vector3<f64>,
    g_forces: Vector3<f64>,
    stats: TruckStats,
}

impl Truck {
    pub(crate) fn from_parts(name: String, parts: TruckParts, config: TruckConfig) -> Self {
        let spawn_positions = parts.store.nodes().iter().map(|n| n.position).collect();
        let spawn_beams = parts.store.beams().to_vec();
        let connectivity = Connectivity::build(&parts.store);
        let mut store = parts.store;
        store.clear_connectivity_dirty();
        let mut slide_nodes = parts.slide_nodes;
        slidenode::reset_slide_nodes(&mut slide_nodes, &parts.rails, store.nodes());

        Self {
            id: VehicleId::default(),
            name,
            state: SimState::Simulated,
            store,
            connectivity,
            scratch: ContactScratch::new(config.collision.grid_cell_size),
            solver: config.solver,
            collision: config.collision,
            spawn_positions,
            spawn_beams,
            wheels: parts.wheels,
            rails: parts.rails,
            slide_nodes,
            slide_nodes_locked: false,
            triangles: parts.triangles,
            attachments: parts.attachments,
            anchors: parts.anchors,
            camera: parts.camera,
            pending: Controls::default(),
            active: Controls::default(),
            toggles: Vec::new(),
            hydro_state: 0.0,
            lights: LightState::default(),
            mouse: None,
            disable_self_collisions: config.disable_self_collisions,
            disable_truck_truck_collisions: config.disable_truck_truck_collisions,
            off_map: false,
            last_fuzzy_ground_model: None,
            origin: Vector3::zeros(),
            storage: PositionStorage::new(config.position_slots),
            replay: ReplayBuffer::new(config.replay_capacity, 0.0),
            replay_mode: false,
            replay_position: 0,
            replay_live: Vec::new(),
            netsync: None,
            reset_request: None,
            mean_velocity: Vector3::zeros(),
            g_forces: Vector3::zeros(),
            stats: TruckStats::default(),
        }
    }

    pub(crate) fn set_id(&mut self, id: VehicleId) {
        self.id = id;
    }

    pub(crate) fn set_origin(&mut self, origin: Vector3<f64>) {
        self.origin = origin;
    }

    pub(crate) fn set_replay_interval(&mut self, interval: f64) {
        let capacity = self.replay.capacity();
        self.replay = ReplayBuffer::new(capacity, interval);
    }

    // ===== STEPPING =====

    /// Advances the vehicle by one sub-step.
    ///
    /// `proxies` are the published collision snapshots of every vehicle,
    /// ordered by id and including this one. A numerical fault freezes the
    /// vehicle and is returned to the caller.
    pub fn substep(&mut self, dt: f64, terrain: &dyn TerrainQuery, proxies: &[CollisionProxy]) -> Result<(), PhysicsError> {
        match self.state {
            SimState::Faulted(_) => return Ok(()),
            SimState::Networked => return self.follow_network(dt),
            SimState::Simulated => {}
        }
        if self.replay_mode {
            return Ok(());
        }

        let result = self.begin_substep().and_then(|_| self.solve(dt, terrain, proxies));
        match result {
            Ok(()) => {
                self.stats.substeps += 1;
                Ok(())
            }
            Err(err) => {
                if err.is_fatal_to_vehicle() {
                    self.mark_faulted(err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Latches pending commands, applies queued toggles, refreshes connectivity.
    fn begin_substep(&mut self) -> Result<(), PhysicsError> {
        self.active.clone_from(&self.pending);
        let toggles = std::mem::take(&mut self.toggles);
        for toggle in toggles {
            self.apply_toggle(toggle)?;
        }
        if self.store.connectivity_dirty() {
            self.connectivity.rebuild(&self.store);
            self.store.clear_connectivity_dirty();
        }
        Ok(())
    }

    fn apply_toggle(&mut self, toggle: Toggle) -> Result<(), PhysicsError> {
        match toggle {
            Toggle::Attachment(kind, group) => {
                let attached = attachment::toggle(&mut self.attachments, &mut self.store, &self.anchors, kind, group)?;
                debug!("Vehicle {} {:?} group {}: {} attached", self.id, kind, group, attached);
            }
            Toggle::SlideNodeLock => {
                if self.slide_nodes_locked {
                    detach_slide_nodes(&mut self.slide_nodes);
                    self.slide_nodes_locked = false;
                } else {
                    let locked = self.lock_slide_nodes()?;
                    self.slide_nodes_locked = true;
                    debug!("Vehicle {} locked {} slide-nodes", self.id, locked);
                }
            }
        }
        Ok(())
    }

    fn solve(&mut self, dt: f64, terrain: &dyn TerrainQuery, proxies: &[CollisionProxy]) -> Result<(), PhysicsError> {
        let brake = if self.active.parking_brake { 1.0 } else { self.active.brake };
        self.hydro_state = step_hydro_state(self.hydro_state, self.active.hydro_command, self.solver.hydro_speed, dt);
        update_command_beams(self.store.beams_mut(), &self.active.command_keys, dt);
        attachment::contract_ties(&self.attachments, &mut self.store, self.solver.tie_contract_rate, dt);

        let (nodes, beams) = self.store.split_mut();
        let broken = accumulate_beam_forces(nodes, beams, &self.solver, self.hydro_state);
        accumulate_body_forces(nodes, &self.solver);

        if let Some(grab) = self.mouse {
            if let Some(node) = nodes.get_mut(grab.node) {
                accumulate_pull(node, grab.target, grab.force);
            }
        }
        if brake > 0.0 {
            for wheel in self.wheels.iter().filter(|w| w.braked) {
                wheel::apply_brake(wheel, nodes, brake, self.solver.brake_force, dt);
            }
        }
        if self.slide_nodes_locked {
            apply_rail_forces(&self.slide_nodes, &self.rails, nodes, self.solver.slide_node_stiffness);
        }

        let terrain_report = resolve_terrain(nodes, terrain, &self.origin, &self.collision, dt);
        if !self.disable_truck_truck_collisions {
            if let Some(own) = proxies.iter().find(|p| p.owner == self.id.0) {
                self.stats.vehicle_contacts +=
                    resolve_vehicle_contacts(own, proxies, nodes, &mut self.scratch, &self.collision, dt);
            }
        }
        if !self.disable_self_collisions && !self.triangles.is_empty() {
            self.stats.self_contacts += resolve_self_contacts(
                nodes,
                &self.triangles,
                &self.connectivity,
                &mut self.scratch,
                &self.collision,
                dt,
            );
        }

        integrate(nodes, dt, &self.solver)?;
        if self.slide_nodes_locked {
            enforce_rail_constraints(&mut self.slide_nodes, &self.rails, nodes);
        }

        if broken > 0 {
            self.stats.broken_beams += broken;
            self.store.mark_connectivity_dirty();
        }
        self.stats.terrain_contacts += terrain_report.contacts;
        if terrain_report.last_model.is_some() {
            self.last_fuzzy_ground_model = terrain_report.last_model;
        }
        let off_map = terrain_report.off_map > 0;
        if off_map && !self.off_map {
            warn!("Vehicle {} is off-map ({} nodes without ground data)", self.id, terrain_report.off_map);
        }
        self.off_map = off_map;
        self.update_g_forces(dt);
        Ok(())
    }

    fn update_g_forces(&mut self, dt: f64) {
        let mass = self.store.total_mass(true);
        if mass <= 0.0 || dt <= 0.0 {
            return;
        }
        let momentum: Vector3<f64> = self.store.nodes().iter().map(|n| n.velocity * n.mass).sum();
        let mean_velocity = momentum / mass;
        let acceleration = (mean_velocity - self.mean_velocity) / dt;
        self.mean_velocity = mean_velocity;
        self.g_forces += (acceleration / STANDARD_GRAVITY - self.g_forces) * G_FORCE_SMOOTHING;
    }

    fn follow_network(&mut self, dt: f64) -> Result<(), PhysicsError> {
        let Some(sync) = self.netsync.as_mut() else {
            return Ok(());
        };
        if sync.advance(dt) == SyncStatus::Waiting {
            return Ok(());
        }
        sync.write_nodes(self.store.nodes_mut(), &self.origin)
    }

    /// Freezes the vehicle until reset.
    pub fn mark_faulted(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Vehicle {} ({}) faulted: {}", self.id, self.name, reason);
        self.state = SimState::Faulted(reason);
    }

    /// Read-only snapshot for other vehicles' contact queries.
    ///
    /// Faulted vehicles and vehicles with truck-truck collisions disabled
    /// publish nothing.
    pub fn collision_proxy(&self) -> Option<CollisionProxy> {
        if matches!(self.state, SimState::Faulted(_)) || self.disable_truck_truck_collisions {
            return None;
        }
        Some(CollisionProxy::capture(self.id.0, self.store.nodes(), &self.triangles))
    }

    /// Same as [`Truck::collision_proxy`], refreshing an existing proxy in place.
    pub fn publish_proxy(&self, proxy: &mut CollisionProxy) {
        proxy.owner = self.id.0;
        if matches!(self.state, SimState::Faulted(_)) || self.disable_truck_truck_collisions {
            proxy.clear();
        } else {
            proxy.refresh(self.store.nodes(), &self.triangles);
        }
    }

    /// Post-frame replay capture; `frame_dt` is the simulated time just advanced.
    pub fn capture_replay(&mut self, frame_dt: f64) -> bool {
        if self.state != SimState::Simulated || self.replay_mode {
            return false;
        }
        self.replay.tick(frame_dt, self.store.nodes().iter().map(|n| &n.position))
    }

    // ===== RESET & POSITIONING =====

    /// Queues a reset, applied once after the current frame.
    pub fn request_reset(&mut self, keep_position: bool) {
        self.reset_request = Some(keep_position);
    }

    pub fn take_reset_request(&mut self) -> Option<bool> {
        self.reset_request.take()
    }

    /// Restores the spawn state: positions (optionally kept where the vehicle
    /// stands now), repaired beams, zero motion, released attachments, and a
    /// cleared fault.
    pub fn reset(&mut self, keep_position: bool) -> Result<(), PhysicsError> {
        let shift = if keep_position {
            let now = self.store.centroid();
            let spawn = centroid(&self.spawn_positions);
            Vector3::new(now.x - spawn.x, 0.0, now.z - spawn.z)
        } else {
            Vector3::zeros()
        };

        self.store.restore_beams(&self.spawn_beams)?;
        for attachment in &mut self.attachments {
            attachment.target = None;
        }
        for (node, spawn) in self.store.nodes_mut().iter_mut().zip(&self.spawn_positions) {
            node.position = spawn + shift;
            node.in_contact = false;
            node.off_map = false;
            node.ground_model = None;
        }
        self.store.clear_motion();
        self.connectivity.rebuild(&self.store);
        self.store.clear_connectivity_dirty();

        self.hydro_state = 0.0;
        self.mouse = None;
        self.toggles.clear();
        self.pending = Controls::default();
        self.active = Controls::default();
        self.off_map = false;
        self.replay_mode = false;
        self.mean_velocity = Vector3::zeros();
        self.g_forces = Vector3::zeros();
        if matches!(self.state, SimState::Faulted(_)) {
            self.state = SimState::Simulated;
        }
        self.refresh_slide_nodes()?;
        debug!("Vehicle {} reset (keep_position={})", self.id, keep_position);
        Ok(())
    }

    /// Locks each slide-node onto the closest of this vehicle's own rails.
    fn lock_slide_nodes(&mut self) -> Result<usize, PhysicsError> {
        let choices = (0..self.slide_nodes.len())
            .map(|i| self.closest_rail_on_truck(self, i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(slidenode::lock_to_rails(&mut self.slide_nodes, &choices, &self.rails, self.store.nodes()))
    }

    fn refresh_slide_nodes(&mut self) -> Result<(), PhysicsError> {
        if self.slide_nodes_locked {
            self.lock_slide_nodes()?;
        } else {
            slidenode::reset_slide_nodes(&mut self.slide_nodes, &self.rails, self.store.nodes());
        }
        Ok(())
    }

    /// Recomputes every slide-node's rail attachment from its current position.
    pub fn reset_slide_nodes(&mut self) {
        slidenode::reset_slide_nodes(&mut self.slide_nodes, &self.rails, self.store.nodes());
    }

    /// Moves the vehicle so its centroid sits above `target` (X/Z) and its
    /// lowest node at `target.y`; the new pose becomes the spawn pose.
    pub fn reset_position(&mut self, target: Vector3<f64>) -> Result<(), PhysicsError> {
        let Some(lowest) = self.lowest_node() else { return Ok(()) };
        let lowest_y = self.store.nodes()[lowest].position.y;
        let c = self.store.centroid();
        let shift = Vector3::new(target.x - c.x, target.y - lowest_y, target.z - c.z);
        self.store.translate(shift);
        self.store.clear_motion();
        self.spawn_positions = self.store.nodes().iter().map(|n| n.position).collect();
        self.refresh_slide_nodes()
    }

    /// Shifts the local frame by `offset` (floating-origin recentering).
    pub fn move_origin(&mut self, offset: Vector3<f64>) {
        self.store.translate(offset);
        for p in self.spawn_positions.iter_mut().chain(self.replay_live.iter_mut()) {
            *p += offset;
        }
        self.storage.translate(&offset);
        self.replay.translate(&offset);
        if let Some(grab) = self.mouse.as_mut() {
            grab.target += offset;
        }
        self.origin -= offset;
    }

    // ===== POSITION STORAGE & REPLAY =====

    pub fn save_position(&mut self, slot: usize) -> Result<(), PhysicsError> {
        self.storage.save(slot, &self.store)
    }

    /// Restores a saved pose with zero velocities and forces.
    pub fn load_position(&mut self, slot: usize) -> Result<(), PhysicsError> {
        self.storage.load(slot, &mut self.store)?;
        self.mean_velocity = Vector3::zeros();
        self.reset_slide_nodes();
        Ok(())
    }

    pub fn position_storage(&self) -> &PositionStorage {
        &self.storage
    }

    /// Entering replay freezes physics; leaving restores the live pose.
    pub fn set_replay_mode(&mut self, on: bool) {
        if on == self.replay_mode {
            return;
        }
        if on {
            self.replay_live.clear();
            self.replay_live.extend(self.store.nodes().iter().map(|n| n.position));
            self.replay_position = 0;
        } else {
            for (node, p) in self.store.nodes_mut().iter_mut().zip(&self.replay_live) {
                node.position = *p;
            }
        }
        self.replay_mode = on;
    }

    /// Shows the frame `steps_back` captures ago, clamped to the oldest one.
    pub fn set_replay_position(&mut self, steps_back: usize) -> usize {
        if !self.replay_mode || self.replay.is_empty() {
            return 0;
        }
        let position = steps_back.min(self.replay.len() - 1);
        if let Some(frame) = self.replay.frame(position) {
            for (node, p) in self.store.nodes_mut().iter_mut().zip(frame) {
                node.position = *p;
            }
        }
        self.replay_position = position;
        position
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    // ===== NETWORK =====

    /// Switches to replicated state from `stream`; the local solver stops.
    pub fn set_networked(&mut self, stream: StreamId, config: NetSyncConfig) {
        self.netsync = Some(NetworkSync::new(stream, self.store.node_count(), config));
        self.store.clear_motion();
        self.state = SimState::Networked;
    }

    pub fn set_simulated(&mut self) {
        self.netsync = None;
        self.state = SimState::Simulated;
    }

    pub fn push_network_packet(&mut self, envelope: &StatePacketEnvelope) -> Result<PacketOutcome, PhysicsError> {
        self.netsync.as_mut().ok_or(PhysicsError::NotNetworked)?.push_packet(envelope)
    }

    pub fn network_sync(&self) -> Option<&NetworkSync> {
        self.netsync.as_ref()
    }

    // ===== CONTROL API =====

    pub fn set_brake(&mut self, brake: f64) {
        self.pending.brake = brake.clamp(0.0, 1.0);
    }

    /// Steering command in `-1..=1`; hydraulics follow at the actuator speed.
    pub fn set_hydro_direction_command(&mut self, command: f64) {
        self.pending.hydro_command = command.clamp(-1.0, 1.0);
    }

    pub fn set_command_key(&mut self, key: usize, value: f64) -> Result<(), PhysicsError> {
        if key >= MAX_COMMAND_KEYS {
            return Err(PhysicsError::InvalidDefinition(format!("command key {} out of range", key)));
        }
        if self.pending.command_keys.len() <= key {
            self.pending.command_keys.resize(key + 1, 0.0);
        }
        self.pending.command_keys[key] = value.clamp(0.0, 1.0);
        Ok(())
    }

    pub fn parking_brake_toggle(&mut self) {
        self.pending.parking_brake = !self.pending.parking_brake;
    }

    pub fn lights_toggle(&mut self) {
        let on = !self.lights.contains(LightState::HEADLIGHTS);
        self.lights.set(LightState::HEADLIGHTS, on);
    }

    pub fn beacons_toggle(&mut self) {
        let on = !self.lights.contains(LightState::BEACONS);
        self.lights.set(LightState::BEACONS, on);
    }

    pub fn set_blink_type(&mut self, blink: BlinkType) {
        self.lights.set_blink_type(blink);
    }

    /// Attaches or releases ties of `group` (`-1` for all).
    pub fn tie_toggle(&mut self, group: i32) {
        self.toggles.push(Toggle::Attachment(AttachmentKind::Tie, group));
    }

    pub fn rope_toggle(&mut self, group: i32) {
        self.toggles.push(Toggle::Attachment(AttachmentKind::Rope, group));
    }

    pub fn hook_toggle(&mut self, group: i32) {
        self.toggles.push(Toggle::Attachment(AttachmentKind::Hook, group));
    }

    pub fn toggle_slide_node_lock(&mut self) {
        self.toggles.push(Toggle::SlideNodeLock);
    }

    /// Pulls `node` toward `target` (local frame) with a spring of `force` N/m.
    pub fn mouse_move(&mut self, node: usize, target: Vector3<f64>, force: f64) -> Result<(), PhysicsError> {
        self.store.node(node)?;
        self.mouse = Some(MouseGrab { node, target, force });
        Ok(())
    }

    pub fn mouse_release(&mut self) {
        self.mouse = None;
    }

    pub fn set_self_collisions(&mut self, enabled: bool) {
        self.disable_self_collisions = !enabled;
    }

    pub fn set_truck_truck_collisions(&mut self, enabled: bool) {
        self.disable_truck_truck_collisions = !enabled;
    }

    // ===== INSPECTION API =====

    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &SimState {
        &self.state
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self.state, SimState::Faulted(_))
    }

    pub fn node_count(&self) -> usize {
        self.store.node_count()
    }

    pub fn beam_count(&self) -> usize {
        self.store.beam_count()
    }

    pub fn nodes(&self) -> &[Node] {
        self.store.nodes()
    }

    pub fn beams(&self) -> &[Beam] {
        self.store.beams()
    }

    pub fn store(&self) -> &NodeBeamStore {
        &self.store
    }

    pub fn node_position(&self, node: usize) -> Result<Vector3<f64>, PhysicsError> {
        Ok(self.store.node(node)?.position)
    }

    pub fn node_positions(&self) -> Vec<Vector3<f64>> {
        self.store.nodes().iter().map(|n| n.position).collect()
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn total_mass(&self, with_locked: bool) -> f64 {
        self.store.total_mass(with_locked)
    }

    /// Mean wheel rim speed in m/s; replicated for networked vehicles.
    pub fn wheel_speed(&self) -> f64 {
        if let (SimState::Networked, Some(sync)) = (&self.state, &self.netsync) {
            return sync.wheel_speed();
        }
        if self.wheels.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.wheels.iter().map(|w| wheel::wheel_speed(w, self.store.nodes())).sum();
        sum / self.wheels.len() as f64
    }

    pub fn wheels(&self) -> &[Wheel] {
        &self.wheels
    }

    pub fn brake(&self) -> f64 {
        self.pending.brake
    }

    pub fn parking_brake(&self) -> bool {
        self.pending.parking_brake
    }

    pub fn lights(&self) -> bool {
        self.lights.contains(LightState::HEADLIGHTS)
    }

    pub fn beacons(&self) -> bool {
        self.lights.contains(LightState::BEACONS)
    }

    pub fn blink_type(&self) -> BlinkType {
        self.lights.blink_type()
    }

    pub fn brake_light_visible(&self) -> bool {
        match (&self.state, &self.netsync) {
            (SimState::Networked, Some(sync)) => sync.flags().contains(LightState::BRAKE),
            _ => self.pending.brake > BRAKE_LIGHT_THRESHOLD,
        }
    }

    /// Flags as replicated to remote simulators.
    pub fn light_state(&self) -> LightState {
        let mut flags = self.lights;
        flags.set(LightState::BRAKE, self.brake_light_visible());
        flags.set(LightState::PARKING_BRAKE, self.pending.parking_brake);
        flags
    }

    pub fn replay_mode(&self) -> bool {
        self.replay_mode
    }

    pub fn replay_position(&self) -> usize {
        self.replay_position
    }

    pub fn hydro_state(&self) -> f64 {
        self.hydro_state
    }

    pub fn slide_nodes(&self) -> &[SlideNode] {
        &self.slide_nodes
    }

    pub fn rails(&self) -> &[RailGroup] {
        &self.rails
    }

    pub fn slide_nodes_locked(&self) -> bool {
        self.slide_nodes_locked
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn is_off_map(&self) -> bool {
        self.off_map
    }

    pub fn last_fuzzy_ground_model(&self) -> Option<GroundModelId> {
        self.last_fuzzy_ground_model
    }

    pub fn origin(&self) -> Vector3<f64> {
        self.origin
    }

    /// Mean node position in the local frame.
    pub fn position(&self) -> Vector3<f64> {
        self.store.centroid()
    }

    pub fn world_position(&self) -> Vector3<f64> {
        self.store.centroid() + self.origin
    }

    pub fn lowest_node(&self) -> Option<usize> {
        self.store
            .nodes()
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.position.y.total_cmp(&b.position.y))
            .map(|(i, _)| i)
    }

    /// Heading in radians from +Z toward +X, from the camera nodes.
    pub fn heading_direction_angle(&self) -> f64 {
        let Some(camera) = self.camera else { return 0.0 };
        let (Ok(reference), Ok(direction)) = (self.store.node(camera.reference), self.store.node(camera.direction))
        else {
            return 0.0;
        };
        let forward = direction.position - reference.position;
        forward.x.atan2(forward.z)
    }

    /// Smoothed acceleration of the mass centre, in g.
    pub fn g_forces(&self) -> Vector3<f64> {
        self.g_forces
    }

    pub fn stats(&self) -> TruckStats {
        self.stats
    }

    /// Closest rail of `candidate` to this vehicle's slide-node, with the distance.
    pub fn closest_rail_on_truck(&self, candidate: &Truck, slide_node: usize) -> Result<Option<(usize, f64)>, PhysicsError> {
        let slide = self
            .slide_nodes
            .get(slide_node)
            .ok_or(PhysicsError::InvalidNode(slide_node))?;
        let world = self.store.node(slide.node)?.position + self.origin;
        let local = world - candidate.origin;
        Ok(slidenode::closest_rail(&candidate.rails, candidate.store.nodes(), &local).map(|(rail, _, d)| (rail, d)))
    }
}

fn centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    if points.is_empty() {
        return Vector3::zeros();
    }
    points.iter().sum::<Vector3<f64>>() / points.len() as f64
}

impl StateSnapshot for Truck {
    fn capture_state(&self, timestamp_ms: u64) -> NodeStateFrame {
        let nodes = self.store.nodes();
        NodeStateFrame {
            timestamp_ms,
            reference: self.world_position(),
            positions: nodes.iter().map(|n| n.position + self.origin).collect(),
            velocities: nodes.iter().map(|n| n.velocity).collect(),
            wheel_speed: self.wheel_speed(),
            flags: self.light_state(),
        }
    }

    fn apply_state(&mut self, frame: &NodeStateFrame) -> Result<(), PhysicsError> {
        if frame.node_count() != self.store.node_count() || frame.velocities.len() != frame.node_count() {
            return Err(PhysicsError::NodeCountMismatch {
                expected: self.store.node_count(),
                got: frame.node_count(),
            });
        }
        let origin = self.origin;
        for ((node, p), v) in self.store.nodes_mut().iter_mut().zip(&frame.positions).zip(&frame.velocities) {
            node.position = p - origin;
            node.velocity = *v;
            node.force = Vector3::zeros();
        }
        Ok(())
    }
}
