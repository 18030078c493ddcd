//! Scenario runner - builds a world per scenario, steps it and checks the
//! physical and replication invariants the scenario is about.

use crate::blueprints;
use crate::error::SimError;
use crate::exporter::SimExport;
use crate::network::LinkParams;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use nalgebra::Vector3;
use nodebeam_core::slidenode::rail_error;
use nodebeam_core::{
    FrameReport, GroundModelSet, HeightField, PhysicsError, SimState, TerrainQuery, VehicleId,
};
use nodebeam_env::TransportController;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total frames executed
    pub total_frames: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Sub-steps executed across all frames
    pub substeps: u64,

    /// Sub-steps dropped by the per-frame clamp
    pub dropped_substeps: u64,

    /// Vehicle faults reported by the scheduler
    pub faults: u64,

    /// Beams broken, summed over vehicles
    pub broken_beams: usize,

    /// Node-terrain contacts, summed over sub-steps and vehicles
    pub terrain_contacts: usize,

    /// Node-triangle contacts against other vehicles
    pub vehicle_contacts: usize,

    /// Snapshots handed to the network
    pub packets_sent: u64,

    /// Snapshots lost or blocked by a partition
    pub packets_dropped: u64,

    /// Snapshots accepted by mirrors
    pub packets_accepted: u64,

    /// Scenario-specific worst-case error (metres)
    pub max_error: f64,
}

impl ScenarioMetrics {
    fn record(&mut self, report: &FrameReport) {
        self.substeps += report.substeps as u64;
        self.dropped_substeps += report.dropped as u64;
        self.faults += report.faults.len() as u64;
    }

    fn collect_vehicles(&mut self, world: &SimWorld) -> Result<(), SimError> {
        for id in world.vehicle_ids() {
            let stats = world.vehicle(id)?.stats();
            self.broken_beams += stats.broken_beams;
            self.terrain_contacts += stats.terrain_contacts;
            self.vehicle_contacts += stats.vehicle_contacts;
        }
        let net = world.network_stats();
        self.packets_sent = net.sent;
        self.packets_dropped = net.lost + net.partitioned;
        Ok(())
    }
}

/// Pass/fail verdict of one scenario body.
struct Verdict {
    failure: Option<String>,
    metrics: ScenarioMetrics,
}

impl Verdict {
    fn new(metrics: ScenarioMetrics) -> Self {
        Self { failure: None, metrics }
    }

    /// Records the first failed check only.
    fn check(&mut self, ok: bool, reason: impl FnOnce() -> String) {
        if !ok && self.failure.is_none() {
            self.failure = Some(reason());
        }
    }
}

/// Runs physics scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Worker threads per world
    workers: usize,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    /// Base configuration every scenario starts from
    base: SimConfig,

    /// Record a frame for export every N frames
    export_every: Option<u64>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, workers: usize) -> Self {
        Self {
            seed,
            workers: workers.max(1),
            max_duration_secs: 5.0,
            base: SimConfig::default(),
            export_every: None,
        }
    }

    /// Sets the base configuration (seed and workers still come from the runner).
    pub fn with_config(mut self, config: SimConfig) -> Self {
        self.base = config;
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Records every `frames`-th frame of the scenario's main world.
    pub fn with_export_every(mut self, frames: u64) -> Self {
        self.export_every = Some(frames.max(1));
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_recorded(scenario).0
    }

    /// Runs a scenario, also returning the recorded frames when exporting.
    pub fn run_recorded(&self, scenario: ScenarioId) -> (ScenarioResult, Option<SimExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let outcome = match scenario {
            ScenarioId::NodePairDrop => self.run_node_pair_drop(),
            ScenarioId::TerrainSettle => self.run_terrain_settle(),
            ScenarioId::RopeSlack => self.run_rope_slack(),
            ScenarioId::BeamBreak => self.run_beam_break(),
            ScenarioId::RailSlide => self.run_rail_slide(),
            ScenarioId::ThreadDeterminism => self.run_thread_determinism(),
            ScenarioId::NetworkReplay => self.run_network_replay(),
            ScenarioId::PositionRestore => self.run_position_restore(),
            ScenarioId::FaultRecovery => self.run_fault_recovery(),
            ScenarioId::TruckPileup => self.run_truck_pileup(),
        };

        let mut recorded = None;
        let result = match outcome {
            Ok((mut world, verdict)) => {
                recorded = world.take_recording();
                ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: verdict.failure.is_none(),
                    total_frames: world.frames(),
                    final_time_secs: world.time_secs(),
                    failure_reason: verdict.failure,
                    metrics: verdict.metrics,
                }
            }
            Err(err) => ScenarioResult {
                scenario,
                seed: self.seed,
                passed: false,
                total_frames: 0,
                final_time_secs: 0.0,
                failure_reason: Some(err.to_string()),
                metrics: ScenarioMetrics::default(),
            },
        };

        if result.passed {
            info!("Scenario {} passed ({} frames)", scenario, result.total_frames);
        } else {
            warn!(
                "Scenario {} failed: {}",
                scenario,
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }

        let export = recorded.map(|frames| {
            let mut export = SimExport::new(scenario.name(), self.seed);
            for frame in frames {
                export.add_frame(frame);
            }
            export.finalize(result.passed, result.failure_reason.clone());
            export
        });
        (result, export)
    }

    // ===== HELPERS =====

    fn config(&self) -> SimConfig {
        let mut config = self.base.clone();
        config.seed = self.seed;
        config.duration_secs = self.max_duration_secs;
        config.scheduler.workers = self.workers;
        config
    }

    /// Main world of a scenario; records frames when exporting.
    fn world(&self, config: &SimConfig, terrain: Option<Arc<dyn TerrainQuery>>) -> Result<SimWorld, SimError> {
        let mut world = match terrain {
            Some(terrain) => SimWorld::with_terrain(config.clone(), terrain)?,
            None => SimWorld::new(config.clone())?,
        };
        world.set_recording(self.export_every);
        Ok(world)
    }

    fn frames(&self, config: &SimConfig, min_secs: f64) -> u64 {
        let secs = config.duration_secs.max(min_secs);
        (secs * config.frame_rate_hz as f64).round() as u64
    }

    /// Steps one frame, folding the report into the metrics.
    fn step(world: &mut SimWorld, metrics: &mut ScenarioMetrics) -> Result<(), SimError> {
        let report = world.step_frame()?;
        metrics.record(&report);
        Ok(())
    }

    // ===== SCENARIOS =====

    /// NB-001: a 10 kg weight on a pinned beam settles at `1 + m g / k`.
    fn run_node_pair_drop(&self) -> Result<(SimWorld, Verdict), SimError> {
        let config = self.config();
        let mut world = self.world(&config, None)?;
        let id = world.spawn(blueprints::hanging_weight(
            Vector3::new(0.0, 5.0, 0.0),
            f64::INFINITY,
            config.truck.clone(),
        )?);

        let mut metrics = ScenarioMetrics::default();
        for _ in 0..self.frames(&config, 4.0) {
            Self::step(&mut world, &mut metrics)?;
        }

        let (length, k, mass) = {
            let truck = world.vehicle(id)?;
            let beam = &truck.beams()[0];
            let length = (truck.nodes()[1].position - truck.nodes()[0].position).norm();
            (length, beam.spring, truck.nodes()[1].mass)
        };
        let gravity = config.truck.solver.gravity.norm();
        let expected = 1.0 + mass * gravity / k;
        metrics.max_error = (length - expected).abs();
        metrics.collect_vehicles(&world)?;

        let mut verdict = Verdict::new(metrics);
        verdict.check(verdict.metrics.max_error < 1e-3, || {
            format!("settled length {:.5} m, expected {:.5} m", length, expected)
        });
        Ok((world, verdict))
    }

    /// NB-002: parking-braked truck dropped on seeded bumpy terrain.
    fn run_terrain_settle(&self) -> Result<(SimWorld, Verdict), SimError> {
        let config = self.config();
        let terrain = bumpy_terrain(self.seed)?;
        let mut world = self.world(&config, Some(terrain.clone() as Arc<dyn TerrainQuery>))?;
        let mut truck = blueprints::lattice_truck(Vector3::new(0.0, 1.0, 0.0), config.truck.clone())?;
        truck.parking_brake_toggle();
        let id = world.spawn(truck);

        let mut metrics = ScenarioMetrics::default();
        for _ in 0..self.frames(&config, 4.0) {
            Self::step(&mut world, &mut metrics)?;
        }
        metrics.collect_vehicles(&world)?;

        let truck = world.vehicle(id)?;
        let nodes = truck.nodes();
        let mean_speed = nodes.iter().map(|n| n.velocity.norm()).sum::<f64>() / nodes.len() as f64;
        let origin = truck.origin();
        let worst_sink = nodes
            .iter()
            .filter_map(|n| {
                let p = n.position + origin;
                terrain.sample(p.x, p.z).map(|g| g.height - p.y)
            })
            .fold(f64::MIN, f64::max);
        let faulted = truck.is_faulted();
        let off_map = truck.is_off_map();
        drop(truck);

        let mut verdict = Verdict::new(metrics);
        verdict.metrics.max_error = worst_sink.max(0.0);
        verdict.check(!faulted, || "truck faulted".to_string());
        verdict.check(!off_map, || "truck left the height field".to_string());
        verdict.check(mean_speed < 1.0, || format!("mean node speed {:.3} m/s still high", mean_speed));
        verdict.check(worst_sink < 0.2, || format!("node {:.3} m below the terrain", worst_sink));
        verdict.check(verdict.metrics.terrain_contacts > 0, || "no terrain contact".to_string());
        Ok((world, verdict))
    }

    /// NB-003: pendulum bob starts 0.5 m inside a 1.5 m rope.
    fn run_rope_slack(&self) -> Result<(SimWorld, Verdict), SimError> {
        let config = self.config();
        let mut world = self.world(&config, None)?;
        let id = world.spawn(blueprints::rope_pendulum(
            Vector3::new(0.0, 5.0, 0.0),
            1.5,
            0.5,
            config.truck.clone(),
        )?);

        let mut metrics = ScenarioMetrics::default();
        let mut verdict_failure = None;
        let mut max_tension: f64 = 0.0;
        for frame in 0..self.frames(&config, 2.0) {
            Self::step(&mut world, &mut metrics)?;
            let truck = world.vehicle(id)?;
            let beam = &truck.beams()[0];
            let length = (truck.nodes()[1].position - truck.nodes()[0].position).norm();
            max_tension = max_tension.max(beam.stress);
            // Margin covers motion within the last sub-step
            if length < beam.rest_length - 0.02 && beam.stress != 0.0 && verdict_failure.is_none() {
                verdict_failure = Some(format!(
                    "frame {}: rope {:.3} m of {:.3} m carries {:.3} N",
                    frame, length, beam.rest_length, beam.stress
                ));
            }
        }
        metrics.collect_vehicles(&world)?;

        let mut verdict = Verdict::new(metrics);
        verdict.failure = verdict_failure;
        verdict.check(max_tension > 0.0, || "rope never went taut".to_string());
        Ok((world, verdict))
    }

    /// NB-004: 10 kg weight on a beam rated for 50 N.
    fn run_beam_break(&self) -> Result<(SimWorld, Verdict), SimError> {
        let config = self.config();
        let mut world = self.world(&config, None)?;
        let id = world.spawn(blueprints::hanging_weight(Vector3::new(0.0, 5.0, 0.0), 50.0, config.truck.clone())?);

        let mut metrics = ScenarioMetrics::default();
        let mut most_broken = 0;
        let mut reformed = false;
        for _ in 0..self.frames(&config, 2.0) {
            Self::step(&mut world, &mut metrics)?;
            let broken = world.vehicle(id)?.store().broken_beam_count();
            reformed |= broken < most_broken;
            most_broken = most_broken.max(broken);
        }
        metrics.collect_vehicles(&world)?;

        let (broken, distance, rest) = {
            let truck = world.vehicle(id)?;
            let distance = (truck.nodes()[1].position - truck.nodes()[0].position).norm();
            (truck.store().broken_beam_count(), distance, truck.beams()[0].rest_length)
        };
        let mut verdict = Verdict::new(metrics);
        verdict.check(!reformed, || "a broken beam re-formed".to_string());
        verdict.check(broken == 1, || format!("{} beams broken, expected 1", broken));
        verdict.check(distance > rest + 0.5, || {
            format!("weight only {:.3} m from the anchor after the break", distance)
        });
        Ok((world, verdict))
    }

    /// NB-005: slide-node locked onto a sloped rail under gravity.
    fn run_rail_slide(&self) -> Result<(SimWorld, Verdict), SimError> {
        let config = self.config();
        let mut world = self.world(&config, None)?;
        let mut truck = blueprints::rail_cart(Vector3::zeros(), config.truck.clone())?;
        truck.toggle_slide_node_lock();
        let id = world.spawn(truck);
        let start_x = {
            let truck = world.vehicle(id)?;
            truck.nodes()[truck.slide_nodes()[0].node].position.x
        };

        let mut metrics = ScenarioMetrics::default();
        let mut detached_frame = None;
        for frame in 0..self.frames(&config, 1.0) {
            Self::step(&mut world, &mut metrics)?;
            let truck = world.vehicle(id)?;
            let slide = &truck.slide_nodes()[0];
            match rail_error(slide, truck.rails(), truck.nodes()).filter(|_| slide.locked) {
                Some(err) => metrics.max_error = metrics.max_error.max(err),
                None => {
                    detached_frame.get_or_insert(frame);
                }
            }
        }
        metrics.collect_vehicles(&world)?;

        let end_x = {
            let truck = world.vehicle(id)?;
            truck.nodes()[truck.slide_nodes()[0].node].position.x
        };
        let mut verdict = Verdict::new(metrics);
        verdict.check(detached_frame.is_none(), || {
            format!("slide-node detached at frame {}", detached_frame.unwrap_or_default())
        });
        let max_error = verdict.metrics.max_error;
        verdict.check(max_error <= 1e-6, || format!("slide-node strayed {:.3e} m from the rail", max_error));
        verdict.check(end_x > start_x + 0.1, || format!("cart did not slide ({:.3} -> {:.3})", start_x, end_x));
        Ok((world, verdict))
    }

    /// NB-006: the same colliding set on one worker and on several.
    fn run_thread_determinism(&self) -> Result<(SimWorld, Verdict), SimError> {
        let config = self.config();
        let frames = self.frames(&config, 0.0).min(150);
        let parallel_workers = self.workers.max(3);

        let build = |workers: usize| -> Result<SimWorld, SimError> {
            let mut config = config.clone();
            config.scheduler.workers = workers;
            let mut world = self.world(&config, None)?;
            if workers != 1 {
                world.set_recording(None);
            }
            world.spawn(blueprints::lattice_truck(Vector3::new(6.0, 0.0, 0.0), config.truck.clone())?);
            world.spawn(blueprints::cube(Vector3::new(6.0, 3.5, 0.0), 1.0, 5.0, config.truck.clone())?);
            world.spawn(blueprints::rope_pendulum(Vector3::new(-4.0, 4.0, 0.0), 1.5, 0.5, config.truck.clone())?);
            world.spawn(blueprints::node_pair(Vector3::new(-8.0, 2.0, 0.0), config.truck.clone())?);
            Ok(world)
        };

        let mut serial = build(1)?;
        let mut parallel = build(parallel_workers)?;
        let mut metrics = ScenarioMetrics::default();
        let mut diverged = None;
        for frame in 0..frames {
            Self::step(&mut serial, &mut metrics)?;
            parallel.step_frame()?;
            if diverged.is_none() {
                for id in serial.vehicle_ids() {
                    let a = serial.vehicle(id)?.node_positions();
                    let b = parallel.vehicle(id)?.node_positions();
                    if !same_bits(&a, &b) {
                        diverged = Some((frame, id));
                        break;
                    }
                }
            }
        }
        metrics.collect_vehicles(&serial)?;

        let mut verdict = Verdict::new(metrics);
        verdict.check(diverged.is_none(), || {
            let (frame, id) = diverged.unwrap_or_default();
            format!("vehicle {} diverged at frame {} (1 vs {} workers)", id, frame, parallel_workers)
        });
        verdict.check(verdict.metrics.vehicle_contacts > 0, || "cube never touched the truck".to_string());
        Ok((serial, verdict))
    }

    /// NB-007: cube replicated over a lossy, jittery link with a brief partition.
    fn run_network_replay(&self) -> Result<(SimWorld, Verdict), SimError> {
        let mut config = self.config();
        config.network = LinkParams {
            latency_ms: 50,
            jitter_ms: 10.0,
            loss_rate: 0.1,
            reorder_rate: 0.05,
        };
        let mut world = self.world(&config, None)?;
        let source = world.spawn(blueprints::cube(Vector3::new(0.0, 3.0, 0.0), 1.0, 5.0, config.truck.clone())?);
        let mirror =
            world.replicate(source, blueprints::cube(Vector3::new(0.0, 3.0, 0.0), 1.0, 5.0, config.truck.clone())?)?;
        let stream = world
            .replication_stream(mirror)
            .ok_or(PhysicsError::UnknownVehicle(mirror.0))?;
        let controller = world.network_controller();

        let mut metrics = ScenarioMetrics::default();
        let frames = self.frames(&config, 5.0);
        let partition = (config.frame_rate_hz as u64, config.frame_rate_hz as u64 * 3 / 2);
        for frame in 0..frames {
            if frame == partition.0 {
                debug!("Partitioning stream {}", stream);
                controller.partition(stream);
            } else if frame == partition.1 {
                controller.heal_all();
            }
            Self::step(&mut world, &mut metrics)?;
        }
        metrics.collect_vehicles(&world)?;

        let stats = world.replication_stats(mirror)?;
        metrics.packets_accepted = stats.accepted;
        metrics.max_error = world.mirror_error(mirror)?;
        let networked = *world.vehicle(mirror)?.state() == SimState::Networked;

        let mut verdict = Verdict::new(metrics);
        verdict.check(networked, || "mirror left networked state".to_string());
        verdict.check(stats.accepted > 0, || "mirror accepted no snapshots".to_string());
        let (dropped, max_error) = (verdict.metrics.packets_dropped, verdict.metrics.max_error);
        verdict.check(dropped > 0, || "link dropped nothing".to_string());
        verdict.check(max_error < 0.05, || format!("mirror {:.3} m from its source", max_error));
        Ok((world, verdict))
    }

    /// NB-008: save, drive on, restore; a hook toggle invalidates the save.
    fn run_position_restore(&self) -> Result<(SimWorld, Verdict), SimError> {
        let config = self.config();
        let mut world = self.world(&config, None)?;
        let id = world.spawn(blueprints::lattice_truck(Vector3::zeros(), config.truck.clone())?);

        let mut metrics = ScenarioMetrics::default();
        let half = self.frames(&config, 1.0) / 2;
        for _ in 0..half {
            Self::step(&mut world, &mut metrics)?;
        }
        let saved = {
            let mut truck = world.vehicle(id)?;
            truck.save_position(1)?;
            truck.node_positions()
        };
        for _ in 0..half {
            Self::step(&mut world, &mut metrics)?;
        }
        let (restored, moved) = {
            let mut truck = world.vehicle(id)?;
            let before = truck.node_positions();
            truck.load_position(1)?;
            let moved = before.iter().zip(&saved).map(|(a, b)| (a - b).norm()).fold(0.0, f64::max);
            (truck.node_positions(), moved)
        };
        debug!("Truck moved {:.4} m between save and load", moved);

        world.vehicle(id)?.hook_toggle(0);
        Self::step(&mut world, &mut metrics)?;
        let refused = matches!(
            world.vehicle(id)?.load_position(1),
            Err(PhysicsError::TopologyChanged { .. })
        );

        // Releasing the hook restores the saved layout
        world.vehicle(id)?.hook_toggle(0);
        Self::step(&mut world, &mut metrics)?;
        let reloaded = world.vehicle(id)?.load_position(1).is_ok();
        metrics.collect_vehicles(&world)?;

        let mut verdict = Verdict::new(metrics);
        verdict.check(same_bits(&restored, &saved), || "restored pose differs from the saved one".to_string());
        verdict.check(refused, || "load while hooked on was not refused".to_string());
        verdict.check(reloaded, || "load after releasing the hook was refused".to_string());
        Ok((world, verdict))
    }

    /// NB-009: an unstable vehicle faults next to a stable cube.
    fn run_fault_recovery(&self) -> Result<(SimWorld, Verdict), SimError> {
        let config = self.config();
        let cube_at = Vector3::new(5.0, 3.0, 0.0);
        let frames = self.frames(&config, 1.0);

        // Reference run: the cube alone
        let mut reference = SimWorld::new(config.clone())?;
        let lone = reference.spawn(blueprints::cube(cube_at, 1.0, 5.0, config.truck.clone())?);
        for _ in 0..frames {
            reference.step_frame()?;
        }

        let mut world = self.world(&config, None)?;
        let cube = world.spawn(blueprints::cube(cube_at, 1.0, 5.0, config.truck.clone())?);
        let unstable = world.spawn(blueprints::unstable_pair(Vector3::new(-5.0, 3.0, 0.0), config.truck.clone())?);

        let mut metrics = ScenarioMetrics::default();
        Self::step(&mut world, &mut metrics)?;
        let faulted_early = world.vehicle(unstable)?.is_faulted();
        let frozen_pose = world.vehicle(unstable)?.node_positions();
        for _ in 1..frames {
            Self::step(&mut world, &mut metrics)?;
        }
        let stayed_frozen = same_bits(&frozen_pose, &world.vehicle(unstable)?.node_positions());
        let cube_unaffected = same_bits(
            &world.vehicle(cube)?.node_positions(),
            &reference.vehicle(lone)?.node_positions(),
        );

        world.vehicle(unstable)?.request_reset(false);
        Self::step(&mut world, &mut metrics)?;
        let revived = *world.vehicle(unstable)?.state() == SimState::Simulated;
        metrics.collect_vehicles(&world)?;

        let mut verdict = Verdict::new(metrics);
        verdict.check(faulted_early, || "unstable vehicle did not fault".to_string());
        verdict.check(stayed_frozen, || "faulted vehicle kept moving".to_string());
        verdict.check(cube_unaffected, || "fault disturbed the neighbouring cube".to_string());
        verdict.check(revived, || "reset did not clear the fault".to_string());
        Ok((world, verdict))
    }

    /// NB-010: a column of lattice trucks with seeded lateral offsets.
    fn run_truck_pileup(&self) -> Result<(SimWorld, Verdict), SimError> {
        let config = self.config();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_mul(0x9e3779b97f4a7c15));
        let mut world = self.world(&config, None)?;
        let count = config.vehicles.max(2);
        let mut ids: Vec<VehicleId> = Vec::with_capacity(count);
        for level in 0..count {
            let base = Vector3::new(rng.gen_range(-0.5..0.5), level as f64 * 2.0, rng.gen_range(-0.3..0.3));
            ids.push(world.spawn(blueprints::lattice_truck(base, config.truck.clone())?));
        }

        let mut metrics = ScenarioMetrics::default();
        for _ in 0..self.frames(&config, 3.0) {
            Self::step(&mut world, &mut metrics)?;
        }
        metrics.collect_vehicles(&world)?;

        let mut faulted = Vec::new();
        let mut lowest = f64::MAX;
        for id in &ids {
            let truck = world.vehicle(*id)?;
            if truck.is_faulted() {
                faulted.push(*id);
            }
            if let Some(n) = truck.lowest_node() {
                lowest = lowest.min(truck.nodes()[n].position.y + truck.origin().y);
            }
        }
        metrics.max_error = (-lowest).max(0.0);

        let mut verdict = Verdict::new(metrics);
        verdict.check(faulted.is_empty(), || format!("trucks faulted: {:?}", faulted));
        verdict.check(verdict.metrics.vehicle_contacts > 0, || "trucks never touched".to_string());
        verdict.check(lowest > -0.2, || format!("a node sank to y = {:.3}", lowest));
        Ok((world, verdict))
    }
}

/// Exact equality, treating identical NaN payloads as equal.
fn same_bits(a: &[Vector3<f64>], b: &[Vector3<f64>]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(p, q)| p.iter().zip(q.iter()).all(|(x, y)| x.to_bits() == y.to_bits()))
}

/// 40 m square height field of gravel with gentle waves and seeded noise.
fn bumpy_terrain(seed: u64) -> Result<Arc<HeightField>, SimError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let models = GroundModelSet::default();
    let gravel = models
        .id_of("gravel")
        .ok_or_else(|| SimError::Config("ground model 'gravel' missing".into()))?;
    let (columns, rows, spacing) = (41usize, 41usize, 1.0);
    let mut heights = Vec::with_capacity(columns * rows);
    for iz in 0..rows {
        for ix in 0..columns {
            let (x, z) = (ix as f64 * spacing - 20.0, iz as f64 * spacing - 20.0);
            heights.push(0.1 * (0.7 * x).sin() * (0.5 * z).cos() + rng.gen_range(-0.03..0.03));
        }
    }
    let field = HeightField::new(
        -20.0,
        -20.0,
        spacing,
        columns,
        rows,
        heights,
        vec![gravel; columns * rows],
        models,
    )
    .ok_or_else(|| SimError::Config("height field does not match its grid".into()))?;
    Ok(Arc::new(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ScenarioRunner {
        ScenarioRunner::new(7, 2).with_duration(1.0)
    }

    #[test]
    fn test_node_pair_settles_at_static_stretch() {
        let result = runner().run(ScenarioId::NodePairDrop);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.total_frames >= 200);
    }

    #[test]
    fn test_beam_break_scenario() {
        let result = runner().run(ScenarioId::BeamBreak);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.broken_beams, 1);
    }

    #[test]
    fn test_rope_slack_scenario() {
        let result = runner().run(ScenarioId::RopeSlack);
        assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn test_fault_recovery_scenario() {
        let result = runner().run(ScenarioId::FaultRecovery);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.faults >= 1);
    }

    #[test]
    fn test_rail_slide_stays_on_rail() {
        let result = ScenarioRunner::new(42, 2).run(ScenarioId::RailSlide);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.max_error <= 1e-6);
    }

    #[test]
    fn test_network_replay_scenario() {
        let result = ScenarioRunner::new(42, 2).run(ScenarioId::NetworkReplay);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.packets_dropped > 0);
        assert!(result.metrics.packets_accepted > 0);
    }

    #[test]
    fn test_position_restore_scenario() {
        let result = ScenarioRunner::new(42, 2).run(ScenarioId::PositionRestore);
        assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn test_same_seed_same_result() {
        let a = runner().run(ScenarioId::RailSlide);
        let b = runner().run(ScenarioId::RailSlide);
        assert_eq!(a.passed, b.passed);
        assert_eq!(a.metrics.max_error.to_bits(), b.metrics.max_error.to_bits());
        assert_eq!(a.total_frames, b.total_frames);
    }

    #[test]
    fn test_bumpy_terrain_is_seeded() {
        let a = bumpy_terrain(3).unwrap();
        let b = bumpy_terrain(3).unwrap();
        let ha = a.sample(1.3, -2.7).map(|g| g.height);
        let hb = b.sample(1.3, -2.7).map(|g| g.height);
        assert!(ha.is_some());
        assert_eq!(ha, hb);
    }
}
