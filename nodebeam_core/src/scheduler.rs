//! Parallel Step Scheduler - advances every vehicle through a frame's
//! sub-steps on a fixed pool of worker threads.
//!
//! Each worker owns the vehicles whose id is congruent to its index modulo
//! the worker count. Per frame the controller:
//!
//! 1. publishes every vehicle's collision proxy and the step job
//! 2. releases the workers through the start barrier (Dispatched)
//! 3. blocks on the done barrier while workers run the sub-steps (Working)
//! 4. performs the once-per-frame bookkeeping (Synchronized): queued resets,
//!    floating-origin recentering and replay capture
//!
//! The controller phases advance once per frame, not once per sub-step.
//! Within a frame, workers separate sub-steps among themselves with two
//! barriers: one after solving (no proxy is rewritten while another worker
//! may still read it) and one after publishing (no sub-step starts on a
//! partial publish). Cross-vehicle contact therefore only ever reads state
//! finalized at the end of the previous sub-step, and results do not depend
//! on the worker count.
//!
//! Vehicle code runs under `catch_unwind` in both worker phases, so a panic
//! faults that vehicle and the worker still reaches every barrier. Should a
//! worker fail outside vehicle code, it breaks all barriers: the frame ends
//! with a fault for every vehicle and later frames do nothing.

use crate::barrier::{BarrierBroken, CyclicBarrier};
use crate::collision::CollisionProxy;
use crate::config::SchedulerConfig;
use crate::error::PhysicsError;
use crate::ground::{FlatGround, TerrainQuery};
use crate::truck::{Truck, VehicleId};
use nalgebra::Vector3;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

type VehicleSlot = (VehicleId, Arc<Mutex<Truck>>);

/// Controller-side phase of the frame protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    /// Job published, workers being released
    Dispatched,
    /// Workers running sub-steps
    Working,
    /// All workers done; post-frame bookkeeping
    Synchronized,
}

/// Result of one [`Scheduler::frame_step`].
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    /// Sub-steps executed
    pub substeps: usize,

    /// Sub-steps skipped by the per-frame clamp
    pub dropped: usize,

    /// Vehicle errors raised during the frame, in vehicle order
    pub faults: Vec<(VehicleId, PhysicsError)>,

    /// True when the floating origin moved after the frame
    pub recentered: bool,
}

/// Work description shared with the workers for one frame.
#[derive(Default)]
struct StepJob {
    vehicles: Arc<Vec<VehicleSlot>>,
    dt: f64,
    substeps: usize,
}

struct Shared {
    workers: usize,
    start: CyclicBarrier,
    done: CyclicBarrier,
    substep: CyclicBarrier,
    job: Mutex<StepJob>,
    proxies: RwLock<Vec<CollisionProxy>>,
    terrain: RwLock<Arc<dyn TerrainQuery>>,
    faults: Mutex<Vec<(usize, VehicleId, PhysicsError)>>,
    shutdown: AtomicBool,
}

impl Shared {
    /// Wakes every thread blocked on any of the pool's barriers.
    fn break_barriers(&self) {
        self.start.break_barrier();
        self.substep.break_barrier();
        self.done.break_barrier();
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    vehicles: Arc<Vec<VehicleSlot>>,
    next_id: usize,
    phase: SchedulerPhase,

    /// World position of every vehicle's local zero
    origin: Vector3<f64>,
    focus: Option<VehicleId>,
    frames: u64,
}

impl Scheduler {
    /// Spawns the worker pool over a flat default terrain.
    pub fn new(config: SchedulerConfig) -> Result<Self, PhysicsError> {
        Self::with_terrain(config, Arc::new(FlatGround::new(0.0)))
    }

    pub fn with_terrain(config: SchedulerConfig, terrain: Arc<dyn TerrainQuery>) -> Result<Self, PhysicsError> {
        let workers = config.workers.max(1);
        let shared = Arc::new(Shared {
            workers,
            start: CyclicBarrier::new(workers + 1),
            done: CyclicBarrier::new(workers + 1),
            substep: CyclicBarrier::new(workers),
            job: Mutex::new(StepJob::default()),
            proxies: RwLock::new(Vec::new()),
            terrain: RwLock::new(terrain),
            faults: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("nodebeam-worker-{}", index))
                .spawn(move || worker_loop(index, &shared))
                .map_err(|e| PhysicsError::WorkerFault(format!("failed to spawn worker {}: {}", index, e)))?;
            handles.push(handle);
        }
        info!("Scheduler started with {} workers (substep {} s)", workers, config.substep_dt);

        Ok(Self {
            config,
            shared,
            handles,
            vehicles: Arc::new(Vec::new()),
            next_id: 0,
            phase: SchedulerPhase::Idle,
            origin: Vector3::zeros(),
            focus: None,
            frames: 0,
        })
    }

    // ===== VEHICLES =====

    /// Takes ownership of a vehicle and assigns it to a partition.
    pub fn add_vehicle(&mut self, mut truck: Truck) -> VehicleId {
        let id = VehicleId(self.next_id);
        self.next_id += 1;
        truck.set_id(id);
        truck.set_origin(self.origin);
        truck.set_replay_interval(self.config.replay_interval);
        debug!(
            "Vehicle {} ({}) assigned to worker {}",
            id,
            truck.name(),
            id.0 % self.shared.workers
        );
        Arc::make_mut(&mut self.vehicles).push((id, Arc::new(Mutex::new(truck))));
        if self.focus.is_none() {
            self.focus = Some(id);
        }
        id
    }

    pub fn remove_vehicle(&mut self, id: VehicleId) -> Result<Truck, PhysicsError> {
        let index = self.index_of(id)?;
        let (_, slot) = Arc::make_mut(&mut self.vehicles).remove(index);
        if self.focus == Some(id) {
            self.focus = self.vehicles.first().map(|(id, _)| *id);
        }
        let mutex = Arc::try_unwrap(slot)
            .map_err(|_| PhysicsError::WorkerFault(format!("vehicle {} still shared", id)))?;
        Ok(mutex.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    /// Locks a vehicle for inspection or control between frames.
    pub fn vehicle(&self, id: VehicleId) -> Result<MutexGuard<'_, Truck>, PhysicsError> {
        let index = self.index_of(id)?;
        Ok(lock(&self.vehicles[index].1))
    }

    pub fn vehicle_ids(&self) -> Vec<VehicleId> {
        self.vehicles.iter().map(|(id, _)| *id).collect()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    fn index_of(&self, id: VehicleId) -> Result<usize, PhysicsError> {
        self.vehicles
            .binary_search_by_key(&id, |(vid, _)| *vid)
            .map_err(|_| PhysicsError::UnknownVehicle(id.0))
    }

    // ===== WORLD =====

    pub fn set_terrain(&mut self, terrain: Arc<dyn TerrainQuery>) {
        *write(&self.shared.terrain) = terrain;
    }

    /// Vehicle the floating origin follows.
    pub fn set_focus(&mut self, id: Option<VehicleId>) -> Result<(), PhysicsError> {
        if let Some(id) = id {
            self.index_of(id)?;
        }
        self.focus = id;
        Ok(())
    }

    pub fn focus(&self) -> Option<VehicleId> {
        self.focus
    }

    pub fn origin(&self) -> Vector3<f64> {
        self.origin
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.shared.workers
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    // ===== FRAME =====

    /// Number of sub-steps `dt` maps to, and how many the clamp drops.
    pub fn substeps_for(&self, dt: f64) -> (usize, usize) {
        if !(dt > 0.0) || self.config.substep_dt <= 0.0 {
            return (0, 0);
        }
        let steps = (dt / self.config.substep_dt).round() as usize;
        let max = self.config.max_substeps_per_frame;
        if steps > max {
            (max, steps - max)
        } else {
            (steps, 0)
        }
    }

    /// Advances all vehicles by `dt` seconds of frame time.
    pub fn frame_step(&mut self, dt: f64) -> FrameReport {
        let (substeps, dropped) = self.substeps_for(dt);
        let mut report = FrameReport { substeps, dropped, ..FrameReport::default() };
        if dropped > 0 {
            warn!("Frame of {:.4} s clamped: {} sub-steps dropped", dt, dropped);
        }
        if substeps > 0 && !self.vehicles.is_empty() {
            match self.dispatch(substeps) {
                Ok(()) => report.faults = self.collect_faults(),
                Err(BarrierBroken) => {
                    error!("Worker pool stopped; frame {} not simulated", self.frames);
                    lock(&self.shared.faults).clear();
                    report.faults = self
                        .vehicles
                        .iter()
                        .map(|(id, _)| (*id, PhysicsError::WorkerFault("worker pool stopped".to_string())))
                        .collect();
                }
            }
        }

        self.phase = SchedulerPhase::Synchronized;
        self.process_resets();
        report.recentered = self.recenter();
        let frame_dt = substeps as f64 * self.config.substep_dt;
        for (_, truck) in self.vehicles.iter() {
            lock(truck).capture_replay(frame_dt);
        }
        self.frames += 1;
        self.phase = SchedulerPhase::Idle;
        report
    }

    /// True once a worker failure has broken the pool's barriers.
    pub fn is_stopped(&self) -> bool {
        self.shared.start.is_broken()
    }

    fn dispatch(&mut self, substeps: usize) -> Result<(), BarrierBroken> {
        {
            let mut proxies = write(&self.shared.proxies);
            proxies.resize_with(self.vehicles.len(), || CollisionProxy::empty(0));
            proxies.truncate(self.vehicles.len());
            for ((_, truck), proxy) in self.vehicles.iter().zip(proxies.iter_mut()) {
                lock(truck).publish_proxy(proxy);
            }
        }
        {
            let mut job = lock(&self.shared.job);
            job.vehicles = self.vehicles.clone();
            job.dt = self.config.substep_dt;
            job.substeps = substeps;
        }

        self.phase = SchedulerPhase::Dispatched;
        let started = self.shared.start.wait();
        self.phase = SchedulerPhase::Working;
        let finished = started.and_then(|_| self.shared.done.wait());

        // Drop the workers' view so vehicles can be removed between frames
        lock(&self.shared.job).vehicles = Arc::new(Vec::new());
        finished.map(|_| ())
    }

    fn collect_faults(&self) -> Vec<(VehicleId, PhysicsError)> {
        let mut faults = std::mem::take(&mut *lock(&self.shared.faults));
        faults.sort_by_key(|(index, _, _)| *index);
        faults.into_iter().map(|(_, id, err)| (id, err)).collect()
    }

    fn process_resets(&mut self) {
        for (id, truck) in self.vehicles.iter() {
            let mut truck = lock(truck);
            if let Some(keep_position) = truck.take_reset_request() {
                if let Err(err) = truck.reset(keep_position) {
                    warn!("Vehicle {} reset failed: {}", id, err);
                }
            }
        }
    }

    /// Shifts every vehicle when the focus strays past the threshold (X/Z).
    fn recenter(&mut self) -> bool {
        let threshold = self.config.floating_origin_threshold;
        if threshold <= 0.0 {
            return false;
        }
        let Some(focus) = self.focus.and_then(|id| self.index_of(id).ok()) else {
            return false;
        };
        let p = lock(&self.vehicles[focus].1).position();
        if p.x.hypot(p.z) <= threshold {
            return false;
        }
        let offset = Vector3::new(-p.x, 0.0, -p.z);
        for (_, truck) in self.vehicles.iter() {
            lock(truck).move_origin(offset);
        }
        self.origin -= offset;
        info!(
            "Floating origin moved to ({:.1}, {:.1}, {:.1})",
            self.origin.x, self.origin.y, self.origin.z
        );
        true
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        // A broken pool has already let its workers go
        let _ = self.shared.start.wait();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        info!("Scheduler stopped after {} frames", self.frames);
    }
}

// ============================================================================
// WORKERS
// ============================================================================

fn worker_loop(index: usize, shared: &Shared) {
    loop {
        if shared.start.wait().is_err() || shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| run_frame(index, shared))) {
            Ok(Ok(())) => {}
            Ok(Err(BarrierBroken)) => {
                shared.break_barriers();
                break;
            }
            Err(payload) => {
                error!("Worker {} failed: {}", index, panic_message(payload.as_ref()));
                shared.break_barriers();
                break;
            }
        }
        if shared.done.wait().is_err() {
            break;
        }
    }
}

/// One frame's sub-steps over this worker's partition.
fn run_frame(index: usize, shared: &Shared) -> Result<(), BarrierBroken> {
    let (vehicles, dt, substeps) = {
        let job = lock(&shared.job);
        (job.vehicles.clone(), job.dt, job.substeps)
    };
    let terrain = read(&shared.terrain).clone();
    let partition: Vec<usize> = (0..vehicles.len())
        .filter(|&k| vehicles[k].0 .0 % shared.workers == index)
        .collect();

    for _ in 0..substeps {
        {
            let proxies = read(&shared.proxies);
            for &k in &partition {
                let (id, truck) = &vehicles[k];
                if let Some(err) = guard_vehicle(truck, |t| t.substep(dt, terrain.as_ref(), &proxies)) {
                    lock(&shared.faults).push((k, *id, err));
                }
            }
        }
        shared.substep.wait()?;
        {
            let mut proxies = write(&shared.proxies);
            for &k in &partition {
                let (id, truck) = &vehicles[k];
                let Some(proxy) = proxies.get_mut(k) else { continue };
                let published = guard_vehicle(truck, |t| {
                    t.publish_proxy(proxy);
                    Ok(())
                });
                if let Some(err) = published {
                    proxy.clear();
                    lock(&shared.faults).push((k, *id, err));
                }
            }
        }
        shared.substep.wait()?;
    }
    Ok(())
}

/// Runs vehicle code, converting a panic into a fault of that vehicle only.
fn guard_vehicle(
    truck: &Mutex<Truck>,
    work: impl FnOnce(&mut Truck) -> Result<(), PhysicsError>,
) -> Option<PhysicsError> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| work(&mut lock(truck))));
    match result {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(payload) => {
            let err = PhysicsError::WorkerFault(panic_message(payload.as_ref()));
            lock(truck).mark_faulted(err.to_string());
            Some(err)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// A poisoned lock only means a vehicle panicked mid-step; that vehicle is
// already marked faulted and the data stays readable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T: ?Sized>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T: ?Sized>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TruckBuilder;
    use crate::config::TruckConfig;
    use crate::ground::GroundSample;
    use crate::store::BeamSpec;
    use crate::truck::SimState;
    use crate::ground::GroundModel;

    /// Unit cube of 8 nodes braced on every face, with a triangulated hull.
    fn cube(center: Vector3<f64>) -> Truck {
        let mut b = TruckBuilder::new();
        let mut nodes = Vec::new();
        for i in 0..8 {
            let offset = Vector3::new(
                if i & 1 == 0 { -0.5 } else { 0.5 },
                if i & 2 == 0 { -0.5 } else { 0.5 },
                if i & 4 == 0 { -0.5 } else { 0.5 },
            );
            nodes.push(b.add_node(center + offset, 10.0));
        }
        for i in 0..8 {
            for j in (i + 1)..8 {
                b.add_beam(nodes[i], nodes[j], BeamSpec::new(2.0e5, 500.0)).unwrap();
            }
        }
        for face in [[0, 1, 3, 2], [4, 6, 7, 5], [0, 4, 5, 1], [2, 3, 7, 6], [0, 2, 6, 4], [1, 5, 7, 3]] {
            b.add_collision_triangle([face[0], face[1], face[2]]).unwrap();
            b.add_collision_triangle([face[0], face[2], face[3]]).unwrap();
        }
        b.build("cube", TruckConfig::default()).unwrap()
    }

    fn config(workers: usize) -> SchedulerConfig {
        SchedulerConfig { workers, ..SchedulerConfig::default() }
    }

    fn trajectories(workers: usize) -> Vec<Vec<Vector3<f64>>> {
        let mut scheduler = Scheduler::new(config(workers)).unwrap();
        let ids: Vec<_> = [0.0, 1.05, 2.1, 3.15]
            .iter()
            .map(|&x| scheduler.add_vehicle(cube(Vector3::new(x, 0.7 + x * 0.2, 0.0))))
            .collect();
        for _ in 0..20 {
            scheduler.frame_step(1.0 / 60.0);
        }
        ids.iter()
            .map(|&id| scheduler.vehicle(id).unwrap().node_positions())
            .collect()
    }

    #[test]
    fn test_substep_count_rounds_and_clamps() {
        let scheduler = Scheduler::new(config(1)).unwrap();
        assert_eq!(scheduler.substeps_for(0.01), (20, 0));
        assert_eq!(scheduler.substeps_for(0.2), (200, 200));
        assert_eq!(scheduler.substeps_for(0.0), (0, 0));
        assert_eq!(scheduler.substeps_for(f64::NAN), (0, 0));
    }

    #[test]
    fn test_results_independent_of_worker_count() {
        let single = trajectories(1);
        let triple = trajectories(3);
        assert_eq!(single, triple);
    }

    #[test]
    fn test_vehicles_fall_and_settle_on_ground() {
        let mut scheduler = Scheduler::new(config(2)).unwrap();
        let id = scheduler.add_vehicle(cube(Vector3::new(0.0, 1.0, 0.0)));
        for _ in 0..120 {
            let report = scheduler.frame_step(1.0 / 60.0);
            assert!(report.faults.is_empty());
        }
        let truck = scheduler.vehicle(id).unwrap();
        let lowest = truck.lowest_node().unwrap();
        assert!(truck.nodes()[lowest].position.y.abs() < 0.05);
        assert_eq!(truck.stats().substeps, 120 * 33);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    }

    /// Ground that panics when sampled beyond `limit` on X.
    struct BrokenTerrain {
        limit: f64,
        model: GroundModel,
    }

    impl TerrainQuery for BrokenTerrain {
        fn sample(&self, x: f64, _z: f64) -> Option<GroundSample> {
            assert!(x < self.limit, "terrain tile missing at x={}", x);
            Some(GroundSample {
                height: 0.0,
                normal: Vector3::y(),
                model: crate::ground::GroundModelId(0),
                exact: true,
            })
        }

        fn ground_model(&self, _id: crate::ground::GroundModelId) -> Option<&GroundModel> {
            Some(&self.model)
        }
    }

    #[test]
    fn test_worker_panic_faults_only_that_vehicle() {
        let terrain = Arc::new(BrokenTerrain { limit: 50.0, model: GroundModel::new("concrete", 0.8, 0.7) });
        let mut scheduler = Scheduler::with_terrain(config(2), terrain).unwrap();
        let healthy = scheduler.add_vehicle(cube(Vector3::new(0.0, 1.0, 0.0)));
        let doomed = scheduler.add_vehicle(cube(Vector3::new(100.0, 1.0, 0.0)));

        let report = scheduler.frame_step(1.0 / 60.0);
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].0, doomed);
        assert!(matches!(report.faults[0].1, PhysicsError::WorkerFault(_)));
        assert!(matches!(scheduler.vehicle(doomed).unwrap().state(), SimState::Faulted(_)));

        let report = scheduler.frame_step(1.0 / 60.0);
        assert!(report.faults.is_empty());
        assert_eq!(scheduler.vehicle(healthy).unwrap().stats().substeps, 66);
    }

    #[test]
    fn test_guard_turns_publish_panic_into_fault() {
        let truck = Mutex::new(cube(Vector3::new(0.0, 1.0, 0.0)));
        let err = guard_vehicle(&truck, |_: &mut Truck| -> Result<(), PhysicsError> {
            panic!("proxy refresh failed")
        });
        assert!(matches!(err, Some(PhysicsError::WorkerFault(ref m)) if m.contains("proxy refresh failed")));
        assert!(lock(&truck).is_faulted());
    }

    #[test]
    fn test_broken_pool_reports_faults_and_drops() {
        let mut scheduler = Scheduler::new(config(2)).unwrap();
        let first = scheduler.add_vehicle(cube(Vector3::new(0.0, 1.0, 0.0)));
        scheduler.add_vehicle(cube(Vector3::new(3.0, 1.0, 0.0)));
        // Workers can no longer meet between sub-steps
        scheduler.shared.substep.break_barrier();

        let report = scheduler.frame_step(1.0 / 60.0);
        assert!(scheduler.is_stopped());
        assert_eq!(report.faults.len(), 2);
        assert_eq!(report.faults[0].0, first);
        assert!(matches!(report.faults[0].1, PhysicsError::WorkerFault(_)));

        let report = scheduler.frame_step(1.0 / 60.0);
        assert_eq!(report.faults.len(), 2);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        drop(scheduler);
    }

    #[test]
    fn test_floating_origin_preserves_world_positions() {
        let cfg = SchedulerConfig { floating_origin_threshold: 100.0, ..config(1) };
        let mut scheduler = Scheduler::new(cfg).unwrap();
        let far = scheduler.add_vehicle(cube(Vector3::new(150.0, 1.0, 0.0)));
        let near = scheduler.add_vehicle(cube(Vector3::new(0.0, 1.0, 0.0)));
        let world_near = scheduler.vehicle(near).unwrap().world_position();

        let report = scheduler.frame_step(0.0005);
        assert!(report.recentered);
        assert!(scheduler.vehicle(far).unwrap().position().x.abs() < 1.0);
        assert!((scheduler.origin().x - 150.0).abs() < 1.0);
        let moved = scheduler.vehicle(near).unwrap().world_position();
        assert!((moved - world_near).norm() < 0.01);
    }

    #[test]
    fn test_queued_reset_runs_after_frame() {
        let mut scheduler = Scheduler::new(config(1)).unwrap();
        let id = scheduler.add_vehicle(cube(Vector3::new(0.0, 5.0, 0.0)));
        let spawn = scheduler.vehicle(id).unwrap().node_positions();
        scheduler.frame_step(0.1);
        scheduler.vehicle(id).unwrap().request_reset(false);
        scheduler.frame_step(0.1);
        assert_eq!(scheduler.vehicle(id).unwrap().node_positions(), spawn);
    }

    #[test]
    fn test_remove_vehicle_and_unknown_ids() {
        let mut scheduler = Scheduler::new(config(2)).unwrap();
        let a = scheduler.add_vehicle(cube(Vector3::new(0.0, 1.0, 0.0)));
        let b = scheduler.add_vehicle(cube(Vector3::new(5.0, 1.0, 0.0)));
        scheduler.frame_step(0.01);
        let truck = scheduler.remove_vehicle(a).unwrap();
        assert_eq!(truck.id(), a);
        assert_eq!(scheduler.vehicle_ids(), vec![b]);
        assert_eq!(scheduler.focus(), Some(b));
        assert!(matches!(scheduler.vehicle(a), Err(PhysicsError::UnknownVehicle(0))));
        scheduler.frame_step(0.01);
    }
}
