//! SimWorld - the simulation harness container.
//!
//! Owns the scheduler, a manually advanced clock and the simulated network.
//! Replicated vehicles are snapshotted on the sender side at a fixed send
//! interval, pushed through the lossy network and played back on mirror
//! vehicles that run in `Networked` state.

use crate::error::SimError;
use crate::exporter::SimFrame;
use crate::network::{LinkParams, NetworkStats, SimNetworkController, SimNetworkHub};

use nalgebra::Vector3;
use nodebeam_core::{
    wire, FrameReport, NetSyncConfig, PacketOutcome, PhysicsError, Scheduler, SchedulerConfig, StateSnapshot,
    TerrainQuery, Truck, TruckConfig, VehicleId,
};
use nodebeam_env::{ManualClock, SimClock, StatePacketEnvelope, StreamId, StreamTransport};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism (default: 42)
    pub seed: u64,

    /// Vehicles spawned by multi-vehicle scenarios (default: 4)
    pub vehicles: usize,

    /// Frames per second of simulated time (default: 50)
    pub frame_rate_hz: u32,

    /// Run length in seconds (default: 5.0)
    pub duration_secs: f64,

    /// Impairments of every replication stream
    pub network: LinkParams,

    /// Seconds between replication snapshots (default: 0.05)
    pub send_interval_secs: f64,

    pub scheduler: SchedulerConfig,

    pub truck: TruckConfig,

    pub net_sync: NetSyncConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            vehicles: 4,
            frame_rate_hz: 50,
            duration_secs: 5.0,
            network: LinkParams::default(),
            send_interval_secs: 0.05,
            scheduler: SchedulerConfig::default(),
            truck: TruckConfig::default(),
            net_sync: NetSyncConfig::default(),
        }
    }
}

impl SimConfig {
    /// Loads a (possibly partial) configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.frame_rate_hz == 0 {
            return Err(SimError::Config("frame_rate_hz must be positive".into()));
        }
        if !(self.send_interval_secs > 0.0) {
            return Err(SimError::Config("send_interval_secs must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.network.loss_rate) || !(0.0..=1.0).contains(&self.network.reorder_rate) {
            return Err(SimError::Config("loss and reorder rates must lie in [0, 1]".into()));
        }
        Ok(())
    }

    /// Seconds of simulated time per frame.
    pub fn frame_dt(&self) -> f64 {
        1.0 / self.frame_rate_hz.max(1) as f64
    }

    /// Frames needed to cover `duration_secs`.
    pub fn total_frames(&self) -> u64 {
        (self.duration_secs * self.frame_rate_hz as f64).round().max(0.0) as u64
    }
}

/// Sender/receiver pair feeding one mirror vehicle.
struct Replication {
    source: VehicleId,
    mirror: VehicleId,
    sender: Box<dyn StreamTransport>,
    receiver: Box<dyn StreamTransport>,
    next_send_secs: f64,
    sent: u64,
}

/// Packet counters of one replication link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationStats {
    pub snapshots_sent: u64,
    pub accepted: u64,
    pub discarded: u64,
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    config: SimConfig,
    clock: ManualClock,
    scheduler: Scheduler,
    hub: SimNetworkHub,
    replications: Vec<Replication>,
    frames: u64,
    time_secs: f64,

    /// Capture interval in frames and the frames captured so far
    recording: Option<(u64, Vec<SimFrame>)>,
}

impl SimWorld {
    /// Creates a world over flat ground at height zero.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let scheduler = Scheduler::new(config.scheduler.clone())?;
        Ok(Self::assemble(config, scheduler))
    }

    pub fn with_terrain(config: SimConfig, terrain: Arc<dyn TerrainQuery>) -> Result<Self, SimError> {
        config.validate()?;
        let scheduler = Scheduler::with_terrain(config.scheduler.clone(), terrain)?;
        Ok(Self::assemble(config, scheduler))
    }

    fn assemble(config: SimConfig, scheduler: Scheduler) -> Self {
        // Derive a separate seed for the network so it is independent of
        // whatever the scenario draws from the master seed
        let network_seed = config.seed.wrapping_mul(0x517cc1b727220a95);
        let clock = ManualClock::new();
        let hub = SimNetworkHub::new(network_seed, clock.clone(), config.network);
        Self {
            config,
            clock,
            scheduler,
            hub,
            replications: Vec::new(),
            frames: 0,
            time_secs: 0.0,
            recording: None,
        }
    }

    // ===== VEHICLES =====

    pub fn spawn(&mut self, truck: Truck) -> VehicleId {
        self.scheduler.add_vehicle(truck)
    }

    /// Adds `mirror` as a networked copy of `source` over the simulated network.
    ///
    /// The mirror must have the same node count. It never takes part in
    /// vehicle-vehicle contact, so it cannot push its source around.
    pub fn replicate(&mut self, source: VehicleId, mirror: Truck) -> Result<VehicleId, SimError> {
        let index = self.replications.len() as u64;
        let upstream = StreamId::from_seed(self.config.seed ^ (index << 32) ^ 0x5a5a);
        let downstream = StreamId::from_seed(self.config.seed ^ (index << 32) ^ 0xa5a5);
        let (sender, receiver) = self.hub.pair(upstream, downstream);
        self.replicate_over(source, mirror, Box::new(sender), Box::new(receiver))
    }

    /// Adds `mirror` as a networked copy of `source` over any transport pair.
    ///
    /// Snapshots go out on `sender` and are read from `receiver`; the mirror
    /// follows the sender's stream.
    pub fn replicate_over(
        &mut self,
        source: VehicleId,
        mut mirror: Truck,
        sender: Box<dyn StreamTransport>,
        receiver: Box<dyn StreamTransport>,
    ) -> Result<VehicleId, SimError> {
        let expected = self.scheduler.vehicle(source)?.node_count();
        if mirror.node_count() != expected {
            return Err(PhysicsError::NodeCountMismatch { expected, got: mirror.node_count() }.into());
        }

        let upstream = sender.local_id();
        mirror.set_networked(upstream, self.config.net_sync.clone());
        mirror.set_truck_truck_collisions(false);
        let mirror = self.scheduler.add_vehicle(mirror);
        info!("Vehicle {} replicated to {} over stream {}", source, mirror, upstream);

        self.replications.push(Replication {
            source,
            mirror,
            sender,
            receiver,
            next_send_secs: 0.0,
            sent: 0,
        });
        Ok(mirror)
    }

    pub fn vehicle(&self, id: VehicleId) -> Result<MutexGuard<'_, Truck>, SimError> {
        Ok(self.scheduler.vehicle(id)?)
    }

    pub fn vehicle_ids(&self) -> Vec<VehicleId> {
        self.scheduler.vehicle_ids()
    }

    // ===== STEPPING =====

    /// Advances physics, the clock and replication by one frame.
    pub fn step_frame(&mut self) -> Result<FrameReport, SimError> {
        let report = self.scheduler.frame_step(self.config.frame_dt());
        for (id, err) in &report.faults {
            debug!("Frame {}: vehicle {} raised {}", self.frames, id, err);
        }

        // The clock follows simulated time, not requested frame time
        let stepped = report.substeps as f64 * self.scheduler.config().substep_dt;
        self.clock.advance(Duration::from_secs_f64(stepped));
        self.frames += 1;
        self.time_secs += stepped;

        self.send_snapshots()?;
        self.deliver_snapshots()?;

        let due = matches!(self.recording, Some((every, _)) if self.frames % every == 0);
        if due {
            let frame = SimFrame::capture(self, &report)?;
            if let Some((_, frames)) = self.recording.as_mut() {
                frames.push(frame);
            }
        }
        Ok(report)
    }

    /// Captures a [`SimFrame`] every `every` frames; `None` stops recording.
    pub fn set_recording(&mut self, every: Option<u64>) {
        self.recording = every.map(|n| (n.max(1), Vec::new()));
    }

    /// Hands over the frames recorded so far.
    pub fn take_recording(&mut self) -> Option<Vec<SimFrame>> {
        self.recording.as_mut().map(|(_, frames)| std::mem::take(frames))
    }

    /// Steps `frames` frames and returns the reports in order.
    pub fn run_frames(&mut self, frames: u64) -> Result<Vec<FrameReport>, SimError> {
        (0..frames).map(|_| self.step_frame()).collect()
    }

    fn send_snapshots(&mut self) -> Result<(), SimError> {
        let now_ms = self.clock.now_ms();
        for link in &mut self.replications {
            if self.time_secs + 1e-9 < link.next_send_secs {
                continue;
            }
            link.next_send_secs += self.config.send_interval_secs;

            let frame = self.scheduler.vehicle(link.source)?.capture_state(now_ms);
            let packet = StatePacketEnvelope::new(link.sender.local_id(), wire::encode(&frame), now_ms);
            link.sent += 1;
            if let Err(err) = link.sender.send(packet) {
                debug!("Snapshot of {} not sent: {}", link.source, err);
            }
        }
        Ok(())
    }

    fn deliver_snapshots(&mut self) -> Result<(), SimError> {
        for link in &self.replications {
            while let Some(packet) = link.receiver.try_recv() {
                let outcome = self.scheduler.vehicle(link.mirror)?.push_network_packet(&packet)?;
                if outcome != PacketOutcome::Accepted {
                    debug!("Mirror {} ignored packet at {} ms: {:?}", link.mirror, packet.timestamp_ms, outcome);
                }
            }
        }
        Ok(())
    }

    // ===== INSPECTION =====

    /// Largest node distance between a replicated vehicle and its mirror.
    pub fn mirror_error(&self, mirror: VehicleId) -> Result<f64, SimError> {
        let link = self
            .replications
            .iter()
            .find(|l| l.mirror == mirror)
            .ok_or(PhysicsError::UnknownVehicle(mirror.0))?;
        let source = self.scheduler.vehicle(link.source)?.node_positions();
        let copy = self.scheduler.vehicle(link.mirror)?.node_positions();
        Ok(source
            .iter()
            .zip(&copy)
            .map(|(a, b): (&Vector3<f64>, &Vector3<f64>)| (a - b).norm())
            .fold(0.0, f64::max))
    }

    pub fn replication_stats(&self, mirror: VehicleId) -> Result<ReplicationStats, SimError> {
        let link = self
            .replications
            .iter()
            .find(|l| l.mirror == mirror)
            .ok_or(PhysicsError::UnknownVehicle(mirror.0))?;
        let truck = self.scheduler.vehicle(mirror)?;
        let sync = truck.network_sync().ok_or(PhysicsError::NotNetworked)?;
        Ok(ReplicationStats {
            snapshots_sent: link.sent,
            accepted: sync.accepted(),
            discarded: sync.discarded(),
        })
    }

    pub fn network_stats(&self) -> NetworkStats {
        self.hub.stats()
    }

    /// Fault-injection handle; streams are keyed by the sender's id.
    pub fn network_controller(&self) -> SimNetworkController {
        self.hub.controller()
    }

    /// Sender stream of the replication feeding `mirror`.
    pub fn replication_stream(&self, mirror: VehicleId) -> Option<StreamId> {
        self.replications.iter().find(|l| l.mirror == mirror).map(|l| l.sender.local_id())
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn time_secs(&self) -> f64 {
        self.time_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprints;
    use approx::assert_relative_eq;
    use nodebeam_env::ChannelTransport;

    fn config() -> SimConfig {
        SimConfig {
            scheduler: SchedulerConfig { workers: 1, ..SchedulerConfig::default() },
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_partial_json_config() {
        let config: SimConfig = serde_json::from_str(r#"{ "seed": 7, "network": { "latency_ms": 30 } }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.network.latency_ms, 30);
        assert_eq!(config.frame_rate_hz, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimConfig { frame_rate_hz: 0, ..SimConfig::default() };
        assert!(matches!(config.validate(), Err(SimError::Config(_))));
        assert!(SimWorld::new(config).is_err());
    }

    #[test]
    fn test_frames_advance_time() {
        let mut world = SimWorld::new(config()).unwrap();
        world.spawn(blueprints::node_pair(Vector3::new(0.0, 2.0, 0.0), TruckConfig::default()).unwrap());
        world.run_frames(25).unwrap();
        assert_eq!(world.frames(), 25);
        assert_relative_eq!(world.time_secs(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_recording_every_n_frames() {
        let mut world = SimWorld::new(config()).unwrap();
        world.spawn(blueprints::node_pair(Vector3::new(0.0, 2.0, 0.0), TruckConfig::default()).unwrap());
        world.set_recording(Some(5));
        world.run_frames(20).unwrap();
        let frames = world.take_recording().unwrap();
        assert_eq!(frames.iter().map(|f| f.frame).collect::<Vec<_>>(), vec![5, 10, 15, 20]);
        assert!(world.take_recording().unwrap().is_empty());
    }

    #[test]
    fn test_replicate_rejects_wrong_node_count() {
        let mut world = SimWorld::new(config()).unwrap();
        let source = world.spawn(blueprints::node_pair(Vector3::new(0.0, 2.0, 0.0), TruckConfig::default()).unwrap());
        let mirror = blueprints::cube(Vector3::new(0.0, 2.0, 0.0), 1.0, 5.0, TruckConfig::default()).unwrap();
        assert!(world.replicate(source, mirror).is_err());
    }

    #[test]
    fn test_mirror_follows_source() {
        let mut world = SimWorld::new(config()).unwrap();
        let source = world.spawn(blueprints::cube(Vector3::new(0.0, 3.0, 0.0), 1.0, 5.0, TruckConfig::default()).unwrap());
        let mirror = world
            .replicate(source, blueprints::cube(Vector3::new(0.0, 3.0, 0.0), 1.0, 5.0, TruckConfig::default()).unwrap())
            .unwrap();
        world.run_frames(200).unwrap();

        let stats = world.replication_stats(mirror).unwrap();
        assert!(stats.accepted > 0);
        assert!(stats.snapshots_sent >= stats.accepted);
        // Playback lags by the interpolation delay; after settling the gap is small
        assert!(world.mirror_error(mirror).unwrap() < 0.1);
    }

    #[test]
    fn test_mirror_follows_source_over_channel_transport() {
        let mut world = SimWorld::new(config()).unwrap();
        let source = world.spawn(blueprints::cube(Vector3::new(0.0, 3.0, 0.0), 1.0, 5.0, TruckConfig::default()).unwrap());
        let (sender, receiver) = ChannelTransport::pair(StreamId::from_seed(1), StreamId::from_seed(2));
        let mirror = world
            .replicate_over(
                source,
                blueprints::cube(Vector3::new(0.0, 3.0, 0.0), 1.0, 5.0, TruckConfig::default()).unwrap(),
                Box::new(sender),
                Box::new(receiver),
            )
            .unwrap();
        assert_eq!(world.replication_stream(mirror), Some(StreamId::from_seed(1)));
        world.run_frames(200).unwrap();

        // Lossless and ordered, so every snapshot lands
        let stats = world.replication_stats(mirror).unwrap();
        assert!(stats.snapshots_sent > 0);
        assert_eq!(stats.accepted, stats.snapshots_sent);
        assert!(world.mirror_error(mirror).unwrap() < 0.1);
    }
}
