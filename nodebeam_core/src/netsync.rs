//! Network Sync Adapter - drives a remote vehicle from received node state.
//!
//! Packets carry a timestamped [`NodeStateFrame`] (see [`crate::wire`]). The
//! adapter keeps the last two accepted frames and a playout clock running
//! `interpolation_delay` behind the newest one:
//!
//! - between the two frames: linear interpolation
//! - before the older frame: hold the older frame
//! - past the newest frame: extrapolate by its velocities for at most
//!   `max_extrapolation`, then freeze with zero velocity
//!
//! Timestamps must increase; a packet at or before the newest accepted
//! timestamp is discarded.

use crate::config::NetSyncConfig;
use crate::error::PhysicsError;
use crate::snapshot::{LightState, NodeStateFrame};
use crate::store::Node;
use crate::wire;
use nalgebra::Vector3;
use nodebeam_env::{StatePacketEnvelope, StreamId};
use tracing::debug;

/// What happened to a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    Accepted,
    /// Older than the newest accepted frame
    Stale,
    /// Same timestamp as the newest accepted frame
    Duplicate,
    /// Addressed to another stream
    WrongStream,
}

/// Current playback mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No frame received yet
    Waiting,
    Interpolating,
    Extrapolating,
    /// Extrapolation horizon exhausted; state frozen
    Holding,
}

/// How the current playout time maps onto the buffered frames.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Playback {
    Older,
    Newer,
    Lerp(f64),
    Ahead { seconds: f64, frozen: bool },
}

/// Per-vehicle replication receiver.
#[derive(Debug, Clone)]
pub struct NetworkSync {
    stream: StreamId,
    config: NetSyncConfig,
    node_count: usize,
    older: Option<NodeStateFrame>,
    newer: Option<NodeStateFrame>,

    /// Playout clock in milliseconds of sender time
    playout_ms: Option<f64>,
    playback: Playback,

    accepted: u64,
    discarded: u64,
}

impl NetworkSync {
    pub fn new(stream: StreamId, node_count: usize, config: NetSyncConfig) -> Self {
        Self {
            stream,
            config,
            node_count,
            older: None,
            newer: None,
            playout_ms: None,
            playback: Playback::Newer,
            accepted: 0,
            discarded: 0,
        }
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Decodes and buffers a packet.
    ///
    /// Decode failures and node-count mismatches are errors; stale and
    /// duplicate packets are reported through the outcome.
    pub fn push_packet(&mut self, envelope: &StatePacketEnvelope) -> Result<PacketOutcome, PhysicsError> {
        if envelope.stream != self.stream {
            return Ok(PacketOutcome::WrongStream);
        }
        let frame = wire::decode(&envelope.payload)?;
        self.push_frame(frame)
    }

    /// Buffers an already decoded frame.
    pub fn push_frame(&mut self, frame: NodeStateFrame) -> Result<PacketOutcome, PhysicsError> {
        if frame.node_count() != self.node_count || frame.velocities.len() != self.node_count {
            return Err(PhysicsError::NodeCountMismatch {
                expected: self.node_count,
                got: frame.node_count(),
            });
        }
        if let Some(newest) = &self.newer {
            let outcome = if frame.timestamp_ms == newest.timestamp_ms {
                Some(PacketOutcome::Duplicate)
            } else if frame.timestamp_ms < newest.timestamp_ms {
                Some(PacketOutcome::Stale)
            } else {
                None
            };
            if let Some(outcome) = outcome {
                self.discarded += 1;
                debug!(
                    "Stream {} discarded {:?} packet at {} ms (newest {} ms)",
                    self.stream, outcome, frame.timestamp_ms, newest.timestamp_ms
                );
                return Ok(outcome);
            }
        }

        if self.playout_ms.is_none() {
            self.playout_ms = Some(frame.timestamp_ms as f64 - self.config.interpolation_delay * 1000.0);
        }
        self.older = self.newer.take();
        self.newer = Some(frame);
        self.accepted += 1;
        Ok(PacketOutcome::Accepted)
    }

    /// Advances the playout clock by `dt` seconds and reports the playback mode.
    pub fn advance(&mut self, dt: f64) -> SyncStatus {
        let (Some(newer), Some(playout)) = (&self.newer, self.playout_ms.as_mut()) else {
            return SyncStatus::Waiting;
        };
        *playout += dt * 1000.0;
        let target = newer.timestamp_ms as f64 - self.config.interpolation_delay * 1000.0;
        if target - *playout > self.config.resync_threshold * 1000.0 {
            *playout = target;
        }
        let t = *playout;
        let newer_ts = newer.timestamp_ms as f64;

        self.playback = match &self.older {
            _ if t >= newer_ts => {
                let seconds = (t - newer_ts) / 1000.0;
                Playback::Ahead {
                    seconds: seconds.min(self.config.max_extrapolation),
                    frozen: seconds > self.config.max_extrapolation,
                }
            }
            Some(older) if t <= older.timestamp_ms as f64 => Playback::Older,
            Some(older) => {
                let older_ts = older.timestamp_ms as f64;
                Playback::Lerp((t - older_ts) / (newer_ts - older_ts))
            }
            None => Playback::Newer,
        };
        self.status()
    }

    pub fn status(&self) -> SyncStatus {
        if self.newer.is_none() {
            return SyncStatus::Waiting;
        }
        match self.playback {
            Playback::Ahead { frozen: true, .. } => SyncStatus::Holding,
            Playback::Ahead { seconds, .. } if seconds > 0.0 => SyncStatus::Extrapolating,
            _ => SyncStatus::Interpolating,
        }
    }

    /// World-space position and velocity of node `i` at the playout time.
    pub fn sample_node(&self, i: usize) -> Option<(Vector3<f64>, Vector3<f64>)> {
        let newer = self.newer.as_ref()?;
        let pn = *newer.positions.get(i)?;
        let vn = *newer.velocities.get(i)?;
        Some(match (self.playback, &self.older) {
            (Playback::Older, Some(older)) => (older.positions[i], older.velocities[i]),
            (Playback::Lerp(alpha), Some(older)) => {
                let (po, vo) = (older.positions[i], older.velocities[i]);
                (po + (pn - po) * alpha, vo + (vn - vo) * alpha)
            }
            (Playback::Ahead { seconds, frozen }, _) => {
                let velocity = if frozen { Vector3::zeros() } else { vn };
                (pn + vn * seconds, velocity)
            }
            _ => (pn, vn),
        })
    }

    /// Writes the sampled state into local-frame nodes (`world - origin`).
    pub fn write_nodes(&self, nodes: &mut [Node], origin: &Vector3<f64>) -> Result<(), PhysicsError> {
        if nodes.len() != self.node_count {
            return Err(PhysicsError::NodeCountMismatch {
                expected: self.node_count,
                got: nodes.len(),
            });
        }
        for (i, node) in nodes.iter_mut().enumerate() {
            if let Some((p, v)) = self.sample_node(i) {
                node.position = p - origin;
                node.velocity = v;
                node.force = Vector3::zeros();
            }
        }
        Ok(())
    }

    /// Wheel speed at the playout time.
    pub fn wheel_speed(&self) -> f64 {
        match (self.playback, &self.older, &self.newer) {
            (Playback::Lerp(alpha), Some(o), Some(n)) => o.wheel_speed + (n.wheel_speed - o.wheel_speed) * alpha,
            (Playback::Older, Some(o), _) => o.wheel_speed,
            (_, _, Some(n)) => n.wheel_speed,
            _ => 0.0,
        }
    }

    /// Flags of the newest frame.
    pub fn flags(&self) -> LightState {
        self.newer.as_ref().map(|f| f.flags).unwrap_or_default()
    }

    pub fn newest_timestamp(&self) -> Option<u64> {
        self.newer.as_ref().map(|f| f.timestamp_ms)
    }

    pub fn playout_ms(&self) -> Option<f64> {
        self.playout_ms
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
