//! In-process implementations backed by the system clock and crossbeam channels.

use crate::clock::SimClock;
use crate::error::EnvError;
use crate::transport::StreamTransport;
use crate::types::{StreamId, StatePacketEnvelope};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};

/// Production clock backed by `Instant`.
pub struct WallClock {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl WallClock {
    /// Creates a new WallClock.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock for WallClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Lossless, ordered transport between two endpoints in one process.
///
/// Plugs into `SimWorld::replicate_over` when a mirror should see every
/// snapshot without simulated latency or loss.
pub struct ChannelTransport {
    /// Stream this endpoint publishes on
    local_id: StreamId,
    
    /// Outgoing packets
    tx: Sender<StatePacketEnvelope>,
    
    /// Incoming packets
    rx: Receiver<StatePacketEnvelope>,
}

impl ChannelTransport {
    /// Creates two connected endpoints.
    pub fn pair(a: StreamId, b: StreamId) -> (Self, Self) {
        let (tx_ab, rx_ab) = channel::unbounded();
        let (tx_ba, rx_ba) = channel::unbounded();
        (
            Self { local_id: a, tx: tx_ab, rx: rx_ba },
            Self { local_id: b, tx: tx_ba, rx: rx_ab },
        )
    }
}

impl StreamTransport for ChannelTransport {
    fn send(&self, packet: StatePacketEnvelope) -> Result<(), EnvError> {
        self.tx
            .send(packet)
            .map_err(|_| EnvError::transport("Channel closed"))
    }
    
    fn try_recv(&self) -> Option<StatePacketEnvelope> {
        match self.rx.try_recv() {
            Ok(packet) => Some(packet),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
    
    fn local_id(&self) -> StreamId {
        self.local_id
    }
}
