//! Replication transport abstraction.

use crate::error::EnvError;
use crate::types::{StreamId, StatePacketEnvelope};

/// Abstraction for moving state packets between simulator instances.
///
/// # Implementations
///
/// - **In-process**: `ChannelTransport`, a crossbeam channel pair
/// - **Simulation**: seeded latency/loss/reordering in `nodebeam_sim`
///
/// # Packet Flow
///
/// ```text
/// Authoritative sim            Transport                Mirror sim
///   |                             |                          |
///   |-- send(envelope) ---------->|                          |
///   |                             |-- [latency/jitter] ----->|
///   |                             |                          |-- try_recv() -> envelope
/// ```
///
/// `try_recv` never blocks: the caller drains it between frames so that no
/// physics step ever waits on I/O.
pub trait StreamTransport: Send + Sync {
    /// Queues a packet for delivery.
    ///
    /// # Returns
    /// * `Ok(())` - Packet queued
    /// * `Err(EnvError::TransportError)` - Immediate send failure
    ///
    /// # Note
    /// Success does not guarantee delivery.
    fn send(&self, packet: StatePacketEnvelope) -> Result<(), EnvError>;
    
    /// Returns the next delivered packet, if any.
    fn try_recv(&self) -> Option<StatePacketEnvelope>;
    
    /// Returns the stream this endpoint publishes on.
    fn local_id(&self) -> StreamId;
}

/// Fault-injection hooks for simulated transports.
pub trait TransportController: Send + Sync {
    /// Sets one-way latency for packets on a stream.
    fn set_latency(&self, stream: StreamId, latency_ms: u64);
    
    /// Sets packet loss probability for a stream (0.0 - 1.0).
    fn set_loss(&self, stream: StreamId, loss_rate: f64);
    
    /// Blocks a stream entirely.
    fn partition(&self, stream: StreamId);
    
    /// Unblocks all streams.
    fn heal_all(&self);
}
