//! Common types for the nodebeam environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a replicated vehicle stream.
///
/// One stream carries the state of exactly one remotely driven vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub Uuid);

impl StreamId {
    /// Creates a new random StreamId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
    
    /// Creates a StreamId from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
    
    /// Creates a deterministic StreamId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
    
    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Envelope for node-state packets transmitted between simulator instances.
///
/// The payload is opaque to the transport; the physics core owns the
/// encoding. Receivers order packets by `timestamp_ms`, never by arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePacketEnvelope {
    /// Stream this packet belongs to
    pub stream: StreamId,
    
    /// Sender's simulation clock when the state was captured
    pub timestamp_ms: u64,
    
    /// Encoded node-state frame
    pub payload: Vec<u8>,
}

impl StatePacketEnvelope {
    /// Creates a new envelope from payload bytes.
    pub fn new(stream: StreamId, payload: Vec<u8>, timestamp_ms: u64) -> Self {
        Self {
            stream,
            timestamp_ms,
            payload,
        }
    }
    
    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_stream_id_from_seed_is_stable() {
        assert_eq!(StreamId::from_seed(7), StreamId::from_seed(7));
        assert_ne!(StreamId::from_seed(7), StreamId::from_seed(8));
    }
    
    #[test]
    fn test_stream_id_display_is_short() {
        let id = StreamId::from_seed(42);
        assert_eq!(id.to_string().len(), 8);
    }
    
    #[test]
    fn test_envelope_size() {
        let env = StatePacketEnvelope::new(StreamId::from_seed(1), vec![0u8; 12], 100);
        assert_eq!(env.size(), 12);
        assert_eq!(env.timestamp_ms, 100);
    }
}
