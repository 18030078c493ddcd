//! Error types for the nodebeam environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Transport send failed (peer dropped, channel closed, etc.)
    #[error("Transport error: {0}")]
    TransportError(String),
    
    /// Target stream is unreachable (simulated partition)
    #[error("Stream unreachable: {0}")]
    StreamUnreachable(String),
    
    /// Packet payload could not be framed or unframed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EnvError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }
    
    /// Creates an unreachable error.
    pub fn unreachable(stream: impl std::fmt::Display) -> Self {
        Self::StreamUnreachable(stream.to_string())
    }
}
