//! nodebeam Environment Abstraction Layer
//!
//! This crate isolates everything the physics core would otherwise have to
//! reach out to the host for:
//! - Time (`now()`, used to stamp outgoing state packets)
//! - Replication transport (`send()`, `try_recv()`)
//!
//! The physics core itself never blocks on either. Packets are drained
//! between frames and handed to the vehicle's sync adapter; the step loop
//! only ever sees already-received data.
//!
//! # Example
//!
//! ```ignore
//! use nodebeam_env::{ChannelTransport, ManualClock, SimClock, StreamId};
//!
//! let clock = ManualClock::new();
//! let (a, b) = ChannelTransport::pair(StreamId::from_seed(1), StreamId::from_seed(2));
//!
//! clock.advance(std::time::Duration::from_millis(33));
//! a.send(StatePacketEnvelope::new(a.local_id(), payload, clock.now_ms()))?;
//! while let Some(packet) = b.try_recv() {
//!     truck.push_packet(packet);
//! }
//! ```

mod clock;
mod transport;
mod types;
mod error;
mod channel_impl;

pub use clock::{SimClock, ManualClock};
pub use transport::{StreamTransport, TransportController};
pub use types::{StreamId, StatePacketEnvelope};
pub use error::EnvError;
pub use channel_impl::{ChannelTransport, WallClock};
