//! Simulated replication network with seeded fault injection.
//!
//! All endpoints of one [`SimNetworkHub`] share a single in-flight queue and
//! a single ChaCha8 RNG, so delivery order, loss and jitter are a pure
//! function of the seed and the sequence of sends. Delivery time is measured
//! on the harness's [`ManualClock`].

use nodebeam_env::{EnvError, ManualClock, SimClock, StatePacketEnvelope, StreamId, StreamTransport, TransportController};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Impairments of packets published on one stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkParams {
    /// One-way base latency in milliseconds (default: 0)
    pub latency_ms: u64,

    /// Standard deviation of the added latency in milliseconds (default: 0)
    pub jitter_ms: f64,

    /// Probability a packet is lost (default: 0)
    pub loss_rate: f64,

    /// Probability a packet is held back one extra base latency (default: 0)
    pub reorder_rate: f64,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            jitter_ms: 0.0,
            loss_rate: 0.0,
            reorder_rate: 0.0,
        }
    }
}

/// Counters over the hub's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub sent: u64,
    pub delivered: u64,
    pub lost: u64,
    pub partitioned: u64,
}

#[derive(Debug)]
struct InFlight {
    deliver_at_ms: u64,
    seq: u64,
    to: StreamId,
    packet: StatePacketEnvelope,
}

#[derive(Debug)]
struct NetState {
    rng: ChaCha8Rng,
    queue: Vec<InFlight>,
    defaults: LinkParams,
    links: HashMap<StreamId, LinkParams>,
    partitioned: HashSet<StreamId>,
    seq: u64,
    stats: NetworkStats,
}

impl NetState {
    fn params(&self, stream: StreamId) -> LinkParams {
        self.links.get(&stream).copied().unwrap_or(self.defaults)
    }
}

/// Shared medium that hands out connected endpoints.
#[derive(Clone)]
pub struct SimNetworkHub {
    clock: ManualClock,
    state: Arc<Mutex<NetState>>,
}

impl SimNetworkHub {
    pub fn new(seed: u64, clock: ManualClock, defaults: LinkParams) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(NetState {
                rng: ChaCha8Rng::seed_from_u64(seed),
                queue: Vec::new(),
                defaults,
                links: HashMap::new(),
                partitioned: HashSet::new(),
                seq: 0,
                stats: NetworkStats::default(),
            })),
        }
    }

    /// Creates two endpoints; packets sent on one are delivered to the other.
    pub fn pair(&self, a: StreamId, b: StreamId) -> (SimNetwork, SimNetwork) {
        (self.endpoint(a, b), self.endpoint(b, a))
    }

    fn endpoint(&self, local_id: StreamId, peer: StreamId) -> SimNetwork {
        SimNetwork {
            local_id,
            peer,
            clock: self.clock.clone(),
            state: self.state.clone(),
        }
    }

    pub fn controller(&self) -> SimNetworkController {
        SimNetworkController { state: self.state.clone() }
    }

    pub fn stats(&self) -> NetworkStats {
        lock(&self.state).stats
    }

    /// Packets sent but not yet delivered (including ones not yet due).
    pub fn in_flight(&self) -> usize {
        lock(&self.state).queue.len()
    }
}

/// One endpoint of a simulated link.
pub struct SimNetwork {
    local_id: StreamId,
    peer: StreamId,
    clock: ManualClock,
    state: Arc<Mutex<NetState>>,
}

impl SimNetwork {
    pub fn peer(&self) -> StreamId {
        self.peer
    }
}

impl StreamTransport for SimNetwork {
    fn send(&self, packet: StatePacketEnvelope) -> Result<(), EnvError> {
        let now = self.clock.now_ms();
        let mut state = lock(&self.state);
        state.stats.sent += 1;

        if state.partitioned.contains(&self.local_id) {
            state.stats.partitioned += 1;
            return Err(EnvError::unreachable(self.peer));
        }
        let params = state.params(self.local_id);
        if params.loss_rate > 0.0 && state.rng.gen::<f64>() < params.loss_rate {
            state.stats.lost += 1;
            debug!("Stream {} lost packet at {} ms", self.local_id, packet.timestamp_ms);
            return Ok(());
        }

        let mut delay = params.latency_ms as f64;
        if params.jitter_ms > 0.0 {
            if let Ok(normal) = Normal::new(0.0, params.jitter_ms) {
                delay += normal.sample(&mut state.rng).abs();
            }
        }
        if params.reorder_rate > 0.0 && state.rng.gen::<f64>() < params.reorder_rate {
            delay += params.latency_ms as f64;
        }

        let seq = state.seq;
        state.seq += 1;
        state.queue.push(InFlight {
            deliver_at_ms: now + delay.round() as u64,
            seq,
            to: self.peer,
            packet,
        });
        Ok(())
    }

    fn try_recv(&self) -> Option<StatePacketEnvelope> {
        let now = self.clock.now_ms();
        let mut state = lock(&self.state);
        let index = state
            .queue
            .iter()
            .enumerate()
            .filter(|(_, f)| f.to == self.local_id && f.deliver_at_ms <= now)
            .min_by_key(|(_, f)| (f.deliver_at_ms, f.seq))
            .map(|(i, _)| i)?;
        state.stats.delivered += 1;
        Some(state.queue.swap_remove(index).packet)
    }

    fn local_id(&self) -> StreamId {
        self.local_id
    }
}

/// Fault-injection handle for a hub.
pub struct SimNetworkController {
    state: Arc<Mutex<NetState>>,
}

impl SimNetworkController {
    /// Replaces every impairment of one stream at once.
    pub fn set_link(&self, stream: StreamId, params: LinkParams) {
        lock(&self.state).links.insert(stream, params);
    }

    pub fn link(&self, stream: StreamId) -> LinkParams {
        lock(&self.state).params(stream)
    }

    pub fn is_partitioned(&self, stream: StreamId) -> bool {
        lock(&self.state).partitioned.contains(&stream)
    }
}

impl TransportController for SimNetworkController {
    fn set_latency(&self, stream: StreamId, latency_ms: u64) {
        let mut state = lock(&self.state);
        let mut params = state.params(stream);
        params.latency_ms = latency_ms;
        state.links.insert(stream, params);
    }

    fn set_loss(&self, stream: StreamId, loss_rate: f64) {
        let mut state = lock(&self.state);
        let mut params = state.params(stream);
        params.loss_rate = loss_rate.clamp(0.0, 1.0);
        state.links.insert(stream, params);
    }

    fn partition(&self, stream: StreamId) {
        lock(&self.state).partitioned.insert(stream);
    }

    fn heal_all(&self) {
        lock(&self.state).partitioned.clear();
    }
}

fn lock(state: &Mutex<NetState>) -> MutexGuard<'_, NetState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn packet(stream: StreamId, ts: u64) -> StatePacketEnvelope {
        StatePacketEnvelope::new(stream, vec![ts as u8], ts)
    }

    fn hub(params: LinkParams, seed: u64) -> (ManualClock, SimNetworkHub) {
        let clock = ManualClock::new();
        let hub = SimNetworkHub::new(seed, clock.clone(), params);
        (clock, hub)
    }

    #[test]
    fn test_latency_holds_packets_until_due() {
        let (clock, hub) = hub(LinkParams { latency_ms: 50, ..LinkParams::default() }, 1);
        let (a, b) = hub.pair(StreamId::from_seed(1), StreamId::from_seed(2));
        a.send(packet(a.local_id(), 0)).unwrap();

        clock.advance(Duration::from_millis(49));
        assert!(b.try_recv().is_none());
        clock.advance(Duration::from_millis(1));
        assert_eq!(b.try_recv().map(|p| p.timestamp_ms), Some(0));
        assert!(a.try_recv().is_none());
        assert_eq!(hub.stats().delivered, 1);
    }

    #[test]
    fn test_partition_blocks_and_heals() {
        let (_, hub) = hub(LinkParams::default(), 1);
        let (a, b) = hub.pair(StreamId::from_seed(1), StreamId::from_seed(2));
        let controller = hub.controller();

        controller.partition(a.local_id());
        assert!(a.send(packet(a.local_id(), 1)).is_err());
        assert!(b.send(packet(b.local_id(), 1)).is_ok());

        controller.heal_all();
        a.send(packet(a.local_id(), 2)).unwrap();
        assert_eq!(b.try_recv().map(|p| p.timestamp_ms), Some(2));
        assert_eq!(hub.stats().partitioned, 1);
    }

    #[test]
    fn test_total_loss_drops_everything() {
        let (clock, hub) = hub(LinkParams::default(), 3);
        let (a, b) = hub.pair(StreamId::from_seed(1), StreamId::from_seed(2));
        hub.controller().set_loss(a.local_id(), 1.0);
        for ts in 0..20 {
            a.send(packet(a.local_id(), ts)).unwrap();
        }
        clock.advance(Duration::from_secs(1));
        assert!(b.try_recv().is_none());
        assert_eq!(hub.stats().lost, 20);
    }

    #[test]
    fn test_same_seed_same_delivery_order() {
        let impaired = LinkParams { latency_ms: 20, jitter_ms: 15.0, loss_rate: 0.2, reorder_rate: 0.2 };
        let order = |seed| {
            let (clock, hub) = hub(impaired, seed);
            let (a, b) = hub.pair(StreamId::from_seed(1), StreamId::from_seed(2));
            let mut received = Vec::new();
            for ts in 0..100 {
                a.send(packet(a.local_id(), ts)).unwrap();
                clock.advance(Duration::from_millis(5));
                while let Some(p) = b.try_recv() {
                    received.push(p.timestamp_ms);
                }
            }
            received
        };
        assert_eq!(order(9), order(9));
        assert!(order(9).len() < 100);
    }
}
