//! Clock abstraction used to timestamp replicated state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of simulation time.
///
/// # Implementations
///
/// - **Production**: `WallClock` - wraps `std::time::Instant`
/// - **Simulation**: `ManualClock` - advanced explicitly by the harness
pub trait SimClock: Send + Sync {
    /// Returns the time elapsed since the clock was created.
    fn now(&self) -> Duration;
    
    /// Returns `now()` in whole milliseconds, as used on the wire.
    fn now_ms(&self) -> u64 {
        self.now().as_millis() as u64
    }
}

/// Virtual clock that only moves when told to.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    /// Current virtual time (nanoseconds since start)
    time_ns: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Advances virtual time by the given duration.
    pub fn advance(&self, duration: Duration) {
        self.time_ns.fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
    
    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        self.time_ns.store(time_ns, Ordering::SeqCst);
    }
}

impl SimClock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_manual_clock_time() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(1));
        
        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.now_ms(), 1500);
    }
    
    #[test]
    fn test_manual_clock_clone_shares_time() {
        let c1 = ManualClock::new();
        let c2 = c1.clone();
        
        c1.advance(Duration::from_secs(5));
        assert_eq!(c1.now(), c2.now());
    }
    
    #[test]
    fn test_manual_clock_set_time() {
        let clock = ManualClock::new();
        clock.set_time(2_000_000);
        assert_eq!(clock.now_ms(), 2);
    }
}
