//! Cyclic Barrier - reusable rendezvous for a fixed number of threads.
//!
//! Every `wait` blocks until `parties` threads have arrived, then releases
//! them together and starts a new generation. Exactly one thread per
//! generation is told it is the leader.
//!
//! A barrier can be broken: every blocked and every later `wait` returns
//! [`BarrierBroken`] until [`CyclicBarrier::reset`]. A thread that cannot
//! reach its next `wait` (it panicked, say) breaks the barrier so the others
//! do not block forever.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Returned by `wait` on a broken barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("barrier broken")]
pub struct BarrierBroken;

#[derive(Debug)]
struct BarrierState {
    /// Threads still expected in the current generation
    remaining: usize,
    generation: u64,
    broken: bool,

    /// Last generation ended by `reset` while threads were waiting
    abandoned: Option<u64>,
}

/// Outcome of one [`CyclicBarrier::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWait {
    /// Generation this wait completed
    pub generation: u64,

    /// True for the last thread to arrive
    pub is_leader: bool,
}

#[derive(Debug)]
pub struct CyclicBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl CyclicBarrier {
    /// Creates a barrier for `parties` threads (at least one).
    pub fn new(parties: usize) -> Self {
        let parties = parties.max(1);
        Self {
            parties,
            state: Mutex::new(BarrierState {
                remaining: parties,
                generation: 0,
                broken: false,
                abandoned: None,
            }),
            released: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Number of completed generations.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Threads currently blocked in `wait`.
    pub fn waiting(&self) -> usize {
        self.parties - self.lock().remaining
    }

    pub fn is_broken(&self) -> bool {
        self.lock().broken
    }

    /// Counts down and blocks until the generation completes.
    pub fn wait(&self) -> Result<BarrierWait, BarrierBroken> {
        let mut state = self.lock();
        if state.broken {
            return Err(BarrierBroken);
        }
        let generation = state.generation;
        state.remaining -= 1;

        if state.remaining == 0 {
            state.remaining = self.parties;
            state.generation += 1;
            self.released.notify_all();
            return Ok(BarrierWait { generation, is_leader: true });
        }

        while state.generation == generation && !state.broken {
            state = self.released.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if state.generation == generation || state.abandoned == Some(generation) {
            return Err(BarrierBroken);
        }
        Ok(BarrierWait { generation, is_leader: false })
    }

    /// Releases every waiter with [`BarrierBroken`]; later waits fail too.
    pub fn break_barrier(&self) {
        self.lock().broken = true;
        self.released.notify_all();
    }

    /// Starts a fresh generation and clears the broken flag.
    ///
    /// Threads blocked in the abandoned generation get [`BarrierBroken`].
    pub fn reset(&self) {
        let mut state = self.lock();
        if state.remaining != self.parties || state.broken {
            state.abandoned = Some(state.generation);
        }
        state.generation += 1;
        state.remaining = self.parties;
        state.broken = false;
        self.released.notify_all();
    }

    /// Lock recovery: the state is plain counters and flags, consistent between statements.
    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn run_rounds(parties: usize, rounds: usize) -> (Arc<CyclicBarrier>, usize) {
        let barrier = Arc::new(CyclicBarrier::new(parties));
        let leaders = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..parties)
            .map(|_| {
                let barrier = barrier.clone();
                let leaders = leaders.clone();
                thread::spawn(move || {
                    for _ in 0..rounds {
                        if barrier.wait().unwrap().is_leader {
                            leaders.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let count = leaders.load(Ordering::SeqCst);
        (barrier, count)
    }

    #[test]
    fn test_single_party_never_blocks() {
        let barrier = CyclicBarrier::new(1);
        for i in 0..5 {
            let wait = barrier.wait().unwrap();
            assert!(wait.is_leader);
            assert_eq!(wait.generation, i);
        }
        assert_eq!(barrier.generation(), 5);
    }

    #[test]
    fn test_zero_parties_treated_as_one() {
        assert_eq!(CyclicBarrier::new(0).parties(), 1);
    }

    #[test]
    fn test_no_thread_passes_early() {
        let barrier = Arc::new(CyclicBarrier::new(3));
        let arrived = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let barrier = barrier.clone();
                let arrived = arrived.clone();
                thread::spawn(move || {
                    arrived.fetch_add(1, Ordering::SeqCst);
                    barrier.wait().unwrap();
                    // Everyone must have arrived before anyone is released
                    assert_eq!(arrived.load(Ordering::SeqCst), 3);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(barrier.waiting(), 0);
    }

    #[test]
    fn test_reusable_across_generations() {
        let (barrier, leaders) = run_rounds(4, 50);
        assert_eq!(barrier.generation(), 50);
        assert_eq!(leaders, 50);
    }

    #[test]
    fn test_break_releases_blocked_waiters() {
        let barrier = Arc::new(CyclicBarrier::new(3));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let barrier = barrier.clone();
                thread::spawn(move || barrier.wait())
            })
            .collect();
        while barrier.waiting() < 2 {
            thread::yield_now();
        }
        barrier.break_barrier();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Err(BarrierBroken));
        }
        assert!(barrier.is_broken());
        assert_eq!(barrier.wait(), Err(BarrierBroken));
    }

    #[test]
    fn test_reset_abandons_waiters_then_works_again() {
        let barrier = Arc::new(CyclicBarrier::new(2));
        let waiter = {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.wait())
        };
        while barrier.waiting() < 1 {
            thread::yield_now();
        }
        barrier.reset();
        assert_eq!(waiter.join().unwrap(), Err(BarrierBroken));
        assert_eq!(barrier.waiting(), 0);

        let (barrier, leaders) = {
            barrier.break_barrier();
            barrier.reset();
            assert!(!barrier.is_broken());
            let partner = {
                let barrier = barrier.clone();
                thread::spawn(move || barrier.wait().map(|w| w.is_leader))
            };
            let mine = barrier.wait().unwrap().is_leader;
            let theirs = partner.join().unwrap().unwrap();
            (barrier, [mine, theirs].iter().filter(|l| **l).count())
        };
        assert_eq!(leaders, 1);
        assert!(!barrier.is_broken());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_one_leader_per_generation(parties in 1usize..6, rounds in 1usize..20) {
            let (barrier, leaders) = run_rounds(parties, rounds);
            prop_assert_eq!(barrier.generation(), rounds as u64);
            prop_assert_eq!(leaders, rounds);
        }
    }
}
