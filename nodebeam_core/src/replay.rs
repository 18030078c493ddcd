//! Replay ring buffer of node-position frames.

use nalgebra::Vector3;
use std::collections::VecDeque;

/// Fixed-capacity history of node positions, newest at the front.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    frames: VecDeque<Vec<Vector3<f64>>>,
    capacity: usize,
    interval: f64,
    accumulated: f64,
}

impl ReplayBuffer {
    /// `interval` is the simulated time between captures; 0 captures every tick.
    pub fn new(capacity: usize, interval: f64) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            interval: interval.max(0.0),
            accumulated: 0.0,
        }
    }

    /// Advances the capture clock; records a frame when an interval has elapsed.
    pub fn tick<'a>(&mut self, dt: f64, positions: impl Iterator<Item = &'a Vector3<f64>>) -> bool {
        self.accumulated += dt;
        if self.accumulated + 1e-12 < self.interval {
            return false;
        }
        self.accumulated = 0.0;
        self.capture(positions);
        true
    }

    /// Records a frame unconditionally, evicting the oldest when full.
    pub fn capture<'a>(&mut self, positions: impl Iterator<Item = &'a Vector3<f64>>) {
        let mut frame = if self.frames.len() >= self.capacity {
            self.frames.pop_back().unwrap_or_default()
        } else {
            Vec::new()
        };
        frame.clear();
        frame.extend(positions.copied());
        self.frames.push_front(frame);
    }

    /// Frame `steps_back` captures ago (0 = newest).
    pub fn frame(&self, steps_back: usize) -> Option<&[Vector3<f64>]> {
        self.frames.get(steps_back).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn translate(&mut self, offset: &Vector3<f64>) {
        for frame in &mut self.frames {
            for p in frame.iter_mut() {
                *p += offset;
            }
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.accumulated = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(x: f64) -> Vec<Vector3<f64>> {
        vec![Vector3::new(x, 0.0, 0.0)]
    }

    #[test]
    fn test_interval_gates_capture() {
        let mut replay = ReplayBuffer::new(4, 0.1);
        let p = positions(1.0);
        assert!(!replay.tick(0.05, p.iter()));
        assert!(replay.tick(0.05, p.iter()));
        assert_eq!(replay.len(), 1);
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut replay = ReplayBuffer::new(3, 0.0);
        for i in 0..5 {
            replay.capture(positions(i as f64).iter());
        }
        assert_eq!(replay.len(), 3);
        assert_eq!(replay.frame(0).unwrap()[0].x, 4.0);
        assert_eq!(replay.frame(2).unwrap()[0].x, 2.0);
        assert!(replay.frame(3).is_none());
    }
}
