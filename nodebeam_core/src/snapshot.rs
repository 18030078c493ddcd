//! State snapshot capability: a structured node-state frame that vehicles
//! produce and consume, independent of how it is framed on the wire.

use crate::error::PhysicsError;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Turn-signal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlinkType {
    #[default]
    None,
    Left,
    Right,
    Warn,
}

/// Replicated light and brake flags, packed into 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct LightState(pub u16);

impl LightState {
    pub const HEADLIGHTS: u16 = 1 << 0;
    pub const BEACONS: u16 = 1 << 1;
    pub const BRAKE: u16 = 1 << 2;
    pub const PARKING_BRAKE: u16 = 1 << 3;
    pub const BLINK_LEFT: u16 = 1 << 4;
    pub const BLINK_RIGHT: u16 = 1 << 5;
    pub const BLINK_WARN: u16 = 1 << 6;

    #[inline]
    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    #[inline]
    pub fn set(&mut self, flag: u16, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    pub fn blink_type(self) -> BlinkType {
        if self.contains(Self::BLINK_WARN) {
            BlinkType::Warn
        } else if self.contains(Self::BLINK_LEFT) {
            BlinkType::Left
        } else if self.contains(Self::BLINK_RIGHT) {
            BlinkType::Right
        } else {
            BlinkType::None
        }
    }

    pub fn set_blink_type(&mut self, blink: BlinkType) {
        self.set(Self::BLINK_LEFT, blink == BlinkType::Left);
        self.set(Self::BLINK_RIGHT, blink == BlinkType::Right);
        self.set(Self::BLINK_WARN, blink == BlinkType::Warn);
    }
}

/// Full node state of one vehicle at one instant, in world coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStateFrame {
    /// Sender's simulation time
    pub timestamp_ms: u64,

    /// Reference point the wire codec encodes positions relative to
    pub reference: Vector3<f64>,

    pub positions: Vec<Vector3<f64>>,
    pub velocities: Vec<Vector3<f64>>,

    /// Mean wheel rim speed in m/s
    pub wheel_speed: f64,

    pub flags: LightState,
}

impl NodeStateFrame {
    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    /// Linear blend of two frames with the same node count; flags come from `b`.
    pub fn lerp(a: &NodeStateFrame, b: &NodeStateFrame, alpha: f64) -> Result<NodeStateFrame, PhysicsError> {
        if a.node_count() != b.node_count() {
            return Err(PhysicsError::NodeCountMismatch {
                expected: a.node_count(),
                got: b.node_count(),
            });
        }
        let mix = |x: &Vector3<f64>, y: &Vector3<f64>| x + (y - x) * alpha;
        Ok(NodeStateFrame {
            timestamp_ms: b.timestamp_ms,
            reference: mix(&a.reference, &b.reference),
            positions: a.positions.iter().zip(&b.positions).map(|(x, y)| mix(x, y)).collect(),
            velocities: a.velocities.iter().zip(&b.velocities).map(|(x, y)| mix(x, y)).collect(),
            wheel_speed: a.wheel_speed + (b.wheel_speed - a.wheel_speed) * alpha,
            flags: b.flags,
        })
    }
}

/// Produce and consume whole-vehicle node state.
pub trait StateSnapshot {
    /// Captures current node state in world coordinates.
    fn capture_state(&self, timestamp_ms: u64) -> NodeStateFrame;

    /// Overwrites node state from a frame of the same node count.
    fn apply_state(&mut self, frame: &NodeStateFrame) -> Result<(), PhysicsError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frame(ts: u64, x: f64) -> NodeStateFrame {
        NodeStateFrame {
            timestamp_ms: ts,
            reference: Vector3::new(x, 0.0, 0.0),
            positions: vec![Vector3::new(x, 1.0, 0.0)],
            velocities: vec![Vector3::zeros()],
            wheel_speed: x,
            flags: LightState::default(),
        }
    }

    #[test]
    fn test_blink_round_trip() {
        let mut flags = LightState::default();
        flags.set_blink_type(BlinkType::Left);
        assert_eq!(flags.blink_type(), BlinkType::Left);
        flags.set_blink_type(BlinkType::Warn);
        assert_eq!(flags.blink_type(), BlinkType::Warn);
        assert!(!flags.contains(LightState::BLINK_LEFT));
    }

    #[test]
    fn test_lerp_midpoint() {
        let mid = NodeStateFrame::lerp(&frame(0, 0.0), &frame(100, 2.0), 0.5).unwrap();
        assert_relative_eq!(mid.positions[0].x, 1.0);
        assert_relative_eq!(mid.wheel_speed, 1.0);
    }

    #[test]
    fn test_lerp_rejects_mismatched_frames() {
        let mut b = frame(100, 2.0);
        b.positions.push(Vector3::zeros());
        assert!(NodeStateFrame::lerp(&frame(0, 0.0), &b, 0.5).is_err());
    }
}
