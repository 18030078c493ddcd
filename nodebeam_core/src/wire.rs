//! Little-endian wire format for [`NodeStateFrame`].
//!
//! ```text
//! header  magic u32 | version u16 | flags u16 | timestamp u64 | node_count u32
//!         reference f64 x3 | wheel_speed f32
//! nodes   (position - reference) f32 x3 | velocity f32 x3   (node_count times)
//! ```
//!
//! Positions travel as f32 offsets from an f64 reference point so precision
//! does not degrade far from the world origin.

use crate::error::PhysicsError;
use crate::snapshot::{LightState, NodeStateFrame};
use nalgebra::Vector3;

pub const MAGIC: u32 = 0x3153_424E; // "NBS1"
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 4 + 2 + 2 + 8 + 4 + 3 * 8 + 4;
pub const NODE_LEN: usize = 6 * 4;

/// Serializes a frame.
pub fn encode(frame: &NodeStateFrame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + frame.node_count() * NODE_LEN);
    buf.extend_from_slice(&MAGIC.to_le_bytes());
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&frame.flags.0.to_le_bytes());
    buf.extend_from_slice(&frame.timestamp_ms.to_le_bytes());
    buf.extend_from_slice(&(frame.node_count() as u32).to_le_bytes());
    for c in frame.reference.iter() {
        buf.extend_from_slice(&c.to_le_bytes());
    }
    buf.extend_from_slice(&(frame.wheel_speed as f32).to_le_bytes());

    let zero = Vector3::zeros();
    for (i, p) in frame.positions.iter().enumerate() {
        let offset = p - frame.reference;
        let v = frame.velocities.get(i).unwrap_or(&zero);
        for c in offset.iter().chain(v.iter()) {
            buf.extend_from_slice(&(*c as f32).to_le_bytes());
        }
    }
    buf
}

/// Bounds-checked little-endian cursor.
struct Reader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], PhysicsError> {
        let end = self.at + N;
        let bytes = self
            .buf
            .get(self.at..end)
            .ok_or_else(|| PhysicsError::wire(format!("truncated at byte {} of {}", self.at, self.buf.len())))?;
        self.at = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, PhysicsError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, PhysicsError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64, PhysicsError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    fn f32(&mut self) -> Result<f64, PhysicsError> {
        Ok(f32::from_le_bytes(self.take()?) as f64)
    }

    fn f64(&mut self) -> Result<f64, PhysicsError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    fn vec3_f32(&mut self) -> Result<Vector3<f64>, PhysicsError> {
        Ok(Vector3::new(self.f32()?, self.f32()?, self.f32()?))
    }
}

/// Parses a frame, rejecting bad magic, unknown versions and length mismatches.
pub fn decode(buf: &[u8]) -> Result<NodeStateFrame, PhysicsError> {
    let mut r = Reader { buf, at: 0 };
    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(PhysicsError::wire(format!("bad magic {:#010x}", magic)));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(PhysicsError::wire(format!("unsupported version {}", version)));
    }
    let flags = LightState(r.u16()?);
    let timestamp_ms = r.u64()?;
    let count = r.u32()? as usize;
    let expected = HEADER_LEN + count * NODE_LEN;
    if buf.len() != expected {
        return Err(PhysicsError::wire(format!(
            "length {} does not match {} nodes ({} bytes)",
            buf.len(),
            count,
            expected
        )));
    }
    let reference = Vector3::new(r.f64()?, r.f64()?, r.f64()?);
    let wheel_speed = r.f32()?;

    let mut positions = Vec::with_capacity(count);
    let mut velocities = Vec::with_capacity(count);
    for _ in 0..count {
        positions.push(reference + r.vec3_f32()?);
        velocities.push(r.vec3_f32()?);
    }

    Ok(NodeStateFrame {
        timestamp_ms,
        reference,
        positions,
        velocities,
        wheel_speed,
        flags,
    })
}
