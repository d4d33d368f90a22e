//! Compact encodings for replicated vectors and positions

use crate::core::coordinates::VirtualPosition;
use glam::{DVec3, IVec3, Vec3};
use serde::{Deserialize, Serialize};

const DIRECTION_SCALE: f32 = i16::MAX as f32;

/// Vector stored as an f32 magnitude and an i16-quantized unit direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressedVector {
    pub magnitude: f32,
    pub direction: [i16; 3],
}

impl CompressedVector {
    pub fn compress(value: DVec3) -> Self {
        let magnitude = value.length();
        if !magnitude.is_finite() || magnitude <= f64::EPSILON {
            return Self::default();
        }
        let unit = (value / magnitude).as_vec3();
        let quantize = |component: f32| (component * DIRECTION_SCALE).round() as i16;
        Self {
            magnitude: magnitude as f32,
            direction: [quantize(unit.x), quantize(unit.y), quantize(unit.z)],
        }
    }

    pub fn decompress(&self) -> DVec3 {
        let direction = Vec3::new(
            self.direction[0] as f32,
            self.direction[1] as f32,
            self.direction[2] as f32,
        ) / DIRECTION_SCALE;
        let length = direction.length();
        if length <= f32::EPSILON {
            return DVec3::ZERO;
        }
        (direction / length).as_dvec3() * self.magnitude as f64
    }
}

/// Position carried by a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PositionEncoding {
    /// Self-contained position, usable as a baseline
    Full(VirtualPosition),
    /// Sector relative to a previous keyframe plus the offset in that sector
    Delta {
        baseline: u32,
        sector_delta: [i8; 3],
        offset: Vec3,
    },
}

impl PositionEncoding {
    /// Encode `current`, as a delta when the baseline is close enough
    pub fn encode(current: VirtualPosition, baseline: Option<(u32, VirtualPosition)>) -> Self {
        let Some((sequence, base)) = baseline else {
            return PositionEncoding::Full(current);
        };

        let delta = current.sector - base.sector;
        let narrow = |value: i32| i8::try_from(value).ok();
        match (narrow(delta.x), narrow(delta.y), narrow(delta.z)) {
            (Some(x), Some(y), Some(z)) => PositionEncoding::Delta {
                baseline: sequence,
                sector_delta: [x, y, z],
                offset: current.offset,
            },
            _ => PositionEncoding::Full(current),
        }
    }

    /// Reconstruct the position; deltas need the baseline they reference
    pub fn decode(&self, baseline: Option<(u32, VirtualPosition)>) -> Option<VirtualPosition> {
        match *self {
            PositionEncoding::Full(position) => Some(position),
            PositionEncoding::Delta {
                baseline: wanted,
                sector_delta,
                offset,
            } => {
                let (sequence, base) = baseline?;
                if sequence != wanted {
                    return None;
                }
                let delta = IVec3::new(
                    sector_delta[0] as i32,
                    sector_delta[1] as i32,
                    sector_delta[2] as i32,
                );
                Some(VirtualPosition::new(base.sector + delta, offset))
            }
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PositionEncoding::Full(_))
    }

    /// Keyframe sequence a delta depends on
    pub fn baseline(&self) -> Option<u32> {
        match self {
            PositionEncoding::Full(_) => None,
            PositionEncoding::Delta { baseline, .. } => Some(*baseline),
        }
    }
}
