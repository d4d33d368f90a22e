//! Authoritative vehicle state as broadcast by the server

use super::compression::{CompressedVector, PositionEncoding};
use super::movement::VehicleState;
use crate::core::coordinates::VirtualPosition;
use glam::Quat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkStateSnapshot {
    pub vehicle_id: u32,
    /// Per-vehicle snapshot counter, strictly increasing
    pub sequence: u32,
    /// Server clock in seconds
    pub timestamp: f64,
    pub position: PositionEncoding,
    pub velocity: CompressedVector,
    pub orientation: Quat,
    pub angular_velocity: CompressedVector,
    pub scale_factor: f32,
    /// Highest input sequence the server had applied
    pub last_processed_input: u32,
    /// Hash of that input, zero when none was applied
    pub input_hash: u32,
    /// Number of origin re-centers the server had performed
    pub origin_epoch: u32,
}

impl NetworkStateSnapshot {
    /// Whether the snapshot carries a full position
    pub fn is_keyframe(&self) -> bool {
        self.position.is_full()
    }

    /// Rebuild the vehicle state given the position decoded from it
    pub fn to_state(&self, position: VirtualPosition, sector_size: f64) -> VehicleState {
        VehicleState {
            position: position.to_world(sector_size),
            velocity: self.velocity.decompress(),
            orientation: self.orientation.as_dquat().normalize(),
            angular_velocity: self.angular_velocity.decompress(),
        }
    }
}
