//! Sector-addressed positions for replication and long-range bookkeeping
//!
//! A virtual position splits a world position into a coarse integer sector
//! address and a single-precision offset inside that sector. The sector grid
//! is fixed per world (see `OriginConfig::sector_size`), so only the integer
//! cell and the f32 offset need to travel over the network.

use glam::{DVec3, IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Integer sector address plus f32 local offset
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct VirtualPosition {
    /// Sector cell in the world grid
    pub sector: IVec3,
    /// Offset from the sector center, each axis within half a sector
    pub offset: Vec3,
}

impl VirtualPosition {
    pub fn new(sector: IVec3, offset: Vec3) -> Self {
        Self { sector, offset }
    }

    /// World-space offset of a sector center
    pub fn sector_origin(sector: IVec3, sector_size: f64) -> DVec3 {
        sector.as_dvec3() * sector_size
    }

    /// Split a world position into sector and offset
    pub fn from_world(world: DVec3, sector_size: f64) -> Self {
        let sector = (world / sector_size).round().as_ivec3();
        let offset = world - Self::sector_origin(sector, sector_size);
        Self {
            sector,
            offset: offset.as_vec3(),
        }
    }

    /// Reassemble the world position
    ///
    /// Precision is that of the f32 offset: within a 100 km sector the
    /// offset resolves to a few millimeters.
    pub fn to_world(&self, sector_size: f64) -> DVec3 {
        Self::sector_origin(self.sector, sector_size) + self.offset.as_dvec3()
    }

    /// Bring every offset component back within half a sector
    pub fn normalize(&mut self, sector_size: f64) {
        let half = sector_size * 0.5;
        let mut offset = self.offset.as_dvec3();

        for axis in 0..3 {
            let cells = if offset[axis].abs() > half {
                (offset[axis] / sector_size).round()
            } else {
                0.0
            };
            if cells != 0.0 {
                offset[axis] -= cells * sector_size;
                self.sector[axis] += cells as i32;
            }
        }

        self.offset = offset.as_vec3();
    }

    /// Move by a world-space delta, crossing sector boundaries as needed
    pub fn translate(&mut self, delta: DVec3, sector_size: f64) {
        // Fold whole sectors in first so the f32 offset never sees the full delta
        let cells = (delta / sector_size).round();
        self.sector += cells.as_ivec3();
        let remainder = delta - cells * sector_size;
        self.offset = (self.offset.as_dvec3() + remainder).as_vec3();
        self.normalize(sector_size);
    }

    /// Vector from `origin` to `self`, computed sector-relative first
    pub fn relative_to(&self, origin: &VirtualPosition, sector_size: f64) -> DVec3 {
        let sector_delta = Self::sector_origin(self.sector - origin.sector, sector_size);
        sector_delta + (self.offset.as_dvec3() - origin.offset.as_dvec3())
    }

    pub fn distance_to(&self, other: &VirtualPosition, sector_size: f64) -> f64 {
        self.relative_to(other, sector_size).length()
    }

    pub fn same_sector_as(&self, other: &VirtualPosition) -> bool {
        self.sector == other.sector
    }

    /// Invariant check: offset inside half a sector on every axis
    pub fn is_normalized(&self, sector_size: f64) -> bool {
        let half = (sector_size * 0.5) as f32;
        self.offset.abs().max_element() <= half
    }

    pub fn describe(&self, sector_size: f64) -> String {
        format!(
            "sector {:?} offset {:.2} m ({:.1} km from grid origin)",
            self.sector,
            self.offset.length(),
            self.to_world(sector_size).length() / 1000.0
        )
    }
}
