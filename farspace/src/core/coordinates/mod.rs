//! Large world coordinate handling
//!
//! Two complementary tools keep positions precise far from the original
//! origin:
//! - a floating origin that periodically re-centers the local frame on the
//!   player and translates every registered body
//! - sector-addressed virtual positions that split absolute positions into
//!   an integer cell and an f32 offset for replication

pub mod origin_manager;
pub mod virtual_position;

#[cfg(test)]
mod tests;

pub use origin_manager::{
    OriginManager, OriginShift, OriginStats, RecenterBroadcaster, RecenterEvent, RecenterReason,
};
pub use virtual_position::VirtualPosition;
