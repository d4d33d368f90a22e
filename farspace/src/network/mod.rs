//! Vehicle replication: client prediction, server authority, reconciliation
//!
//! The server applies validated inputs and broadcasts snapshots at a fixed
//! rate on the unreliable channel. Clients predict locally, compare each
//! snapshot against what they predicted for the same input and blend toward
//! the corrected state. Origin re-centers and full-state resyncs travel on
//! the reliable channel and are processed before any snapshot in the same
//! batch.

pub mod client;
pub mod compression;
pub mod dispatch;
pub mod input;
pub mod movement;
pub mod protocol;
pub mod server;
pub mod snapshot;
pub mod transport;

#[cfg(test)]
mod tests;

pub use client::{ClientStats, ClientVehicle, NetworkClient, Reconciliation, SnapshotOutcome};
pub use compression::{CompressedVector, PositionEncoding};
pub use dispatch::MessageRouter;
pub use input::{InputBuffer, InputRecord, VehicleInput};
pub use movement::{MovementModel, VehicleState};
pub use protocol::{MessageClass, MessageKind, NetMessage, ProtocolError};
pub use server::{InputRejection, NetworkServer, ServerStats, ServerVehicle};
pub use snapshot::NetworkStateSnapshot;
pub use transport::{LinkStats, LoopbackEndpoint, LoopbackNetwork, Packet, PeerId, Transport, SERVER_PEER};
