//! Wire protocol between the vehicle server and its clients
//!
//! Messages are bincode-encoded. Each message type belongs to exactly one
//! delivery class; transports must deliver reliable messages in order and
//! may drop or reorder unreliable ones.

use super::input::VehicleInput;
use super::snapshot::NetworkStateSnapshot;
use crate::core::coordinates::RecenterEvent;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encoded messages larger than this are refused
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Delivery guarantee required by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageClass {
    /// Ordered and never dropped
    Reliable,
    /// May be dropped, duplicated or reordered
    Unreliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    ClientInput,
    StateSnapshot,
    FullStateRequest,
    FullState,
    Recenter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetMessage {
    /// Client to server: one frame of input
    ClientInput { vehicle_id: u32, input: VehicleInput },
    /// Server to clients: periodic state, possibly delta-encoded
    StateSnapshot(NetworkStateSnapshot),
    /// Client to server: ask for a complete snapshot
    FullStateRequest { vehicle_id: u32 },
    /// Server to client: complete snapshot answering a request
    FullState(NetworkStateSnapshot),
    /// Server to clients: the world origin moved
    Recenter(RecenterEvent),
}

impl NetMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            NetMessage::ClientInput { .. } => MessageKind::ClientInput,
            NetMessage::StateSnapshot(_) => MessageKind::StateSnapshot,
            NetMessage::FullStateRequest { .. } => MessageKind::FullStateRequest,
            NetMessage::FullState(_) => MessageKind::FullState,
            NetMessage::Recenter(_) => MessageKind::Recenter,
        }
    }

    pub fn class(&self) -> MessageClass {
        match self.kind() {
            MessageKind::ClientInput | MessageKind::StateSnapshot => MessageClass::Unreliable,
            MessageKind::FullStateRequest | MessageKind::FullState | MessageKind::Recenter => {
                MessageClass::Reliable
            }
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = bincode::serialize(self).map_err(ProtocolError::Encode)?;
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::TooLarge {
                size: bytes.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::TooLarge {
                size: bytes.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        bincode::deserialize(bytes).map_err(ProtocolError::Decode)
    }

    /// Decode and check that the message arrived on its own class
    pub fn decode_on(bytes: &[u8], class: MessageClass) -> Result<Self, ProtocolError> {
        let message = Self::decode(bytes)?;
        if message.class() != class {
            return Err(ProtocolError::WrongChannel {
                kind: message.kind(),
                class,
            });
        }
        Ok(message)
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] bincode::Error),

    #[error("message of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("{kind:?} message received on the {class:?} channel")]
    WrongChannel { kind: MessageKind, class: MessageClass },

    #[error("no handler registered for {0:?} messages")]
    Unhandled(MessageKind),

    #[error("{kind:?} message for unknown vehicle {vehicle_id}")]
    UnknownVehicle { kind: MessageKind, vehicle_id: u32 },
}
