//! Message routing keyed by message kind

use super::protocol::{MessageKind, NetMessage, ProtocolError};
use super::transport::PeerId;
use std::collections::HashMap;

/// Handler invoked with the receiving side's state, the sender and the message
pub type Handler<C> = fn(&mut C, PeerId, NetMessage) -> Result<(), ProtocolError>;

pub struct MessageRouter<C> {
    handlers: HashMap<MessageKind, Handler<C>>,
}

impl<C> MessageRouter<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Install a handler, returning the one it replaced
    pub fn register(&mut self, kind: MessageKind, handler: Handler<C>) -> Option<Handler<C>> {
        self.handlers.insert(kind, handler)
    }

    pub fn handles(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn route(&self, context: &mut C, from: PeerId, message: NetMessage) -> Result<(), ProtocolError> {
        let kind = message.kind();
        let handler = self.handlers.get(&kind).ok_or(ProtocolError::Unhandled(kind))?;
        handler(context, from, message)
    }
}

impl<C> Default for MessageRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for MessageRouter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        requests: Vec<(PeerId, u32)>,
    }

    fn on_request(counter: &mut Counter, from: PeerId, message: NetMessage) -> Result<(), ProtocolError> {
        if let NetMessage::FullStateRequest { vehicle_id } = message {
            counter.requests.push((from, vehicle_id));
        }
        Ok(())
    }

    #[test]
    fn test_routes_by_kind() {
        let mut router = MessageRouter::new();
        assert!(router.register(MessageKind::FullStateRequest, on_request).is_none());
        assert!(router.handles(MessageKind::FullStateRequest));

        let mut counter = Counter::default();
        router
            .route(&mut counter, 7, NetMessage::FullStateRequest { vehicle_id: 3 })
            .unwrap();
        assert_eq!(counter.requests, vec![(7, 3)]);
    }

    #[test]
    fn test_unhandled_kind() {
        let router: MessageRouter<Counter> = MessageRouter::new();
        let mut counter = Counter::default();
        let error = router
            .route(&mut counter, 1, NetMessage::FullStateRequest { vehicle_id: 1 })
            .unwrap_err();
        assert!(matches!(error, ProtocolError::Unhandled(MessageKind::FullStateRequest)));
    }
}
