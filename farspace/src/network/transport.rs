//! Packet transport abstraction and an in-process loopback implementation

use super::protocol::MessageClass;
use crate::utils::sync;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::trace;

pub type PeerId = u32;

/// Peer id reserved for the authoritative server
pub const SERVER_PEER: PeerId = 0;

/// An encoded message as delivered by a transport
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub from: PeerId,
    pub class: MessageClass,
    pub payload: Vec<u8>,
}

/// Moves encoded messages between peers
///
/// Reliable packets must arrive intact and in send order. Unreliable packets
/// may be lost or reordered. `receive` returns every reliable packet before
/// any unreliable one.
pub trait Transport {
    fn local_peer(&self) -> PeerId;

    /// Unicast to one peer
    fn send(&mut self, to: PeerId, class: MessageClass, payload: &[u8]);

    /// Multicast to every other connected peer
    fn broadcast(&mut self, class: MessageClass, payload: &[u8]);

    /// Drain everything that has arrived, reliable first
    fn receive(&mut self) -> Vec<Packet>;
}

/// Delivery counters for the loopback hub
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub reordered: u64,
}

#[derive(Debug, Default)]
struct Mailbox {
    reliable: VecDeque<Packet>,
    unreliable: VecDeque<Packet>,
}

#[derive(Debug)]
struct Hub {
    mailboxes: BTreeMap<PeerId, Mailbox>,
    loss: f64,
    reorder: f64,
    rng: StdRng,
    stats: LinkStats,
}

impl Hub {
    fn deliver(&mut self, to: PeerId, packet: Packet) {
        self.stats.sent += 1;
        let class = packet.class;

        let lost = class == MessageClass::Unreliable && self.loss > 0.0 && self.rng.gen_bool(self.loss);
        let reorder =
            class == MessageClass::Unreliable && self.reorder > 0.0 && self.rng.gen_bool(self.reorder);

        let Some(mailbox) = self.mailboxes.get_mut(&to) else {
            self.stats.dropped += 1;
            return;
        };
        if lost {
            self.stats.dropped += 1;
            trace!(to, "Loopback dropped unreliable packet");
            return;
        }

        match class {
            MessageClass::Reliable => mailbox.reliable.push_back(packet),
            MessageClass::Unreliable if reorder && !mailbox.unreliable.is_empty() => {
                let last = mailbox.unreliable.len() - 1;
                mailbox.unreliable.insert(last, packet);
                self.stats.reordered += 1;
            }
            MessageClass::Unreliable => mailbox.unreliable.push_back(packet),
        }
        self.stats.delivered += 1;
    }
}

/// In-process network connecting any number of endpoints
///
/// Loss and reordering only affect the unreliable class and are driven by a
/// seeded RNG, so runs are reproducible.
#[derive(Debug, Clone)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackNetwork {
    pub fn new(seed: u64) -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub {
                mailboxes: BTreeMap::new(),
                loss: 0.0,
                reorder: 0.0,
                rng: StdRng::seed_from_u64(seed),
                stats: LinkStats::default(),
            })),
        }
    }

    /// Probability in [0, 1] that an unreliable packet is dropped
    pub fn with_loss(self, probability: f64) -> Self {
        sync::lock(&self.hub).loss = probability.clamp(0.0, 1.0);
        self
    }

    /// Probability in [0, 1] that an unreliable packet overtakes its predecessor
    pub fn with_reordering(self, probability: f64) -> Self {
        sync::lock(&self.hub).reorder = probability.clamp(0.0, 1.0);
        self
    }

    pub fn set_loss(&self, probability: f64) {
        sync::lock(&self.hub).loss = probability.clamp(0.0, 1.0);
    }

    /// Connect a peer and return its endpoint
    pub fn endpoint(&self, peer: PeerId) -> LoopbackEndpoint {
        sync::lock(&self.hub).mailboxes.entry(peer).or_default();
        LoopbackEndpoint {
            peer,
            hub: self.hub.clone(),
        }
    }

    pub fn stats(&self) -> LinkStats {
        sync::lock(&self.hub).stats
    }
}

/// One peer's view of a [`LoopbackNetwork`]
#[derive(Debug, Clone)]
pub struct LoopbackEndpoint {
    peer: PeerId,
    hub: Arc<Mutex<Hub>>,
}

impl Transport for LoopbackEndpoint {
    fn local_peer(&self) -> PeerId {
        self.peer
    }

    fn send(&mut self, to: PeerId, class: MessageClass, payload: &[u8]) {
        let packet = Packet {
            from: self.peer,
            class,
            payload: payload.to_vec(),
        };
        sync::lock(&self.hub).deliver(to, packet);
    }

    fn broadcast(&mut self, class: MessageClass, payload: &[u8]) {
        let mut hub = sync::lock(&self.hub);
        let peers: Vec<PeerId> = hub
            .mailboxes
            .keys()
            .copied()
            .filter(|peer| *peer != self.peer)
            .collect();
        for to in peers {
            let packet = Packet {
                from: self.peer,
                class,
                payload: payload.to_vec(),
            };
            hub.deliver(to, packet);
        }
    }

    fn receive(&mut self) -> Vec<Packet> {
        let mut hub = sync::lock(&self.hub);
        match hub.mailboxes.get_mut(&self.peer) {
            Some(mailbox) => mailbox
                .reliable
                .drain(..)
                .chain(mailbox.unreliable.drain(..))
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliable_drained_first() {
        let network = LoopbackNetwork::new(1);
        let mut server = network.endpoint(SERVER_PEER);
        let mut client = network.endpoint(1);

        server.send(1, MessageClass::Unreliable, b"snapshot");
        server.send(1, MessageClass::Reliable, b"recenter");

        let packets = client.receive();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].payload, b"recenter");
        assert_eq!(packets[1].payload, b"snapshot");
        assert!(client.receive().is_empty());
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let network = LoopbackNetwork::new(1);
        let mut server = network.endpoint(SERVER_PEER);
        let mut a = network.endpoint(1);
        let mut b = network.endpoint(2);

        server.broadcast(MessageClass::Reliable, b"hello");
        assert_eq!(a.receive().len(), 1);
        assert_eq!(b.receive().len(), 1);
        assert!(server.receive().is_empty());
    }

    #[test]
    fn test_total_loss_spares_reliable() {
        let network = LoopbackNetwork::new(7).with_loss(1.0);
        let mut server = network.endpoint(SERVER_PEER);
        let mut client = network.endpoint(1);

        for _ in 0..10 {
            server.send(1, MessageClass::Unreliable, b"x");
        }
        server.send(1, MessageClass::Reliable, b"y");

        let packets = client.receive();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].class, MessageClass::Reliable);
        assert_eq!(network.stats().dropped, 10);
    }

    #[test]
    fn test_seeded_loss_is_reproducible() {
        let run = |seed| {
            let network = LoopbackNetwork::new(seed).with_loss(0.5);
            let mut server = network.endpoint(SERVER_PEER);
            let mut client = network.endpoint(1);
            for i in 0..64u8 {
                server.send(1, MessageClass::Unreliable, &[i]);
            }
            client.receive()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_unknown_peer_counts_as_dropped() {
        let network = LoopbackNetwork::new(1);
        let mut server = network.endpoint(SERVER_PEER);
        server.send(99, MessageClass::Reliable, b"nobody");
        assert_eq!(network.stats().dropped, 1);
    }
}
