//! Predicting side of vehicle replication

use super::dispatch::MessageRouter;
use super::input::{InputBuffer, InputRecord, VehicleInput};
use super::movement::{MovementModel, VehicleState};
use super::protocol::{MessageKind, NetMessage, ProtocolError};
use super::snapshot::NetworkStateSnapshot;
use super::transport::{PeerId, Transport, SERVER_PEER};
use crate::config::{NetworkConfig, SafetyConfig};
use crate::core::coordinates::{RecenterEvent, VirtualPosition};
use crate::safety::SafetyMonitor;
use glam::{DVec3, Vec3};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of reconciling against an accepted snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reconciliation {
    /// Distance between prediction and authority (meters)
    pub error: f64,
    /// Blend applied toward the corrected state, 0 when the prediction was kept
    pub correction_strength: f64,
    /// Inputs replayed on top of the server state
    pub replayed: usize,
    pub resync_requested: bool,
}

/// What happened to a received snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SnapshotOutcome {
    Applied(Reconciliation),
    /// Not newer than the last applied snapshot; nothing changed
    Stale,
    /// For a vehicle this client does not control
    Foreign,
    /// Stamped with an origin epoch the client already left behind
    OutdatedEpoch,
    /// Waiting for the re-center it was built after
    Held,
    /// Delta against a keyframe the client never saw; full state requested
    MissingBaseline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    pub predictions: u64,
    pub inputs_sent: u64,
    pub snapshots_applied: u64,
    pub stale_discarded: u64,
    pub epoch_discarded: u64,
    pub held: u64,
    pub missing_baseline: u64,
    pub corrections: u64,
    pub resync_requests: u64,
    pub full_states_applied: u64,
    pub recenters_applied: u64,
    pub protocol_errors: u64,
}

#[derive(Debug, Clone, Copy)]
struct HeldSnapshot {
    snapshot: NetworkStateSnapshot,
    full: bool,
}

/// Locally predicted vehicle reconciled against server snapshots
#[derive(Debug, Clone)]
pub struct ClientVehicle {
    id: u32,
    name: String,
    state: VehicleState,
    model: MovementModel,
    buffer: InputBuffer,
    sector_size: f64,
    next_sequence: u32,
    last_snapshot_sequence: Option<u32>,
    last_acknowledged: Option<(u32, VehicleState)>,
    baseline: Option<(u32, VirtualPosition)>,
    origin_epoch: u32,
    held: VecDeque<HeldSnapshot>,
    max_held: usize,
    desync_tolerance: f64,
    awaiting_full_state: bool,
    resync_sent: bool,
    server_scale_factor: f32,
    stats: ClientStats,
}

impl ClientVehicle {
    pub fn new(id: u32, initial: VehicleState, config: &NetworkConfig, sector_size: f64) -> Self {
        Self {
            id,
            name: format!("vehicle-{id}"),
            state: initial,
            model: MovementModel::from_config(config),
            buffer: InputBuffer::new(config.input_buffer_size),
            sector_size,
            next_sequence: 1,
            last_snapshot_sequence: None,
            last_acknowledged: None,
            baseline: None,
            origin_epoch: 0,
            held: VecDeque::new(),
            max_held: config.max_pending_snapshots.max(1),
            desync_tolerance: SafetyConfig::default().desync_tolerance,
            awaiting_full_state: false,
            resync_sent: false,
            server_scale_factor: 1.0,
            stats: ClientStats::default(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn position(&self) -> DVec3 {
        self.state.position
    }

    pub fn input_buffer(&self) -> &InputBuffer {
        &self.buffer
    }

    pub fn origin_epoch(&self) -> u32 {
        self.origin_epoch
    }

    pub fn last_snapshot_sequence(&self) -> Option<u32> {
        self.last_snapshot_sequence
    }

    pub fn server_scale_factor(&self) -> f32 {
        self.server_scale_factor
    }

    pub fn is_awaiting_full_state(&self) -> bool {
        self.awaiting_full_state
    }

    pub fn held_snapshots(&self) -> usize {
        self.held.len()
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// Tolerance used when no safety monitor scores desyncs
    pub fn set_desync_tolerance(&mut self, tolerance: f64) {
        self.desync_tolerance = tolerance;
    }

    /// Stamp the next input with a fresh sequence number
    pub fn next_input(&mut self, timestamp: f64, delta_time: f32, thrust: Vec3, torque: Vec3) -> VehicleInput {
        let input = VehicleInput::new(self.next_sequence, timestamp, delta_time, thrust, torque);
        self.next_sequence = self.next_sequence.saturating_add(1);
        input
    }

    /// Apply an input immediately and remember it for reconciliation
    pub fn predict_local(&mut self, input: VehicleInput) -> VehicleState {
        if input.sequence >= self.next_sequence {
            self.next_sequence = input.sequence.saturating_add(1);
        }
        self.state = self.model.step(&self.state, &input);
        if let Some(dropped) = self.buffer.push(InputRecord {
            input,
            predicted: self.state,
        }) {
            debug!(sequence = dropped.input.sequence, "Input history full, dropped oldest");
        }
        self.stats.predictions += 1;
        self.state
    }

    fn is_stale(&self, snapshot: &NetworkStateSnapshot) -> bool {
        matches!(self.last_snapshot_sequence, Some(last) if snapshot.sequence <= last)
    }

    /// Gate a snapshot by vehicle, sequence and origin epoch, then reconcile
    pub fn receive_snapshot(
        &mut self,
        snapshot: NetworkStateSnapshot,
        safety: Option<&SafetyMonitor>,
    ) -> SnapshotOutcome {
        self.gate(snapshot, false, safety)
    }

    /// Hard-apply a full state sent in answer to a resync request
    pub fn apply_full_state(
        &mut self,
        snapshot: NetworkStateSnapshot,
        safety: Option<&SafetyMonitor>,
    ) -> SnapshotOutcome {
        self.gate(snapshot, true, safety)
    }

    fn gate(
        &mut self,
        snapshot: NetworkStateSnapshot,
        full: bool,
        safety: Option<&SafetyMonitor>,
    ) -> SnapshotOutcome {
        if snapshot.vehicle_id != self.id {
            return SnapshotOutcome::Foreign;
        }
        if self.is_stale(&snapshot) {
            self.stats.stale_discarded += 1;
            if full {
                self.awaiting_full_state = false;
                self.resync_sent = false;
            }
            return SnapshotOutcome::Stale;
        }

        match snapshot.origin_epoch.cmp(&self.origin_epoch) {
            Ordering::Less => {
                self.stats.epoch_discarded += 1;
                SnapshotOutcome::OutdatedEpoch
            }
            Ordering::Greater => {
                while self.held.len() >= self.max_held {
                    self.held.pop_front();
                }
                self.held.push_back(HeldSnapshot { snapshot, full });
                self.stats.held += 1;
                SnapshotOutcome::Held
            }
            Ordering::Equal => self.apply(snapshot, full, safety),
        }
    }

    fn apply(
        &mut self,
        snapshot: NetworkStateSnapshot,
        full: bool,
        safety: Option<&SafetyMonitor>,
    ) -> SnapshotOutcome {
        let Some(position) = snapshot.position.decode(self.baseline) else {
            self.stats.missing_baseline += 1;
            self.request_resync();
            return SnapshotOutcome::MissingBaseline;
        };
        if snapshot.is_keyframe() {
            self.baseline = Some((snapshot.sequence, position));
        }
        self.last_snapshot_sequence = Some(snapshot.sequence);
        self.server_scale_factor = snapshot.scale_factor;
        self.stats.snapshots_applied += 1;

        let server_state = snapshot.to_state(position, self.sector_size);
        let ack = snapshot.last_processed_input;

        let predicted_at_ack = self.buffer.find(ack).map(|record| record.predicted).or(
            match self.last_acknowledged {
                Some((sequence, state)) if sequence == ack => Some(state),
                _ => None,
            },
        );
        if let Some(predicted) = predicted_at_ack {
            self.last_acknowledged = Some((ack, predicted));
        }
        self.buffer.acknowledge(ack);

        let pending: Vec<VehicleInput> = self.buffer.pending().map(|record| record.input).collect();
        let corrected = self.model.replay(server_state, &pending);

        if full {
            let error = self.state.position.distance(corrected.position);
            self.state = corrected;
            self.awaiting_full_state = false;
            self.resync_sent = false;
            self.stats.full_states_applied += 1;
            info!(vehicle_id = self.id, replayed = pending.len(), "Applied full state");
            return SnapshotOutcome::Applied(Reconciliation {
                error,
                correction_strength: 1.0,
                replayed: pending.len(),
                resync_requested: false,
            });
        }

        // Without a prediction for the acknowledged input, compare the present
        // against the server state fast-forwarded by the pending inputs
        let (predicted, authoritative) = match predicted_at_ack {
            Some(predicted) => (predicted.position, server_state.position),
            None => (self.state.position, corrected.position),
        };

        let (strength, resync_required, error) = match safety {
            Some(safety) => {
                let assessment = safety.evaluate_desync(predicted, authoritative, &self.name);
                (assessment.correction_strength, assessment.resync_required, assessment.error)
            }
            None => {
                let error = predicted.distance(authoritative);
                let strength = if error > self.desync_tolerance || !error.is_finite() { 1.0 } else { 0.0 };
                (strength, false, error)
            }
        };

        if strength > 0.0 {
            self.state = self.state.blend_toward(&corrected, strength);
            self.stats.corrections += 1;
            debug!(vehicle_id = self.id, error, strength, "Corrected prediction");
        }
        if resync_required {
            self.request_resync();
        }

        SnapshotOutcome::Applied(Reconciliation {
            error,
            correction_strength: strength,
            replayed: pending.len(),
            resync_requested: resync_required,
        })
    }

    fn request_resync(&mut self) {
        if !self.awaiting_full_state {
            warn!(vehicle_id = self.id, "Requesting full state resync");
            self.stats.resync_requests += 1;
        }
        self.awaiting_full_state = true;
    }

    /// Whether a full state request should go out now; true once per resync
    pub fn take_resync_request(&mut self) -> bool {
        if self.awaiting_full_state && !self.resync_sent {
            self.resync_sent = true;
            true
        } else {
            false
        }
    }

    /// Request a full state explicitly
    pub fn mark_resync_requested(&mut self) {
        self.request_resync();
        self.resync_sent = true;
    }

    /// Apply an origin shift; returns snapshots that were waiting for it
    pub fn apply_recenter(&mut self, event: &RecenterEvent) -> Vec<(NetworkStateSnapshot, bool)> {
        if event.epoch <= self.origin_epoch {
            debug!(epoch = event.epoch, "Ignoring duplicate re-center");
            return Vec::new();
        }
        if event.epoch > self.origin_epoch + 1 {
            warn!(
                expected = self.origin_epoch + 1,
                received = event.epoch,
                "Re-center epochs skipped, requesting resync"
            );
            self.request_resync();
        }

        self.state.position += event.delta;
        self.buffer.translate(event.delta);
        if let Some((_, state)) = &mut self.last_acknowledged {
            state.position += event.delta;
        }
        self.baseline = None;
        self.origin_epoch = event.epoch;
        self.stats.recenters_applied += 1;

        let epoch = self.origin_epoch;
        let mut ready = Vec::new();
        self.held.retain(|held| match held.snapshot.origin_epoch.cmp(&epoch) {
            Ordering::Less => false,
            Ordering::Equal => {
                ready.push((held.snapshot, held.full));
                false
            }
            Ordering::Greater => true,
        });
        ready.sort_by_key(|(snapshot, _)| snapshot.sequence);
        ready
    }
}

struct ClientState {
    vehicle: ClientVehicle,
    safety: Option<Arc<SafetyMonitor>>,
    outcomes: Vec<SnapshotOutcome>,
}

impl ClientState {
    fn receive(&mut self, snapshot: NetworkStateSnapshot, full: bool) {
        let safety = self.safety.as_deref();
        let outcome = if full {
            self.vehicle.apply_full_state(snapshot, safety)
        } else {
            self.vehicle.receive_snapshot(snapshot, safety)
        };
        self.outcomes.push(outcome);
    }

    fn recenter(&mut self, event: &RecenterEvent) {
        for (snapshot, full) in self.vehicle.apply_recenter(event) {
            self.receive(snapshot, full);
        }
    }
}

fn on_snapshot(state: &mut ClientState, _from: PeerId, message: NetMessage) -> Result<(), ProtocolError> {
    if let NetMessage::StateSnapshot(snapshot) = message {
        state.receive(snapshot, false);
    }
    Ok(())
}

fn on_full_state(state: &mut ClientState, _from: PeerId, message: NetMessage) -> Result<(), ProtocolError> {
    if let NetMessage::FullState(snapshot) = message {
        state.receive(snapshot, true);
    }
    Ok(())
}

fn on_recenter(state: &mut ClientState, _from: PeerId, message: NetMessage) -> Result<(), ProtocolError> {
    if let NetMessage::Recenter(event) = message {
        state.recenter(&event);
    }
    Ok(())
}

/// Client endpoint owning one predicted vehicle
pub struct NetworkClient<T: Transport> {
    transport: T,
    router: MessageRouter<ClientState>,
    state: ClientState,
}

impl<T: Transport> NetworkClient<T> {
    pub fn new(
        transport: T,
        vehicle_id: u32,
        initial: VehicleState,
        config: &NetworkConfig,
        sector_size: f64,
        safety: Option<Arc<SafetyMonitor>>,
    ) -> Self {
        let mut router = MessageRouter::new();
        router.register(MessageKind::StateSnapshot, on_snapshot);
        router.register(MessageKind::FullState, on_full_state);
        router.register(MessageKind::Recenter, on_recenter);

        let mut vehicle = ClientVehicle::new(vehicle_id, initial, config, sector_size);
        if let Some(safety) = &safety {
            vehicle.set_desync_tolerance(safety.config().desync_tolerance);
        }

        info!(vehicle_id, peer = transport.local_peer(), "Starting network client");
        Self {
            transport,
            router,
            state: ClientState {
                vehicle,
                safety,
                outcomes: Vec::new(),
            },
        }
    }

    pub fn vehicle(&self) -> &ClientVehicle {
        &self.state.vehicle
    }

    pub fn vehicle_mut(&mut self) -> &mut ClientVehicle {
        &mut self.state.vehicle
    }

    pub fn stats(&self) -> ClientStats {
        self.state.vehicle.stats
    }

    /// Stamp the next input with a fresh sequence number
    pub fn next_input(&mut self, timestamp: f64, delta_time: f32, thrust: Vec3, torque: Vec3) -> VehicleInput {
        self.state.vehicle.next_input(timestamp, delta_time, thrust, torque)
    }

    pub fn predict_local(&mut self, input: VehicleInput) -> VehicleState {
        self.state.vehicle.predict_local(input)
    }

    pub fn send_input_to_server(&mut self, input: VehicleInput) -> Result<(), ProtocolError> {
        let message = NetMessage::ClientInput {
            vehicle_id: self.state.vehicle.id,
            input,
        };
        let bytes = message.encode()?;
        self.transport.send(SERVER_PEER, message.class(), &bytes);
        self.state.vehicle.stats.inputs_sent += 1;
        Ok(())
    }

    /// Reconcile against a snapshot received out of band
    pub fn receive_snapshot(&mut self, snapshot: NetworkStateSnapshot) -> SnapshotOutcome {
        let safety = self.state.safety.clone();
        let outcome = self.state.vehicle.receive_snapshot(snapshot, safety.as_deref());
        self.send_pending_resync();
        outcome
    }

    /// Ask the server for a complete snapshot on the reliable channel
    pub fn request_full_state_sync(&mut self) -> Result<(), ProtocolError> {
        let message = NetMessage::FullStateRequest {
            vehicle_id: self.state.vehicle.id,
        };
        let bytes = message.encode()?;
        self.transport.send(SERVER_PEER, message.class(), &bytes);
        self.state.vehicle.mark_resync_requested();
        Ok(())
    }

    /// Apply a re-center received out of band; outcomes of the snapshots it
    /// releases are returned by the next `poll`
    pub fn apply_recenter(&mut self, event: &RecenterEvent) {
        self.state.recenter(event);
        self.send_pending_resync();
    }

    /// Drain the transport, reliable messages first; returns snapshot outcomes
    pub fn poll(&mut self) -> Vec<SnapshotOutcome> {
        for packet in self.transport.receive() {
            let result = NetMessage::decode_on(&packet.payload, packet.class)
                .and_then(|message| self.router.route(&mut self.state, packet.from, message));
            if let Err(error) = result {
                self.state.vehicle.stats.protocol_errors += 1;
                warn!(peer = packet.from, %error, "Dropped server message");
            }
        }
        self.send_pending_resync();
        std::mem::take(&mut self.state.outcomes)
    }

    fn send_pending_resync(&mut self) {
        if !self.state.vehicle.take_resync_request() {
            return;
        }
        let message = NetMessage::FullStateRequest {
            vehicle_id: self.state.vehicle.id,
        };
        match message.encode() {
            Ok(bytes) => self.transport.send(SERVER_PEER, message.class(), &bytes),
            Err(error) => {
                self.state.vehicle.stats.protocol_errors += 1;
                warn!(%error, "Failed to encode full state request");
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for NetworkClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkClient")
            .field("peer", &self.transport.local_peer())
            .field("vehicle", &self.state.vehicle.id)
            .field("stats", &self.state.vehicle.stats)
            .finish()
    }
}
