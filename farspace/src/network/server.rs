//! Authoritative side of vehicle replication

use super::compression::{CompressedVector, PositionEncoding};
use super::dispatch::MessageRouter;
use super::input::VehicleInput;
use super::movement::{MovementModel, VehicleState};
use super::protocol::{MessageClass, MessageKind, NetMessage, ProtocolError};
use super::snapshot::NetworkStateSnapshot;
use super::transport::{PeerId, Transport};
use crate::config::NetworkConfig;
use crate::core::coordinates::{RecenterBroadcaster, RecenterEvent, VirtualPosition};
use crate::physics::{PhysicsBody, TickAccumulator};
use crate::safety::{SafetyMonitor, Severity};
use glam::DVec3;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Client time (seconds) an input may overdraw the clock budget by
const CLOCK_SLACK: f64 = 1.0e-3;

/// Why the server refused an input
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InputRejection {
    #[error("input contains non-finite values")]
    NonFinite,
    #[error("frame delta time {0} is outside (0, max]")]
    InvalidDeltaTime(f32),
    #[error("input {sequence} is not newer than {last}")]
    OutOfOrder { sequence: u32, last: u32 },
    #[error("timestamp {timestamp} is older than {last}")]
    TimestampRegressed { timestamp: f64, last: f64 },
    #[error("timestamp jumped {jump} s")]
    TimestampJump { jump: f64 },
    #[error("thrust {0} m/s² exceeds the limit")]
    ExcessiveThrust(f32),
    #[error("input claims {claimed} s but the client clock advanced {available} s")]
    ClockOverrun { claimed: f64, available: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServerVehicleStats {
    pub inputs_accepted: u64,
    pub inputs_rejected: u64,
    pub snapshots_built: u64,
    pub keyframes_built: u64,
}

/// Server-owned replicated vehicle
#[derive(Debug, Clone)]
pub struct ServerVehicle {
    id: u32,
    name: String,
    owner: PeerId,
    mass: f64,
    state: VehicleState,
    model: MovementModel,
    config: NetworkConfig,
    last_input_sequence: u32,
    last_input_timestamp: Option<f64>,
    last_input_hash: u32,
    /// Client time the timestamps have advanced but inputs have not yet claimed
    time_budget: f64,
    snapshot_sequence: u32,
    snapshots_since_keyframe: u32,
    baseline: Option<(u32, VirtualPosition)>,
    /// Scale factor replicated to clients
    pub scale_factor: f32,
    stats: ServerVehicleStats,
}

impl ServerVehicle {
    pub fn new(id: u32, owner: PeerId, mass: f64, state: VehicleState, config: &NetworkConfig) -> Self {
        Self {
            id,
            name: format!("vehicle-{id}"),
            owner,
            mass,
            state,
            model: MovementModel::from_config(config),
            config: config.clone(),
            last_input_sequence: 0,
            last_input_timestamp: None,
            last_input_hash: 0,
            time_budget: 0.0,
            snapshot_sequence: 0,
            snapshots_since_keyframe: 0,
            baseline: None,
            scale_factor: 1.0,
            stats: ServerVehicleStats::default(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn owner(&self) -> PeerId {
        self.owner
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn last_processed_input(&self) -> u32 {
        self.last_input_sequence
    }

    pub fn stats(&self) -> ServerVehicleStats {
        self.stats
    }

    /// Client time available to `input`: the unspent budget plus how far its
    /// timestamp advanced. The first input may claim a full frame.
    fn available_time(&self, input: &VehicleInput) -> f64 {
        match self.last_input_timestamp {
            Some(last) => (self.time_budget + (input.timestamp - last)).min(self.config.max_timestamp_jump),
            None => self.config.max_input_dt as f64,
        }
    }

    /// Anti-cheat checks; the vehicle state is not touched.
    ///
    /// Displacement is bounded by the movement model's speed clamp times the
    /// claimed frame time, and claimed frame time is bounded by the client
    /// clock, so replaying a timestamp buys no motion.
    pub fn validate_input(&self, input: &VehicleInput) -> Result<VehicleState, InputRejection> {
        if !input.is_finite() {
            return Err(InputRejection::NonFinite);
        }
        if !(input.delta_time > 0.0 && input.delta_time <= self.config.max_input_dt) {
            return Err(InputRejection::InvalidDeltaTime(input.delta_time));
        }
        if input.sequence <= self.last_input_sequence {
            return Err(InputRejection::OutOfOrder {
                sequence: input.sequence,
                last: self.last_input_sequence,
            });
        }
        if let Some(last) = self.last_input_timestamp {
            if input.timestamp < last {
                return Err(InputRejection::TimestampRegressed {
                    timestamp: input.timestamp,
                    last,
                });
            }
            let jump = input.timestamp - last;
            if jump > self.config.max_timestamp_jump {
                return Err(InputRejection::TimestampJump { jump });
            }
        }
        let thrust = input.thrust.length();
        if thrust > self.config.max_thrust * 1.001 {
            return Err(InputRejection::ExcessiveThrust(thrust));
        }

        let claimed = input.delta_time as f64;
        let available = self.available_time(input);
        if claimed > available + CLOCK_SLACK {
            return Err(InputRejection::ClockOverrun { claimed, available });
        }
        Ok(self.model.step(&self.state, input))
    }

    /// Validate and apply one input
    pub fn apply_input(&mut self, input: &VehicleInput) -> Result<(), InputRejection> {
        match self.validate_input(input) {
            Ok(next) => {
                self.time_budget = match self.last_input_timestamp {
                    Some(_) => (self.available_time(input) - input.delta_time as f64).max(-CLOCK_SLACK),
                    None => 0.0,
                };
                self.state = next;
                self.last_input_sequence = input.sequence;
                self.last_input_timestamp = Some(input.timestamp);
                self.last_input_hash = input.hash();
                self.stats.inputs_accepted += 1;
                Ok(())
            }
            Err(rejection) => {
                self.stats.inputs_rejected += 1;
                Err(rejection)
            }
        }
    }

    /// Build the next snapshot; keyframes carry a full position
    pub fn build_snapshot(
        &mut self,
        timestamp: f64,
        origin_epoch: u32,
        sector_size: f64,
        force_keyframe: bool,
    ) -> NetworkStateSnapshot {
        self.snapshot_sequence += 1;
        let position = VirtualPosition::from_world(self.state.position, sector_size);

        let keyframe = force_keyframe
            || self.baseline.is_none()
            || self.snapshots_since_keyframe + 1 >= self.config.keyframe_interval;
        let encoding = if keyframe {
            PositionEncoding::Full(position)
        } else {
            PositionEncoding::encode(position, self.baseline)
        };

        if encoding.is_full() {
            self.baseline = Some((self.snapshot_sequence, position));
            self.snapshots_since_keyframe = 0;
            self.stats.keyframes_built += 1;
        } else {
            self.snapshots_since_keyframe += 1;
        }
        self.stats.snapshots_built += 1;

        NetworkStateSnapshot {
            vehicle_id: self.id,
            sequence: self.snapshot_sequence,
            timestamp,
            position: encoding,
            velocity: CompressedVector::compress(self.state.velocity),
            orientation: self.state.orientation.as_quat(),
            angular_velocity: CompressedVector::compress(self.state.angular_velocity),
            scale_factor: self.scale_factor,
            last_processed_input: self.last_input_sequence,
            input_hash: self.last_input_hash,
            origin_epoch,
        }
    }

    /// Shift by a re-center delta; the next snapshot is a keyframe
    pub fn apply_recenter(&mut self, delta: DVec3) {
        self.state.position += delta;
        self.baseline = None;
    }
}

impl PhysicsBody for ServerVehicle {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> DVec3 {
        self.state.position
    }

    fn set_position(&mut self, position: DVec3) {
        self.state.position = position;
    }

    fn velocity(&self) -> DVec3 {
        self.state.velocity
    }

    fn set_velocity(&mut self, velocity: DVec3) {
        self.state.velocity = velocity;
    }

    fn angular_velocity(&self) -> DVec3 {
        self.state.angular_velocity
    }

    fn set_angular_velocity(&mut self, angular_velocity: DVec3) {
        self.state.angular_velocity = angular_velocity;
    }

    fn mass(&self) -> f64 {
        self.mass
    }

    fn apply_force(&mut self, force: DVec3, dt: f64) {
        if self.mass > 0.0 {
            self.state.velocity += force / self.mass * dt;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    pub inputs_received: u64,
    pub inputs_rejected: u64,
    pub snapshots_sent: u64,
    pub full_states_sent: u64,
    pub recenters_sent: u64,
    pub protocol_errors: u64,
}

/// Replies queued by message handlers
enum Outgoing {
    To(PeerId, NetMessage),
    Broadcast(NetMessage),
}

struct ServerState {
    vehicles: BTreeMap<u32, ServerVehicle>,
    config: NetworkConfig,
    sector_size: f64,
    time: f64,
    origin_epoch: u32,
    safety: Option<Arc<SafetyMonitor>>,
    outbox: Vec<Outgoing>,
    stats: ServerStats,
}

impl ServerState {
    fn full_state(&mut self, vehicle_id: u32) -> Option<NetworkStateSnapshot> {
        let (time, epoch, sector_size) = (self.time, self.origin_epoch, self.sector_size);
        self.vehicles
            .get_mut(&vehicle_id)
            .map(|vehicle| vehicle.build_snapshot(time, epoch, sector_size, true))
    }
}

fn on_client_input(state: &mut ServerState, from: PeerId, message: NetMessage) -> Result<(), ProtocolError> {
    let NetMessage::ClientInput { vehicle_id, input } = message else {
        return Ok(());
    };
    state.stats.inputs_received += 1;

    let vehicle = match state.vehicles.get_mut(&vehicle_id) {
        Some(vehicle) if vehicle.owner == from => vehicle,
        _ => {
            return Err(ProtocolError::UnknownVehicle {
                kind: MessageKind::ClientInput,
                vehicle_id,
            })
        }
    };

    if let Err(rejection) = vehicle.apply_input(&input) {
        state.stats.inputs_rejected += 1;
        match &state.safety {
            // Out-of-order inputs are normal on the unreliable channel
            Some(safety) if !matches!(rejection, InputRejection::OutOfOrder { .. }) => safety.log_event(
                Severity::Warning,
                format!("Rejected input {}: {rejection}", input.sequence),
                Some(&vehicle.name),
            ),
            _ => debug!(vehicle_id, sequence = input.sequence, %rejection, "Rejected input"),
        }
    }
    Ok(())
}

fn on_full_state_request(
    state: &mut ServerState,
    from: PeerId,
    message: NetMessage,
) -> Result<(), ProtocolError> {
    let NetMessage::FullStateRequest { vehicle_id } = message else {
        return Ok(());
    };
    let snapshot = state.full_state(vehicle_id).ok_or(ProtocolError::UnknownVehicle {
        kind: MessageKind::FullStateRequest,
        vehicle_id,
    })?;

    info!(vehicle_id, peer = from, "Answering full state request");
    state.stats.full_states_sent += 1;
    state.outbox.push(Outgoing::To(from, NetMessage::FullState(snapshot)));
    Ok(())
}

/// Server endpoint: applies client input and broadcasts snapshots
pub struct NetworkServer<T: Transport> {
    transport: T,
    router: MessageRouter<ServerState>,
    state: ServerState,
    snapshot_timer: TickAccumulator,
}

impl<T: Transport> NetworkServer<T> {
    pub fn new(
        transport: T,
        config: NetworkConfig,
        sector_size: f64,
        safety: Option<Arc<SafetyMonitor>>,
    ) -> Self {
        let mut router = MessageRouter::new();
        router.register(MessageKind::ClientInput, on_client_input);
        router.register(MessageKind::FullStateRequest, on_full_state_request);

        info!(rate_hz = config.snapshot_rate_hz, "Starting network server");
        Self {
            transport,
            router,
            snapshot_timer: TickAccumulator::with_rate(config.snapshot_rate_hz),
            state: ServerState {
                vehicles: BTreeMap::new(),
                config,
                sector_size,
                time: 0.0,
                origin_epoch: 0,
                safety,
                outbox: Vec::new(),
                stats: ServerStats::default(),
            },
        }
    }

    /// Spawn a vehicle controlled by `owner`
    pub fn add_vehicle(&mut self, id: u32, owner: PeerId, mass: f64, initial: VehicleState) {
        let vehicle = ServerVehicle::new(id, owner, mass, initial, &self.state.config);
        if self.state.vehicles.insert(id, vehicle).is_some() {
            warn!(vehicle_id = id, "Replaced existing server vehicle");
        }
    }

    pub fn remove_vehicle(&mut self, id: u32) -> Option<ServerVehicle> {
        self.state.vehicles.remove(&id)
    }

    pub fn vehicle(&self, id: u32) -> Option<&ServerVehicle> {
        self.state.vehicles.get(&id)
    }

    pub fn vehicle_mut(&mut self, id: u32) -> Option<&mut ServerVehicle> {
        self.state.vehicles.get_mut(&id)
    }

    pub fn vehicles_mut(&mut self) -> impl Iterator<Item = &mut ServerVehicle> {
        self.state.vehicles.values_mut()
    }

    pub fn origin_epoch(&self) -> u32 {
        self.state.origin_epoch
    }

    pub fn time(&self) -> f64 {
        self.state.time
    }

    pub fn stats(&self) -> ServerStats {
        self.state.stats
    }

    /// Process incoming messages
    pub fn poll(&mut self) {
        for packet in self.transport.receive() {
            let result = NetMessage::decode_on(&packet.payload, packet.class)
                .and_then(|message| self.router.route(&mut self.state, packet.from, message));
            if let Err(error) = result {
                self.state.stats.protocol_errors += 1;
                warn!(peer = packet.from, %error, "Dropped client message");
            }
        }
        self.flush();
    }

    /// Advance the server clock, broadcasting snapshots at the configured rate
    pub fn update(&mut self, dt: f64) {
        self.poll();
        if dt.is_finite() && dt > 0.0 {
            self.state.time += dt;
        }
        for _ in 0..self.snapshot_timer.accumulate(dt) {
            self.broadcast_snapshots();
        }
    }

    /// Broadcast one snapshot per vehicle immediately
    pub fn broadcast_snapshots(&mut self) {
        let (time, epoch, sector_size) = (self.state.time, self.state.origin_epoch, self.state.sector_size);
        let snapshots: Vec<NetworkStateSnapshot> = self
            .state
            .vehicles
            .values_mut()
            .map(|vehicle| vehicle.build_snapshot(time, epoch, sector_size, false))
            .collect();

        for snapshot in snapshots {
            self.state.stats.snapshots_sent += 1;
            self.state
                .outbox
                .push(Outgoing::Broadcast(NetMessage::StateSnapshot(snapshot)));
        }
        self.flush();
    }

    fn flush(&mut self) {
        for outgoing in std::mem::take(&mut self.state.outbox) {
            let (target, message) = match outgoing {
                Outgoing::To(peer, message) => (Some(peer), message),
                Outgoing::Broadcast(message) => (None, message),
            };
            let bytes = match message.encode() {
                Ok(bytes) => bytes,
                Err(error) => {
                    self.state.stats.protocol_errors += 1;
                    warn!(%error, kind = ?message.kind(), "Failed to encode server message");
                    continue;
                }
            };
            match target {
                Some(peer) => self.transport.send(peer, message.class(), &bytes),
                None => self.transport.broadcast(message.class(), &bytes),
            }
        }
    }
}

impl<T: Transport> RecenterBroadcaster for NetworkServer<T> {
    fn broadcast_recenter(&mut self, event: &RecenterEvent) {
        for vehicle in self.state.vehicles.values_mut() {
            vehicle.apply_recenter(event.delta);
        }
        self.state.origin_epoch = event.epoch;
        self.state.stats.recenters_sent += 1;
        self.state.outbox.push(Outgoing::Broadcast(NetMessage::Recenter(*event)));
        self.flush();
    }
}

impl<T: Transport> std::fmt::Debug for NetworkServer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkServer")
            .field("peer", &self.transport.local_peer())
            .field("vehicles", &self.state.vehicles.len())
            .field("origin_epoch", &self.state.origin_epoch)
            .field("stats", &self.state.stats)
            .finish()
    }
}
