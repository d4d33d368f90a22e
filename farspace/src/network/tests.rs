use super::*;
use crate::config::{NetworkConfig, SafetyConfig};
use crate::core::coordinates::{RecenterEvent, RecenterReason, VirtualPosition};
use crate::safety::SafetyMonitor;
use glam::{DVec3, IVec3, Quat, Vec3};

const SECTOR: f64 = 100_000.0;

fn client() -> ClientVehicle {
    ClientVehicle::new(1, VehicleState::default(), &NetworkConfig::default(), SECTOR)
}

fn snapshot(sequence: u32, ack: u32, position: DVec3, epoch: u32) -> NetworkStateSnapshot {
    NetworkStateSnapshot {
        vehicle_id: 1,
        sequence,
        timestamp: sequence as f64 * 0.05,
        position: PositionEncoding::Full(VirtualPosition::from_world(position, SECTOR)),
        velocity: CompressedVector::default(),
        orientation: Quat::IDENTITY,
        angular_velocity: CompressedVector::default(),
        scale_factor: 1.0,
        last_processed_input: ack,
        input_hash: 0,
        origin_epoch: epoch,
    }
}

fn coast(client: &mut ClientVehicle, frames: u32) {
    for frame in 0..frames {
        let input = client.next_input(frame as f64 / 60.0, 1.0 / 60.0, Vec3::ZERO, Vec3::ZERO);
        client.predict_local(input);
    }
}

#[test]
fn test_prediction_fills_buffer() {
    let mut vehicle = client();
    let input = vehicle.next_input(0.0, 0.5, Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO);
    let state = vehicle.predict_local(input);

    assert_eq!(state.position, DVec3::new(0.0, 0.0, 1.0));
    assert_eq!(vehicle.input_buffer().len(), 1);
    assert_eq!(vehicle.next_input(0.5, 0.5, Vec3::ZERO, Vec3::ZERO).sequence, 2);
}

#[test]
fn test_buffer_bounded_by_config() {
    let mut vehicle = client();
    coast(&mut vehicle, 100);
    assert_eq!(vehicle.input_buffer().len(), 60);
}

#[test]
fn test_matching_snapshot_keeps_prediction() {
    let mut vehicle = client();
    coast(&mut vehicle, 5);
    let before = *vehicle.state();

    let outcome = vehicle.receive_snapshot(snapshot(1, 5, before.position, 0), None);
    match outcome {
        SnapshotOutcome::Applied(reconciliation) => {
            assert_eq!(reconciliation.correction_strength, 0.0);
            assert_eq!(reconciliation.replayed, 0);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(*vehicle.state(), before);
    assert!(vehicle.input_buffer().is_empty());
}

#[test]
fn test_stale_snapshot_discarded_without_mutation() {
    let mut vehicle = client();
    coast(&mut vehicle, 3);
    vehicle.receive_snapshot(snapshot(5, 1, DVec3::ZERO, 0), None);

    let state = *vehicle.state();
    let buffered = vehicle.input_buffer().len();

    for sequence in [5, 4, 1] {
        let outcome = vehicle.receive_snapshot(snapshot(sequence, 3, DVec3::splat(5_000.0), 0), None);
        assert_eq!(outcome, SnapshotOutcome::Stale);
    }
    assert_eq!(*vehicle.state(), state);
    assert_eq!(vehicle.input_buffer().len(), buffered);
    assert_eq!(vehicle.last_snapshot_sequence(), Some(5));
    assert_eq!(vehicle.stats().stale_discarded, 3);
}

#[test]
fn test_fifteen_meter_error_blends_partially() {
    let safety = SafetyMonitor::new(SafetyConfig::default());
    let mut vehicle = client();
    coast(&mut vehicle, 1);
    let predicted = vehicle.position();

    let server_position = predicted + DVec3::new(15.0, 0.0, 0.0);
    let outcome = vehicle.receive_snapshot(snapshot(1, 1, server_position, 0), Some(&safety));

    let SnapshotOutcome::Applied(reconciliation) = outcome else {
        panic!("snapshot not applied: {outcome:?}");
    };
    assert!((reconciliation.error - 15.0).abs() < 1e-3);
    assert!(reconciliation.correction_strength > 0.0);
    assert!(reconciliation.correction_strength < 1.0);
    assert!(!reconciliation.resync_requested);

    let moved = vehicle.position().x - predicted.x;
    assert!(moved > 0.0 && moved < 15.0);
    assert_eq!(vehicle.stats().corrections, 1);
}

#[test]
fn test_large_error_without_safety_snaps_and_replays() {
    let mut vehicle = client();
    let thrust = Vec3::new(0.0, 0.0, 6.0);
    for frame in 0..4 {
        let input = vehicle.next_input(frame as f64 / 60.0, 1.0 / 60.0, thrust, Vec3::ZERO);
        vehicle.predict_local(input);
    }

    let server_position = DVec3::new(500.0, 0.0, 0.0);
    let outcome = vehicle.receive_snapshot(snapshot(1, 2, server_position, 0), None);
    let SnapshotOutcome::Applied(reconciliation) = outcome else {
        panic!("snapshot not applied: {outcome:?}");
    };
    assert_eq!(reconciliation.correction_strength, 1.0);
    assert_eq!(reconciliation.replayed, 2);
    assert!((vehicle.position().x - 500.0).abs() < 1e-3);
    assert!(vehicle.position().z > 0.0);
}

#[test]
fn test_persistent_desync_requests_resync() {
    let safety = SafetyMonitor::new(SafetyConfig::default());
    let mut vehicle = client();
    coast(&mut vehicle, 10);

    let mut requested = false;
    for sequence in 1..=5 {
        let ack = sequence;
        let predicted = vehicle.input_buffer().find(ack).unwrap().predicted.position;
        let outcome =
            vehicle.receive_snapshot(snapshot(sequence, ack, predicted + DVec3::new(0.0, 50.0, 0.0), 0), Some(&safety));
        if let SnapshotOutcome::Applied(reconciliation) = outcome {
            requested |= reconciliation.resync_requested;
        }
    }
    assert!(requested);
    assert!(vehicle.is_awaiting_full_state());
    assert!(vehicle.take_resync_request());
    assert!(!vehicle.take_resync_request());
}

#[test]
fn test_full_state_snaps() {
    let mut vehicle = client();
    coast(&mut vehicle, 2);
    vehicle.mark_resync_requested();

    let outcome = vehicle.apply_full_state(snapshot(1, 2, DVec3::new(0.0, 3.0, 0.0), 0), None);
    assert!(matches!(outcome, SnapshotOutcome::Applied(r) if r.correction_strength == 1.0));
    assert_eq!(vehicle.position(), DVec3::new(0.0, 3.0, 0.0));
    assert!(!vehicle.is_awaiting_full_state());
    assert_eq!(vehicle.stats().full_states_applied, 1);
}

#[test]
fn test_missing_baseline_requests_resync() {
    let mut vehicle = client();
    let mut delta = snapshot(4, 0, DVec3::ZERO, 0);
    delta.position = PositionEncoding::Delta {
        baseline: 3,
        sector_delta: [0, 0, 0],
        offset: Vec3::ZERO,
    };

    assert_eq!(vehicle.receive_snapshot(delta, None), SnapshotOutcome::MissingBaseline);
    assert!(vehicle.is_awaiting_full_state());
    assert_eq!(vehicle.last_snapshot_sequence(), None);
}

#[test]
fn test_delta_after_keyframe_decodes() {
    let mut vehicle = client();
    vehicle.receive_snapshot(snapshot(1, 0, DVec3::new(120_000.0, 0.0, 0.0), 0), None);

    let mut delta = snapshot(2, 0, DVec3::ZERO, 0);
    delta.position = PositionEncoding::Delta {
        baseline: 1,
        sector_delta: [0, 0, 0],
        offset: Vec3::new(25_000.0, 0.0, 0.0),
    };
    assert!(matches!(vehicle.receive_snapshot(delta, None), SnapshotOutcome::Applied(_)));
    assert!((vehicle.position().x - 125_000.0).abs() < 1e-3);
}

#[test]
fn test_epoch_gating() {
    let mut vehicle = client();
    coast(&mut vehicle, 1);
    let start = vehicle.position();

    let early = snapshot(3, 1, start + DVec3::new(-60_000.0, 0.0, 0.0), 1);
    assert_eq!(vehicle.receive_snapshot(early, None), SnapshotOutcome::Held);
    assert_eq!(vehicle.held_snapshots(), 1);
    assert_eq!(vehicle.position(), start);

    let event = RecenterEvent {
        delta: DVec3::new(-60_000.0, 0.0, 0.0),
        total_offset: DVec3::new(60_000.0, 0.0, 0.0),
        epoch: 1,
        reason: RecenterReason::Threshold,
    };
    let ready = vehicle.apply_recenter(&event);
    assert_eq!(ready.len(), 1);
    assert_eq!(vehicle.origin_epoch(), 1);
    assert_eq!(vehicle.position(), start + event.delta);

    let (held, full) = ready[0];
    assert!(!full);
    let outcome = vehicle.receive_snapshot(held, None);
    assert!(matches!(outcome, SnapshotOutcome::Applied(r) if r.correction_strength == 0.0));

    let outdated = snapshot(4, 1, start, 0);
    assert_eq!(vehicle.receive_snapshot(outdated, None), SnapshotOutcome::OutdatedEpoch);

    assert!(vehicle.apply_recenter(&event).is_empty());
    assert_eq!(vehicle.position(), start + event.delta);
}

#[test]
fn test_foreign_snapshot_ignored() {
    let mut vehicle = client();
    let mut other = snapshot(1, 0, DVec3::splat(10.0), 0);
    other.vehicle_id = 2;
    assert_eq!(vehicle.receive_snapshot(other, None), SnapshotOutcome::Foreign);
    assert_eq!(vehicle.last_snapshot_sequence(), None);
}

#[test]
fn test_sector_addressing_in_snapshots() {
    let far = snapshot(1, 0, DVec3::new(350_000.0, -20.0, 0.0), 0);
    match far.position {
        PositionEncoding::Full(position) => assert_eq!(position.sector, IVec3::new(4, 0, 0)),
        PositionEncoding::Delta { .. } => panic!("expected keyframe"),
    }
}

#[test]
fn test_sequence_saturates_at_max() {
    let mut vehicle = client();
    let last = VehicleInput::new(u32::MAX, 0.0, 1.0 / 60.0, Vec3::ZERO, Vec3::ZERO);
    vehicle.predict_local(last);
    assert_eq!(vehicle.next_input(1.0 / 60.0, 1.0 / 60.0, Vec3::ZERO, Vec3::ZERO).sequence, u32::MAX);
    assert_eq!(vehicle.next_input(2.0 / 60.0, 1.0 / 60.0, Vec3::ZERO, Vec3::ZERO).sequence, u32::MAX);
}
