//! Tests for the floating origin

use super::*;
use crate::celestial::{BodyHandle, BodyRegistry, CelestialBody};
use crate::config::{OriginConfig, SafetyConfig};
use crate::safety::SafetyMonitor;
use glam::DVec3;
use std::sync::Arc;

fn manager(threshold: f64, enabled: bool) -> OriginManager {
    OriginManager::new(
        OriginConfig {
            enabled,
            recenter_threshold: threshold,
            ..Default::default()
        },
        None,
    )
}

#[derive(Default)]
struct RecordingBroadcaster {
    events: Vec<RecenterEvent>,
}

impl RecenterBroadcaster for RecordingBroadcaster {
    fn broadcast_recenter(&mut self, event: &RecenterEvent) {
        self.events.push(*event);
    }
}

#[test]
fn test_no_shift_within_threshold() {
    let registry = BodyRegistry::default();
    let mut origin = manager(10_000.0, true);

    assert!(origin.tick(DVec3::new(5_000.0, 0.0, 0.0), &registry, None).is_none());
    assert_eq!(origin.epoch(), 0);
    assert_eq!(origin.player_local_position(), DVec3::new(5_000.0, 0.0, 0.0));
}

#[test]
fn test_shift_translates_bodies_and_broadcasts() {
    let registry = BodyRegistry::default();
    let moon = BodyHandle::new(CelestialBody::new("Moon", 7.342e22, 1_737.4, DVec3::new(3.844e8, 0.0, 0.0)));
    registry.register(&moon);

    let mut origin = manager(10_000.0, true);
    let mut broadcaster = RecordingBroadcaster::default();
    let player = DVec3::new(15_000.0, 5_000.0, 0.0);

    let event = origin.tick(player, &registry, Some(&mut broadcaster)).unwrap();

    assert_eq!(event.delta, -player);
    assert_eq!(event.total_offset, player);
    assert_eq!(event.epoch, 1);
    assert_eq!(event.reason, RecenterReason::Threshold);
    assert_eq!(broadcaster.events, vec![event]);

    assert_eq!(moon.position(), DVec3::new(3.844e8 - 15_000.0, -5_000.0, 0.0));
    assert_eq!(origin.player_local_position(), DVec3::ZERO);
    assert_eq!(origin.total_offset(), player);
}

#[test]
fn test_world_local_round_trip() {
    let registry = BodyRegistry::default();
    let mut origin = manager(10_000.0, true);
    origin.tick(DVec3::new(15_000.0, 0.0, 0.0), &registry, None);

    let world_pos = DVec3::new(20_000.0, 8_000.0, 1_000.0);
    let local = origin.world_to_local(world_pos);
    assert_eq!(local, DVec3::new(5_000.0, 8_000.0, 1_000.0));
    assert!((origin.local_to_world(local) - world_pos).length() < f64::EPSILON);
}

#[test]
fn test_origin_shifting_disabled() {
    let registry = BodyRegistry::default();
    let mut origin = manager(10_000.0, false);

    let far = DVec3::new(50_000.0, 25_000.0, 0.0);
    assert!(origin.tick(far, &registry, None).is_none());
    assert_eq!(origin.total_offset(), DVec3::ZERO);
    assert_eq!(origin.player_local_position(), far);

    origin.set_enabled(true);
    assert!(origin.tick(far, &registry, None).is_some());
}

#[test]
fn test_emergency_request_forces_shift() {
    let registry = BodyRegistry::default();
    let safety = Arc::new(SafetyMonitor::new(SafetyConfig::default()));
    let mut origin = OriginManager::new(
        OriginConfig {
            recenter_threshold: 1.0e9,
            ..Default::default()
        },
        Some(safety.clone()),
    );

    safety.check_precision(DVec3::new(5.0e7, 0.0, 0.0), "probe");
    assert!(safety.has_recenter_request());

    let event = origin.tick(DVec3::new(200.0, 0.0, 0.0), &registry, None).unwrap();
    assert_eq!(event.reason, RecenterReason::Emergency);
    assert_eq!(event.delta, DVec3::new(-200.0, 0.0, 0.0));
    assert!(!safety.has_recenter_request());
}

#[test]
fn test_far_player_triggers_emergency_through_precision_check() {
    let registry = BodyRegistry::default();
    let safety = Arc::new(SafetyMonitor::new(SafetyConfig::default()));
    let mut origin = OriginManager::new(OriginConfig::default(), Some(safety.clone()));

    let event = origin.tick(DVec3::new(0.0, 0.0, 2.0e7), &registry, None).unwrap();
    assert_eq!(event.reason, RecenterReason::Emergency);
    assert_eq!(safety.stats().emergencies, 1);
}

#[test]
fn test_non_finite_player_position_ignored() {
    let registry = BodyRegistry::default();
    let mut origin = manager(10_000.0, true);
    assert!(origin.tick(DVec3::new(f64::NAN, 0.0, 0.0), &registry, None).is_none());
    assert_eq!(origin.epoch(), 0);
}

#[test]
fn test_history_is_bounded() {
    let registry = BodyRegistry::default();
    let mut origin = OriginManager::new(
        OriginConfig {
            recenter_threshold: 10.0,
            max_history: 3,
            ..Default::default()
        },
        None,
    );

    for _ in 0..5 {
        origin.tick(DVec3::new(100.0, 0.0, 0.0), &registry, None);
    }
    assert_eq!(origin.epoch(), 5);
    let epochs: Vec<u32> = origin.history().map(|shift| shift.event.epoch).collect();
    assert_eq!(epochs, vec![3, 4, 5]);
    assert_eq!(origin.total_offset(), DVec3::new(500.0, 0.0, 0.0));

    origin.clear_history();
    assert_eq!(origin.history().count(), 0);
}

#[test]
fn test_stats_and_virtual_position() {
    let registry = BodyRegistry::default();
    let mut origin = manager(10_000.0, true);
    origin.tick(DVec3::new(250_000.0, 0.0, 0.0), &registry, None);
    origin.tick(DVec3::new(1_000.0, 0.0, 0.0), &registry, None);

    let stats = origin.stats();
    assert_eq!(stats.player_world_position, DVec3::new(251_000.0, 0.0, 0.0));
    assert_eq!(stats.player_local_position, DVec3::new(1_000.0, 0.0, 0.0));
    assert_eq!(stats.shifts_recorded, 1);
    assert!(stats.enabled);

    let virtual_position = origin.player_virtual_position();
    assert_eq!(virtual_position.sector, glam::IVec3::new(3, 0, 0));
    assert!((virtual_position.offset.x - (-49_000.0)).abs() < 0.01);
}

#[test]
fn test_precision_at_large_distances() {
    // Local frame keeps sub-millimeter precision after a shift far from the original origin
    let registry = BodyRegistry::default();
    let mut origin = manager(10_000.0, true);
    origin.tick(DVec3::new(100_000_000.0, 50_000_000.0, 75_000_000.0), &registry, None);

    let world_pos = DVec3::new(100_000_001.0, 50_000_000.5, 74_999_999.75);
    let local = origin.world_to_local(world_pos);
    assert!((local.x - 1.0).abs() < 0.001);
    assert!((local.y - 0.5).abs() < 0.001);
    assert!((local.z + 0.25).abs() < 0.001);
}
