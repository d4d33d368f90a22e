//! Directory of every gravitating body in the world
//!
//! The registry is shared between the host's spawn/despawn callbacks, the
//! gravity solver and the origin manager. A single mutex guards the body
//! list and the name index, so a bulk pass such as `translate_all` is seen
//! by other registry callers either completely or not at all.

use super::body::{BodyHandle, BodySample, CelestialBody};
use crate::core::types::LodConfig;
use crate::events::Observers;
use crate::utils::sync;
use glam::DVec3;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::{debug, info, trace, warn};

/// Result of a registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// A live body with the same name is already registered; nothing changed
    AlreadyRegistered,
    /// The body failed validation (empty name)
    Rejected,
}

/// Notification emitted after the registry changes membership
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Registered(Arc<str>),
    Unregistered(Arc<str>),
}

struct Entry {
    name: Arc<str>,
    body: Weak<RwLock<CelestialBody>>,
}

#[derive(Default)]
struct RegistryState {
    entries: Vec<Entry>,
    index: HashMap<Arc<str>, usize>,
}

impl RegistryState {
    fn remove_at(&mut self, idx: usize) -> Entry {
        let removed = self.entries.swap_remove(idx);
        self.index.remove(&removed.name);
        if let Some(moved) = self.entries.get(idx) {
            self.index.insert(moved.name.clone(), idx);
        }
        removed
    }

    /// Drop entries whose host has already destroyed the body
    fn prune(&mut self) -> Vec<Arc<str>> {
        let mut pruned = Vec::new();
        let mut idx = 0;
        while idx < self.entries.len() {
            if self.entries[idx].body.strong_count() == 0 {
                pruned.push(self.remove_at(idx).name);
            } else {
                idx += 1;
            }
        }
        pruned
    }

    fn live(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.entries
            .iter()
            .filter_map(|entry| entry.body.upgrade().map(BodyHandle::from_arc))
    }

    /// Up to `limit` live bodies, nearest first. The ranked buffer is sorted
    /// and truncated in place, then reused for the returned handles.
    fn by_distance(&self, point: DVec3, limit: usize) -> Vec<BodyHandle> {
        let mut ranked: Vec<(f64, BodyHandle)> = self
            .live()
            .map(|handle| (handle.position().distance_squared(point), handle))
            .collect();
        ranked.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
        ranked.truncate(limit);
        ranked.into_iter().map(|(_, handle)| handle).collect()
    }
}

/// Thread-safe, non-owning directory of celestial bodies
pub struct BodyRegistry {
    state: Mutex<RegistryState>,
    lod: LodConfig,
    events: Observers<RegistryEvent>,
}

impl BodyRegistry {
    pub fn new(lod: LodConfig) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            lod,
            events: Observers::new(),
        }
    }

    /// Membership notifications
    pub fn events(&self) -> &Observers<RegistryEvent> {
        &self.events
    }

    /// Register a body. Registering a name that is already present is a no-op.
    pub fn register(&self, body: &BodyHandle) -> RegisterOutcome {
        let name = body.name();
        if name.trim().is_empty() {
            warn!("Refusing to register a celestial body without a name");
            return RegisterOutcome::Rejected;
        }

        {
            let mut state = sync::lock(&self.state);
            if let Some(&idx) = state.index.get(&name) {
                if state.entries[idx].body.strong_count() > 0 {
                    warn!(body = %name, "Celestial body already registered, ignoring");
                    return RegisterOutcome::AlreadyRegistered;
                }
                // Host dropped the previous body without unregistering it
                state.remove_at(idx);
            }

            let idx = state.entries.len();
            state.entries.push(Entry {
                name: name.clone(),
                body: body.downgrade(),
            });
            state.index.insert(name.clone(), idx);
            debug!(body = %name, total = state.entries.len(), "Registered celestial body");
        }

        self.events.notify(&RegistryEvent::Registered(name));
        RegisterOutcome::Registered
    }

    /// Remove a body. Only the exact handle that was registered is removed.
    pub fn unregister(&self, body: &BodyHandle) -> bool {
        let name = body.name();
        let removed = {
            let mut state = sync::lock(&self.state);
            match state.index.get(&name).copied() {
                Some(idx) if Weak::ptr_eq(&state.entries[idx].body, &body.downgrade()) => {
                    state.remove_at(idx);
                    true
                }
                Some(_) => {
                    warn!(body = %name, "Unregister called with a different body of the same name");
                    false
                }
                None => false,
            }
        };

        if removed {
            debug!(body = %name, "Unregistered celestial body");
            self.events.notify(&RegistryEvent::Unregistered(name));
        }
        removed
    }

    /// Remove whatever body is registered under `name`
    pub fn unregister_by_name(&self, name: &str) -> bool {
        let removed = {
            let mut state = sync::lock(&self.state);
            state
                .index
                .get(name)
                .copied()
                .map(|idx| state.remove_at(idx).name)
        };

        match removed {
            Some(name) => {
                self.events.notify(&RegistryEvent::Unregistered(name));
                true
            }
            None => false,
        }
    }

    /// Forget every body
    pub fn clear(&self) {
        let names: Vec<Arc<str>> = {
            let mut state = sync::lock(&self.state);
            state.index.clear();
            state.entries.drain(..).map(|entry| entry.name).collect()
        };
        info!(count = names.len(), "Cleared body registry");
        for name in names {
            self.events.notify(&RegistryEvent::Unregistered(name));
        }
    }

    /// Number of live registered bodies
    pub fn count(&self) -> usize {
        let mut state = sync::lock(&self.state);
        self.prune_locked(&mut state);
        state.entries.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_by_name(name).is_some()
    }

    /// Every live body, in registration order modulo removals
    pub fn all(&self) -> Vec<BodyHandle> {
        sync::lock(&self.state).live().collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<BodyHandle> {
        let state = sync::lock(&self.state);
        let idx = *state.index.get(name)?;
        state.entries[idx].body.upgrade().map(BodyHandle::from_arc)
    }

    /// Bodies whose center lies within `radius` of `point`
    pub fn in_range(&self, point: DVec3, radius: f64) -> Vec<BodyHandle> {
        let radius_sq = radius * radius;
        sync::lock(&self.state)
            .live()
            .filter(|handle| handle.position().distance_squared(point) <= radius_sq)
            .collect()
    }

    /// The `n` bodies closest to `point`, nearest first
    pub fn nearest_n(&self, point: DVec3, n: usize) -> Vec<BodyHandle> {
        sync::lock(&self.state).by_distance(point, n)
    }

    /// Alias of [`BodyRegistry::nearest_n`] under the gameplay-facing name
    pub fn find_nearest_bodies(&self, point: DVec3, n: usize) -> Vec<BodyHandle> {
        self.nearest_n(point, n)
    }

    /// Every body ordered by distance from `reference_point`, nearest first
    pub fn sort_by_distance(&self, reference_point: DVec3) -> Vec<BodyHandle> {
        sync::lock(&self.state).by_distance(reference_point, usize::MAX)
    }

    /// Consistent copy of every body's physical state, taken in one locked pass
    pub fn samples(&self) -> Vec<BodySample> {
        sync::lock(&self.state)
            .live()
            .map(|handle| handle.sample())
            .collect()
    }

    /// Shift every registered body by `offset_delta` in one atomic pass
    ///
    /// Used by the origin manager when the world is re-based. Returns the
    /// number of bodies moved.
    pub fn translate_all(&self, offset_delta: DVec3) -> usize {
        let mut state = sync::lock(&self.state);
        self.prune_locked(&mut state);

        let mut moved = 0;
        for handle in state.live() {
            handle.write().position += offset_delta;
            moved += 1;
        }
        trace!(?offset_delta, moved, "Translated all celestial bodies");
        moved
    }

    /// Recompute every body's target scale and LOD from its distance to
    /// `reference_point`. Returns the number of bodies updated.
    pub fn rescale_all(&self, reference_point: DVec3, mut scale_fn: impl FnMut(f64) -> f64) -> usize {
        let mut state = sync::lock(&self.state);
        self.prune_locked(&mut state);

        let mut updated = 0;
        for handle in state.live() {
            let mut body = handle.write();
            let distance = body.position.distance(reference_point);
            body.target_scale = scale_fn(distance);
            body.lod_level = self.lod.level_for_distance(distance);
            updated += 1;
        }
        updated
    }

    /// Apply `update` to every body while holding the registry lock
    pub fn for_each_body(&self, mut update: impl FnMut(&mut CelestialBody)) {
        let state = sync::lock(&self.state);
        for handle in state.live() {
            update(&mut handle.write());
        }
    }

    fn prune_locked(&self, state: &mut RegistryState) {
        for name in state.prune() {
            debug!(body = %name, "Pruned celestial body dropped by its host");
        }
    }
}

impl Default for BodyRegistry {
    fn default() -> Self {
        Self::new(LodConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LodLevel;

    fn body(name: &str, mass: f64, position: DVec3) -> BodyHandle {
        BodyHandle::new(CelestialBody::new(name, mass, 1.0, position))
    }

    #[test]
    fn test_find_until_unregister() {
        let registry = BodyRegistry::default();
        let a = body("Alpha", 1.0, DVec3::ZERO);
        let b = body("Beta", 2.0, DVec3::X);

        assert_eq!(registry.register(&a), RegisterOutcome::Registered);
        assert_eq!(registry.register(&b), RegisterOutcome::Registered);
        assert!(registry.find_by_name("Alpha").unwrap().ptr_eq(&a));

        assert!(registry.unregister(&a));
        assert!(registry.find_by_name("Alpha").is_none());
        // Index of the swapped-in entry stays valid
        assert!(registry.find_by_name("Beta").unwrap().ptr_eq(&b));
        assert!(!registry.unregister(&a));
    }

    #[test]
    fn test_duplicate_registration_is_noop() {
        let registry = BodyRegistry::default();
        let first = body("Earth", 1.0, DVec3::ZERO);
        let second = body("Earth", 5.0, DVec3::ONE);

        registry.register(&first);
        assert_eq!(registry.register(&first), RegisterOutcome::AlreadyRegistered);
        assert_eq!(registry.register(&second), RegisterOutcome::AlreadyRegistered);
        assert_eq!(registry.count(), 1);
        assert!(registry.find_by_name("Earth").unwrap().ptr_eq(&first));

        // The impostor cannot unregister the real body
        assert!(!registry.unregister(&second));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = BodyRegistry::default();
        assert_eq!(registry.register(&body("  ", 1.0, DVec3::ZERO)), RegisterOutcome::Rejected);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_dropped_bodies_are_pruned() {
        let registry = BodyRegistry::default();
        let keep = body("Keep", 1.0, DVec3::ZERO);
        {
            let temporary = body("Temporary", 1.0, DVec3::ZERO);
            registry.register(&temporary);
            registry.register(&keep);
            assert_eq!(registry.count(), 2);
        }
        assert_eq!(registry.count(), 1);
        assert!(registry.find_by_name("Temporary").is_none());

        // The name is free again
        let replacement = body("Temporary", 1.0, DVec3::ZERO);
        assert_eq!(registry.register(&replacement), RegisterOutcome::Registered);
    }

    #[test]
    fn test_spatial_queries() {
        let registry = BodyRegistry::default();
        let near = body("Near", 1.0, DVec3::new(10.0, 0.0, 0.0));
        let mid = body("Mid", 1.0, DVec3::new(0.0, 50.0, 0.0));
        let far = body("Far", 1.0, DVec3::new(0.0, 0.0, 500.0));
        for handle in [&far, &near, &mid] {
            registry.register(handle);
        }

        let in_range = registry.in_range(DVec3::ZERO, 60.0);
        assert_eq!(in_range.len(), 2);

        let nearest = registry.nearest_n(DVec3::ZERO, 2);
        assert!(nearest[0].ptr_eq(&near));
        assert!(nearest[1].ptr_eq(&mid));

        let sorted = registry.sort_by_distance(DVec3::new(0.0, 0.0, 490.0));
        assert!(sorted[0].ptr_eq(&far));
        assert_eq!(sorted.len(), 3);

        assert_eq!(registry.nearest_n(DVec3::ZERO, 10).len(), 3);
    }

    #[test]
    fn test_translate_round_trip() {
        let registry = BodyRegistry::default();
        let handles: Vec<BodyHandle> = (0..5)
            .map(|i| body(&format!("B{i}"), 1.0, DVec3::splat(i as f64 * 1.0e8 + 0.125)))
            .collect();
        for handle in &handles {
            registry.register(handle);
        }
        let before: Vec<DVec3> = handles.iter().map(|h| h.position()).collect();

        let delta = DVec3::new(-3.25e7, 1.5e6, 42.0);
        assert_eq!(registry.translate_all(delta), 5);
        assert_eq!(registry.translate_all(-delta), 5);

        for (handle, original) in handles.iter().zip(before) {
            assert!((handle.position() - original).length() < 1e-6);
        }
    }

    #[test]
    fn test_rescale_all_sets_target_and_lod() {
        let registry = BodyRegistry::default();
        let close = body("Close", 1.0, DVec3::new(1_000.0, 0.0, 0.0));
        let distant = body("Distant", 1.0, DVec3::new(5.0e7, 0.0, 0.0));
        registry.register(&close);
        registry.register(&distant);

        let updated = registry.rescale_all(DVec3::ZERO, |distance| 1.0e6 / distance);
        assert_eq!(updated, 2);

        let close = close.read();
        assert_eq!(close.target_scale, 1_000.0);
        assert_eq!(close.lod_level, LodLevel(0));
        assert_eq!(distant.read().lod_level, LodLevel(2));
    }

    #[test]
    fn test_registry_events() {
        use std::sync::Mutex as StdMutex;

        let registry = BodyRegistry::default();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        registry.events().subscribe(move |event: &RegistryEvent| {
            sink.lock().unwrap().push(event.clone());
        });

        let moon = body("Moon", 1.0, DVec3::ZERO);
        registry.register(&moon);
        registry.register(&moon);
        registry.unregister(&moon);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                RegistryEvent::Registered("Moon".into()),
                RegistryEvent::Unregistered("Moon".into())
            ]
        );
    }

    #[test]
    fn test_concurrent_registration_and_queries() {
        let registry = Arc::new(BodyRegistry::default());
        let handles: Vec<BodyHandle> = (0..64)
            .map(|i| body(&format!("Body{i}"), 1.0, DVec3::splat(i as f64)))
            .collect();

        std::thread::scope(|scope| {
            for chunk in handles.chunks(16) {
                let registry = registry.clone();
                scope.spawn(move || {
                    for handle in chunk {
                        registry.register(handle);
                        let _ = registry.nearest_n(DVec3::ZERO, 3);
                    }
                });
            }
        });

        assert_eq!(registry.count(), 64);
    }

    #[test]
    fn test_translate_is_atomic_for_readers() {
        let registry = Arc::new(BodyRegistry::default());
        let alpha = body("Alpha", 1.0, DVec3::new(1_000.0, 0.0, 0.0));
        let beta = body("Beta", 1.0, DVec3::new(5_000.0, 0.0, 0.0));
        registry.register(&alpha);
        registry.register(&beta);

        let delta = DVec3::new(1.5e6, -2.5e5, 0.0);
        let done = std::sync::atomic::AtomicBool::new(false);

        std::thread::scope(|scope| {
            let writer = registry.clone();
            let done = &done;
            scope.spawn(move || {
                for round in 0..2_000 {
                    let offset = if round % 2 == 0 { delta } else { -delta };
                    assert_eq!(writer.translate_all(offset), 2);
                }
                done.store(true, std::sync::atomic::Ordering::Release);
            });

            for _ in 0..3 {
                let reader = registry.clone();
                scope.spawn(move || {
                    let mut passes = 0;
                    while !done.load(std::sync::atomic::Ordering::Acquire) || passes == 0 {
                        let samples = reader.samples();
                        assert_eq!(samples.len(), 2);
                        let separation = samples[1].position - samples[0].position;
                        assert_eq!(separation.abs(), DVec3::new(4_000.0, 0.0, 0.0));

                        let y = samples[0].position.y;
                        assert!(y == 0.0 || y == delta.y);

                        assert_eq!(reader.nearest_n(DVec3::ZERO, 2).len(), 2);
                        passes += 1;
                    }
                });
            }
        });

        assert_eq!(alpha.position(), DVec3::new(1_000.0, 0.0, 0.0));
        assert_eq!(beta.position(), DVec3::new(5_000.0, 0.0, 0.0));
    }

    #[test]
    fn test_nearest_n_limits() {
        let registry = BodyRegistry::default();
        let handles: Vec<BodyHandle> = (0..4)
            .map(|i| body(&format!("N{i}"), 1.0, DVec3::new(i as f64 * 10.0, 0.0, 0.0)))
            .collect();
        for handle in &handles {
            registry.register(handle);
        }

        assert!(registry.nearest_n(DVec3::ZERO, 0).is_empty());
        let two = registry.nearest_n(DVec3::new(25.0, 0.0, 0.0), 2);
        assert_eq!(two.len(), 2);
        assert!(two[0].ptr_eq(&handles[2]) || two[0].ptr_eq(&handles[3]));
        assert_eq!(registry.sort_by_distance(DVec3::ZERO).len(), 4);
    }
}
