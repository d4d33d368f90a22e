//! Celestial body data and the shared handle hosts own

use crate::core::constants::{ReferenceBody, METERS_PER_KM};
use crate::core::types::LodLevel;
use crate::utils::sync;
use glam::DVec3;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::warn;

/// One gravitating, renderable body
///
/// Name, mass and radius are fixed at construction so the registry's name
/// index can never go stale. Position and scale state are updated by the
/// host and by the registry's bulk passes.
#[derive(Debug, Clone)]
pub struct CelestialBody {
    name: Arc<str>,
    mass: f64,
    radius_km: f64,
    /// Position in meters, relative to the current world origin
    pub position: DVec3,
    /// Scale currently applied
    pub current_scale: f64,
    /// Scale the body is transitioning toward
    pub target_scale: f64,
    pub lod_level: LodLevel,
}

impl CelestialBody {
    /// Create a body. Negative or non-finite mass and radius are reset to zero.
    pub fn new(name: impl Into<Arc<str>>, mass: f64, radius_km: f64, position: DVec3) -> Self {
        let name = name.into();
        Self {
            mass: sanitize_quantity(&name, "mass", mass),
            radius_km: sanitize_quantity(&name, "radius", radius_km),
            name,
            position,
            current_scale: 1.0,
            target_scale: 1.0,
            lod_level: LodLevel::default(),
        }
    }

    /// Create a body from the reference catalogue
    pub fn from_reference(reference: &ReferenceBody, position: DVec3) -> Self {
        Self::new(reference.name, reference.mass, reference.radius_km, position)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_km * METERS_PER_KM
    }

    /// Plain-data copy used by the gravity solver
    pub fn sample(&self) -> BodySample {
        BodySample {
            name: self.name.clone(),
            mass: self.mass,
            radius_km: self.radius_km,
            position: self.position,
        }
    }
}

fn sanitize_quantity(name: &str, what: &str, value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        warn!(body = name, value, "Invalid {what} for celestial body, using 0");
        0.0
    }
}

/// Immutable copy of the physical attributes of a body at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct BodySample {
    pub name: Arc<str>,
    pub mass: f64,
    pub radius_km: f64,
    pub position: DVec3,
}

impl BodySample {
    pub fn radius_m(&self) -> f64 {
        self.radius_km * METERS_PER_KM
    }
}

/// Shared, host-owned handle to a celestial body
///
/// The host keeps the handle alive for as long as the body exists. The
/// registry only ever stores a weak reference derived from it.
#[derive(Clone)]
pub struct BodyHandle(Arc<RwLock<CelestialBody>>);

impl BodyHandle {
    pub fn new(body: CelestialBody) -> Self {
        Self(Arc::new(RwLock::new(body)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, CelestialBody> {
        sync::read(&self.0)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, CelestialBody> {
        sync::write(&self.0)
    }

    pub fn name(&self) -> Arc<str> {
        self.read().name.clone()
    }

    pub fn position(&self) -> DVec3 {
        self.read().position
    }

    pub fn sample(&self) -> BodySample {
        self.read().sample()
    }

    pub fn ptr_eq(&self, other: &BodyHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<RwLock<CelestialBody>> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn from_arc(inner: Arc<RwLock<CelestialBody>>) -> Self {
        Self(inner)
    }
}

impl From<CelestialBody> for BodyHandle {
    fn from(body: CelestialBody) -> Self {
        Self::new(body)
    }
}

impl fmt::Debug for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.read();
        f.debug_struct("BodyHandle")
            .field("name", &body.name)
            .field("mass", &body.mass)
            .field("position", &body.position)
            .finish()
    }
}
