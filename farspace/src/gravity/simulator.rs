//! Newtonian gravity from registered bodies onto a single target
//!
//! Bodies attract the target only. There is no mutual attraction between
//! celestial bodies, whose motion is left to the host.

use crate::celestial::{BodyHandle, BodyRegistry, BodySample};
use crate::config::GravityConfig;
use crate::core::constants::{GRAVITATIONAL_CONSTANT, STANDARD_GRAVITY};
use crate::core::types::SimulationMode;
use crate::physics::PhysicsBody;
use crate::safety::SafetyMonitor;
use crate::utils::sync;
use glam::DVec3;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Work counters for profiling the solver
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GravityStats {
    /// Body contributions evaluated since `begin_frame`
    pub calculations_this_frame: u64,
    /// Contributions evaluated during the previous frame
    pub calculations_last_frame: u64,
    pub total_calculations: u64,
    pub total_time: Duration,
    pub frames: u64,
}

struct GravityState {
    config: GravityConfig,
    stats: GravityStats,
}

pub struct GravitySimulator {
    state: Mutex<GravityState>,
    registry: Arc<BodyRegistry>,
    safety: Option<Arc<SafetyMonitor>>,
}

impl GravitySimulator {
    pub fn new(
        config: GravityConfig,
        registry: Arc<BodyRegistry>,
        safety: Option<Arc<SafetyMonitor>>,
    ) -> Self {
        info!(mode = ?config.mode, "Initializing gravity simulator");
        if safety.is_none() {
            warn!(
                max_g_force = config.fallback_max_g_force,
                "Gravity simulator running without a safety monitor, using local G clamp"
            );
        }
        Self {
            state: Mutex::new(GravityState {
                config,
                stats: GravityStats::default(),
            }),
            registry,
            safety,
        }
    }

    pub fn config(&self) -> GravityConfig {
        sync::lock(&self.state).config.clone()
    }

    pub fn mode(&self) -> SimulationMode {
        sync::lock(&self.state).config.mode
    }

    pub fn set_mode(&self, mode: SimulationMode) {
        let previous = std::mem::replace(&mut sync::lock(&self.state).config.mode, mode);
        if previous != mode {
            info!(?previous, ?mode, "Gravity simulation mode changed");
        }
    }

    pub fn registry(&self) -> &Arc<BodyRegistry> {
        &self.registry
    }

    /// Force exerted by `body` on a target of `target_mass` at `position`
    ///
    /// Directed from the target toward the body. Separation is floored at
    /// `min_distance`; coincident positions yield zero.
    pub fn force_between(
        body: &BodySample,
        target_mass: f64,
        position: DVec3,
        min_distance: f64,
    ) -> DVec3 {
        let offset = body.position - position;
        let distance = offset.length();
        if distance <= f64::EPSILON || body.mass <= 0.0 {
            return DVec3::ZERO;
        }
        let separation = distance.max(min_distance);
        let magnitude = GRAVITATIONAL_CONSTANT * body.mass * target_mass / (separation * separation);
        offset / distance * magnitude
    }

    /// Force a single registered body exerts on the target
    pub fn force_from_body(&self, body: &BodyHandle, target_mass: f64, position: DVec3) -> DVec3 {
        let min_distance = sync::lock(&self.state).config.min_distance;
        let sample = body.sample();
        self.record(1, Duration::ZERO);
        Self::force_between(&sample, target_mass, position, min_distance)
    }

    /// Total force on a target under the active simulation mode
    pub fn calculate_total_force(&self, target_mass: f64, position: DVec3) -> DVec3 {
        if !(target_mass.is_finite() && target_mass > 0.0) {
            warn!(target_mass, "Invalid target mass, no gravity applied");
            return DVec3::ZERO;
        }
        if !position.is_finite() {
            warn!(?position, "Non-finite target position, no gravity applied");
            return DVec3::ZERO;
        }

        let config = self.config();
        if config.mode == SimulationMode::Disabled {
            return DVec3::ZERO;
        }

        let started = Instant::now();
        let bodies = Self::select(&config, self.registry.samples(), position);
        let total = bodies.iter().fold(DVec3::ZERO, |sum, body| {
            sum + Self::force_between(body, target_mass, position, config.min_distance)
        });
        self.record(bodies.len() as u64, started.elapsed());

        total
    }

    /// Acceleration a free-falling object would feel at `position` (m/s²)
    pub fn gravitational_acceleration(&self, position: DVec3) -> DVec3 {
        self.calculate_total_force(1.0, position)
    }

    /// The body with the strongest influence (`mass / distance²`) at `position`
    pub fn dominant_body(&self, position: DVec3) -> Option<BodySample> {
        let min_distance = sync::lock(&self.state).config.min_distance;
        self.registry
            .samples()
            .into_iter()
            .filter(|body| body.mass > 0.0)
            .max_by(|a, b| {
                influence(a, position, min_distance)
                    .partial_cmp(&influence(b, position, min_distance))
                    .unwrap_or(Ordering::Equal)
            })
    }

    /// Bodies the active mode would include for a target at `position`
    pub fn influencing_bodies(&self, position: DVec3) -> Vec<BodySample> {
        let config = self.config();
        if config.mode == SimulationMode::Disabled {
            return Vec::new();
        }
        Self::select(&config, self.registry.samples(), position)
    }

    fn select(config: &GravityConfig, mut bodies: Vec<BodySample>, position: DVec3) -> Vec<BodySample> {
        bodies.retain(|body| body.mass > 0.0 && body.position.is_finite());
        let by_influence = |a: &BodySample, b: &BodySample| {
            influence(b, position, config.min_distance)
                .partial_cmp(&influence(a, position, config.min_distance))
                .unwrap_or(Ordering::Equal)
        };

        match config.mode {
            SimulationMode::Disabled => Vec::new(),
            SimulationMode::SingleBody => {
                bodies.sort_by(by_influence);
                bodies.truncate(1);
                bodies
            }
            SimulationMode::MultiBody => {
                bodies.sort_by(by_influence);
                bodies.truncate(config.multi_body_count);
                bodies
            }
            SimulationMode::NBody => {
                bodies.retain(|body| body.position.distance(position) <= config.max_influence_distance);
                bodies
            }
        }
    }

    /// Sphere of influence radius in meters
    ///
    /// Scales with the cube root of mass relative to the reference body and
    /// is never smaller than twice the body's own radius.
    pub fn sphere_of_influence(&self, body: &BodySample) -> f64 {
        let config = self.config();
        let scaled = config.soi_reference_radius * (body.mass / config.soi_reference_mass).cbrt();
        scaled.max(body.radius_m() * 2.0)
    }

    pub fn is_within_influence_radius(&self, body: &BodySample, position: DVec3) -> bool {
        body.position.distance(position) <= self.sphere_of_influence(body)
    }

    /// Compute, convert, clamp and apply gravity to an actor
    ///
    /// Returns the force handed to `apply_force`, zero if nothing was applied.
    pub fn apply_to_body(&self, body: &mut dyn PhysicsBody, dt: f64) -> DVec3 {
        if !(dt.is_finite() && dt > 0.0) {
            return DVec3::ZERO;
        }

        let mass = body.mass();
        let force = self.calculate_total_force(mass, body.position());
        if force == DVec3::ZERO {
            return DVec3::ZERO;
        }

        let (force_unit_scale, fallback_max_g) = {
            let state = sync::lock(&self.state);
            (state.config.force_unit_scale, state.config.fallback_max_g_force)
        };
        let engine_force = force * force_unit_scale;

        let clamped = match &self.safety {
            Some(safety) => safety.clamp_force(engine_force, mass, body.name()),
            None => clamp_to_g(engine_force, mass, fallback_max_g),
        };

        if !clamped.is_finite() {
            warn!(actor = body.name(), "Gravity produced a non-finite force, skipped");
            return DVec3::ZERO;
        }

        body.apply_force(clamped, dt);
        debug!(actor = body.name(), force = clamped.length(), "Applied gravity");
        clamped
    }

    /// Roll the per-frame counter over
    pub fn begin_frame(&self) {
        let mut state = sync::lock(&self.state);
        state.stats.calculations_last_frame = state.stats.calculations_this_frame;
        state.stats.calculations_this_frame = 0;
        state.stats.frames += 1;
    }

    pub fn stats(&self) -> GravityStats {
        sync::lock(&self.state).stats
    }

    fn record(&self, calculations: u64, elapsed: Duration) {
        let mut state = sync::lock(&self.state);
        state.stats.calculations_this_frame += calculations;
        state.stats.total_calculations += calculations;
        state.stats.total_time += elapsed;
    }
}

impl std::fmt::Debug for GravitySimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = sync::lock(&self.state);
        f.debug_struct("GravitySimulator")
            .field("config", &state.config)
            .field("stats", &state.stats)
            .field("safety", &self.safety.is_some())
            .finish()
    }
}

/// Influence strength used to rank bodies: `mass / distance²`
fn influence(body: &BodySample, position: DVec3, min_distance: f64) -> f64 {
    let distance = body.position.distance(position).max(min_distance);
    body.mass / (distance * distance)
}

/// Local G limit used when the safety monitor is unavailable
pub(crate) fn clamp_to_g(force: DVec3, mass: f64, max_g_force: f64) -> DVec3 {
    if !force.is_finite() || !(mass.is_finite() && mass > 0.0) {
        return DVec3::ZERO;
    }
    let max_force = max_g_force * STANDARD_GRAVITY * mass;
    let magnitude = force.length();
    if magnitude > max_force {
        force * (max_force / magnitude)
    } else {
        force
    }
}
