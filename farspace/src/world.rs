//! Explicitly constructed simulation services and the host-facing API
//!
//! A `SimulationWorld` owns one instance of each service. Hosts drive it with
//! [`SimulationWorld::tick`] once per frame and query it through the
//! gravity and scaling helpers below. Every helper degrades gracefully once
//! a service has been shut down: no gravity, neutral scale, no influence.

use crate::celestial::{BodyHandle, BodyRegistry, RegisterOutcome};
use crate::config::{ConfigError, SimulationConfig};
use crate::core::coordinates::{OriginManager, RecenterBroadcaster, RecenterEvent};
use crate::gravity::GravitySimulator;
use crate::physics::PhysicsBody;
use crate::safety::SafetyMonitor;
use crate::scaling::ScalingCalculator;
use glam::DVec3;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTick {
    pub frame: u64,
    /// Set when the origin moved; host actors must be shifted by `delta`
    pub recenter: Option<RecenterEvent>,
    pub bodies_rescaled: usize,
}

pub struct SimulationWorld {
    config: SimulationConfig,
    registry: Option<Arc<BodyRegistry>>,
    scaling: Option<Arc<ScalingCalculator>>,
    safety: Option<Arc<SafetyMonitor>>,
    gravity: Option<Arc<GravitySimulator>>,
    origin: Option<OriginManager>,
    frame: u64,
    last_rescale_position: Option<DVec3>,
}

impl SimulationWorld {
    /// Validate the configuration and start every service
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(BodyRegistry::new(config.lod.clone()));
        let scaling = Arc::new(ScalingCalculator::new(config.scaling.clone()));
        let safety = Arc::new(SafetyMonitor::new(config.safety.clone()));
        let gravity = Arc::new(GravitySimulator::new(
            config.gravity.clone(),
            registry.clone(),
            Some(safety.clone()),
        ));
        let origin = OriginManager::new(config.origin.clone(), Some(safety.clone()));

        info!("Simulation world started");
        Ok(Self {
            config,
            registry: Some(registry),
            scaling: Some(scaling),
            safety: Some(safety),
            gravity: Some(gravity),
            origin: Some(origin),
            frame: 0,
            last_rescale_position: None,
        })
    }

    /// Stop every service; later calls fall back to their degraded behavior
    pub fn shutdown(&mut self) {
        self.origin = None;
        self.gravity = None;
        self.scaling = None;
        self.safety = None;
        if let Some(registry) = self.registry.take() {
            registry.clear();
        }
        info!(frames = self.frame, "Simulation world shut down");
    }

    pub fn is_running(&self) -> bool {
        self.registry.is_some()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn registry(&self) -> Option<&Arc<BodyRegistry>> {
        self.registry.as_ref()
    }

    pub fn scaling(&self) -> Option<&Arc<ScalingCalculator>> {
        self.scaling.as_ref()
    }

    pub fn safety(&self) -> Option<&Arc<SafetyMonitor>> {
        self.safety.as_ref()
    }

    pub fn gravity(&self) -> Option<&Arc<GravitySimulator>> {
        self.gravity.as_ref()
    }

    pub fn origin(&self) -> Option<&OriginManager> {
        self.origin.as_ref()
    }

    pub fn origin_mut(&mut self) -> Option<&mut OriginManager> {
        self.origin.as_mut()
    }

    pub fn register_body(&self, body: &BodyHandle) -> RegisterOutcome {
        match &self.registry {
            Some(registry) => registry.register(body),
            None => {
                warn!("Body registry unavailable, registration rejected");
                RegisterOutcome::Rejected
            }
        }
    }

    /// Advance one frame
    ///
    /// Re-centers the origin around `player_position` when required, then
    /// refreshes body scales and levels of detail relative to the player.
    pub fn tick(
        &mut self,
        dt: f64,
        player_position: DVec3,
        broadcaster: Option<&mut dyn RecenterBroadcaster>,
    ) -> WorldTick {
        self.frame += 1;
        if let Some(gravity) = &self.gravity {
            gravity.begin_frame();
        }

        let Some(registry) = self.registry.clone() else {
            return WorldTick {
                frame: self.frame,
                recenter: None,
                bodies_rescaled: 0,
            };
        };

        let recenter = match self.origin.as_mut() {
            Some(origin) => origin.tick(player_position, &registry, broadcaster),
            None => None,
        };
        let player_local = match recenter {
            Some(event) => player_position + event.delta,
            None => player_position,
        };

        let bodies_rescaled = self.refresh_scales(&registry, player_local, dt);

        WorldTick {
            frame: self.frame,
            recenter,
            bodies_rescaled,
        }
    }

    fn refresh_scales(&mut self, registry: &BodyRegistry, player_local: DVec3, dt: f64) -> usize {
        let Some(scaling) = &self.scaling else {
            return 0;
        };
        let settings = &self.config.scaling;

        let player_world = match &self.origin {
            Some(origin) => origin.local_to_world(player_local),
            None => player_local,
        };
        let moved_enough = match self.last_rescale_position {
            Some(last) => {
                let moved = last.distance(player_world);
                ScalingCalculator::should_update(
                    settings.reference_distance,
                    settings.reference_distance + moved,
                    settings.update_threshold,
                )
            }
            None => true,
        };

        let rescaled = if moved_enough {
            self.last_rescale_position = Some(player_world);
            registry.rescale_all(player_local, |distance| scaling.scale_for_distance(distance))
        } else {
            0
        };

        if dt.is_finite() && dt > 0.0 {
            let speed = settings.transition_speed;
            registry.for_each_body(|body| {
                body.current_scale =
                    ScalingCalculator::smooth_transition(body.current_scale, body.target_scale, dt, speed);
            });
        }
        rescaled
    }

    /// Total gravitational force on a target, zero when gravity is unavailable
    pub fn calculate_total_gravitational_force(&self, target_mass: f64, position: DVec3) -> DVec3 {
        match &self.gravity {
            Some(gravity) => gravity.calculate_total_force(target_mass, position),
            None => {
                debug!("Gravity unavailable, returning zero force");
                DVec3::ZERO
            }
        }
    }

    /// Repair the actor's state if needed, then apply gravity to it
    pub fn apply_gravity_to_actor(&self, actor: &mut dyn PhysicsBody, dt: f64) -> DVec3 {
        if let Some(safety) = &self.safety {
            safety.validate_and_repair(actor);
        }
        match &self.gravity {
            Some(gravity) => gravity.apply_to_body(actor, dt),
            None => DVec3::ZERO,
        }
    }

    /// Scale factor for a distance, neutral (1.0) when scaling is unavailable
    pub fn calculate_scale_factor(&self, distance: f64, reference_distance: f64) -> f64 {
        match &self.scaling {
            Some(scaling) => scaling.scale_factor(distance, reference_distance),
            None => {
                debug!("Scaling unavailable, returning neutral scale");
                1.0
            }
        }
    }

    /// Whether `position` lies inside the named body's sphere of influence
    pub fn is_within_influence_radius(&self, body_name: &str, position: DVec3) -> bool {
        let (Some(registry), Some(gravity)) = (&self.registry, &self.gravity) else {
            return false;
        };
        match registry.find_by_name(body_name) {
            Some(body) => gravity.is_within_influence_radius(&body.sample(), position),
            None => {
                debug!(body = body_name, "Influence query for unknown body");
                false
            }
        }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

impl Drop for SimulationWorld {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for SimulationWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationWorld")
            .field("frame", &self.frame)
            .field("running", &self.is_running())
            .field("bodies", &self.registry.as_ref().map(|registry| registry.count()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celestial::CelestialBody;
    use crate::core::constants::*;
    use crate::physics::Rigidbody;

    fn world() -> SimulationWorld {
        SimulationWorld::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SimulationConfig::default();
        config.network.snapshot_rate_hz = 0.0;
        assert!(SimulationWorld::new(config).is_err());
    }

    #[test]
    fn test_tick_rescales_and_transitions() {
        let mut world = world();
        let near = BodyHandle::new(CelestialBody::new("Near", 1.0e20, 100.0, DVec3::new(2_000.0, 0.0, 0.0)));
        let far = BodyHandle::new(CelestialBody::new("Far", 1.0e20, 100.0, DVec3::new(5.0e9, 0.0, 0.0)));
        world.register_body(&near);
        world.register_body(&far);

        let tick = world.tick(1.0, DVec3::ZERO, None);
        assert_eq!(tick.bodies_rescaled, 2);
        assert!(near.read().target_scale > far.read().target_scale);
        assert_eq!(near.read().current_scale, near.read().target_scale);
        assert!(far.read().lod_level > near.read().lod_level);

        let second = world.tick(0.016, DVec3::new(1.0, 0.0, 0.0), None);
        assert_eq!(second.bodies_rescaled, 0);
        assert_eq!(second.frame, 2);
    }

    #[test]
    fn test_tick_recenters_far_player() {
        let mut world = world();
        let moon = BodyHandle::new(CelestialBody::new("Moon", MOON_MASS, MOON_RADIUS_KM, DVec3::new(3.844e8, 0.0, 0.0)));
        world.register_body(&moon);

        let tick = world.tick(0.016, DVec3::new(80_000.0, 0.0, 0.0), None);
        let event = tick.recenter.unwrap();
        assert_eq!(event.delta, DVec3::new(-80_000.0, 0.0, 0.0));
        assert_eq!(moon.position(), DVec3::new(3.844e8 - 80_000.0, 0.0, 0.0));
        assert_eq!(world.origin().unwrap().epoch(), 1);
    }

    #[test]
    fn test_upward_api_with_services() {
        let world = world();
        let earth = BodyHandle::new(CelestialBody::new("Earth", EARTH_MASS, EARTH_RADIUS_KM, DVec3::ZERO));
        world.register_body(&earth);

        let force = world.calculate_total_gravitational_force(1.0, DVec3::new(7.0e6, 0.0, 0.0));
        assert!(force.x < 0.0);
        assert!(world.is_within_influence_radius("Earth", DVec3::new(1.0e8, 0.0, 0.0)));
        assert!(!world.is_within_influence_radius("Pluto", DVec3::ZERO));
        assert_eq!(world.calculate_scale_factor(0.5, 1.0e6), 1.0e4);

        let mut ship = Rigidbody::dynamic("ship", 1_000.0).with_position(DVec3::new(f64::NAN, 0.0, 0.0));
        world.apply_gravity_to_actor(&mut ship, 0.1);
        assert!(ship.position.is_finite());
        assert!(ship.linear_velocity.is_finite());
    }

    #[test]
    fn test_degrades_after_shutdown() {
        let mut world = world();
        let earth = BodyHandle::new(CelestialBody::new("Earth", EARTH_MASS, EARTH_RADIUS_KM, DVec3::ZERO));
        world.register_body(&earth);
        world.shutdown();

        assert!(!world.is_running());
        assert_eq!(
            world.calculate_total_gravitational_force(1.0, DVec3::new(7.0e6, 0.0, 0.0)),
            DVec3::ZERO
        );
        assert_eq!(world.calculate_scale_factor(10.0, 1.0e6), 1.0);
        assert!(!world.is_within_influence_radius("Earth", DVec3::ZERO));
        assert_eq!(world.register_body(&earth), RegisterOutcome::Rejected);

        let mut ship = Rigidbody::dynamic("ship", 1_000.0).with_position(DVec3::new(7.0e6, 0.0, 0.0));
        assert_eq!(world.apply_gravity_to_actor(&mut ship, 0.1), DVec3::ZERO);

        let tick = world.tick(0.1, DVec3::ZERO, None);
        assert!(tick.recenter.is_none());
        assert_eq!(tick.bodies_rescaled, 0);
    }
}
