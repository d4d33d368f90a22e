//! Physics-facing actor state
//!
//! The simulation core never owns vehicles. Hosts hand it anything that
//! implements [`PhysicsBody`]; `Rigidbody` is the implementation used by the
//! network layer and the sandbox.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// What the gravity and safety layers need from a simulated actor
pub trait PhysicsBody {
    /// Name used when logging safety events
    fn name(&self) -> &str;

    /// Position in meters relative to the current world origin
    fn position(&self) -> DVec3;
    fn set_position(&mut self, position: DVec3);

    /// Linear velocity in m/s
    fn velocity(&self) -> DVec3;
    fn set_velocity(&mut self, velocity: DVec3);

    /// Angular velocity in rad/s
    fn angular_velocity(&self) -> DVec3;
    fn set_angular_velocity(&mut self, angular_velocity: DVec3);

    /// Mass in kilograms
    fn mass(&self) -> f64;

    /// Apply a force in engine units for `dt` seconds
    fn apply_force(&mut self, force: DVec3, dt: f64);
}

/// Point-mass rigid body with double precision state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rigidbody {
    pub name: String,

    /// Mass in kilograms
    pub mass: f64,

    /// Linear damping coefficient
    pub linear_damping: f64,

    /// Angular damping coefficient
    pub angular_damping: f64,

    pub position: DVec3,

    /// Linear velocity in world space
    pub linear_velocity: DVec3,

    /// Angular velocity in world space
    pub angular_velocity: DVec3,

    /// Scalar moment of inertia used for torque
    pub inertia: f64,

    /// Kinematic bodies are not affected by forces
    pub is_kinematic: bool,
}

impl Default for Rigidbody {
    fn default() -> Self {
        Self {
            name: String::from("rigidbody"),
            mass: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            position: DVec3::ZERO,
            linear_velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
            inertia: 1.0,
            is_kinematic: false,
        }
    }
}

impl Rigidbody {
    /// Create a kinematic rigidbody (not affected by forces)
    pub fn kinematic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_kinematic: true,
            ..Default::default()
        }
    }

    /// Create a dynamic rigidbody with the given mass
    pub fn dynamic(name: impl Into<String>, mass: f64) -> Self {
        Self {
            name: name.into(),
            mass,
            ..Default::default()
        }
    }

    pub fn with_position(mut self, position: DVec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_velocity(mut self, velocity: DVec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    /// Apply a force to the rigidbody
    pub fn apply_force(&mut self, force: DVec3, dt: f64) {
        if !self.is_kinematic && self.mass > 0.0 {
            let acceleration = force / self.mass;
            self.linear_velocity += acceleration * dt;
        }
    }

    /// Apply a torque to the rigidbody
    pub fn apply_torque(&mut self, torque: DVec3, dt: f64) {
        if !self.is_kinematic && self.inertia > 0.0 {
            let angular_acceleration = torque / self.inertia;
            self.angular_velocity += angular_acceleration * dt;
        }
    }

    /// Apply damping to velocities
    pub fn apply_damping(&mut self, dt: f64) {
        let linear_damping_factor = (1.0 - self.linear_damping * dt).max(0.0);
        let angular_damping_factor = (1.0 - self.angular_damping * dt).max(0.0);

        self.linear_velocity *= linear_damping_factor;
        self.angular_velocity *= angular_damping_factor;
    }

    /// Advance the position by the current velocity
    pub fn integrate(&mut self, dt: f64) {
        if !self.is_kinematic {
            self.position += self.linear_velocity * dt;
        }
    }
}

impl PhysicsBody for Rigidbody {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> DVec3 {
        self.position
    }

    fn set_position(&mut self, position: DVec3) {
        self.position = position;
    }

    fn velocity(&self) -> DVec3 {
        self.linear_velocity
    }

    fn set_velocity(&mut self, velocity: DVec3) {
        self.linear_velocity = velocity;
    }

    fn angular_velocity(&self) -> DVec3 {
        self.angular_velocity
    }

    fn set_angular_velocity(&mut self, angular_velocity: DVec3) {
        self.angular_velocity = angular_velocity;
    }

    fn mass(&self) -> f64 {
        self.mass
    }

    fn apply_force(&mut self, force: DVec3, dt: f64) {
        Rigidbody::apply_force(self, force, dt);
    }
}
