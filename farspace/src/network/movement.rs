//! Deterministic vehicle movement shared by client prediction and the server
//!
//! Client and server must produce bit-identical results for the same state
//! and input, so this model uses only f64 arithmetic with no hidden state.

use super::input::VehicleInput;
use crate::config::NetworkConfig;
use glam::{DQuat, DVec3};

/// Kinematic state of a replicated vehicle, in the current local frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub position: DVec3,
    pub velocity: DVec3,
    pub orientation: DQuat,
    pub angular_velocity: DVec3,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            velocity: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
            angular_velocity: DVec3::ZERO,
        }
    }
}

impl VehicleState {
    pub fn at(position: DVec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.velocity.is_finite()
            && self.orientation.is_finite()
            && self.angular_velocity.is_finite()
    }

    /// Move `strength` of the way toward `target`
    pub fn blend_toward(&self, target: &VehicleState, strength: f64) -> VehicleState {
        let t = strength.clamp(0.0, 1.0);
        if t >= 1.0 {
            return *target;
        }
        VehicleState {
            position: self.position.lerp(target.position, t),
            velocity: self.velocity.lerp(target.velocity, t),
            orientation: self.orientation.slerp(target.orientation, t).normalize(),
            angular_velocity: self.angular_velocity.lerp(target.angular_velocity, t),
        }
    }
}

/// Limits and damping applied by the movement step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementModel {
    pub max_thrust: f64,
    pub max_speed: f64,
    pub angular_damping: f64,
}

impl MovementModel {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            max_thrust: config.max_thrust as f64,
            max_speed: config.max_speed,
            angular_damping: 0.5,
        }
    }

    /// Advance `state` by one input
    pub fn step(&self, state: &VehicleState, input: &VehicleInput) -> VehicleState {
        let dt = input.delta_time as f64;
        if !(dt.is_finite() && dt > 0.0) || !input.is_finite() {
            return *state;
        }

        let thrust = input.thrust.as_dvec3().clamp_length_max(self.max_thrust);
        let acceleration = state.orientation * thrust;
        let velocity = (state.velocity + acceleration * dt).clamp_length_max(self.max_speed);
        let position = state.position + velocity * dt;

        let damping = (1.0 - self.angular_damping * dt).max(0.0);
        let angular_velocity = (state.angular_velocity + input.torque.as_dvec3() * dt) * damping;
        let orientation =
            (DQuat::from_scaled_axis(angular_velocity * dt) * state.orientation).normalize();

        VehicleState {
            position,
            velocity,
            orientation,
            angular_velocity,
        }
    }

    /// Apply a sequence of inputs in order
    pub fn replay<'a>(
        &self,
        start: VehicleState,
        inputs: impl IntoIterator<Item = &'a VehicleInput>,
    ) -> VehicleState {
        inputs
            .into_iter()
            .fold(start, |state, input| self.step(&state, input))
    }
}

impl Default for MovementModel {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}
