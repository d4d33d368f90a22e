//! Validation and clamping layer shared by every simulation service
//!
//! Nothing here is fatal. Out-of-range values are clamped, invalid ones are
//! replaced with a safe default, and every intervention is recorded in the
//! event log and mirrored to `tracing`.

use super::event_log::{EventLog, SafetyEvent, Severity};
use crate::config::SafetyConfig;
use crate::core::types::ScaleBounds;
use crate::events::{ObserverId, Observers};
use crate::physics::PhysicsBody;
use crate::utils::sync;
use glam::DVec3;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Distance-from-origin classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrecisionStatus {
    Safe,
    Warning,
    Emergency,
}

/// Raised when an actor strays past the emergency distance
#[derive(Debug, Clone, PartialEq)]
pub struct RecenterRequest {
    pub actor: String,
    pub position: DVec3,
}

/// Result of comparing a predicted position with the authoritative one
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DesyncAssessment {
    pub within_tolerance: bool,
    /// Distance between the two positions in meters
    pub error: f64,
    /// Blend factor toward the authoritative state, 0 inside tolerance
    pub correction_strength: f64,
    /// Set once too many consecutive evaluations fell outside tolerance
    pub resync_required: bool,
}

/// What `validate_and_repair` had to fix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub position_reset: bool,
    pub velocity_reset: bool,
    pub velocity_clamped: bool,
    pub angular_velocity_reset: bool,
}

impl RepairReport {
    pub fn any(&self) -> bool {
        self.position_reset
            || self.velocity_reset
            || self.velocity_clamped
            || self.angular_velocity_reset
    }
}

/// Intervention counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SafetyStats {
    pub scale_clamps: u64,
    pub force_clamps: u64,
    pub velocity_clamps: u64,
    pub invalid_values: u64,
    pub precision_warnings: u64,
    pub emergencies: u64,
    pub desyncs: u64,
    pub resyncs_requested: u64,
    pub repairs: u64,
    pub resets: u64,
}

struct SafetyState {
    log: EventLog,
    stats: SafetyStats,
    consecutive_desyncs: HashMap<String, u32>,
    recenter_request: Option<RecenterRequest>,
}

pub struct SafetyMonitor {
    config: SafetyConfig,
    state: Mutex<SafetyState>,
    events: Observers<SafetyEvent>,
    started: Instant,
}

impl SafetyMonitor {
    pub fn new(config: SafetyConfig) -> Self {
        info!(
            max_g_force = config.max_g_force,
            desync_tolerance = config.desync_tolerance,
            "Initializing safety monitor"
        );
        Self {
            state: Mutex::new(SafetyState {
                log: EventLog::new(config.max_event_log_size),
                stats: SafetyStats::default(),
                consecutive_desyncs: HashMap::new(),
                recenter_request: None,
            }),
            config,
            events: Observers::new(),
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    pub fn scale_bounds(&self) -> ScaleBounds {
        self.config.scale_bounds
    }

    /// Largest acceleration allowed, in m/s²
    pub fn max_acceleration(&self) -> f64 {
        self.config.max_g_force * self.config.standard_gravity
    }

    /// Observers notified after each logged event
    pub fn events(&self) -> &Observers<SafetyEvent> {
        &self.events
    }

    pub fn on_safety_event(
        &self,
        callback: impl Fn(&SafetyEvent) + Send + Sync + 'static,
    ) -> ObserverId {
        self.events.subscribe(callback)
    }

    /// Record an event, mirror it to tracing and notify observers
    pub fn log_event(&self, severity: Severity, message: impl Into<String>, actor: Option<&str>) {
        let event = SafetyEvent {
            severity,
            message: message.into(),
            actor: actor.map(str::to_string),
            timestamp: self.started.elapsed().as_secs_f64(),
        };

        let actor_name = event.actor.as_deref().unwrap_or("-");
        match severity {
            Severity::Info => info!(actor = actor_name, "{}", event.message),
            Severity::Warning => warn!(actor = actor_name, "{}", event.message),
            Severity::Error | Severity::Critical | Severity::Fatal => {
                error!(actor = actor_name, %severity, "{}", event.message)
            }
        }

        sync::lock(&self.state).log.push(event.clone());
        self.events.notify(&event);
    }

    /// Up to `count` most recent events, oldest first
    pub fn recent_events(&self, count: usize) -> Vec<SafetyEvent> {
        sync::lock(&self.state).log.recent(count)
    }

    pub fn event_count(&self) -> usize {
        sync::lock(&self.state).log.len()
    }

    pub fn clear_log(&self) {
        sync::lock(&self.state).log.clear();
    }

    pub fn stats(&self) -> SafetyStats {
        sync::lock(&self.state).stats
    }

    fn count(&self, update: impl FnOnce(&mut SafetyStats)) {
        update(&mut sync::lock(&self.state).stats);
    }

    /// Clamp a scale factor into the configured bounds
    pub fn clamp_scale(&self, value: f64, actor: &str) -> f64 {
        let bounds = self.config.scale_bounds;
        if value.is_nan() {
            self.count(|stats| stats.invalid_values += 1);
            self.log_event(Severity::Warning, "NaN scale factor replaced with minimum", Some(actor));
            return bounds.min;
        }
        if bounds.contains(value) {
            return value;
        }

        let clamped = bounds.clamp(value);
        self.count(|stats| stats.scale_clamps += 1);
        self.log_event(
            Severity::Warning,
            format!("Scale factor {value} outside [{}, {}], clamped to {clamped}", bounds.min, bounds.max),
            Some(actor),
        );
        clamped
    }

    /// Limit a force so the resulting acceleration stays under the G limit
    pub fn clamp_force(&self, force: DVec3, mass: f64, actor: &str) -> DVec3 {
        if !Self::is_valid_vector(force) {
            self.count(|stats| stats.invalid_values += 1);
            self.log_event(Severity::Warning, "Non-finite force discarded", Some(actor));
            return DVec3::ZERO;
        }
        if !(mass.is_finite() && mass > 0.0) {
            self.count(|stats| stats.invalid_values += 1);
            self.log_event(
                Severity::Warning,
                format!("Invalid mass {mass}, force discarded"),
                Some(actor),
            );
            return DVec3::ZERO;
        }

        let max_force = self.max_acceleration() * mass;
        let magnitude = force.length();
        if magnitude <= max_force {
            return force;
        }

        self.count(|stats| stats.force_clamps += 1);
        self.log_event(
            Severity::Warning,
            format!(
                "Force of {:.2} G exceeds limit of {} G, clamped",
                magnitude / mass / self.config.standard_gravity,
                self.config.max_g_force
            ),
            Some(actor),
        );
        force * (max_force / magnitude)
    }

    /// Limit a velocity to `max_velocity`; non-finite velocities become zero
    pub fn clamp_velocity(&self, velocity: DVec3, actor: &str) -> DVec3 {
        if !Self::is_valid_vector(velocity) {
            self.count(|stats| stats.invalid_values += 1);
            self.log_event(Severity::Warning, "Non-finite velocity zeroed", Some(actor));
            return DVec3::ZERO;
        }

        let speed = velocity.length();
        if speed <= self.config.max_velocity {
            return velocity;
        }

        self.count(|stats| stats.velocity_clamps += 1);
        self.log_event(
            Severity::Warning,
            format!("Speed {speed:.1} m/s exceeds {} m/s, clamped", self.config.max_velocity),
            Some(actor),
        );
        velocity * (self.config.max_velocity / speed)
    }

    pub fn is_valid_scalar(value: f64) -> bool {
        value.is_finite()
    }

    pub fn is_valid_vector(value: DVec3) -> bool {
        value.is_finite()
    }

    /// Replace non-finite components with zero
    pub fn sanitize_vector(value: DVec3) -> DVec3 {
        let fix = |component: f64| if component.is_finite() { component } else { 0.0 };
        DVec3::new(fix(value.x), fix(value.y), fix(value.z))
    }

    /// Classify how far from the origin `position` is
    ///
    /// Beyond the emergency distance a Critical event is logged and a
    /// re-center request is left for the origin manager.
    pub fn check_precision(&self, position: DVec3, actor: &str) -> PrecisionStatus {
        if !Self::is_valid_vector(position) {
            self.count(|stats| stats.invalid_values += 1);
            self.log_event(Severity::Error, "Non-finite position during precision check", Some(actor));
            return PrecisionStatus::Emergency;
        }

        let distance = position.length();
        if distance > self.config.emergency_distance {
            {
                let mut state = sync::lock(&self.state);
                state.stats.emergencies += 1;
                state.recenter_request = Some(RecenterRequest {
                    actor: actor.to_string(),
                    position,
                });
            }
            self.log_event(
                Severity::Critical,
                format!("Position {distance:.0} m from origin, emergency re-center requested"),
                Some(actor),
            );
            PrecisionStatus::Emergency
        } else if distance > self.config.precision_warning_distance {
            self.count(|stats| stats.precision_warnings += 1);
            self.log_event(
                Severity::Warning,
                format!("Position {distance:.0} m from origin, precision degrading"),
                Some(actor),
            );
            PrecisionStatus::Warning
        } else {
            PrecisionStatus::Safe
        }
    }

    pub fn has_recenter_request(&self) -> bool {
        sync::lock(&self.state).recenter_request.is_some()
    }

    /// Consume the pending emergency re-center request
    pub fn take_recenter_request(&self) -> Option<RecenterRequest> {
        sync::lock(&self.state).recenter_request.take()
    }

    /// Put an actor back at the origin with no motion
    pub fn reset_to_safe_state(&self, actor: &mut dyn PhysicsBody) {
        actor.set_position(DVec3::ZERO);
        actor.set_velocity(DVec3::ZERO);
        actor.set_angular_velocity(DVec3::ZERO);

        let name = actor.name().to_string();
        {
            let mut state = sync::lock(&self.state);
            state.stats.resets += 1;
            state.consecutive_desyncs.remove(&name);
        }
        self.log_event(Severity::Error, "Actor reset to safe state", Some(&name));
    }

    /// Fix non-finite or out-of-range actor state in place
    pub fn validate_and_repair(&self, actor: &mut dyn PhysicsBody) -> RepairReport {
        let mut report = RepairReport::default();
        let name = actor.name().to_string();

        if !Self::is_valid_vector(actor.position()) {
            actor.set_position(DVec3::ZERO);
            report.position_reset = true;
        }

        let velocity = actor.velocity();
        if !Self::is_valid_vector(velocity) {
            actor.set_velocity(DVec3::ZERO);
            report.velocity_reset = true;
        } else if velocity.length() > self.config.max_velocity {
            actor.set_velocity(velocity * (self.config.max_velocity / velocity.length()));
            report.velocity_clamped = true;
        }

        if !Self::is_valid_vector(actor.angular_velocity()) {
            actor.set_angular_velocity(DVec3::ZERO);
            report.angular_velocity_reset = true;
        }

        if report.any() {
            self.count(|stats| stats.repairs += 1);
            self.log_event(
                Severity::Warning,
                format!("Repaired actor state: {report:?}"),
                Some(&name),
            );
        }
        report
    }

    /// Compare a predicted position against the authoritative one
    pub fn evaluate_desync(&self, client: DVec3, server: DVec3, actor: &str) -> DesyncAssessment {
        let tolerance = self.config.desync_tolerance;
        let error = if Self::is_valid_vector(client) && Self::is_valid_vector(server) {
            client.distance(server)
        } else {
            f64::INFINITY
        };

        if error <= tolerance {
            sync::lock(&self.state).consecutive_desyncs.remove(actor);
            return DesyncAssessment {
                within_tolerance: true,
                error,
                correction_strength: 0.0,
                resync_required: false,
            };
        }

        let span = (self.config.max_correction_distance - tolerance).max(f64::EPSILON);
        let strength = if error.is_finite() {
            ((error - tolerance) / span).clamp(self.config.min_correction_strength, 1.0)
        } else {
            1.0
        };

        let resync_required = {
            let mut state = sync::lock(&self.state);
            state.stats.desyncs += 1;
            let streak = state.consecutive_desyncs.entry(actor.to_string()).or_insert(0);
            *streak += 1;
            if *streak >= self.config.max_consecutive_desyncs {
                *streak = 0;
                state.stats.resyncs_requested += 1;
                true
            } else {
                false
            }
        };

        if resync_required {
            self.log_event(
                Severity::Error,
                format!("Persistent desync of {error:.2} m, full resync required"),
                Some(actor),
            );
        } else {
            debug!(actor, error, strength, "Desync outside tolerance");
            self.log_event(
                Severity::Warning,
                format!("Desync of {error:.2} m, correcting with strength {strength:.3}"),
                Some(actor),
            );
        }

        DesyncAssessment {
            within_tolerance: false,
            error,
            correction_strength: strength,
            resync_required,
        }
    }

    /// Consecutive out-of-tolerance evaluations recorded for an actor
    pub fn consecutive_desyncs(&self, actor: &str) -> u32 {
        sync::lock(&self.state)
            .consecutive_desyncs
            .get(actor)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for SafetyMonitor {
    fn default() -> Self {
        Self::new(SafetyConfig::default())
    }
}

impl std::fmt::Debug for SafetyMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyMonitor")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
