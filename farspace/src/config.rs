//! Configuration types for the simulation core
//!
//! Every service takes a plain configuration struct at construction. The
//! aggregate [`SimulationConfig`] can be loaded from JSON; missing fields
//! fall back to their defaults.

use crate::core::constants::{DEFAULT_SECTOR_SIZE, EARTH_MASS, EARTH_SOI_RADIUS, STANDARD_GRAVITY};
use crate::core::types::{LodConfig, ScaleBounds, ScalingMethod, SimulationMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Errors produced while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be a positive finite number, got {value}")))
    }
}

/// Distance-to-scale mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingConfig {
    pub method: ScalingMethod,
    pub bounds: ScaleBounds,
    /// Distance at which every strategy yields a scale of 1 (meters)
    pub reference_distance: f64,
    pub inverse_square_exponent: f64,
    pub logarithmic_base: f64,
    /// Width of one cache bucket (meters)
    pub cache_bucket_size: f64,
    pub max_cache_entries: usize,
    /// Speed used when smoothing body scales toward their target (1/s)
    pub transition_speed: f64,
    /// Relative distance change below which scales are not recomputed
    pub update_threshold: f64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            method: ScalingMethod::InverseSquare,
            bounds: ScaleBounds::default(),
            reference_distance: 1.0e6,
            inverse_square_exponent: 2.0,
            logarithmic_base: 10.0,
            cache_bucket_size: 10.0,
            max_cache_entries: 1024,
            transition_speed: 2.0,
            update_threshold: 0.01,
        }
    }
}

impl ScalingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.bounds.is_valid() {
            return Err(invalid("scaling.bounds", format!("{:?}", self.bounds)));
        }
        require_positive("scaling.reference_distance", self.reference_distance)?;
        require_positive("scaling.inverse_square_exponent", self.inverse_square_exponent)?;
        require_positive("scaling.cache_bucket_size", self.cache_bucket_size)?;
        require_positive("scaling.transition_speed", self.transition_speed)?;
        if !(self.logarithmic_base.is_finite() && self.logarithmic_base > 1.0) {
            return Err(invalid("scaling.logarithmic_base", "must be greater than 1"));
        }
        if self.max_cache_entries == 0 {
            return Err(invalid("scaling.max_cache_entries", "must be at least 1"));
        }
        Ok(())
    }
}

/// Gravity solver settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GravityConfig {
    pub mode: SimulationMode,
    /// Separation below which force stops growing (meters)
    pub min_distance: f64,
    /// Range considered in N-body mode (meters)
    pub max_influence_distance: f64,
    /// Number of bodies considered in multi-body mode
    pub multi_body_count: usize,
    /// Multiplier from newtons to the host physics engine's force unit
    pub force_unit_scale: f64,
    /// Mass whose sphere of influence is `soi_reference_radius`
    pub soi_reference_mass: f64,
    pub soi_reference_radius: f64,
    /// Acceleration limit used when no safety monitor is available (G)
    pub fallback_max_g_force: f64,
}

impl Default for GravityConfig {
    fn default() -> Self {
        Self {
            mode: SimulationMode::MultiBody,
            min_distance: 1_000.0,
            max_influence_distance: 1.0e11,
            multi_body_count: 3,
            force_unit_scale: 1.0,
            soi_reference_mass: EARTH_MASS,
            soi_reference_radius: EARTH_SOI_RADIUS,
            fallback_max_g_force: 20.0,
        }
    }
}

impl GravityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("gravity.min_distance", self.min_distance)?;
        require_positive("gravity.max_influence_distance", self.max_influence_distance)?;
        require_positive("gravity.force_unit_scale", self.force_unit_scale)?;
        require_positive("gravity.soi_reference_mass", self.soi_reference_mass)?;
        require_positive("gravity.soi_reference_radius", self.soi_reference_radius)?;
        require_positive("gravity.fallback_max_g_force", self.fallback_max_g_force)?;
        if self.multi_body_count == 0 {
            return Err(invalid("gravity.multi_body_count", "must be at least 1"));
        }
        Ok(())
    }
}

/// Limits enforced by the safety monitor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SafetyConfig {
    pub scale_bounds: ScaleBounds,
    pub max_g_force: f64,
    pub standard_gravity: f64,
    /// Speed limit for validated actors (m/s)
    pub max_velocity: f64,
    /// Distance from the origin that raises a precision warning (meters)
    pub precision_warning_distance: f64,
    /// Distance from the origin that forces an emergency re-center (meters)
    pub emergency_distance: f64,
    /// Client/server divergence tolerated without correction (meters)
    pub desync_tolerance: f64,
    /// Divergence at which correction becomes a full snap (meters)
    pub max_correction_distance: f64,
    /// Smallest blend strength applied once outside tolerance
    pub min_correction_strength: f64,
    /// Consecutive out-of-tolerance evaluations before a resync is requested
    pub max_consecutive_desyncs: u32,
    pub max_event_log_size: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            scale_bounds: ScaleBounds::default(),
            max_g_force: 20.0,
            standard_gravity: STANDARD_GRAVITY,
            max_velocity: 100_000.0,
            precision_warning_distance: 1.0e6,
            emergency_distance: 1.0e7,
            desync_tolerance: 10.0,
            max_correction_distance: 100.0,
            min_correction_strength: 0.05,
            max_consecutive_desyncs: 5,
            max_event_log_size: 1000,
        }
    }
}

impl SafetyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.scale_bounds.is_valid() {
            return Err(invalid("safety.scale_bounds", format!("{:?}", self.scale_bounds)));
        }
        require_positive("safety.max_g_force", self.max_g_force)?;
        require_positive("safety.standard_gravity", self.standard_gravity)?;
        require_positive("safety.max_velocity", self.max_velocity)?;
        require_positive("safety.precision_warning_distance", self.precision_warning_distance)?;
        require_positive("safety.desync_tolerance", self.desync_tolerance)?;
        if self.emergency_distance <= self.precision_warning_distance {
            return Err(invalid(
                "safety.emergency_distance",
                "must exceed precision_warning_distance",
            ));
        }
        if self.max_correction_distance <= self.desync_tolerance {
            return Err(invalid(
                "safety.max_correction_distance",
                "must exceed desync_tolerance",
            ));
        }
        if !(0.0..1.0).contains(&self.min_correction_strength) {
            return Err(invalid("safety.min_correction_strength", "must be in [0, 1)"));
        }
        if self.max_event_log_size == 0 {
            return Err(invalid("safety.max_event_log_size", "must be at least 1"));
        }
        Ok(())
    }
}

/// Floating origin settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OriginConfig {
    pub enabled: bool,
    /// Player distance from the origin that triggers a re-center (meters)
    pub recenter_threshold: f64,
    /// Virtual position sector width (meters)
    pub sector_size: f64,
    /// Number of re-center records kept for diagnostics
    pub max_history: usize,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recenter_threshold: 50_000.0,
            sector_size: DEFAULT_SECTOR_SIZE,
            max_history: 100,
        }
    }
}

impl OriginConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("origin.recenter_threshold", self.recenter_threshold)?;
        require_positive("origin.sector_size", self.sector_size)?;
        Ok(())
    }
}

/// Vehicle replication settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server snapshot broadcast rate
    pub snapshot_rate_hz: f64,
    /// Client input history depth
    pub input_buffer_size: usize,
    /// Every n-th snapshot carries a full position instead of a delta
    pub keyframe_interval: u32,
    /// Largest frame delta time an input may claim (seconds)
    pub max_input_dt: f32,
    /// Largest forward jump between consecutive input timestamps (seconds)
    pub max_timestamp_jump: f64,
    /// Highest plausible vehicle speed (m/s)
    pub max_speed: f64,
    /// Highest plausible thrust acceleration (m/s²)
    pub max_thrust: f32,
    /// Snapshots held while waiting for a re-center to arrive
    pub max_pending_snapshots: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            snapshot_rate_hz: 20.0,
            input_buffer_size: 60,
            keyframe_interval: 20,
            max_input_dt: 0.25,
            max_timestamp_jump: 1.0,
            max_speed: 100_000.0,
            max_thrust: 200.0,
            max_pending_snapshots: 8,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("network.snapshot_rate_hz", self.snapshot_rate_hz)?;
        require_positive("network.max_input_dt", self.max_input_dt as f64)?;
        require_positive("network.max_timestamp_jump", self.max_timestamp_jump)?;
        require_positive("network.max_speed", self.max_speed)?;
        require_positive("network.max_thrust", self.max_thrust as f64)?;
        if self.input_buffer_size == 0 {
            return Err(invalid("network.input_buffer_size", "must be at least 1"));
        }
        if self.keyframe_interval == 0 {
            return Err(invalid("network.keyframe_interval", "must be at least 1"));
        }
        Ok(())
    }

    pub fn snapshot_interval(&self) -> f64 {
        1.0 / self.snapshot_rate_hz
    }
}

/// Aggregate configuration for a simulation world
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub scaling: ScalingConfig,
    pub gravity: GravityConfig,
    pub safety: SafetyConfig,
    pub origin: OriginConfig,
    pub network: NetworkConfig,
    pub lod: LodConfig,
}

impl SimulationConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = ?path, "Loading simulation config");
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scaling.validate()?;
        self.gravity.validate()?;
        self.safety.validate()?;
        self.origin.validate()?;
        self.network.validate()?;
        if !self.lod.is_sorted() {
            return Err(invalid("lod.distances", "must be ascending"));
        }
        Ok(())
    }
}
