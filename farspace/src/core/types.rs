//! Shared value types used across the simulation layers

use serde::{Deserialize, Serialize};

/// Inclusive bounds for a scale factor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScaleBounds {
    pub min: f64,
    pub max: f64,
}

impl ScaleBounds {
    pub const DEFAULT_MIN: f64 = 1e-4;
    pub const DEFAULT_MAX: f64 = 1e4;

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp a value into the bounds. NaN maps to the lower bound.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Bounds are usable when both ends are finite, positive and ordered
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min > 0.0 && self.min <= self.max
    }
}

impl Default for ScaleBounds {
    fn default() -> Self {
        Self {
            min: Self::DEFAULT_MIN,
            max: Self::DEFAULT_MAX,
        }
    }
}

/// Level of detail index, 0 being the most detailed
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LodLevel(pub u8);

/// Distance thresholds that select a body's level of detail
///
/// A body closer than `distances[0]` is LOD 0, between `distances[0]` and
/// `distances[1]` LOD 1, and so on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Ascending distance thresholds in meters
    pub distances: Vec<f64>,
}

impl LodConfig {
    pub fn level_for_distance(&self, distance: f64) -> LodLevel {
        let passed = self
            .distances
            .iter()
            .take_while(|threshold| distance >= **threshold)
            .count();
        LodLevel(passed.min(u8::MAX as usize) as u8)
    }

    pub fn is_sorted(&self) -> bool {
        self.distances.windows(2).all(|pair| pair[0] <= pair[1])
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            // 1,000 km / 10,000 km / 100,000 km / 1,000,000 km
            distances: vec![1e6, 1e7, 1e8, 1e9],
        }
    }
}

/// Gravity fidelity
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SimulationMode {
    /// Only the body with the strongest influence at the target
    SingleBody,
    /// The few strongest bodies
    #[default]
    MultiBody,
    /// Every body within the configured influence distance
    NBody,
    /// No gravity at all
    Disabled,
}

/// Distance-to-scale algorithm
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScalingMethod {
    Linear,
    #[default]
    InverseSquare,
    Logarithmic,
    /// Caller-installed function, see `ScalingCalculator::set_custom_strategy`
    Custom,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_bounds_clamp() {
        let bounds = ScaleBounds::default();
        assert_eq!(bounds.clamp(1e9), 1e4);
        assert_eq!(bounds.clamp(0.0), 1e-4);
        assert_eq!(bounds.clamp(2.5), 2.5);
        assert_eq!(bounds.clamp(f64::NAN), 1e-4);
        assert!(bounds.is_valid());
        assert!(!ScaleBounds::new(2.0, 1.0).is_valid());
    }

    #[test]
    fn test_lod_levels() {
        let lod = LodConfig::default();
        assert_eq!(lod.level_for_distance(10.0), LodLevel(0));
        assert_eq!(lod.level_for_distance(1e6), LodLevel(1));
        assert_eq!(lod.level_for_distance(5e7), LodLevel(2));
        assert_eq!(lod.level_for_distance(1e12), LodLevel(4));
        assert!(lod.is_sorted());
    }
}
