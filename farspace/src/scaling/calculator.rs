//! Distance-to-scale calculator with a quantized cache
//!
//! Scale factors are computed on the representative distance of the cache
//! bucket the input falls into, so a cached answer is always bit-identical
//! to a freshly computed one for the same distance, reference and strategy.

use super::cache::{CacheStats, ScaleCache};
use super::strategy;
use crate::config::ScalingConfig;
use crate::core::types::{ScaleBounds, ScalingMethod};
use crate::events::Observers;
use crate::utils::sync;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Caller-supplied curve: `(distance, reference_distance) -> scale`
pub type CustomScaleFn = Arc<dyn Fn(f64, f64) -> f64 + Send + Sync>;

/// Emitted whenever a setting that invalidates the cache changes
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSettingsChanged {
    pub method: ScalingMethod,
    pub reference_distance: f64,
    pub bounds: ScaleBounds,
}

struct ScalingState {
    config: ScalingConfig,
    custom: Option<CustomScaleFn>,
    cache: ScaleCache,
}

impl ScalingState {
    fn settings(&self) -> ScaleSettingsChanged {
        ScaleSettingsChanged {
            method: self.config.method,
            reference_distance: self.config.reference_distance,
            bounds: self.config.bounds,
        }
    }

    fn raw_scale(&self, distance: f64, reference: f64) -> f64 {
        match self.config.method {
            ScalingMethod::Linear => strategy::linear(distance, reference),
            ScalingMethod::InverseSquare => {
                strategy::inverse_square(distance, reference, self.config.inverse_square_exponent)
            }
            ScalingMethod::Logarithmic => {
                strategy::logarithmic(distance, reference, self.config.logarithmic_base)
            }
            ScalingMethod::Custom => match &self.custom {
                Some(custom) => custom(distance, reference),
                None => strategy::inverse_square(
                    distance,
                    reference,
                    self.config.inverse_square_exponent,
                ),
            },
        }
    }
}

/// Shared scale-factor service
pub struct ScalingCalculator {
    state: Mutex<ScalingState>,
    events: Observers<ScaleSettingsChanged>,
}

impl ScalingCalculator {
    pub fn new(config: ScalingConfig) -> Self {
        if config.method == ScalingMethod::Custom {
            warn!("Custom scaling selected before a custom strategy was installed, using inverse square until one is");
        }
        info!(
            method = ?config.method,
            reference_distance = config.reference_distance,
            "Initializing scaling calculator"
        );
        Self {
            state: Mutex::new(ScalingState {
                cache: ScaleCache::new(config.max_cache_entries),
                custom: None,
                config,
            }),
            events: Observers::new(),
        }
    }

    /// Notifications fired when method, reference distance or bounds change
    pub fn events(&self) -> &Observers<ScaleSettingsChanged> {
        &self.events
    }

    pub fn config(&self) -> ScalingConfig {
        sync::lock(&self.state).config.clone()
    }

    pub fn bounds(&self) -> ScaleBounds {
        sync::lock(&self.state).config.bounds
    }

    /// Scale factor for `distance` relative to `reference_distance`
    ///
    /// Passing a reference distance different from the active one switches
    /// the active reference and clears the cache.
    pub fn scale_factor(&self, distance: f64, reference_distance: f64) -> f64 {
        let mut changed = None;
        let scale = {
            let mut state = sync::lock(&self.state);

            let reference = if reference_distance.is_finite() && reference_distance > 0.0 {
                reference_distance
            } else {
                warn!(reference_distance, "Invalid reference distance, using configured default");
                state.config.reference_distance
            };
            if reference != state.config.reference_distance {
                state.config.reference_distance = reference;
                state.cache.clear();
                changed = Some(state.settings());
            }

            Self::cached_scale(&mut state, distance)
        };

        if let Some(settings) = changed {
            self.events.notify(&settings);
        }
        scale
    }

    /// Scale factor relative to the active reference distance
    pub fn scale_for_distance(&self, distance: f64) -> f64 {
        let mut state = sync::lock(&self.state);
        Self::cached_scale(&mut state, distance)
    }

    fn cached_scale(state: &mut ScalingState, distance: f64) -> f64 {
        let bounds = state.config.bounds;
        if distance.is_nan() {
            warn!("NaN distance passed to scale calculation");
            return bounds.max;
        }
        if distance < 1.0 {
            return bounds.max;
        }

        let bucket = state.config.cache_bucket_size;
        let key = ScaleCache::key(distance, bucket);
        if let Some(scale) = state.cache.get(key) {
            return scale;
        }

        let representative = ScaleCache::bucket_distance(key, bucket);
        let raw = state.raw_scale(representative, state.config.reference_distance);
        let scale = bounds.clamp(raw);
        state.cache.insert(key, scale);
        scale
    }

    /// Linear curve, clamped, uncached
    pub fn linear(&self, distance: f64, reference_distance: f64) -> f64 {
        self.direct(distance, |d| strategy::linear(d, reference_distance))
    }

    /// Inverse power curve (exponent 2 for inverse-square), clamped, uncached
    pub fn inverse_square(&self, distance: f64, reference_distance: f64, exponent: f64) -> f64 {
        self.direct(distance, |d| strategy::inverse_square(d, reference_distance, exponent))
    }

    /// Logarithmic curve (base 10 by convention), clamped, uncached
    pub fn logarithmic(&self, distance: f64, reference_distance: f64, base: f64) -> f64 {
        self.direct(distance, |d| strategy::logarithmic(d, reference_distance, base))
    }

    fn direct(&self, distance: f64, curve: impl Fn(f64) -> f64) -> f64 {
        let bounds = self.bounds();
        if distance.is_nan() || distance < 1.0 {
            return bounds.max;
        }
        bounds.clamp(curve(distance))
    }

    pub fn set_method(&self, method: ScalingMethod) {
        self.update(|state| {
            if method == ScalingMethod::Custom && state.custom.is_none() {
                warn!("Custom scaling selected without a custom strategy, falling back to inverse square");
            }
            state.config.method = method;
        });
    }

    /// Install a custom curve and make it the active method
    pub fn set_custom_strategy(&self, custom: impl Fn(f64, f64) -> f64 + Send + Sync + 'static) {
        self.update(|state| {
            state.custom = Some(Arc::new(custom));
            state.config.method = ScalingMethod::Custom;
        });
    }

    pub fn set_reference_distance(&self, reference_distance: f64) {
        if !(reference_distance.is_finite() && reference_distance > 0.0) {
            warn!(reference_distance, "Ignoring invalid reference distance");
            return;
        }
        self.update(|state| state.config.reference_distance = reference_distance);
    }

    pub fn set_bounds(&self, bounds: ScaleBounds) {
        if !bounds.is_valid() {
            warn!(?bounds, "Ignoring invalid scale bounds");
            return;
        }
        self.update(|state| state.config.bounds = bounds);
    }

    fn update(&self, change: impl FnOnce(&mut ScalingState)) {
        let settings = {
            let mut state = sync::lock(&self.state);
            change(&mut state);
            state.cache.clear();
            state.settings()
        };
        debug!(?settings, "Scale settings changed, cache cleared");
        self.events.notify(&settings);
    }

    pub fn clear_cache(&self) {
        sync::lock(&self.state).cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        sync::lock(&self.state).cache.stats()
    }

    /// Move `current` toward `target` by `clamp(dt * speed, 0, 1)` of the gap
    ///
    /// Linear rather than exponential: the target is reached exactly once
    /// `dt * speed >= 1`.
    pub fn smooth_transition(current: f64, target: f64, delta_time: f64, speed: f64) -> f64 {
        let alpha = (delta_time * speed).clamp(0.0, 1.0);
        if alpha >= 1.0 {
            return target;
        }
        current + (target - current) * alpha
    }

    /// Whether the relative distance change is large enough to recompute
    pub fn should_update(old_distance: f64, new_distance: f64, threshold_fraction: f64) -> bool {
        if old_distance <= 0.0 || !old_distance.is_finite() {
            return true;
        }
        ((new_distance - old_distance).abs() / old_distance) >= threshold_fraction
    }
}

impl Default for ScalingCalculator {
    fn default() -> Self {
        Self::new(ScalingConfig::default())
    }
}

impl fmt::Debug for ScalingCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = sync::lock(&self.state);
        f.debug_struct("ScalingCalculator")
            .field("config", &state.config)
            .field("custom", &state.custom.is_some())
            .field("cache", &state.cache.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn calculator(method: ScalingMethod) -> ScalingCalculator {
        ScalingCalculator::new(ScalingConfig {
            method,
            ..Default::default()
        })
    }

    #[test]
    fn test_inverse_square_monotonic_and_bounded() {
        let calc = calculator(ScalingMethod::InverseSquare);
        let bounds = calc.bounds();
        let reference = 1.0e6;

        let mut previous = f64::INFINITY;
        let mut distance = 0.25;
        while distance < 1.0e13 {
            let scale = calc.scale_factor(distance, reference);
            assert!(bounds.contains(scale), "scale {scale} out of bounds at {distance}");
            assert!(scale <= previous, "scale increased at {distance}");
            previous = scale;
            distance *= 1.37;
        }
    }

    #[test]
    fn test_below_one_unit_returns_max_for_every_method() {
        for method in [
            ScalingMethod::Linear,
            ScalingMethod::InverseSquare,
            ScalingMethod::Logarithmic,
            ScalingMethod::Custom,
        ] {
            let calc = calculator(method);
            assert_eq!(calc.scale_factor(0.5, 1.0e6), 1e4);
            assert_eq!(calc.scale_factor(0.0, 1.0e6), 1e4);
            assert_eq!(calc.scale_factor(-20.0, 1.0e6), 1e4);
        }
    }

    #[test]
    fn test_cache_hit_matches_miss() {
        let calc = calculator(ScalingMethod::Logarithmic);
        let first = calc.scale_factor(123_456.789, 1.0e6);
        let stats = calc.cache_stats();
        assert_eq!(stats.misses, 1);

        let second = calc.scale_factor(123_456.789, 1.0e6);
        assert_eq!(first.to_bits(), second.to_bits());
        assert_eq!(calc.cache_stats().hits, 1);

        calc.clear_cache();
        let third = calc.scale_factor(123_456.789, 1.0e6);
        assert_eq!(first.to_bits(), third.to_bits());
    }

    #[test]
    fn test_changing_settings_clears_cache() {
        let calc = calculator(ScalingMethod::Linear);
        calc.scale_factor(5_000.0, 1.0e6);
        calc.scale_factor(50_000.0, 1.0e6);
        assert_eq!(calc.cache_stats().entries, 2);

        calc.set_method(ScalingMethod::InverseSquare);
        assert_eq!(calc.cache_stats().entries, 0);

        calc.scale_factor(5_000.0, 1.0e6);
        calc.scale_factor(5_000.0, 2.0e6);
        assert_eq!(calc.cache_stats().entries, 1);
        assert_eq!(calc.config().reference_distance, 2.0e6);

        calc.set_bounds(ScaleBounds::new(0.5, 2.0));
        assert_eq!(calc.cache_stats().entries, 0);
        assert_eq!(calc.scale_factor(10.0, 2.0e6), 2.0);
    }

    #[test]
    fn test_settings_change_notifies_observers() {
        let calc = calculator(ScalingMethod::Linear);
        let count = Arc::new(AtomicUsize::new(0));
        let sink = count.clone();
        calc.events().subscribe(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        calc.set_reference_distance(10.0);
        calc.scale_factor(100.0, 20.0);
        calc.scale_factor(100.0, 20.0);
        calc.set_bounds(ScaleBounds::new(3.0, 1.0));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_custom_strategy() {
        let calc = calculator(ScalingMethod::Linear);
        calc.set_custom_strategy(|_, _| 7.0);
        assert_eq!(calc.config().method, ScalingMethod::Custom);
        assert_eq!(calc.scale_factor(1_000.0, 1.0e6), 7.0);

        calc.set_custom_strategy(|_, _| f64::NAN);
        assert_eq!(calc.scale_factor(1_000.0, 1.0e6), 1e-4);
    }

    #[test]
    fn test_invalid_reference_uses_default() {
        let calc = calculator(ScalingMethod::Linear);
        let with_default = calc.scale_factor(2.0e6, 1.0e6);
        assert_eq!(calc.scale_factor(2.0e6, -1.0), with_default);
        assert_eq!(calc.scale_factor(2.0e6, f64::NAN), with_default);
    }

    #[test]
    fn test_named_strategies_clamp() {
        let calc = ScalingCalculator::default();
        assert_eq!(calc.linear(1.0e6, 1.0e6), 1.0);
        assert_eq!(calc.inverse_square(10.0, 1.0e6, 2.0), 1e4);
        assert_eq!(calc.logarithmic(1.0e7, 1.0e6, 10.0), 0.5);
        assert_eq!(calc.inverse_square(1.0e12, 1.0e6, 2.0), 1e-4);
    }

    #[test]
    fn test_smooth_transition_is_linear() {
        assert_eq!(ScalingCalculator::smooth_transition(0.0, 10.0, 0.1, 2.0), 2.0);
        assert_eq!(ScalingCalculator::smooth_transition(0.0, 10.0, 0.5, 2.0), 10.0);
        assert_eq!(ScalingCalculator::smooth_transition(0.0, 10.0, 5.0, 2.0), 10.0);
        assert_eq!(ScalingCalculator::smooth_transition(4.0, 10.0, -1.0, 2.0), 4.0);
    }

    #[test]
    fn test_should_update_threshold() {
        assert!(!ScalingCalculator::should_update(1_000.0, 1_005.0, 0.01));
        assert!(ScalingCalculator::should_update(1_000.0, 1_010.0, 0.01));
        assert!(ScalingCalculator::should_update(1_000.0, 990.0, 0.01));
        assert!(ScalingCalculator::should_update(0.0, 5.0, 0.01));
    }
}
