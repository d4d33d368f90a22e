//! Fixed timestep accumulator
//!
//! Turns variable frame times into a whole number of fixed steps. Used for
//! the server's snapshot cadence and by hosts driving the simulation tick.

use tracing::warn;

/// Most steps a single frame may produce before time is discarded
const MAX_STEPS_PER_FRAME: f64 = 8.0;

#[derive(Debug, Clone)]
pub struct TickAccumulator {
    /// Accumulated time since last step
    accumulator: f64,
    /// Fixed timestep in seconds
    pub fixed_timestep: f64,
}

impl TickAccumulator {
    pub fn new(fixed_timestep: f64) -> Self {
        Self {
            accumulator: 0.0,
            fixed_timestep,
        }
    }

    /// Accumulator firing `rate_hz` times per second
    pub fn with_rate(rate_hz: f64) -> Self {
        Self::new(1.0 / rate_hz)
    }

    /// Add delta time to the accumulator
    /// Returns the number of fixed steps to perform
    pub fn accumulate(&mut self, delta_time: f64) -> u32 {
        if !delta_time.is_finite() || delta_time <= 0.0 {
            return 0;
        }

        self.accumulator += delta_time;

        // Prevent spiral of death
        let limit = self.fixed_timestep * MAX_STEPS_PER_FRAME;
        if self.accumulator > limit {
            warn!(
                "Tick accumulator too large: {} seconds. Clamping to prevent spiral of death.",
                self.accumulator
            );
            self.accumulator = limit;
        }

        let steps = (self.accumulator / self.fixed_timestep) as u32;
        self.accumulator -= steps as f64 * self.fixed_timestep;

        steps
    }

    /// How far between fixed steps we are, in [0, 1]
    pub fn interpolation_alpha(&self) -> f64 {
        self.accumulator / self.fixed_timestep
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }

    pub fn accumulated_time(&self) -> f64 {
        self.accumulator
    }
}

impl Default for TickAccumulator {
    fn default() -> Self {
        // 20Hz, the default snapshot rate
        Self::with_rate(20.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_basic() {
        let mut acc = TickAccumulator::new(0.05);

        let steps = acc.accumulate(0.1);
        assert_eq!(steps, 2);
        assert!(acc.interpolation_alpha().abs() < 0.001);

        let steps = acc.accumulate(0.025);
        assert_eq!(steps, 0);
        assert!((acc.interpolation_alpha() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_accumulator_spiral_of_death() {
        let mut acc = TickAccumulator::new(1.0 / 60.0);
        let steps = acc.accumulate(1.0);
        assert!(steps <= 8);
    }

    #[test]
    fn test_invalid_delta_ignored() {
        let mut acc = TickAccumulator::default();
        assert_eq!(acc.accumulate(f64::NAN), 0);
        assert_eq!(acc.accumulate(-1.0), 0);
        assert_eq!(acc.accumulated_time(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut acc = TickAccumulator::new(1.0 / 60.0);
        acc.accumulate(1.0 / 120.0);
        acc.reset();
        assert_eq!(acc.accumulated_time(), 0.0);
    }
}
