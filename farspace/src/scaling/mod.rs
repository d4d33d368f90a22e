pub mod cache;
pub mod calculator;
pub mod strategy;

pub use cache::{CacheStats, ScaleCache};
pub use calculator::{CustomScaleFn, ScaleSettingsChanged, ScalingCalculator};
