//! Celestial bodies and the registry that indexes them
//!
//! Hosts own bodies through [`BodyHandle`]s; the [`BodyRegistry`] keeps a
//! name index of weak references for spatial queries and bulk updates.

pub mod body;
pub mod registry;

pub use body::{BodyHandle, BodySample, CelestialBody};
pub use registry::{BodyRegistry, RegisterOutcome, RegistryEvent};
