//! Actor physics used by the gravity, safety and network layers

pub mod accumulator;
pub mod components;

pub use accumulator::TickAccumulator;
pub use components::{PhysicsBody, Rigidbody};
