//! Gravity solver

pub mod simulator;


pub use simulator::{GravitySimulator, GravityStats};
