//! Units, shared value types and coordinate handling

pub mod constants;
pub mod coordinates;
pub mod types;
