//! Small shared helpers

pub mod sync;
