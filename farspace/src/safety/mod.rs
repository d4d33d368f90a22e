//! Safety monitor: clamping, validation, precision checks and desync scoring

pub mod event_log;
pub mod monitor;


pub use event_log::{EventLog, SafetyEvent, Severity};
pub use monitor::{
    DesyncAssessment, PrecisionStatus, RecenterRequest, RepairReport, SafetyMonitor, SafetyStats,
};
