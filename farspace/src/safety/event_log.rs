//! Bounded log of safety events

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// How serious a safety event is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

/// One recorded safety event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyEvent {
    pub severity: Severity,
    pub message: String,
    /// Name of the actor involved, if any
    pub actor: Option<String>,
    /// Seconds since the monitor was created
    pub timestamp: f64,
}

/// Circular buffer of the most recent events; the oldest is dropped first
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<SafetyEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, event: SafetyEvent) {
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Up to `count` most recent events, oldest first
    pub fn recent(&self, count: usize) -> Vec<SafetyEvent> {
        let skip = self.events.len().saturating_sub(count);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
