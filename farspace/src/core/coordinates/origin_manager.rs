//! Floating origin management
//!
//! Keeps the player near (0,0,0) so that single-precision consumers
//! (rendering, the host physics engine) never see large coordinates. When
//! the player strays past the threshold, or the safety monitor asks for an
//! emergency re-center, every registered body is translated by the same
//! delta and the shift is broadcast to network clients.

use super::virtual_position::VirtualPosition;
use crate::celestial::BodyRegistry;
use crate::config::OriginConfig;
use crate::safety::SafetyMonitor;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Why a re-center happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecenterReason {
    /// Player passed the configured distance threshold
    Threshold,
    /// Safety monitor detected a precision emergency
    Emergency,
}

/// A completed origin shift, as sent to clients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecenterEvent {
    /// Translation applied to every local position
    pub delta: DVec3,
    /// Offset of the current origin from the original one, after the shift
    pub total_offset: DVec3,
    /// Number of shifts performed so far, including this one
    pub epoch: u32,
    pub reason: RecenterReason,
}

/// Something that forwards re-center events, typically the network server
pub trait RecenterBroadcaster {
    fn broadcast_recenter(&mut self, event: &RecenterEvent);
}

/// Record of an origin shift operation
#[derive(Debug, Clone)]
pub struct OriginShift {
    pub timestamp: Instant,
    pub event: RecenterEvent,
    /// Player position (pre-shift, local) that triggered the shift
    pub trigger_position: DVec3,
    /// Bodies translated by the shift
    pub bodies_moved: usize,
}

/// Statistics about the coordinate system state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginStats {
    /// Player position in absolute world coordinates
    pub player_world_position: DVec3,
    /// Player position relative to the current origin
    pub player_local_position: DVec3,
    pub total_offset: DVec3,
    pub epoch: u32,
    pub shifts_recorded: usize,
    pub enabled: bool,
    pub recenter_threshold: f64,
}

/// Owner of the logical world origin
#[derive(Debug)]
pub struct OriginManager {
    config: OriginConfig,
    /// Offset from the original world origin: `world = local + total_offset`
    total_offset: DVec3,
    player_local: DVec3,
    epoch: u32,
    history: VecDeque<OriginShift>,
    safety: Option<Arc<SafetyMonitor>>,
}

impl OriginManager {
    pub fn new(config: OriginConfig, safety: Option<Arc<SafetyMonitor>>) -> Self {
        info!(
            enabled = config.enabled,
            threshold = config.recenter_threshold,
            "Initializing origin manager"
        );
        Self {
            config,
            total_offset: DVec3::ZERO,
            player_local: DVec3::ZERO,
            epoch: 0,
            history: VecDeque::new(),
            safety,
        }
    }

    pub fn config(&self) -> &OriginConfig {
        &self.config
    }

    /// Update the player position and re-center if needed
    ///
    /// Returns the event when a shift happened. The host must translate its
    /// own actors by `event.delta`; registered bodies are already moved.
    pub fn tick(
        &mut self,
        player_position: DVec3,
        registry: &BodyRegistry,
        broadcaster: Option<&mut dyn RecenterBroadcaster>,
    ) -> Option<RecenterEvent> {
        if !player_position.is_finite() {
            warn!(?player_position, "Non-finite player position, origin left unchanged");
            return None;
        }
        self.player_local = player_position;

        let emergency = match &self.safety {
            Some(safety) => {
                safety.check_precision(player_position, "player");
                safety.take_recenter_request().is_some()
            }
            None => false,
        };

        if !self.config.enabled {
            if emergency {
                warn!("Emergency re-center requested while origin shifting is disabled");
            }
            return None;
        }

        let reason = if emergency {
            RecenterReason::Emergency
        } else if self.should_recenter() {
            RecenterReason::Threshold
        } else {
            return None;
        };

        let event = self.perform_shift(reason, registry);
        if let Some(broadcaster) = broadcaster {
            broadcaster.broadcast_recenter(&event);
        }
        Some(event)
    }

    /// Whether the player is beyond the re-center threshold
    pub fn should_recenter(&self) -> bool {
        self.config.enabled && self.player_local.length() > self.config.recenter_threshold
    }

    fn perform_shift(&mut self, reason: RecenterReason, registry: &BodyRegistry) -> RecenterEvent {
        let trigger_position = self.player_local;
        let delta = -trigger_position;

        let bodies_moved = registry.translate_all(delta);

        self.total_offset += trigger_position;
        self.player_local = DVec3::ZERO;
        self.epoch += 1;

        let event = RecenterEvent {
            delta,
            total_offset: self.total_offset,
            epoch: self.epoch,
            reason,
        };

        self.history.push_back(OriginShift {
            timestamp: Instant::now(),
            event,
            trigger_position,
            bodies_moved,
        });
        while self.history.len() > self.config.max_history {
            self.history.pop_front();
        }

        info!(
            ?reason,
            epoch = self.epoch,
            bodies_moved,
            "Origin shift performed: offset={:?}, total_offset={:?}",
            trigger_position,
            self.total_offset
        );
        event
    }

    /// Convert an absolute world position to the current local frame
    pub fn world_to_local(&self, world_pos: DVec3) -> DVec3 {
        world_pos - self.total_offset
    }

    /// Convert a local position to absolute world coordinates
    pub fn local_to_world(&self, local_pos: DVec3) -> DVec3 {
        local_pos + self.total_offset
    }

    pub fn total_offset(&self) -> DVec3 {
        self.total_offset
    }

    /// Number of re-centers performed, used to order snapshots against shifts
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn player_local_position(&self) -> DVec3 {
        self.player_local
    }

    /// Player position in sector form
    pub fn player_virtual_position(&self) -> VirtualPosition {
        VirtualPosition::from_world(self.local_to_world(self.player_local), self.config.sector_size)
    }

    pub fn history(&self) -> impl Iterator<Item = &OriginShift> {
        self.history.iter()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Enable or disable origin shifting
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled && self.config.enabled {
            warn!(
                "Disabling origin shifting with total offset: {:?}",
                self.total_offset
            );
        }
        self.config.enabled = enabled;
    }

    pub fn set_recenter_threshold(&mut self, threshold: f64) {
        if !(threshold.is_finite() && threshold > 0.0) {
            warn!(threshold, "Ignoring invalid re-center threshold");
            return;
        }
        debug!("Setting re-center threshold to: {}", threshold);
        self.config.recenter_threshold = threshold;
    }

    pub fn stats(&self) -> OriginStats {
        OriginStats {
            player_world_position: self.local_to_world(self.player_local),
            player_local_position: self.player_local,
            total_offset: self.total_offset,
            epoch: self.epoch,
            shifts_recorded: self.history.len(),
            enabled: self.config.enabled,
            recenter_threshold: self.config.recenter_threshold,
        }
    }
}

impl Default for OriginManager {
    fn default() -> Self {
        Self::new(OriginConfig::default(), None)
    }
}
