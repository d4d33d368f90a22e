//! Client input commands and the prediction history

use super::movement::VehicleState;
use glam::{DVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One frame of pilot input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleInput {
    /// Monotonic per-vehicle counter, starting at 1
    pub sequence: u32,
    /// Client clock in seconds
    pub timestamp: f64,
    /// Frame time the input covers (seconds)
    pub delta_time: f32,
    /// Requested acceleration in the vehicle frame (m/s²)
    pub thrust: Vec3,
    /// Requested angular acceleration (rad/s²)
    pub torque: Vec3,
}

impl VehicleInput {
    pub fn new(sequence: u32, timestamp: f64, delta_time: f32, thrust: Vec3, torque: Vec3) -> Self {
        Self {
            sequence,
            timestamp,
            delta_time,
            thrust,
            torque,
        }
    }

    /// Input with no thrust or torque
    pub fn idle(sequence: u32, timestamp: f64, delta_time: f32) -> Self {
        Self::new(sequence, timestamp, delta_time, Vec3::ZERO, Vec3::ZERO)
    }

    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite()
            && self.delta_time.is_finite()
            && self.thrust.is_finite()
            && self.torque.is_finite()
    }

    /// CRC32 over every field, echoed back by the server for diagnostics
    pub fn hash(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.sequence.to_le_bytes());
        hasher.update(&self.timestamp.to_le_bytes());
        hasher.update(&self.delta_time.to_le_bytes());
        for component in self.thrust.to_array().iter().chain(self.torque.to_array().iter()) {
            hasher.update(&component.to_le_bytes());
        }
        hasher.finalize()
    }
}

/// An input together with the state the client predicted after applying it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputRecord {
    pub input: VehicleInput,
    pub predicted: VehicleState,
}

/// Bounded history of unacknowledged inputs, oldest first
#[derive(Debug, Clone)]
pub struct InputBuffer {
    records: VecDeque<InputRecord>,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, returning the oldest one if it had to be dropped
    pub fn push(&mut self, record: InputRecord) -> Option<InputRecord> {
        let dropped = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        dropped
    }

    pub fn find(&self, sequence: u32) -> Option<&InputRecord> {
        self.records.iter().find(|record| record.input.sequence == sequence)
    }

    /// Drop every record up to and including `sequence`
    pub fn acknowledge(&mut self, sequence: u32) -> usize {
        let before = self.records.len();
        self.records.retain(|record| record.input.sequence > sequence);
        before - self.records.len()
    }

    /// Inputs still waiting for the server, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &InputRecord> {
        self.records.iter()
    }

    pub fn pending_mut(&mut self) -> impl Iterator<Item = &mut InputRecord> {
        self.records.iter_mut()
    }

    /// Shift every predicted position, used after an origin re-center
    pub fn translate(&mut self, delta: DVec3) {
        for record in &mut self.records {
            record.predicted.position += delta;
        }
    }

    pub fn latest_sequence(&self) -> Option<u32> {
        self.records.back().map(|record| record.input.sequence)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sequence: u32) -> InputRecord {
        InputRecord {
            input: VehicleInput::idle(sequence, sequence as f64 / 60.0, 1.0 / 60.0),
            predicted: VehicleState::at(DVec3::new(sequence as f64, 0.0, 0.0)),
        }
    }

    #[test]
    fn test_ring_drops_oldest() {
        let mut buffer = InputBuffer::new(3);
        assert!(buffer.push(record(1)).is_none());
        buffer.push(record(2));
        buffer.push(record(3));
        let dropped = buffer.push(record(4)).unwrap();

        assert_eq!(dropped.input.sequence, 1);
        assert_eq!(buffer.len(), 3);
        assert!(buffer.find(1).is_none());
        assert_eq!(buffer.latest_sequence(), Some(4));
    }

    #[test]
    fn test_acknowledge_removes_processed() {
        let mut buffer = InputBuffer::new(60);
        for sequence in 1..=10 {
            buffer.push(record(sequence));
        }
        assert_eq!(buffer.acknowledge(6), 6);
        let pending: Vec<u32> = buffer.pending().map(|r| r.input.sequence).collect();
        assert_eq!(pending, vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_translate_predictions() {
        let mut buffer = InputBuffer::new(4);
        buffer.push(record(1));
        buffer.translate(DVec3::new(-1.0, 5.0, 0.0));
        assert_eq!(buffer.find(1).unwrap().predicted.position, DVec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = VehicleInput::new(1, 0.5, 0.016, Vec3::X, Vec3::ZERO);
        let mut b = a;
        assert_eq!(a.hash(), b.hash());
        b.thrust = Vec3::Y;
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_non_finite_input_detected() {
        let mut input = VehicleInput::idle(1, 0.0, 0.016);
        assert!(input.is_finite());
        input.thrust.x = f32::NAN;
        assert!(!input.is_finite());
    }
}
