//! Pose frames: per-joint flexion sharing one timestamp.

use crate::joint::{JointId, JointMap};
use crate::time::Timestamp;

/// One sample from the sensing side.
///
/// Flexion is 0.0 for a fully open (taut) joint and 1.0 for fully curled.
/// A `None` slot means the joint has no value this tick; the motion shaper
/// treats it as a missed frame for that joint only.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFrame {
    /// Sample time on the sender's clock.
    pub timestamp: Timestamp,
    /// Flexion per joint.
    pub flexion: JointMap<Option<f32>>,
}

impl PoseFrame {
    /// A frame with no joint values.
    #[must_use]
    pub fn empty(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            flexion: JointMap::default(),
        }
    }

    /// A frame with the same flexion on every joint.
    #[must_use]
    pub fn uniform(timestamp: Timestamp, flexion: f32) -> Self {
        Self {
            timestamp,
            flexion: JointMap::from_fn(|_| Some(flexion)),
        }
    }

    /// Sets one joint's flexion.
    pub fn set(&mut self, joint: JointId, flexion: f32) {
        self.flexion[joint] = Some(flexion);
    }

    /// Flexion for `joint`, if present.
    #[must_use]
    pub fn get(&self, joint: JointId) -> Option<f32> {
        self.flexion[joint]
    }

    /// Iterates the joints that carry a value.
    pub fn values(&self) -> impl Iterator<Item = (JointId, f32)> + '_ {
        self.flexion.iter().filter_map(|(j, v)| v.map(|v| (j, v)))
    }

    /// Number of joints carrying a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values().count()
    }

    /// Returns true if no joint carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values().next().is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_has_no_values() {
        let frame = PoseFrame::empty(Timestamp::zero());
        assert!(frame.is_empty());
        assert_eq!(frame.len(), 0);
    }

    #[test]
    fn uniform_frame_covers_all_joints() {
        let frame = PoseFrame::uniform(Timestamp::from_millis(1), 0.25);
        assert_eq!(frame.len(), JointId::COUNT);
        assert!(frame.values().all(|(_, v)| (v - 0.25).abs() < f32::EPSILON));
    }

    #[test]
    fn set_and_get() {
        let mut frame = PoseFrame::empty(Timestamp::zero());
        frame.set(JointId::ThumbCmc, 0.9);
        assert_eq!(frame.get(JointId::ThumbCmc), Some(0.9));
        assert_eq!(frame.values().collect::<Vec<_>>(), vec![(JointId::ThumbCmc, 0.9)]);
    }
}
