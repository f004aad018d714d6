//! Landmark set to per-joint flexion.
//!
//! Each joint's feature is the bend angle at its landmark: the angle between
//! the incoming bone (`parent -> joint`) and the outgoing bone
//! (`joint -> child`). A straight finger bends 0 rad. The angle is mapped
//! linearly from an open angle (flexion 0.0) to a closed angle (flexion 1.0)
//! and clamped.

use glam::Vec3;
use hand_types::landmark::{
    INDEX_DIP, INDEX_MCP, INDEX_PIP, MIDDLE_DIP, MIDDLE_MCP, MIDDLE_PIP, PINKY_DIP, PINKY_MCP,
    PINKY_PIP, RING_DIP, RING_MCP, RING_PIP, THUMB_CMC, THUMB_IP, THUMB_MCP, THUMB_TIP, WRIST,
};
use hand_types::{JointId, JointMap, LandmarkSet, PoseFrame, Timestamp};

use crate::error::{ControlError, Result};

/// Bones shorter than this are treated as degenerate.
const MIN_BONE_LENGTH: f32 = 1e-6;

/// Landmarks and angle span defining one joint's flexion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointFeature {
    /// Landmark before the joint.
    pub parent: usize,
    /// The joint's landmark.
    pub joint: usize,
    /// Landmark after the joint.
    pub child: usize,
    /// Bend angle mapped to flexion 0.0 (radians).
    pub open_angle: f32,
    /// Bend angle mapped to flexion 1.0 (radians).
    pub closed_angle: f32,
}

impl JointFeature {
    const fn new(
        parent: usize,
        joint: usize,
        child: usize,
        open_angle: f32,
        closed_angle: f32,
    ) -> Self {
        Self {
            parent,
            joint,
            child,
            open_angle,
            closed_angle,
        }
    }

    /// Default feature for `joint`.
    #[must_use]
    pub const fn for_joint(joint: JointId) -> Self {
        match joint {
            JointId::PinkyMcp => Self::new(WRIST, PINKY_MCP, PINKY_PIP, 0.0, 1.6),
            JointId::PinkyPip => Self::new(PINKY_MCP, PINKY_PIP, PINKY_DIP, 0.0, 1.8),
            JointId::RingMcp => Self::new(WRIST, RING_MCP, RING_PIP, 0.0, 1.6),
            JointId::RingPip => Self::new(RING_MCP, RING_PIP, RING_DIP, 0.0, 1.8),
            JointId::MiddleMcp => Self::new(WRIST, MIDDLE_MCP, MIDDLE_PIP, 0.0, 1.6),
            JointId::MiddlePip => Self::new(MIDDLE_MCP, MIDDLE_PIP, MIDDLE_DIP, 0.0, 1.8),
            JointId::IndexMcp => Self::new(WRIST, INDEX_MCP, INDEX_PIP, 0.0, 1.6),
            JointId::IndexPip => Self::new(INDEX_MCP, INDEX_PIP, INDEX_DIP, 0.0, 1.8),
            JointId::ThumbCmc => Self::new(WRIST, THUMB_CMC, THUMB_MCP, 0.0, 0.8),
            JointId::ThumbMcp => Self::new(THUMB_CMC, THUMB_MCP, THUMB_IP, 0.0, 1.2),
            JointId::ThumbIp => Self::new(THUMB_MCP, THUMB_IP, THUMB_TIP, 0.0, 1.4),
        }
    }

    fn highest_index(&self) -> usize {
        self.parent.max(self.joint).max(self.child)
    }

    /// Bend angle in radians, or `None` if either bone is degenerate.
    #[must_use]
    pub fn bend_angle(&self, landmarks: &LandmarkSet) -> Option<f32> {
        let p = landmarks.get(self.parent)?;
        let j = landmarks.get(self.joint)?;
        let c = landmarks.get(self.child)?;
        let incoming = j - p;
        let outgoing = c - j;
        if !bone_ok(incoming) || !bone_ok(outgoing) {
            return None;
        }
        Some(incoming.cross(outgoing).length().atan2(incoming.dot(outgoing)))
    }

    /// Maps a bend angle to flexion in [0, 1].
    #[must_use]
    pub fn normalize(&self, angle: f32) -> f32 {
        let span = self.closed_angle - self.open_angle;
        if span.abs() <= f32::EPSILON {
            return 0.0;
        }
        ((angle - self.open_angle) / span).clamp(0.0, 1.0)
    }
}

fn bone_ok(bone: Vec3) -> bool {
    bone.is_finite() && bone.length() > MIN_BONE_LENGTH
}

/// Per-joint flexion from a tracked hand.
///
/// # Example
///
/// ```
/// use glam::Vec3;
/// use hand_control::PoseNormalizer;
/// use hand_types::{JointId, LandmarkSet, Timestamp};
///
/// // Every landmark on one line: a fully open hand.
/// let points: Vec<Vec3> = (0..21).map(|i| Vec3::new(0.0, i as f32, 0.0)).collect();
/// let normalizer = PoseNormalizer::new();
/// let frame = normalizer
///     .normalize(&LandmarkSet::new(points), Timestamp::zero())
///     .unwrap();
/// assert!(frame.get(JointId::IndexMcp).unwrap() < 1e-3);
/// ```
#[derive(Debug, Clone)]
pub struct PoseNormalizer {
    features: JointMap<JointFeature>,
    required: usize,
}

impl Default for PoseNormalizer {
    fn default() -> Self {
        Self::with_features(JointMap::from_fn(JointFeature::for_joint))
    }
}

impl PoseNormalizer {
    /// Normalizer with the default joint features.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizer with custom features.
    #[must_use]
    pub fn with_features(features: JointMap<JointFeature>) -> Self {
        let required = features
            .iter()
            .map(|(_, f)| f.highest_index() + 1)
            .max()
            .unwrap_or(0);
        Self { features, required }
    }

    /// Landmarks needed for a frame.
    #[must_use]
    pub const fn required_landmarks(&self) -> usize {
        self.required
    }

    /// Feature used for `joint`.
    #[must_use]
    pub fn feature(&self, joint: JointId) -> &JointFeature {
        &self.features[joint]
    }

    /// Computes a frame from one hand.
    ///
    /// Joints with a degenerate bone carry no value in the frame.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::MissingLandmarks`] if the set is shorter than
    /// [`required_landmarks`](Self::required_landmarks). Callers treat this
    /// as "no frame this tick".
    pub fn normalize(&self, landmarks: &LandmarkSet, timestamp: Timestamp) -> Result<PoseFrame> {
        if landmarks.len() < self.required {
            return Err(ControlError::MissingLandmarks {
                required: self.required,
                available: landmarks.len(),
            });
        }
        let mut frame = PoseFrame::empty(timestamp);
        for (joint, feature) in self.features.iter() {
            if let Some(angle) = feature.bend_angle(landmarks) {
                frame.set(joint, feature.normalize(angle));
            }
        }
        Ok(frame)
    }

    /// Like [`normalize`](Self::normalize), treating "no detection" as a
    /// missed frame.
    ///
    /// # Errors
    ///
    /// Same as [`normalize`](Self::normalize).
    pub fn normalize_detection(
        &self,
        detection: Option<&LandmarkSet>,
        timestamp: Timestamp,
    ) -> Result<Option<PoseFrame>> {
        detection
            .map(|landmarks| self.normalize(landmarks, timestamp))
            .transpose()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_precision_loss)]
mod tests {
    use approx::assert_relative_eq;
    use hand_types::landmark::LANDMARK_COUNT;

    use super::*;

    /// Every landmark on a straight line: all bend angles are zero.
    fn straight_hand() -> Vec<Vec3> {
        (0..LANDMARK_COUNT)
            .map(|i| Vec3::new(0.0, i as f32, 0.0))
            .collect()
    }

    #[test]
    fn straight_hand_is_open() {
        let normalizer = PoseNormalizer::new();
        let frame = normalizer
            .normalize(&LandmarkSet::new(straight_hand()), Timestamp::zero())
            .unwrap();
        for joint in JointId::ALL {
            assert_relative_eq!(frame.get(joint).unwrap(), 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn right_angle_at_index_pip() {
        let mut points = straight_hand();
        let pip = points[INDEX_PIP];
        points[INDEX_DIP] = pip + Vec3::X;
        let frame = PoseNormalizer::new()
            .normalize(&LandmarkSet::new(points), Timestamp::zero())
            .unwrap();
        let expected = std::f32::consts::FRAC_PI_2 / 1.8;
        assert_relative_eq!(frame.get(JointId::IndexPip).unwrap(), expected, epsilon = 1e-4);
    }

    #[test]
    fn over_bend_clamps_to_one() {
        let mut points = straight_hand();
        let mcp = points[MIDDLE_MCP];
        // Fold the proximal phalanx straight back toward the wrist.
        points[MIDDLE_PIP] = mcp - Vec3::Y;
        let frame = PoseNormalizer::new()
            .normalize(&LandmarkSet::new(points), Timestamp::zero())
            .unwrap();
        assert_relative_eq!(frame.get(JointId::MiddleMcp).unwrap(), 1.0);
    }

    #[test]
    fn short_set_is_missing_landmarks() {
        let points = straight_hand()[..10].to_vec();
        let err = PoseNormalizer::new()
            .normalize(&LandmarkSet::new(points), Timestamp::zero())
            .unwrap_err();
        assert_eq!(
            err,
            ControlError::MissingLandmarks {
                required: 20,
                available: 10
            }
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn twenty_points_suffice() {
        let points = straight_hand()[..20].to_vec();
        let frame = PoseNormalizer::new()
            .normalize(&LandmarkSet::new(points), Timestamp::zero())
            .unwrap();
        assert_eq!(frame.len(), JointId::COUNT);
    }

    #[test]
    fn degenerate_bone_drops_only_that_joint() {
        let mut points = straight_hand();
        points[THUMB_IP] = points[THUMB_MCP];
        let frame = PoseNormalizer::new()
            .normalize(&LandmarkSet::new(points), Timestamp::zero())
            .unwrap();
        assert!(frame.get(JointId::ThumbIp).is_none());
        assert!(frame.get(JointId::ThumbMcp).is_none());
        assert!(frame.get(JointId::IndexMcp).is_some());
    }

    #[test]
    fn no_detection_is_missed_frame() {
        let normalizer = PoseNormalizer::new();
        assert_eq!(
            normalizer.normalize_detection(None, Timestamp::zero()).unwrap(),
            None
        );
    }

    #[test]
    fn normalize_clamps_below_open() {
        let feature = JointFeature::new(0, 1, 2, 0.2, 1.2);
        assert_relative_eq!(feature.normalize(0.1), 0.0);
        assert_relative_eq!(feature.normalize(0.7), 0.5);
    }
}
