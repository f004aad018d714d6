//! Synthetic tracking input for exercising a live server without a camera.

use std::f32::consts::TAU;
use std::time::Duration;

use glam::{Quat, Vec3};
use hand_control::JointFeature;
use hand_types::landmark::{INDEX_MCP, LANDMARK_COUNT, MIDDLE_MCP, PINKY_MCP, RING_MCP, THUMB_CMC};
use hand_types::{JointId, LandmarkSet};

const BONE_LENGTH: f32 = 0.3;

/// Base landmark, the three joints bending along the chain, and the
/// sideways offset of each finger.
const CHAINS: [(usize, [JointId; 3], f32); 5] = [
    (
        THUMB_CMC,
        [JointId::ThumbCmc, JointId::ThumbMcp, JointId::ThumbIp],
        -0.6,
    ),
    (
        INDEX_MCP,
        [JointId::IndexMcp, JointId::IndexPip, JointId::IndexPip],
        -0.2,
    ),
    (
        MIDDLE_MCP,
        [JointId::MiddleMcp, JointId::MiddlePip, JointId::MiddlePip],
        0.0,
    ),
    (
        RING_MCP,
        [JointId::RingMcp, JointId::RingPip, JointId::RingPip],
        0.2,
    ),
    (
        PINKY_MCP,
        [JointId::PinkyMcp, JointId::PinkyPip, JointId::PinkyPip],
        0.4,
    ),
];

/// A planar hand with every joint bent to `flexion` of its closed angle.
///
/// The wrist sits at the origin. Each chain curls about an axis
/// perpendicular to its first bone, so successive bones meet at exactly the
/// requested bend.
#[must_use]
pub fn synthetic_hand(flexion: f32) -> LandmarkSet {
    let flexion = flexion.clamp(0.0, 1.0);
    let mut points = vec![Vec3::ZERO; LANDMARK_COUNT];
    for (base, joints, offset) in CHAINS {
        let root = Vec3::new(offset, 1.0, 0.0);
        points[base] = root;
        let heading = root.normalize();
        let axis = heading.cross(Vec3::Z).normalize();
        let mut bend = 0.0;
        for (k, joint) in joints.into_iter().enumerate() {
            bend += flexion * JointFeature::for_joint(joint).closed_angle;
            let direction = Quat::from_axis_angle(axis, bend) * heading;
            points[base + k + 1] = points[base + k] + direction * BONE_LENGTH;
        }
    }
    LandmarkSet::new(points)
}

/// Smooth open-close cycle: 0.0 at `t = 0`, 1.0 at half a period.
#[must_use]
pub fn cycle(elapsed: Duration, period: Duration) -> f32 {
    if period.is_zero() {
        return 0.0;
    }
    let phase = (elapsed.as_secs_f64() / period.as_secs_f64()).fract();
    #[allow(clippy::cast_possible_truncation)]
    let phase = phase as f32;
    0.5 - 0.5 * (TAU * phase).cos()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use approx::assert_relative_eq;
    use hand_control::PoseNormalizer;
    use hand_types::Timestamp;

    use super::*;

    #[test]
    fn synthetic_hand_round_trips_through_normalizer() {
        let normalizer = PoseNormalizer::new();
        for flexion in [0.0_f32, 0.25, 0.5, 1.0] {
            let frame = normalizer
                .normalize(&synthetic_hand(flexion), Timestamp::zero())
                .unwrap();
            for joint in JointId::ALL {
                assert_relative_eq!(frame.get(joint).unwrap(), flexion, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn cycle_endpoints() {
        let period = Duration::from_secs(4);
        assert_relative_eq!(cycle(Duration::ZERO, period), 0.0);
        assert_relative_eq!(cycle(Duration::from_secs(2), period), 1.0, epsilon = 1e-6);
        assert_relative_eq!(cycle(Duration::from_secs(1), period), 0.5, epsilon = 1e-6);
        assert_relative_eq!(cycle(Duration::from_secs(3), Duration::ZERO), 0.0);
    }
}
