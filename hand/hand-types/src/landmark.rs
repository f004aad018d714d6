//! Hand landmarks as delivered by the tracking collaborator.
//!
//! Indices follow the 21-point MediaPipe hand model.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Wrist.
pub const WRIST: usize = 0;
/// Thumb carpometacarpal.
pub const THUMB_CMC: usize = 1;
/// Thumb metacarpophalangeal.
pub const THUMB_MCP: usize = 2;
/// Thumb interphalangeal.
pub const THUMB_IP: usize = 3;
/// Thumb tip.
pub const THUMB_TIP: usize = 4;
/// Index metacarpophalangeal.
pub const INDEX_MCP: usize = 5;
/// Index proximal interphalangeal.
pub const INDEX_PIP: usize = 6;
/// Index distal interphalangeal.
pub const INDEX_DIP: usize = 7;
/// Index tip.
pub const INDEX_TIP: usize = 8;
/// Middle metacarpophalangeal.
pub const MIDDLE_MCP: usize = 9;
/// Middle proximal interphalangeal.
pub const MIDDLE_PIP: usize = 10;
/// Middle distal interphalangeal.
pub const MIDDLE_DIP: usize = 11;
/// Middle tip.
pub const MIDDLE_TIP: usize = 12;
/// Ring metacarpophalangeal.
pub const RING_MCP: usize = 13;
/// Ring proximal interphalangeal.
pub const RING_PIP: usize = 14;
/// Ring distal interphalangeal.
pub const RING_DIP: usize = 15;
/// Ring tip.
pub const RING_TIP: usize = 16;
/// Pinky metacarpophalangeal.
pub const PINKY_MCP: usize = 17;
/// Pinky proximal interphalangeal.
pub const PINKY_PIP: usize = 18;
/// Pinky distal interphalangeal.
pub const PINKY_DIP: usize = 19;
/// Pinky tip.
pub const PINKY_TIP: usize = 20;

/// Number of landmarks in a complete hand.
pub const LANDMARK_COUNT: usize = 21;

/// A single tracked point.
pub type Landmark = Vec3;

/// One hand's landmarks in tracker order.
///
/// The set is whatever the tracker produced; it is not checked for
/// completeness here. The pose normalizer decides whether enough points
/// are present.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    /// Wraps an ordered sequence of points.
    #[must_use]
    pub const fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    /// Number of points supplied.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if no points were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.points.get(index).copied()
    }

    /// All points.
    #[must_use]
    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}

impl From<Vec<Landmark>> for LandmarkSet {
    fn from(points: Vec<Landmark>) -> Self {
        Self::new(points)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn landmark_set_access() {
        let set = LandmarkSet::new(vec![Vec3::ZERO, Vec3::X]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1), Some(Vec3::X));
        assert_eq!(set.get(WRIST), Some(Vec3::ZERO));
        assert_eq!(set.get(PINKY_TIP), None);
    }

    #[test]
    fn tip_indices_are_last_of_each_finger() {
        assert_eq!(THUMB_TIP + 1, INDEX_MCP);
        assert_eq!(INDEX_TIP + 1, MIDDLE_MCP);
        assert_eq!(MIDDLE_TIP + 1, RING_MCP);
        assert_eq!(RING_TIP + 1, PINKY_MCP);
        assert_eq!(PINKY_TIP + 1, LANDMARK_COUNT);
    }
}
