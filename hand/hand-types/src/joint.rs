//! Joint and actuator identifiers.
//!
//! The hand has a fixed set of tendon joints, each pulled by one servo.
//! Channel numbers follow the default wiring (pinky first, thumb last).

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HandError;

/// Number of PWM channels on the servo driver.
const DRIVER_CHANNELS: u8 = 16;

/// A controllable degree of freedom of the hand.
///
/// # Example
///
/// ```
/// use hand_types::{ActuatorId, JointId};
///
/// let joint: JointId = "index_pip".parse().unwrap();
/// assert_eq!(joint, JointId::IndexPip);
/// assert_eq!(joint.actuator(), ActuatorId::new(7).unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointId {
    /// Pinky metacarpophalangeal flexion.
    PinkyMcp,
    /// Pinky proximal interphalangeal flexion.
    PinkyPip,
    /// Ring metacarpophalangeal flexion.
    RingMcp,
    /// Ring proximal interphalangeal flexion.
    RingPip,
    /// Middle metacarpophalangeal flexion.
    MiddleMcp,
    /// Middle proximal interphalangeal flexion.
    MiddlePip,
    /// Index metacarpophalangeal flexion.
    IndexMcp,
    /// Index proximal interphalangeal flexion.
    IndexPip,
    /// Thumb carpometacarpal flexion.
    ThumbCmc,
    /// Thumb metacarpophalangeal flexion.
    ThumbMcp,
    /// Thumb interphalangeal flexion.
    ThumbIp,
}

impl JointId {
    /// Number of joints.
    pub const COUNT: usize = 11;

    /// All joints in channel order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::PinkyMcp,
        Self::PinkyPip,
        Self::RingMcp,
        Self::RingPip,
        Self::MiddleMcp,
        Self::MiddlePip,
        Self::IndexMcp,
        Self::IndexPip,
        Self::ThumbCmc,
        Self::ThumbMcp,
        Self::ThumbIp,
    ];

    /// Dense index into [`JointMap`] storage.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Servo channel pulling this joint's tendon.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn actuator(self) -> ActuatorId {
        ActuatorId(self as u8)
    }

    /// The finger this joint belongs to.
    #[must_use]
    pub const fn finger(self) -> Finger {
        match self {
            Self::PinkyMcp | Self::PinkyPip => Finger::Pinky,
            Self::RingMcp | Self::RingPip => Finger::Ring,
            Self::MiddleMcp | Self::MiddlePip => Finger::Middle,
            Self::IndexMcp | Self::IndexPip => Finger::Index,
            Self::ThumbCmc | Self::ThumbMcp | Self::ThumbIp => Finger::Thumb,
        }
    }

    /// Stable snake_case name, as used on the wire and in calibration files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PinkyMcp => "pinky_mcp",
            Self::PinkyPip => "pinky_pip",
            Self::RingMcp => "ring_mcp",
            Self::RingPip => "ring_pip",
            Self::MiddleMcp => "middle_mcp",
            Self::MiddlePip => "middle_pip",
            Self::IndexMcp => "index_mcp",
            Self::IndexPip => "index_pip",
            Self::ThumbCmc => "thumb_cmc",
            Self::ThumbMcp => "thumb_mcp",
            Self::ThumbIp => "thumb_ip",
        }
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JointId {
    type Err = HandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|joint| joint.name() == s)
            .ok_or_else(|| HandError::unknown_joint(s))
    }
}

/// Finger grouping of joints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finger {
    /// Little finger.
    Pinky,
    /// Ring finger.
    Ring,
    /// Middle finger.
    Middle,
    /// Index finger.
    Index,
    /// Thumb.
    Thumb,
}

impl Finger {
    /// Joints of this finger, proximal first.
    #[must_use]
    pub fn joints(self) -> impl Iterator<Item = JointId> {
        JointId::ALL.into_iter().filter(move |j| j.finger() == self)
    }
}

/// A servo channel on the PWM driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ActuatorId(u8);

impl ActuatorId {
    /// Creates an actuator id, rejecting channels the driver does not have.
    ///
    /// # Errors
    ///
    /// Returns [`HandError::InvalidActuator`] for channels `>= 16`.
    pub const fn new(channel: u8) -> Result<Self, HandError> {
        if channel < DRIVER_CHANNELS {
            Ok(Self(channel))
        } else {
            Err(HandError::InvalidActuator {
                channel,
                max: DRIVER_CHANNELS,
            })
        }
    }

    /// Raw channel index.
    #[must_use]
    pub const fn channel(self) -> u8 {
        self.0
    }

    /// Actuators used by the default joint wiring.
    pub fn wired() -> impl Iterator<Item = Self> {
        JointId::ALL.into_iter().map(JointId::actuator)
    }
}

impl TryFrom<u8> for ActuatorId {
    type Error = HandError;

    fn try_from(channel: u8) -> Result<Self, Self::Error> {
        Self::new(channel)
    }
}

impl From<ActuatorId> for u8 {
    fn from(id: ActuatorId) -> Self {
        id.0
    }
}

impl fmt::Display for ActuatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Fixed-size storage with one slot per [`JointId`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointMap<T> {
    slots: [T; JointId::COUNT],
}

impl<T> JointMap<T> {
    /// Builds a map by evaluating `f` for every joint.
    pub fn from_fn(mut f: impl FnMut(JointId) -> T) -> Self {
        Self {
            slots: std::array::from_fn(|i| f(JointId::ALL[i])),
        }
    }

    /// Iterates `(joint, value)` pairs in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (JointId, &T)> {
        JointId::ALL.into_iter().zip(self.slots.iter())
    }

    /// Iterates `(joint, value)` pairs mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (JointId, &mut T)> {
        JointId::ALL.into_iter().zip(self.slots.iter_mut())
    }

    /// Maps every slot into a new map.
    pub fn map<U>(&self, mut f: impl FnMut(JointId, &T) -> U) -> JointMap<U> {
        JointMap::from_fn(|joint| f(joint, &self.slots[joint.index()]))
    }
}

impl<T: Default> Default for JointMap<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<JointId> for JointMap<T> {
    type Output = T;

    fn index(&self, joint: JointId) -> &T {
        &self.slots[joint.index()]
    }
}

impl<T> IndexMut<JointId> for JointMap<T> {
    fn index_mut(&mut self, joint: JointId) -> &mut T {
        &mut self.slots[joint.index()]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn joint_indices_are_dense() {
        for (i, joint) in JointId::ALL.iter().enumerate() {
            assert_eq!(joint.index(), i);
        }
    }

    #[test]
    fn joint_name_roundtrips_through_from_str() {
        for joint in JointId::ALL {
            assert_eq!(joint.name().parse::<JointId>().unwrap(), joint);
        }
        assert!("index_dip".parse::<JointId>().is_err());
    }

    #[test]
    fn default_wiring_matches_channels() {
        assert_eq!(JointId::PinkyMcp.actuator().channel(), 0);
        assert_eq!(JointId::IndexPip.actuator().channel(), 7);
        assert_eq!(JointId::ThumbIp.actuator().channel(), 10);
        assert_eq!(ActuatorId::wired().count(), JointId::COUNT);
    }

    #[test]
    fn fingers_group_joints() {
        assert_eq!(Finger::Thumb.joints().count(), 3);
        assert_eq!(
            Finger::Index.joints().collect::<Vec<_>>(),
            vec![JointId::IndexMcp, JointId::IndexPip]
        );
    }

    #[test]
    fn actuator_rejects_out_of_range_channel() {
        assert!(ActuatorId::new(15).is_ok());
        assert!(matches!(
            ActuatorId::new(16),
            Err(HandError::InvalidActuator { channel: 16, .. })
        ));
    }

    #[test]
    fn actuator_serde_is_transparent() {
        let id = ActuatorId::new(3).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "3");
        let back: ActuatorId = serde_json::from_str("3").unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ActuatorId>("42").is_err());
    }

    #[test]
    fn joint_map_indexing() {
        let mut map: JointMap<u16> = JointMap::default();
        map[JointId::RingPip] = 1500;
        assert_eq!(map[JointId::RingPip], 1500);
        assert_eq!(map[JointId::RingMcp], 0);
        assert_eq!(map.iter().filter(|(_, v)| **v != 0).count(), 1);
    }
}
