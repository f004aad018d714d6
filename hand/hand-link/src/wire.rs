//! Wire messages and framing.
//!
//! Each message is one JSON object carried in a length-delimited frame
//! (4-byte big-endian length prefix). The `type` field selects the variant:
//!
//! ```text
//! {"type":"hello","protocol_version":1,"client":"hand-link/0.3.0"}
//! {"type":"pose","timestamp_us":40000,"joints":[["index_mcp",0.5]]}
//! {"type":"goodbye"}
//! ```
//!
//! Flexion values are validated by the receiver, not the codec. A value
//! outside [0, 1], or one that arrives as `null` (how JSON carries a
//! non-finite float), drops that joint only. An unknown joint name fails
//! the whole message.

use bytes::Bytes;
use hand_types::{JointId, PoseFrame, Timestamp};
use serde::{Deserialize, Serialize};
use tokio_util::codec::LengthDelimitedCodec;

use crate::error::Result;

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// One message on the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// First message from the sensing side.
    Hello {
        /// Protocol version the client speaks.
        protocol_version: u32,
        /// Free-form client identification.
        client: String,
    },
    /// Session accepted.
    HelloAck {
        /// Free-form server identification.
        server: String,
    },
    /// Session refused; the server closes after sending this.
    HelloNack {
        /// Human-readable reason.
        reason: String,
    },
    /// Per-joint flexion sharing one timestamp.
    Pose {
        /// Sample time on the sender's clock.
        timestamp_us: u64,
        /// Joint values; `None` stands for a value JSON cannot carry.
        joints: Vec<(JointId, Option<f32>)>,
    },
    /// Orderly close.
    Goodbye,
}

impl WireMessage {
    /// Hello for the current protocol version.
    #[must_use]
    pub fn hello(client: impl Into<String>) -> Self {
        Self::Hello {
            protocol_version: PROTOCOL_VERSION,
            client: client.into(),
        }
    }

    /// Pose message carrying every joint value in `frame`.
    #[must_use]
    pub fn pose(frame: &PoseFrame) -> Self {
        Self::Pose {
            timestamp_us: frame.timestamp.as_micros(),
            joints: frame.values().map(|(joint, v)| (joint, Some(v))).collect(),
        }
    }

    /// Variant name, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::HelloAck { .. } => "hello_ack",
            Self::HelloNack { .. } => "hello_nack",
            Self::Pose { .. } => "pose",
            Self::Goodbye => "goodbye",
        }
    }

    /// Serializes to a frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Codec`](crate::LinkError::Codec) if serialization fails.
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Parses a frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Codec`](crate::LinkError::Codec) for malformed
    /// JSON, an unknown `type`, or an unknown joint name.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A received pose after per-joint validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedPose {
    /// Accepted values.
    pub frame: PoseFrame,
    /// Values dropped for being outside [0, 1] or non-finite.
    pub rejected: usize,
}

impl ReceivedPose {
    /// Validates the joint values of a `pose` message.
    ///
    /// A joint listed twice keeps its last valid value.
    #[must_use]
    pub fn from_wire(timestamp_us: u64, joints: &[(JointId, Option<f32>)]) -> Self {
        let mut frame = PoseFrame::empty(Timestamp::from_micros(timestamp_us));
        let mut rejected = 0;
        for &(joint, value) in joints {
            match value {
                Some(v) if v.is_finite() && (0.0..=1.0).contains(&v) => frame.set(joint, v),
                _ => rejected += 1,
            }
        }
        Self { frame, rejected }
    }
}

/// Length-delimited codec with the given frame limit.
#[must_use]
pub fn codec(max_frame_len: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_len)
        .new_codec()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn pose_json_shape() {
        let mut frame = PoseFrame::empty(Timestamp::from_millis(40));
        frame.set(JointId::IndexMcp, 0.5);
        let bytes = WireMessage::pose(&frame).to_bytes().unwrap();
        let json = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(
            json,
            r#"{"type":"pose","timestamp_us":40000,"joints":[["index_mcp",0.5]]}"#
        );
    }

    #[test]
    fn goodbye_is_bare_tag() {
        let bytes = WireMessage::Goodbye.to_bytes().unwrap();
        assert_eq!(&bytes[..], br#"{"type":"goodbye"}"#);
        assert_eq!(WireMessage::from_bytes(&bytes).unwrap(), WireMessage::Goodbye);
    }

    #[test]
    fn non_finite_travels_as_null() {
        let mut frame = PoseFrame::empty(Timestamp::zero());
        frame.set(JointId::ThumbIp, f32::NAN);
        let bytes = WireMessage::pose(&frame).to_bytes().unwrap();
        let WireMessage::Pose { timestamp_us, joints } = WireMessage::from_bytes(&bytes).unwrap()
        else {
            panic!("expected pose");
        };
        assert_eq!(joints, vec![(JointId::ThumbIp, None)]);
        let received = ReceivedPose::from_wire(timestamp_us, &joints);
        assert!(received.frame.is_empty());
        assert_eq!(received.rejected, 1);
    }

    #[test]
    fn out_of_range_values_dropped_per_joint() {
        let joints = [
            (JointId::IndexMcp, Some(0.25)),
            (JointId::IndexPip, Some(1.5)),
            (JointId::RingMcp, Some(-0.1)),
            (JointId::RingPip, Some(1.0)),
        ];
        let received = ReceivedPose::from_wire(1_000, &joints);
        assert_eq!(received.rejected, 2);
        assert_eq!(received.frame.get(JointId::IndexMcp), Some(0.25));
        assert_eq!(received.frame.get(JointId::RingPip), Some(1.0));
        assert_eq!(received.frame.get(JointId::IndexPip), None);
        assert_eq!(received.frame.timestamp, Timestamp::from_micros(1_000));
    }

    #[test]
    fn unknown_joint_fails_message() {
        let raw = br#"{"type":"pose","timestamp_us":1,"joints":[["elbow",0.5]]}"#;
        assert!(WireMessage::from_bytes(raw).is_err());
    }

    #[test]
    fn unknown_type_fails_message() {
        assert!(WireMessage::from_bytes(br#"{"type":"reboot"}"#).is_err());
        assert!(WireMessage::from_bytes(b"not json").is_err());
    }

    #[test]
    fn hello_carries_version() {
        let hello = WireMessage::hello("tracker");
        assert_eq!(hello.kind(), "hello");
        assert_eq!(
            hello,
            WireMessage::Hello {
                protocol_version: PROTOCOL_VERSION,
                client: "tracker".into()
            }
        );
    }
}
