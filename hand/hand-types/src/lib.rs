//! Hardware-agnostic data types for a tendon-driven robotic hand.
//!
//! This crate provides the vocabulary shared by the calibration tools, the
//! control pipeline and the network link:
//!
//! - [`JointId`] / [`ActuatorId`] - the fixed joint set and its servo channels
//! - [`JointMap`] - fixed-size per-joint storage (no dynamic joint dictionaries)
//! - [`LandmarkSet`] - one hand's landmarks as delivered by the tracker
//! - [`PoseFrame`] - per-joint flexion values sharing one [`Timestamp`]
//! - [`ActuatorSink`] - the "set channel pulse width" primitive
//! - [`ActuatorBus`] / [`ActuatorLease`] - exclusive ownership of the sink
//!
//! # Layer 0 Crate
//!
//! No I/O, no async, no logging. Everything here is plain data plus the
//! sink ownership guard, so it can be used from:
//! - Calibration tools
//! - The actuation host
//! - The tracking client
//! - Tests with [`SimulatedSink`]
//!
//! # Example
//!
//! ```
//! use hand_types::{JointId, PoseFrame, Timestamp};
//!
//! let mut frame = PoseFrame::empty(Timestamp::from_millis(40));
//! frame.set(JointId::IndexMcp, 0.5);
//!
//! assert_eq!(frame.get(JointId::IndexMcp), Some(0.5));
//! assert_eq!(frame.get(JointId::ThumbIp), None);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod actuator;
mod error;
mod frame;
mod joint;
pub mod landmark;
mod time;

pub use actuator::{
    ActuatorBus, ActuatorLease, ActuatorSink, LeaseMode, PULSE_CEILING_US, PULSE_FLOOR_US,
    SimulatedSink,
};
pub use error::{HandError, Result};
pub use frame::PoseFrame;
pub use joint::{ActuatorId, Finger, JointId, JointMap};
pub use landmark::{Landmark, LandmarkSet};
pub use time::Timestamp;
