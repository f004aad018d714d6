//! Control pipeline for a tendon-driven hand.
//!
//! ```text
//! LandmarkSet ──► PoseNormalizer ──► PoseFrame ──(network)──► MotionShaper ──► ActuatorSink
//!                                                                  │
//!                                                            CommandMapper
//!                                                                  │
//!                                                         CalibrationSnapshot
//! ```
//!
//! # Crate Contents
//!
//! - [`PoseNormalizer`] - bend angles at fixed landmark triples, mapped to [0, 1]
//! - [`CommandMapper`] - linear taut-to-curled interpolation, clamped to range
//! - [`MotionShaper`] - smoothing, slew limiting, hold and decay per joint
//! - [`ControlLoop`] - shaper output written through an
//!   [`ActuatorLease`](hand_types::ActuatorLease)
//! - [`ControlConfig`] - timing and shaping parameters
//!
//! Per-tick problems ([`ControlError::MissingLandmarks`],
//! [`ControlError::OutOfRangeCommand`]) are absorbed and counted. An
//! incomplete calibration stops a session before any actuator moves.

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod control_loop;
mod error;
mod mapper;
mod normalizer;
mod shaper;

pub use config::ControlConfig;
pub use control_loop::ControlLoop;
pub use error::{ControlError, Result};
pub use mapper::{CommandMapper, PulseCommand};
pub use normalizer::{JointFeature, PoseNormalizer};
pub use shaper::{JointPhase, MotionShaper, ShaperState};
