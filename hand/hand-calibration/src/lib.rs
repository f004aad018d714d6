//! Calibration for a tendon-driven hand.
//!
//! Two layers of reference points are captured per hand:
//!
//! 1. **Actuator ranges** - the physical pulse extremes of each servo,
//!    found with tendons detached.
//! 2. **Joint calibrations** - the taut (flexion 0.0) and curled
//!    (flexion 1.0) pulses of each joint, found with tendons installed.
//!
//! # Crate Contents
//!
//! - [`ActuatorRange`], [`JointCalibration`] - validated reference points
//! - [`CalibrationRecord`] - the persisted aggregate
//! - [`CalibrationSnapshot`] - frozen, shared view handed to a control session
//! - [`CalibrationStore`] - JSON file with replace-on-success writes
//! - [`Acquisition`] - the staged, operator-driven acquisition procedure
//!
//! # Stage Ordering
//!
//! ```text
//! Uninitialized -> RangeCalibrated -> TendonCalibrated -> Verified
//! ```
//!
//! Each stage is committed only on full operator confirmation. Aborting or
//! failing a commit never touches the stored record.
//!
//! # Example
//!
//! ```
//! use hand_calibration::{ActuatorRange, CalibrationRecord, JointCalibration};
//! use hand_types::JointId;
//!
//! let joint = JointId::IndexMcp;
//! let record = CalibrationRecord::new()
//!     .with_range(joint.actuator(), ActuatorRange::new(600, 2400).unwrap())
//!     .with_joint(joint, JointCalibration::new(1000, 2000).unwrap())
//!     .unwrap();
//!
//! assert!(record.joint(joint).is_some());
//! assert!(!record.is_complete());
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod acquisition;
mod error;
mod range;
mod record;
mod store;

pub use acquisition::{Acquisition, OperatorEvent, ProcedureKind, Progress, SweepPlan, SweepStep};
pub use error::{CalibrationError, Result};
pub use range::{ActuatorRange, JointCalibration, Polarity};
pub use record::{AcquisitionStage, CalibrationRecord, CalibrationSnapshot, SCHEMA_VERSION};
pub use store::{CALIBRATION_PATH_ENV, CalibrationStore, DEFAULT_CALIBRATION_PATH};
