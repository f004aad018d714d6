//! Error types for hand-calibration crate.

use std::path::PathBuf;

use hand_types::{ActuatorId, HandError, JointId, LeaseMode};
use thiserror::Error;

use crate::acquisition::ProcedureKind;

/// Errors that can occur while loading, validating or acquiring calibration.
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// Actuator range violates `min < max` or the physical pulse bounds.
    #[error("invalid actuator range: min {min} us, max {max} us")]
    InvalidRange {
        /// Proposed minimum.
        min: u16,
        /// Proposed maximum.
        max: u16,
    },

    /// Joint reference points are outside the physical bounds or equal.
    #[error("invalid joint calibration: taut {taut} us, curled {curled} us")]
    InvalidJoint {
        /// Taut pulse.
        taut: u16,
        /// Curled pulse.
        curled: u16,
    },

    /// A joint reference pulse lies outside its actuator's range.
    #[error("joint {joint} pulse {pulse} us outside actuator range [{min}, {max}]")]
    JointOutsideRange {
        /// Offending joint.
        joint: JointId,
        /// Offending pulse.
        pulse: u16,
        /// Actuator range minimum.
        min: u16,
        /// Actuator range maximum.
        max: u16,
    },

    /// A joint has calibration but its actuator has no range.
    #[error("joint {joint} calibrated but actuator {actuator} has no range")]
    MissingRange {
        /// Calibrated joint.
        joint: JointId,
        /// Its actuator.
        actuator: ActuatorId,
    },

    /// The record lacks entries required for live control.
    #[error("incomplete calibration: missing {missing:?}")]
    IncompleteCalibration {
        /// Joints without calibration.
        missing: Vec<JointId>,
    },

    /// A stage was requested before its prerequisites were committed.
    #[error("calibration order violation: {procedure} requires {requirement}")]
    CalibrationOrderViolation {
        /// Requested procedure.
        procedure: ProcedureKind,
        /// What was missing.
        requirement: String,
    },

    /// Commit attempted before every item in the procedure was confirmed.
    #[error("{procedure} incomplete: {pending} item(s) unconfirmed")]
    StageIncomplete {
        /// Active procedure.
        procedure: ProcedureKind,
        /// Number of unconfirmed items.
        pending: usize,
    },

    /// No procedure is active.
    #[error("no calibration procedure is active")]
    NoProcedure,

    /// A procedure is already active.
    #[error("{0} procedure already active")]
    ProcedureActive(ProcedureKind),

    /// The event does not apply to the active procedure.
    #[error("event not accepted during {procedure}: {reason}")]
    UnexpectedEvent {
        /// Active procedure.
        procedure: ProcedureKind,
        /// Why it was rejected.
        reason: String,
    },

    /// Calibration file uses a schema this build does not understand.
    #[error("unsupported calibration schema version {0}")]
    UnsupportedSchema(u32),

    /// The actuator bus is owned by another mode.
    #[error("actuators busy: held by {held_by}")]
    ActuatorBusy {
        /// Current owner.
        held_by: LeaseMode,
    },

    /// Identifier or hardware error from the shared types.
    #[error(transparent)]
    Hand(HandError),

    /// Reading or writing the calibration file failed.
    #[error("calibration file {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Calibration file is not valid JSON for the schema.
    #[error("calibration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CalibrationError {
    /// Creates an order violation error.
    #[must_use]
    pub fn order_violation(procedure: ProcedureKind, requirement: impl Into<String>) -> Self {
        Self::CalibrationOrderViolation {
            procedure,
            requirement: requirement.into(),
        }
    }

    /// Creates an unexpected event error.
    #[must_use]
    pub fn unexpected(procedure: ProcedureKind, reason: impl Into<String>) -> Self {
        Self::UnexpectedEvent {
            procedure,
            reason: reason.into(),
        }
    }

    /// Creates an I/O error bound to a path.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<HandError> for CalibrationError {
    fn from(err: HandError) -> Self {
        match err {
            HandError::ActuatorBusy { held_by, .. } => Self::ActuatorBusy { held_by },
            other => Self::Hand(other),
        }
    }
}

/// Result type for calibration operations.
pub type Result<T> = std::result::Result<T, CalibrationError>;
