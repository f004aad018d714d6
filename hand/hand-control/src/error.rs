//! Error types for hand-control crate.

use hand_calibration::CalibrationError;
use hand_types::{HandError, JointId, LeaseMode};
use thiserror::Error;

/// Errors from the control pipeline.
///
/// `MissingLandmarks` and `OutOfRangeCommand` are per-tick signals: the
/// pipeline absorbs them and keeps running. The rest block a session from
/// starting.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ControlError {
    /// Landmark set too short for the joint features.
    #[error("missing landmarks: need {required}, got {available}")]
    MissingLandmarks {
        /// Points required.
        required: usize,
        /// Points supplied.
        available: usize,
    },

    /// Calibration lacks joints; live actuation refused.
    #[error("incomplete calibration: missing {missing:?}")]
    IncompleteCalibration {
        /// Joints without calibration.
        missing: Vec<JointId>,
    },

    /// A mapped pulse had to be clamped into the actuator range.
    #[error("out-of-range command for {joint}: requested {requested_us} us, clamped to {clamped_us} us")]
    OutOfRangeCommand {
        /// Affected joint.
        joint: JointId,
        /// Unclamped interpolation result.
        requested_us: i32,
        /// Value actually commanded.
        clamped_us: u16,
    },

    /// Configuration parameter out of range.
    #[error("invalid control config: {0}")]
    InvalidConfig(String),

    /// The actuator bus is owned by another mode.
    #[error("actuators busy: held by {held_by}")]
    ActuatorBusy {
        /// Current owner.
        held_by: LeaseMode,
    },

    /// Calibration could not be loaded.
    #[error("calibration: {0}")]
    Calibration(String),
}

impl ControlError {
    /// Creates an invalid config error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Returns true for errors the control loop absorbs per tick.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingLandmarks { .. } | Self::OutOfRangeCommand { .. }
        )
    }
}

impl From<HandError> for ControlError {
    fn from(err: HandError) -> Self {
        match err {
            HandError::ActuatorBusy { held_by, .. } => Self::ActuatorBusy { held_by },
            other => Self::Calibration(other.to_string()),
        }
    }
}

impl From<CalibrationError> for ControlError {
    fn from(err: CalibrationError) -> Self {
        match err {
            CalibrationError::IncompleteCalibration { missing } => {
                Self::IncompleteCalibration { missing }
            }
            CalibrationError::ActuatorBusy { held_by } => Self::ActuatorBusy { held_by },
            other => Self::Calibration(other.to_string()),
        }
    }
}

/// Result type for control operations.
pub type Result<T> = std::result::Result<T, ControlError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_split() {
        assert!(ControlError::MissingLandmarks {
            required: 20,
            available: 3
        }
        .is_recoverable());
        assert!(!ControlError::IncompleteCalibration { missing: vec![] }.is_recoverable());
        assert!(!ControlError::invalid_config("x").is_recoverable());
    }

    #[test]
    fn incomplete_calibration_keeps_its_identity() {
        let err: ControlError = CalibrationError::IncompleteCalibration {
            missing: vec![JointId::IndexMcp],
        }
        .into();
        assert_eq!(
            err,
            ControlError::IncompleteCalibration {
                missing: vec![JointId::IndexMcp]
            }
        );
    }
}
