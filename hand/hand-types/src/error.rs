//! Error types for hand-types crate.

use thiserror::Error;

use crate::actuator::LeaseMode;

/// Errors that can occur when working with hand types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandError {
    /// Joint name does not match any known joint.
    #[error("unknown joint: {0}")]
    UnknownJoint(String),

    /// Actuator channel outside the driver's channel count.
    #[error("invalid actuator channel {channel} (driver has {max} channels)")]
    InvalidActuator {
        /// The rejected channel.
        channel: u8,
        /// Number of channels on the driver.
        max: u8,
    },

    /// The actuator sink is already owned by another mode.
    #[error("actuators busy: held by {held_by}, requested by {requested}")]
    ActuatorBusy {
        /// Mode currently holding the sink.
        held_by: LeaseMode,
        /// Mode that asked for it.
        requested: LeaseMode,
    },
}

impl HandError {
    /// Creates an unknown joint error.
    #[must_use]
    pub fn unknown_joint(name: impl Into<String>) -> Self {
        Self::UnknownJoint(name.into())
    }

    /// Creates an actuator busy error.
    #[must_use]
    pub const fn actuator_busy(held_by: LeaseMode, requested: LeaseMode) -> Self {
        Self::ActuatorBusy { held_by, requested }
    }
}

/// Result type for hand-types operations.
pub type Result<T> = std::result::Result<T, HandError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn error_unknown_joint() {
        let err = HandError::unknown_joint("index_dip");
        assert!(err.to_string().contains("unknown joint"));
        assert!(err.to_string().contains("index_dip"));
    }

    #[test]
    fn error_actuator_busy_names_both_modes() {
        let err = HandError::actuator_busy(LeaseMode::LiveControl, LeaseMode::Acquisition);
        let msg = err.to_string();
        assert!(msg.contains("live control"));
        assert!(msg.contains("acquisition"));
    }
}
