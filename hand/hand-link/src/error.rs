//! Error types for hand-link crate.

use std::fmt;

use hand_calibration::CalibrationError;
use hand_control::ControlError;
use thiserror::Error;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer said goodbye.
    Goodbye,
    /// The peer closed the stream without a goodbye.
    PeerClosed,
    /// The transport failed.
    Transport(String),
    /// The local side is shutting down.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Goodbye => write!(f, "goodbye"),
            Self::PeerClosed => write!(f, "peer closed"),
            Self::Transport(reason) => write!(f, "transport error: {reason}"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Errors from the control channel.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The channel closed.
    #[error("channel disconnected: {0}")]
    ChannelDisconnected(DisconnectReason),

    /// Hello exchange failed or was refused.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Live control could not start.
    #[error(transparent)]
    Control(#[from] ControlError),

    /// The calibration file could not be read.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// A peer did not answer in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// Configuration parameter out of range.
    #[error("invalid link config: {0}")]
    InvalidConfig(String),
}

impl LinkError {
    /// Creates a handshake error.
    #[must_use]
    pub fn handshake(reason: impl Into<String>) -> Self {
        Self::Handshake(reason.into())
    }

    /// Creates an invalid config error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Wraps a transport failure as a disconnect.
    #[must_use]
    pub fn transport(err: &std::io::Error) -> Self {
        Self::ChannelDisconnected(DisconnectReason::Transport(err.to_string()))
    }
}

/// Result type for hand-link operations.
pub type Result<T> = std::result::Result<T, LinkError>;
