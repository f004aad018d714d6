//! Control channel configuration.
//!
//! # Example
//!
//! ```
//! use hand_link::LinkConfig;
//! use std::time::Duration;
//!
//! let config = LinkConfig::default()
//!     .with_queue_capacity(2)
//!     .with_handshake_timeout(Duration::from_millis(500));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.max_frame_len(), 64 * 1024);
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Largest frame either side accepts.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 7878;

/// Network parameters shared by both ends of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Address the actuation side listens on and the sensing side dials.
    addr: SocketAddr,
    /// Time allowed for the hello exchange.
    #[serde(rename = "handshake_timeout_ms", with = "duration_ms")]
    handshake_timeout: Duration,
    /// Frame size limit.
    max_frame_len: usize,
    /// Sender-side frame queue capacity.
    queue_capacity: usize,
    /// Frames buffered between the reader task and the control loop.
    inbound_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            handshake_timeout: Duration::from_secs(2),
            max_frame_len: MAX_FRAME_LEN,
            queue_capacity: 4,
            inbound_capacity: 64,
        }
    }
}

impl LinkConfig {
    /// Sets the address.
    #[must_use]
    pub const fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the handshake timeout.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the frame size limit.
    #[must_use]
    pub const fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Sets the sender queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the inbound buffer capacity.
    #[must_use]
    pub const fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self
    }

    /// Listen/dial address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Frame size limit.
    #[must_use]
    pub const fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Sender queue capacity.
    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Inbound buffer capacity.
    #[must_use]
    pub const fn inbound_capacity(&self) -> usize {
        self.inbound_capacity
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidConfig`] if a parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.handshake_timeout.is_zero() {
            return Err(LinkError::invalid_config("handshake_timeout must be non-zero"));
        }
        if self.max_frame_len < 256 || self.max_frame_len > MAX_FRAME_LEN {
            return Err(LinkError::invalid_config(format!(
                "max_frame_len must be in 256..={MAX_FRAME_LEN}, got {}",
                self.max_frame_len
            )));
        }
        if self.queue_capacity == 0 {
            return Err(LinkError::invalid_config("queue_capacity must be at least 1"));
        }
        if self.inbound_capacity == 0 {
            return Err(LinkError::invalid_config("inbound_capacity must be at least 1"));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LinkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.addr().port(), DEFAULT_PORT);
    }

    #[test]
    fn oversized_frames_rejected() {
        let config = LinkConfig::default().with_max_frame_len(MAX_FRAME_LEN + 1);
        assert!(matches!(
            config.validate(),
            Err(LinkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(LinkConfig::default().with_queue_capacity(0).validate().is_err());
        assert!(LinkConfig::default().with_inbound_capacity(0).validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let config: LinkConfig = toml::from_str(
            r#"
            addr = "0.0.0.0:9000"
            handshake_timeout_ms = 750
            "#,
        )
        .unwrap();
        assert_eq!(config.addr().port(), 9000);
        assert_eq!(config.handshake_timeout(), Duration::from_millis(750));
        assert_eq!(config.queue_capacity(), 4);
    }
}
