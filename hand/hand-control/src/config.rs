//! Control loop configuration.
//!
//! # Example
//!
//! ```
//! use hand_control::ControlConfig;
//! use std::time::Duration;
//!
//! let config = ControlConfig::default()
//!     .with_tick_hz(100)
//!     .with_smoothing_tau(Duration::ZERO)
//!     .with_grace(Duration::from_millis(150));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.max_slew_per_tick(), 100);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Shaping and timing parameters for the actuation side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Control tick rate.
    tick_hz: u32,
    /// Exponential smoothing time constant over flexion.
    #[serde(rename = "smoothing_tau_ms", with = "duration_ms")]
    smoothing_tau: Duration,
    /// Maximum pulse change per second.
    max_slew_us_per_sec: u32,
    /// Silence after which the last command is held.
    #[serde(rename = "grace_ms", with = "duration_ms")]
    grace: Duration,
    /// Silence after which joints decay toward neutral.
    #[serde(rename = "decay_ms", with = "duration_ms")]
    decay: Duration,
    /// Flexion of the neutral-safe pose.
    neutral_flexion: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_hz: 50,
            smoothing_tau: Duration::from_millis(60),
            max_slew_us_per_sec: 10_000,
            grace: Duration::from_millis(250),
            decay: Duration::from_secs(2),
            neutral_flexion: 0.0,
        }
    }
}

impl ControlConfig {
    /// Sets the control tick rate.
    #[must_use]
    pub const fn with_tick_hz(mut self, tick_hz: u32) -> Self {
        self.tick_hz = tick_hz;
        self
    }

    /// Sets the smoothing time constant. Zero disables smoothing.
    #[must_use]
    pub const fn with_smoothing_tau(mut self, tau: Duration) -> Self {
        self.smoothing_tau = tau;
        self
    }

    /// Sets the slew limit.
    #[must_use]
    pub const fn with_max_slew_us_per_sec(mut self, rate: u32) -> Self {
        self.max_slew_us_per_sec = rate;
        self
    }

    /// Sets the hold threshold.
    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Sets the decay threshold.
    #[must_use]
    pub const fn with_decay(mut self, decay: Duration) -> Self {
        self.decay = decay;
        self
    }

    /// Sets the neutral-safe flexion.
    #[must_use]
    pub const fn with_neutral_flexion(mut self, flexion: f32) -> Self {
        self.neutral_flexion = flexion;
        self
    }

    /// Control tick rate.
    #[must_use]
    pub const fn tick_hz(&self) -> u32 {
        self.tick_hz
    }

    /// Time between control ticks.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_hz.max(1)))
    }

    /// Smoothing time constant.
    #[must_use]
    pub const fn smoothing_tau(&self) -> Duration {
        self.smoothing_tau
    }

    /// Slew limit per second.
    #[must_use]
    pub const fn max_slew_us_per_sec(&self) -> u32 {
        self.max_slew_us_per_sec
    }

    /// Hold threshold.
    #[must_use]
    pub const fn grace(&self) -> Duration {
        self.grace
    }

    /// Decay threshold.
    #[must_use]
    pub const fn decay(&self) -> Duration {
        self.decay
    }

    /// Neutral-safe flexion.
    #[must_use]
    pub const fn neutral_flexion(&self) -> f32 {
        self.neutral_flexion
    }

    /// Smoothing factor per tick: `1 - exp(-dt / tau)`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn alpha(&self) -> f32 {
        let tau = self.smoothing_tau.as_secs_f64();
        if tau <= 0.0 {
            return 1.0;
        }
        let dt = 1.0 / f64::from(self.tick_hz.max(1));
        (1.0 - (-dt / tau).exp()) as f32
    }

    /// Largest pulse step between consecutive ticks, `floor(rate * dt)`.
    #[must_use]
    pub fn max_slew_per_tick(&self) -> u16 {
        let per_tick = self.max_slew_us_per_sec / self.tick_hz.max(1);
        u16::try_from(per_tick).unwrap_or(u16::MAX)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if a parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.tick_hz == 0 || self.tick_hz > 1000 {
            return Err(ControlError::invalid_config(format!(
                "tick_hz must be in 1..=1000, got {}",
                self.tick_hz
            )));
        }
        if self.max_slew_per_tick() == 0 {
            return Err(ControlError::invalid_config(
                "max_slew_us_per_sec allows no movement at this tick rate",
            ));
        }
        if self.grace >= self.decay {
            return Err(ControlError::invalid_config("grace must be shorter than decay"));
        }
        if !(0.0..=1.0).contains(&self.neutral_flexion) {
            return Err(ControlError::invalid_config(format!(
                "neutral_flexion must be in [0, 1], got {}",
                self.neutral_flexion
            )));
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
