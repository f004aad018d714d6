//! Time types for pose frames and control ticks.
//!
//! Provides microsecond-precision monotonic timestamps. The sensing side
//! stamps frames with its own clock; the actuation side only ever compares
//! stamps from the same session, so the epoch is irrelevant.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Microsecond-precision timestamp.
///
/// # Example
///
/// ```
/// use hand_types::Timestamp;
///
/// let ts = Timestamp::from_secs_f64(1.5);
/// assert_eq!(ts.as_micros(), 1_500_000);
///
/// let later = ts + std::time::Duration::from_millis(20);
/// assert_eq!(later.saturating_since(ts).as_millis(), 20);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp {
    /// Microseconds since session or clock start.
    micros: u64,
}

impl Timestamp {
    /// Creates a timestamp from microseconds.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self { micros }
    }

    /// Creates a timestamp from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self {
            micros: millis * 1_000,
        }
    }

    /// Creates a timestamp from seconds (floating point).
    ///
    /// Negative inputs saturate to zero.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn from_secs_f64(secs: f64) -> Self {
        let micros = (secs * 1e6).round().max(0.0) as u64;
        Self { micros }
    }

    /// Creates a timestamp from elapsed time since some origin.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_elapsed(elapsed: Duration) -> Self {
        Self {
            micros: elapsed.as_micros() as u64,
        }
    }

    /// Returns the timestamp as microseconds.
    #[must_use]
    pub const fn as_micros(self) -> u64 {
        self.micros
    }

    /// Returns the timestamp as seconds (floating point).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_secs_f64(self) -> f64 {
        self.micros as f64 / 1e6
    }

    /// Returns the zero timestamp.
    #[must_use]
    pub const fn zero() -> Self {
        Self { micros: 0 }
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    #[must_use]
    pub const fn saturating_since(self, earlier: Self) -> Duration {
        Duration::from_micros(self.micros.saturating_sub(earlier.micros))
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Self;

    #[allow(clippy::cast_possible_truncation)]
    fn add(self, rhs: Duration) -> Self {
        Self {
            micros: self.micros.saturating_add(rhs.as_micros() as u64),
        }
    }
}

impl std::ops::AddAssign<Duration> for Timestamp {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_from_secs_f64() {
        let ts = Timestamp::from_secs_f64(1.5);
        assert_eq!(ts.as_micros(), 1_500_000);
        assert_eq!(Timestamp::from_secs_f64(-3.0), Timestamp::zero());
    }

    #[test]
    fn timestamp_ordering() {
        let a = Timestamp::from_millis(10);
        let b = Timestamp::from_millis(20);
        assert!(a < b);
        assert_eq!(b.saturating_since(a), Duration::from_millis(10));
        assert_eq!(a.saturating_since(b), Duration::ZERO);
    }

    #[test]
    fn timestamp_add_duration() {
        let mut ts = Timestamp::from_micros(5);
        ts += Duration::from_micros(10);
        assert_eq!(ts.as_micros(), 15);
        assert_eq!(
            Timestamp::from_elapsed(Duration::from_millis(3)),
            Timestamp::from_millis(3)
        );
    }

    #[test]
    fn timestamp_serialization() {
        let ts = Timestamp::from_micros(1_234);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "1234");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
