//! Validated pulse reference points.

use hand_types::{PULSE_CEILING_US, PULSE_FLOOR_US};
use serde::{Deserialize, Serialize};

use crate::error::{CalibrationError, Result};

const fn in_bounds(pulse: u16) -> bool {
    pulse >= PULSE_FLOOR_US && pulse <= PULSE_CEILING_US
}

/// Physical pulse extremes of one servo.
///
/// Invariant: `PULSE_FLOOR_US <= min < max <= PULSE_CEILING_US`, checked on
/// construction and on deserialization.
///
/// # Example
///
/// ```
/// use hand_calibration::ActuatorRange;
///
/// let range = ActuatorRange::new(550, 2450).unwrap();
/// assert_eq!(range.clamp(3000), 2450);
/// assert_eq!(range.center(), 1500);
/// assert!(ActuatorRange::new(2000, 1000).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr")]
pub struct ActuatorRange {
    min_pulse_us: u16,
    max_pulse_us: u16,
}

#[derive(Deserialize)]
struct RangeRepr {
    min_pulse_us: u16,
    max_pulse_us: u16,
}

impl TryFrom<RangeRepr> for ActuatorRange {
    type Error = CalibrationError;

    fn try_from(repr: RangeRepr) -> Result<Self> {
        Self::new(repr.min_pulse_us, repr.max_pulse_us)
    }
}

impl ActuatorRange {
    /// Creates a range.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidRange`] unless `min < max` and both
    /// lie within the physical pulse bounds.
    pub const fn new(min_pulse_us: u16, max_pulse_us: u16) -> Result<Self> {
        if min_pulse_us < max_pulse_us && in_bounds(min_pulse_us) && in_bounds(max_pulse_us) {
            Ok(Self {
                min_pulse_us,
                max_pulse_us,
            })
        } else {
            Err(CalibrationError::InvalidRange {
                min: min_pulse_us,
                max: max_pulse_us,
            })
        }
    }

    /// Lower extreme.
    #[must_use]
    pub const fn min_pulse_us(&self) -> u16 {
        self.min_pulse_us
    }

    /// Upper extreme.
    #[must_use]
    pub const fn max_pulse_us(&self) -> u16 {
        self.max_pulse_us
    }

    /// Midpoint.
    #[must_use]
    pub const fn center(&self) -> u16 {
        self.min_pulse_us + (self.max_pulse_us - self.min_pulse_us) / 2
    }

    /// Width of the range.
    #[must_use]
    pub const fn span(&self) -> u16 {
        self.max_pulse_us - self.min_pulse_us
    }

    /// Returns true if `pulse` lies inside the range (inclusive).
    #[must_use]
    pub const fn contains(&self, pulse: u16) -> bool {
        pulse >= self.min_pulse_us && pulse <= self.max_pulse_us
    }

    /// Clamps `pulse` into the range.
    #[must_use]
    pub fn clamp(&self, pulse: u16) -> u16 {
        pulse.clamp(self.min_pulse_us, self.max_pulse_us)
    }

    /// Clamps a signed or fractional request into the range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn clamp_f32(&self, pulse: f32) -> u16 {
        if pulse.is_nan() {
            return self.min_pulse_us;
        }
        pulse
            .round()
            .clamp(f32::from(self.min_pulse_us), f32::from(self.max_pulse_us)) as u16
    }
}

/// Direction in which a joint's pulse moves as it curls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Curled pulse is numerically greater than taut.
    Increasing,
    /// Curled pulse is numerically smaller than taut.
    Decreasing,
}

/// Tendon reference points of one joint.
///
/// `taut` maps to flexion 0.0 and `curled` to flexion 1.0. Either may be the
/// larger value depending on how the tendon is routed around the horn.
/// The optional slack pulse (tendon loose) is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JointRepr")]
pub struct JointCalibration {
    taut_pulse_us: u16,
    curled_pulse_us: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    slack_pulse_us: Option<u16>,
}

#[derive(Deserialize)]
struct JointRepr {
    taut_pulse_us: u16,
    curled_pulse_us: u16,
    #[serde(default)]
    slack_pulse_us: Option<u16>,
}

impl TryFrom<JointRepr> for JointCalibration {
    type Error = CalibrationError;

    fn try_from(repr: JointRepr) -> Result<Self> {
        let cal = Self::new(repr.taut_pulse_us, repr.curled_pulse_us)?;
        match repr.slack_pulse_us {
            Some(slack) => cal.with_slack(slack),
            None => Ok(cal),
        }
    }
}

impl JointCalibration {
    /// Creates a joint calibration.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidJoint`] if either pulse lies outside
    /// the physical bounds or the two are equal (no travel).
    pub const fn new(taut_pulse_us: u16, curled_pulse_us: u16) -> Result<Self> {
        if taut_pulse_us != curled_pulse_us
            && in_bounds(taut_pulse_us)
            && in_bounds(curled_pulse_us)
        {
            Ok(Self {
                taut_pulse_us,
                curled_pulse_us,
                slack_pulse_us: None,
            })
        } else {
            Err(CalibrationError::InvalidJoint {
                taut: taut_pulse_us,
                curled: curled_pulse_us,
            })
        }
    }

    /// Attaches a slack reference point.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidJoint`] if `slack` is outside the
    /// physical bounds.
    pub const fn with_slack(mut self, slack_pulse_us: u16) -> Result<Self> {
        if in_bounds(slack_pulse_us) {
            self.slack_pulse_us = Some(slack_pulse_us);
            Ok(self)
        } else {
            Err(CalibrationError::InvalidJoint {
                taut: self.taut_pulse_us,
                curled: self.curled_pulse_us,
            })
        }
    }

    /// Pulse at flexion 0.0.
    #[must_use]
    pub const fn taut_pulse_us(&self) -> u16 {
        self.taut_pulse_us
    }

    /// Pulse at flexion 1.0.
    #[must_use]
    pub const fn curled_pulse_us(&self) -> u16 {
        self.curled_pulse_us
    }

    /// Pulse where the tendon goes slack, if captured.
    #[must_use]
    pub const fn slack_pulse_us(&self) -> Option<u16> {
        self.slack_pulse_us
    }

    /// Mechanical polarity.
    #[must_use]
    pub const fn polarity(&self) -> Polarity {
        if self.curled_pulse_us > self.taut_pulse_us {
            Polarity::Increasing
        } else {
            Polarity::Decreasing
        }
    }

    /// All captured pulses.
    pub fn pulses(&self) -> impl Iterator<Item = u16> {
        [Some(self.taut_pulse_us), Some(self.curled_pulse_us), self.slack_pulse_us]
            .into_iter()
            .flatten()
    }

    /// Returns true if every captured pulse lies inside `range`.
    #[must_use]
    pub fn fits(&self, range: &ActuatorRange) -> bool {
        self.pulses().all(|p| range.contains(p))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn range_rejects_inverted_or_out_of_bounds() {
        assert!(ActuatorRange::new(1000, 1000).is_err());
        assert!(ActuatorRange::new(1200, 1100).is_err());
        assert!(ActuatorRange::new(399, 1100).is_err());
        assert!(ActuatorRange::new(500, 2801).is_err());
        assert!(ActuatorRange::new(PULSE_FLOOR_US, PULSE_CEILING_US).is_ok());
    }

    #[test]
    fn range_clamps() {
        let range = ActuatorRange::new(600, 2400).unwrap();
        assert_eq!(range.clamp(100), 600);
        assert_eq!(range.clamp(1500), 1500);
        assert_eq!(range.clamp_f32(2400.4), 2400);
        assert_eq!(range.clamp_f32(-5.0), 600);
        assert_eq!(range.clamp_f32(f32::NAN), 600);
        assert_eq!(range.span(), 1800);
    }

    #[test]
    fn range_deserialization_validates() {
        let ok: ActuatorRange =
            serde_json::from_str(r#"{"min_pulse_us":500,"max_pulse_us":2500}"#).unwrap();
        assert_eq!(ok.max_pulse_us(), 2500);
        let bad =
            serde_json::from_str::<ActuatorRange>(r#"{"min_pulse_us":2500,"max_pulse_us":500}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn joint_polarity_both_ways() {
        let fwd = JointCalibration::new(1000, 2000).unwrap();
        let rev = JointCalibration::new(2000, 1000).unwrap();
        assert_eq!(fwd.polarity(), Polarity::Increasing);
        assert_eq!(rev.polarity(), Polarity::Decreasing);
        assert!(JointCalibration::new(1500, 1500).is_err());
    }

    #[test]
    fn joint_fits_range() {
        let range = ActuatorRange::new(900, 2100).unwrap();
        let cal = JointCalibration::new(1000, 2000).unwrap();
        assert!(cal.fits(&range));
        let with_slack = cal.with_slack(850).unwrap();
        assert!(!with_slack.fits(&range));
    }

    #[test]
    fn joint_slack_roundtrips_through_json() {
        let cal = JointCalibration::new(1100, 1900).unwrap().with_slack(1000).unwrap();
        let json = serde_json::to_string(&cal).unwrap();
        let back: JointCalibration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cal);
    }
}
