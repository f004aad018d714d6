//! Flexion to pulse-width mapping.

use hand_calibration::{ActuatorRange, CalibrationSnapshot, JointCalibration};
use hand_types::{ActuatorId, JointId, JointMap};

use crate::error::{ControlError, Result};

/// A pulse ready for the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseCommand {
    /// Joint the command drives.
    pub joint: JointId,
    /// Channel to write.
    pub actuator: ActuatorId,
    /// Pulse to write, always inside the actuator's range.
    pub pulse_us: u16,
    /// Interpolation result before clamping.
    pub requested_us: i32,
}

impl PulseCommand {
    /// Returns the warning if the pulse had to be clamped.
    #[must_use]
    pub fn out_of_range(&self) -> Option<ControlError> {
        (self.requested_us != i32::from(self.pulse_us)).then_some(ControlError::OutOfRangeCommand {
            joint: self.joint,
            requested_us: self.requested_us,
            clamped_us: self.pulse_us,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Channel {
    actuator: ActuatorId,
    range: ActuatorRange,
    calibration: JointCalibration,
}

/// Linear taut-to-curled interpolation clamped to the actuator range.
///
/// Built once per session from a frozen snapshot; construction fails if
/// any joint is uncalibrated, so a live session can never meet a joint it
/// cannot drive.
///
/// # Example
///
/// ```
/// use hand_calibration::{ActuatorRange, CalibrationRecord, JointCalibration};
/// use hand_control::CommandMapper;
/// use hand_types::JointId;
///
/// let mut record = CalibrationRecord::new();
/// for joint in JointId::ALL {
///     record = record
///         .with_range(joint.actuator(), ActuatorRange::new(500, 2500).unwrap())
///         .with_joint(joint, JointCalibration::new(1000, 2000).unwrap())
///         .unwrap();
/// }
/// let mapper = CommandMapper::new(record.snapshot()).unwrap();
/// assert_eq!(mapper.map(JointId::IndexMcp, 0.5).pulse_us, 1500);
/// ```
#[derive(Debug, Clone)]
pub struct CommandMapper {
    snapshot: CalibrationSnapshot,
    channels: JointMap<Option<Channel>>,
}

impl CommandMapper {
    /// Creates a mapper over `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::IncompleteCalibration`] listing every joint
    /// without a calibration or actuator range.
    pub fn new(snapshot: CalibrationSnapshot) -> Result<Self> {
        snapshot.require_complete()?;
        let channels = JointMap::from_fn(|joint| {
            let actuator = joint.actuator();
            Some(Channel {
                actuator,
                range: *snapshot.range(actuator)?,
                calibration: *snapshot.joint(joint)?,
            })
        });
        Ok(Self { snapshot, channels })
    }

    /// Calibration revision this mapper was built from.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.snapshot.revision()
    }

    /// The frozen calibration.
    #[must_use]
    pub const fn snapshot(&self) -> &CalibrationSnapshot {
        &self.snapshot
    }

    /// Maps `flexion` for `joint`.
    ///
    /// `pulse = taut + flexion * (curled - taut)`, rounded to the nearest
    /// microsecond, then clamped to the actuator range. A non-finite
    /// flexion maps to the taut pulse.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn map(&self, joint: JointId, flexion: f32) -> PulseCommand {
        let Some(ch) = self.channels[joint] else {
            // `new` fills every slot.
            return PulseCommand {
                joint,
                actuator: joint.actuator(),
                pulse_us: 0,
                requested_us: 0,
            };
        };
        let taut = f32::from(ch.calibration.taut_pulse_us());
        let curled = f32::from(ch.calibration.curled_pulse_us());
        let flexion = if flexion.is_finite() { flexion } else { 0.0 };
        let raw = (taut + flexion * (curled - taut)).round();
        PulseCommand {
            joint,
            actuator: ch.actuator,
            pulse_us: ch.range.clamp_f32(raw),
            requested_us: raw as i32,
        }
    }

    /// Pulse of the neutral-safe pose for `joint`.
    #[must_use]
    pub fn neutral_pulse(&self, joint: JointId, neutral_flexion: f32) -> u16 {
        self.map(joint, neutral_flexion).pulse_us
    }

    /// Actuator range of `joint`.
    #[must_use]
    pub fn range(&self, joint: JointId) -> Option<ActuatorRange> {
        self.channels[joint].map(|ch| ch.range)
    }
}
