//! The persisted calibration aggregate and its frozen snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hand_types::{ActuatorId, JointId};
use serde::{Deserialize, Serialize};

use crate::error::{CalibrationError, Result};
use crate::range::{ActuatorRange, JointCalibration};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// How far acquisition has progressed.
///
/// Ordered: later stages compare greater.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionStage {
    /// Nothing captured.
    #[default]
    Uninitialized,
    /// Actuator ranges captured.
    RangeCalibrated,
    /// Every joint has taut/curled reference points.
    TendonCalibrated,
    /// Operator confirmed a verification sweep.
    Verified,
}

impl fmt::Display for AcquisitionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::RangeCalibrated => "range calibrated",
            Self::TendonCalibrated => "tendon calibrated",
            Self::Verified => "verified",
        };
        f.write_str(name)
    }
}

/// All calibration for one hand.
///
/// Only [`Acquisition`](crate::Acquisition) advances the stage; the
/// builder methods here exist for loading fixtures and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    schema_version: u32,
    revision: u64,
    stage: AcquisitionStage,
    #[serde(default)]
    ranges: BTreeMap<ActuatorId, ActuatorRange>,
    #[serde(default)]
    joints: BTreeMap<JointId, JointCalibration>,
    #[serde(default)]
    verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified_at: Option<DateTime<Utc>>,
}

impl Default for CalibrationRecord {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            revision: 0,
            stage: AcquisitionStage::Uninitialized,
            ranges: BTreeMap::new(),
            joints: BTreeMap::new(),
            verified: false,
            modified_at: None,
        }
    }
}

impl CalibrationRecord {
    /// Empty, uninitialized record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an actuator range.
    #[must_use]
    pub fn with_range(mut self, actuator: ActuatorId, range: ActuatorRange) -> Self {
        self.ranges.insert(actuator, range);
        self
    }

    /// Adds or replaces a joint calibration.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::MissingRange`] if the joint's actuator has
    /// no range, or [`CalibrationError::JointOutsideRange`] if a pulse does
    /// not fit it.
    pub fn with_joint(mut self, joint: JointId, calibration: JointCalibration) -> Result<Self> {
        check_joint(&self.ranges, joint, &calibration)?;
        self.joints.insert(joint, calibration);
        Ok(self)
    }

    /// Schema version the record was written with.
    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Number of committed stages since the record was created.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Acquisition stage.
    #[must_use]
    pub const fn stage(&self) -> AcquisitionStage {
        self.stage
    }

    /// Result of the last verification sweep.
    #[must_use]
    pub const fn verified(&self) -> bool {
        self.verified
    }

    /// When the record was last committed.
    #[must_use]
    pub const fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    /// Range of `actuator`, if captured.
    #[must_use]
    pub fn range(&self, actuator: ActuatorId) -> Option<&ActuatorRange> {
        self.ranges.get(&actuator)
    }

    /// Calibration of `joint`, if captured.
    #[must_use]
    pub fn joint(&self, joint: JointId) -> Option<&JointCalibration> {
        self.joints.get(&joint)
    }

    /// All captured ranges.
    #[must_use]
    pub const fn ranges(&self) -> &BTreeMap<ActuatorId, ActuatorRange> {
        &self.ranges
    }

    /// All captured joint calibrations.
    #[must_use]
    pub const fn joints(&self) -> &BTreeMap<JointId, JointCalibration> {
        &self.joints
    }

    /// Joints lacking either a calibration or an actuator range.
    #[must_use]
    pub fn missing_joints(&self) -> Vec<JointId> {
        JointId::ALL
            .into_iter()
            .filter(|j| !self.joints.contains_key(j) || !self.ranges.contains_key(&j.actuator()))
            .collect()
    }

    /// Returns true if every joint can be driven.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_joints().is_empty()
    }

    /// Fails with [`CalibrationError::IncompleteCalibration`] unless complete.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn require_complete(&self) -> Result<()> {
        let missing = self.missing_joints();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CalibrationError::IncompleteCalibration { missing })
        }
    }

    /// Checks every cross-entry invariant.
    ///
    /// Per-entry invariants are enforced by [`ActuatorRange`] and
    /// [`JointCalibration`] themselves, including on deserialization.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(CalibrationError::UnsupportedSchema(self.schema_version));
        }
        for (joint, calibration) in &self.joints {
            check_joint(&self.ranges, *joint, calibration)?;
        }
        Ok(())
    }

    pub(crate) fn set_ranges(
        &mut self,
        ranges: impl IntoIterator<Item = (ActuatorId, ActuatorRange)>,
    ) {
        self.ranges.extend(ranges);
    }

    pub(crate) fn set_joints(
        &mut self,
        joints: impl IntoIterator<Item = (JointId, JointCalibration)>,
    ) {
        self.joints.extend(joints);
    }

    /// Drops joint calibrations that no longer fit their actuator's range.
    pub(crate) fn prune_joints(&mut self) -> Vec<JointId> {
        let ranges = &self.ranges;
        let dropped: Vec<JointId> = self
            .joints
            .iter()
            .filter(|(joint, cal)| {
                ranges
                    .get(&joint.actuator())
                    .is_none_or(|range| !cal.fits(range))
            })
            .map(|(joint, _)| *joint)
            .collect();
        for joint in &dropped {
            self.joints.remove(joint);
        }
        dropped
    }

    pub(crate) const fn set_stage(&mut self, stage: AcquisitionStage) {
        self.stage = stage;
    }

    pub(crate) const fn set_verified(&mut self, verified: bool) {
        self.verified = verified;
    }

    /// Marks the record as a new revision written at `now`.
    pub(crate) fn bump(&mut self, now: DateTime<Utc>) {
        self.revision += 1;
        self.modified_at = Some(now);
    }

    /// Freezes the record for a control session.
    #[must_use]
    pub fn snapshot(self) -> CalibrationSnapshot {
        CalibrationSnapshot(Arc::new(self))
    }
}

fn check_joint(
    ranges: &BTreeMap<ActuatorId, ActuatorRange>,
    joint: JointId,
    calibration: &JointCalibration,
) -> Result<()> {
    let actuator = joint.actuator();
    let range = ranges
        .get(&actuator)
        .ok_or(CalibrationError::MissingRange { joint, actuator })?;
    match calibration.pulses().find(|p| !range.contains(*p)) {
        Some(pulse) => Err(CalibrationError::JointOutsideRange {
            joint,
            pulse,
            min: range.min_pulse_us(),
            max: range.max_pulse_us(),
        }),
        None => Ok(()),
    }
}

/// Immutable, shared view of one record revision.
///
/// A control session holds one snapshot for its whole lifetime, so a
/// concurrent calibration commit never changes commands mid-session.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSnapshot(Arc<CalibrationRecord>);

impl CalibrationSnapshot {
    /// Revision this snapshot was taken at.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.0.revision
    }

    /// The frozen record.
    #[must_use]
    pub fn record(&self) -> &CalibrationRecord {
        &self.0
    }
}

impl Deref for CalibrationSnapshot {
    type Target = CalibrationRecord;

    fn deref(&self) -> &CalibrationRecord {
        &self.0
    }
}

impl From<CalibrationRecord> for CalibrationSnapshot {
    fn from(record: CalibrationRecord) -> Self {
        record.snapshot()
    }
}
