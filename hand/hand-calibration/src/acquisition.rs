//! Operator-driven calibration acquisition.
//!
//! An [`Acquisition`] owns the actuator bus for its lifetime and walks the
//! operator through one procedure at a time:
//!
//! - [`begin_range`](Acquisition::begin_range): `Acknowledge(actuator)` per
//!   actuator. Commits `RangeCalibrated` once every wired actuator has a range.
//! - [`begin_tendon`](Acquisition::begin_tendon): `ConfirmJoint(joint)` per
//!   joint. Commits `TendonCalibrated` once every joint is calibrated.
//! - [`begin_verification`](Acquisition::begin_verification): `SweepStep`
//!   through the plan, then `Verdict`. Commits `Verified` on pass.
//!
//! During tendon calibration `Warmup(joint)` and `TestJoint(joint)` queue a
//! short motion that the operator plays with `SweepStep`, the same way the
//! verification sweep is played.
//!
//! Nothing is written until [`commit`](Acquisition::commit) succeeds. A
//! committed range stage parks every ranged actuator at its open pulse.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use hand_types::{
    ActuatorBus, ActuatorId, ActuatorLease, Finger, JointId, LeaseMode, PULSE_CEILING_US,
    PULSE_FLOOR_US,
};
use tracing::{debug, info, warn};

use crate::error::{CalibrationError, Result};
use crate::range::{ActuatorRange, JointCalibration};
use crate::record::{AcquisitionStage, CalibrationRecord};
use crate::store::CalibrationStore;

/// Pulse assumed for an actuator that has not been driven yet.
const START_PULSE_US: u16 = 1500;

/// The three acquisition procedures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcedureKind {
    /// Actuator range capture, tendons detached.
    Range,
    /// Joint taut/curled capture, tendons installed.
    Tendon,
    /// Replay sweep with operator verdict.
    Verification,
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range => write!(f, "range calibration"),
            Self::Tendon => write!(f, "tendon calibration"),
            Self::Verification => write!(f, "verification"),
        }
    }
}

/// One operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorEvent {
    /// Command an absolute pulse.
    Drive {
        /// Target actuator.
        actuator: ActuatorId,
        /// Requested pulse; clamped before it reaches the sink.
        pulse_us: u16,
    },
    /// Move relative to the last commanded pulse.
    Nudge {
        /// Target actuator.
        actuator: ActuatorId,
        /// Signed step.
        delta_us: i32,
    },
    /// Record the current pulse as the actuator's minimum.
    MarkMin(ActuatorId),
    /// Record the current pulse as the actuator's maximum.
    MarkMax(ActuatorId),
    /// Accept the marked range.
    Acknowledge(ActuatorId),
    /// Queue the warm-up cycle of a joint's actuator.
    Warmup(JointId),
    /// Record the current pulse as the joint's taut point.
    MarkTaut(JointId),
    /// Record the current pulse as the joint's curled point.
    MarkCurled(JointId),
    /// Record the current pulse as the joint's slack point.
    MarkSlack(JointId),
    /// Queue a replay of the joint's marked points.
    TestJoint(JointId),
    /// Accept the marked joint reference points.
    ConfirmJoint(JointId),
    /// Play the next queued position.
    SweepStep,
    /// Operator judgement of the sweep.
    Verdict(bool),
}

/// One commanded position of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepStep {
    /// Joint being exercised.
    pub joint: JointId,
    /// Its actuator.
    pub actuator: ActuatorId,
    /// Pulse to command.
    pub pulse_us: u16,
}

/// Ordered list of positions played one [`OperatorEvent::SweepStep`] at a
/// time.
///
/// Every arrival at a marked slack or taut point first stops
/// [`Self::BACKLASH_OVERSHOOT_US`] below it, so the horn always settles from
/// the same side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPlan {
    steps: Vec<SweepStep>,
}

impl SweepPlan {
    /// Approach distance below a target.
    pub const BACKLASH_OVERSHOOT_US: u16 = 50;

    /// Min, max, center repetitions of a warm-up.
    pub const WARMUP_CYCLES: usize = 3;

    /// Verification sweep: [`joint_test`](Self::joint_test) for every joint.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::IncompleteCalibration`] if any joint
    /// cannot be driven.
    pub fn for_record(record: &CalibrationRecord) -> Result<Self> {
        record.require_complete()?;
        let mut plan = Self { steps: Vec::new() };
        for joint in JointId::ALL {
            let actuator = joint.actuator();
            let (Some(range), Some(cal)) = (record.range(actuator), record.joint(joint)) else {
                continue;
            };
            plan.push_joint_test(joint, range, cal);
        }
        Ok(plan)
    }

    /// Exercises the actuator min, max and back to center, three times, so
    /// the servo is at working temperature before points are marked.
    #[must_use]
    pub fn warmup(joint: JointId, range: &ActuatorRange) -> Self {
        let mut plan = Self {
            steps: Vec::with_capacity(Self::WARMUP_CYCLES * 3),
        };
        for _ in 0..Self::WARMUP_CYCLES {
            plan.push(joint, range.min_pulse_us());
            plan.push(joint, range.max_pulse_us());
            plan.push(joint, range.center());
        }
        plan
    }

    /// Slack (when marked), taut, curled, back to taut.
    #[must_use]
    pub fn joint_test(joint: JointId, range: &ActuatorRange, cal: &JointCalibration) -> Self {
        let mut plan = Self {
            steps: Vec::with_capacity(7),
        };
        plan.push_joint_test(joint, range, cal);
        plan
    }

    fn push_joint_test(&mut self, joint: JointId, range: &ActuatorRange, cal: &JointCalibration) {
        if let Some(slack) = cal.slack_pulse_us() {
            self.approach(joint, range, slack);
        }
        self.approach(joint, range, cal.taut_pulse_us());
        self.push(joint, cal.curled_pulse_us());
        self.approach(joint, range, cal.taut_pulse_us());
    }

    fn approach(&mut self, joint: JointId, range: &ActuatorRange, target: u16) {
        self.push(joint, range.clamp(target.saturating_sub(Self::BACKLASH_OVERSHOOT_US)));
        self.push(joint, target);
    }

    fn push(&mut self, joint: JointId, pulse_us: u16) {
        self.steps.push(SweepStep {
            joint,
            actuator: joint.actuator(),
            pulse_us,
        });
    }

    /// Steps in play order.
    #[must_use]
    pub fn steps(&self) -> &[SweepStep] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Outcome of one handled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Pulse written to the sink, if any.
    pub commanded: Option<(ActuatorId, u16)>,
    /// Items still unconfirmed in the active procedure.
    pub remaining: usize,
}

#[derive(Debug, Default)]
struct RangeDraft {
    min: Option<u16>,
    max: Option<u16>,
    acknowledged: bool,
}

#[derive(Debug, Default)]
struct TendonDraft {
    taut: Option<u16>,
    curled: Option<u16>,
    slack: Option<u16>,
    confirmed: bool,
}

impl TendonDraft {
    fn calibration(&self, kind: ProcedureKind) -> Result<JointCalibration> {
        let (Some(taut), Some(curled)) = (self.taut, self.curled) else {
            return Err(CalibrationError::unexpected(kind, "taut and curled must both be marked"));
        };
        let cal = JointCalibration::new(taut, curled)?;
        match self.slack {
            Some(slack) => cal.with_slack(slack),
            None => Ok(cal),
        }
    }
}

/// A plan being played.
#[derive(Debug)]
struct Motion {
    plan: SweepPlan,
    cursor: usize,
}

impl Motion {
    const fn new(plan: SweepPlan) -> Self {
        Self { plan, cursor: 0 }
    }

    fn next_step(&mut self) -> Option<SweepStep> {
        let step = self.plan.steps().get(self.cursor).copied()?;
        self.cursor += 1;
        Some(step)
    }

    fn remaining(&self) -> usize {
        self.plan.len().saturating_sub(self.cursor)
    }
}

#[derive(Debug)]
enum Procedure {
    Range(BTreeMap<ActuatorId, RangeDraft>),
    Tendon {
        drafts: BTreeMap<JointId, TendonDraft>,
        motion: Option<Motion>,
    },
    Verification {
        sweep: Motion,
        verdict: Option<bool>,
    },
}

impl Procedure {
    const fn kind(&self) -> ProcedureKind {
        match self {
            Self::Range(_) => ProcedureKind::Range,
            Self::Tendon { .. } => ProcedureKind::Tendon,
            Self::Verification { .. } => ProcedureKind::Verification,
        }
    }

    fn remaining(&self) -> usize {
        match self {
            Self::Range(drafts) => drafts.values().filter(|d| !d.acknowledged).count(),
            Self::Tendon { drafts, .. } => drafts.values().filter(|d| !d.confirmed).count(),
            Self::Verification { sweep, verdict } => {
                sweep.remaining() + usize::from(verdict.is_none())
            }
        }
    }

    fn queued_steps(&self) -> usize {
        match self {
            Self::Range(_) => 0,
            Self::Tendon { motion, .. } => motion.as_ref().map_or(0, Motion::remaining),
            Self::Verification { sweep, .. } => sweep.remaining(),
        }
    }
}

/// Interactive acquisition session.
///
/// Holds the actuator bus in [`LeaseMode::Acquisition`]; while it lives no
/// control session can start. Dropping it releases every channel it drove.
///
/// # Example
///
/// ```
/// use hand_calibration::{Acquisition, CalibrationStore, OperatorEvent};
/// use hand_types::{ActuatorBus, JointId, SimulatedSink};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = CalibrationStore::new(dir.path().join("hand.json"));
/// let bus = ActuatorBus::new(SimulatedSink::new());
///
/// let mut acq = Acquisition::new(store, &bus).unwrap();
/// let ch = JointId::PinkyMcp.actuator();
/// acq.begin_range([ch]).unwrap();
/// for event in [
///     OperatorEvent::Drive { actuator: ch, pulse_us: 600 },
///     OperatorEvent::MarkMin(ch),
///     OperatorEvent::Drive { actuator: ch, pulse_us: 2400 },
///     OperatorEvent::MarkMax(ch),
///     OperatorEvent::Acknowledge(ch),
/// ] {
///     acq.handle(event).unwrap();
/// }
/// let record = acq.commit().unwrap();
/// assert_eq!(record.range(ch).unwrap().min_pulse_us(), 600);
/// ```
#[derive(Debug)]
pub struct Acquisition {
    store: CalibrationStore,
    record: CalibrationRecord,
    lease: ActuatorLease,
    procedure: Option<Procedure>,
    positions: BTreeMap<ActuatorId, u16>,
    driven: BTreeSet<ActuatorId>,
}

impl Acquisition {
    /// Takes the bus and loads the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::ActuatorBusy`] if a control session owns
    /// the bus, or any load failure from the store.
    pub fn new(store: CalibrationStore, bus: &Arc<ActuatorBus>) -> Result<Self> {
        let lease = bus.acquire(LeaseMode::Acquisition)?;
        let record = store.load()?;
        info!(
            path = %store.path().display(),
            stage = %record.stage(),
            revision = record.revision(),
            "calibration acquisition started"
        );
        Ok(Self {
            store,
            record,
            lease,
            procedure: None,
            positions: BTreeMap::new(),
            driven: BTreeSet::new(),
        })
    }

    /// Last committed record.
    #[must_use]
    pub const fn record(&self) -> &CalibrationRecord {
        &self.record
    }

    /// Committed stage.
    #[must_use]
    pub const fn stage(&self) -> AcquisitionStage {
        self.record.stage()
    }

    /// Active procedure, if any.
    #[must_use]
    pub fn active(&self) -> Option<ProcedureKind> {
        self.procedure.as_ref().map(Procedure::kind)
    }

    /// Items still unconfirmed in the active procedure.
    #[must_use]
    pub fn remaining(&self) -> Option<usize> {
        self.procedure.as_ref().map(Procedure::remaining)
    }

    /// Positions left to play with [`OperatorEvent::SweepStep`].
    #[must_use]
    pub fn queued_steps(&self) -> usize {
        self.procedure.as_ref().map_or(0, Procedure::queued_steps)
    }

    /// Last pulse commanded on `actuator` during this session.
    #[must_use]
    pub fn position(&self, actuator: ActuatorId) -> Option<u16> {
        self.positions.get(&actuator).copied()
    }

    /// Sweep being played, during verification.
    #[must_use]
    pub fn sweep_plan(&self) -> Option<&SweepPlan> {
        match &self.procedure {
            Some(Procedure::Verification { sweep, .. }) => Some(&sweep.plan),
            _ => None,
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.active() {
            Some(kind) => Err(CalibrationError::ProcedureActive(kind)),
            None => Ok(()),
        }
    }

    /// Starts range capture for `actuators`.
    ///
    /// # Errors
    ///
    /// Fails if a procedure is already active or no actuator is named.
    pub fn begin_range(&mut self, actuators: impl IntoIterator<Item = ActuatorId>) -> Result<()> {
        self.ensure_idle()?;
        let drafts: BTreeMap<_, _> = actuators
            .into_iter()
            .map(|a| (a, RangeDraft::default()))
            .collect();
        if drafts.is_empty() {
            return Err(CalibrationError::unexpected(
                ProcedureKind::Range,
                "no actuators requested",
            ));
        }
        info!(actuators = drafts.len(), "range calibration begun");
        self.procedure = Some(Procedure::Range(drafts));
        Ok(())
    }

    /// Starts tendon capture for `joints`.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::CalibrationOrderViolation`] if any joint's
    /// actuator has no committed range. Nothing changes in that case.
    pub fn begin_tendon(&mut self, joints: impl IntoIterator<Item = JointId>) -> Result<()> {
        self.ensure_idle()?;
        let mut drafts = BTreeMap::new();
        for joint in joints {
            let actuator = joint.actuator();
            if self.record.range(actuator).is_none() {
                return Err(CalibrationError::order_violation(
                    ProcedureKind::Tendon,
                    format!("a committed range for {actuator} ({joint})"),
                ));
            }
            drafts.insert(joint, TendonDraft::default());
        }
        if drafts.is_empty() {
            return Err(CalibrationError::unexpected(
                ProcedureKind::Tendon,
                "no joints requested",
            ));
        }
        info!(joints = drafts.len(), "tendon calibration begun");
        self.procedure = Some(Procedure::Tendon {
            drafts,
            motion: None,
        });
        Ok(())
    }

    /// Starts the verification sweep.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::CalibrationOrderViolation`] unless tendon
    /// calibration is committed for every joint.
    pub fn begin_verification(&mut self) -> Result<()> {
        self.ensure_idle()?;
        if self.record.stage() < AcquisitionStage::TendonCalibrated || !self.record.is_complete() {
            return Err(CalibrationError::order_violation(
                ProcedureKind::Verification,
                "tendon calibration of every joint",
            ));
        }
        let plan = SweepPlan::for_record(&self.record)?;
        info!(steps = plan.len(), "verification sweep begun");
        self.procedure = Some(Procedure::Verification {
            sweep: Motion::new(plan),
            verdict: None,
        });
        Ok(())
    }

    /// Applies one operator event to the active procedure.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::NoProcedure`] when idle, or
    /// [`CalibrationError::UnexpectedEvent`] when the event does not fit the
    /// procedure. A rejected event changes nothing.
    pub fn handle(&mut self, event: OperatorEvent) -> Result<Progress> {
        let mut procedure = self.procedure.take().ok_or(CalibrationError::NoProcedure)?;
        let result = self.apply(&mut procedure, event);
        let remaining = procedure.remaining();
        self.procedure = Some(procedure);
        let commanded = result?;
        debug!(?event, ?commanded, remaining, "operator event");
        Ok(Progress {
            commanded,
            remaining,
        })
    }

    fn apply(
        &mut self,
        procedure: &mut Procedure,
        event: OperatorEvent,
    ) -> Result<Option<(ActuatorId, u16)>> {
        let kind = procedure.kind();
        match procedure {
            Procedure::Range(drafts) => self.apply_range(drafts, event),
            Procedure::Tendon { drafts, motion } => self.apply_tendon(drafts, motion, event),
            Procedure::Verification { sweep, verdict } => match event {
                OperatorEvent::SweepStep => {
                    let step = sweep.next_step().ok_or_else(|| {
                        CalibrationError::unexpected(kind, "sweep already finished")
                    })?;
                    Ok(Some(self.drive(step.actuator, step.pulse_us)))
                }
                OperatorEvent::Verdict(pass) => {
                    if pass && sweep.remaining() > 0 {
                        return Err(CalibrationError::unexpected(
                            kind,
                            "cannot pass before the sweep finishes",
                        ));
                    }
                    *verdict = Some(pass);
                    Ok(None)
                }
                other => Err(CalibrationError::unexpected(kind, format!("{other:?}"))),
            },
        }
    }

    fn apply_range(
        &mut self,
        drafts: &mut BTreeMap<ActuatorId, RangeDraft>,
        event: OperatorEvent,
    ) -> Result<Option<(ActuatorId, u16)>> {
        let kind = ProcedureKind::Range;
        let not_requested =
            |a: ActuatorId| CalibrationError::unexpected(kind, format!("{a} not in procedure"));
        match event {
            OperatorEvent::Drive { actuator, pulse_us } => {
                if !drafts.contains_key(&actuator) {
                    return Err(not_requested(actuator));
                }
                let pulse = pulse_us.clamp(PULSE_FLOOR_US, PULSE_CEILING_US);
                Ok(Some(self.drive(actuator, pulse)))
            }
            OperatorEvent::Nudge { actuator, delta_us } => {
                if !drafts.contains_key(&actuator) {
                    return Err(not_requested(actuator));
                }
                let base = self.position(actuator).unwrap_or(START_PULSE_US);
                let pulse = offset(base, delta_us, PULSE_FLOOR_US, PULSE_CEILING_US);
                Ok(Some(self.drive(actuator, pulse)))
            }
            OperatorEvent::MarkMin(actuator) | OperatorEvent::MarkMax(actuator) => {
                let draft = drafts.get_mut(&actuator).ok_or_else(|| not_requested(actuator))?;
                let pulse = self.position(actuator).ok_or_else(|| {
                    CalibrationError::unexpected(kind, format!("{actuator} not driven yet"))
                })?;
                if matches!(event, OperatorEvent::MarkMin(_)) {
                    draft.min = Some(pulse);
                } else {
                    draft.max = Some(pulse);
                }
                draft.acknowledged = false;
                Ok(None)
            }
            OperatorEvent::Acknowledge(actuator) => {
                let draft = drafts.get_mut(&actuator).ok_or_else(|| not_requested(actuator))?;
                let (Some(min), Some(max)) = (draft.min, draft.max) else {
                    return Err(CalibrationError::unexpected(
                        kind,
                        format!("{actuator} needs min and max marks"),
                    ));
                };
                ActuatorRange::new(min, max)?;
                draft.acknowledged = true;
                info!(%actuator, min, max, "range acknowledged");
                Ok(None)
            }
            other => Err(CalibrationError::unexpected(kind, format!("{other:?}"))),
        }
    }

    fn apply_tendon(
        &mut self,
        drafts: &mut BTreeMap<JointId, TendonDraft>,
        motion: &mut Option<Motion>,
        event: OperatorEvent,
    ) -> Result<Option<(ActuatorId, u16)>> {
        let kind = ProcedureKind::Tendon;
        let not_requested =
            |what: String| CalibrationError::unexpected(kind, format!("{what} not in procedure"));
        match event {
            OperatorEvent::Drive { actuator, pulse_us } => {
                let range = self
                    .tendon_range(drafts, actuator)
                    .ok_or_else(|| not_requested(actuator.to_string()))?;
                *motion = None;
                Ok(Some(self.drive(actuator, range.clamp(pulse_us))))
            }
            OperatorEvent::Nudge { actuator, delta_us } => {
                let range = self
                    .tendon_range(drafts, actuator)
                    .ok_or_else(|| not_requested(actuator.to_string()))?;
                let base = self.position(actuator).unwrap_or_else(|| range.center());
                let pulse = offset(base, delta_us, range.min_pulse_us(), range.max_pulse_us());
                *motion = None;
                Ok(Some(self.drive(actuator, pulse)))
            }
            OperatorEvent::Warmup(joint) => {
                let range = self
                    .tendon_range(drafts, joint.actuator())
                    .ok_or_else(|| not_requested(joint.to_string()))?;
                let plan = SweepPlan::warmup(joint, &range);
                info!(%joint, steps = plan.len(), "warm-up queued");
                *motion = Some(Motion::new(plan));
                Ok(None)
            }
            OperatorEvent::TestJoint(joint) => {
                let draft = drafts.get(&joint).ok_or_else(|| not_requested(joint.to_string()))?;
                let cal = draft.calibration(kind)?;
                let range = self.check_fit(joint, &cal)?;
                let plan = SweepPlan::joint_test(joint, &range, &cal);
                info!(%joint, steps = plan.len(), "joint test queued");
                *motion = Some(Motion::new(plan));
                Ok(None)
            }
            OperatorEvent::SweepStep => {
                let step = motion
                    .as_mut()
                    .and_then(Motion::next_step)
                    .ok_or_else(|| CalibrationError::unexpected(kind, "no motion queued"))?;
                if motion.as_ref().is_some_and(|m| m.remaining() == 0) {
                    *motion = None;
                }
                Ok(Some(self.drive(step.actuator, step.pulse_us)))
            }
            OperatorEvent::MarkTaut(joint)
            | OperatorEvent::MarkCurled(joint)
            | OperatorEvent::MarkSlack(joint) => {
                let draft = drafts
                    .get_mut(&joint)
                    .ok_or_else(|| not_requested(joint.to_string()))?;
                let actuator = joint.actuator();
                let pulse = self.position(actuator).ok_or_else(|| {
                    CalibrationError::unexpected(kind, format!("{actuator} not driven yet"))
                })?;
                match event {
                    OperatorEvent::MarkTaut(_) => draft.taut = Some(pulse),
                    OperatorEvent::MarkCurled(_) => draft.curled = Some(pulse),
                    _ => draft.slack = Some(pulse),
                }
                draft.confirmed = false;
                Ok(None)
            }
            OperatorEvent::ConfirmJoint(joint) => {
                let draft = drafts
                    .get_mut(&joint)
                    .ok_or_else(|| not_requested(joint.to_string()))?;
                let cal = draft.calibration(kind)?;
                self.check_fit(joint, &cal)?;
                draft.confirmed = true;
                info!(
                    %joint,
                    taut = cal.taut_pulse_us(),
                    curled = cal.curled_pulse_us(),
                    "joint confirmed"
                );
                Ok(None)
            }
            other => Err(CalibrationError::unexpected(kind, format!("{other:?}"))),
        }
    }

    /// Committed range of `actuator` if it drives one of the joints in `drafts`.
    fn tendon_range(
        &self,
        drafts: &BTreeMap<JointId, TendonDraft>,
        actuator: ActuatorId,
    ) -> Option<ActuatorRange> {
        drafts
            .keys()
            .any(|j| j.actuator() == actuator)
            .then(|| self.record.range(actuator).copied())
            .flatten()
    }

    /// The joint's committed range, provided every marked pulse lies in it.
    fn check_fit(&self, joint: JointId, cal: &JointCalibration) -> Result<ActuatorRange> {
        let actuator = joint.actuator();
        let range = *self
            .record
            .range(actuator)
            .ok_or(CalibrationError::MissingRange { joint, actuator })?;
        match cal.pulses().find(|p| !range.contains(*p)) {
            Some(pulse) => Err(CalibrationError::JointOutsideRange {
                joint,
                pulse,
                min: range.min_pulse_us(),
                max: range.max_pulse_us(),
            }),
            None => Ok(range),
        }
    }

    fn drive(&mut self, actuator: ActuatorId, pulse_us: u16) -> (ActuatorId, u16) {
        self.lease.set_channel_pulse(actuator, pulse_us);
        self.positions.insert(actuator, pulse_us);
        self.driven.insert(actuator);
        (actuator, pulse_us)
    }

    /// Moves every ranged actuator to its open pulse, the starting pose for
    /// tendon installation.
    fn park_open(&mut self) {
        let targets: Vec<(ActuatorId, u16)> = self
            .record
            .ranges()
            .iter()
            .map(|(actuator, range)| (*actuator, open_pulse(*actuator, range)))
            .collect();
        for (actuator, pulse) in &targets {
            self.drive(*actuator, *pulse);
        }
        info!(actuators = targets.len(), "actuators parked open");
    }

    /// Persists the active procedure's results as a new revision.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::StageIncomplete`] if any item is
    /// unconfirmed, or a store failure. On error the stored record and the
    /// active procedure are unchanged, so the operator may finish and retry
    /// or [`abort`](Self::abort).
    pub fn commit(&mut self) -> Result<&CalibrationRecord> {
        let procedure = self.procedure.as_ref().ok_or(CalibrationError::NoProcedure)?;
        let pending = procedure.remaining();
        if pending > 0 {
            return Err(CalibrationError::StageIncomplete {
                procedure: procedure.kind(),
                pending,
            });
        }

        let mut next = self.record.clone();
        match procedure {
            Procedure::Range(drafts) => {
                let mut ranges = Vec::with_capacity(drafts.len());
                for (actuator, draft) in drafts {
                    let (Some(min), Some(max)) = (draft.min, draft.max) else {
                        return Err(CalibrationError::StageIncomplete {
                            procedure: ProcedureKind::Range,
                            pending: 1,
                        });
                    };
                    ranges.push((*actuator, ActuatorRange::new(min, max)?));
                }
                next.set_ranges(ranges);
                for joint in next.prune_joints() {
                    warn!(%joint, "joint calibration no longer fits new range, dropped");
                }
                next.set_verified(false);
                next.set_stage(range_stage(&next));
            }
            Procedure::Tendon { drafts, .. } => {
                let mut joints = Vec::with_capacity(drafts.len());
                for (joint, draft) in drafts {
                    joints.push((*joint, draft.calibration(ProcedureKind::Tendon)?));
                }
                next.set_joints(joints);
                next.set_verified(false);
                next.set_stage(if next.is_complete() {
                    AcquisitionStage::TendonCalibrated
                } else {
                    range_stage(&next)
                });
            }
            Procedure::Verification { verdict, .. } => {
                let pass = verdict.unwrap_or(false);
                next.set_verified(pass);
                next.set_stage(if pass {
                    AcquisitionStage::Verified
                } else {
                    AcquisitionStage::TendonCalibrated
                });
            }
        }
        next.bump(Utc::now());

        let kind = procedure.kind();
        self.store.save(&next)?;
        self.record = next;
        self.procedure = None;
        info!(
            procedure = %kind,
            stage = %self.record.stage(),
            revision = self.record.revision(),
            "stage committed"
        );
        if kind == ProcedureKind::Range {
            self.park_open();
        }
        Ok(&self.record)
    }

    /// Discards the active procedure without touching the store.
    pub fn abort(&mut self) -> Option<ProcedureKind> {
        let kind = self.procedure.take().map(|p| p.kind());
        if let Some(kind) = kind {
            info!(procedure = %kind, "procedure aborted");
        }
        kind
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        for actuator in &self.driven {
            self.lease.release(*actuator);
        }
    }
}

/// `RangeCalibrated` only once every wired actuator has a range.
fn range_stage(record: &CalibrationRecord) -> AcquisitionStage {
    if ActuatorId::wired().all(|a| record.range(a).is_some()) {
        AcquisitionStage::RangeCalibrated
    } else {
        AcquisitionStage::Uninitialized
    }
}

/// Thumb servos open at the top of their range, finger servos at the bottom.
fn open_pulse(actuator: ActuatorId, range: &ActuatorRange) -> u16 {
    let thumb = JointId::ALL
        .into_iter()
        .any(|j| j.actuator() == actuator && j.finger() == Finger::Thumb);
    if thumb {
        range.max_pulse_us()
    } else {
        range.min_pulse_us()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn offset(base: u16, delta_us: i32, lo: u16, hi: u16) -> u16 {
    (i32::from(base) + delta_us).clamp(i32::from(lo), i32::from(hi)) as u16
}
