//! Actuation-side tick: shaper output written to the actuator bus.

use std::sync::Arc;

use hand_calibration::CalibrationSnapshot;
use hand_types::{ActuatorBus, ActuatorLease, JointMap, LeaseMode, PoseFrame, Timestamp};
use tracing::{info, warn};

use crate::config::ControlConfig;
use crate::error::Result;
use crate::mapper::{CommandMapper, PulseCommand};
use crate::shaper::MotionShaper;

/// Live control of the hand for one session.
///
/// Owns the bus in [`LeaseMode::LiveControl`] until dropped, so calibration
/// acquisition cannot start while a session runs.
#[derive(Debug)]
pub struct ControlLoop {
    shaper: MotionShaper,
    lease: ActuatorLease,
    ticks: u64,
}

impl ControlLoop {
    /// Starts live control.
    ///
    /// The calibration is checked before the bus is taken, so an incomplete
    /// record never moves an actuator.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::IncompleteCalibration`](crate::ControlError::IncompleteCalibration),
    /// [`ControlError::InvalidConfig`](crate::ControlError::InvalidConfig), or
    /// [`ControlError::ActuatorBusy`](crate::ControlError::ActuatorBusy).
    pub fn new(
        config: ControlConfig,
        snapshot: CalibrationSnapshot,
        bus: &Arc<ActuatorBus>,
    ) -> Result<Self> {
        let mapper = CommandMapper::new(snapshot)?;
        if !mapper.snapshot().verified() {
            warn!(
                revision = mapper.revision(),
                "calibration has not passed a verification sweep"
            );
        }
        let shaper = MotionShaper::new(config, mapper)?;
        let lease = bus.acquire(LeaseMode::LiveControl)?;
        info!(
            revision = shaper.mapper().revision(),
            tick_hz = config.tick_hz(),
            "live control started"
        );
        Ok(Self {
            shaper,
            lease,
            ticks: 0,
        })
    }

    /// The shaper.
    #[must_use]
    pub const fn shaper(&self) -> &MotionShaper {
        &self.shaper
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Feeds a received frame.
    pub fn observe(&mut self, frame: &PoseFrame, now: Timestamp) {
        self.shaper.observe(frame, now);
    }

    /// Runs one tick and writes every resulting command.
    pub fn tick(&mut self, now: Timestamp) -> JointMap<Option<PulseCommand>> {
        self.ticks += 1;
        let commands = self.shaper.tick(now);
        for (_, command) in commands.iter() {
            if let Some(cmd) = command {
                self.lease.set_channel_pulse(cmd.actuator, cmd.pulse_us);
            }
        }
        commands
    }

    /// Writes the neutral-safe pose to every actuator.
    pub fn drive_neutral(&mut self) -> JointMap<PulseCommand> {
        let commands = self.shaper.drive_neutral();
        for (_, cmd) in commands.iter() {
            self.lease.set_channel_pulse(cmd.actuator, cmd.pulse_us);
        }
        commands
    }
}
