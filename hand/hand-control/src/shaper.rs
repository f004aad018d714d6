//! Per-joint smoothing, slew limiting and missed-frame handling.
//!
//! The shaper runs once per control tick. For each joint it:
//!
//! 1. Picks a target flexion: the latest received value while frames keep
//!    arriving, nothing new during the hold window, the neutral flexion
//!    after the decay timeout.
//! 2. Smooths flexion toward the target (`smoothed += alpha * (target - smoothed)`).
//! 3. Maps the smoothed flexion to a pulse through the [`CommandMapper`].
//! 4. Limits the pulse step from the previous tick to `max_slew_per_tick`.
//!
//! Smoothing happens before mapping so the clamp at the calibrated extremes
//! stays exact.

use hand_types::{JointId, JointMap, PoseFrame, Timestamp};
use tracing::{debug, warn};

use crate::config::ControlConfig;
use crate::error::Result;
use crate::mapper::{CommandMapper, PulseCommand};

/// What a joint is doing on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointPhase {
    /// No frame received this session.
    Idle,
    /// Frames arriving within the grace interval.
    Tracking,
    /// Silent longer than grace: last command held.
    Holding,
    /// Silent longer than decay: moving toward neutral.
    Decaying,
}

/// Shaping memory of one joint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShaperState {
    /// Smoothed flexion.
    pub smoothed: Option<f32>,
    /// Most recent received flexion.
    pub target: Option<f32>,
    /// Last commanded pulse.
    pub last_pulse: Option<u16>,
    /// Arrival time of the last frame carrying this joint.
    pub last_frame: Option<Timestamp>,
}

/// Bounds the rate of change of every joint's commanded pulse.
///
/// State is per session: construct a fresh shaper (or call
/// [`reset`](Self::reset)) for each new connection.
#[derive(Debug, Clone)]
pub struct MotionShaper {
    config: ControlConfig,
    mapper: CommandMapper,
    alpha: f32,
    max_step: u16,
    states: JointMap<ShaperState>,
    out_of_range: u64,
}

impl MotionShaper {
    /// Creates a shaper.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`](crate::ControlError::InvalidConfig)
    /// if `config` fails validation.
    pub fn new(config: ControlConfig, mapper: CommandMapper) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            alpha: config.alpha(),
            max_step: config.max_slew_per_tick(),
            config,
            mapper,
            states: JointMap::default(),
            out_of_range: 0,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Mapper in use.
    #[must_use]
    pub const fn mapper(&self) -> &CommandMapper {
        &self.mapper
    }

    /// State of `joint`.
    #[must_use]
    pub fn state(&self, joint: JointId) -> &ShaperState {
        &self.states[joint]
    }

    /// Number of clamped commands since the shaper was created.
    #[must_use]
    pub const fn out_of_range_count(&self) -> u64 {
        self.out_of_range
    }

    /// Phase of `joint` at `now`.
    #[must_use]
    pub fn phase(&self, joint: JointId, now: Timestamp) -> JointPhase {
        let Some(last) = self.states[joint].last_frame else {
            return JointPhase::Idle;
        };
        let silence = now.saturating_since(last);
        if silence >= self.config.decay() {
            JointPhase::Decaying
        } else if silence > self.config.grace() {
            JointPhase::Holding
        } else {
            JointPhase::Tracking
        }
    }

    /// Records a received frame. Joints absent from the frame keep aging.
    ///
    /// The first value a joint sees seeds its smoothed flexion directly.
    pub fn observe(&mut self, frame: &PoseFrame, now: Timestamp) {
        for (joint, flexion) in frame.values() {
            let state = &mut self.states[joint];
            state.target = Some(flexion);
            state.last_frame = Some(now);
            if state.smoothed.is_none() {
                state.smoothed = Some(flexion);
            }
        }
    }

    /// Computes this tick's commands. `None` for joints never observed.
    pub fn tick(&mut self, now: Timestamp) -> JointMap<Option<PulseCommand>> {
        let mut commands = JointMap::default();
        for joint in JointId::ALL {
            commands[joint] = self.tick_joint(joint, now);
        }
        commands
    }

    fn tick_joint(&mut self, joint: JointId, now: Timestamp) -> Option<PulseCommand> {
        let phase = self.phase(joint, now);
        let neutral = self.config.neutral_flexion();
        let state = &mut self.states[joint];
        let target = match phase {
            JointPhase::Idle => return None,
            JointPhase::Holding => {
                if let Some(pulse) = state.last_pulse {
                    return Some(PulseCommand {
                        joint,
                        actuator: joint.actuator(),
                        pulse_us: pulse,
                        requested_us: i32::from(pulse),
                    });
                }
                state.target?
            }
            JointPhase::Tracking => state.target?,
            JointPhase::Decaying => neutral,
        };

        let previous = state.smoothed.unwrap_or(target);
        let smoothed = previous + self.alpha * (target - previous);
        state.smoothed = Some(smoothed);

        let mut command = self.mapper.map(joint, smoothed);
        if let Some(warning) = command.out_of_range() {
            self.out_of_range += 1;
            warn!(%warning, "pulse clamped to actuator range");
        }
        let state = &mut self.states[joint];
        if let Some(last) = state.last_pulse {
            command.pulse_us = slew(last, command.pulse_us, self.max_step);
        }
        state.last_pulse = Some(command.pulse_us);
        Some(command)
    }

    /// Snaps every joint to the neutral-safe pulse, bypassing the slew limit.
    ///
    /// Used when the channel closes: the neutral pose must be commanded
    /// within one tick.
    pub fn drive_neutral(&mut self) -> JointMap<PulseCommand> {
        let neutral = self.config.neutral_flexion();
        let commands = JointMap::from_fn(|joint| self.mapper.map(joint, neutral));
        for (joint, command) in commands.iter() {
            let state = &mut self.states[joint];
            state.smoothed = Some(neutral);
            state.target = Some(neutral);
            state.last_pulse = Some(command.pulse_us);
        }
        debug!("neutral pose commanded");
        commands
    }

    /// Forgets all per-joint history.
    pub fn reset(&mut self) {
        self.states = JointMap::default();
    }
}

fn slew(last: u16, next: u16, max_step: u16) -> u16 {
    if next > last {
        next.min(last.saturating_add(max_step))
    } else {
        next.max(last.saturating_sub(max_step))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
mod tests {
    use std::time::Duration;

    use hand_calibration::{ActuatorRange, CalibrationRecord, JointCalibration};

    use super::*;

    fn mapper() -> CommandMapper {
        let mut record = CalibrationRecord::new();
        for joint in JointId::ALL {
            record = record
                .with_range(joint.actuator(), ActuatorRange::new(500, 2500).unwrap())
                .with_joint(joint, JointCalibration::new(1000, 2000).unwrap())
                .unwrap();
        }
        CommandMapper::new(record.snapshot()).unwrap()
    }

    fn raw_config() -> ControlConfig {
        ControlConfig::default().with_smoothing_tau(Duration::ZERO)
    }

    const J: JointId = JointId::IndexMcp;

    #[test]
    fn slew_helper() {
        assert_eq!(slew(1000, 1500, 200), 1200);
        assert_eq!(slew(1500, 1000, 200), 1300);
        assert_eq!(slew(1000, 1100, 200), 1100);
    }

    #[test]
    fn idle_joint_emits_nothing() {
        let mut shaper = MotionShaper::new(raw_config(), mapper()).unwrap();
        let commands = shaper.tick(Timestamp::zero());
        assert!(commands.iter().all(|(_, c)| c.is_none()));
    }

    #[test]
    fn first_frame_seeds_without_lag() {
        let mut shaper = MotionShaper::new(ControlConfig::default(), mapper()).unwrap();
        let now = Timestamp::from_millis(100);
        shaper.observe(&PoseFrame::uniform(now, 0.8), now);
        let cmd = shaper.tick(now)[J].unwrap();
        assert_eq!(cmd.pulse_us, 1800);
    }

    #[test]
    fn smoothing_lags_step_change() {
        let config = ControlConfig::default();
        let mut shaper = MotionShaper::new(config, mapper()).unwrap();
        let mut now = Timestamp::zero();
        shaper.observe(&PoseFrame::uniform(now, 0.0), now);
        shaper.tick(now);
        now += config.tick_interval();
        shaper.observe(&PoseFrame::uniform(now, 0.1), now);
        let cmd = shaper.tick(now)[J].unwrap();
        let expected = 1000.0 + 1000.0 * 0.1 * config.alpha();
        assert_eq!(cmd.pulse_us, expected.round() as u16);
        assert!(cmd.pulse_us < 1100);
    }

    #[test]
    fn slew_bounds_every_step() {
        let config = raw_config();
        let mut shaper = MotionShaper::new(config, mapper()).unwrap();
        let mut now = Timestamp::zero();
        let mut last: Option<u16> = None;
        for flexion in [0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0] {
            shaper.observe(&PoseFrame::uniform(now, flexion), now);
            let pulse = shaper.tick(now)[J].unwrap().pulse_us;
            if let Some(prev) = last {
                assert!(pulse.abs_diff(prev) <= config.max_slew_per_tick());
            }
            last = Some(pulse);
            now += config.tick_interval();
        }
        assert_eq!(last, Some(2000));
    }

    #[test]
    fn hold_between_grace_and_decay() {
        let config = raw_config();
        let mut shaper = MotionShaper::new(config, mapper()).unwrap();
        let start = Timestamp::zero();
        shaper.observe(&PoseFrame::uniform(start, 0.7), start);
        let held = shaper.tick(start)[J].unwrap().pulse_us;
        assert_eq!(held, 1700);

        for ms in [300, 800, 1500, 1999] {
            let now = start + Duration::from_millis(ms);
            assert_eq!(shaper.phase(J, now), JointPhase::Holding);
            assert_eq!(shaper.tick(now)[J].unwrap().pulse_us, held);
        }
    }

    #[test]
    fn decay_approaches_neutral() {
        let config = raw_config();
        let mut shaper = MotionShaper::new(config, mapper()).unwrap();
        let start = Timestamp::zero();
        shaper.observe(&PoseFrame::uniform(start, 1.0), start);
        shaper.tick(start);

        let mut now = start + config.decay();
        let mut previous = 2000;
        for _ in 0..5 {
            assert_eq!(shaper.phase(J, now), JointPhase::Decaying);
            let pulse = shaper.tick(now)[J].unwrap().pulse_us;
            assert!(pulse < previous);
            previous = pulse;
            now += config.tick_interval();
        }
        assert_eq!(previous, 1000);
    }

    #[test]
    fn new_frame_after_hold_resumes_tracking() {
        let config = raw_config();
        let mut shaper = MotionShaper::new(config, mapper()).unwrap();
        let start = Timestamp::zero();
        shaper.observe(&PoseFrame::uniform(start, 0.5), start);
        shaper.tick(start);
        let later = start + Duration::from_millis(500);
        assert_eq!(shaper.phase(J, later), JointPhase::Holding);
        shaper.observe(&PoseFrame::uniform(later, 0.6), later);
        assert_eq!(shaper.phase(J, later), JointPhase::Tracking);
        assert_eq!(shaper.tick(later)[J].unwrap().pulse_us, 1600);
    }

    #[test]
    fn drive_neutral_ignores_slew() {
        let mut shaper = MotionShaper::new(raw_config(), mapper()).unwrap();
        let now = Timestamp::zero();
        shaper.observe(&PoseFrame::uniform(now, 0.95), now);
        assert_eq!(shaper.tick(now)[J].unwrap().pulse_us, 1950);
        let neutral = shaper.drive_neutral();
        assert_eq!(neutral[J].pulse_us, 1000);
        assert_eq!(shaper.state(J).last_pulse, Some(1000));
    }

    #[test]
    fn reset_forgets_history() {
        let mut shaper = MotionShaper::new(raw_config(), mapper()).unwrap();
        let now = Timestamp::zero();
        shaper.observe(&PoseFrame::uniform(now, 0.3), now);
        shaper.tick(now);
        shaper.reset();
        assert_eq!(*shaper.state(J), ShaperState::default());
        assert_eq!(shaper.phase(J, now), JointPhase::Idle);
    }
}
