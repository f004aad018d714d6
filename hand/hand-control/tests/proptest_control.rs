//! Property-based tests for command mapping and motion shaping.
//!
//! Random calibrations, flexion values and flexion sequences are drawn with
//! proptest and the mapping and shaping invariants checked on each.
//!
//! Run with: cargo test -p hand-control --test proptest_control

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use hand_calibration::{ActuatorRange, CalibrationRecord, CalibrationSnapshot, JointCalibration};
use hand_control::{CommandMapper, ControlConfig, JointPhase, MotionShaper};
use hand_types::{JointId, PULSE_CEILING_US, PULSE_FLOOR_US, PoseFrame, Timestamp};
use proptest::prelude::*;

const J: JointId = JointId::IndexMcp;

// =============================================================================
// Strategies
// =============================================================================

/// A valid range and a joint calibration inside it, either polarity.
fn arb_calibration() -> impl Strategy<Value = (ActuatorRange, JointCalibration)> {
    (PULSE_FLOOR_US..PULSE_CEILING_US)
        .prop_flat_map(|min| (Just(min), (min + 1)..=PULSE_CEILING_US))
        .prop_flat_map(|(min, max)| (Just(min), Just(max), min..=max, min..=max))
        .prop_filter("taut and curled must differ", |(_, _, taut, curled)| taut != curled)
        .prop_map(|(min, max, taut, curled)| {
            (
                ActuatorRange::new(min, max).unwrap(),
                JointCalibration::new(taut, curled).unwrap(),
            )
        })
}

fn snapshot(range: ActuatorRange, cal: JointCalibration) -> CalibrationSnapshot {
    let mut record = CalibrationRecord::new();
    for joint in JointId::ALL {
        record = record
            .with_range(joint.actuator(), range)
            .with_joint(joint, cal)
            .unwrap();
    }
    record.snapshot()
}

/// Flexion sequences biased toward full open/close jumps.
fn arb_flexions(max_len: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(
        prop_oneof![Just(0.0_f32), Just(1.0_f32), 0.0_f32..=1.0],
        1..=max_len,
    )
}

/// Tick rate, slew rate and smoothing time that pass validation.
fn arb_config() -> impl Strategy<Value = ControlConfig> {
    (10_u32..=200, 0_u64..=200)
        .prop_flat_map(|(hz, tau_ms)| (Just(hz), Just(tau_ms), hz..=hz * 400))
        .prop_map(|(hz, tau_ms, rate)| {
            ControlConfig::default()
                .with_tick_hz(hz)
                .with_max_slew_us_per_sec(rate)
                .with_smoothing_tau(Duration::from_millis(tau_ms))
        })
}

// =============================================================================
// Property Tests: Command Mapper
// =============================================================================

proptest! {
    /// Every flexion in [0, 1] maps inside the actuator range, unclamped.
    #[test]
    fn mapped_pulse_stays_in_range(
        (range, cal) in arb_calibration(),
        flexion in 0.0_f32..=1.0,
    ) {
        let mapper = CommandMapper::new(snapshot(range, cal)).unwrap();
        for joint in JointId::ALL {
            let cmd = mapper.map(joint, flexion);
            prop_assert!(range.contains(cmd.pulse_us), "{} outside {:?}", cmd.pulse_us, range);
            prop_assert!(cmd.out_of_range().is_none());
        }
    }

    /// Endpoints land exactly on the calibrated points.
    #[test]
    fn endpoints_hit_taut_and_curled((range, cal) in arb_calibration()) {
        let mapper = CommandMapper::new(snapshot(range, cal)).unwrap();
        prop_assert_eq!(mapper.map(J, 0.0).pulse_us, cal.taut_pulse_us());
        prop_assert_eq!(mapper.map(J, 1.0).pulse_us, cal.curled_pulse_us());
    }

    /// Flexion outside [0, 1] is clamped into the range and reported.
    #[test]
    fn overdriven_flexion_is_clamped(
        (range, cal) in arb_calibration(),
        flexion in -4.0_f32..5.0,
    ) {
        let mapper = CommandMapper::new(snapshot(range, cal)).unwrap();
        let cmd = mapper.map(J, flexion);
        prop_assert!(range.contains(cmd.pulse_us));
        let clamped = cmd.requested_us != i32::from(cmd.pulse_us);
        prop_assert_eq!(cmd.out_of_range().is_some(), clamped);
        if clamped {
            let edges = [range.min_pulse_us(), range.max_pulse_us()];
            prop_assert!(edges.contains(&cmd.pulse_us));
        }
    }

    /// Pulse moves in the direction of `curled - taut` as flexion grows.
    #[test]
    fn mapping_is_monotonic(
        (range, cal) in arb_calibration(),
        a in 0.0_f32..=1.0,
        b in 0.0_f32..=1.0,
    ) {
        let mapper = CommandMapper::new(snapshot(range, cal)).unwrap();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let p_lo = mapper.map(J, lo).pulse_us;
        let p_hi = mapper.map(J, hi).pulse_us;
        if cal.curled_pulse_us() > cal.taut_pulse_us() {
            prop_assert!(p_lo <= p_hi, "{lo} -> {p_lo}, {hi} -> {p_hi}");
        } else {
            prop_assert!(p_lo >= p_hi, "{lo} -> {p_lo}, {hi} -> {p_hi}");
        }
    }
}

// =============================================================================
// Property Tests: Motion Shaper
// =============================================================================

proptest! {
    /// Consecutive ticks never differ by more than the slew bound, however
    /// far the flexion jumps.
    #[test]
    fn slew_bound_holds_for_any_sequence(
        (range, cal) in arb_calibration(),
        config in arb_config(),
        flexions in arb_flexions(60),
    ) {
        let max_step = config.max_slew_per_tick();
        let mapper = CommandMapper::new(snapshot(range, cal)).unwrap();
        let mut shaper = MotionShaper::new(config, mapper).unwrap();
        let mut now = Timestamp::zero();
        let mut last: Option<u16> = None;
        for flexion in flexions {
            shaper.observe(&PoseFrame::uniform(now, flexion), now);
            let pulse = shaper.tick(now)[J].unwrap().pulse_us;
            if let Some(prev) = last {
                prop_assert!(
                    pulse.abs_diff(prev) <= max_step,
                    "step {prev} -> {pulse} exceeds {max_step}"
                );
            }
            prop_assert!(range.contains(pulse));
            last = Some(pulse);
            now += config.tick_interval();
        }
    }

    /// Between grace and decay the last commanded pulse is held.
    #[test]
    fn silence_shorter_than_decay_holds_last_pulse(
        (range, cal) in arb_calibration(),
        flexions in arb_flexions(20),
        silences in prop::collection::vec(251_u64..2000, 1..8),
    ) {
        let config = ControlConfig::default();
        let mapper = CommandMapper::new(snapshot(range, cal)).unwrap();
        let mut shaper = MotionShaper::new(config, mapper).unwrap();
        let mut now = Timestamp::zero();
        let mut last_frame = now;
        let mut held = 0;
        for flexion in flexions {
            shaper.observe(&PoseFrame::uniform(now, flexion), now);
            held = shaper.tick(now)[J].unwrap().pulse_us;
            last_frame = now;
            now += config.tick_interval();
        }
        let mut silences = silences;
        silences.sort_unstable();
        for ms in silences {
            let at = last_frame + Duration::from_millis(ms);
            prop_assert_eq!(shaper.phase(J, at), JointPhase::Holding);
            prop_assert_eq!(shaper.tick(at)[J].unwrap().pulse_us, held);
        }
    }

    /// Past the decay timeout the pulse converges on the neutral pulse,
    /// within the rounding of the smoothed flexion.
    #[test]
    fn silence_past_decay_reaches_neutral(
        (range, cal) in arb_calibration(),
        flexions in arb_flexions(20),
        neutral in 0.0_f32..=1.0,
        tau_ms in 0_u64..=200,
    ) {
        let config = ControlConfig::default()
            .with_neutral_flexion(neutral)
            .with_smoothing_tau(Duration::from_millis(tau_ms));
        let mapper = CommandMapper::new(snapshot(range, cal)).unwrap();
        let target = mapper.neutral_pulse(J, neutral);
        let mut shaper = MotionShaper::new(config, mapper).unwrap();
        let mut now = Timestamp::zero();
        let mut last_frame = now;
        for flexion in flexions {
            shaper.observe(&PoseFrame::uniform(now, flexion), now);
            shaper.tick(now);
            last_frame = now;
            now += config.tick_interval();
        }

        now = last_frame + config.decay();
        let mut pulse = 0;
        for _ in 0..500 {
            prop_assert_eq!(shaper.phase(J, now), JointPhase::Decaying);
            pulse = shaper.tick(now)[J].unwrap().pulse_us;
            if pulse.abs_diff(target) <= 1 {
                break;
            }
            now += config.tick_interval();
        }
        prop_assert!(pulse.abs_diff(target) <= 1, "stuck at {pulse}, neutral {target}");
    }
}
