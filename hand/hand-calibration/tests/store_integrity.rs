//! Integration tests: the stored record only changes on a successful commit.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;

use hand_calibration::{
    Acquisition, AcquisitionStage, CalibrationError, CalibrationStore, OperatorEvent,
};
use hand_types::{ActuatorBus, ActuatorId, JointId, SimulatedSink};

fn mark_range(acq: &mut Acquisition, actuator: ActuatorId, min: u16, max: u16) {
    for event in [
        OperatorEvent::Drive {
            actuator,
            pulse_us: min,
        },
        OperatorEvent::MarkMin(actuator),
        OperatorEvent::Drive {
            actuator,
            pulse_us: max,
        },
        OperatorEvent::MarkMax(actuator),
        OperatorEvent::Acknowledge(actuator),
    ] {
        acq.handle(event).unwrap();
    }
}

fn seed_ranges(path: &Path) {
    let bus = ActuatorBus::new(SimulatedSink::new());
    let mut acq = Acquisition::new(CalibrationStore::new(path), &bus).unwrap();
    let actuators = [JointId::PinkyMcp.actuator(), JointId::PinkyPip.actuator()];
    acq.begin_range(actuators).unwrap();
    for a in actuators {
        mark_range(&mut acq, a, 600, 2400);
    }
    acq.commit().unwrap();
}

#[test]
fn aborted_range_stage_leaves_store_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hand.json");
    seed_ranges(&path);
    let before = fs::read(&path).unwrap();

    let bus = ActuatorBus::new(SimulatedSink::new());
    let mut acq = Acquisition::new(CalibrationStore::new(&path), &bus).unwrap();
    let ch = JointId::PinkyMcp.actuator();
    acq.begin_range([ch]).unwrap();
    mark_range(&mut acq, ch, 1000, 1100);
    acq.abort();
    drop(acq);

    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn incomplete_range_stage_leaves_store_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hand.json");
    seed_ranges(&path);
    let before = fs::read(&path).unwrap();

    let bus = ActuatorBus::new(SimulatedSink::new());
    let mut acq = Acquisition::new(CalibrationStore::new(&path), &bus).unwrap();
    let a = JointId::PinkyMcp.actuator();
    let b = JointId::PinkyPip.actuator();
    acq.begin_range([a, b]).unwrap();
    mark_range(&mut acq, a, 900, 2000);
    assert!(matches!(
        acq.commit(),
        Err(CalibrationError::StageIncomplete { .. })
    ));
    drop(acq);

    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn fresh_store_failed_range_stage_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hand.json");
    let bus = ActuatorBus::new(SimulatedSink::new());
    let mut acq = Acquisition::new(CalibrationStore::new(&path), &bus).unwrap();
    acq.begin_range(ActuatorId::wired()).unwrap();
    mark_range(&mut acq, JointId::ThumbIp.actuator(), 700, 2300);
    assert!(acq.commit().is_err());
    assert_eq!(acq.stage(), AcquisitionStage::Uninitialized);
    assert!(!path.exists());
}

#[test]
fn tendon_without_range_fails_and_store_unmodified() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hand.json");
    seed_ranges(&path);
    let before = fs::read(&path).unwrap();

    let bus = ActuatorBus::new(SimulatedSink::new());
    let mut acq = Acquisition::new(CalibrationStore::new(&path), &bus).unwrap();
    let err = acq
        .begin_tendon([JointId::PinkyMcp, JointId::MiddlePip])
        .unwrap_err();
    assert!(matches!(
        err,
        CalibrationError::CalibrationOrderViolation { .. }
    ));
    assert!(acq.active().is_none());
    drop(acq);

    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn committed_revision_visible_to_new_snapshot_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hand.json");
    seed_ranges(&path);
    let store = CalibrationStore::new(&path);
    let held = store.snapshot().unwrap();
    assert_eq!(held.revision(), 1);

    let bus = ActuatorBus::new(SimulatedSink::new());
    let mut acq = Acquisition::new(store.clone(), &bus).unwrap();
    let ch = JointId::PinkyMcp.actuator();
    acq.begin_range([ch]).unwrap();
    mark_range(&mut acq, ch, 650, 2350);
    acq.commit().unwrap();

    assert_eq!(held.revision(), 1);
    assert_eq!(held.range(ch).unwrap().min_pulse_us(), 600);
    let fresh = store.snapshot().unwrap();
    assert_eq!(fresh.revision(), 2);
    assert_eq!(fresh.range(ch).unwrap().min_pulse_us(), 650);
}
