//! Control channel sessions end to end, against a simulated hand.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hand_calibration::{ActuatorRange, CalibrationRecord, CalibrationStore, JointCalibration};
use hand_control::{ControlConfig, ControlError};
use hand_link::{
    ActuationServer, DisconnectReason, LinkConfig, LinkError, MAX_FRAME_LEN, PoseSender,
    SessionSummary, WireMessage, wire,
};
use hand_types::{ActuatorBus, JointId, LeaseMode, PoseFrame, SimulatedSink, Timestamp};
use tempfile::TempDir;
use tokio::io::DuplexStream;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::codec::Framed;

const INDEX: JointId = JointId::IndexMcp;

struct Rig {
    _dir: TempDir,
    sink: SimulatedSink,
    bus: Arc<ActuatorBus>,
    server: Arc<ActuationServer>,
}

/// Server over a store holding taut=1000 / curled=2000 for every joint, or
/// over an empty store.
fn rig(calibrated: bool) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let store = CalibrationStore::new(dir.path().join("hand_calibration.json"));
    if calibrated {
        let mut record = CalibrationRecord::new();
        for joint in JointId::ALL {
            record = record
                .with_range(joint.actuator(), ActuatorRange::new(500, 2500).unwrap())
                .with_joint(joint, JointCalibration::new(1000, 2000).unwrap())
                .unwrap();
        }
        store.save(&record).unwrap();
    }
    let sink = SimulatedSink::new();
    let bus = ActuatorBus::new(sink.clone());
    let control = ControlConfig::default().with_smoothing_tau(Duration::ZERO);
    let server =
        ActuationServer::new(LinkConfig::default(), control, store, Arc::clone(&bus)).unwrap();
    Rig {
        _dir: dir,
        sink,
        bus,
        server: Arc::new(server),
    }
}

fn spawn_session(
    server: &Arc<ActuationServer>,
    io: DuplexStream,
) -> JoinHandle<hand_link::Result<SessionSummary>> {
    let server = Arc::clone(server);
    tokio::spawn(async move { server.serve_connection(io).await })
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn index_frame(ms: u64, flexion: f32) -> PoseFrame {
    let mut frame = PoseFrame::empty(Timestamp::from_millis(ms));
    frame.set(INDEX, flexion);
    frame
}

#[tokio::test]
async fn goodbye_mid_session_drives_neutral() {
    let rig = rig(true);
    let (client_io, server_io) = tokio::io::duplex(MAX_FRAME_LEN);
    let handle = spawn_session(&rig.server, server_io);

    let mut sender = PoseSender::handshake(client_io, &LinkConfig::default())
        .await
        .unwrap();
    assert!(sender.server().starts_with("hand-link/"));
    sender.send(&index_frame(1, 0.95)).await.unwrap();
    let sink = rig.sink.clone();
    wait_for(|| sink.last_pulse(INDEX.actuator()) == Some(1950)).await;

    sender.goodbye().await.unwrap();
    let summary = timeout(Duration::from_secs(1), handle)
        .await
        .expect("session should end")
        .unwrap()
        .unwrap();

    assert_eq!(summary.reason, DisconnectReason::Goodbye);
    assert_eq!(summary.frames_applied, 1);
    assert_eq!(rig.sink.last_pulse(INDEX.actuator()), Some(1000));
    assert_eq!(rig.sink.last_pulse(JointId::ThumbCmc.actuator()), Some(1000));
    assert_eq!(rig.bus.owner(), None);
}

#[tokio::test]
async fn dropped_connection_drives_neutral() {
    let rig = rig(true);
    let (client_io, server_io) = tokio::io::duplex(MAX_FRAME_LEN);
    let handle = spawn_session(&rig.server, server_io);

    let mut sender = PoseSender::handshake(client_io, &LinkConfig::default())
        .await
        .unwrap();
    sender.send(&index_frame(1, 0.95)).await.unwrap();
    let sink = rig.sink.clone();
    wait_for(|| sink.last_pulse(INDEX.actuator()) == Some(1950)).await;

    drop(sender);
    let summary = timeout(Duration::from_secs(1), handle)
        .await
        .expect("session should end")
        .unwrap()
        .unwrap();

    assert_eq!(summary.reason, DisconnectReason::PeerClosed);
    assert_eq!(rig.sink.last_pulse(INDEX.actuator()), Some(1000));
    assert_eq!(rig.bus.owner(), None);
}

#[tokio::test]
async fn stale_frames_and_bad_values_are_counted_not_fatal() {
    let rig = rig(true);
    let (client_io, server_io) = tokio::io::duplex(MAX_FRAME_LEN);
    let handle = spawn_session(&rig.server, server_io);

    let mut sender = PoseSender::handshake(client_io, &LinkConfig::default())
        .await
        .unwrap();
    sender.send(&index_frame(10, 0.2)).await.unwrap();
    sender.send(&index_frame(5, 0.9)).await.unwrap();
    sender.send(&index_frame(10, 0.9)).await.unwrap();
    let mut frame = index_frame(20, 0.4);
    frame.set(JointId::IndexPip, 1.5);
    sender.send(&frame).await.unwrap();
    sender.goodbye().await.unwrap();

    let summary = timeout(Duration::from_secs(1), handle)
        .await
        .expect("session should end")
        .unwrap()
        .unwrap();
    assert_eq!(summary.reason, DisconnectReason::Goodbye);
    assert_eq!(summary.frames_applied, 2);
    assert_eq!(summary.frames_dropped, 2);
    assert_eq!(summary.values_rejected, 1);
}

#[tokio::test]
async fn unsupported_version_is_refused() {
    let rig = rig(true);
    let (client_io, server_io) = tokio::io::duplex(MAX_FRAME_LEN);
    let handle = spawn_session(&rig.server, server_io);

    let mut client = Framed::new(client_io, wire::codec(MAX_FRAME_LEN));
    let hello = WireMessage::Hello {
        protocol_version: 99,
        client: "old-tracker".into(),
    };
    client.send(hello.to_bytes().unwrap()).await.unwrap();
    let reply = client.next().await.unwrap().unwrap();
    match WireMessage::from_bytes(&reply).unwrap() {
        WireMessage::HelloNack { reason } => assert!(reason.contains("99"), "{reason}"),
        other => panic!("expected hello_nack, got {other:?}"),
    }

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, LinkError::Handshake(_)), "{err}");
    assert_eq!(rig.sink.write_count(), 0);
    assert_eq!(rig.bus.owner(), None);
}

#[tokio::test]
async fn incomplete_calibration_refuses_session() {
    let rig = rig(false);
    let (client_io, server_io) = tokio::io::duplex(MAX_FRAME_LEN);
    let handle = spawn_session(&rig.server, server_io);

    let err = PoseSender::handshake(client_io, &LinkConfig::default())
        .await
        .unwrap_err();
    match err {
        LinkError::Handshake(reason) => {
            assert!(reason.contains("incomplete calibration"), "{reason}");
        }
        other => panic!("expected handshake error, got {other}"),
    }

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        LinkError::Control(ControlError::IncompleteCalibration { .. })
    ));
    assert_eq!(rig.sink.write_count(), 0);
}

#[tokio::test]
async fn acquisition_in_progress_refuses_session() {
    let rig = rig(true);
    let lease = rig.bus.acquire(LeaseMode::Acquisition).unwrap();
    let (client_io, server_io) = tokio::io::duplex(MAX_FRAME_LEN);
    let handle = spawn_session(&rig.server, server_io);

    assert!(
        PoseSender::handshake(client_io, &LinkConfig::default())
            .await
            .is_err()
    );
    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        LinkError::Control(ControlError::ActuatorBusy {
            held_by: LeaseMode::Acquisition
        })
    ));
    assert_eq!(lease.mode(), LeaseMode::Acquisition);
    assert_eq!(rig.bus.owner(), Some(LeaseMode::Acquisition));
}

#[tokio::test]
async fn shutdown_mid_session_says_goodbye() {
    let rig = rig(true);
    let token = rig.server.shutdown_token();
    let (client_io, server_io) = tokio::io::duplex(MAX_FRAME_LEN);
    let handle = spawn_session(&rig.server, server_io);

    let mut client = Framed::new(client_io, wire::codec(MAX_FRAME_LEN));
    client
        .send(WireMessage::hello("raw").to_bytes().unwrap())
        .await
        .unwrap();
    let ack = WireMessage::from_bytes(&client.next().await.unwrap().unwrap()).unwrap();
    assert_eq!(ack.kind(), "hello_ack");
    let pose = WireMessage::pose(&index_frame(1, 0.5));
    client.send(pose.to_bytes().unwrap()).await.unwrap();
    let sink = rig.sink.clone();
    wait_for(|| sink.last_pulse(INDEX.actuator()) == Some(1500)).await;

    token.cancel();
    let summary = timeout(Duration::from_secs(1), handle)
        .await
        .expect("session should end")
        .unwrap()
        .unwrap();
    assert_eq!(summary.reason, DisconnectReason::Shutdown);
    assert_eq!(rig.sink.last_pulse(INDEX.actuator()), Some(1000));

    let goodbye = WireMessage::from_bytes(&client.next().await.unwrap().unwrap()).unwrap();
    assert_eq!(goodbye, WireMessage::Goodbye);
}

#[tokio::test]
async fn sequential_tcp_sessions_start_fresh() {
    let rig = rig(true);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let token = rig.server.shutdown_token();
    let serve = {
        let server = Arc::clone(&rig.server);
        tokio::spawn(async move { server.serve(listener).await })
    };

    for _ in 0..2 {
        let mut sender = PoseSender::connect(addr, &LinkConfig::default())
            .await
            .unwrap();
        // Same sender timestamp each time: a fresh session has no history to
        // call it stale.
        sender.send(&index_frame(1, 0.5)).await.unwrap();
        let sink = rig.sink.clone();
        wait_for(|| sink.last_pulse(INDEX.actuator()) == Some(1500)).await;

        sender.goodbye().await.unwrap();
        let sink = rig.sink.clone();
        let bus = Arc::clone(&rig.bus);
        wait_for(|| bus.owner().is_none() && sink.last_pulse(INDEX.actuator()) == Some(1000))
            .await;
    }

    token.cancel();
    timeout(Duration::from_secs(1), serve)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();
    assert_eq!(rig.server.sessions_started(), 2);
}
