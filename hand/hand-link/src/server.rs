//! Actuation side of the control channel.
//!
//! Each connection runs as one session:
//!
//! ```text
//! socket ──► reader task ──mpsc──► control loop (fixed tick) ──► ActuatorLease
//!                 │                       ▲
//!                 └──── close reason ─────┘ (oneshot)
//! ```
//!
//! The reader task is the only part that waits on the network. The control
//! loop only waits for its own tick, so a dead socket can never stall
//! actuator writes, and a close is seen on the next tick at the latest.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use hand_calibration::CalibrationStore;
use hand_control::{ControlConfig, ControlLoop};
use hand_types::{ActuatorBus, Timestamp};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::{DisconnectReason, LinkError, Result};
use crate::session::{FrameDisposition, Session, SessionSummary};
use crate::wire::{self, PROTOCOL_VERSION, ReceivedPose, WireMessage};

type Transport<S> = Framed<S, LengthDelimitedCodec>;

/// Time allowed for a goodbye on shutdown.
const GOODBYE_TIMEOUT: Duration = Duration::from_millis(200);

/// Identification sent in `HelloAck`.
fn server_name() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Reader task to control loop.
#[derive(Debug)]
enum Inbound {
    Pose(ReceivedPose),
    Undecodable,
}

/// Accepts sensing-side connections and drives the hand from them.
///
/// Sessions run one at a time: the live-control lease on the bus is held for
/// the length of a session and released before the next one starts. Each
/// session loads a fresh calibration snapshot and gets a fresh shaper.
#[derive(Debug)]
pub struct ActuationServer {
    link: LinkConfig,
    control: ControlConfig,
    calibration: CalibrationStore,
    bus: Arc<ActuatorBus>,
    shutdown: CancellationToken,
    sessions: AtomicU64,
}

impl ActuationServer {
    /// Creates a server.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidConfig`] or
    /// [`LinkError::Control`] if either configuration is invalid.
    pub fn new(
        link: LinkConfig,
        control: ControlConfig,
        calibration: CalibrationStore,
        bus: Arc<ActuatorBus>,
    ) -> Result<Self> {
        link.validate()?;
        control.validate()?;
        Ok(Self {
            link,
            control,
            calibration,
            bus,
            shutdown: CancellationToken::new(),
            sessions: AtomicU64::new(0),
        })
    }

    /// Token that stops [`serve`](Self::serve) and any running session.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Link configuration.
    #[must_use]
    pub const fn link_config(&self) -> &LinkConfig {
        &self.link
    }

    /// Sessions started so far, including refused ones.
    #[must_use]
    pub fn sessions_started(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    /// Accepts connections until shutdown, serving them one after another.
    ///
    /// Failed sessions are logged and do not stop the server.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Io`] if the listener's address cannot be read.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "actuation server listening");
        loop {
            let accepted = tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "could not disable nagle");
            }
            info!(%peer, "connection accepted");
            match self.serve_connection(stream).await {
                Ok(summary) => debug!(%peer, ?summary, "connection finished"),
                Err(e) => warn!(%peer, error = %e, "session refused"),
            }
        }
        info!("actuation server stopped");
        Ok(())
    }

    /// Runs one session over `stream` until it closes.
    ///
    /// The actuators are in the neutral-safe pose when this returns `Ok`, and
    /// untouched when it returns `Err`.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Handshake`] / [`LinkError::Timeout`] / [`LinkError::Codec`]
    ///   if the hello exchange fails
    /// - [`LinkError::Calibration`] if the calibration file cannot be read
    /// - [`LinkError::Control`] if the calibration is incomplete or the bus
    ///   is held by calibration acquisition
    pub async fn serve_connection<S>(&self, stream: S) -> Result<SessionSummary>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let id = self.sessions.fetch_add(1, Ordering::Relaxed) + 1;
        let mut framed = Framed::new(stream, wire::codec(self.link.max_frame_len()));

        let client = self.perform_handshake(&mut framed).await?;
        let control = match self.start_control() {
            Ok(control) => control,
            Err(e) => {
                reject(&mut framed, e.to_string()).await;
                return Err(e);
            }
        };
        framed
            .send(
                WireMessage::HelloAck {
                    server: server_name(),
                }
                .to_bytes()?,
            )
            .await?;
        info!(session = id, %client, "session started");

        Ok(self.run_session(id, framed, control).await)
    }

    async fn perform_handshake<S>(&self, framed: &mut Transport<S>) -> Result<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let bytes = timeout(self.link.handshake_timeout(), framed.next())
            .await
            .map_err(|_| LinkError::Timeout("hello"))?
            .ok_or(LinkError::ChannelDisconnected(DisconnectReason::PeerClosed))??;

        match WireMessage::from_bytes(&bytes) {
            Ok(WireMessage::Hello {
                protocol_version,
                client,
            }) => {
                if protocol_version == PROTOCOL_VERSION {
                    Ok(client)
                } else {
                    let reason = format!(
                        "unsupported protocol version {protocol_version}, expected {PROTOCOL_VERSION}"
                    );
                    reject(framed, reason.clone()).await;
                    Err(LinkError::Handshake(reason))
                }
            }
            Ok(other) => {
                let reason = format!("expected hello, got {}", other.kind());
                reject(framed, reason.clone()).await;
                Err(LinkError::Handshake(reason))
            }
            Err(e) => {
                warn!("Invalid Hello message: {e}");
                reject(framed, format!("invalid hello: {e}")).await;
                Err(e)
            }
        }
    }

    fn start_control(&self) -> Result<ControlLoop> {
        let snapshot = self.calibration.snapshot()?;
        Ok(ControlLoop::new(self.control, snapshot, &self.bus)?)
    }

    async fn run_session<S>(
        &self,
        id: u64,
        framed: Transport<S>,
        mut control: ControlLoop,
    ) -> SessionSummary
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (mut sink, stream) = framed.split();
        let (frames_tx, mut frames_rx) = mpsc::channel(self.link.inbound_capacity());
        let (close_tx, mut close_rx) = oneshot::channel();
        let reader = tokio::spawn(read_frames(id, stream, frames_tx, close_tx));

        let origin = Instant::now();
        let mut interval = tokio::time::interval(self.control.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut session = Session::new(id, self.control.grace());
        session.activate(Timestamp::zero());

        let reason = loop {
            interval.tick().await;
            let now = Timestamp::from_elapsed(origin.elapsed());

            // Frames queued before a close are already in the channel once
            // the close is visible.
            let closed = if self.shutdown.is_cancelled() {
                Some(DisconnectReason::Shutdown)
            } else {
                match close_rx.try_recv() {
                    Ok(reason) => Some(reason),
                    Err(oneshot::error::TryRecvError::Empty) => None,
                    Err(oneshot::error::TryRecvError::Closed) => {
                        Some(DisconnectReason::Transport("reader task ended".into()))
                    }
                }
            };
            while let Ok(inbound) = frames_rx.try_recv() {
                match inbound {
                    Inbound::Pose(pose) => {
                        session.record_rejected(pose.rejected);
                        if session.accept_frame(&pose.frame, now) == FrameDisposition::Applied {
                            control.observe(&pose.frame, now);
                        }
                    }
                    Inbound::Undecodable => session.record_undecodable(),
                }
            }
            if let Some(reason) = closed {
                break reason;
            }
            session.poll_liveness(now);
            control.tick(now);
        };

        control.drive_neutral();
        session.close(reason.clone());
        reader.abort();

        if reason == DisconnectReason::Shutdown {
            let goodbye = async {
                sink.send(WireMessage::Goodbye.to_bytes()?).await?;
                SinkExt::<Bytes>::close(&mut sink).await?;
                Ok::<_, LinkError>(())
            };
            match timeout(GOODBYE_TIMEOUT, goodbye).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(session = id, error = %e, "goodbye not delivered"),
                Err(_) => debug!(session = id, "goodbye timed out"),
            }
        }

        let summary = SessionSummary {
            id,
            reason,
            frames_applied: session.frames_applied(),
            frames_dropped: session.frames_dropped(),
            values_rejected: session.values_rejected(),
            ticks: control.ticks(),
            out_of_range: control.shaper().out_of_range_count(),
        };
        info!(
            session = id,
            reason = %summary.reason,
            applied = summary.frames_applied,
            dropped = summary.frames_dropped,
            rejected = summary.values_rejected,
            out_of_range = summary.out_of_range,
            "session closed, actuators neutral"
        );
        summary
    }
}

/// Sends a `HelloNack`. Delivery is best effort; the session is refused
/// either way.
async fn reject<S>(framed: &mut Transport<S>, reason: String)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let sent = match (WireMessage::HelloNack { reason }).to_bytes() {
        Ok(bytes) => framed.send(bytes).await.map_err(LinkError::from),
        Err(e) => Err(e),
    };
    if let Err(e) = sent {
        debug!(error = %e, "hello nack not delivered");
    }
}

/// Reads messages until the stream ends, then reports why.
async fn read_frames<S>(
    session: u64,
    mut stream: SplitStream<Transport<S>>,
    frames: mpsc::Sender<Inbound>,
    close: oneshot::Sender<DisconnectReason>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reason = loop {
        let bytes = match stream.next().await {
            None => break DisconnectReason::PeerClosed,
            Some(Err(e)) => break DisconnectReason::Transport(e.to_string()),
            Some(Ok(bytes)) => bytes,
        };
        let inbound = match WireMessage::from_bytes(&bytes) {
            Ok(WireMessage::Pose {
                timestamp_us,
                joints,
            }) => Inbound::Pose(ReceivedPose::from_wire(timestamp_us, &joints)),
            Ok(WireMessage::Goodbye) => break DisconnectReason::Goodbye,
            Ok(other) => {
                debug!(session, kind = other.kind(), "ignoring message mid-session");
                continue;
            }
            Err(e) => {
                warn!(session, error = %e, "undecodable message dropped");
                Inbound::Undecodable
            }
        };
        if frames.send(inbound).await.is_err() {
            return;
        }
    };
    let _ = close.send(reason);
}
