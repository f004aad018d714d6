//! Per-connection session state.
//!
//! ```text
//! Connecting ──activate──► Active ──silence > grace──► Degraded
//!                            ▲                            │
//!                            └──── next non-empty frame ──┘
//!            any state ──close──► Closed
//! ```
//!
//! Frames are applied in strictly increasing sender timestamp order. A frame
//! whose timestamp is not newer than the last applied one is dropped, never
//! reordered.
//!
//! Only frames carrying at least one joint value count as signs of life. A
//! sender streaming nothing but rejected values degrades like a silent one.

use std::time::Duration;

use hand_types::{PoseFrame, Timestamp};
use tracing::{debug, info, warn};

use crate::error::DisconnectReason;

/// Lifecycle of one control channel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Handshake in progress.
    Connecting,
    /// Frames arriving within the grace interval.
    Active,
    /// No frame for longer than the grace interval.
    Degraded,
    /// Terminal.
    Closed,
}

/// What happened to an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Newer than every applied frame; hand it to the shaper.
    Applied,
    /// Duplicate or out-of-order timestamp; dropped.
    Stale,
    /// The session is not accepting frames.
    Rejected,
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session number on this server.
    pub id: u64,
    /// Why the session closed.
    pub reason: DisconnectReason,
    /// Frames handed to the shaper.
    pub frames_applied: u64,
    /// Stale or undecodable frames.
    pub frames_dropped: u64,
    /// Joint values outside [0, 1] or non-finite.
    pub values_rejected: u64,
    /// Control ticks run.
    pub ticks: u64,
    /// Commands clamped into an actuator range.
    pub out_of_range: u64,
}

/// One session's state machine.
#[derive(Debug, Clone)]
pub struct Session {
    id: u64,
    state: SessionState,
    grace: Duration,
    last_timestamp: Option<Timestamp>,
    last_arrival: Timestamp,
    frames_applied: u64,
    frames_dropped: u64,
    values_rejected: u64,
    close_reason: Option<DisconnectReason>,
}

impl Session {
    /// New session waiting for its handshake.
    #[must_use]
    pub const fn new(id: u64, grace: Duration) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
            grace,
            last_timestamp: None,
            last_arrival: Timestamp::zero(),
            frames_applied: 0,
            frames_dropped: 0,
            values_rejected: 0,
            close_reason: None,
        }
    }

    /// Session number.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Reason given to [`close`](Self::close), once closed.
    #[must_use]
    pub const fn close_reason(&self) -> Option<&DisconnectReason> {
        self.close_reason.as_ref()
    }

    /// Sender timestamp of the last applied frame.
    #[must_use]
    pub const fn last_timestamp(&self) -> Option<Timestamp> {
        self.last_timestamp
    }

    /// Frames applied so far.
    #[must_use]
    pub const fn frames_applied(&self) -> u64 {
        self.frames_applied
    }

    /// Frames dropped so far.
    #[must_use]
    pub const fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Joint values rejected so far.
    #[must_use]
    pub const fn values_rejected(&self) -> u64 {
        self.values_rejected
    }

    /// Handshake done. The grace interval starts counting at `now`.
    pub fn activate(&mut self, now: Timestamp) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Active;
            self.last_arrival = now;
            debug!(session = self.id, "session active");
        }
    }

    /// Decides whether `frame`, arriving at local time `now`, is applied.
    ///
    /// An empty frame still advances the timestamp order but does not
    /// refresh liveness.
    pub fn accept_frame(&mut self, frame: &PoseFrame, now: Timestamp) -> FrameDisposition {
        match self.state {
            SessionState::Connecting | SessionState::Closed => return FrameDisposition::Rejected,
            SessionState::Active | SessionState::Degraded => {}
        }
        if self.last_timestamp.is_some_and(|last| frame.timestamp <= last) {
            self.frames_dropped += 1;
            warn!(
                session = self.id,
                timestamp = %frame.timestamp,
                "stale frame dropped"
            );
            return FrameDisposition::Stale;
        }
        self.last_timestamp = Some(frame.timestamp);
        self.frames_applied += 1;
        if frame.is_empty() {
            return FrameDisposition::Applied;
        }
        self.last_arrival = now;
        if self.state == SessionState::Degraded {
            self.state = SessionState::Active;
            info!(session = self.id, "frames resumed");
        }
        FrameDisposition::Applied
    }

    /// Counts joint values the receiver refused.
    pub fn record_rejected(&mut self, count: usize) {
        if count > 0 {
            self.values_rejected += count as u64;
            warn!(session = self.id, count, "joint values outside [0, 1] dropped");
        }
    }

    /// Counts a message that could not be decoded.
    pub fn record_undecodable(&mut self) {
        self.frames_dropped += 1;
    }

    /// Moves to `Degraded` once the channel has been silent past the grace
    /// interval.
    pub fn poll_liveness(&mut self, now: Timestamp) -> SessionState {
        let silent = now.saturating_since(self.last_arrival);
        if self.state == SessionState::Active && silent > self.grace {
            self.state = SessionState::Degraded;
            info!(
                session = self.id,
                silent_ms = silent.as_millis(),
                "no frames, session degraded"
            );
        }
        self.state
    }

    /// Closes the session. Returns false if it was already closed.
    pub fn close(&mut self, reason: DisconnectReason) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        debug!(session = self.id, %reason, "session closed");
        self.state = SessionState::Closed;
        self.close_reason = Some(reason);
        true
    }
}
