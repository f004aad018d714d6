//! Control channel for a tendon-driven hand.
//!
//! ```text
//! tracker ──► FrameQueue ──► PoseSender ══(TCP, JSON frames)══► ActuationServer
//!             (drop-oldest)                                       │
//!                                                   Session + ControlLoop (fixed tick)
//!                                                                 │
//!                                                            ActuatorBus
//! ```
//!
//! # Protocol
//!
//! 1. Client sends `hello` with [`PROTOCOL_VERSION`].
//! 2. Server loads the calibration and takes the bus, then answers
//!    `hello_ack`, or `hello_nack` with a reason and closes.
//! 3. Client streams `pose` messages; server applies those with increasing
//!    timestamps.
//! 4. Either side ends with `goodbye` or by closing the socket. The server
//!    drives every joint to the neutral-safe pose on the next control tick.
//!
//! See [`wire`] for the message format.

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod queue;
mod sender;
mod server;
mod session;
pub mod wire;

pub use config::{DEFAULT_PORT, LinkConfig, MAX_FRAME_LEN};
pub use error::{DisconnectReason, LinkError, Result};
pub use queue::FrameQueue;
pub use sender::PoseSender;
pub use server::ActuationServer;
pub use session::{FrameDisposition, Session, SessionState, SessionSummary};
pub use wire::{PROTOCOL_VERSION, ReceivedPose, WireMessage};
