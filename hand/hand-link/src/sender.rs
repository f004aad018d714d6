//! Sensing side of the control channel.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use hand_types::PoseFrame;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::error::{DisconnectReason, LinkError, Result};
use crate::queue::FrameQueue;
use crate::wire::{self, WireMessage};

/// Identification sent in `Hello`.
fn client_name() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Streams pose frames to an actuation server.
///
/// Created by a successful hello exchange; every frame sent afterwards is a
/// `pose` message. Dropping the sender closes the stream without a goodbye,
/// which the server treats the same way (neutral pose, session closed).
#[derive(Debug)]
pub struct PoseSender<S> {
    framed: Framed<S, LengthDelimitedCodec>,
    server: String,
    sent: u64,
}

impl PoseSender<TcpStream> {
    /// Dials `addr` and performs the hello exchange.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Io`] if the connection fails, or any error from
    /// [`handshake`](Self::handshake).
    pub async fn connect(addr: impl ToSocketAddrs, config: &LinkConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Self::handshake(stream, config).await
    }
}

impl<S> PoseSender<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Performs the hello exchange over an established stream.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Handshake`] if the server refuses or answers out of turn
    /// - [`LinkError::Timeout`] if no answer arrives within the configured timeout
    /// - [`LinkError::ChannelDisconnected`] if the server closes first
    pub async fn handshake(stream: S, config: &LinkConfig) -> Result<Self> {
        let mut framed = Framed::new(stream, wire::codec(config.max_frame_len()));
        framed
            .send(WireMessage::hello(client_name()).to_bytes()?)
            .await?;

        let reply = timeout(config.handshake_timeout(), framed.next())
            .await
            .map_err(|_| LinkError::Timeout("hello ack"))?
            .ok_or(LinkError::ChannelDisconnected(DisconnectReason::PeerClosed))??;

        match WireMessage::from_bytes(&reply)? {
            WireMessage::HelloAck { server } => {
                info!(%server, "connected to actuation server");
                Ok(Self {
                    framed,
                    server,
                    sent: 0,
                })
            }
            WireMessage::HelloNack { reason } => {
                Err(LinkError::handshake(format!("rejected by server: {reason}")))
            }
            other => Err(LinkError::handshake(format!(
                "unexpected {} during handshake",
                other.kind()
            ))),
        }
    }

    /// Server identification from `HelloAck`.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Frames sent so far.
    #[must_use]
    pub const fn sent(&self) -> u64 {
        self.sent
    }

    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ChannelDisconnected`] if the write fails.
    pub async fn send(&mut self, frame: &PoseFrame) -> Result<()> {
        let bytes = WireMessage::pose(frame).to_bytes()?;
        self.framed
            .send(bytes)
            .await
            .map_err(|e| LinkError::transport(&e))?;
        self.sent += 1;
        Ok(())
    }

    /// Sends frames from `queue` until it is closed and drained, then says
    /// goodbye. Returns the number of frames sent.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ChannelDisconnected`] if the server goes away.
    pub async fn run(mut self, queue: &FrameQueue) -> Result<u64> {
        while let Some(frame) = queue.recv().await {
            self.send(&frame).await?;
        }
        let sent = self.sent;
        debug!(sent, overflow = queue.overflow_count(), "frame queue closed");
        self.goodbye().await?;
        Ok(sent)
    }

    /// Ends the session cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ChannelDisconnected`] if the write fails.
    pub async fn goodbye(mut self) -> Result<()> {
        self.framed
            .send(WireMessage::Goodbye.to_bytes()?)
            .await
            .map_err(|e| LinkError::transport(&e))?;
        SinkExt::<Bytes>::close(&mut self.framed)
            .await
            .map_err(|e| LinkError::transport(&e))?;
        info!(sent = self.sent, "said goodbye");
        Ok(())
    }
}
