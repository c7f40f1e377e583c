//! Frame-level view of one connection.
//!
//! A connection carries exactly one call: the opening `Call` frame followed by
//! the call's stream in each direction.

use crate::error::{Error, Result};
use crate::frame::Frame;
use imgstream_transport::{PacketStream, StreamStats};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Sends and receives whole frames over a packet stream
pub struct Connection<S> {
    packets: PacketStream<S>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a packet stream
    pub fn new(packets: PacketStream<S>) -> Self {
        Self { packets }
    }

    /// Send one frame
    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        let packet = frame.encode()?;
        self.packets.send(&packet).await?;
        Ok(())
    }

    /// Receive the next frame, or `None` once the peer finished sending
    pub async fn recv(&mut self) -> Result<Option<Frame>> {
        match self.packets.recv().await? {
            Some(packet) => Frame::decode(packet).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`recv`](Self::recv), failing with `Error::Timeout` if no frame
    /// or end of stream arrives within `limit`
    pub async fn recv_within(
        &mut self,
        limit: Duration,
        waiting_for: &'static str,
    ) -> Result<Option<Frame>> {
        match tokio::time::timeout(limit, self.recv()).await {
            Ok(received) => received,
            Err(_) => Err(Error::timeout(waiting_for)),
        }
    }

    /// Close the sending half
    pub async fn finish(&mut self) -> Result<()> {
        self.packets.finish().await?;
        Ok(())
    }

    /// Traffic counters
    pub fn stats(&self) -> StreamStats {
        self.packets.stats()
    }
}

impl<S> From<PacketStream<S>> for Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn from(packets: PacketStream<S>) -> Self {
        Self::new(packets)
    }
}
