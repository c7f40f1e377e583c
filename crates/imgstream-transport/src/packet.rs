//! Length-delimited packet streams.

use crate::transport::{TransportError, TransportResult};
use crate::{LENGTH_PREFIX_SIZE, MAX_PACKET_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Initial read buffer capacity
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Per-stream traffic counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    /// Packets written
    pub packets_sent: u64,
    /// Packets read
    pub packets_received: u64,
    /// Payload bytes written (excluding length prefixes)
    pub bytes_sent: u64,
    /// Payload bytes read (excluding length prefixes)
    pub bytes_received: u64,
}

/// A byte stream carrying length-prefixed packets
///
/// Works over any `AsyncRead + AsyncWrite` stream: `TcpStream` in production,
/// `tokio::io::DuplexStream` in tests.
pub struct PacketStream<S> {
    io: S,
    read_buf: BytesMut,
    max_packet_size: usize,
    stats: StreamStats,
}

impl<S> PacketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream using the default maximum packet size
    pub fn new(io: S) -> Self {
        Self::with_max_packet_size(io, MAX_PACKET_SIZE)
    }

    /// Wrap a stream with a custom maximum packet size
    pub fn with_max_packet_size(io: S, max_packet_size: usize) -> Self {
        Self {
            io,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            max_packet_size,
            stats: StreamStats::default(),
        }
    }

    /// Write one packet
    ///
    /// # Errors
    ///
    /// Returns `TransportError::PacketTooLarge` if the payload exceeds the
    /// maximum packet size, or `TransportError::Io` if the write fails.
    pub async fn send(&mut self, payload: &[u8]) -> TransportResult<()> {
        if payload.len() > self.max_packet_size {
            return Err(TransportError::PacketTooLarge {
                size: payload.len(),
                max: self.max_packet_size,
            });
        }

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.put_slice(payload);

        self.io.write_all(&buf).await?;
        self.io.flush().await?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += payload.len() as u64;
        Ok(())
    }

    /// Read the next packet
    ///
    /// Returns `Ok(None)` when the peer closed its side at a packet boundary.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Truncated` if the stream ends mid-packet and
    /// `TransportError::PacketTooLarge` if the announced length exceeds the
    /// maximum packet size.
    pub async fn recv(&mut self) -> TransportResult<Option<Bytes>> {
        loop {
            if let Some(packet) = self.decode()? {
                self.stats.packets_received += 1;
                self.stats.bytes_received += packet.len() as u64;
                return Ok(Some(packet));
            }

            if self.io.read_buf(&mut self.read_buf).await? == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::Truncated {
                    buffered: self.read_buf.len(),
                });
            }
        }
    }

    /// Close the sending half, signalling end of stream to the peer
    ///
    /// Packets can still be received afterwards.
    pub async fn finish(&mut self) -> TransportResult<()> {
        self.io.shutdown().await?;
        Ok(())
    }

    /// Traffic counters for this stream
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Reference to the underlying stream
    pub fn get_ref(&self) -> &S {
        &self.io
    }

    /// Recover the underlying stream, dropping any buffered input
    pub fn into_inner(self) -> S {
        self.io
    }

    /// Split one complete packet off the read buffer, if available
    fn decode(&mut self) -> TransportResult<Option<Bytes>> {
        if self.read_buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let len = u32::from_be_bytes([
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ]) as usize;

        // Reject oversized packets before waiting for their body
        if len > self.max_packet_size {
            return Err(TransportError::PacketTooLarge {
                size: len,
                max: self.max_packet_size,
            });
        }

        if self.read_buf.len() < LENGTH_PREFIX_SIZE + len {
            self.read_buf.reserve(LENGTH_PREFIX_SIZE + len - self.read_buf.len());
            return Ok(None);
        }

        self.read_buf.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(self.read_buf.split_to(len).freeze()))
    }
}
