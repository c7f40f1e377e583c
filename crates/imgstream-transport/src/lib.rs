//! # imgstream Transport
//!
//! Network transport layer for the imgstream protocol.
//!
//! This crate provides:
//! - Length-delimited packet framing over any async byte stream
//! - TCP dialing and listening that yield packet streams
//!
//! A packet is a big-endian `u32` length followed by that many payload bytes.
//! A clean end of stream at a packet boundary is a normal end of stream; an
//! end of stream in the middle of a packet is reported as truncation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod packet;
pub mod tcp;
pub mod transport;

pub use packet::{PacketStream, StreamStats};
pub use tcp::{PacketListener, connect};
pub use transport::{TransportError, TransportResult};

/// Size of the packet length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest accepted packet payload (16 MiB)
pub const MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Largest packet payload accepted or sent
    pub max_packet_size: usize,
    /// Disable Nagle's algorithm on TCP sockets
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            nodelay: true,
        }
    }
}
