//! Transport error types.

use std::io;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Address binding failed
    #[error("Failed to bind to address {addr}: {source}")]
    BindFailed {
        /// Requested address
        addr: String,
        /// Underlying error
        source: io::Error,
    },

    /// Connection failed
    #[error("Connection to {addr} failed: {source}")]
    ConnectionFailed {
        /// Dialed address
        addr: String,
        /// Underlying error
        source: io::Error,
    },

    /// Packet length exceeds the configured maximum
    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge {
        /// Announced or attempted size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Stream ended in the middle of a packet
    #[error("stream ended inside a packet ({buffered} bytes buffered)")]
    Truncated {
        /// Bytes of the partial packet that were received
        buffered: usize,
    },
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
