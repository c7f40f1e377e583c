//! Error types for imgstream operations
//!
//! Every failure on either side of a transfer is returned as an [`Error`];
//! nothing in the client or server terminates the process. Errors are
//! classified so the caller can decide whether to retry, surface, or abort.
//!
//! # Error Categories
//!
//! - **Transient**: may succeed on retry (deadline exceeded, connection lost)
//! - **Permanent**: will not succeed without intervention (missing file,
//!   rejected name, malformed stream)
//!
//! # Example
//!
//! ```no_run
//! use imgstream_core::Error;
//!
//! fn handle_error(err: Error) {
//!     if err.is_transient() {
//!         println!("Transient error, may retry: {}", err);
//!     } else {
//!         println!("Permanent error: {}", err);
//!     }
//! }
//! ```

use crate::frame::{Status, StatusCode};
use imgstream_files::StoreError;
use imgstream_transport::TransportError;
use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur in transfer operations
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// Local file or remote image does not exist
    #[error("Not found: {0}")]
    NotFound(Cow<'static, str>),

    /// Read or write failure against a file or the store
    #[error("I/O error: {0}")]
    Io(String),

    /// Out-of-order, malformed, or unknown frames
    #[error("Protocol violation: {0}")]
    ProtocolViolation(Cow<'static, str>),

    /// Deadline exceeded
    #[error("Operation timed out: {0}")]
    Timeout(Cow<'static, str>),

    /// Unclassified server-side failure
    #[error("Internal error: {0}")]
    Internal(Cow<'static, str>),

    /// Dialing, accepting, or socket failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Image name cannot be used as a store key
    #[error("Invalid image name: {0}")]
    InvalidName(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),
}

impl Error {
    /// Returns true if this error is transient and may succeed on retry
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Connection(_))
    }

    /// Returns true if this error is permanent and will not succeed on retry
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::ProtocolViolation(_)
                | Error::InvalidName(_)
                | Error::InvalidConfig(_)
        )
    }

    /// Create a protocol violation with static context (zero allocation)
    #[must_use]
    pub const fn protocol(context: &'static str) -> Self {
        Error::ProtocolViolation(Cow::Borrowed(context))
    }

    /// Create a timeout error with static context (zero allocation)
    #[must_use]
    pub const fn timeout(context: &'static str) -> Self {
        Error::Timeout(Cow::Borrowed(context))
    }

    /// Create an internal error with static context (zero allocation)
    #[must_use]
    pub const fn internal(context: &'static str) -> Self {
        Error::Internal(Cow::Borrowed(context))
    }

    /// Create an invalid configuration error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        Error::InvalidConfig(Cow::Borrowed(context))
    }

    /// Wire status code reported to the peer for this error
    ///
    /// Failures without a dedicated code (store I/O, socket errors) are
    /// reported as internal errors.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NotFound,
            Error::ProtocolViolation(_) => StatusCode::ProtocolViolation,
            Error::InvalidName(_) => StatusCode::InvalidName,
            Error::Io(_)
            | Error::Timeout(_)
            | Error::Internal(_)
            | Error::Connection(_)
            | Error::InvalidConfig(_) => StatusCode::Internal,
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        match status.code {
            StatusCode::NotFound => Error::NotFound(status.message.into()),
            StatusCode::InvalidName => Error::InvalidName(status.message),
            StatusCode::ProtocolViolation => Error::ProtocolViolation(status.message.into()),
            StatusCode::Internal => Error::Internal(status.message.into()),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => Error::NotFound(name.into()),
            StoreError::InvalidName { name, reason } => {
                Error::InvalidName(format!("{name:?}: {reason}"))
            }
            StoreError::Io(e) => Error::Io(e.to_string()),
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::PacketTooLarge { .. } | TransportError::Truncated { .. } => {
                Error::ProtocolViolation(err.to_string().into())
            }
            TransportError::Io(_)
            | TransportError::BindFailed { .. }
            | TransportError::ConnectionFailed { .. } => Error::Connection(err.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Result type for imgstream operations
pub type Result<T> = std::result::Result<T, Error>;
