//! Error types for the image store.

use std::io;
use thiserror::Error;

/// Image store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem failure
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    /// No entry with this name exists in the store
    #[error("image not found: {0}")]
    NotFound(String),

    /// Name cannot be used as a store key
    #[error("invalid image name {name:?}: {reason}")]
    InvalidName {
        /// Rejected name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
