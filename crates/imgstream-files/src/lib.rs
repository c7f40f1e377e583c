//! # imgstream Files
//!
//! File handling for the imgstream transfer protocol.
//!
//! This crate provides:
//! - A directory-backed image store with a readers-writer discipline
//! - Fixed-size chunking of byte sources
//! - Image metadata shared by client and server

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod error;
pub mod store;

pub use chunker::{ChunkReader, FileChunker};
pub use error::{Result, StoreError};
pub use store::FileStore;

use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::Path;
use std::time::SystemTime;

/// Default chunk size (1 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Metadata describing one stored image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Store key (a single file name)
    pub name: String,
    /// Lowercase file extension, empty if the name has none
    pub image_type: String,
    /// Creation time (falls back to modification time where unsupported)
    pub created_at: SystemTime,
    /// Last modification time
    pub modified_at: SystemTime,
}

impl ImageMetadata {
    /// Create metadata for `name` stamped with the current time
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = SystemTime::now();
        Self {
            image_type: image_type_of(&name),
            name,
            created_at: now,
            modified_at: now,
        }
    }

    /// Build metadata from filesystem metadata
    pub fn from_fs(name: impl Into<String>, meta: &Metadata) -> Self {
        let name = name.into();
        let modified_at = meta.modified().unwrap_or_else(|_| SystemTime::now());
        let created_at = meta.created().unwrap_or(modified_at);
        Self {
            image_type: image_type_of(&name),
            name,
            created_at,
            modified_at,
        }
    }
}

/// Derive the image type from a file name's extension
///
/// ```
/// use imgstream_files::image_type_of;
///
/// assert_eq!(image_type_of("chicago.JPG"), "jpg");
/// assert_eq!(image_type_of("README"), "");
/// ```
pub fn image_type_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}
