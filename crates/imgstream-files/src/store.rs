//! Directory-backed image store.
//!
//! One flat directory holds one file per image, named by its store key.
//! There is no manifest: the store's state is exactly the directory listing.
//!
//! Writers are serialized through a store-wide readers-writer lock, and
//! listings take the read side, so a listing never observes a `save` that has
//! not fully returned. Each `save` stages its bytes in a hidden file and
//! renames it into place, so a failed write never leaves a visible entry.

use crate::ImageMetadata;
use crate::error::{Result, StoreError};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::sync::RwLock;

/// Prefix of in-progress staging files (hidden from listings)
const STAGING_PREFIX: &str = ".staging-";

/// Named image store rooted at a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    lock: Arc<RwLock<()>>,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::debug!("Opened image store at {}", root.display());
        Ok(Self {
            root,
            lock: Arc::new(RwLock::new(())),
        })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an entry named `name` occupies (whether or not it exists)
    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Write `data` under `name`, replacing any existing entry
    ///
    /// Returns the stored name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidName` if `name` is not a plain file name and
    /// `StoreError::Io` if the write or the final rename fails. On failure the
    /// previous entry (if any) is left untouched.
    pub async fn save(&self, name: &str, image_type: &str, data: &[u8]) -> Result<String> {
        let target = self.path_of(name)?;
        let staging = self.root.join(format!("{STAGING_PREFIX}{name}"));

        let _guard = self.lock.write().await;

        if let Err(e) = write_staged(&staging, &target, data).await {
            if let Err(cleanup) = fs::remove_file(&staging).await {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        "Failed to remove staging file {}: {}",
                        staging.display(),
                        cleanup
                    );
                }
            }
            return Err(e.into());
        }

        tracing::debug!(
            "Saved image {} (type={:?}, {} bytes)",
            name,
            image_type,
            data.len()
        );
        Ok(name.to_string())
    }

    /// Enumerate stored images in directory iteration order
    pub async fn list(&self) -> Result<Vec<ImageMetadata>> {
        self.list_matching("").await
    }

    /// Enumerate stored images whose name contains `filter`
    ///
    /// An empty filter matches every entry.
    pub async fn list_matching(&self, filter: &str) -> Result<Vec<ImageMetadata>> {
        let _guard = self.lock.read().await;

        let mut entries = fs::read_dir(&self.root).await?;
        let mut images = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!("Skipping non UTF-8 entry {:?}", entry.path());
                continue;
            };

            if name.starts_with('.') || !name.contains(filter) {
                continue;
            }

            let meta = entry.metadata().await?;
            images.push(ImageMetadata::from_fs(name, &meta));
        }

        Ok(images)
    }

    /// Open a stored image for reading
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no entry named `name` exists.
    pub async fn open_image(&self, name: &str) -> Result<(ImageMetadata, File)> {
        let path = self.path_of(name)?;
        let _guard = self.lock.read().await;

        let file = File::open(&path).await.map_err(|e| not_found_or(e, name))?;
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }

        Ok((ImageMetadata::from_fs(name, &meta), file))
    }

    /// Metadata of one stored image
    pub async fn metadata(&self, name: &str) -> Result<ImageMetadata> {
        let path = self.path_of(name)?;
        let _guard = self.lock.read().await;

        let meta = fs::metadata(&path)
            .await
            .map_err(|e| not_found_or(e, name))?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }

        Ok(ImageMetadata::from_fs(name, &meta))
    }

    /// Read a whole stored image into memory
    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_of(name)?;
        let _guard = self.lock.read().await;
        fs::read(&path).await.map_err(|e| not_found_or(e, name))
    }

    /// Whether an entry named `name` currently exists
    pub async fn contains(&self, name: &str) -> bool {
        self.metadata(name).await.is_ok()
    }
}

/// Check that `name` is usable as a store key
///
/// Keys are single, visible path components.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name == "." || name == ".." {
        "name is a relative directory"
    } else if name.contains(['/', '\\', '\0']) {
        "name contains a path separator"
    } else if name.starts_with('.') {
        "name starts with '.'"
    } else {
        return Ok(());
    };

    Err(StoreError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

async fn write_staged(staging: &Path, target: &Path, data: &[u8]) -> io::Result<()> {
    fs::write(staging, data).await?;
    fs::rename(staging, target).await
}

fn not_found_or(err: io::Error, name: &str) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(name.to_string())
    } else {
        StoreError::Io(err)
    }
}
