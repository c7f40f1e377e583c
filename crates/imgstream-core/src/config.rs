//! Client and server configuration

use crate::error::{Error, Result};
use crate::frame::FRAME_TAG_SIZE;
use crate::limiter::{DEFAULT_LISTING_CAPACITY, DEFAULT_TRANSFER_CAPACITY};
use imgstream_files::DEFAULT_CHUNK_SIZE;
use imgstream_transport::TransportConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Default service port
pub const DEFAULT_PORT: u16 = 50051;

/// Default store and download directory
pub const DEFAULT_STORE_DIR: &str = "files";

/// Default largest image a server accepts (64 MiB)
pub const DEFAULT_MAX_IMAGE_SIZE: u64 = 64 * 1024 * 1024;

/// Default longest wait for the next frame of a call
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time in-flight calls get to finish after shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address for incoming connections
    pub listen_addr: String,

    /// Directory holding uploaded images
    pub store_root: PathBuf,

    /// Chunk size for download streams
    pub chunk_size: usize,

    /// Largest accepted upload in bytes
    pub max_image_size: u64,

    /// A call fails once its peer sends nothing for this long
    pub idle_timeout: Duration,

    /// Calls still running this long after shutdown are aborted
    pub shutdown_grace: Duration,

    /// Transport configuration
    pub transport: TransportConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            store_root: PathBuf::from(DEFAULT_STORE_DIR),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            transport: TransportConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if any field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.is_empty() {
            return Err(Error::invalid_config("listen address is empty"));
        }
        if self.store_root.as_os_str().is_empty() {
            return Err(Error::invalid_config("store root is empty"));
        }
        if self.max_image_size == 0 {
            return Err(Error::invalid_config("max image size must be positive"));
        }
        if self.idle_timeout.is_zero() {
            return Err(Error::invalid_config("idle timeout must be positive"));
        }
        validate_chunk_size(self.chunk_size, &self.transport)
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address (`host:port`)
    pub server_addr: String,

    /// Directory downloaded images are saved to
    pub download_dir: PathBuf,

    /// Chunk size for upload streams
    pub chunk_size: usize,

    /// Deadline for one upload or download
    pub transfer_timeout: Duration,

    /// Deadline for one listing
    pub list_timeout: Duration,

    /// Maximum concurrent uploads and downloads
    pub max_concurrent_transfers: usize,

    /// Maximum concurrent listings
    pub max_concurrent_listings: usize,

    /// Transport configuration
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("localhost:{DEFAULT_PORT}"),
            download_dir: PathBuf::from(DEFAULT_STORE_DIR),
            chunk_size: DEFAULT_CHUNK_SIZE,
            transfer_timeout: Duration::from_secs(5),
            list_timeout: Duration::from_secs(1),
            max_concurrent_transfers: DEFAULT_TRANSFER_CAPACITY,
            max_concurrent_listings: DEFAULT_LISTING_CAPACITY,
            transport: TransportConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if any field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.server_addr.is_empty() {
            return Err(Error::invalid_config("server address is empty"));
        }
        if self.download_dir.as_os_str().is_empty() {
            return Err(Error::invalid_config("download directory is empty"));
        }
        if self.transfer_timeout.is_zero() || self.list_timeout.is_zero() {
            return Err(Error::invalid_config("timeouts must be positive"));
        }
        if self.max_concurrent_transfers == 0 || self.max_concurrent_listings == 0 {
            return Err(Error::invalid_config("concurrency limits must be positive"));
        }
        validate_chunk_size(self.chunk_size, &self.transport)
    }
}

/// A chunk plus its frame tag must fit in one packet
fn validate_chunk_size(chunk_size: usize, transport: &TransportConfig) -> Result<()> {
    if chunk_size == 0 {
        return Err(Error::invalid_config("chunk size must be positive"));
    }
    if chunk_size + FRAME_TAG_SIZE > transport.max_packet_size {
        return Err(Error::InvalidConfig(
            format!(
                "chunk size {} exceeds packet limit {}",
                chunk_size, transport.max_packet_size
            )
            .into(),
        ));
    }
    Ok(())
}
