//! Configuration file for the imgstream CLI.

use imgstream_core::{ClientConfig, ServerConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// imgstream configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerSection,
    /// Client configuration
    #[serde(default)]
    pub client: ClientSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Store directory
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// Chunk size for downloads in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Largest accepted upload in bytes
    #[serde(default = "default_max_image_size")]
    pub max_image_size: u64,
    /// Idle peer timeout in milliseconds
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Grace period for in-flight calls on shutdown in milliseconds
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

/// `[client]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSection {
    /// Server address (`host:port`)
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Directory downloads are written to
    #[serde(default = "default_store_dir")]
    pub download_dir: PathBuf,
    /// Directory `upload` reads from when no paths are given
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Chunk size for uploads in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Upload/download deadline in milliseconds
    #[serde(default = "default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,
    /// Listing deadline in milliseconds
    #[serde(default = "default_list_timeout_ms")]
    pub list_timeout_ms: u64,
    /// Maximum concurrent uploads and downloads
    #[serde(default = "default_max_transfers")]
    pub max_concurrent_transfers: usize,
    /// Maximum concurrent listings
    #[serde(default = "default_max_listings")]
    pub max_concurrent_listings: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_listen_addr() -> String {
    ServerConfig::default().listen_addr
}

fn default_server_addr() -> String {
    ClientConfig::default().server_addr
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(imgstream_core::config::DEFAULT_STORE_DIR)
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_chunk_size() -> usize {
    imgstream_files::DEFAULT_CHUNK_SIZE
}

fn default_max_image_size() -> u64 {
    imgstream_core::config::DEFAULT_MAX_IMAGE_SIZE
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_transfer_timeout_ms() -> u64 {
    5_000
}

fn default_list_timeout_ms() -> u64 {
    1_000
}

fn default_max_transfers() -> usize {
    10
}

fn default_max_listings() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            store_dir: default_store_dir(),
            chunk_size: default_chunk_size(),
            max_image_size: default_max_image_size(),
            idle_timeout_ms: default_idle_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            download_dir: default_store_dir(),
            staging_dir: default_staging_dir(),
            chunk_size: default_chunk_size(),
            transfer_timeout_ms: default_transfer_timeout_ms(),
            list_timeout_ms: default_list_timeout_ms(),
            max_concurrent_transfers: default_max_transfers(),
            max_concurrent_listings: default_max_listings(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("imgstream/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        self.server_config().validate()?;
        self.client_config().validate()?;
        Ok(())
    }

    /// Library configuration for `serve`
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.server.listen_addr.clone(),
            store_root: self.server.store_dir.clone(),
            chunk_size: self.server.chunk_size,
            max_image_size: self.server.max_image_size,
            idle_timeout: Duration::from_millis(self.server.idle_timeout_ms),
            shutdown_grace: Duration::from_millis(self.server.shutdown_grace_ms),
            ..ServerConfig::default()
        }
    }

    /// Library configuration for the client commands
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            server_addr: self.client.server_addr.clone(),
            download_dir: self.client.download_dir.clone(),
            chunk_size: self.client.chunk_size,
            transfer_timeout: Duration::from_millis(self.client.transfer_timeout_ms),
            list_timeout: Duration::from_millis(self.client.list_timeout_ms),
            max_concurrent_transfers: self.client.max_concurrent_transfers,
            max_concurrent_listings: self.client.max_concurrent_listings,
            ..ClientConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:50051");
        assert_eq!(config.client.server_addr, "localhost:50051");
        assert_eq!(config.client.staging_dir, PathBuf::from("tmp"));
        assert_eq!(config.server.chunk_size, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "DEBUG".to_string();
        config.client.chunk_size = 0;
        assert!(config.validate().is_err());

        config.client.chunk_size = 1024;
        config.client.list_timeout_ms = 0;
        assert!(config.validate().is_err());

        config.client.list_timeout_ms = 1_000;
        config.server.idle_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [client]
            server_addr = "images.internal:6000"
            "#,
        )
        .unwrap();

        assert_eq!(config.client.server_addr, "images.internal:6000");
        assert_eq!(config.client.transfer_timeout_ms, 5_000);
        assert_eq!(config.server.store_dir, PathBuf::from("files"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.server.listen_addr = "127.0.0.1:7000".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.listen_addr, "127.0.0.1:7000");
        assert_eq!(loaded.client.chunk_size, config.client.chunk_size);
    }

    #[test]
    fn test_library_conversion() {
        let mut config = Config::default();
        config.client.transfer_timeout_ms = 250;
        config.server.store_dir = PathBuf::from("/srv/images");
        config.server.shutdown_grace_ms = 100;

        let client = config.client_config();
        assert_eq!(client.transfer_timeout, Duration::from_millis(250));
        assert_eq!(client.list_timeout, Duration::from_secs(1));

        let server = config.server_config();
        assert_eq!(server.store_root, PathBuf::from("/srv/images"));
        assert_eq!(server.idle_timeout, Duration::from_secs(30));
        assert_eq!(server.shutdown_grace, Duration::from_millis(100));
    }
}
