//! Server test fixture for integration testing
//!
//! Runs a real [`ImageServer`] on an ephemeral loopback port against a
//! temporary store, and hands out clients wired to it.
//!
//! # Example
//!
//! ```ignore
//! use imgstream_integration_tests::ServerFixture;
//!
//! #[tokio::test]
//! async fn test_basic_upload() {
//!     let fixture = ServerFixture::start().await.unwrap();
//!     let client = fixture.client().await.unwrap();
//!
//!     let path = fixture.stage("python.png", b"...").unwrap();
//!     client.upload_image(&path).await.unwrap();
//!
//!     fixture.shutdown().await.unwrap();
//! }
//! ```

use imgstream_core::{ClientConfig, ImageClient, ImageServer, Result, ServerConfig};
use imgstream_files::FileStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A running server with a temporary store
pub struct ServerFixture {
    /// Address the server listens on
    pub addr: SocketAddr,
    store: FileStore,
    dir: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<()>>>,
}

impl ServerFixture {
    /// Start a server with the default configuration
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| {}).await
    }

    /// Start a server after adjusting its configuration
    ///
    /// The listen address and store root are always overridden.
    pub async fn start_with(configure: impl FnOnce(&mut ServerConfig)) -> Result<Self> {
        let dir = TempDir::new()?;

        let mut config = ServerConfig {
            shutdown_grace: Duration::from_millis(500),
            ..ServerConfig::default()
        };
        configure(&mut config);
        config.listen_addr = "127.0.0.1:0".to_string();
        config.store_root = dir.path().join("files");

        let server = ImageServer::bind(config).await?;
        let addr = server.local_addr()?;
        let store = server.store().clone();

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_with_shutdown(async move {
            let _ = rx.await;
        }));

        tracing::debug!("Test server listening on {}", addr);
        Ok(Self {
            addr,
            store,
            dir,
            shutdown: Some(tx),
            task: Some(task),
        })
    }

    /// Server-side store
    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Client configuration pointing at this server
    ///
    /// Downloads go to a directory separate from the server store.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            server_addr: self.addr.to_string(),
            download_dir: self.dir.path().join("downloads"),
            transfer_timeout: Duration::from_secs(30),
            list_timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        }
    }

    /// Client with the default test configuration
    pub async fn client(&self) -> Result<ImageClient> {
        self.client_with(|_| {}).await
    }

    /// Client after adjusting the test configuration
    pub async fn client_with(
        &self,
        configure: impl FnOnce(&mut ClientConfig),
    ) -> Result<ImageClient> {
        let mut config = self.client_config();
        configure(&mut config);
        ImageClient::new(config).await
    }

    /// Client-side staging directory
    pub fn staging_dir(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    /// Write `data` into the staging directory and return its path
    pub fn stage(&self, name: &str, data: &[u8]) -> Result<PathBuf> {
        let dir = self.staging_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        std::fs::write(&path, data)?;
        Ok(path)
    }

    /// Stop the server and wait for in-flight calls
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| imgstream_core::Error::Internal(e.to_string().into()))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerFixture {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Deterministic, non-repeating-looking image bytes
pub fn test_image(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}
