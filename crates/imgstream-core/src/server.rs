//! Transfer server.
//!
//! [`ImageServer`] accepts TCP connections and runs each one as an
//! independent task. [`ImageService`] holds the call handlers and works over
//! any byte stream, so it can be driven directly in tests.
//!
//! # Call Flow
//!
//! ```text
//! Client                          Server
//!     |                               |
//!     |-- Call(Upload) -------------->|
//!     |-- Info ---------------------->|   AwaitMetadata
//!     |-- Chunk 0..N ---------------->|   ReceivingChunks
//!     |-- End ----------------------->|
//!     |-- [end of stream] ----------->|   Finalizing (store save)
//!     |<--------------- Uploaded -----|   Complete
//!     |                               |
//!     |-- Call(Download{name}) ------>|
//!     |<------------------- Info -----|   SendMetadata
//!     |<------------ Chunk 0..N ------|   StreamChunks
//!     |<-------------------- End -----|
//!     |<------- [end of stream] ------|   Complete
//! ```
//!
//! Any failure is answered with a single `Status` frame. An upload whose
//! connection closes before its `End` frame is discarded, and a peer that
//! stays silent for the idle timeout loses its call.

use crate::config::{DEFAULT_IDLE_TIMEOUT, ServerConfig};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::frame::{Call, Frame, Status, UploadSummary};
use crate::message::{DownloadResponse, UploadRequest};
use crate::transfer::ImageAssembler;
use imgstream_files::store::validate_name;
use imgstream_files::{FileChunker, FileStore};
use imgstream_transport::PacketListener;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;

/// How long a failed call keeps reading so the peer can collect its status
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Call handlers for upload, download and listing
#[derive(Debug, Clone)]
pub struct ImageService {
    store: FileStore,
    chunker: FileChunker,
    max_image_size: u64,
    idle_timeout: Duration,
}

impl ImageService {
    /// Create a service over `store`
    pub fn new(store: FileStore, chunk_size: usize, max_image_size: u64) -> Self {
        Self {
            store,
            chunker: FileChunker::with_chunk_size(chunk_size),
            max_image_size,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Fail calls whose peer sends nothing for `idle_timeout`
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Backing store
    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Serve the single call carried by `conn`
    ///
    /// On failure the error is sent to the peer as a `Status` frame and also
    /// returned.
    pub async fn handle<S>(&self, mut conn: Connection<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let call = match conn.recv_within(self.idle_timeout, "call header").await {
            Ok(Some(Frame::Call(call))) => call,
            Ok(Some(other)) => {
                let err = Error::ProtocolViolation(
                    format!("expected call header, got {:?} frame", other.frame_type()).into(),
                );
                return reject(&mut conn, err).await;
            }
            Ok(None) => return Err(Error::protocol("connection closed before call header")),
            Err(e) => return reject(&mut conn, e).await,
        };

        let result = match &call {
            Call::Upload => self.upload(&mut conn).await,
            Call::Download { name } => self.download(&mut conn, name).await,
            Call::List { filter } => self.list(&mut conn, filter).await,
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => reject(&mut conn, e).await,
        }
    }

    async fn upload<S>(&self, conn: &mut Connection<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut assembler = ImageAssembler::new(self.max_image_size);

        let image = loop {
            let Some(frame) = conn.recv_within(self.idle_timeout, "upload frame").await? else {
                return Err(assembler.interrupted());
            };
            let request = UploadRequest::try_from(frame).map_err(|e| assembler.fail(e))?;
            match &request {
                UploadRequest::Info(info) => {
                    tracing::debug!("Receiving image {}", info.name);
                    validate_name(&info.name).map_err(|e| assembler.fail(e.into()))?;
                }
                UploadRequest::ChunkData(chunk) => {
                    tracing::trace!("Chunk of {} bytes received", chunk.len());
                }
                UploadRequest::End => tracing::trace!("End of upload stream"),
            }
            if let Some(image) = assembler.accept_upload(request)? {
                break image;
            }
        };

        // The peer half-closes right after its end frame
        if conn
            .recv_within(self.idle_timeout, "end of upload stream")
            .await?
            .is_some()
        {
            return Err(assembler.fail(Error::protocol("frame after the end of the upload")));
        }

        let size = image.size();
        let name = match self
            .store
            .save(&image.info.name, &image.info.image_type, &image.data)
            .await
        {
            Ok(name) => name,
            Err(e) => {
                return Err(assembler.fail(Error::Internal(
                    format!("cannot save image to the store: {e}").into(),
                )));
            }
        };
        assembler.complete();

        conn.send(&Frame::Uploaded(UploadSummary {
            name: name.clone(),
            size,
        }))
        .await?;
        conn.finish().await?;

        tracing::info!("Saved image {} ({} bytes)", name, size);
        Ok(())
    }

    async fn download<S>(&self, conn: &mut Connection<S>, name: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (info, file) = self.store.open_image(name).await?;
        conn.send(&DownloadResponse::Info(info).into()).await?;

        let mut chunks = self.chunker.reader(file);
        loop {
            let chunk = chunks.next_chunk().await.map_err(|e| {
                Error::Internal(format!("cannot read chunk of {name}: {e}").into())
            })?;
            let Some(chunk) = chunk else {
                break;
            };
            conn.send(&DownloadResponse::ChunkData(chunk).into()).await?;
        }
        conn.send(&DownloadResponse::End.into()).await?;
        conn.finish().await?;

        tracing::info!("Served image {} ({} bytes)", name, chunks.position());
        Ok(())
    }

    async fn list<S>(&self, conn: &mut Connection<S>, filter: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let images = self
            .store
            .list_matching(filter)
            .await
            .map_err(|e| Error::Internal(format!("cannot list images: {e}").into()))?;
        let count = images.len();

        conn.send(&Frame::Listing(images)).await?;
        conn.finish().await?;

        tracing::debug!("Listed {} images (filter={:?})", count, filter);
        Ok(())
    }
}

/// Report `err` to the peer, then hand it back
async fn reject<S>(conn: &mut Connection<S>, err: Error) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::warn!("Call failed: {}", err);

    let status = Frame::Status(Status::from_error(&err));
    if let Err(send_err) = conn.send(&status).await {
        tracing::debug!("Could not deliver status to peer: {}", send_err);
        return Err(err);
    }
    if conn.finish().await.is_ok() {
        // Keep reading until the peer stops sending so closing the socket
        // does not reset the connection before the status is read.
        let _ = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while let Ok(Some(_)) = conn.recv().await {}
        })
        .await;
    }

    Err(err)
}

/// TCP front end for [`ImageService`]
pub struct ImageServer {
    listener: PacketListener,
    service: Arc<ImageService>,
    shutdown_grace: Duration,
}

impl ImageServer {
    /// Open the store and bind the listener
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for an invalid configuration,
    /// `Error::Io` if the store root cannot be created, and
    /// `Error::Connection` if the address cannot be bound.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let store = FileStore::open(&config.store_root).await?;
        let listener = PacketListener::bind(&config.listen_addr, config.transport.clone()).await?;
        let service = ImageService::new(store, config.chunk_size, config.max_image_size)
            .with_idle_timeout(config.idle_timeout);

        Ok(Self {
            listener,
            service: Arc::new(service),
            shutdown_grace: config.shutdown_grace,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Backing store
    pub fn store(&self) -> &FileStore {
        self.service.store()
    }

    /// Serve until the process exits
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then wait for in-flight calls
    ///
    /// Calls still running once the shutdown grace period passes are
    /// aborted.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            "Serving images from {} on {}",
            self.store().root().display(),
            self.local_addr()?
        );

        tokio::pin!(shutdown);
        let mut calls = JoinSet::new();

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let service = Arc::clone(&self.service);
                        calls.spawn(async move {
                            if let Err(e) = service.handle(Connection::new(stream)).await {
                                tracing::debug!("Call from {} ended with error: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = calls.join_next(), if !calls.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!("Call task failed: {}", e);
                    }
                }
            }
        }

        tracing::info!("Shutting down, waiting for {} calls", calls.len());
        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while calls.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                "Aborting {} calls still running after {:?}",
                calls.len(),
                self.shutdown_grace
            );
            calls.shutdown().await;
        }
        Ok(())
    }
}
