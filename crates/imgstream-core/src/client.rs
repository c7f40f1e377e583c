//! Transfer client.
//!
//! Every call opens its own connection, runs under the configured deadline
//! and holds a limiter slot for its whole network phase. Transfers and
//! listings are limited separately.

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::frame::{Call, Frame, UploadSummary};
use crate::limiter::ConcurrencyLimiter;
use crate::message::{DownloadResponse, UploadRequest};
use crate::transfer::{AssembledImage, ImageAssembler};
use imgstream_files::store::validate_name;
use imgstream_files::{FileChunker, FileStore, ImageMetadata};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::net::TcpStream;

/// Client for a remote image server
#[derive(Debug, Clone)]
pub struct ImageClient {
    config: Arc<ClientConfig>,
    transfers: ConcurrencyLimiter,
    listings: ConcurrencyLimiter,
    downloads: FileStore,
    chunker: FileChunker,
}

impl ImageClient {
    /// Create a client, creating the download directory if needed
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for an invalid configuration and
    /// `Error::Io` if the download directory cannot be created.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let downloads = FileStore::open(&config.download_dir).await?;
        Ok(Self {
            transfers: ConcurrencyLimiter::transfers(config.max_concurrent_transfers),
            listings: ConcurrencyLimiter::listings(config.max_concurrent_listings),
            chunker: FileChunker::with_chunk_size(config.chunk_size),
            downloads,
            config: Arc::new(config),
        })
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Limiter shared by uploads and downloads
    pub fn transfer_limiter(&self) -> &ConcurrencyLimiter {
        &self.transfers
    }

    /// Limiter for listings
    pub fn listing_limiter(&self) -> &ConcurrencyLimiter {
        &self.listings
    }

    /// Local store downloads are written to
    pub fn downloads(&self) -> &FileStore {
        &self.downloads
    }

    /// Upload the file at `path` under its file name
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the local file does not exist (no
    /// connection is made), `Error::Timeout` if the transfer deadline passes,
    /// and the server's error if it rejects the image.
    pub async fn upload_image(&self, path: impl AsRef<Path>) -> Result<UploadSummary> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|e| local_file_error(path, e))?;
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(Error::Io(format!("{} is not a regular file", path.display())));
        }

        let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
            Error::InvalidName(format!("{} has no usable file name", path.display()))
        })?;
        validate_name(name)?;
        let info = ImageMetadata::from_fs(name, &meta);

        let _slot = self.transfers.acquire().await?;
        tracing::debug!("Uploading {} ({} bytes)", path.display(), meta.len());

        let summary = deadline(
            self.config.transfer_timeout,
            "upload",
            self.send_upload(info, file),
        )
        .await?;

        tracing::info!("Uploaded {} ({} bytes)", summary.name, summary.size);
        Ok(summary)
    }

    /// Download the image `name` into the download directory
    ///
    /// The local file is written only once the whole stream has arrived, so a
    /// failed download leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the server has no such image,
    /// `Error::Timeout` if the transfer deadline passes, and
    /// `Error::ProtocolViolation` if the stream does not begin with metadata
    /// or closes before its `End` frame.
    pub async fn download_image(&self, name: &str) -> Result<PathBuf> {
        let path = self.downloads.path_of(name)?;

        let _slot = self.transfers.acquire().await?;
        let image = deadline(
            self.config.transfer_timeout,
            "download",
            self.receive_download(name),
        )
        .await?;

        self.downloads
            .save(name, &image.info.image_type, &image.data)
            .await?;

        tracing::info!("Downloaded {} ({} bytes)", name, image.size());
        Ok(path)
    }

    /// List every image on the server
    pub async fn list_images(&self) -> Result<Vec<ImageMetadata>> {
        self.list_images_matching("").await
    }

    /// List the server's images whose name contains `filter`
    pub async fn list_images_matching(&self, filter: &str) -> Result<Vec<ImageMetadata>> {
        let _slot = self.listings.acquire().await?;

        let images = deadline(self.config.list_timeout, "list", async {
            let mut conn = self.connect().await?;
            conn.send(&Frame::Call(Call::List {
                filter: filter.to_string(),
            }))
            .await?;
            conn.finish().await?;

            match conn.recv().await? {
                Some(Frame::Listing(images)) => Ok(images),
                reply => Err(unexpected_reply(reply, "listing")),
            }
        })
        .await?;

        tracing::debug!("Server listed {} images", images.len());
        Ok(images)
    }

    async fn connect(&self) -> Result<Connection<TcpStream>> {
        let packets =
            imgstream_transport::connect(&self.config.server_addr, &self.config.transport).await?;
        Ok(Connection::new(packets))
    }

    async fn send_upload(&self, info: ImageMetadata, file: File) -> Result<UploadSummary> {
        let mut conn = self.connect().await?;
        let name = info.name.clone();

        if let Err(e) = conn.send(&Frame::Call(Call::Upload)).await {
            return Err(rejection_or(&mut conn, e).await);
        }
        if let Err(e) = conn.send(&UploadRequest::Info(info).into()).await {
            return Err(rejection_or(&mut conn, e).await);
        }

        let mut chunks = self.chunker.reader(file);
        loop {
            let chunk = match chunks.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => return Err(Error::Io(format!("cannot read {name}: {e}"))),
            };
            tracing::trace!("Sending chunk of {} bytes", chunk.len());
            if let Err(e) = conn.send(&UploadRequest::ChunkData(chunk).into()).await {
                return Err(rejection_or(&mut conn, e).await);
            }
        }
        if let Err(e) = conn.send(&UploadRequest::End.into()).await {
            return Err(rejection_or(&mut conn, e).await);
        }
        if let Err(e) = conn.finish().await {
            return Err(rejection_or(&mut conn, e).await);
        }
        tracing::debug!("Sent {} bytes of {}", chunks.position(), name);

        match conn.recv().await? {
            Some(Frame::Uploaded(summary)) => Ok(summary),
            reply => Err(unexpected_reply(reply, "upload summary")),
        }
    }

    async fn receive_download(&self, name: &str) -> Result<AssembledImage> {
        let mut conn = self.connect().await?;
        conn.send(&Frame::Call(Call::Download {
            name: name.to_string(),
        }))
        .await?;
        conn.finish().await?;

        let mut assembler = ImageAssembler::unbounded();
        while let Some(frame) = conn.recv().await? {
            if let Frame::Status(status) = frame {
                return Err(assembler.fail(status.into()));
            }
            let response = DownloadResponse::try_from(frame).map_err(|e| assembler.fail(e))?;
            if let Some(image) = assembler.accept_download(response)? {
                return Ok(image);
            }
        }

        Err(assembler.interrupted())
    }
}

/// Run `call` under `limit`, mapping expiry to `Error::Timeout`
async fn deadline<T, F>(limit: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} exceeded its {:?} deadline", operation, limit);
            Err(Error::timeout(operation))
        }
    }
}

/// After a failed send, prefer the server's explanation if it sent one
async fn rejection_or(conn: &mut Connection<TcpStream>, err: Error) -> Error {
    match conn.recv().await {
        Ok(Some(Frame::Status(status))) => status.into(),
        _ => err,
    }
}

fn unexpected_reply(reply: Option<Frame>, expected: &str) -> Error {
    match reply {
        Some(Frame::Status(status)) => status.into(),
        Some(other) => Error::ProtocolViolation(
            format!("expected {expected}, got {:?} frame", other.frame_type()).into(),
        ),
        None => Error::ProtocolViolation(
            format!("server closed the stream before sending the {expected}").into(),
        ),
    }
}

fn local_file_error(path: &Path, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::NotFound(path.display().to_string().into())
    } else {
        Error::Io(format!("cannot open {}: {err}", path.display()))
    }
}
