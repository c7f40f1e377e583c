//! Receive-side state machine for image streams.
//!
//! Shared by the server's upload handler and the client's download path.
//!
//! ```text
//! AwaitMetadata ──Info──> ReceivingChunks ──End──> Finalizing ──> Complete
//!       │                       │                      │
//!       └───────────────────────┴──────────────────────┴────────> Failed
//! ```

use crate::error::{Error, Result};
use crate::message::{DownloadResponse, UploadRequest};
use bytes::{Bytes, BytesMut};
use imgstream_files::ImageMetadata;

/// Transfer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Waiting for the metadata frame
    AwaitMetadata,
    /// Metadata received, accumulating chunks
    ReceivingChunks,
    /// End frame received, image handed off for persisting
    Finalizing,
    /// Image persisted
    Complete,
    /// Transfer failed
    Failed,
}

/// A fully received image
#[derive(Debug, Clone)]
pub struct AssembledImage {
    /// Metadata from the stream's first frame
    pub info: ImageMetadata,
    /// Concatenated chunk bytes in arrival order
    pub data: Bytes,
}

impl AssembledImage {
    /// Total bytes received
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Accumulates one image stream, enforcing metadata-first ordering
#[derive(Debug)]
pub struct ImageAssembler {
    state: TransferState,
    info: Option<ImageMetadata>,
    buffer: BytesMut,
    received: u64,
    max_size: u64,
}

impl ImageAssembler {
    /// Create an assembler that fails once more than `max_size` bytes arrive
    pub fn new(max_size: u64) -> Self {
        Self {
            state: TransferState::AwaitMetadata,
            info: None,
            buffer: BytesMut::new(),
            received: 0,
            max_size,
        }
    }

    /// Create an assembler without a size limit
    pub fn unbounded() -> Self {
        Self::new(u64::MAX)
    }

    /// Current state
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Bytes received so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Metadata, once received
    pub fn info(&self) -> Option<&ImageMetadata> {
        self.info.as_ref()
    }

    /// Feed one upload stream message
    ///
    /// Returns the assembled image once the `End` message arrives.
    pub fn accept_upload(&mut self, request: UploadRequest) -> Result<Option<AssembledImage>> {
        match request {
            UploadRequest::Info(info) => self.accept_info(info).map(|()| None),
            UploadRequest::ChunkData(chunk) => self.accept_chunk(&chunk).map(|()| None),
            UploadRequest::End => self.finish().map(Some),
        }
    }

    /// Feed one download stream message
    ///
    /// Returns the assembled image once the `End` message arrives.
    pub fn accept_download(
        &mut self,
        response: DownloadResponse,
    ) -> Result<Option<AssembledImage>> {
        match response {
            DownloadResponse::Info(info) => self.accept_info(info).map(|()| None),
            DownloadResponse::ChunkData(chunk) => self.accept_chunk(&chunk).map(|()| None),
            DownloadResponse::End => self.finish().map(Some),
        }
    }

    /// Accept the metadata frame
    ///
    /// # Errors
    ///
    /// Returns `Error::ProtocolViolation` if metadata was already received.
    pub fn accept_info(&mut self, info: ImageMetadata) -> Result<()> {
        match self.state {
            TransferState::AwaitMetadata => {
                self.info = Some(info);
                self.state = TransferState::ReceivingChunks;
                Ok(())
            }
            TransferState::ReceivingChunks => {
                Err(self.fail(Error::protocol("duplicate metadata frame")))
            }
            _ => Err(self.fail(Error::internal("image stream already finished"))),
        }
    }

    /// Append one chunk
    ///
    /// # Errors
    ///
    /// Returns `Error::ProtocolViolation` if no metadata frame preceded the
    /// chunk or if the image grows past the size limit.
    pub fn accept_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        match self.state {
            TransferState::AwaitMetadata => {
                Err(self.fail(Error::protocol("stream must begin with a metadata frame")))
            }
            TransferState::ReceivingChunks => {
                let size = self.received + chunk.len() as u64;
                if size > self.max_size {
                    return Err(self.fail(Error::ProtocolViolation(
                        format!("image exceeds {} bytes", self.max_size).into(),
                    )));
                }

                self.buffer.extend_from_slice(chunk);
                self.received = size;
                Ok(())
            }
            _ => Err(self.fail(Error::internal("image stream already finished"))),
        }
    }

    /// Close the stream and take the assembled image
    ///
    /// # Errors
    ///
    /// Returns `Error::ProtocolViolation` if the stream ended before any
    /// metadata frame arrived.
    pub fn finish(&mut self) -> Result<AssembledImage> {
        if self.state != TransferState::ReceivingChunks {
            let err = match self.state {
                TransferState::AwaitMetadata => {
                    Error::protocol("stream ended before the metadata frame")
                }
                _ => Error::internal("image stream already finished"),
            };
            return Err(self.fail(err));
        }

        let Some(info) = self.info.take() else {
            return Err(self.fail(Error::internal("metadata missing after receipt")));
        };

        self.state = TransferState::Finalizing;
        Ok(AssembledImage {
            info,
            data: self.buffer.split().freeze(),
        })
    }

    /// Fail a stream whose connection closed before its `End` frame
    pub fn interrupted(&mut self) -> Error {
        let err = match self.state {
            TransferState::AwaitMetadata => {
                Error::protocol("stream ended before the metadata frame")
            }
            _ => Error::protocol("stream ended before its end frame"),
        };
        self.fail(err)
    }

    /// Mark the finalized image as persisted
    pub fn complete(&mut self) {
        if self.state == TransferState::Finalizing {
            self.state = TransferState::Complete;
        }
    }

    /// Move to `Failed`, passing the error through
    pub fn fail(&mut self, err: Error) -> Error {
        self.state = TransferState::Failed;
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_states() {
        let mut assembler = ImageAssembler::unbounded();
        assert_eq!(assembler.state(), TransferState::AwaitMetadata);

        assembler
            .accept_upload(UploadRequest::Info(ImageMetadata::new("a.png")))
            .unwrap();
        assert_eq!(assembler.state(), TransferState::ReceivingChunks);

        assembler
            .accept_upload(UploadRequest::ChunkData(Bytes::from_static(b"ab")))
            .unwrap();
        assembler
            .accept_upload(UploadRequest::ChunkData(Bytes::from_static(b"cde")))
            .unwrap();
        assert_eq!(assembler.received(), 5);

        let image = assembler.accept_upload(UploadRequest::End).unwrap().unwrap();
        assert_eq!(assembler.state(), TransferState::Finalizing);
        assert_eq!(image.info.name, "a.png");
        assert_eq!(&image.data[..], b"abcde");
        assert_eq!(image.size(), 5);

        assembler.complete();
        assert_eq!(assembler.state(), TransferState::Complete);
    }

    #[test]
    fn test_metadata_only_stream() {
        let mut assembler = ImageAssembler::unbounded();
        assembler
            .accept_download(DownloadResponse::Info(ImageMetadata::new("empty.png")))
            .unwrap();
        let image = assembler.finish().unwrap();
        assert!(image.data.is_empty());
    }

    #[test]
    fn test_chunk_before_metadata() {
        let mut assembler = ImageAssembler::unbounded();
        let err = assembler
            .accept_download(DownloadResponse::ChunkData(Bytes::from_static(b"x")))
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
        assert_eq!(assembler.state(), TransferState::Failed);
    }

    #[test]
    fn test_chunks_without_end_frame() {
        let mut assembler = ImageAssembler::unbounded();
        assert!(
            assembler
                .accept_download(DownloadResponse::Info(ImageMetadata::new("a.png")))
                .unwrap()
                .is_none()
        );
        assert!(
            assembler
                .accept_download(DownloadResponse::ChunkData(Bytes::from_static(b"part")))
                .unwrap()
                .is_none()
        );

        let err = assembler.interrupted();
        assert!(matches!(err, Error::ProtocolViolation(_)));
        assert!(err.to_string().contains("end frame"));
        assert_eq!(assembler.state(), TransferState::Failed);
        assert!(assembler.finish().is_err());
    }

    #[test]
    fn test_end_before_metadata() {
        let mut assembler = ImageAssembler::unbounded();
        assert!(matches!(
            assembler.accept_upload(UploadRequest::End),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_stream_ends_before_metadata() {
        let mut assembler = ImageAssembler::unbounded();
        assert!(matches!(
            assembler.finish(),
            Err(Error::ProtocolViolation(_))
        ));
        assert_eq!(assembler.state(), TransferState::Failed);
    }

    #[test]
    fn test_duplicate_metadata() {
        let mut assembler = ImageAssembler::unbounded();
        assembler.accept_info(ImageMetadata::new("a.png")).unwrap();
        assert!(matches!(
            assembler.accept_info(ImageMetadata::new("b.png")),
            Err(Error::ProtocolViolation(_))
        ));
        assert_eq!(assembler.state(), TransferState::Failed);
    }

    #[test]
    fn test_size_limit() {
        let mut assembler = ImageAssembler::new(4);
        assembler.accept_info(ImageMetadata::new("a.png")).unwrap();
        assembler.accept_chunk(b"abcd").unwrap();
        assert!(matches!(
            assembler.accept_chunk(b"e"),
            Err(Error::ProtocolViolation(_))
        ));
        assert_eq!(assembler.state(), TransferState::Failed);
        assert!(assembler.finish().is_err());
    }

    #[test]
    fn test_no_input_after_finish() {
        let mut assembler = ImageAssembler::unbounded();
        assembler.accept_info(ImageMetadata::new("a.png")).unwrap();
        assembler.finish().unwrap();
        assert!(matches!(
            assembler.accept_chunk(b"late"),
            Err(Error::Internal(_))
        ));
    }
}
