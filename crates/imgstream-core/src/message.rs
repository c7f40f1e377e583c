//! Image stream messages.
//!
//! An image stream is one `Info` message, zero or more `ChunkData` messages
//! and a closing `End` message. A stream that stops before `End` is
//! incomplete and never yields an image.
//! Uploads carry [`UploadRequest`]s from client to server and downloads
//! carry [`DownloadResponse`]s from server to client.

use crate::error::{Error, Result};
use crate::frame::Frame;
use bytes::Bytes;
use imgstream_files::ImageMetadata;

/// Client-to-server message of an upload stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRequest {
    /// Metadata of the image being uploaded
    Info(ImageMetadata),
    /// Next chunk of image bytes
    ChunkData(Bytes),
    /// Every chunk was sent
    End,
}

/// Server-to-client message of a download stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResponse {
    /// Metadata of the image being downloaded
    Info(ImageMetadata),
    /// Next chunk of image bytes
    ChunkData(Bytes),
    /// Every chunk was sent
    End,
}

impl From<UploadRequest> for Frame {
    fn from(request: UploadRequest) -> Self {
        match request {
            UploadRequest::Info(info) => Frame::Info(info),
            UploadRequest::ChunkData(chunk) => Frame::Chunk(chunk),
            UploadRequest::End => Frame::End,
        }
    }
}

impl TryFrom<Frame> for UploadRequest {
    type Error = Error;

    fn try_from(frame: Frame) -> Result<Self> {
        match frame {
            Frame::Info(info) => Ok(UploadRequest::Info(info)),
            Frame::Chunk(chunk) => Ok(UploadRequest::ChunkData(chunk)),
            Frame::End => Ok(UploadRequest::End),
            other => Err(Error::ProtocolViolation(
                format!("unexpected {:?} frame in upload stream", other.frame_type()).into(),
            )),
        }
    }
}

impl From<DownloadResponse> for Frame {
    fn from(response: DownloadResponse) -> Self {
        match response {
            DownloadResponse::Info(info) => Frame::Info(info),
            DownloadResponse::ChunkData(chunk) => Frame::Chunk(chunk),
            DownloadResponse::End => Frame::End,
        }
    }
}

impl TryFrom<Frame> for DownloadResponse {
    type Error = Error;

    fn try_from(frame: Frame) -> Result<Self> {
        match frame {
            Frame::Info(info) => Ok(DownloadResponse::Info(info)),
            Frame::Chunk(chunk) => Ok(DownloadResponse::ChunkData(chunk)),
            Frame::End => Ok(DownloadResponse::End),
            other => Err(Error::ProtocolViolation(
                format!("unexpected {:?} frame in download stream", other.frame_type()).into(),
            )),
        }
    }
}
