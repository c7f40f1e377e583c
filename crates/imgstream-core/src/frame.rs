//! Frame encoding and decoding for the imgstream wire protocol.
//!
//! Each transport packet carries exactly one frame: a one-byte type tag
//! followed by the frame body. Structured bodies are bincode-encoded; chunk
//! bodies are the raw bytes and are decoded without copying.
//!
//! ```text
//! ┌──────────┬───────────────────────────────┐
//! │ tag (u8) │ body                          │
//! └──────────┴───────────────────────────────┘
//! ```
//!
//! The tag is the union discriminator. `0x00` is reserved and decodes as a
//! missing discriminator; any tag outside the table is rejected. Neither is
//! ever mapped to a default frame.
//!
//! Image streams close with an explicit `End` frame, so a connection that
//! drops mid-stream is never mistaken for a complete image.

use crate::error::{Error, Result};
use bincode::Options;
use bytes::{BufMut, Bytes, BytesMut};
use imgstream_files::ImageMetadata;
use imgstream_transport::MAX_PACKET_SIZE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Size of the frame type tag in bytes
pub const FRAME_TAG_SIZE: usize = 1;

/// Frame types carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Reserved (missing discriminator)
    Reserved = 0x00,
    /// Call header opening a connection
    Call = 0x01,
    /// Image metadata, first frame of an image stream
    Info = 0x02,
    /// Image data chunk
    Chunk = 0x03,
    /// Upload reply
    Uploaded = 0x04,
    /// Listing reply
    Listing = 0x05,
    /// Error status reply
    Status = 0x06,
    /// End of an image stream
    End = 0x07,
}

impl TryFrom<u8> for FrameType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Reserved),
            0x01 => Ok(Self::Call),
            0x02 => Ok(Self::Info),
            0x03 => Ok(Self::Chunk),
            0x04 => Ok(Self::Uploaded),
            0x05 => Ok(Self::Listing),
            0x06 => Ok(Self::Status),
            0x07 => Ok(Self::End),
            _ => Err(Error::ProtocolViolation(
                format!("invalid frame type: 0x{value:02X}").into(),
            )),
        }
    }
}

/// Operation requested by the first frame of a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    /// Client-streaming upload; image frames follow
    Upload,
    /// Server-streaming download of one image
    Download {
        /// Store key of the requested image
        name: String,
    },
    /// Unary listing
    List {
        /// Substring filter on names; empty matches everything
        filter: String,
    },
}

/// Reply to a completed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    /// Name the image was stored under
    pub name: String,
    /// Total bytes received
    pub size: u64,
}

/// Error classes reported to the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// Requested image does not exist
    NotFound,
    /// Image name rejected as a store key
    InvalidName,
    /// Peer sent an out-of-order or malformed stream
    ProtocolViolation,
    /// Unclassified server-side failure
    Internal,
}

/// Error reply carrying a status code and message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Error class
    pub code: StatusCode,
    /// Human-readable detail
    pub message: String,
}

impl Status {
    /// Build the status reported for `err`
    pub fn from_error(err: &Error) -> Self {
        let message = match err {
            Error::NotFound(m) | Error::ProtocolViolation(m) | Error::Internal(m) => m.to_string(),
            Error::InvalidName(m) => m.clone(),
            other => other.to_string(),
        };

        Self {
            code: err.status_code(),
            message,
        }
    }
}

/// A decoded wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Call header
    Call(Call),
    /// Image metadata
    Info(ImageMetadata),
    /// Image data chunk
    Chunk(Bytes),
    /// Upload reply
    Uploaded(UploadSummary),
    /// Listing reply
    Listing(Vec<ImageMetadata>),
    /// Error reply
    Status(Status),
    /// Every chunk of the image stream was sent
    End,
}

impl Frame {
    /// Get the frame type
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Call(_) => FrameType::Call,
            Frame::Info(_) => FrameType::Info,
            Frame::Chunk(_) => FrameType::Chunk,
            Frame::Uploaded(_) => FrameType::Uploaded,
            Frame::Listing(_) => FrameType::Listing,
            Frame::Status(_) => FrameType::Status,
            Frame::End => FrameType::End,
        }
    }

    /// Encode the frame into one packet payload
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.frame_type() as u8);

        match self {
            Frame::Chunk(data) => buf.put_slice(data),
            Frame::Call(call) => encode_body(&mut buf, call)?,
            Frame::Info(info) => encode_body(&mut buf, info)?,
            Frame::Uploaded(summary) => encode_body(&mut buf, summary)?,
            Frame::Listing(images) => encode_body(&mut buf, images)?,
            Frame::Status(status) => encode_body(&mut buf, status)?,
            Frame::End => {}
        }

        Ok(buf.freeze())
    }

    /// Decode a frame from one packet payload
    ///
    /// # Errors
    ///
    /// Returns `Error::ProtocolViolation` for an empty packet, a reserved or
    /// unknown tag, or a body that does not decode as the tagged type.
    pub fn decode(packet: Bytes) -> Result<Self> {
        let Some(&tag) = packet.first() else {
            return Err(Error::protocol("empty frame"));
        };
        let body = packet.slice(FRAME_TAG_SIZE..);

        let frame = match FrameType::try_from(tag)? {
            FrameType::Reserved => return Err(Error::protocol("missing frame discriminator")),
            FrameType::Chunk => Frame::Chunk(body),
            FrameType::Call => Frame::Call(decode_body(&body)?),
            FrameType::Info => Frame::Info(decode_body(&body)?),
            FrameType::Uploaded => Frame::Uploaded(decode_body(&body)?),
            FrameType::Listing => Frame::Listing(decode_body(&body)?),
            FrameType::Status => Frame::Status(decode_body(&body)?),
            FrameType::End if body.is_empty() => Frame::End,
            FrameType::End => return Err(Error::protocol("end frame carries a body")),
        };

        Ok(frame)
    }
}

/// Bincode options shared by both directions
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_PACKET_SIZE as u64)
        .reject_trailing_bytes()
}

fn encode_body<T: Serialize>(buf: &mut BytesMut, value: &T) -> Result<()> {
    let body = codec()
        .serialize(value)
        .map_err(|e| Error::Internal(format!("frame serialization failed: {e}").into()))?;
    buf.put_slice(&body);
    Ok(())
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    codec()
        .deserialize(body)
        .map_err(|e| Error::ProtocolViolation(format!("malformed frame body: {e}").into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) {
        let encoded = frame.encode().unwrap();
        assert_eq!(encoded[0], frame.frame_type() as u8);
        assert_eq!(Frame::decode(encoded).unwrap(), frame);
    }

    #[test]
    fn test_frame_roundtrip() {
        roundtrip(Frame::Call(Call::Upload));
        roundtrip(Frame::Call(Call::Download {
            name: "java.jpg".into(),
        }));
        roundtrip(Frame::Call(Call::List {
            filter: String::new(),
        }));
        roundtrip(Frame::Info(ImageMetadata::new("chicago.jpg")));
        roundtrip(Frame::Chunk(Bytes::from_static(b"\x89PNG\r\n")));
        roundtrip(Frame::Chunk(Bytes::new()));
        roundtrip(Frame::Uploaded(UploadSummary {
            name: "scala.png".into(),
            size: 4096,
        }));
        roundtrip(Frame::Listing(vec![
            ImageMetadata::new("a.png"),
            ImageMetadata::new("b.jpg"),
        ]));
        roundtrip(Frame::Status(Status {
            code: StatusCode::NotFound,
            message: "missing.png".into(),
        }));
        roundtrip(Frame::End);
    }

    #[test]
    fn test_end_frame_is_bare_tag() {
        assert_eq!(&Frame::End.encode().unwrap()[..], &[0x07]);
        assert!(matches!(
            Frame::decode(Bytes::from_static(&[0x07, 0x00])),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_chunk_body_is_raw() {
        let encoded = Frame::Chunk(Bytes::from_static(b"abc")).encode().unwrap();
        assert_eq!(&encoded[..], &[0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn test_missing_discriminator_rejected() {
        let err = Frame::decode(Bytes::from_static(&[0x00, 1, 2])).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
        assert!(err.to_string().contains("missing frame discriminator"));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        for tag in [0x08u8, 0x10, 0xFF] {
            let err = Frame::decode(Bytes::from(vec![tag])).unwrap_err();
            assert!(matches!(err, Error::ProtocolViolation(_)));
            assert!(err.to_string().contains("invalid frame type"));
        }
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert!(matches!(
            Frame::decode(Bytes::new()),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_malformed_body_rejected() {
        // Info tag followed by garbage that is not bincode metadata
        let packet = Bytes::from_static(&[0x02, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(
            Frame::decode(packet),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut packet = Frame::Call(Call::Upload).encode().unwrap().to_vec();
        packet.push(0);
        assert!(Frame::decode(Bytes::from(packet)).is_err());
    }

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::try_from(0x03).unwrap(), FrameType::Chunk);
        assert_eq!(FrameType::try_from(0x00).unwrap(), FrameType::Reserved);
        assert_eq!(FrameType::try_from(0x07).unwrap(), FrameType::End);
        assert!(FrameType::try_from(0x08).is_err());
    }
}
