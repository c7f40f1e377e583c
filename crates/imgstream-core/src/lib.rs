//! # imgstream Core
//!
//! Core protocol implementation for imgstream, a chunked image transfer
//! service.
//!
//! This crate provides:
//! - Frame encoding and decoding (zero-copy chunk payloads)
//! - Upload and download stream assembly
//! - Per-class concurrency limiting
//! - Transfer client and server
//! - Error types and handling
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  ImageClient / ImageServer                       │
//! │   (deadlines, admission limits, store access)                    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Calls                                    │
//! │   (upload, download, list: one call per connection)              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Frames                                   │
//! │   (tagged protocol data units over length-prefixed packets)      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod limiter;
pub mod message;
pub mod server;
pub mod transfer;

pub use client::ImageClient;
pub use config::{ClientConfig, DEFAULT_PORT, ServerConfig};
pub use connection::Connection;
pub use error::{Error, Result};
pub use frame::{Call, Frame, FrameType, Status, StatusCode, UploadSummary};
pub use imgstream_files::ImageMetadata;
pub use limiter::{ConcurrencyLimiter, LimiterMetrics, OperationClass, Slot};
pub use message::{DownloadResponse, UploadRequest};
pub use server::{ImageServer, ImageService};
pub use transfer::{AssembledImage, ImageAssembler, TransferState};
