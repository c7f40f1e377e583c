//! File chunking.

use crate::DEFAULT_CHUNK_SIZE;
use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Chunk a byte source into fixed-size pieces
#[derive(Debug, Clone, Copy)]
pub struct FileChunker {
    chunk_size: usize,
}

impl FileChunker {
    /// Create a new chunker with default chunk size
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create a new chunker with custom chunk size (a size of 0 is raised to 1)
    pub fn with_chunk_size(size: usize) -> Self {
        Self {
            chunk_size: size.max(1),
        }
    }

    /// Get chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Calculate number of chunks for a file
    pub fn chunk_count(&self, file_size: u64) -> u64 {
        file_size.div_ceil(self.chunk_size as u64)
    }

    /// Split an in-memory buffer into chunks, in order
    pub fn split<'a>(&self, data: &'a [u8]) -> std::slice::Chunks<'a, u8> {
        data.chunks(self.chunk_size)
    }

    /// Wrap an async reader so it yields chunks of this size
    pub fn reader<R: AsyncRead + Unpin>(&self, reader: R) -> ChunkReader<R> {
        ChunkReader {
            reader,
            chunk_size: self.chunk_size,
            position: 0,
        }
    }
}

impl Default for FileChunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a source as consecutive full chunks followed by one short final chunk
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: usize,
    position: u64,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Read the next chunk, or `None` once the source is exhausted
    ///
    /// Short reads from the underlying source are coalesced, so every chunk
    /// except the last is exactly `chunk_size` bytes.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;

        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }

        buf.truncate(filled);
        self.position += filled as u64;
        Ok(Some(Bytes::from(buf)))
    }

    /// Total bytes yielded so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Recover the wrapped reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}
