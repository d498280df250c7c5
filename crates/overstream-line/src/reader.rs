use bytes::BytesMut;
use overstream_transport::ByteSource;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::codec::{decode_line, DEFAULT_MAX_LINE_LENGTH};
use crate::error::{LineError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads delimited lines from any [`ByteSource`].
///
/// Owns the line buffer: bytes read past a delimiter are kept for the next
/// call, so repeated calls drain a header block line by line without ever
/// rescanning consumed input. The source is passed per call, which lets the
/// same buffer follow a stream through a change of front end.
#[derive(Debug)]
pub struct LineReader {
    buf: BytesMut,
    max_line_length: usize,
}

impl LineReader {
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_line_length,
        }
    }

    /// Read the next line, delimiter stripped.
    ///
    /// Returns `Err(LineError::EndOfStream)` when the source is exhausted at a
    /// line boundary and `Err(LineError::Truncated)` when it ends mid-line.
    /// On cancellation the partial line stays buffered.
    pub async fn read_line<S>(&mut self, source: &mut S, cancel: &CancellationToken) -> Result<String>
    where
        S: ByteSource + ?Sized,
    {
        loop {
            if let Some(line) = decode_line(&mut self.buf, self.max_line_length)? {
                trace!(len = line.len(), buffered = self.buf.len(), "decoded line");
                return Ok(line);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = source.read(&mut chunk, cancel).await?;

            if read == 0 {
                return Err(if self.buf.is_empty() {
                    LineError::EndOfStream
                } else {
                    LineError::Truncated {
                        buffered: self.buf.len(),
                    }
                });
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes read from the source but not yet returned as a line.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Hand over the retained bytes, e.g. to switch to reading a raw body.
    pub fn into_buffer(self) -> BytesMut {
        self.buf
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}
