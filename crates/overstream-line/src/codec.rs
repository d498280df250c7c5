use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{LineError, Result};

/// Default maximum line length: 64 KiB.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Line terminator written by [`LineCodec`].
pub const CRLF: &[u8; 2] = b"\r\n";

/// Decode one line from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete line yet.
/// On success, consumes the line and its delimiter from the buffer; a `\r`
/// directly before the `\n` is part of the delimiter. Anything after the
/// delimiter stays in the buffer.
pub fn decode_line(src: &mut BytesMut, max_line_length: usize) -> Result<Option<String>> {
    let Some(newline) = src.iter().position(|b| *b == b'\n') else {
        // Leave room for a trailing '\r' that will be stripped.
        if src.len() > max_line_length.saturating_add(1) {
            return Err(LineError::LineTooLong {
                len: src.len(),
                max: max_line_length,
            });
        }
        return Ok(None); // Need more data
    };

    let content_len = if newline > 0 && src[newline - 1] == b'\r' {
        newline - 1
    } else {
        newline
    };
    if content_len > max_line_length {
        return Err(LineError::LineTooLong {
            len: content_len,
            max: max_line_length,
        });
    }

    let mut line = src.split_to(newline + 1);
    line.truncate(content_len);
    Ok(Some(String::from_utf8(line.to_vec())?))
}

/// `tokio_util` codec for `\r\n` / `\n` delimited lines.
///
/// Decoding accepts both delimiters; encoding always writes `\r\n`.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_line_length: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self { max_line_length }
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = LineError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        decode_line(src, self.max_line_length)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => Err(LineError::Truncated {
                buffered: src.len(),
            }),
        }
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = LineError;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> Result<()> {
        let line = line.as_ref();
        if line.len() > self.max_line_length {
            return Err(LineError::LineTooLong {
                len: line.len(),
                max: self.max_line_length,
            });
        }
        if line.contains('\n') {
            return Err(LineError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "line contains an embedded newline",
            )));
        }
        dst.reserve(line.len() + CRLF.len());
        dst.put_slice(line.as_bytes());
        dst.put_slice(CRLF);
        Ok(())
    }
}
