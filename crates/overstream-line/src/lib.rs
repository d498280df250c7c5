//! Newline-delimited line decoding for request/response protocols over IPC.
//!
//! Lines end with `\r\n` or a bare `\n`; the delimiter is stripped and a
//! delimiter-only line decodes to `""` (the header-block terminator of
//! HTTP-like protocols). Bytes read past a delimiter are kept for the next
//! line, so callers never manage partial reads themselves.

pub mod codec;
pub mod error;
pub mod reader;

pub use codec::{decode_line, LineCodec, DEFAULT_MAX_LINE_LENGTH};
pub use error::{LineError, Result};
pub use reader::LineReader;
