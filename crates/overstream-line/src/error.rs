/// Errors that can occur while decoding lines.
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    /// The byte source failed.
    #[error("transport error: {0}")]
    Transport(overstream_transport::TransportError),

    /// An I/O error occurred while reading or writing lines.
    #[error("line I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The read was cancelled; buffered bytes are kept.
    #[error("line read cancelled")]
    Cancelled,

    /// The source ended at a line boundary with no further line to return.
    #[error("end of stream (no more lines)")]
    EndOfStream,

    /// The source ended in the middle of a line.
    #[error("connection closed mid-line ({buffered} bytes without a delimiter)")]
    Truncated { buffered: usize },

    /// A line grew past the configured limit without a delimiter.
    #[error("line too long ({len} bytes, max {max})")]
    LineTooLong { len: usize, max: usize },

    /// A complete line was not valid UTF-8.
    #[error("line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl LineError {
    /// Whether the source ran out of data before a full line was available.
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::EndOfStream | Self::Truncated { .. })
    }
}

impl From<overstream_transport::TransportError> for LineError {
    fn from(err: overstream_transport::TransportError) -> Self {
        match err {
            overstream_transport::TransportError::Cancelled => Self::Cancelled,
            other => Self::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, LineError>;
