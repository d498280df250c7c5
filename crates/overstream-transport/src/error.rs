use std::io::ErrorKind;
use std::path::PathBuf;

/// Errors that can occur in IPC transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the channel at the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed while waiting for an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The channel name cannot be used on this platform.
    #[error("invalid channel name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// The requested configuration is not available on this platform.
    #[error("unsupported on this platform: {0}")]
    Unsupported(&'static str),

    /// Every allowed server instance of the channel is in use.
    #[error("all server instances of the channel are busy")]
    InstancesExhausted,

    /// The operation was cancelled before it produced a result.
    #[error("operation cancelled")]
    Cancelled,
}

impl TransportError {
    /// Whether this is the cancellation outcome rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the peer went away before the connection was fully established.
    ///
    /// These are recovered locally by the accept loop.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Accept(err) | Self::Io(err) => is_transient_io(err),
            _ => false,
        }
    }
}

pub(crate) fn is_transient_io(err: &std::io::Error) -> bool {
    if matches!(
        err.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::NotConnected
            | ErrorKind::Interrupted
    ) {
        return true;
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::{ERROR_NO_DATA, ERROR_PIPE_NOT_CONNECTED};
        if let Some(code) = err.raw_os_error() {
            return code == ERROR_NO_DATA as i32 || code == ERROR_PIPE_NOT_CONNECTED as i32;
        }
    }

    false
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_vanishing_is_transient() {
        let err = TransportError::Accept(std::io::Error::from(ErrorKind::ConnectionAborted));
        assert!(err.is_transient());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn permission_denied_is_not_transient() {
        let err = TransportError::Accept(std::io::Error::from(ErrorKind::PermissionDenied));
        assert!(!err.is_transient());
    }

    #[test]
    fn cancelled_is_neither_transient_nor_io() {
        let err = TransportError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "operation cancelled");
    }
}
