use std::fmt;
use std::io;

use overstream_line::LineError;
use overstream_listener::ListenerError;
use overstream_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidName { .. }
        | TransportError::PathTooLong { .. }
        | TransportError::Unsupported(_) => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Cancelled => CliError::new(TIMEOUT, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn line_error(context: &str, err: LineError) -> CliError {
    match err {
        LineError::Transport(err) => transport_error(context, err),
        LineError::Io(source) => io_error(context, source),
        LineError::Cancelled => CliError::new(TIMEOUT, format!("{context}: {err}")),
        LineError::EndOfStream | LineError::Truncated { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        LineError::LineTooLong { .. } | LineError::InvalidUtf8(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn listener_error(context: &str, err: ListenerError) -> CliError {
    match err {
        ListenerError::Transport(err) => transport_error(context, err),
        ListenerError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ListenerError::KeepAliveTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ListenerError::Cancelled => CliError::new(FAILURE, format!("{context}: {err}")),
        ListenerError::AlreadyRunning => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
