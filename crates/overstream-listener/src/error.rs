use std::time::Duration;

/// Errors that can occur while starting or running a listener.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] overstream_transport::TransportError),

    /// The listener configuration cannot be honoured.
    #[error("invalid listener config: {0}")]
    InvalidConfig(String),

    /// `start` was called on a listener that is already running.
    #[error("listener is already running")]
    AlreadyRunning,

    /// The keep-alive pair did not connect in time.
    #[error("keep-alive pair not established within {0:?}")]
    KeepAliveTimeout(Duration),

    /// Startup was cancelled by the caller.
    #[error("listener startup cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ListenerError>;
