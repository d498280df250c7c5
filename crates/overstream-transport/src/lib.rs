//! Local IPC channel transport with cancellable reads.
//!
//! Provides a unified interface over the local, connection-oriented channel
//! primitive of each platform:
//! - Unix domain sockets (Linux/macOS)
//! - Named pipes (Windows)
//!
//! This is the lowest layer of overstream. Everything else builds on top of
//! [`Channel`], [`IpcStream`] and the [`ByteSource`] abstraction provided here.

pub mod abort;
pub mod cancellable;
pub mod channel;
pub mod config;
pub mod error;
pub mod name;
pub mod pipe;
pub mod source;
pub mod stream;

#[cfg(windows)]
pub mod named_pipe;
#[cfg(unix)]
pub mod uds;

pub use abort::AbortPendingIo;
pub use cancellable::{CancellableReader, DEFAULT_ABORT_GRACE};
pub use channel::{connect, Channel, ServerEndpoint};
pub use config::{ChannelConfig, MaxInstances, TransmissionMode};
pub use error::{Result, TransportError};
pub use name::ChannelName;
pub use source::{ByteSource, StreamSource};
pub use pipe::BlockingPipe;
pub use stream::{IpcStream, PeerCredentials};
