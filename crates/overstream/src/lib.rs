//! Carry line-oriented request/response protocols over local IPC channels.
//!
//! overstream lets an HTTP-like exchange run over a named pipe or Unix
//! domain socket instead of a network socket. A listener keeps the channel
//! name permanently available and dispatches every client to a handler;
//! reads can be cancelled even where the platform read cannot.
//!
//! # Crate Structure
//!
//! - [`transport`]: Channels, streams and the cancellable read adapter
//! - [`line`]: Incremental `\r\n` / `\n` line decoding
//! - [`listener`]: Multi-worker accept loop (behind `listener` feature)

/// Re-export transport types.
pub mod transport {
    pub use overstream_transport::*;
}

/// Re-export line types.
pub mod line {
    pub use overstream_line::*;
}

/// Re-export listener types (requires `listener` feature).
#[cfg(feature = "listener")]
pub mod listener {
    pub use overstream_listener::*;
}
