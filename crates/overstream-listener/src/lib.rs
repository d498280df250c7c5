//! Multi-worker accept loop for local IPC channels.
//!
//! A [`PipeListener`] keeps a named channel resolvable for its whole run
//! with a keep-alive pair, accepts on several workers at once, and hands
//! each connection to a [`ConnectionHandler`] on its own task so a slow
//! handler never holds up the next client.

pub mod config;
pub mod dial;
pub mod error;
pub mod handler;
pub mod keepalive;
pub mod listener;
pub mod stats;
mod worker;

pub use config::{
    ListenerConfig, DEFAULT_BUSY_BACKOFF, DEFAULT_KEEPALIVE_TIMEOUT, DEFAULT_WORKER_COUNT,
};
pub use dial::{connect, dial, DialedChannel};
pub use error::{ListenerError, Result};
pub use handler::ConnectionHandler;
pub use keepalive::{KeepAlivePair, KeepAliveSide};
pub use listener::{PipeListener, ShutdownReport};
pub use stats::{ListenerHealth, ListenerStats};
