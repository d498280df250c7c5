use serde::{Deserialize, Serialize};

use crate::error::{Result, TransportError};

/// Largest explicit instance limit; 255 is the platform "unlimited" sentinel.
pub const MAX_LIMITED_INSTANCES: u8 = 254;

/// How bytes are grouped on the channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmissionMode {
    /// Plain byte stream.
    #[default]
    Byte,
    /// Message-preserving stream (Windows named pipes only).
    Message,
}

/// Maximum number of concurrent server-side instances of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxInstances {
    /// As many as the platform allows.
    #[default]
    Unlimited,
    /// An explicit limit in `1..=254`.
    Limited(u8),
}

impl MaxInstances {
    /// The explicit limit, if any.
    pub fn limit(self) -> Option<usize> {
        match self {
            Self::Unlimited => None,
            Self::Limited(n) => Some(usize::from(n)),
        }
    }
}

/// Immutable channel configuration, fixed when a listener is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Byte or message transmission.
    pub transmission_mode: TransmissionMode,
    /// Server instance limit.
    pub max_instances: MaxInstances,
    /// Request asynchronous (overlapped / non-blocking) I/O.
    ///
    /// Cancellable operation depends on it, so `false` is rejected.
    pub asynchronous: bool,
    /// Permission bits applied to the socket file (Unix only).
    pub socket_mode: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            transmission_mode: TransmissionMode::Byte,
            max_instances: MaxInstances::Unlimited,
            asynchronous: true,
            socket_mode: 0o600,
        }
    }
}

impl ChannelConfig {
    /// Override the transmission mode.
    pub fn with_transmission_mode(mut self, mode: TransmissionMode) -> Self {
        self.transmission_mode = mode;
        self
    }

    /// Override the server instance limit.
    pub fn with_max_instances(mut self, max: MaxInstances) -> Self {
        self.max_instances = max;
        self
    }

    /// Override the socket file permission bits.
    pub fn with_socket_mode(mut self, mode: u32) -> Self {
        self.socket_mode = mode;
        self
    }

    /// Check the configuration against what this platform can honour.
    pub fn validate(&self) -> Result<()> {
        if !self.asynchronous {
            return Err(TransportError::Unsupported(
                "synchronous channel I/O cannot be cancelled",
            ));
        }
        if let MaxInstances::Limited(n) = self.max_instances {
            if n == 0 || n > MAX_LIMITED_INSTANCES {
                return Err(TransportError::Unsupported(
                    "instance limit must be between 1 and 254",
                ));
            }
        }
        #[cfg(unix)]
        if self.transmission_mode == TransmissionMode::Message {
            return Err(TransportError::Unsupported(
                "message transmission requires named pipes",
            ));
        }
        Ok(())
    }
}
