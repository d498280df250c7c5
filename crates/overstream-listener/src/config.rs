use std::time::Duration;

use overstream_transport::{ChannelConfig, MaxInstances};
use serde::{Deserialize, Serialize};

use crate::error::{ListenerError, Result};

/// Default number of concurrently accepting workers.
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Default bound on establishing the keep-alive pair.
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause before a worker retries when every instance is in use.
pub const DEFAULT_BUSY_BACKOFF: Duration = Duration::from_millis(50);

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Configuration of the underlying channel.
    pub channel: ChannelConfig,
    /// Number of acceptor workers, each holding one waiting endpoint.
    pub worker_count: usize,
    /// Bound on connecting the keep-alive pair during `start`.
    pub keepalive_timeout: Duration,
    /// Pause before retrying endpoint creation after `InstancesExhausted`.
    pub busy_backoff: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            worker_count: DEFAULT_WORKER_COUNT,
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            busy_backoff: DEFAULT_BUSY_BACKOFF,
        }
    }
}

impl ListenerConfig {
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    #[must_use]
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    #[must_use]
    pub fn with_keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_busy_backoff(mut self, backoff: Duration) -> Self {
        self.busy_backoff = backoff;
        self
    }

    /// Check that the channel can hold the keep-alive server plus one
    /// waiting instance per worker.
    pub fn validate(&self) -> Result<()> {
        self.channel
            .validate()
            .map_err(|e| ListenerError::InvalidConfig(e.to_string()))?;

        if self.worker_count == 0 {
            return Err(ListenerError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }

        if let MaxInstances::Limited(limit) = self.channel.max_instances {
            let needed = self.worker_count.saturating_add(1);
            if needed > usize::from(limit) {
                return Err(ListenerError::InvalidConfig(format!(
                    "{} workers need {needed} pipe instances but max_instances is {limit}",
                    self.worker_count
                )));
            }
        }

        Ok(())
    }
}
