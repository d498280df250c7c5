use std::time::Duration;

use overstream_transport::{Channel, IpcStream};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{ListenerError, Result};
use crate::listener::TaskOutcome;

/// Which end of the keep-alive pair a lifecycle task owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveSide {
    Server,
    Client,
}

/// A server endpoint and a client connected to it for the whole life of a
/// listener, so the channel name stays bound while no real client is
/// attached.
#[derive(Debug)]
pub struct KeepAlivePair {
    server: IpcStream,
    client: IpcStream,
}

impl KeepAlivePair {
    /// Create the anchoring server endpoint and connect a client to it.
    ///
    /// The channel need not be published yet; on Unix the pair is made on
    /// the staging path, where no outside client can take the endpoint.
    pub async fn establish(channel: &Channel, timeout: Duration) -> Result<Self> {
        let endpoint = channel.create_keepalive_endpoint()?;

        let connected = tokio::time::timeout(timeout, async {
            tokio::try_join!(endpoint.wait_for_connection(), channel.connect_client())
        })
        .await
        .map_err(|_| ListenerError::KeepAliveTimeout(timeout))?;

        let (server, client) = connected?;
        debug!(path = ?channel.path(), "keep-alive pair established");
        Ok(Self { server, client })
    }

    /// Hand each end to a lifecycle task that holds it until `scope` fires.
    pub(crate) fn spawn_disposal(self, tasks: &mut JoinSet<TaskOutcome>, scope: &CancellationToken) {
        for (side, stream) in [
            (KeepAliveSide::Server, self.server),
            (KeepAliveSide::Client, self.client),
        ] {
            let scope = scope.clone();
            tasks.spawn(async move {
                scope.cancelled().await;
                dispose(side, stream).await;
                TaskOutcome::KeepAlive { side }
            });
        }
    }
}

async fn dispose(side: KeepAliveSide, mut stream: IpcStream) {
    // The peer end may already be gone; a failed shutdown is not a fault.
    if let Err(err) = stream.shutdown().await {
        trace!(?side, error = %err, "keep-alive shutdown reported an error");
    }
    drop(stream);
    debug!(?side, "keep-alive endpoint disposed");
}
