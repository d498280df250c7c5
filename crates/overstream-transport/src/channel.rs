use std::path::Path;

use crate::config::ChannelConfig;
use crate::error::Result;
use crate::name::ChannelName;
use crate::stream::IpcStream;

#[cfg(windows)]
use crate::named_pipe::PipeChannel;
#[cfg(unix)]
use crate::uds::UdsChannel;

/// A named local channel that server endpoints are created from.
pub struct Channel {
    name: ChannelName,
    config: ChannelConfig,
    inner: ChannelInner,
}

enum ChannelInner {
    #[cfg(unix)]
    Unix(UdsChannel),
    #[cfg(windows)]
    Pipe(PipeChannel),
}

/// One server-side instance of a channel, waiting to be connected.
///
/// Consumed by [`wait_for_connection`](Self::wait_for_connection), so a
/// connected endpoint can be handed out at most once. Dropping it disposes
/// the instance.
pub struct ServerEndpoint {
    inner: EndpointInner,
}

enum EndpointInner {
    #[cfg(unix)]
    Unix(std::sync::Arc<tokio::net::UnixListener>),
    #[cfg(windows)]
    Pipe(tokio::net::windows::named_pipe::NamedPipeServer),
}

impl Channel {
    /// Bind the channel without making it visible to outside clients yet.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(name: ChannelName, config: ChannelConfig) -> Result<Self> {
        config.validate()?;
        let path = name.platform_path();

        #[cfg(unix)]
        let inner = ChannelInner::Unix(UdsChannel::bind_staged(&path, config.socket_mode)?);
        #[cfg(windows)]
        let inner = ChannelInner::Pipe(PipeChannel::new(&path, config.clone()));

        Ok(Self {
            name,
            config,
            inner,
        })
    }

    /// Make the channel resolvable under its name.
    pub fn publish(&mut self) -> Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            ChannelInner::Unix(uds) => uds.publish(),
            #[cfg(windows)]
            ChannelInner::Pipe(_) => Ok(()),
        }
    }

    /// Create a fresh server endpoint for one accept iteration.
    pub fn create_endpoint(&self) -> Result<ServerEndpoint> {
        let inner = match &self.inner {
            #[cfg(unix)]
            ChannelInner::Unix(uds) => EndpointInner::Unix(uds.listener()),
            #[cfg(windows)]
            ChannelInner::Pipe(pipe) => EndpointInner::Pipe(pipe.create_instance(false)?),
        };
        Ok(ServerEndpoint { inner })
    }

    /// Create the endpoint that anchors the channel identity.
    ///
    /// On Windows this is the first pipe instance, so a name already owned
    /// by another server is rejected.
    pub fn create_keepalive_endpoint(&self) -> Result<ServerEndpoint> {
        let inner = match &self.inner {
            #[cfg(unix)]
            ChannelInner::Unix(uds) => EndpointInner::Unix(uds.listener()),
            #[cfg(windows)]
            ChannelInner::Pipe(pipe) => EndpointInner::Pipe(pipe.create_instance(true)?),
        };
        Ok(ServerEndpoint { inner })
    }

    /// Connect a client end to this channel, published or not.
    pub async fn connect_client(&self) -> Result<IpcStream> {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::Unix(uds) => uds.connect_client().await,
            #[cfg(windows)]
            ChannelInner::Pipe(pipe) => pipe.connect_client().await,
        }
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Current platform address of the channel.
    pub fn path(&self) -> &Path {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::Unix(uds) => uds.path(),
            #[cfg(windows)]
            ChannelInner::Pipe(pipe) => pipe.path(),
        }
    }
}

/// Connect a client to the published channel called `name`.
pub async fn connect(name: &ChannelName) -> Result<IpcStream> {
    let path = name.platform_path();
    #[cfg(unix)]
    return crate::uds::connect_path(&path).await;
    #[cfg(windows)]
    return crate::named_pipe::connect_path(&path).await;
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("path", &self.path())
            .finish()
    }
}

impl ServerEndpoint {
    /// Wait until a client connects to this endpoint.
    ///
    /// Dropping the returned future before it completes disposes the
    /// endpoint without losing a connection.
    pub async fn wait_for_connection(self) -> Result<IpcStream> {
        match self.inner {
            #[cfg(unix)]
            EndpointInner::Unix(listener) => UdsChannel::accept(&listener).await,
            #[cfg(windows)]
            EndpointInner::Pipe(server) => PipeChannel::accept(server).await,
        }
    }
}

impl std::fmt::Debug for ServerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerEndpoint").finish_non_exhaustive()
    }
}
