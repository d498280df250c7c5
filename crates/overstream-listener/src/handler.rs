use std::future::Future;

use overstream_transport::IpcStream;

/// Receives every connection a listener accepts.
///
/// Each call gets exclusive ownership of the stream and runs on its own
/// task, so an implementation may take as long as it likes without holding
/// up the accept loop.
///
/// Implemented for any `Fn(IpcStream) -> impl Future<Output = ()>`:
///
/// ```no_run
/// use overstream_listener::{ListenerConfig, PipeListener};
/// use overstream_transport::{ChannelName, IpcStream};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> overstream_listener::Result<()> {
/// let name = ChannelName::new("docker_engine").map_err(overstream_listener::ListenerError::from)?;
/// let mut listener = PipeListener::new(name, ListenerConfig::default())?;
/// listener
///     .start(|stream: IpcStream| async move { drop(stream) }, &CancellationToken::new())
///     .await?;
/// # Ok(())
/// # }
/// ```
pub trait ConnectionHandler: Send + Sync + 'static {
    fn on_connection(&self, stream: IpcStream) -> impl Future<Output = ()> + Send;
}

impl<F, Fut> ConnectionHandler for F
where
    F: Fn(IpcStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn on_connection(&self, stream: IpcStream) -> impl Future<Output = ()> + Send {
        self(stream)
    }
}
