use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, PipeMode, ServerOptions};
use tracing::debug;
use windows_sys::Win32::Foundation::{ERROR_ACCESS_DENIED, ERROR_PIPE_BUSY};

use crate::config::{ChannelConfig, TransmissionMode};
use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

const BUSY_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Named pipe side of a channel.
///
/// Holds no OS resource itself: every server endpoint is a fresh pipe
/// instance created from the stored configuration.
pub struct PipeChannel {
    path: PathBuf,
    config: ChannelConfig,
}

impl PipeChannel {
    pub fn new(path: impl AsRef<Path>, config: ChannelConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
        }
    }

    /// Create one server instance of the pipe.
    ///
    /// `first` requests exclusive creation of the name, which fails if some
    /// other server already owns it.
    pub fn create_instance(&self, first: bool) -> Result<NamedPipeServer> {
        let mode = match self.config.transmission_mode {
            TransmissionMode::Byte => PipeMode::Byte,
            TransmissionMode::Message => PipeMode::Message,
        };

        let mut options = ServerOptions::new();
        options.first_pipe_instance(first).pipe_mode(mode);
        if let Some(limit) = self.config.max_instances.limit() {
            options.max_instances(limit);
        }

        options.create(&self.path).map_err(|e| {
            if e.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) {
                TransportError::InstancesExhausted
            } else if first && e.raw_os_error() == Some(ERROR_ACCESS_DENIED as i32) {
                TransportError::Bind {
                    path: self.path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        "another server owns this pipe name",
                    ),
                }
            } else {
                TransportError::Bind {
                    path: self.path.clone(),
                    source: e,
                }
            }
        })
    }

    /// Wait for a client on a freshly created instance.
    pub(crate) async fn accept(server: NamedPipeServer) -> Result<IpcStream> {
        server.connect().await.map_err(TransportError::Accept)?;
        Ok(IpcStream::from_pipe_server(server))
    }

    /// Open a client end of the pipe, retrying while every instance is busy.
    pub(crate) async fn connect_client(&self) -> Result<IpcStream> {
        connect_path(&self.path).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Open a client end of the pipe at `path`, waiting out busy instances.
pub(crate) async fn connect_path(path: &Path) -> Result<IpcStream> {
    loop {
        match ClientOptions::new().open(path) {
            Ok(client) => return Ok(IpcStream::from_pipe_client(client)),
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) => {
                debug!(?path, "pipe busy; retrying client open");
                tokio::time::sleep(BUSY_RETRY_DELAY).await;
            }
            Err(e) => {
                return Err(TransportError::Connect {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }
}
