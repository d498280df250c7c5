use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::UnixListener;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// Unix domain socket side of a channel.
///
/// The socket is first bound at a private staging path next to the target
/// path, so it can be exercised before any outside client can resolve it.
/// [`publish`](Self::publish) then renames it onto the target path. The
/// socket file is removed on drop if it is still the one this channel created.
pub struct UdsChannel {
    listener: Arc<UnixListener>,
    path: PathBuf,
    target: PathBuf,
    created_inode: Option<(u64, u64)>,
    published: bool,
}

impl UdsChannel {
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind a listening socket at the staging path for `target`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind_staged(target: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        check_path_len(&target)?;

        let path = staging_path(&target)?;
        check_path_len(&path)?;

        // A staging leftover from a crashed process with our pid is ours to remove.
        remove_stale_socket(&path)?;

        let std_listener =
            std::os::unix::net::UnixListener::bind(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
        let cleanup_path = path.clone();
        let bind_err = move |source| TransportError::Bind {
            path: cleanup_path.clone(),
            source,
        };

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(&bind_err)?;
        let created_metadata = std::fs::symlink_metadata(&path).map_err(&bind_err)?;
        let created_inode = Some((created_metadata.dev(), created_metadata.ino()));

        std_listener.set_nonblocking(true).map_err(&bind_err)?;
        let listener = UnixListener::from_std(std_listener).map_err(&bind_err)?;

        debug!(?path, ?target, "bound staging socket");

        Ok(Self {
            listener: Arc::new(listener),
            path,
            target,
            created_inode,
            published: false,
        })
    }

    /// Move the bound socket onto its target path.
    ///
    /// A stale socket at the target is replaced; a live one, or a file that
    /// is not a socket, is left alone and reported as a bind failure.
    pub fn publish(&mut self) -> Result<()> {
        if self.published {
            return Ok(());
        }

        if let Ok(metadata) = std::fs::symlink_metadata(&self.target) {
            if !metadata.file_type().is_socket() {
                return Err(self.target_error(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                ));
            }
            if std::os::unix::net::UnixStream::connect(&self.target).is_ok() {
                return Err(self.target_error(
                    std::io::ErrorKind::AddrInUse,
                    "another listener owns this channel",
                ));
            }
            debug!(path = ?self.target, "replacing stale socket");
        }

        std::fs::rename(&self.path, &self.target).map_err(|e| TransportError::Bind {
            path: self.target.clone(),
            source: e,
        })?;
        self.path = self.target.clone();
        self.published = true;

        info!(path = ?self.path, "listening on unix domain socket");
        Ok(())
    }

    /// Wait for the next client on the shared listening socket.
    pub(crate) async fn accept(listener: &UnixListener) -> Result<IpcStream> {
        let (stream, _addr) = listener.accept().await.map_err(TransportError::Accept)?;
        Ok(IpcStream::from_unix(stream))
    }

    /// Shared handle on the listening socket.
    pub(crate) fn listener(&self) -> Arc<UnixListener> {
        Arc::clone(&self.listener)
    }

    /// Connect a client to wherever the socket currently lives.
    pub(crate) async fn connect_client(&self) -> Result<IpcStream> {
        connect_path(&self.path).await
    }

    /// Current socket path (the staging path until published).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the socket has been moved onto its target path.
    pub fn is_published(&self) -> bool {
        self.published
    }

    fn target_error(&self, kind: std::io::ErrorKind, message: &'static str) -> TransportError {
        TransportError::Bind {
            path: self.target.clone(),
            source: std::io::Error::new(kind, message),
        }
    }
}

impl Drop for UdsChannel {
    fn drop(&mut self) {
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(
                        path = ?self.path,
                        "socket path identity changed; skipping cleanup"
                    );
                }
            }
        }
    }
}

/// Connect a client to the socket at `path`.
pub(crate) async fn connect_path(path: &Path) -> Result<IpcStream> {
    let stream = tokio::net::UnixStream::connect(path)
        .await
        .map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(IpcStream::from_unix(stream))
}

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= UdsChannel::MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: UdsChannel::MAX_PATH_LEN,
        });
    }
    Ok(())
}

fn staging_path(target: &Path) -> Result<PathBuf> {
    let file_name = target
        .file_name()
        .ok_or_else(|| TransportError::Bind {
            path: target.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "socket path has no file name",
            ),
        })?
        .to_string_lossy();
    Ok(target.with_file_name(format!(".{file_name}.{}.stage", std::process::id())))
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    let Ok(metadata) = std::fs::symlink_metadata(path) else {
        return Ok(());
    };
    if !metadata.file_type().is_socket() {
        return Err(TransportError::Bind {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "existing path is not a unix socket",
            ),
        });
    }
    debug!(?path, "removing stale socket");
    std::fs::remove_file(path).map_err(|e| TransportError::Bind {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn unique_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ovs-uds-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn staged_socket_is_invisible_until_published() {
        let dir = unique_dir("publish");
        let target = dir.join("api.sock");

        let mut channel = UdsChannel::bind_staged(&target, 0o600).unwrap();
        assert!(!target.exists());
        assert!(channel.path().exists());
        assert!(!channel.is_published());

        channel.publish().unwrap();
        assert!(target.exists());
        assert_eq!(channel.path(), target.as_path());

        drop(channel);
        assert!(!target.exists(), "socket file should be cleaned up on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn connection_made_before_publish_survives_rename() {
        let dir = unique_dir("keep");
        let target = dir.join("api.sock");
        let mut channel = UdsChannel::bind_staged(&target, 0o600).unwrap();

        let mut client = channel.connect_client().await.unwrap();
        let listener = channel.listener();
        let mut server = UdsChannel::accept(&listener).await.unwrap();
        channel.publish().unwrap();

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        let mut late = tokio::net::UnixStream::connect(&target).await.unwrap();
        let mut accepted = UdsChannel::accept(&listener).await.unwrap();
        late.write_all(b"x").await.unwrap();
        let mut one = [0u8; 1];
        accepted.read_exact(&mut one).await.unwrap();
        assert_eq!(&one, b"x");

        drop(channel);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn default_permissions_hardened() {
        let dir = unique_dir("perms");
        let target = dir.join("perm.sock");

        let mut channel = UdsChannel::bind_staged(&target, 0o600).unwrap();
        channel.publish().unwrap();
        let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(channel);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = UdsChannel::bind_staged(&long_path, 0o600);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[tokio::test]
    async fn publish_refuses_non_socket_target() {
        let dir = unique_dir("file");
        let target = dir.join("not-a-socket.sock");
        std::fs::write(&target, b"regular-file").unwrap();

        let mut channel = UdsChannel::bind_staged(&target, 0o600).unwrap();
        let result = channel.publish();
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert_eq!(std::fs::read(&target).unwrap(), b"regular-file");

        drop(channel);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn publish_refuses_live_listener() {
        let dir = unique_dir("live");
        let target = dir.join("owned.sock");

        let mut first = UdsChannel::bind_staged(&target, 0o600).unwrap();
        first.publish().unwrap();

        let mut second = UdsChannel::bind_staged(&target, 0o600).unwrap();
        let err = second.publish().unwrap_err();
        assert!(matches!(
            err,
            TransportError::Bind { ref source, .. } if source.kind() == std::io::ErrorKind::AddrInUse
        ));

        drop(second);
        drop(first);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn publish_replaces_stale_socket() {
        let dir = unique_dir("stale");
        let target = dir.join("stale.sock");
        let stale = std::os::unix::net::UnixListener::bind(&target).unwrap();
        drop(stale);
        assert!(target.exists());

        let mut channel = UdsChannel::bind_staged(&target, 0o600).unwrap();
        channel.publish().unwrap();
        assert!(tokio::net::UnixStream::connect(&target).await.is_ok());

        drop(channel);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn drop_does_not_remove_replaced_path() {
        let dir = unique_dir("drop-race");
        let target = dir.join("drop.sock");

        let mut channel = UdsChannel::bind_staged(&target, 0o600).unwrap();
        channel.publish().unwrap();

        std::fs::remove_file(&target).unwrap();
        std::fs::write(&target, b"replacement-file").unwrap();

        drop(channel);
        assert!(
            target.exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
