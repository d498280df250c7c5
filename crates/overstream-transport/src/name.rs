use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, TransportError};

#[cfg(windows)]
const PIPE_PREFIX: &str = r"\\.\pipe\";

/// Identity of a local IPC channel.
///
/// On Unix a bare name resolves to `<temp_dir>/<name>.sock` and an absolute
/// name is used as the socket path directly. On Windows a bare name resolves
/// to `\\.\pipe\<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName {
    raw: String,
}

impl ChannelName {
    /// Validate and wrap a channel name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let raw = name.into();
        if raw.is_empty() {
            return Err(TransportError::InvalidName {
                name: raw,
                reason: "name is empty",
            });
        }
        if raw.contains('\0') {
            return Err(TransportError::InvalidName {
                name: raw,
                reason: "name contains a NUL byte",
            });
        }
        #[cfg(windows)]
        if !raw.starts_with(PIPE_PREFIX) && raw.contains('\\') {
            return Err(TransportError::InvalidName {
                name: raw,
                reason: "bare pipe names may not contain '\\'",
            });
        }
        Ok(Self { raw })
    }

    /// The name as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve the platform address of the channel.
    #[cfg(unix)]
    pub fn platform_path(&self) -> PathBuf {
        let path = std::path::Path::new(&self.raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::temp_dir().join(format!("{}.sock", self.raw))
        }
    }

    /// Resolve the platform address of the channel.
    #[cfg(windows)]
    pub fn platform_path(&self) -> PathBuf {
        if self.raw.starts_with(PIPE_PREFIX) {
            PathBuf::from(&self.raw)
        } else {
            PathBuf::from(format!("{PIPE_PREFIX}{}", self.raw))
        }
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for ChannelName {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
