use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use overstream_transport::{
    BlockingPipe, CancellableReader, ChannelName, IpcStream, Result, TransportError,
};
use tracing::debug;

const RETRY_DELAY: Duration = Duration::from_millis(20);

/// A blocking client connection whose reads can be cancelled.
///
/// Writes go straight to the handle; reads go through the
/// [`CancellableReader`] front end sharing the same handle.
#[derive(Debug)]
pub struct DialedChannel {
    reader: CancellableReader<BlockingPipe>,
}

impl DialedChannel {
    /// The read front end.
    pub fn reader(&self) -> &CancellableReader<BlockingPipe> {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut CancellableReader<BlockingPipe> {
        &mut self.reader
    }

    /// The underlying blocking handle.
    pub fn handle(&self) -> &Arc<BlockingPipe> {
        self.reader.handle()
    }

    /// Write all of `bytes` to the channel. Blocks.
    pub fn write_all(&self, bytes: &[u8]) -> Result<()> {
        let mut writer: &BlockingPipe = self.handle();
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Write `line` followed by `\r\n`. Blocks.
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut framed = Vec::with_capacity(line.len() + 2);
        framed.extend_from_slice(line.as_bytes());
        framed.extend_from_slice(b"\r\n");
        self.write_all(&framed)
    }
}

/// Connect to the channel called `name` with a blocking handle.
///
/// On Windows the handle is opened for overlapped I/O, so writes from one
/// thread proceed while another thread waits in a read.
///
/// Retries while the server has no free instance, for at most `timeout`.
/// A channel that does not exist fails immediately.
pub fn dial(name: &ChannelName, timeout: Duration) -> Result<DialedChannel> {
    let path = name.platform_path();
    let deadline = Instant::now() + timeout;

    let handle = loop {
        match BlockingPipe::connect(&path) {
            Ok(handle) => break handle,
            Err(err) if is_busy(&err) && Instant::now() < deadline => {
                debug!(?path, "channel busy; retrying dial");
                std::thread::sleep(RETRY_DELAY);
            }
            Err(err) => {
                return Err(TransportError::Connect {
                    path,
                    source: err,
                })
            }
        }
    };

    debug!(?path, "dialed channel");
    Ok(DialedChannel {
        reader: CancellableReader::new(Arc::new(handle)),
    })
}

/// Connect to the channel called `name` with an async stream.
pub async fn connect(name: &ChannelName) -> Result<IpcStream> {
    overstream_transport::connect(name).await
}

#[cfg(unix)]
fn is_busy(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
}

#[cfg(windows)]
fn is_busy(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(windows_sys::Win32::Foundation::ERROR_PIPE_BUSY as i32)
}
