//! Cancellable reads over blocking pipe handles.
//!
//! A blocking pipe read only looks at a cancellation signal before it starts;
//! once in flight it blocks until data arrives or the handle's pending I/O is
//! aborted. [`CancellableReader`] runs the read on the blocking pool and, if
//! the token fires while it is waiting, aborts the pending I/O on that
//! specific handle.

use std::future::Future;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::abort::AbortPendingIo;
use crate::error::{Result, TransportError};
use crate::source::ByteSource;

/// Default time an aborted read is given to unwind before the call gives up
/// on it.
pub const DEFAULT_ABORT_GRACE: Duration = Duration::from_millis(250);

/// Adapter that makes blocking reads on a shared handle abortable.
pub struct CancellableReader<H> {
    handle: Arc<H>,
    abort_grace: Duration,
}

impl<H> CancellableReader<H>
where
    H: AbortPendingIo + Send + Sync + 'static,
    for<'h> &'h H: Read,
{
    pub fn new(handle: Arc<H>) -> Self {
        Self {
            handle,
            abort_grace: DEFAULT_ABORT_GRACE,
        }
    }

    /// Override how long an aborted read may take to return.
    pub fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = grace;
        self
    }

    /// The handle reads are issued against.
    pub fn handle(&self) -> &Arc<H> {
        &self.handle
    }

    /// Read into `buf`, returning early with [`TransportError::Cancelled`]
    /// once `cancel` fires.
    ///
    /// The abort is tied to this call only: it is armed while the read is
    /// pending and issued at most once. Bytes that arrived before the abort
    /// took effect are returned rather than dropped.
    pub async fn read(&self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let handle = Arc::clone(&self.handle);
        let len = buf.len();
        let mut pending = tokio::task::spawn_blocking(move || {
            let mut scratch = vec![0u8; len];
            let mut reader: &H = &handle;
            let read = reader.read(&mut scratch)?;
            scratch.truncate(read);
            Ok::<_, std::io::Error>(scratch)
        });

        let completed = tokio::select! {
            biased;
            joined = &mut pending => joined,
            () = cancel.cancelled() => {
                if let Err(err) = self.handle.abort_pending_io() {
                    warn!(error = %err, "failed to abort pending pipe read");
                }
                match tokio::time::timeout(self.abort_grace, &mut pending).await {
                    Ok(joined) => {
                        if let Err(err) = self.handle.reset_abort() {
                            warn!(error = %err, "failed to clear abort after read unwound");
                        }
                        joined
                    }
                    Err(_) => {
                        debug!(grace = ?self.abort_grace, "aborted read did not unwind; abandoning it");
                        return Err(TransportError::Cancelled);
                    }
                }
            }
        };

        let outcome = completed
            .map_err(|join_err| TransportError::Io(std::io::Error::other(join_err.to_string())))?;

        match outcome {
            Ok(data) if !data.is_empty() => {
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
            Ok(_) | Err(_) if cancel.is_cancelled() => Err(TransportError::Cancelled),
            Ok(_) => Ok(0),
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

impl<H> ByteSource for CancellableReader<H>
where
    H: AbortPendingIo + Send + Sync + 'static,
    for<'h> &'h H: Read,
{
    fn read<'a>(
        &'a mut self,
        buf: &'a mut [u8],
        cancel: &'a CancellationToken,
    ) -> impl Future<Output = Result<usize>> + Send + 'a {
        CancellableReader::read(self, buf, cancel)
    }
}

impl<H> Clone for CancellableReader<H> {
    fn clone(&self) -> Self {
        Self {
            handle: Arc::clone(&self.handle),
            abort_grace: self.abort_grace,
        }
    }
}

impl<H> std::fmt::Debug for CancellableReader<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellableReader")
            .field("abort_grace", &self.abort_grace)
            .finish_non_exhaustive()
    }
}
