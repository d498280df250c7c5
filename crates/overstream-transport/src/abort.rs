//! Platform abort of in-flight I/O on a specific handle.
//!
//! A blocking read that has already started does not observe any
//! cancellation signal; it only returns when data arrives or the handle's
//! pending I/O is aborted. Implementations treat "nothing pending" and
//! "handle already closed" as success, and leave the handle usable: the next
//! read after an abort sees the peer's data as usual.

use std::io;

/// Abort any I/O operation currently pending on this handle.
pub trait AbortPendingIo {
    fn abort_pending_io(&self) -> io::Result<()>;

    /// Forget an abort that landed after the pending read had already
    /// returned, so it cannot cut the next read short.
    ///
    /// Only called once the aborted read has unwound.
    fn reset_abort(&self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: AbortPendingIo + ?Sized> AbortPendingIo for std::sync::Arc<T> {
    fn abort_pending_io(&self) -> io::Result<()> {
        (**self).abort_pending_io()
    }

    fn reset_abort(&self) -> io::Result<()> {
        (**self).reset_abort()
    }
}
