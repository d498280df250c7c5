use std::future::Future;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};

/// A cancellable source of raw bytes.
///
/// `Ok(0)` means the source is exhausted. A fired token yields
/// [`TransportError::Cancelled`], which callers must keep distinct from both
/// data and faults.
pub trait ByteSource: Send {
    fn read<'a>(
        &'a mut self,
        buf: &'a mut [u8],
        cancel: &'a CancellationToken,
    ) -> impl Future<Output = Result<usize>> + Send + 'a;
}

/// Byte source over any async reader.
///
/// Dropping an in-flight async read is enough to abandon it, so the read is
/// simply raced against the token.
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
}

impl<R> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Borrow the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the source and return the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R> ByteSource for StreamSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    fn read<'a>(
        &'a mut self,
        buf: &'a mut [u8],
        cancel: &'a CancellationToken,
    ) -> impl Future<Output = Result<usize>> + Send + 'a {
        async move {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(TransportError::Cancelled),
                read = self.inner.read(buf) => read.map_err(TransportError::Io),
            }
        }
    }
}
