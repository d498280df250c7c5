//! Blocking client handle of a channel.
//!
//! [`BlockingPipe`] is read through `&BlockingPipe` from a blocking thread
//! and aborted from another one via [`AbortPendingIo`]. An abort only ends
//! the read in flight; the connection stays open in both directions.
//!
//! - Unix: each read polls the socket together with a private wake socket.
//!   An abort writes one byte to the wake socket.
//! - Windows: the pipe is opened for overlapped I/O and every read or write
//!   waits on its own `OVERLAPPED`, so a pending read neither blocks writes
//!   from other threads nor survives `CancelIoEx`.

use std::io::{self, Read, Write};
use std::path::Path;

use crate::abort::AbortPendingIo;

#[cfg(unix)]
pub use self::unix::BlockingPipe;
#[cfg(windows)]
pub use self::windows::BlockingPipe;

/// Message of the error a read returns when it was aborted.
const ABORTED: &str = "pending read aborted";

#[cfg(unix)]
mod unix {
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    use super::*;

    /// Blocking client-side handle of a channel.
    pub struct BlockingPipe {
        stream: UnixStream,
        wake_rx: UnixStream,
        wake_tx: UnixStream,
    }

    impl BlockingPipe {
        /// Connect to the socket at `path`.
        pub fn connect(path: &Path) -> io::Result<Self> {
            Self::from_stream(UnixStream::connect(path)?)
        }

        /// Wrap an already connected, blocking socket.
        pub fn from_stream(stream: UnixStream) -> io::Result<Self> {
            let (wake_rx, wake_tx) = UnixStream::pair()?;
            wake_rx.set_nonblocking(true)?;
            wake_tx.set_nonblocking(true)?;
            Ok(Self {
                stream,
                wake_rx,
                wake_tx,
            })
        }

        pub fn get_ref(&self) -> &UnixStream {
            &self.stream
        }

        /// Block until the socket is readable (`true`) or an abort arrives.
        fn wait_readable(&self) -> io::Result<bool> {
            let mut fds = [
                libc::pollfd {
                    fd: self.stream.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.wake_rx.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            loop {
                // SAFETY: `fds` is a live array of two initialised pollfd
                // entries for the whole call.
                let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
                if rc >= 0 {
                    break;
                }
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(err);
                }
            }
            // Data or hang-up on the socket wins over a concurrent abort.
            Ok(fds[0].revents != 0 || fds[1].revents == 0)
        }
    }

    impl Read for &BlockingPipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            if self.wait_readable()? {
                (&self.stream).read(buf)
            } else {
                Err(io::Error::other(ABORTED))
            }
        }
    }

    impl Write for &BlockingPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            (&self.stream).write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            (&self.stream).flush()
        }
    }

    impl AbortPendingIo for BlockingPipe {
        fn abort_pending_io(&self) -> io::Result<()> {
            match (&self.wake_tx).write(&[1]) {
                Ok(_) => Ok(()),
                // A wake byte is already queued.
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
                Err(err) => Err(err),
            }
        }

        fn reset_abort(&self) -> io::Result<()> {
            let mut drain = [0u8; 64];
            loop {
                match (&self.wake_rx).read(&mut drain) {
                    Ok(0) => return Ok(()),
                    Ok(_) => continue,
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                }
            }
        }
    }

    impl std::fmt::Debug for BlockingPipe {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("BlockingPipe")
                .field("fd", &self.stream.as_raw_fd())
                .finish_non_exhaustive()
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::fs::{File, OpenOptions};
    use std::os::windows::fs::OpenOptionsExt;
    use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};

    use windows_sys::Win32::Foundation::{
        ERROR_BROKEN_PIPE, ERROR_INVALID_HANDLE, ERROR_IO_PENDING, ERROR_MORE_DATA,
        ERROR_NOT_FOUND, ERROR_OPERATION_ABORTED, HANDLE,
    };
    use windows_sys::Win32::Storage::FileSystem::{ReadFile, WriteFile, FILE_FLAG_OVERLAPPED};
    use windows_sys::Win32::System::Threading::CreateEventW;
    use windows_sys::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};

    use super::*;

    /// Blocking client-side handle of a channel.
    pub struct BlockingPipe {
        file: File,
    }

    impl BlockingPipe {
        /// Open the client end of the pipe at `path` for overlapped I/O.
        pub fn connect(path: &Path) -> io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(FILE_FLAG_OVERLAPPED)
                .open(path)?;
            Ok(Self { file })
        }

        pub fn get_ref(&self) -> &File {
            &self.file
        }

        fn raw(&self) -> HANDLE {
            self.file.as_raw_handle() as HANDLE
        }

        /// Issue one overlapped operation and wait for it on a private event.
        fn overlapped<F>(&self, start: F) -> io::Result<usize>
        where
            F: FnOnce(HANDLE, *mut OVERLAPPED) -> i32,
        {
            // SAFETY: no security attributes and no name; manual reset,
            // initially unsignalled.
            let event = unsafe { CreateEventW(std::ptr::null(), 1, 0, std::ptr::null()) };
            if event.is_null() {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: `event` was just created and is owned only here.
            let event = unsafe { OwnedHandle::from_raw_handle(event as RawHandle) };

            // SAFETY: OVERLAPPED is plain data; all-zero is its initial state.
            let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
            overlapped.hEvent = event.as_raw_handle() as HANDLE;

            if start(self.raw(), &mut overlapped) == 0 {
                let err = io::Error::last_os_error();
                let code = err.raw_os_error();
                if code != Some(ERROR_IO_PENDING as i32) && code != Some(ERROR_MORE_DATA as i32) {
                    return Err(err);
                }
            }

            let mut transferred = 0u32;
            // SAFETY: `overlapped` outlives the operation because this call
            // waits for it to complete, cancelled or not.
            let ok = unsafe { GetOverlappedResult(self.raw(), &overlapped, &mut transferred, 1) };
            if ok == 0 {
                let err = io::Error::last_os_error();
                // Message mode: the rest of the message stays in the pipe.
                if err.raw_os_error() != Some(ERROR_MORE_DATA as i32) {
                    return Err(err);
                }
            }
            Ok(transferred as usize)
        }
    }

    impl Read for &BlockingPipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
            let ptr = buf.as_mut_ptr();
            // SAFETY: `buf` stays borrowed until `overlapped` has waited for
            // the read to finish.
            let read = self.overlapped(|handle, ov| unsafe {
                ReadFile(handle, ptr, len, std::ptr::null_mut(), ov)
            });
            match read {
                Err(err) if err.raw_os_error() == Some(ERROR_BROKEN_PIPE as i32) => Ok(0),
                Err(err) if err.raw_os_error() == Some(ERROR_OPERATION_ABORTED as i32) => {
                    Err(io::Error::other(ABORTED))
                }
                other => other,
            }
        }
    }

    impl Write for &BlockingPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
            let ptr = buf.as_ptr();
            // SAFETY: as for reads, `buf` outlives the wait.
            self.overlapped(|handle, ov| unsafe {
                WriteFile(handle, ptr, len, std::ptr::null_mut(), ov)
            })
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AbortPendingIo for BlockingPipe {
        /// Cancel every pending I/O request issued on this pipe handle.
        fn abort_pending_io(&self) -> io::Result<()> {
            // SAFETY: the handle is owned by `self` for the duration of the
            // call and a null OVERLAPPED pointer selects all requests on it.
            let ok = unsafe { CancelIoEx(self.raw(), std::ptr::null()) };
            if ok != 0 {
                return Ok(());
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(code)
                    if code == ERROR_NOT_FOUND as i32 || code == ERROR_INVALID_HANDLE as i32 =>
                {
                    Ok(())
                }
                _ => Err(err),
            }
        }
    }

    impl std::fmt::Debug for BlockingPipe {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("BlockingPipe")
                .field("handle", &self.file.as_raw_handle())
                .finish()
        }
    }
}

/// Whether `err` is the error a read reports after [`AbortPendingIo`] ended it.
pub fn is_abort(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Other && err.to_string() == ABORTED
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn pair() -> (Arc<BlockingPipe>, UnixStream) {
        let (left, right) = UnixStream::pair().unwrap();
        (Arc::new(BlockingPipe::from_stream(left).unwrap()), right)
    }

    #[test]
    fn abort_unblocks_a_blocked_read() {
        let (pipe, _peer) = pair();

        let reader = Arc::clone(&pipe);
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 8];
            (&*reader).read(&mut buf)
        });

        std::thread::sleep(Duration::from_millis(50));
        pipe.abort_pending_io().unwrap();

        let err = handle.join().unwrap().unwrap_err();
        assert!(is_abort(&err), "unexpected error: {err}");
    }

    #[test]
    fn connection_survives_abort() {
        let (pipe, peer) = pair();
        pipe.abort_pending_io().unwrap();
        pipe.reset_abort().unwrap();

        (&peer).write_all(b"after").unwrap();
        let mut buf = [0u8; 5];
        (&*pipe).read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"after");

        (&*pipe).write_all(b"reply").unwrap();
        (&peer).read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"reply");
    }

    #[test]
    fn queued_data_wins_over_abort() {
        let (pipe, peer) = pair();
        (&peer).write_all(b"ready").unwrap();
        pipe.abort_pending_io().unwrap();

        let mut buf = [0u8; 8];
        let read = (&*pipe).read(&mut buf).unwrap();
        assert_eq!(&buf[..read], b"ready");
    }

    #[test]
    fn repeated_aborts_are_benign() {
        let (pipe, _peer) = pair();
        for _ in 0..10_000 {
            assert!(pipe.abort_pending_io().is_ok());
        }
        assert!(pipe.reset_abort().is_ok());
    }

    #[test]
    fn peer_hangup_reads_zero() {
        let (pipe, peer) = pair();
        drop(peer);
        let mut buf = [0u8; 4];
        assert_eq!((&*pipe).read(&mut buf).unwrap(), 0);
    }
}
