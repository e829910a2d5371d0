use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{ChannelError, Result};
use crate::traits::ByteChannel;

/// [`ByteChannel`] over any file-descriptor backed stream.
///
/// Readiness is probed with a zero-timeout `poll(2)`, so the stream itself
/// can stay in blocking mode: a byte is only read or written after the
/// descriptor reported ready. Works for Unix sockets, pipes, and tty device
/// nodes.
pub struct StreamChannel<T> {
    inner: T,
}

impl<T: Read + Write + AsRawFd> StreamChannel<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the channel and return the stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl StreamChannel<File> {
    /// Open a device node (for example a tty) for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| ChannelError::Connect {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, "opened device");
        Ok(Self::new(file))
    }
}

impl<T: Read + Write + AsRawFd> ByteChannel for StreamChannel<T> {
    fn readable(&mut self) -> bool {
        poll_ready(self.inner.as_raw_fd(), libc::POLLIN)
    }

    fn writable(&mut self) -> bool {
        poll_ready(self.inner.as_raw_fd(), libc::POLLOUT)
    }

    fn get_byte(&mut self) -> std::io::Result<u8> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
                Ok(_) => return Ok(byte[0]),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn put_byte(&mut self, byte: u8) -> std::io::Result<()> {
        loop {
            match self.inner.write(&[byte]) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl<T> std::fmt::Debug for StreamChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamChannel").finish_non_exhaustive()
    }
}

/// Zero-timeout readiness probe.
fn poll_ready(fd: RawFd, events: libc::c_short) -> bool {
    poll_fd(fd, events, Duration::ZERO)
}

/// Wait up to `wait` for `events` on `fd`. Hangup and error count as ready
/// so the following read, write or accept surfaces the condition.
pub(crate) fn poll_fd(fd: RawFd, events: libc::c_short, wait: Duration) -> bool {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let timeout_ms = libc::c_int::try_from(wait.as_millis()).unwrap_or(libc::c_int::MAX);
    // SAFETY: `pfd` is a valid, exclusively borrowed pollfd and we pass a
    // count of exactly one entry.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    rc > 0 && pfd.revents & (events | libc::POLLHUP | libc::POLLERR) != 0
}
