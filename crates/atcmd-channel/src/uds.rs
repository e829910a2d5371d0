use std::os::fd::AsRawFd;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{ChannelError, Result};
use crate::stream::{poll_fd, StreamChannel};

/// Unix domain socket endpoint for modems exposed through a socket
/// (simulators, `socat` bridges to a serial line).
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    /// `(dev, ino)` of the socket file this instance created.
    created_inode: (u64, u64),
}

impl UnixDomainSocket {
    /// Permission mode applied to the bound socket file.
    pub const SOCKET_MODE: u32 = 0o600;
    /// `sockaddr_un.sun_path` capacity.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on `path`, replacing a stale socket file if present.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = path.as_os_str().len();
        if len >= Self::MAX_PATH_LEN {
            return Err(ChannelError::PathTooLong {
                path,
                len,
                max: Self::MAX_PATH_LEN,
            });
        }

        let bind_err = |source: std::io::Error| ChannelError::Bind {
            path: path.clone(),
            source,
        };

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(Self::SOCKET_MODE))
            .map_err(bind_err)?;
        let metadata = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            created_inode: (metadata.dev(), metadata.ino()),
            path,
        })
    }

    /// Accept the next connection (blocking).
    pub fn accept(&self) -> Result<StreamChannel<UnixStream>> {
        let (stream, _addr) = self.listener.accept().map_err(ChannelError::Accept)?;
        debug!("accepted connection");
        Ok(StreamChannel::new(stream))
    }

    /// Accept a connection if one arrives within `wait`.
    pub fn accept_timeout(&self, wait: Duration) -> Result<Option<StreamChannel<UnixStream>>> {
        if !poll_fd(self.listener.as_raw_fd(), libc::POLLIN, wait) {
            return Ok(None);
        }
        self.accept().map(Some)
    }

    /// Connect to a listening socket.
    pub fn connect(path: impl AsRef<Path>) -> Result<StreamChannel<UnixStream>> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| ChannelError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "connected to unix domain socket");
        Ok(StreamChannel::new(stream))
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if metadata.file_type().is_socket() && (metadata.dev(), metadata.ino()) == self.created_inode
        {
            debug!(path = ?self.path, "removing socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path replaced; leaving it alone");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;
    use crate::traits::ByteChannel;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("atcmd-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn bind_accept_connect() {
        let dir = temp_dir("uds");
        let sock_path = dir.join("modem.sock");
        let listener = UnixDomainSocket::bind(&sock_path).unwrap();

        let path_clone = sock_path.clone();
        let device = std::thread::spawn(move || {
            let mut client = UnixDomainSocket::connect(&path_clone).unwrap();
            for &b in b"AT\r\n" {
                client.put_byte(b).unwrap();
            }
        });

        let server = listener.accept().unwrap();
        let mut stream = server.into_inner();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"AT\r\n");
        device.join().unwrap();

        drop(listener);
        assert!(!sock_path.exists(), "socket file should be removed on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn accept_timeout_returns_none_without_client() {
        let dir = temp_dir("uds-idle");
        let sock_path = dir.join("idle.sock");
        let listener = UnixDomainSocket::bind(&sock_path).unwrap();

        let started = std::time::Instant::now();
        let accepted = listener.accept_timeout(Duration::from_millis(20)).unwrap();
        assert!(accepted.is_none());
        assert!(started.elapsed() >= Duration::from_millis(15));

        let _client = UnixStream::connect(&sock_path).unwrap();
        let accepted = listener.accept_timeout(Duration::from_secs(2)).unwrap();
        assert!(accepted.is_some());

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn socket_permissions_are_restricted() {
        let dir = temp_dir("uds-perm");
        let sock_path = dir.join("perm.sock");
        let listener = UnixDomainSocket::bind(&sock_path).unwrap();

        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stale_socket_is_replaced() {
        let dir = temp_dir("uds-stale");
        let sock_path = dir.join("stale.sock");
        let first = UnixDomainSocket::bind(&sock_path).unwrap();
        std::mem::forget(first);

        let second = UnixDomainSocket::bind(&sock_path).unwrap();
        let mut peer = UnixStream::connect(&sock_path).unwrap();
        let _accepted = second.accept().unwrap();
        peer.write_all(b"x").unwrap();

        drop(second);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_non_socket_path() {
        let dir = temp_dir("uds-file");
        let path = dir.join("regular");
        std::fs::write(&path, b"data").unwrap();

        let result = UnixDomainSocket::bind(&path);
        assert!(matches!(result, Err(ChannelError::Bind { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn path_too_long() {
        let long_path = "/tmp/".to_string() + &"m".repeat(200) + ".sock";
        let result = UnixDomainSocket::bind(&long_path);
        assert!(matches!(result, Err(ChannelError::PathTooLong { .. })));
    }
}
