use std::path::PathBuf;
use std::time::Duration;

/// Direction of a single-byte channel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::Read => f.write_str("read"),
            Op::Write => f.write_str("write"),
        }
    }
}

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// A single byte operation did not become ready within the timeout.
    #[error("{op} timed out after {timeout:?}")]
    Timeout { op: Op, timeout: Duration },

    /// The remote end closed the channel.
    #[error("channel closed")]
    Closed,

    /// An I/O error occurred on the underlying endpoint.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to bind to the specified socket path.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified socket path.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

impl ChannelError {
    /// Returns true for per-byte deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChannelError::Timeout { .. })
    }

    /// Classify an error from a raw byte endpoint.
    pub(crate) fn from_endpoint(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset => ChannelError::Closed,
            _ => ChannelError::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
