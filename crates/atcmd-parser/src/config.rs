use std::time::Duration;

use atcmd_channel::{ChannelConfig, DEFAULT_TIMEOUT};

use crate::error::{ParserError, Result};

/// Default line delimiter.
pub const DEFAULT_DELIMITER: &[u8] = b"\r\n";

/// Default scratch buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Configuration for an [`AtParser`](crate::AtParser).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Terminates every command sent and every response line received.
    pub delimiter: Vec<u8>,
    /// Capacity of the scratch buffer shared by formatting and matching.
    /// Bounds both the longest command and the longest response line.
    pub buffer_size: usize,
    /// Per-byte deadline. Default: 8 seconds.
    pub timeout: Duration,
    /// Sleep between readiness polls. `None` spins.
    pub poll_interval: Option<Duration>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_vec(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: None,
        }
    }
}

impl ParserConfig {
    pub fn with_delimiter(mut self, delimiter: impl Into<Vec<u8>>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Option<Duration>) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Reject configurations the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.delimiter.is_empty() {
            return Err(ParserError::InvalidConfig(
                "delimiter must not be empty".to_string(),
            ));
        }
        if self.buffer_size <= self.delimiter.len() {
            return Err(ParserError::InvalidConfig(format!(
                "buffer size {} must exceed delimiter length {}",
                self.buffer_size,
                self.delimiter.len()
            )));
        }
        Ok(())
    }

    /// The per-byte settings handed to the timeout channel.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            timeout: self.timeout,
            poll_interval: self.poll_interval,
        }
    }
}
