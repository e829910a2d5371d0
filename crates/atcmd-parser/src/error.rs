use atcmd_channel::ChannelError;
use atcmd_template::TemplateError;

/// Errors that can occur in parser operations.
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    /// Channel-level error: byte timeout, closed endpoint, or I/O failure.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Malformed template, mismatched arguments, or oversized command.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Single-shot input filled the scratch buffer without matching.
    #[error("input filled the {capacity}-byte buffer without matching")]
    BufferExhausted { capacity: usize },

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ParserError {
    /// Returns true when a single byte read or write ran past its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ParserError::Channel(e) if e.is_timeout())
    }

    /// Returns true when the device side hung up.
    pub fn is_closed(&self) -> bool {
        matches!(self, ParserError::Channel(ChannelError::Closed))
    }
}

pub type Result<T> = std::result::Result<T, ParserError>;
