//! Line-oriented AT command/response engine.
//!
//! This is the layer applications talk to. [`AtParser`] sends formatted
//! commands, matches multi-line responses against scan templates while
//! skipping unrelated chatter, and hands unsolicited lines to registered
//! out-of-band handlers.

pub mod config;
pub mod error;
pub mod oob;
pub mod parser;
pub mod scratch;

pub use config::{ParserConfig, DEFAULT_BUFFER_SIZE, DEFAULT_DELIMITER};
pub use error::{ParserError, Result};
pub use oob::{OobHandler, OobRegistry};
pub use parser::AtParser;
pub use scratch::ScratchBuffer;
