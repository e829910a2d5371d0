//! Line-oriented AT command/response engine.
//!
//! atcmd drives modems and similar devices that speak AT commands: send a
//! formatted command, match a multi-line response while skipping chatter,
//! and dispatch unsolicited notifications to out-of-band handlers.
//!
//! # Crate Structure
//!
//! - [`channel`]: byte channels with per-byte deadlines (Unix sockets,
//!   device nodes, in-memory)
//! - [`template`]: printf style command formatting and scanf style
//!   response templates
//! - [`parser`]: the [`AtParser`](parser::AtParser) engine
//!
//! ```
//! use atcmd::channel::MemoryChannel;
//! use atcmd::parser::{AtParser, ParserConfig};
//! use atcmd::template::args;
//!
//! let (channel, modem) = MemoryChannel::new();
//! modem.respond_to(b"AT+CMD=5\r\n", b"VALUE:42\r\n");
//!
//! let mut at = AtParser::new(channel, ParserConfig::default()).unwrap();
//! at.send("AT+CMD=%d", &args![5]).unwrap();
//! let (value,): (i32,) = at.recv_as("VALUE:%d").unwrap();
//! assert_eq!(value, 42);
//! ```

/// Re-export channel types.
pub mod channel {
    pub use atcmd_channel::*;
}

/// Re-export template types.
pub mod template {
    pub use atcmd_template::args;
    pub use atcmd_template::*;
}

/// Re-export parser types.
pub mod parser {
    pub use atcmd_parser::*;
}
