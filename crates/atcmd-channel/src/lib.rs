//! Byte channels for AT command engines.
//!
//! The engine talks to a modem one byte at a time. This crate provides:
//! - [`ByteChannel`], the minimal readiness + byte I/O contract
//! - [`TimeoutChannel`], which bounds every single byte operation by a deadline
//! - [`StreamChannel`] and [`UnixDomainSocket`] for real descriptors (Unix)
//! - [`MemoryChannel`] for in-process devices and tests
//!
//! This is the lowest layer of atcmd. Everything else builds on top of
//! [`TimeoutChannel`].

pub mod error;
pub mod memory;
pub mod timeout;
pub mod traits;

#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub mod uds;

pub use error::{ChannelError, Op, Result};
pub use memory::{MemoryChannel, MemoryHandle};
pub use timeout::{ChannelConfig, TimeoutChannel, DEFAULT_TIMEOUT};
pub use traits::{ByteChannel, Clock, SystemClock};

#[cfg(unix)]
pub use stream::StreamChannel;
#[cfg(unix)]
pub use uds::UnixDomainSocket;
