use std::time::{Duration, Instant};

/// A duplex byte endpoint with non-blocking readiness predicates.
///
/// This is the only thing the engine needs from a transport. Implementors
/// must make `get_byte` return promptly once `readable` reported true, and
/// likewise for `put_byte` after `writable`. Buffering beyond a single byte
/// is not required.
pub trait ByteChannel {
    /// Whether at least one byte can be read without blocking.
    fn readable(&mut self) -> bool;

    /// Whether at least one byte can be written without blocking.
    fn writable(&mut self) -> bool;

    /// Read one byte.
    fn get_byte(&mut self) -> std::io::Result<u8>;

    /// Write one byte.
    fn put_byte(&mut self, byte: u8) -> std::io::Result<()>;
}

impl<C: ByteChannel + ?Sized> ByteChannel for Box<C> {
    fn readable(&mut self) -> bool {
        (**self).readable()
    }

    fn writable(&mut self) -> bool {
        (**self).writable()
    }

    fn get_byte(&mut self) -> std::io::Result<u8> {
        (**self).get_byte()
    }

    fn put_byte(&mut self, byte: u8) -> std::io::Result<()> {
        (**self).put_byte(byte)
    }
}

impl<C: ByteChannel + ?Sized> ByteChannel for &mut C {
    fn readable(&mut self) -> bool {
        (**self).readable()
    }

    fn writable(&mut self) -> bool {
        (**self).writable()
    }

    fn get_byte(&mut self) -> std::io::Result<u8> {
        (**self).get_byte()
    }

    fn put_byte(&mut self, byte: u8) -> std::io::Result<()> {
        (**self).put_byte(byte)
    }
}

/// Monotonic elapsed-time source used to measure byte deadlines.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin. Must never go backwards.
    fn now(&self) -> Duration;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
