use std::time::Duration;

use tracing::trace;

use crate::error::{ChannelError, Op, Result};
use crate::traits::{ByteChannel, Clock, SystemClock};

/// Default per-byte timeout: 8 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Configuration for a [`TimeoutChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Deadline for each single-byte operation. Re-armed for every byte.
    pub timeout: Duration,
    /// Sleep between readiness polls. `None` spins.
    pub poll_interval: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: None,
        }
    }
}

/// Byte-granular reads and writes with a per-byte deadline.
///
/// Every `get_byte`/`put_byte` polls the endpoint's readiness predicate until
/// it reports ready or more than `timeout` has elapsed since the call began.
/// There is no bound across calls: a slow trickle of bytes keeps a caller
/// alive indefinitely.
pub struct TimeoutChannel<C, K = SystemClock> {
    inner: C,
    clock: K,
    config: ChannelConfig,
}

impl<C: ByteChannel> TimeoutChannel<C> {
    /// Wrap an endpoint with default configuration.
    pub fn new(inner: C) -> Self {
        Self::with_config(inner, ChannelConfig::default())
    }

    /// Wrap an endpoint with explicit configuration.
    pub fn with_config(inner: C, config: ChannelConfig) -> Self {
        Self::with_clock(inner, SystemClock::new(), config)
    }
}

impl<C: ByteChannel, K: Clock> TimeoutChannel<C, K> {
    /// Wrap an endpoint with an explicit time source.
    pub fn with_clock(inner: C, clock: K, config: ChannelConfig) -> Self {
        Self {
            inner,
            clock,
            config,
        }
    }

    /// Read one byte, failing once the timeout is exceeded.
    pub fn get_byte(&mut self) -> Result<u8> {
        self.wait_ready(Op::Read)?;
        self.inner.get_byte().map_err(ChannelError::from_endpoint)
    }

    /// Write one byte, failing once the timeout is exceeded.
    pub fn put_byte(&mut self, byte: u8) -> Result<()> {
        self.wait_ready(Op::Write)?;
        self.inner
            .put_byte(byte)
            .map_err(ChannelError::from_endpoint)
    }

    /// Write all bytes one at a time. Fails on the first byte that fails.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        for &byte in data {
            self.put_byte(byte)?;
        }
        Ok(data.len())
    }

    /// Fill `buf` one byte at a time. Fails on the first byte that fails.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        for slot in buf.iter_mut() {
            *slot = self.get_byte()?;
        }
        Ok(buf.len())
    }

    /// Discard every byte that is readable right now, without waiting.
    ///
    /// Returns the number of bytes discarded.
    pub fn flush(&mut self) -> Result<usize> {
        let mut discarded = 0usize;
        while self.inner.readable() {
            self.inner
                .get_byte()
                .map_err(ChannelError::from_endpoint)?;
            discarded += 1;
        }
        if discarded > 0 {
            trace!(discarded, "flushed stale input");
        }
        Ok(discarded)
    }

    /// Current per-byte timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Change the per-byte timeout for subsequent operations.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Current channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Borrow the underlying endpoint.
    pub fn get_ref(&self) -> &C {
        &self.inner
    }

    /// Mutably borrow the underlying endpoint.
    pub fn get_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    /// Consume the wrapper and return the endpoint.
    pub fn into_inner(self) -> C {
        self.inner
    }

    fn wait_ready(&mut self, op: Op) -> Result<()> {
        let start = self.clock.now();
        loop {
            let ready = match op {
                Op::Read => self.inner.readable(),
                Op::Write => self.inner.writable(),
            };
            if ready {
                return Ok(());
            }
            if self.clock.now().saturating_sub(start) > self.config.timeout {
                return Err(ChannelError::Timeout {
                    op,
                    timeout: self.config.timeout,
                });
            }
            match self.config.poll_interval {
                Some(interval) => std::thread::sleep(interval),
                None => std::hint::spin_loop(),
            }
        }
    }
}

impl<C, K> std::fmt::Debug for TimeoutChannel<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutChannel")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::memory::MemoryChannel;

    /// Advances by a fixed step every time it is read.
    struct StepClock {
        now: Cell<Duration>,
        step: Duration,
    }

    impl StepClock {
        fn new(step: Duration) -> Self {
            Self {
                now: Cell::new(Duration::ZERO),
                step,
            }
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> Duration {
            let now = self.now.get();
            self.now.set(now + self.step);
            now
        }
    }

    fn step_channel(channel: MemoryChannel, timeout_ms: u64) -> TimeoutChannel<MemoryChannel, StepClock> {
        TimeoutChannel::with_clock(
            channel,
            StepClock::new(Duration::from_millis(1)),
            ChannelConfig {
                timeout: Duration::from_millis(timeout_ms),
                poll_interval: None,
            },
        )
    }

    #[test]
    fn get_byte_returns_ready_input() {
        let (channel, handle) = MemoryChannel::new();
        handle.push_input(b"OK");
        let mut tc = step_channel(channel, 10);

        assert_eq!(tc.get_byte().unwrap(), b'O');
        assert_eq!(tc.get_byte().unwrap(), b'K');
    }

    #[test]
    fn get_byte_times_out_on_silent_channel() {
        let (channel, _handle) = MemoryChannel::new();
        let mut tc = step_channel(channel, 5);

        let err = tc.get_byte().unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Timeout { op: Op::Read, timeout } if timeout == Duration::from_millis(5)
        ));
    }

    #[test]
    fn put_byte_times_out_when_not_writable() {
        let (channel, handle) = MemoryChannel::new();
        handle.set_writable(false);
        let mut tc = step_channel(channel, 5);

        let err = tc.put_byte(b'A').unwrap_err();
        assert!(matches!(err, ChannelError::Timeout { op: Op::Write, .. }));
        assert!(handle.output().is_empty());
    }

    #[test]
    fn timeout_is_rearmed_for_every_byte() {
        // Each byte becomes readable just before its own deadline; the
        // whole read takes far longer than one timeout and still succeeds.
        let (channel, handle) = MemoryChannel::new();
        handle.push_input(b"ABC");
        handle.set_readable_after_polls(4);
        let mut tc = step_channel(channel, 5);

        let mut buf = [0u8; 3];
        assert_eq!(tc.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"ABC");
    }

    #[test]
    fn read_fails_without_partial_result() {
        let (channel, handle) = MemoryChannel::new();
        handle.push_input(b"AB");
        let mut tc = step_channel(channel, 3);

        let mut buf = [0u8; 4];
        assert!(tc.read(&mut buf).unwrap_err().is_timeout());
    }

    #[test]
    fn write_sends_every_byte() {
        let (channel, handle) = MemoryChannel::new();
        let mut tc = step_channel(channel, 5);

        assert_eq!(tc.write(b"AT\r\n").unwrap(), 4);
        assert_eq!(handle.output(), b"AT\r\n");
    }

    #[test]
    fn flush_discards_pending_input_only() {
        let (channel, handle) = MemoryChannel::new();
        handle.push_input(b"stale\r\n");
        let mut tc = step_channel(channel, 5);

        assert_eq!(tc.flush().unwrap(), 7);
        assert_eq!(tc.flush().unwrap(), 0);

        handle.push_input(b"X");
        assert_eq!(tc.get_byte().unwrap(), b'X');
    }

    #[test]
    fn closed_endpoint_maps_to_closed() {
        let (channel, handle) = MemoryChannel::new();
        handle.close();
        let mut tc = step_channel(channel, 5);

        assert!(matches!(tc.get_byte(), Err(ChannelError::Closed)));
    }

    #[test]
    fn set_timeout_applies_to_next_call() {
        let (channel, _handle) = MemoryChannel::new();
        let mut tc = step_channel(channel, 5);
        tc.set_timeout(Duration::from_millis(1));
        assert_eq!(tc.timeout(), Duration::from_millis(1));
        assert!(matches!(
            tc.get_byte(),
            Err(ChannelError::Timeout { timeout, .. }) if timeout == Duration::from_millis(1)
        ));
    }

    #[test]
    fn real_clock_timeout_with_poll_interval() {
        let (channel, _handle) = MemoryChannel::new();
        let mut tc = TimeoutChannel::with_config(
            channel,
            ChannelConfig {
                timeout: Duration::from_millis(20),
                poll_interval: Some(Duration::from_millis(1)),
            },
        );
        let started = std::time::Instant::now();
        assert!(tc.get_byte().unwrap_err().is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
