use std::time::Duration;

use atcmd_channel::{ByteChannel, Clock, SystemClock, TimeoutChannel};
use atcmd_template::{
    format_into, Captures, FromCaptures, LineTemplate, MatchTemplate, ResponseTemplate, Template,
    Value,
};
use tracing::{debug, trace};

use crate::config::ParserConfig;
use crate::error::{ParserError, Result};
use crate::oob::OobRegistry;
use crate::scratch::ScratchBuffer;

enum LineOutcome {
    Matched(Vec<Value>),
    /// An out-of-band handler ran; the whole response must be matched again.
    Preempted,
}

/// Line-oriented AT command/response engine.
///
/// Commands are formatted printf style and terminated with the configured
/// delimiter. Responses are matched scanf style, one delimited line at a
/// time; lines that do not fit the expected template are skipped. Lines
/// starting with a registered out-of-band prefix are handed to their
/// handler first, after which the expected response is matched again from
/// its first line.
///
/// # Example
///
/// ```
/// use atcmd_channel::MemoryChannel;
/// use atcmd_parser::{AtParser, ParserConfig};
/// use atcmd_template::args;
///
/// let (channel, modem) = MemoryChannel::new();
/// modem.respond_to(b"AT+CSQ\r\n", b"+CSQ: 23,99\r\nOK\r\n");
///
/// let mut at = AtParser::new(channel, ParserConfig::default()).unwrap();
/// at.send("AT+CSQ", &[]).unwrap();
/// let (rssi, ber): (i32, i32) = at.recv_as("+CSQ: %d,%d\r\nOK").unwrap();
/// assert_eq!((rssi, ber), (23, 99));
///
/// at.send("AT+CGDCONT=1,\"IP\",\"%s\"", &args!["internet"]).unwrap();
/// ```
pub struct AtParser<C, K = SystemClock> {
    channel: TimeoutChannel<C, K>,
    config: ParserConfig,
    scratch: ScratchBuffer,
    oob: OobRegistry<C, K>,
    dispatching: bool,
}

impl<C: ByteChannel> AtParser<C> {
    /// Create a parser over `channel`, measuring deadlines with the system
    /// clock.
    pub fn new(channel: C, config: ParserConfig) -> Result<Self> {
        Self::with_clock(channel, SystemClock::new(), config)
    }
}

impl<C: ByteChannel, K: Clock> AtParser<C, K> {
    /// Create a parser with an explicit time source.
    pub fn with_clock(channel: C, clock: K, config: ParserConfig) -> Result<Self> {
        config.validate()?;
        let channel = TimeoutChannel::with_clock(channel, clock, config.channel_config());
        Ok(Self {
            channel,
            scratch: ScratchBuffer::with_capacity(config.buffer_size),
            config,
            oob: OobRegistry::new(),
            dispatching: false,
        })
    }

    /// Format a command and write it followed by the delimiter.
    pub fn send(&mut self, template: &str, args: &[Value]) -> Result<()> {
        self.format(template, args)?;
        debug!(command = %self.scratch.as_slice().escape_ascii(), "AT> ");
        let sent = self
            .channel
            .write(self.scratch.as_slice())
            .and_then(|_| self.channel.write(&self.config.delimiter));
        self.scratch.clear();
        sent?;
        Ok(())
    }

    /// Format and write without a delimiter. Returns the bytes written.
    pub fn printf(&mut self, template: &str, args: &[Value]) -> Result<usize> {
        self.format(template, args)?;
        trace!(data = %self.scratch.as_slice().escape_ascii(), "AT> (raw)");
        let written = self.channel.write(self.scratch.as_slice());
        self.scratch.clear();
        Ok(written?)
    }

    /// Receive a response matching `template`, one delimited line per
    /// template line, and return the captured values in directive order.
    ///
    /// Non-matching lines are discarded. Fails only when a byte read fails.
    pub fn recv(&mut self, template: &str) -> Result<Captures> {
        let response = ResponseTemplate::parse(template, &self.config.delimiter)?;
        self.recv_response(&response)
    }

    /// [`recv`](Self::recv), converting the captures into `T`.
    pub fn recv_as<T: FromCaptures>(&mut self, template: &str) -> Result<T> {
        Ok(T::from_captures(self.recv(template)?)?)
    }

    /// Receive a response that was parsed ahead of time.
    pub fn recv_response(&mut self, response: &ResponseTemplate) -> Result<Captures> {
        'restart: loop {
            let mut captures = Captures::new();
            for line in response.lines() {
                match self.match_line(line)? {
                    LineOutcome::Matched(values) => captures.extend(values),
                    LineOutcome::Preempted => continue 'restart,
                }
            }
            return Ok(captures);
        }
    }

    /// Single-shot match without line semantics or out-of-band dispatch.
    ///
    /// Succeeds as soon as the accumulated bytes fit `template` exactly, so
    /// no delimiter is needed (useful for prompts such as `"> "`). Fails if
    /// the scratch buffer fills up first.
    pub fn scanf(&mut self, template: &str) -> Result<Captures> {
        let template = Template::parse(template)?;
        if template.is_empty() {
            return Ok(Captures::new());
        }
        let probe = MatchTemplate::compile(&template);

        self.scratch.clear();
        loop {
            let byte = match self.channel.get_byte() {
                Ok(byte) => byte,
                Err(e) => {
                    self.scratch.clear();
                    return Err(e.into());
                }
            };
            self.scratch.push(byte);

            if probe.matches_fully(self.scratch.as_slice()) {
                let values = template.scan(self.scratch.as_slice());
                debug!(data = %self.scratch.as_slice().escape_ascii(), "AT< ");
                self.scratch.clear();
                return Ok(Captures::from(values));
            }
            if self.scratch.is_full() {
                let capacity = self.scratch.capacity();
                trace!(data = %self.scratch.as_slice().escape_ascii(), "scanf buffer exhausted");
                self.scratch.clear();
                return Err(ParserError::BufferExhausted { capacity });
            }
        }
    }

    /// [`scanf`](Self::scanf), converting the captures into `T`.
    pub fn scanf_as<T: FromCaptures>(&mut self, template: &str) -> Result<T> {
        Ok(T::from_captures(self.scanf(template)?)?)
    }

    /// Register `handler` for lines that start with `prefix`.
    ///
    /// The handler fires once the accumulated line equals `prefix`, before
    /// the rest of the line is read. Registering the same prefix twice makes
    /// both handlers fire, in registration order.
    pub fn oob<F>(&mut self, prefix: impl Into<Vec<u8>>, handler: F)
    where
        F: FnMut(&mut AtParser<C, K>) + 'static,
    {
        self.oob.register(prefix.into(), Box::new(handler));
    }

    /// Discard all presently readable input. Returns the bytes discarded.
    pub fn flush(&mut self) -> Result<usize> {
        Ok(self.channel.flush()?)
    }

    /// Write raw bytes with per-byte deadlines.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.channel.write(data)?)
    }

    /// Fill `buf` with raw bytes with per-byte deadlines.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.channel.read(buf)?)
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Change the per-byte timeout for subsequent operations.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
        self.channel.set_timeout(timeout);
    }

    pub fn delimiter(&self) -> &[u8] {
        &self.config.delimiter
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Number of out-of-band registrations.
    pub fn oob_count(&self) -> usize {
        self.oob.len()
    }

    /// True while an out-of-band handler is running.
    pub fn is_dispatching(&self) -> bool {
        self.dispatching
    }

    /// Borrow the underlying endpoint.
    pub fn get_ref(&self) -> &C {
        self.channel.get_ref()
    }

    /// Mutably borrow the underlying endpoint.
    pub fn get_mut(&mut self) -> &mut C {
        self.channel.get_mut()
    }

    /// Consume the parser and return the endpoint.
    pub fn into_inner(self) -> C {
        self.channel.into_inner()
    }

    fn format(&mut self, template: &str, args: &[Value]) -> Result<()> {
        self.scratch.clear();
        if let Err(e) = format_into(template, args, &mut self.scratch) {
            self.scratch.clear();
            return Err(e.into());
        }
        Ok(())
    }

    fn match_line(&mut self, line: &LineTemplate) -> Result<LineOutcome> {
        self.scratch.clear();
        // Set after an overlong line was dropped: the rest of that line is
        // ignored up to and including its delimiter.
        let mut skipping = false;
        loop {
            let byte = match self.channel.get_byte() {
                Ok(byte) => byte,
                Err(e) => {
                    self.scratch.clear();
                    return Err(e.into());
                }
            };
            self.scratch.push(byte);

            if skipping {
                if self.scratch.ends_with(&self.config.delimiter) {
                    self.scratch.clear();
                    skipping = false;
                } else if self.scratch.is_full() {
                    self.keep_partial_delimiter();
                }
                continue;
            }

            if !self.dispatching && self.oob.fires_on(self.scratch.as_slice()) {
                self.dispatch_oob();
                return Ok(LineOutcome::Preempted);
            }

            if self.scratch.ends_with(&self.config.delimiter) {
                let body_len = self.scratch.len() - self.config.delimiter.len();
                let body = &self.scratch.as_slice()[..body_len];
                if line.matches(body) {
                    let values = line.extract(body);
                    debug!(line = %body.escape_ascii(), "AT< ");
                    self.scratch.clear();
                    return Ok(LineOutcome::Matched(values));
                }
                trace!(line = %body.escape_ascii(), "discarded line");
                self.scratch.clear();
            } else if self.scratch.is_full() {
                trace!(
                    data = %self.scratch.as_slice().escape_ascii(),
                    "discarded line exceeding buffer"
                );
                self.keep_partial_delimiter();
                skipping = true;
            }
        }
    }

    /// Drop the accumulated bytes except a trailing partial delimiter, so a
    /// delimiter split across the reset is still recognised.
    fn keep_partial_delimiter(&mut self) {
        let delimiter = &self.config.delimiter;
        let held = self.scratch.as_slice();
        let keep = (1..delimiter.len())
            .rev()
            .find(|&n| held.ends_with(&delimiter[..n]))
            .unwrap_or(0);
        self.scratch.retain_tail(keep);
    }

    /// Run the handlers for the accumulated line. The registry is detached
    /// for the duration so handlers can borrow the parser mutably; entries
    /// they register are kept.
    fn dispatch_oob(&mut self) {
        let line = self.scratch.as_slice().to_vec();
        self.scratch.clear();

        let mut registry = std::mem::take(&mut self.oob);
        self.dispatching = true;
        registry.dispatch(&line, self);
        self.dispatching = false;

        registry.append(std::mem::take(&mut self.oob));
        self.oob = registry;
        self.scratch.clear();
    }
}

impl<C, K> std::fmt::Debug for AtParser<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtParser")
            .field("config", &self.config)
            .field("oob", &self.oob)
            .field("dispatching", &self.dispatching)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use atcmd_channel::{ChannelError, MemoryChannel, MemoryHandle};
    use atcmd_template::{args, TemplateError};

    use super::*;

    fn parser(config: ParserConfig) -> (AtParser<MemoryChannel>, MemoryHandle) {
        let (channel, handle) = MemoryChannel::new();
        (AtParser::new(channel, config).unwrap(), handle)
    }

    fn quick() -> ParserConfig {
        ParserConfig::default().with_timeout(Duration::from_millis(20))
    }

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn send_formats_and_appends_delimiter() {
        let (mut at, modem) = parser(quick());
        at.send("AT+CMD=%d", &args![5]).unwrap();
        assert_eq!(modem.take_output(), b"AT+CMD=5\r\n");
    }

    #[test]
    fn oob_fires_before_expected_response() {
        let (mut at, modem) = parser(quick());
        let hits = counter();
        let seen = Rc::clone(&hits);
        at.oob("+EVENT", move |_| seen.set(seen.get() + 1));

        modem.push_input(b"+EVENT\r\nOK\r\n");
        let captures = at.recv("OK").unwrap();

        assert!(captures.is_empty());
        assert_eq!(hits.get(), 1);
        assert_eq!(modem.pending_input(), 0);
    }

    #[test]
    fn value_is_captured_after_whole_line() {
        let (mut at, modem) = parser(quick());
        modem.push_input(b"VALUE:42\r\n");
        let (x,): (i32,) = at.recv_as("VALUE:%d").unwrap();
        assert_eq!(x, 42);
    }

    #[test]
    fn silent_channel_times_out() {
        let (mut at, _modem) = parser(quick());
        let err = at.recv("OK").unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {err}");
    }

    #[test]
    fn chatter_before_response_is_skipped() {
        let (mut at, modem) = parser(quick());
        modem.push_input(b"garbage\r\nRDY\r\n\r\n+CSQ: 23,99\r\nOK\r\n");
        let (rssi, ber): (i32, u8) = at.recv_as("+CSQ: %d,%d\r\nOK").unwrap();
        assert_eq!((rssi, ber), (23, 99));
    }

    #[test]
    fn lone_cr_does_not_end_a_line() {
        let (mut at, modem) = parser(quick());
        modem.push_input(b"OK\rOK\r\n");
        assert!(at.recv("OK").is_err());

        let (mut at, modem) = parser(quick());
        modem.push_input(b"A\rB\r\n");
        let (s,): (String,) = at.recv_as("%[^\n]").unwrap();
        assert_eq!(s, "A\rB");
    }

    #[test]
    fn oob_mid_response_restarts_from_first_line() {
        let (mut at, modem) = parser(quick());
        let hits = counter();
        let seen = Rc::clone(&hits);
        at.oob("+EVENT", move |_| seen.set(seen.get() + 1));

        modem.push_input(b"+CSQ: 1,2\r\n+EVENT\r\n+CSQ: 3,4\r\nOK\r\n");
        let (a, b): (i32, i32) = at.recv_as("+CSQ: %d,%d\r\nOK").unwrap();

        assert_eq!((a, b), (3, 4));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn oob_takes_precedence_over_matching_template() {
        let (mut at, modem) = parser(quick());
        let hits = counter();
        let seen = Rc::clone(&hits);
        at.oob("OK", move |_| seen.set(seen.get() + 1));

        modem.push_input(b"OK\r\n");
        assert!(at.recv("OK").unwrap_err().is_timeout());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn duplicate_registrations_both_fire() {
        let (mut at, modem) = parser(quick());
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let order = Rc::clone(&order);
            at.oob("+EV", move |_| order.borrow_mut().push(tag));
        }
        assert_eq!(at.oob_count(), 2);

        modem.push_input(b"+EV\r\nOK\r\n");
        at.recv("OK").unwrap();
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn handler_reads_rest_of_notification() {
        let (mut at, modem) = parser(quick());
        let stat = Rc::new(Cell::new(-1));
        let slot = Rc::clone(&stat);
        at.oob("+CREG", move |at| {
            if let Ok((n,)) = at.recv_as::<(i32,)>(":%d") {
                slot.set(n);
            }
        });

        modem.push_input(b"+CREG: 5\r\nOK\r\n");
        at.recv("OK").unwrap();
        assert_eq!(stat.get(), 5);
    }

    #[test]
    fn handler_can_run_a_command() {
        let (mut at, modem) = parser(quick());
        let hits = counter();
        let data = Rc::new(Cell::new(0));
        let (seen, slot) = (Rc::clone(&hits), Rc::clone(&data));
        at.oob("+NOTIFY", move |at| {
            assert!(at.is_dispatching());
            seen.set(seen.get() + 1);
            at.send("AT+READ", &[]).unwrap();
            let (v,): (i32,) = at.recv_as("DATA:%d").unwrap();
            slot.set(v);
        });

        modem.respond_to(b"AT+READ\r\n", b"+NOTIFY\r\nDATA:7\r\nOK\r\n");
        modem.push_input(b"+NOTIFY\r\n");
        at.recv("OK").unwrap();

        assert_eq!(data.get(), 7);
        assert_eq!(hits.get(), 1, "nested notification must not dispatch");
        assert!(!at.is_dispatching());
        assert_eq!(modem.take_output(), b"AT+READ\r\n");
    }

    #[test]
    fn handler_registrations_are_kept() {
        let (mut at, modem) = parser(quick());
        at.oob("+A", |at| at.oob("+B", |_| {}));
        modem.push_input(b"+A\r\nOK\r\n");
        at.recv("OK").unwrap();
        assert_eq!(at.oob_count(), 2);
    }

    #[test]
    fn empty_prefix_never_fires() {
        let (mut at, modem) = parser(quick());
        let hits = counter();
        let seen = Rc::clone(&hits);
        at.oob("", move |_| seen.set(seen.get() + 1));
        modem.push_input(b"OK\r\n");
        at.recv("OK").unwrap();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn line_filling_buffer_is_discarded_by_recv() {
        let (mut at, modem) = parser(quick().with_buffer_size(8));
        modem.push_input(b"ABCDEF\r\nOK\r\n");
        at.recv("OK").unwrap();

        modem.push_input(b"ABCDEFGHIJ\r\nOK\r\n");
        at.recv("OK").unwrap();
        assert_eq!(modem.pending_input(), 0);
    }

    #[test]
    fn delimiter_split_by_full_buffer_does_not_eat_next_line() {
        let (mut at, modem) = parser(quick().with_buffer_size(8));
        modem.push_input(b"ABCDEFG\r\nOK\r\n");
        at.recv("OK").unwrap();
        assert_eq!(modem.pending_input(), 0);
    }

    #[test]
    fn tail_of_overlong_line_is_not_matched() {
        let (mut at, modem) = parser(quick().with_buffer_size(8));
        modem.push_input(b"ABCDEFGHOK\r\nOK\r\n");
        at.recv("OK").unwrap();
        assert_eq!(modem.pending_input(), 0);

        let (mut at, modem) = parser(quick().with_buffer_size(8));
        modem.push_input(b"ABCDEFGHOK\r\n");
        assert!(at.recv("OK").unwrap_err().is_timeout());
    }

    #[test]
    fn line_filling_buffer_fails_scanf() {
        let (mut at, modem) = parser(quick().with_buffer_size(8));
        modem.push_input(b"ABCDEFGH");
        let err = at.scanf("OK").unwrap_err();
        assert!(matches!(err, ParserError::BufferExhausted { capacity: 8 }));
    }

    #[test]
    fn scanf_matches_without_delimiter() {
        let (mut at, modem) = parser(quick());
        modem.push_input(b"> ");
        at.scanf(">").unwrap();

        modem.push_input(b"12,rest");
        let (n,): (i32,) = at.scanf_as("%d,").unwrap();
        assert_eq!(n, 12);
        assert_eq!(modem.pending_input(), 4);
    }

    #[test]
    fn scanf_ignores_oob_prefixes() {
        let (mut at, modem) = parser(quick());
        let hits = counter();
        let seen = Rc::clone(&hits);
        at.oob("+E", move |_| seen.set(seen.get() + 1));
        modem.push_input(b"+E:9;");
        let (n,): (u32,) = at.scanf_as("+E:%u;").unwrap();
        assert_eq!(n, 9);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn oversized_command_is_rejected() {
        let (mut at, modem) = parser(quick().with_buffer_size(8));
        let err = at.send("AT+LONGCOMMAND", &[]).unwrap_err();
        assert!(matches!(
            err,
            ParserError::Template(TemplateError::Overflow { capacity: 8 })
        ));
        assert!(modem.output().is_empty());
    }

    #[test]
    fn bad_arguments_are_rejected() {
        let (mut at, _modem) = parser(quick());
        assert!(matches!(
            at.send("AT+X=%d", &[]),
            Err(ParserError::Template(TemplateError::MissingArgument { index: 0 }))
        ));
    }

    #[test]
    fn command_round_trip() {
        let (mut at, modem) = parser(quick());
        modem.respond_to(b"AT+ECHO=42,\"hi\"\r\n", b"+ECHO: 42,hi\r\nOK\r\n");

        at.send("AT+ECHO=%d,\"%s\"", &args![42, "hi"]).unwrap();
        let (n, s): (i64, String) = at.recv_as("+ECHO: %d,%[^,\r]\r\nOK").unwrap();
        assert_eq!((n, s.as_str()), (42, "hi"));
    }

    #[test]
    fn printf_writes_without_delimiter() {
        let (mut at, modem) = parser(quick());
        assert_eq!(at.printf("%s\x1a", &args!["payload"]).unwrap(), 8);
        assert_eq!(modem.take_output(), b"payload\x1a");
    }

    #[test]
    fn flush_discards_stale_input() {
        let (mut at, modem) = parser(quick());
        modem.push_input(b"stale\r\n");
        assert_eq!(at.flush().unwrap(), 7);
        assert_eq!(at.flush().unwrap(), 0);
    }

    #[test]
    fn raw_read_and_write() {
        let (mut at, modem) = parser(quick());
        at.write(b"AT").unwrap();
        assert_eq!(modem.take_output(), b"AT");

        modem.push_input(b"xyz");
        let mut buf = [0u8; 3];
        assert_eq!(at.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"xyz");
    }

    #[test]
    fn closed_channel_fails_recv() {
        let (mut at, modem) = parser(quick());
        modem.push_input(b"partial");
        modem.close();
        let err = at.recv("OK").unwrap_err();
        assert!(err.is_closed());
        assert!(matches!(err, ParserError::Channel(ChannelError::Closed)));
    }

    #[test]
    fn custom_delimiter() {
        let (mut at, modem) = parser(quick().with_delimiter("\r"));
        at.send("ATI", &[]).unwrap();
        assert_eq!(modem.take_output(), b"ATI\r");

        modem.push_input(b"\nModel 7\r\nOK\r");
        let (model,): (u32,) = at.recv_as("\nModel %u\r\nOK").unwrap();
        assert_eq!(model, 7);
    }

    #[test]
    fn timeout_can_be_changed() {
        let (mut at, _modem) = parser(ParserConfig::default());
        at.set_timeout(Duration::from_millis(5));
        assert_eq!(at.timeout(), Duration::from_millis(5));
        assert!(at.recv("OK").unwrap_err().is_timeout());
    }

    #[test]
    fn empty_templates_complete_immediately() {
        let (mut at, _modem) = parser(quick());
        assert!(at.recv("").unwrap().is_empty());
        assert!(at.scanf("").unwrap().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let (channel, _modem) = MemoryChannel::new();
        let err = AtParser::new(channel, ParserConfig::default().with_buffer_size(1)).unwrap_err();
        assert!(matches!(err, ParserError::InvalidConfig(_)));
    }

    #[test]
    fn accessors_expose_endpoint_and_config() {
        let (mut at, modem) = parser(quick());
        assert_eq!(at.delimiter(), b"\r\n");
        assert_eq!(at.config().buffer_size, 256);
        modem.push_input(b"x");
        assert!(at.get_mut().readable());
        let _: &MemoryChannel = at.get_ref();
        let mut channel = at.into_inner();
        assert_eq!(channel.get_byte().unwrap(), b'x');
    }
}
