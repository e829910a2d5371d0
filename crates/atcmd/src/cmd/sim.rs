use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atcmd::channel::{ByteChannel, Clock, StreamChannel, UnixDomainSocket};
use atcmd::parser::{AtParser, ParserError};
use atcmd::template::args;
use serde::Deserialize;
use tracing::{info, warn};

use crate::cmd::SimArgs;
use crate::exit::{
    channel_error, io_error, parser_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS,
};

/// Captures a whole command line; NUL never appears in AT traffic.
const COMMAND_LINE: &str = "%[^\0]";
/// How long one accept attempt waits before the shutdown flag is checked.
const ACCEPT_WAIT: Duration = Duration::from_millis(200);

/// Behaviour of the simulated modem.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Lines sent once when a client connects.
    #[serde(default)]
    pub banner: Vec<String>,
    /// Exact command to reply mapping.
    #[serde(default)]
    pub responses: Vec<Response>,
    /// Reply for commands not listed in `responses`.
    #[serde(default = "default_fallback")]
    pub fallback: Vec<String>,
    /// Unsolicited lines sent after the reply to a given command.
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Response {
    pub command: String,
    pub reply: Vec<String>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Event {
    pub after: String,
    pub lines: Vec<String>,
}

fn default_fallback() -> Vec<String> {
    vec!["ERROR".to_string()]
}

impl Script {
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> CliResult<Self> {
        serde_json::from_str(text)
            .map_err(|err| CliError::new(DATA_INVALID, format!("invalid script: {err}")))
    }

    /// Lines to send back for `command`: the scripted reply (or the
    /// fallback) followed by any events bound to it.
    pub fn lines_for(&self, command: &str) -> Vec<&str> {
        let reply = self
            .responses
            .iter()
            .find(|r| r.command == command)
            .map_or(&self.fallback, |r| &r.reply);
        let events = self
            .events
            .iter()
            .filter(|e| e.after == command)
            .flat_map(|e| e.lines.iter());
        reply.iter().chain(events).map(String::as_str).collect()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Answered,
    Idle,
    Closed,
}

pub fn run(args: SimArgs) -> CliResult<i32> {
    let script = Script::load(&args.script)?;
    let config = args.link.parser_config()?;

    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| channel_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while let Some(stream) = next_client(&listener, &running)? {
        info!("modem session started");

        let mut at = AtParser::new(stream, config.clone())
            .map_err(|err| parser_error("setup failed", err))?;
        serve(&mut at, &script, &running)?;
        info!("modem session ended");
    }

    Ok(SUCCESS)
}

/// Wait for the next client, giving up once `running` is cleared.
fn next_client(
    listener: &UnixDomainSocket,
    running: &AtomicBool,
) -> CliResult<Option<StreamChannel<UnixStream>>> {
    while running.load(Ordering::SeqCst) {
        match listener.accept_timeout(ACCEPT_WAIT) {
            Ok(Some(stream)) => return Ok(Some(stream)),
            Ok(None) => {}
            Err(err) => return Err(channel_error("accept failed", err)),
        }
    }
    Ok(None)
}

fn serve<C: ByteChannel, K: Clock>(
    at: &mut AtParser<C, K>,
    script: &Script,
    running: &AtomicBool,
) -> CliResult<()> {
    if let Err(err) = write_lines(at, script.banner.iter().map(String::as_str)) {
        return disconnect_or_fail(err);
    }

    while running.load(Ordering::SeqCst) {
        match step(at, script) {
            Ok(Step::Closed) => return Ok(()),
            Ok(Step::Answered | Step::Idle) => {}
            Err(err) => return disconnect_or_fail(err),
        }
    }
    Ok(())
}

/// Receive one command and answer it.
fn step<C: ByteChannel, K: Clock>(
    at: &mut AtParser<C, K>,
    script: &Script,
) -> Result<Step, ParserError> {
    let command = match at.recv_as::<(String,)>(COMMAND_LINE) {
        Ok((command,)) => command,
        Err(err) if err.is_timeout() => return Ok(Step::Idle),
        Err(err) if err.is_closed() => return Ok(Step::Closed),
        Err(err) => return Err(err),
    };
    info!(command = %command.escape_debug(), "command received");

    match write_lines(at, script.lines_for(&command)) {
        Ok(()) => Ok(Step::Answered),
        Err(err) if err.is_closed() => Ok(Step::Closed),
        Err(err) => Err(err),
    }
}

fn write_lines<'a, C: ByteChannel, K: Clock>(
    at: &mut AtParser<C, K>,
    lines: impl IntoIterator<Item = &'a str>,
) -> Result<(), ParserError> {
    for line in lines {
        at.send("%s", &args![line])?;
    }
    Ok(())
}

fn disconnect_or_fail(err: ParserError) -> CliResult<()> {
    if err.is_closed() || err.is_timeout() {
        warn!(error = %err, "client went away");
        return Ok(());
    }
    Err(parser_error("session failed", err))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
