use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use atcmd::parser::{ParserConfig, DEFAULT_BUFFER_SIZE};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod sim;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one command and match the expected response.
    Send(SendArgs),
    /// Run a scripted modem on a Unix socket.
    Sim(SimArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Sim(args) => sim::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Line settings shared by every command that talks to a device.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Per-byte timeout (e.g. 8s, 500ms).
    #[arg(long, default_value = "8s")]
    pub timeout: String,
    /// Line delimiter. Accepts \r, \n, \t and \\ escapes.
    #[arg(long, default_value = "\\r\\n")]
    pub delimiter: String,
    /// Scratch buffer size in bytes.
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,
}

impl LinkArgs {
    pub fn parser_config(&self) -> CliResult<ParserConfig> {
        let config = ParserConfig::default()
            .with_timeout(parse_duration(&self.timeout)?)
            .with_delimiter(unescape(&self.delimiter)?)
            .with_buffer_size(self.buffer_size)
            .with_poll_interval(Some(Duration::from_millis(1)));
        config
            .validate()
            .map_err(|err| CliError::new(USAGE, err.to_string()))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Unix socket or device node to open.
    pub path: PathBuf,
    /// Command to send, verbatim. Accepts \r, \n, \t and \\ escapes.
    pub command: String,
    /// Expected response template; repeat to match several in order.
    #[arg(long, short = 'e', value_name = "TEMPLATE")]
    pub expect: Vec<String>,
    /// Out-of-band prefix to watch for; repeatable.
    #[arg(long, value_name = "PREFIX")]
    pub oob: Vec<String>,
    /// Keep input that was already pending before the command.
    #[arg(long)]
    pub no_flush: bool,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct SimArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// JSON script describing the simulated modem.
    #[arg(long, value_name = "FILE")]
    pub script: PathBuf,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Expand `\r`, `\n`, `\t` and `\\` so control bytes can be passed on a
/// command line.
pub fn unescape(input: &str) -> CliResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                return Err(CliError::new(
                    USAGE,
                    format!("unsupported escape \\{other} in {input:?}"),
                ))
            }
            None => {
                return Err(CliError::new(
                    USAGE,
                    format!("trailing backslash in {input:?}"),
                ))
            }
        }
    }
    Ok(out)
}
