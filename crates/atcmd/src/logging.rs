use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Targets that follow `--log-level`; anything else stays at `warn`.
const ENGINE_TARGETS: [&str; 4] = ["atcmd", "atcmd_channel", "atcmd_template", "atcmd_parser"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Verbosity of engine events. `debug` shows every `AT>`/`AT<` line and
/// out-of-band dispatch, `trace` adds discarded chatter and flushed input.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Filter directives for `level`: the engine crates at `level`, everything
/// else capped at `warn` (or off).
fn directives(level: LogLevel) -> String {
    let engine = LevelFilter::from(level);
    let others = engine.min(LevelFilter::WARN);
    ENGINE_TARGETS
        .iter()
        .fold(others.to_string(), |acc, target| format!("{acc},{target}={engine}"))
}

/// Build the filter. A non-empty `RUST_LOG` replaces the `--log-level`
/// directives entirely.
fn build_filter(level: LogLevel, env: Option<&str>) -> EnvFilter {
    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(spec) => EnvFilter::builder().parse_lossy(spec),
        None => EnvFilter::new(directives(level)),
    }
}

/// Install the stderr subscriber.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level, env.as_deref()))
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_level_does_not_raise_other_crates() {
        assert_eq!(
            directives(LogLevel::Debug),
            "warn,atcmd=debug,atcmd_channel=debug,atcmd_template=debug,atcmd_parser=debug"
        );
        assert!(directives(LogLevel::Error).starts_with("error,"));
        assert!(directives(LogLevel::Off).starts_with("off,atcmd=off"));
    }

    #[test]
    fn rust_log_overrides_level() {
        let filter = build_filter(LogLevel::Warn, Some("atcmd_parser=trace"));
        assert_eq!(filter.to_string(), "atcmd_parser=trace");

        let filter = build_filter(LogLevel::Info, Some("  "));
        assert!(filter.to_string().contains("atcmd_parser=info"));
    }
}
