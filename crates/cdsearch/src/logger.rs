//! Minimal stderr logger for the `log` facade.
//!
//! With the `tracing` feature the core's spans and events go to a separate
//! `tracing_subscriber` formatter filtered by `RUST_LOG` (default `info`).

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the stderr logger. Fails if a logger is already set.
pub fn init_with_level(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Parse a config level name (`"info"`, `"debug"`, ...); `None` means `info`.
pub fn level_from_config(level: Option<&str>) -> anyhow::Result<LevelFilter> {
    match level {
        None => Ok(LevelFilter::Info),
        Some(s) => s
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid log level '{s}'")),
    }
}

/// Install the global `tracing` subscriber. Fails if one is already set.
#[cfg(feature = "tracing")]
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_levels() {
        assert_eq!(level_from_config(None).unwrap(), LevelFilter::Info);
        assert_eq!(level_from_config(Some("debug")).unwrap(), LevelFilter::Debug);
        assert_eq!(level_from_config(Some("OFF")).unwrap(), LevelFilter::Off);
        assert!(level_from_config(Some("loud")).is_err());
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn tracing_subscriber_installs_once() {
        assert!(init_tracing().is_ok());
        assert!(init_tracing().is_err());
    }
}
