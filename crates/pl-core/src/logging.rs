//! Logging initialization.
//!
//! Logs always go to stderr so command output on stdout stays parseable.
//! `RUST_LOG` takes precedence over the verbosity flags.

use clap::ValueEnum;
use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, multi-line.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Default filter for a `-v`/`-q` balance.
pub fn default_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(format: LogFormat, level: &str) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let registry = tracing_subscriber::registry().with(env_filter);
        // A subscriber installed elsewhere (tests) wins.
        let _ = match format {
            LogFormat::Json => registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init(),
            LogFormat::Pretty => registry
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init(),
        };
    });
}

/// Span wrapping one CLI command.
#[must_use]
pub fn command_span(command: &'static str, keyspace: &str) -> Span {
    tracing::info_span!("command", command, keyspace = keyspace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(default_level(0, false), "warn");
        assert_eq!(default_level(1, false), "info");
        assert_eq!(default_level(2, false), "debug");
        assert_eq!(default_level(7, false), "trace");
        assert_eq!(default_level(3, true), "error");
    }

    #[test]
    fn init_is_idempotent() {
        init_logging(LogFormat::Json, "warn");
        init_logging(LogFormat::Pretty, "debug");
        let span = command_span("stats", "playlog");
        let _guard = span.enter();
        tracing::info!("message in span");
    }
}
