//! Logging setup.
//!
//! The severity is chosen once at boot from the configured name. The binary
//! installs the resulting subscriber globally; tests build a [`Dispatch`] over an
//! in-memory sink and install it as a scoped default instead.

use std::fmt;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing::{Dispatch, Metadata};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::{filter_fn, FilterFn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

/// Logging threshold, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SeverityLevel {
    Verbose,
    Debug,
    #[default]
    Information,
    Warning,
    Error,
    Fatal,
}

impl SeverityLevel {
    pub const ALL: [SeverityLevel; 6] = [
        SeverityLevel::Verbose,
        SeverityLevel::Debug,
        SeverityLevel::Information,
        SeverityLevel::Warning,
        SeverityLevel::Error,
        SeverityLevel::Fatal,
    ];

    /// Case-sensitive lookup; anything unrecognized is `Information`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "VERBOSE" => SeverityLevel::Verbose,
            "DEBUG" => SeverityLevel::Debug,
            "INFORMATION" => SeverityLevel::Information,
            "WARNING" => SeverityLevel::Warning,
            "ERROR" => SeverityLevel::Error,
            "FATAL" => SeverityLevel::Fatal,
            _ => SeverityLevel::Information,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SeverityLevel::Verbose => "VERBOSE",
            SeverityLevel::Debug => "DEBUG",
            SeverityLevel::Information => "INFORMATION",
            SeverityLevel::Warning => "WARNING",
            SeverityLevel::Error => "ERROR",
            SeverityLevel::Fatal => "FATAL",
        }
    }

    /// tracing has no fatal level: fatal events are `error!` with `fatal = true`,
    /// and the installed subscriber drops every other error at the `Fatal` threshold.
    pub fn level_filter(self) -> LevelFilter {
        match self {
            SeverityLevel::Verbose => LevelFilter::TRACE,
            SeverityLevel::Debug => LevelFilter::DEBUG,
            SeverityLevel::Information => LevelFilter::INFO,
            SeverityLevel::Warning => LevelFilter::WARN,
            SeverityLevel::Error | SeverityLevel::Fatal => LevelFilter::ERROR,
        }
    }

    fn env_filter(self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.level_filter().into())
            .parse_lossy("")
    }
}

fn is_fatal_event(metadata: &Metadata<'_>) -> bool {
    metadata.fields().field("fatal").is_some()
}

/// Lets everything through unless `level` is `Fatal`, in which case only events
/// carrying a `fatal` field pass.
fn fatal_gate(level: SeverityLevel) -> FilterFn<impl Fn(&Metadata<'_>) -> bool> {
    filter_fn(move |metadata| {
        level != SeverityLevel::Fatal || !metadata.is_event() || is_fatal_event(metadata)
    })
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Logging is already initialized")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Resolve `name` and install a stdout subscriber at that threshold for the
/// rest of the process. Fails if a global subscriber is already set.
pub fn set_level(name: &str) -> Result<SeverityLevel, LoggingError> {
    let level = SeverityLevel::from_name(name);
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(level.env_filter())
        .with_target(true)
        .finish()
        .with(fatal_gate(level));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(level)
}

/// Build a subscriber writing plain (non-ANSI) lines to `writer`.
pub fn build_dispatch<W>(level: SeverityLevel, writer: W) -> Dispatch
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(level.env_filter())
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer)
        .finish()
        .with(fatal_gate(level));
    Dispatch::new(subscriber)
}
