//! Tracing setup and runtime log level control.
//!
//! Logs always go to stderr: on the stdio transport stdout carries the wire.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::error::{Error, Result};

/// MCP log levels (RFC 5424 severities).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    /// Closest tracing filter.
    pub fn to_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::DEBUG,
            Self::Info | Self::Notice => LevelFilter::INFO,
            Self::Warning => LevelFilter::WARN,
            Self::Error | Self::Critical | Self::Alert | Self::Emergency => LevelFilter::ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "notice" => Ok(Self::Notice),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            "alert" => Ok(Self::Alert),
            "emergency" => Ok(Self::Emergency),
            other => Err(Error::InvalidLogLevel(other.to_string())),
        }
    }
}

/// Something that can change the process log level at runtime.
pub trait LevelControl: Send + Sync {
    fn set_level(&self, level: LogLevel) -> Result<()>;
}

/// Reload handle for the installed subscriber's filter.
#[derive(Clone)]
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LevelControl for LogHandle {
    fn set_level(&self, level: LogLevel) -> Result<()> {
        let filter = EnvFilter::default().add_directive(level.to_filter().into());
        self.handle
            .reload(filter)
            .map_err(|e| Error::Internal(format!("Failed to reload log filter: {}", e)))
    }
}

/// Default filter directive for a `-v` count.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the verbosity flag.
pub fn init(verbosity: u8) -> Result<LogHandle> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to set tracing subscriber: {}", e)))?;

    Ok(LogHandle { handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("emergency".parse::<LogLevel>().unwrap(), LogLevel::Emergency);
        assert!(matches!(
            "verbose".parse::<LogLevel>(),
            Err(Error::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(LogLevel::Debug.to_filter(), LevelFilter::DEBUG);
        assert_eq!(LogLevel::Notice.to_filter(), LevelFilter::INFO);
        assert_eq!(LogLevel::Warning.to_filter(), LevelFilter::WARN);
        assert_eq!(LogLevel::Alert.to_filter(), LevelFilter::ERROR);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&LogLevel::Critical).unwrap(), "\"critical\"");
        assert_eq!(LogLevel::Info.as_str(), "info");
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(0), "info");
        assert_eq!(default_directive(1), "debug");
        assert_eq!(default_directive(5), "trace");
    }
}
