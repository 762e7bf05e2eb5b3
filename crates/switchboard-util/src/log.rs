//! Logging setup using tracing.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Filter directive for the gateway crates at this level.
    ///
    /// Third-party crates stay at `warn` so upstream HTTP chatter does not
    /// drown the gateway's own output; `tower_http` follows the chosen level
    /// so request traces show up.
    pub fn directive(&self) -> String {
        let level = self.as_str();
        format!(
            "warn,switchboard={level},switchboard_core={level},switchboard_mcp={level},\
             switchboard_server={level},switchboard_storage={level},tower_http={level}"
        )
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level used when `RUST_LOG` is not set.
    pub level: LogLevel,
    /// Whether to include file/line info in logs.
    pub include_location: bool,
    /// Whether to emit ANSI colors.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_location: false,
            ansi: true,
        }
    }
}

/// Initialize logging with the given configuration.
///
/// Logs go to stderr so a gateway launched as a stdio child of another tool
/// never corrupts its stdout. Call once at startup.
pub fn init(config: LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.directive()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(config.ansi)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    // A second init (tests, embedding) is not an error worth failing on.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
