//! Structured logging setup and terminal colouring.
//!
//! Logging goes through `tracing`. [`init_logging`] installs a
//! `tracing-subscriber` registry with an `EnvFilter` and one `fmt` layer in
//! the configured format, optionally behind a `tracing-appender` worker
//! thread. `RUST_LOG` always wins over the configured level.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::io::IsTerminal;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::message::Request;

/// Log format: pretty and compact for development, JSON for collectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: trace/debug/info/warn/error
    pub level: String,
    pub format: LogFormat,
    /// Write through a background thread
    pub async_logging: bool,
    /// Extra filter directives (comma-separated, e.g. `nkapi::router=debug`)
    pub target_filter: Option<String>,
    /// Include file:line location
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            async_logging: false,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Defaults overlaid with `NKAPI_LOG_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok());
        config
    }

    /// Overlay values found through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("NKAPI_LOG_LEVEL") {
            self.level = level;
        }
        if let Some(format) = lookup("NKAPI_LOG_FORMAT") {
            self.format = LogFormat::parse(&format);
        }
        if let Some(flag) = lookup("NKAPI_LOG_ASYNC").and_then(|s| s.parse().ok()) {
            self.async_logging = flag;
        }
        if let Some(filter) = lookup("NKAPI_LOG_TARGET_FILTER") {
            self.target_filter = Some(filter);
        }
        if let Some(flag) = lookup("NKAPI_LOG_INCLUDE_LOCATION").and_then(|s| s.parse().ok()) {
            self.include_location = flag;
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let level = parse_level(&config.level);
    let mut env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if let Some(target_filter) = &config.target_filter {
        for filter in target_filter.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match filter.parse() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(_) => eprintln!("Warning: Invalid log filter directive: {filter}"),
            }
        }
    }

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.async_logging {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        let fmt_layer = match config.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(writer)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(writer)
                .boxed(),
            LogFormat::Compact => tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(writer)
                .boxed(),
        };
        registry
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize async logging")?;

        // Keep the worker alive for the rest of the process.
        std::mem::forget(guard);
    } else {
        let fmt_layer = match config.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(std::io::stderr)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(std::io::stderr)
                .boxed(),
            LogFormat::Compact => tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(std::io::stderr)
                .boxed(),
        };
        registry
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}

/// One access line per exchange.
pub fn log_access(request: &Request, status: u16, elapsed: Duration) {
    let client = request
        .client_address
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string);
    info!(
        target: "nkapi::access",
        client = %client,
        method = %request.method,
        path = %request.path,
        status,
        latency_ms = elapsed.as_secs_f64() * 1000.0,
        "{} {} {}",
        request.method,
        request.path,
        status
    );
}

const RESET: &str = "\x1b[0m";

fn ansi_code(level: Level) -> &'static str {
    match level {
        Level::ERROR => "\x1b[31m",
        Level::WARN => "\x1b[33m",
        Level::INFO => "\x1b[32m",
        Level::DEBUG => "\x1b[36m",
        _ => "\x1b[35m",
    }
}

fn ansi_supported(is_tty: bool, term: Option<&str>) -> bool {
    is_tty && !matches!(term, None | Some("") | Some("dumb"))
}

fn ansi_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        let term = env::var("TERM").ok();
        ansi_supported(std::io::stdout().is_terminal(), term.as_deref())
    })
}

/// Wrap `text` in the colour for `level` when stdout is a capable terminal.
pub fn colorize(text: &str, level: Level) -> String {
    paint(text, level, ansi_enabled())
}

fn paint(text: &str, level: Level, enabled: bool) -> String {
    if enabled {
        format!("{}{}{}", ansi_code(level), text, RESET)
    } else {
        text.to_string()
    }
}
