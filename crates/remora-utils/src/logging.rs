//! # Logging Utilities
//!
//! Logging infrastructure for Remora using `tracing`.
//!
//! - Pretty output for terminals, JSON for log collectors
//! - Level from the command line, `RUST_LOG`, or `info`
//! - Optional file output next to the console
//!
//! Console output goes to stderr so command output on stdout stays clean.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use remora_utils::{init_logging, LogConfig};
//!
//! let _guard = init_logging(LogConfig::from_env()?)?;
//! tracing::info!("Application started");
//! # Ok::<(), remora_utils::LoggingError>(())
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter directives (e.g. `debug`, `remora_core=trace`)
//! - `REMORA_LOG_FORMAT`: `pretty` (default) or `json`
//! - `REMORA_LOG_FILE`: also write logs to this file. A directory gets a
//!   dated `YYYY-MM-DD-remora.log` inside it; a file path rolls daily.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub const LOG_FORMAT_ENV: &str = "REMORA_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "REMORA_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable, with ANSI colors on the console
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Where log files go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFile
{
    /// A file path; the appender adds a daily date suffix
    Rolling(PathBuf),
    /// An exact path, never rotated
    Fixed(PathBuf),
}

impl LogFile
{
    /// Interpret a `REMORA_LOG_FILE` value
    fn from_setting(value: &str) -> Self
    {
        let path = PathBuf::from(value);
        if path.is_dir() {
            let today = Utc::now().format("%Y-%m-%d");
            LogFile::Fixed(path.join(format!("{today}-remora.log")))
        } else {
            LogFile::Rolling(path)
        }
    }

    pub fn path(&self) -> &Path
    {
        match self {
            LogFile::Rolling(path) | LogFile::Fixed(path) => path,
        }
    }
}

/// Resolved logging settings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogConfig
{
    pub format: LogFormat,
    /// Overrides `RUST_LOG` when set
    pub level: Option<LogLevel>,
    pub file: Option<LogFile>,
}

impl LogConfig
{
    /// Read `REMORA_LOG_FORMAT` and `REMORA_LOG_FILE` from the environment
    ///
    /// ## Errors
    ///
    /// `InvalidFormat` if `REMORA_LOG_FORMAT` is set to an unknown value.
    pub fn from_env() -> Result<Self, LoggingError>
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LoggingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match lookup(LOG_FORMAT_ENV) {
            Some(value) => LogFormat::from_str(&value).map_err(LoggingError::InvalidFormat)?,
            None => LogFormat::default(),
        };
        let file = lookup(LOG_FILE_ENV)
            .filter(|value| !value.is_empty())
            .map(|value| LogFile::from_setting(&value));

        Ok(Self {
            format,
            level: None,
            file,
        })
    }

    pub fn with_level(mut self, level: Option<LogLevel>) -> Self
    {
        if level.is_some() {
            self.level = level;
        }
        self
    }

    /// Filter priority: explicit level, then `RUST_LOG`, then `info`
    fn filter(&self) -> EnvFilter
    {
        if let Some(level) = self.level {
            return EnvFilter::new(Level::from(level).to_string());
        }
        match env::var("RUST_LOG") {
            Ok(rust_log) => EnvFilter::try_new(&rust_log).unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
            Err(_) => EnvFilter::new(Level::INFO.to_string()),
        }
    }
}

/// Keeps the background file writer alive
///
/// Hold it until the program exits; dropping it flushes pending file output.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard
{
    _file: Option<WorkerGuard>,
}

fn file_writer(file: &LogFile) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard)
{
    let path = file.path();
    let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let name = path.file_name().unwrap_or_default();
    let appender = match file {
        LogFile::Rolling(_) => tracing_appender::rolling::daily(dir, name),
        LogFile::Fixed(_) => tracing_appender::rolling::never(dir, name),
    };
    tracing_appender::non_blocking(appender)
}

fn pretty_layer<S, W>(writer: W, ansi: bool, filter: EnvFilter) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(ansi)
        .with_writer(writer)
        .with_filter(filter)
}

fn json_layer<S, W>(writer: W, filter: EnvFilter) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(writer)
        .with_filter(filter)
}

/// Install the global subscriber described by `config`
///
/// ## Errors
///
/// `InitializationFailed` if a global subscriber is already installed.
pub fn init_logging(config: LogConfig) -> Result<LogGuard, LoggingError>
{
    let (file, guard) = match &config.file {
        Some(file) => {
            let (writer, guard) = file_writer(file);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let result = match config.format {
        LogFormat::Pretty => Registry::default()
            .with(pretty_layer(io::stderr, true, config.filter()))
            .with(file.map(|writer| pretty_layer(writer, false, config.filter())))
            .try_init(),
        LogFormat::Json => Registry::default()
            .with(json_layer(io::stderr, config.filter()))
            .with(file.map(|writer| json_layer(writer, config.filter())))
            .try_init(),
    };
    result.map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok(LogGuard { _file: guard })
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),
}
