//! Structured logging for funding attempts
//!
//! This module wires the `log` facade to `env_logger` and provides a few
//! context-tagged helpers used by the engine:
//! - Every event carries a [`LogContext`] so funding, lease and selection
//!   events can be filtered apart
//! - Parameters are attached as a JSON object, which the JSON output format
//!   passes through untouched for machine processing
//! - Transaction ids are shortened before they are logged
//!
//! # Usage
//!
//! ```
//! use chanfund_core::logging;
//! use chanfund_core::logging::{LogConfig, LogLevel};
//! use serde_json::json;
//!
//! logging::init(&LogConfig::default()).expect("Failed to initialize logging");
//!
//! logging::log_funding(
//!     LogLevel::Info,
//!     "plan_committed",
//!     Some(json!({ "attempt": "attempt-1", "fee_sat": 6087 })),
//! );
//! ```

use bitcoin::OutPoint;
use chrono::Local;
use log::{debug, LevelFilter};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::sync::Once;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Error conditions
    Error,
    /// Warning conditions
    Warn,
    /// Informational messages
    Info,
    /// Debug-level messages
    Debug,
    /// Trace level (very verbose)
    Trace,
}

/// Log context categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogContext {
    /// Attempt lifecycle: state transitions, plans, aborts
    Funding,
    /// Lease acquisition and release
    Lease,
    /// Coin selection and fee pricing
    Selection,
    /// Loading and validating configuration
    Config,
}

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default log level for all contexts
    pub level: LogLevel,
    /// Path to log file (None for console-only)
    pub log_file: Option<String>,
    /// Whether to include timestamps in log messages
    pub include_timestamps: bool,
    /// Whether to include source location in log messages
    pub include_source_location: bool,
    /// Whether to use JSON format for logs (machine-readable)
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_file: None,
            include_timestamps: true,
            include_source_location: false,
            json_format: false,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

// Ensure logging is only initialized once
static LOGGING_INIT: Once = Once::new();

/// Initialize the logging system with the given configuration
///
/// Safe to call more than once; only the first call installs a logger.
/// A logger installed by someone else (the embedding node, a test harness)
/// is left in place.
///
/// # Arguments
/// * `config` - Configuration for the logging system
///
/// # Returns
/// * Result with () on success, error string if the log file cannot be opened
pub fn init(config: &LogConfig) -> Result<(), String> {
    let mut result = Ok(());

    let include_timestamps = config.include_timestamps;
    let include_source_location = config.include_source_location;
    let json_format = config.json_format;
    let log_file = config.log_file.clone();
    let level = config.level;

    LOGGING_INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(level.into());

        builder.format(move |buf, record| {
            let timestamp = if include_timestamps {
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
            } else {
                String::new()
            };

            let source_location = if include_source_location {
                format!(" [{}:{}]", record.file().unwrap_or("unknown"), record.line().unwrap_or(0))
            } else {
                String::new()
            };

            if json_format {
                let json = json!({
                    "timestamp": timestamp,
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "message": record.args().to_string(),
                });
                writeln!(buf, "{}", json)
            } else {
                let mut style = buf.style();
                style.set_bold(true);

                if include_timestamps {
                    write!(buf, "{} ", timestamp)?;
                }
                writeln!(
                    buf,
                    "[{}{}] {}",
                    style.value(record.level()),
                    source_location,
                    record.args()
                )
            }
        });

        if let Some(file_path) = &log_file {
            match OpenOptions::new().create(true).append(true).open(file_path) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(e) => {
                    result = Err(format!("Failed to open log file {}: {}", file_path, e));
                    return;
                }
            }
        }

        if let Err(e) = builder.try_init() {
            // Another logger owns the facade; keep using it
            debug!("Logger already initialized: {}", e);
        }
    });

    result
}

/// Update the log level dynamically
pub fn set_log_level(level: LogLevel) {
    log::set_max_level(level.into());
}

/// Shorten an identifier for logging, keeping the first and last four
/// characters
pub fn sanitize_for_logging(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let len = input.len();
    if len <= 8 || !input.is_ascii() {
        return input.to_string();
    }

    format!("{}...{}", &input[0..4], &input[len - 4..len])
}

/// Short form of an outpoint, `txid-prefix...txid-suffix:vout`
pub fn short_outpoint(outpoint: &OutPoint) -> String {
    format!("{}:{}", sanitize_for_logging(&outpoint.txid.to_string()), outpoint.vout)
}

fn log_with_context(
    level: LogLevel,
    context: LogContext,
    message: &str,
    params: Option<serde_json::Value>,
) {
    match params {
        Some(params) => log::log!(level.into(), "[{:?}] {} {}", context, message, params),
        None => log::log!(level.into(), "[{:?}] {}", context, message),
    }
}

/// Log an attempt lifecycle event
pub fn log_funding(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    log_with_context(level, LogContext::Funding, message, params);
}

/// Log a lease event
pub fn log_lease(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    log_with_context(level, LogContext::Lease, message, params);
}

/// Log a coin selection event
pub fn log_selection(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    log_with_context(level, LogContext::Selection, message, params);
}

/// Log a configuration event
pub fn log_config(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    log_with_context(level, LogContext::Config, message, params);
}

/// Build a JSON parameter object from name/value pairs
///
/// # Arguments
/// * `params` - Vector of (name, value) pairs
///
/// # Returns
/// A JSON object with all parameters
pub fn log_params(params: Vec<(&str, String)>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, value) in params {
        map.insert(name.to_string(), serde_json::Value::String(value));
    }
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_ends() {
        assert_eq!(sanitize_for_logging(""), "");
        assert_eq!(sanitize_for_logging("abcd"), "abcd");
        assert_eq!(sanitize_for_logging("0123456789abcdef"), "0123...cdef");
    }

    #[test]
    fn params_become_object() {
        let value = log_params(vec![("attempt", "attempt-3".to_string())]);
        assert_eq!(value["attempt"], "attempt-3");
    }
}
