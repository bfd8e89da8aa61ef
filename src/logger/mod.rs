//! Structured logging system for tradeguard
//!
//! This module provides a small, ergonomic logging API with:
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-subsystem debug control via --debug <tag> flags
//! - Dual output: colored console + daily log file
//!
//! ## Usage
//!
//! ```rust
//! use tradeguard::logger::{self, LogTag};
//!
//! logger::error(LogTag::Tx, "Send failed after 3 attempts");
//! logger::warning(LogTag::Capital, "Drawdown approaching limit");
//! logger::info(LogTag::Gate, "All gates green");
//! logger::debug(LogTag::Nonce, "Cache hit"); // Only with --debug nonce
//! ```
//!
//! Audit trails (transaction log, nonce log, kill log) are NOT written here;
//! they go through [`crate::journal::Journal`] as newline-delimited JSON.

mod config;
mod core;
mod file;
mod format;
mod levels;
mod tags;

pub use config::{get_logger_config, set_logger_config, LoggerConfig};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Initialize the logger system
///
/// Call once at startup, before starting the orchestrator. Applies the
/// parsed --debug/--verbose/--quiet flags and opens the daily log file.
pub fn init(logger_config: LoggerConfig) {
    config::set_logger_config(logger_config);
    file::init_file_logging();
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level (only with --debug <tag>)
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (only with --verbose)
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Flush pending file writes. Call during shutdown.
pub fn flush() {
    file::flush_file_logging();
}
