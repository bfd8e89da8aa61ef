//! Logger configuration derived from command-line flags

use super::levels::LogLevel;
use super::tags::LogTag;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Messages above this level are dropped (debug tags excepted)
    pub min_level: LogLevel,
    /// Tags with --debug <tag> enabled
    pub debug_tags: HashSet<String>,
    /// Write to the daily log file in addition to the console
    pub file_logging: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            file_logging: true,
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> = Lazy::new(|| RwLock::new(LoggerConfig::default()));

pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

impl LoggerConfig {
    /// Build from parsed CLI flags; `all` in `debug` enables every tag
    pub fn from_flags(verbose: bool, quiet: bool, no_log_file: bool, debug: &[String]) -> Self {
        let mut config = LoggerConfig::default();
        if verbose {
            config.min_level = LogLevel::Verbose;
        } else if quiet {
            config.min_level = LogLevel::Warning;
        }
        config.file_logging = !no_log_file;

        for key in debug {
            if key == "all" {
                for tag in LogTag::all() {
                    config.debug_tags.insert(tag.to_debug_key());
                }
            } else {
                config.debug_tags.insert(key.to_lowercase());
            }
        }
        config
    }
}

pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    LOGGER_CONFIG.read().debug_tags.contains(&tag.to_debug_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        let config = LoggerConfig::from_flags(false, true, false, &["Nonce".to_string()]);
        assert!(config.debug_tags.contains("nonce"));
        assert_eq!(config.min_level, LogLevel::Warning);
        assert!(config.file_logging);
    }

    #[test]
    fn test_debug_all_and_verbose_wins() {
        let config = LoggerConfig::from_flags(true, true, true, &["all".to_string()]);
        assert_eq!(config.min_level, LogLevel::Verbose);
        assert!(config.debug_tags.contains("kill-switch"));
        assert!(!config.file_logging);
    }
}
