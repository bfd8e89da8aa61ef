/// Core logging implementation with automatic filtering
use super::config::{get_logger_config, is_debug_enabled_for_tag};
use super::levels::LogLevel;
use super::tags::LogTag;

/// Check if a log message should be displayed
///
/// Filtering rules:
/// 1. Errors are always shown
/// 2. Check against minimum log level threshold
/// 3. Debug level requires --debug <tag> for that tag
/// 4. Verbose level requires --verbose
pub fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    let config = get_logger_config();

    if level == LogLevel::Error {
        return true;
    }

    if level > config.min_level {
        // Debug for an explicitly enabled tag still passes the threshold
        return level == LogLevel::Debug && is_debug_enabled_for_tag(tag);
    }

    if level == LogLevel::Debug {
        return is_debug_enabled_for_tag(tag) || config.min_level >= LogLevel::Debug;
    }

    true
}

/// Internal logging function with automatic filtering
pub fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(&tag, level) {
        return;
    }

    super::format::format_and_log(tag, level, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_always_pass() {
        assert!(should_log(&LogTag::Tx, LogLevel::Error));
    }

    #[test]
    fn test_verbose_filtered_by_default() {
        assert!(!should_log(&LogTag::Tx, LogLevel::Verbose));
    }
}
