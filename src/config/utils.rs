use super::schemas::Config;
use crate::errors::ConfigError;
use crate::logger::{self, LogTag};
/// Configuration utilities - loading, reloading, and access helpers
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::path::Path;

/// Global configuration instance
///
/// Set once by the binary at startup. Library components take their config
/// section by value in their constructors and never read this directly.
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Parse a configuration file without touching global state
///
/// A missing file yields the defaults; a malformed file is an error.
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        logger::warning(
            LogTag::Config,
            &format!("Config file '{}' not found, using default values", path.display()),
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str::<Config>(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load configuration from a file path and initialize the global CONFIG
pub fn load_config_from_path(path: &Path) -> Result<(), ConfigError> {
    let config = read_config(path)?;

    CONFIG
        .set(RwLock::new(config))
        .map_err(|_| ConfigError::AlreadyInitialized)?;

    logger::info(LogTag::Config, &format!("Configuration loaded from {}", path.display()));
    Ok(())
}

/// Reload configuration from disk, replacing the global copy atomically
pub fn reload_config_from_path(path: &Path) -> Result<(), ConfigError> {
    let new_config = read_config(path)?;

    match CONFIG.get() {
        Some(lock) => {
            *lock.write() = new_config;
            Ok(())
        }
        None => Err(ConfigError::NotInitialized),
    }
}

/// Run a closure against the global configuration
///
/// Falls back to defaults when no file has been loaded (tests, one-shot tools).
pub fn with_config<F, R>(f: F) -> R
where
    F: FnOnce(&Config) -> R,
{
    match CONFIG.get() {
        Some(lock) => f(&lock.read()),
        None => f(&Config::default()),
    }
}

/// Get a clone of the entire configuration (safe to hold across await points)
pub fn get_config_clone() -> Config {
    with_config(|cfg| cfg.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = read_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.tx.max_attempts, 3);
        assert_eq!(config.tx.retry_base_delay_ms, 500);
        assert_eq!(config.drp.recover_timeout_secs, 3600);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[capital]\nmax_drawdown_pct = 7.5\n\n[orchestrator]\nmode = \"live\"\n",
        )
        .unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config.capital.max_drawdown_pct, 7.5);
        assert_eq!(config.capital.max_loss_usd, 100.0);
        assert!(config.orchestrator.is_live());
        assert_eq!(config.kill_switch.env_var, "KILL_SWITCH");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tx\nmax_attempts = ").unwrap();
        assert!(matches!(read_config(&path), Err(ConfigError::Parse { .. })));
    }
}
