//! Centralized path resolution for tradeguard
//!
//! All state, log and flag paths are resolved through this module so that the
//! orchestrator, the operator CLI and external recovery scripts agree on where
//! things live.
//!
//! ## Path Strategy
//!
//! The base directory is `$TRADEGUARD_HOME` when set, otherwise the platform
//! data directory:
//! - **macOS**: `~/Library/Application Support/tradeguard/`
//! - **Windows**: `%LOCALAPPDATA%\tradeguard\`
//! - **Linux**: `$XDG_DATA_HOME/tradeguard/` (fallback `~/.local/share/tradeguard/`)
//!
//! ## Directory Structure
//!
//! ```text
//! <base>/
//! ├── data/config.toml
//! ├── state/nonce_cache.json
//! ├── active/            (active strategy state)
//! ├── flags/kill_switch.txt
//! ├── logs/
//! │ ├── tx_log.json, nonce_log.json, kill_log.json
//! │ └── tradeguard_<date>.log
//! └── export/drp_export_<ts>.tar.gz[.enc]
//! ```
//!
//! Config values holding relative paths are joined onto the base directory
//! with [`resolve`]; absolute values are used as-is.

use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};

/// Environment override for the base directory
pub const HOME_ENV: &str = "TRADEGUARD_HOME";

static BASE_DIRECTORY: Lazy<PathBuf> = Lazy::new(resolve_base_directory);

fn resolve_base_directory() -> PathBuf {
  const APP_DIR: &str = "tradeguard";

  if let Ok(home) = std::env::var(HOME_ENV) {
    if !home.trim().is_empty() {
      return PathBuf::from(home);
    }
  }

  if let Some(dir) = dirs::data_local_dir() {
    return dir.join(APP_DIR);
  }

  if let Some(home) = dirs::home_dir() {
    return home.join(APP_DIR);
  }

  PathBuf::from(APP_DIR)
}

// =============================================================================
// PRIMARY DIRECTORY ACCESSORS
// =============================================================================

/// Returns the base directory for all tradeguard data
pub fn get_base_directory() -> PathBuf {
  BASE_DIRECTORY.clone()
}

pub fn get_data_directory() -> PathBuf {
  BASE_DIRECTORY.join("data")
}

pub fn get_logs_directory() -> PathBuf {
  BASE_DIRECTORY.join("logs")
}

pub fn get_state_directory() -> PathBuf {
  BASE_DIRECTORY.join("state")
}

pub fn get_flags_directory() -> PathBuf {
  BASE_DIRECTORY.join("flags")
}

/// Returns the main configuration file path
pub fn get_config_path() -> PathBuf {
  get_data_directory().join("config.toml")
}

// =============================================================================
// RESOLUTION HELPERS
// =============================================================================

/// Resolve a configured path against `root`
pub fn resolve_in(root: &Path, configured: &str) -> PathBuf {
  let path = Path::new(configured);
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    root.join(path)
  }
}

/// Resolve a configured path against the base directory
pub fn resolve(configured: &str) -> PathBuf {
  resolve_in(&BASE_DIRECTORY, configured)
}

/// Create the standard directory layout if missing
pub fn ensure_all_directories() -> Result<(), String> {
  let dirs_to_create = [
    ("base", get_base_directory()),
    ("data", get_data_directory()),
    ("logs", get_logs_directory()),
    ("state", get_state_directory()),
    ("flags", get_flags_directory()),
  ];

  for (name, dir) in dirs_to_create {
    if !dir.exists() {
      std::fs::create_dir_all(&dir).map_err(|e| {
        format!(
          "Failed to create {} directory at {}: {}",
          name,
          dir.display(),
          e
        )
      })?;
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_data_directory_is_subdir() {
    assert!(get_data_directory().starts_with(get_base_directory()));
    assert!(get_logs_directory().starts_with(get_base_directory()));
  }

  #[test]
  fn test_config_path_in_data_dir() {
    let config = get_config_path();
    assert!(config.starts_with(get_data_directory()));
    assert_eq!(config.file_name().unwrap(), "config.toml");
  }

  #[test]
  fn test_resolve_keeps_absolute_paths() {
    let root = Path::new("/srv/tg");
    assert_eq!(resolve_in(root, "state/nonce_cache.json"), root.join("state/nonce_cache.json"));
    let abs = if cfg!(windows) { "C:\\tmp\\x.json" } else { "/tmp/x.json" };
    assert_eq!(resolve_in(root, abs), PathBuf::from(abs));
  }
}
