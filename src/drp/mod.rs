//! Disaster recovery snapshots
//!
//! A snapshot is a timestamp-named gzip tar of the designated state
//! directories, optionally encrypted. Snapshots are never modified after
//! they are written; restore always picks a whole archive and validates it
//! before touching the filesystem.

pub mod archive;
pub mod crypto;
pub mod export;
pub mod procedure;
pub mod restore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::errors::DrpError;

pub use export::{export_state, ExportOptions, ExportOutcome};
pub use procedure::{procedure_from_config, NativeProcedure, RecoveryProcedure, ScriptProcedure};
pub use restore::{restore_state, RestoreOptions, RestoreOutcome};

pub const ARCHIVE_PREFIX: &str = "drp_export_";
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// `drp_export_<UTC %Y%m%dT%H%M%SZ>[-<seq>].tar.gz[.enc]`
///
/// `seq` disambiguates exports taken within the same second; 0 adds nothing.
pub fn archive_name(at: DateTime<Utc>, seq: u32, encrypted: bool) -> String {
    format!(
        "{}{}{}{}{}",
        ARCHIVE_PREFIX,
        at.format("%Y%m%dT%H%M%SZ"),
        if seq == 0 { String::new() } else { format!("-{}", seq) },
        ARCHIVE_SUFFIX,
        if encrypted { ENCRYPTED_SUFFIX } else { "" }
    )
}

pub fn is_encrypted(path: &Path) -> bool {
    path.to_string_lossy().ends_with(ENCRYPTED_SUFFIX)
}

/// Most recently modified `drp_export_*` file in `export_dir`
pub fn newest_archive(export_dir: &Path) -> Result<Option<(PathBuf, SystemTime)>, DrpError> {
    let pattern = export_dir.join(format!("{}*", ARCHIVE_PREFIX));
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern)
        .map_err(|e| DrpError::ExportFailed(format!("invalid archive pattern '{}': {}", pattern, e)))?;

    let mut newest: Option<(PathBuf, SystemTime)> = None;
    for path in entries.flatten() {
        if !path.is_file() {
            continue;
        }
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(DrpError::io(&path))?;
        let is_newer = match &newest {
            Some((_, best)) => modified > *best,
            None => true,
        };
        if is_newer {
            newest = Some((path, modified));
        }
    }
    Ok(newest)
}

/// One line of the export or rollback journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrpEvent {
    pub event: String,
    pub archive: Option<String>,
    pub members: Vec<String>,
    pub dry_run: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DrpEvent {
    pub fn new(event: &str, archive: Option<&Path>, dry_run: bool) -> Self {
        Self {
            event: event.to_string(),
            archive: archive.map(|p| p.to_string_lossy().into_owned()),
            members: Vec::new(),
            dry_run,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_archive_name_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(archive_name(at, 0, false), "drp_export_20240309T070501Z.tar.gz");
        assert_eq!(archive_name(at, 0, true), "drp_export_20240309T070501Z.tar.gz.enc");
        assert_eq!(archive_name(at, 2, false), "drp_export_20240309T070501Z-2.tar.gz");
        assert!(is_encrypted(Path::new("x/drp_export_1.tar.gz.enc")));
    }

    #[test]
    fn test_newest_archive_by_mtime() {
        let dir = TempDir::new().unwrap();
        assert!(newest_archive(dir.path()).unwrap().is_none());

        let old = dir.path().join("drp_export_b.tar.gz");
        let new = dir.path().join("drp_export_a.tar.gz");
        std::fs::write(&old, "old").unwrap();
        std::fs::write(&new, "new").unwrap();
        std::fs::write(dir.path().join("unrelated.tar.gz"), "x").unwrap();

        let past = SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();

        let (found, _) = newest_archive(dir.path()).unwrap().unwrap();
        assert_eq!(found, new);
    }
}
