use chrono::Utc;
use std::path::{Path, PathBuf};

use super::{archive, archive_name, crypto, DrpEvent, ENCRYPTED_SUFFIX};
use crate::config::DrpConfig;
use crate::errors::DrpError;
use crate::journal::Journal;
use crate::logger::{self, LogTag};
use crate::paths;

const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Directory the include list is relative to
    pub root: PathBuf,
    pub include_dirs: Vec<String>,
    pub export_dir: PathBuf,
    pub encryption_key_env: String,
    pub log_file: PathBuf,
}

impl ExportOptions {
    pub fn from_config(config: &DrpConfig) -> Self {
        Self {
            root: paths::get_base_directory(),
            include_dirs: config.include_dirs.clone(),
            export_dir: paths::resolve(&config.export_dir),
            encryption_key_env: config.encryption_key_env.clone(),
            log_file: paths::resolve(&config.export_log_file),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// Final archive path; `None` on dry runs
    pub archive: Option<PathBuf>,
    pub members: Vec<String>,
    pub encrypted: bool,
    pub dry_run: bool,
}

/// Snapshot the configured directories into a new archive
///
/// A dry run resolves the member list and journals it without writing an
/// archive. Failures are journaled before they are returned.
pub async fn export_state(opts: &ExportOptions, dry_run: bool) -> Result<ExportOutcome, DrpError> {
    let journal = Journal::new(opts.log_file.clone());
    match export_inner(opts, dry_run).await {
        Ok(outcome) => {
            let mut event = DrpEvent::new(
                if dry_run { "dry_run" } else { "export" },
                outcome.archive.as_deref(),
                dry_run,
            );
            event.members = outcome.members.clone();
            journal.record(LogTag::Drp, &event);
            Ok(outcome)
        }
        Err(e) => {
            logger::error(LogTag::Drp, &format!("DRP export failed: {}", e));
            let mut event = DrpEvent::new("failed", None, dry_run);
            event.error = Some(e.to_string());
            journal.record(LogTag::Drp, &event);
            Err(e)
        }
    }
}

async fn export_inner(opts: &ExportOptions, dry_run: bool) -> Result<ExportOutcome, DrpError> {
    let sources: Vec<archive::ArchiveSource> = opts
        .include_dirs
        .iter()
        .map(|dir| archive::ArchiveSource::new(opts.root.join(dir), dir.clone()))
        .collect();
    let present: Vec<String> = sources
        .iter()
        .filter(|s| s.path.exists())
        .map(|s| s.name.clone())
        .collect();
    let encrypted = crypto::key_configured(&opts.encryption_key_env);

    if dry_run {
        logger::info(
            LogTag::Drp,
            &format!(
                "DRP export dry run: would archive [{}] into {}{}",
                present.join(", "),
                opts.export_dir.display(),
                if encrypted { " (encrypted)" } else { "" }
            ),
        );
        return Ok(ExportOutcome {
            archive: None,
            members: present,
            encrypted,
            dry_run,
        });
    }

    if present.is_empty() {
        return Err(DrpError::ExportFailed(format!(
            "none of [{}] exist under {}",
            opts.include_dirs.join(", "),
            opts.root.display()
        )));
    }

    let (plain, members) = write_unique(opts, &sources, encrypted)?;

    let final_path = if encrypted {
        let enc = PathBuf::from(format!("{}{}", plain.display(), ENCRYPTED_SUFFIX));
        let result = crypto::encrypt_file(&plain, &enc, &opts.encryption_key_env).await;
        // The plaintext archive never outlives the export
        remove_quietly(&plain);
        if let Err(e) = result {
            remove_quietly(&enc);
            return Err(e);
        }
        enc
    } else {
        plain
    };

    logger::info(
        LogTag::Drp,
        &format!(
            "DRP export written to {} ({} members)",
            final_path.display(),
            members.len()
        ),
    );
    Ok(ExportOutcome {
        archive: Some(final_path),
        members,
        encrypted,
        dry_run,
    })
}

/// Snapshots are append-only: pick the first name that neither the plain
/// nor the encrypted form of an earlier export occupies
fn write_unique(
    opts: &ExportOptions,
    sources: &[archive::ArchiveSource],
    encrypted: bool,
) -> Result<(PathBuf, Vec<String>), DrpError> {
    let at = Utc::now();
    for seq in 0..MAX_NAME_ATTEMPTS {
        let plain = opts.export_dir.join(archive_name(at, seq, false));
        let enc = opts.export_dir.join(archive_name(at, seq, true));
        if plain.exists() || (encrypted && enc.exists()) {
            continue;
        }
        match archive::write_archive(&plain, sources) {
            Ok(members) => return Ok((plain, members)),
            Err(DrpError::Io { source, .. }) if source.kind() == std::io::ErrorKind::AlreadyExists => {
                continue
            }
            Err(e) => return Err(e),
        }
    }
    Err(DrpError::ExportFailed(format!(
        "no free archive name for {} after {} attempts",
        at.format("%Y%m%dT%H%M%SZ"),
        MAX_NAME_ATTEMPTS
    )))
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            logger::warning(
                LogTag::Drp,
                &format!("Failed to remove {}: {}", path.display(), e),
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::drp::DrpEvent;
    use tempfile::TempDir;

    pub(crate) fn options(root: &Path, key_env: &str) -> ExportOptions {
        std::env::remove_var(key_env);
        ExportOptions {
            root: root.to_path_buf(),
            include_dirs: vec!["logs".to_string(), "state".to_string(), "active".to_string()],
            export_dir: root.join("export"),
            encryption_key_env: key_env.to_string(),
            log_file: root.join("logs/export_log.json"),
        }
    }

    #[tokio::test]
    async fn test_export_writes_timestamped_archive() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("state")).unwrap();
        std::fs::write(root.path().join("state/nonce_cache.json"), "{}").unwrap();
        let opts = options(root.path(), "TG_EXPORT_TEST_PLAIN");

        let outcome = export_state(&opts, false).await.unwrap();
        let archive_path = outcome.archive.unwrap();
        let name = archive_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("drp_export_") && name.ends_with(".tar.gz"));
        assert_eq!(outcome.members, vec!["state"]);
        assert!(!outcome.encrypted);

        let events: Vec<DrpEvent> = crate::journal::read_entries(&opts.log_file).unwrap();
        assert_eq!(events.last().unwrap().event, "export");
    }

    #[tokio::test]
    async fn test_back_to_back_exports_keep_both_archives() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("state")).unwrap();
        std::fs::write(root.path().join("state/nonce_cache.json"), "{\"a\":1}").unwrap();
        let opts = options(root.path(), "TG_EXPORT_TEST_TWICE");

        let first = export_state(&opts, false).await.unwrap().archive.unwrap();
        let first_bytes = std::fs::read(&first).unwrap();
        std::fs::write(root.path().join("state/nonce_cache.json"), "{\"a\":2}").unwrap();
        let second = export_state(&opts, false).await.unwrap().archive.unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), first_bytes);
        let on_disk = std::fs::read_dir(&opts.export_dir).unwrap().count();
        assert_eq!(on_disk, 2);
    }

    #[test]
    fn test_write_archive_never_replaces_existing_file() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("a.txt"), "a").unwrap();
        let target = root.path().join("drp_export_x.tar.gz");
        std::fs::write(&target, "earlier snapshot").unwrap();

        let err = archive::write_archive(
            &target,
            &[archive::ArchiveSource::new(root.path().join("a.txt"), "a.txt")],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DrpError::Io { ref source, .. } if source.kind() == std::io::ErrorKind::AlreadyExists
        ));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "earlier snapshot");
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("logs")).unwrap();
        let opts = options(root.path(), "TG_EXPORT_TEST_DRY");

        let outcome = export_state(&opts, true).await.unwrap();
        assert!(outcome.archive.is_none());
        assert_eq!(outcome.members, vec!["logs"]);
        assert!(!opts.export_dir.exists());

        let events: Vec<DrpEvent> = crate::journal::read_entries(&opts.log_file).unwrap();
        assert_eq!(events[0].event, "dry_run");
        assert!(events[0].dry_run);
    }

    #[tokio::test]
    async fn test_nothing_to_export_fails_and_is_journaled() {
        let root = TempDir::new().unwrap();
        let opts = options(root.path(), "TG_EXPORT_TEST_EMPTY");

        let err = export_state(&opts, false).await.unwrap_err();
        assert!(matches!(err, DrpError::ExportFailed(_)));

        let events: Vec<DrpEvent> = crate::journal::read_entries(&opts.log_file).unwrap();
        assert_eq!(events[0].event, "failed");
        assert!(events[0].error.is_some());
    }
}
