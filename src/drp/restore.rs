//! Rollback from a DRP archive
//!
//! The archive is decrypted (if needed) into a private temp directory and
//! fully validated. Only then are members extracted into a staging
//! directory beside the live state, and each top-level entry swapped into
//! place.

use std::path::{Path, PathBuf};

use super::{archive, crypto, is_encrypted, newest_archive, DrpEvent};
use crate::config::DrpConfig;
use crate::errors::DrpError;
use crate::journal::Journal;
use crate::logger::{self, LogTag};
use crate::paths;

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Directory members are restored into
    pub root: PathBuf,
    pub export_dir: PathBuf,
    pub encryption_key_env: String,
    pub log_file: PathBuf,
}

impl RestoreOptions {
    pub fn from_config(config: &DrpConfig) -> Self {
        Self {
            root: paths::get_base_directory(),
            export_dir: paths::resolve(&config.export_dir),
            encryption_key_env: config.encryption_key_env.clone(),
            log_file: paths::resolve(&config.rollback_log_file),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub archive: PathBuf,
    pub members: Vec<String>,
    pub dry_run: bool,
}

/// Restore `archive`, or the newest archive in the export directory
pub async fn restore_state(
    opts: &RestoreOptions,
    archive: Option<&Path>,
    dry_run: bool,
) -> Result<RestoreOutcome, DrpError> {
    let journal = Journal::new(opts.log_file.clone());
    match restore_inner(opts, archive, dry_run).await {
        Ok(outcome) => {
            let mut event = DrpEvent::new(
                if dry_run { "dry_run" } else { "restore" },
                Some(&outcome.archive),
                dry_run,
            );
            event.members = outcome.members.clone();
            journal.record(LogTag::Drp, &event);
            Ok(outcome)
        }
        Err(e) => {
            logger::error(LogTag::Drp, &format!("DRP restore failed: {}", e));
            let mut event = DrpEvent::new("failed", archive, dry_run);
            event.error = Some(e.to_string());
            journal.record(LogTag::Drp, &event);
            Err(e)
        }
    }
}

async fn restore_inner(
    opts: &RestoreOptions,
    archive: Option<&Path>,
    dry_run: bool,
) -> Result<RestoreOutcome, DrpError> {
    let archive_path = match archive {
        Some(path) => path.to_path_buf(),
        None => newest_archive(&opts.export_dir)?
            .map(|(path, _)| path)
            .ok_or_else(|| DrpError::NoArchive(opts.export_dir.clone()))?,
    };
    if !archive_path.is_file() {
        return Err(DrpError::NoArchive(archive_path));
    }

    let work = tempfile::tempdir().map_err(DrpError::io(std::env::temp_dir()))?;
    let plain = if is_encrypted(&archive_path) {
        let out = work.path().join("restore.tar.gz");
        crypto::decrypt_file(&archive_path, &out, &opts.encryption_key_env).await?;
        out
    } else {
        archive_path.clone()
    };

    let members = archive::validate_archive(&plain)?;
    if dry_run {
        logger::info(
            LogTag::Drp,
            &format!(
                "DRP restore dry run: {} is valid ({} members)",
                archive_path.display(),
                members.len()
            ),
        );
        return Ok(RestoreOutcome {
            archive: archive_path,
            members,
            dry_run,
        });
    }

    std::fs::create_dir_all(&opts.root).map_err(DrpError::io(&opts.root))?;
    let staging = tempfile::Builder::new()
        .prefix(".drp_restore_")
        .tempdir_in(&opts.root)
        .map_err(DrpError::io(&opts.root))?;
    archive::extract_archive(&plain, staging.path())?;
    swap_into_place(staging.path(), &opts.root)?;

    logger::warning(
        LogTag::Drp,
        &format!(
            "State restored from {} ({} members)",
            archive_path.display(),
            members.len()
        ),
    );
    Ok(RestoreOutcome {
        archive: archive_path,
        members,
        dry_run,
    })
}

/// Replace each top-level entry of `root` with its staged counterpart
fn swap_into_place(staging: &Path, root: &Path) -> Result<(), DrpError> {
    let entries = std::fs::read_dir(staging).map_err(DrpError::io(staging))?;
    for entry in entries {
        let entry = entry.map_err(DrpError::io(staging))?;
        let dest = root.join(entry.file_name());

        match std::fs::symlink_metadata(&dest) {
            Ok(meta) if meta.is_dir() => {
                std::fs::remove_dir_all(&dest).map_err(DrpError::io(&dest))?
            }
            Ok(_) => std::fs::remove_file(&dest).map_err(DrpError::io(&dest))?,
            Err(_) => {}
        }
        std::fs::rename(entry.path(), &dest).map_err(DrpError::io(&dest))?;
    }
    Ok(())
}
