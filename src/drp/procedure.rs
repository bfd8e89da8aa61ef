//! Pluggable export / rollback procedures
//!
//! `NativeProcedure` runs the in-crate exporter and restorer. `ScriptProcedure`
//! shells out to operator-provided commands under a hard timeout; the
//! `tradeguard export` / `tradeguard restore` subcommands accept the same
//! arguments, so the binary itself can be configured as the script.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use super::export::{export_state, ExportOptions};
use super::restore::{restore_state, RestoreOptions};
use crate::config::DrpConfig;
use crate::errors::DrpError;
use crate::logger::{self, LogTag};

#[async_trait]
pub trait RecoveryProcedure: Send + Sync {
    /// Produce a snapshot; returns its path when known
    async fn export(&self, dry_run: bool) -> Result<Option<PathBuf>, DrpError>;

    /// Roll back from `archive`, or the newest archive when `None`
    async fn rollback(&self, archive: Option<&Path>, dry_run: bool) -> Result<(), DrpError>;
}

pub struct NativeProcedure {
    export: ExportOptions,
    restore: RestoreOptions,
}

impl NativeProcedure {
    pub fn new(export: ExportOptions, restore: RestoreOptions) -> Self {
        Self { export, restore }
    }

    pub fn from_config(config: &DrpConfig) -> Self {
        Self::new(
            ExportOptions::from_config(config),
            RestoreOptions::from_config(config),
        )
    }
}

#[async_trait]
impl RecoveryProcedure for NativeProcedure {
    async fn export(&self, dry_run: bool) -> Result<Option<PathBuf>, DrpError> {
        Ok(export_state(&self.export, dry_run).await?.archive)
    }

    async fn rollback(&self, archive: Option<&Path>, dry_run: bool) -> Result<(), DrpError> {
        restore_state(&self.restore, archive, dry_run).await.map(|_| ())
    }
}

pub struct ScriptProcedure {
    export_command: Vec<String>,
    rollback_command: Vec<String>,
    timeout: Duration,
}

impl ScriptProcedure {
    pub fn new(export_command: Vec<String>, rollback_command: Vec<String>, timeout: Duration) -> Self {
        Self {
            export_command,
            rollback_command,
            timeout,
        }
    }

    async fn run(&self, command: &[String], extra: Vec<String>) -> Result<String, DrpError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| DrpError::ProcedureFailed("no command configured".to_string()))?;

        logger::info(
            LogTag::Drp,
            &format!("Running DRP procedure: {} {} {}", program, args.join(" "), extra.join(" ")),
        );

        let mut cmd = Command::new(program);
        cmd.args(args).args(&extra).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result
                .map_err(|e| DrpError::ProcedureFailed(format!("failed to start {}: {}", program, e)))?,
            Err(_) => {
                logger::error(
                    LogTag::Drp,
                    &format!("DRP procedure {} timed out after {:?}", program, self.timeout),
                );
                return Err(DrpError::Timeout(self.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            return Err(DrpError::ProcedureFailed(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl RecoveryProcedure for ScriptProcedure {
    async fn export(&self, dry_run: bool) -> Result<Option<PathBuf>, DrpError> {
        let mut extra = Vec::new();
        if dry_run {
            extra.push("--dry-run".to_string());
        }
        let stdout = self.run(&self.export_command, extra).await?;

        // Scripts may print the archive path as their last line
        let archive = stdout
            .lines()
            .map(str::trim)
            .filter(|l| l.contains(super::ARCHIVE_PREFIX))
            .last()
            .map(PathBuf::from);
        Ok(archive)
    }

    async fn rollback(&self, archive: Option<&Path>, dry_run: bool) -> Result<(), DrpError> {
        let mut extra = Vec::new();
        if let Some(archive) = archive {
            extra.push(format!("--archive={}", archive.display()));
        }
        if dry_run {
            extra.push("--dry-run".to_string());
        }
        self.run(&self.rollback_command, extra).await.map(|_| ())
    }
}

/// Script-backed when commands are configured, native otherwise
pub fn procedure_from_config(config: &DrpConfig) -> Arc<dyn RecoveryProcedure> {
    if config.export_command.is_empty() && config.rollback_command.is_empty() {
        return Arc::new(NativeProcedure::from_config(config));
    }
    let native = NativeProcedure::from_config(config);
    if config.export_command.is_empty() || config.rollback_command.is_empty() {
        logger::warning(
            LogTag::Drp,
            "Only one DRP command configured; the other side uses the in-process procedure",
        );
        return Arc::new(MixedProcedure {
            script: ScriptProcedure::new(
                config.export_command.clone(),
                config.rollback_command.clone(),
                Duration::from_secs(config.procedure_timeout_secs),
            ),
            native,
            script_export: !config.export_command.is_empty(),
        });
    }
    Arc::new(ScriptProcedure::new(
        config.export_command.clone(),
        config.rollback_command.clone(),
        Duration::from_secs(config.procedure_timeout_secs),
    ))
}

/// One side scripted, the other native
struct MixedProcedure {
    script: ScriptProcedure,
    native: NativeProcedure,
    script_export: bool,
}

#[async_trait]
impl RecoveryProcedure for MixedProcedure {
    async fn export(&self, dry_run: bool) -> Result<Option<PathBuf>, DrpError> {
        if self.script_export {
            self.script.export(dry_run).await
        } else {
            self.native.export(dry_run).await
        }
    }

    async fn rollback(&self, archive: Option<&Path>, dry_run: bool) -> Result<(), DrpError> {
        if self.script_export {
            self.native.rollback(archive, dry_run).await
        } else {
            self.script.rollback(archive, dry_run).await
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counting procedure with a fixed rollback outcome
    #[derive(Default)]
    pub(crate) struct MockProcedure {
        pub exports: AtomicUsize,
        pub rollbacks: AtomicUsize,
        pub fail_export: bool,
        pub fail_rollback: bool,
        pub last_archive: Mutex<Option<PathBuf>>,
    }

    #[async_trait]
    impl RecoveryProcedure for MockProcedure {
        async fn export(&self, _dry_run: bool) -> Result<Option<PathBuf>, DrpError> {
            self.exports.fetch_add(1, Ordering::SeqCst);
            if self.fail_export {
                return Err(DrpError::ExportFailed("mock".to_string()));
            }
            Ok(None)
        }

        async fn rollback(&self, archive: Option<&Path>, _dry_run: bool) -> Result<(), DrpError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            *self.last_archive.lock() = archive.map(Path::to_path_buf);
            if self.fail_rollback {
                return Err(DrpError::ProcedureFailed("mock".to_string()));
            }
            Ok(())
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_script_receives_dry_run_and_archive_args() {
        // Extra args land in $0, $1 for `sh -c`
        let proc = ScriptProcedure::new(
            sh(r#"[ "$0" = "--dry-run" ] && echo /x/drp_export_1.tar.gz"#),
            sh(r#"[ "$0" = "--archive=/x/a.tar.gz" ] && [ "$1" = "--dry-run" ]"#),
            Duration::from_secs(10),
        );
        assert_eq!(
            proc.export(true).await.unwrap(),
            Some(PathBuf::from("/x/drp_export_1.tar.gz"))
        );
        proc.rollback(Some(Path::new("/x/a.tar.gz")), true).await.unwrap();
    }

    #[tokio::test]
    async fn test_script_failure_carries_stderr() {
        let proc = ScriptProcedure::new(sh("echo broken >&2; exit 3"), Vec::new(), Duration::from_secs(10));
        match proc.export(false).await {
            Err(DrpError::ProcedureFailed(msg)) => assert!(msg.contains("broken")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_script_timeout() {
        let proc = ScriptProcedure::new(Vec::new(), sh("sleep 5"), Duration::from_millis(100));
        assert!(matches!(
            proc.rollback(None, false).await,
            Err(DrpError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_command_fails() {
        let proc = ScriptProcedure::new(Vec::new(), Vec::new(), Duration::from_secs(1));
        assert!(matches!(
            proc.export(false).await,
            Err(DrpError::ProcedureFailed(_))
        ));
    }
}
