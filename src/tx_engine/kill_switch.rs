//! Global emergency stop
//!
//! The switch is derived live from two sources on every call: an environment
//! variable set to "1", or the presence of a flag file. Nothing is cached, so
//! an operator can halt dispatch within one cycle by touching a file.
//!
//! Triggering is automatic (a source appears). Re-arming is manual: `clear`
//! removes both sources and the recovery is journaled as its own event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::KillSwitchConfig;
use crate::journal::Journal;
use crate::logger::{self, LogTag};
use crate::metrics;
use crate::paths;

/// Overrides the configured flag file location
pub const FLAG_FILE_ENV: &str = "KILL_SWITCH_FLAG_FILE";
/// Overrides the configured kill journal location
pub const LOG_FILE_ENV: &str = "KILL_SWITCH_LOG_FILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KillSource {
    Env,
    File,
    Unknown,
}

impl KillSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KillSource::Env => "env",
            KillSource::File => "file",
            KillSource::Unknown => "unknown",
        }
    }
}

/// One line of the kill journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillEvent {
    pub event: String,
    pub origin_module: String,
    pub kill_event: bool,
    pub triggered_by: Option<KillSource>,
    pub risk_level: String,
    pub mutation_id: String,
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct KillSwitch {
    env_var: String,
    flag_file: PathBuf,
    journal: Journal,
}

impl KillSwitch {
    pub fn new(env_var: impl Into<String>, flag_file: PathBuf, log_file: PathBuf) -> Self {
        Self {
            env_var: env_var.into(),
            flag_file,
            journal: Journal::new(log_file),
        }
    }

    pub fn from_config(config: &KillSwitchConfig) -> Self {
        let flag_file = std::env::var(FLAG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| paths::resolve(&config.flag_file));
        let log_file = std::env::var(LOG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| paths::resolve(&config.log_file));
        Self::new(config.env_var.clone(), flag_file, log_file)
    }

    pub fn flag_file(&self) -> &Path {
        &self.flag_file
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Which source currently holds the switch, if any
    pub fn source(&self) -> Option<KillSource> {
        if std::env::var(&self.env_var).map(|v| v == "1").unwrap_or(false) {
            return Some(KillSource::Env);
        }
        if self.flag_file.exists() {
            return Some(KillSource::File);
        }
        None
    }

    /// Re-evaluated on every call
    pub fn triggered(&self) -> bool {
        self.source().is_some()
    }

    /// Journal an abort caused by the switch
    pub fn record_kill_event(&self, origin: &str) {
        let source = self.source().unwrap_or(KillSource::Unknown);
        metrics::global().record_kill_event();
        logger::error(
            LogTag::KillSwitch,
            &format!(
                "Kill switch triggered (source={}) - {} aborted",
                source.as_str(),
                origin
            ),
        );
        self.journal
            .record(LogTag::KillSwitch, &self.event("kill_switch", origin, true, Some(source), "high"));
    }

    /// Operator action: create the flag file
    pub fn engage(&self, origin: &str) -> std::io::Result<()> {
        if let Some(parent) = self.flag_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(
            &self.flag_file,
            format!("engaged by {} at {}\n", origin, Utc::now().to_rfc3339()),
        )?;
        logger::warning(
            LogTag::KillSwitch,
            &format!("Kill switch engaged by {} ({})", origin, self.flag_file.display()),
        );
        self.journal.record(
            LogTag::KillSwitch,
            &self.event("kill_engaged", origin, true, Some(KillSource::File), "high"),
        );
        Ok(())
    }

    /// Remove the flag file and unset the variable
    ///
    /// Callers record the matching recovery with [`KillSwitch::record_recovery_event`].
    pub fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.flag_file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        std::env::remove_var(&self.env_var);
        logger::info(LogTag::KillSwitch, "Kill switch cleared");
        Ok(())
    }

    pub fn record_recovery_event(&self, origin: &str) {
        logger::info(
            LogTag::KillSwitch,
            &format!("Kill switch recovery recorded by {}", origin),
        );
        self.journal
            .record(LogTag::KillSwitch, &self.event("kill_recovered", origin, false, None, "low"));
    }

    fn event(
        &self,
        event: &str,
        origin: &str,
        kill_event: bool,
        triggered_by: Option<KillSource>,
        risk_level: &str,
    ) -> KillEvent {
        KillEvent {
            event: event.to_string(),
            origin_module: origin.to_string(),
            kill_event,
            triggered_by,
            risk_level: risk_level.to_string(),
            mutation_id: std::env::var("MUTATION_ID").unwrap_or_else(|_| "dev".to_string()),
            trace_id: std::env::var("TRACE_ID").unwrap_or_default(),
            timestamp: Utc::now(),
        }
    }
}
