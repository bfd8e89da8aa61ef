//! Append-only newline-delimited JSON audit journals
//!
//! Each concern (transactions, nonces, kill switch, DRP export/rollback) owns
//! one journal file. Records are never rewritten; a line is appended per event
//! while holding the journal's mutex so concurrent writers cannot interleave.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::logger::{self, LogTag};

#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line
    pub fn append<T: Serialize>(&self, record: &T) -> std::io::Result<()> {
        let line = serde_json::to_string(record)?;

        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }

    /// Append, downgrading a write failure to a warning
    ///
    /// Used on dispatch paths where the audit write must not mask the
    /// outcome being recorded.
    pub fn record<T: Serialize>(&self, tag: LogTag, record: &T) {
        if let Err(e) = self.append(record) {
            logger::warning(
                tag,
                &format!("Failed to append to {}: {}", self.path.display(), e),
            );
        }
    }

    /// Read every record back; malformed lines are skipped
    pub fn read_all<T: DeserializeOwned>(&self) -> std::io::Result<Vec<T>> {
        read_entries(&self.path)
    }
}

pub fn read_entries<T: DeserializeOwned>(path: &Path) -> std::io::Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(entry) = serde_json::from_str(&line) {
            entries.push(entry);
        }
    }
    Ok(entries)
}
