//! Daily log file output

use chrono::Local;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

static LOG_FILE: Lazy<Mutex<Option<BufWriter<File>>>> = Lazy::new(|| Mutex::new(None));

/// Open logs/tradeguard_<date>.log under the base directory
pub fn init_file_logging() {
    if !super::config::get_logger_config().file_logging {
        return;
    }

    let dir = crate::paths::get_logs_directory();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("Failed to create logs directory {}: {}", dir.display(), e);
        return;
    }

    let path = dir.join(format!("tradeguard_{}.log", Local::now().format("%Y-%m-%d")));
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            *LOG_FILE.lock() = Some(BufWriter::new(file));
        }
        Err(e) => eprintln!("Failed to open log file {}: {}", path.display(), e),
    }
}

pub fn write_to_file(line: &str) {
    let mut guard = LOG_FILE.lock();
    if let Some(writer) = guard.as_mut() {
        let _ = writeln!(writer, "{}", line);
    }
}

pub fn flush_file_logging() {
    if let Some(writer) = LOG_FILE.lock().as_mut() {
        let _ = writer.flush();
    }
}
