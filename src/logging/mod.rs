//! Logging utilities for Lorakit
//! Handles job log file cleanup for 7-day retention

use log::info;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

const LOG_RETENTION_DAYS: u64 = 7;

pub fn cleanup_old_logs(logs_dir: &Path) {
    if !logs_dir.exists() {
        return;
    }

    let retention = Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
    let now = SystemTime::now();

    if let Ok(entries) = fs::read_dir(logs_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "log") {
                if let Ok(meta) = fs::metadata(&path) {
                    if let Ok(modified) = meta.modified() {
                        if let Ok(age) = now.duration_since(modified) {
                            if age > retention {
                                if fs::remove_file(&path).is_ok() {
                                    info!("Cleaned up old job log: {:?}", path.file_name());
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_recent_logs_are_kept() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("job.log");
        fs::write(&log, "line\n").unwrap();

        cleanup_old_logs(dir.path());
        assert!(log.exists());
    }

    #[test]
    fn test_missing_dir_is_a_noop() {
        let dir = TempDir::new().unwrap();
        cleanup_old_logs(&dir.path().join("nope"));
    }
}
