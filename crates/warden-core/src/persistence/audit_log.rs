//! Append-only audit log.
//!
//! Stores lifecycle events as JSON lines in `audit.jsonl`. Entries are
//! never rewritten or removed, so the history outlives the records it
//! describes.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::types::AuditEntry;
use crate::error::StoreError;

/// Handle to the audit log file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a single entry.
    ///
    /// The line is serialized up front and written with one `write_all`, so
    /// an entry is either fully present or absent.
    pub fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        Ok(())
    }

    /// Read up to `limit` most recent entries, newest first.
    ///
    /// Returns an empty list if the log doesn't exist yet. Lines that don't
    /// parse are skipped.
    pub fn read(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::debug!("Skipping malformed audit line: {}", e),
            }
        }

        let skip = entries.len().saturating_sub(limit);
        let mut recent = entries.split_off(skip);
        recent.reverse();
        Ok(recent)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::types::{ApprovalRecord, AuditEvent};
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    fn entry(event: AuditEvent, id: &str) -> AuditEntry {
        let record = ApprovalRecord::new(
            id,
            "Test",
            vec!["true".to_string()],
            Utc::now(),
            chrono::Duration::hours(1),
        );
        AuditEntry::for_record(event, &record)
    }

    #[test]
    fn read_missing_log_returns_empty() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.jsonl"));
        assert!(log.read(10).unwrap().is_empty());
    }

    #[test]
    fn append_then_read_newest_first() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("nested/audit.jsonl"));

        log.append(&entry(AuditEvent::Proposed, "AAA222")).unwrap();
        log.append(&entry(AuditEvent::Approved, "AAA222")).unwrap();
        log.append(&entry(AuditEvent::Executed, "AAA222")).unwrap();

        let events: Vec<_> = log.read(10).unwrap().into_iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![AuditEvent::Executed, AuditEvent::Approved, AuditEvent::Proposed]
        );
    }

    #[test]
    fn read_respects_limit() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.jsonl"));
        for id in ["AAA222", "BBB333", "CCC444", "DDD555"] {
            log.append(&entry(AuditEvent::Proposed, id)).unwrap();
        }

        let ids: Vec<_> = log.read(2).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["DDD555", "CCC444"]);
        assert!(log.read(0).unwrap().is_empty());
    }

    #[test]
    fn one_json_object_per_line() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.jsonl"));
        log.append(&entry(AuditEvent::Denied, "AAA222").details(json!({ "reason": "no" })))
            .unwrap();
        log.append(&entry(AuditEvent::Cleaned, "AAA222,BBB333")).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("timestamp").is_some());
        }
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.jsonl"));
        log.append(&entry(AuditEvent::Proposed, "AAA222")).unwrap();

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        writeln!(file, "{{ half an entry").unwrap();
        writeln!(file).unwrap();

        log.append(&entry(AuditEvent::Approved, "AAA222")).unwrap();

        let entries = log.read(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, AuditEvent::Approved);
    }

    #[test]
    fn append_fails_when_path_is_a_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        fs::create_dir_all(&path).unwrap();

        let log = AuditLog::new(&path);
        assert!(matches!(
            log.append(&entry(AuditEvent::Proposed, "AAA222")),
            Err(StoreError::Io(_))
        ));
    }
}
