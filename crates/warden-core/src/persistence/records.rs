//! Approval record persistence.
//!
//! # File Structure
//!
//! Each record is saved to its own file, named after the record id:
//!
//! ```text
//! ~/.config/warden/approvals/{ID}.json
//! ```
//!
//! # Design Notes
//!
//! - **Atomic writes**: Write to a uniquely named temp file, then rename.
//!   Two writers racing on the same record never interleave bytes; the last
//!   rename wins.
//! - **Corrupt files are skipped**: A record that can't be read or parsed is
//!   treated as absent. One bad file never makes the rest of the store
//!   unavailable.
//! - **Lazy expiry**: `list` flips overdue pending records to `expired` and
//!   persists that before deciding what to return.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;

use super::types::{ApprovalRecord, ApprovalStatus};
use crate::error::StoreError;
use crate::id::normalize_id;

const RECORD_EXTENSION: &str = "json";

/// Directory-backed store of approval records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    /// Save a record, replacing any previous version.
    ///
    /// # Atomic Write Strategy
    ///
    /// 1. Write to `{ID}.json.{pid}-{nonce}.tmp`
    /// 2. Rename to `{ID}.json`
    pub fn save(&self, record: &ApprovalRecord) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;

        let file_path = self.record_path(&record.id);
        let nonce: u32 = rand::thread_rng().gen();
        let temp_path = self.dir.join(format!(
            "{}.{RECORD_EXTENSION}.{}-{nonce:08x}.tmp",
            record.id,
            std::process::id()
        ));

        let json = serde_json::to_string_pretty(record)?;
        if let Err(e) = fs::write(&temp_path, json) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        fs::rename(&temp_path, &file_path)?;

        Ok(())
    }

    /// Load a record by id.
    ///
    /// The id is normalized to upper case first. Returns `None` if the record
    /// doesn't exist or its file can't be read or parsed.
    pub fn load(&self, id: &str) -> Option<ApprovalRecord> {
        let id = normalize_id(id)?;
        read_record(&self.record_path(&id))
    }

    /// Check if a record file exists.
    pub fn exists(&self, id: &str) -> bool {
        normalize_id(id).is_some_and(|id| self.record_path(&id).exists())
    }

    /// Delete a record. Deleting an absent record is not an error.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let Some(id) = normalize_id(id) else {
            return Ok(());
        };

        match fs::remove_file(self.record_path(&id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List records, newest first.
    ///
    /// Pending records past their expiry are rewritten as `expired` before
    /// filtering. Only pending records are returned unless `include_all`.
    pub fn list(&self, include_all: bool) -> Result<Vec<ApprovalRecord>, StoreError> {
        self.list_at(include_all, Utc::now())
    }

    /// [`RecordStore::list`] with an explicit clock.
    pub fn list_at(
        &self,
        include_all: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<ApprovalRecord>, StoreError> {
        let mut records = Vec::new();

        for mut record in self.scan()? {
            if record.should_expire(now) {
                record.status = ApprovalStatus::Expired;
                match self.save(&record) {
                    Ok(()) => log::info!("Approval {} expired", record.id),
                    Err(e) => log::warn!("Failed to persist expiry of {}: {}", record.id, e),
                }
            }

            if include_all || record.status == ApprovalStatus::Pending {
                records.push(record);
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Every readable record exactly as stored, newest first. Never writes.
    pub fn snapshot(&self) -> Result<Vec<ApprovalRecord>, StoreError> {
        let mut records = self.scan()?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn scan(&self) -> Result<Vec<ApprovalRecord>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(record) = read_record(&path) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn read_record(path: &Path) -> Option<ApprovalRecord> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            log::warn!("Skipping unreadable record {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&contents) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("Skipping corrupt record {}: {}", path.display(), e);
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn make_record(id: &str, created_at: DateTime<Utc>) -> ApprovalRecord {
        ApprovalRecord::new(
            id,
            format!("Summary {id}"),
            vec!["echo hi".to_string()],
            created_at,
            Duration::hours(2),
        )
    }

    #[test]
    fn save_and_load_record() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("approvals"));
        let record = make_record("ABC234", Utc::now());

        store.save(&record).unwrap();
        let loaded = store.load("ABC234").unwrap();

        assert_eq!(loaded.id, "ABC234");
        assert_eq!(loaded.summary, "Summary ABC234");
        assert_eq!(loaded.commands, vec!["echo hi"]);
        assert!(dir.path().join("approvals/ABC234.json").exists());
    }

    #[test]
    fn load_normalizes_case() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        store.save(&make_record("ABC234", Utc::now())).unwrap();

        assert!(store.load("abc234").is_some());
        assert!(store.load("  Abc234 ").is_some());
        assert!(store.exists("abc234"));
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        assert!(store.load("NOPE22").is_none());
        assert!(store.load("../secrets").is_none());
    }

    #[test]
    fn load_corrupt_returns_none() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("BAD234.json"), "{ truncated").unwrap();

        let store = RecordStore::new(dir.path());
        assert!(store.load("BAD234").is_none());
    }

    #[test]
    fn save_overwrites_previous_version() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let mut record = make_record("ABC234", Utc::now());
        store.save(&record).unwrap();

        record.status = ApprovalStatus::Denied;
        record.denied_by = Some("bob".to_string());
        store.save(&record).unwrap();

        let loaded = store.load("ABC234").unwrap();
        assert_eq!(loaded.status, ApprovalStatus::Denied);
        assert_eq!(loaded.denied_by.as_deref(), Some("bob"));
    }

    #[test]
    fn delete_removes_file_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        store.save(&make_record("ABC234", Utc::now())).unwrap();

        store.delete("abc234").unwrap();
        assert!(!store.exists("ABC234"));

        // Should not error even if file doesn't exist
        store.delete("ABC234").unwrap();
    }

    #[test]
    fn list_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("never-created"));
        assert!(store.list(true).unwrap().is_empty());
    }

    #[test]
    fn list_filters_to_pending_and_sorts_newest_first() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let now = Utc::now();

        let older = make_record("AAA222", now - Duration::minutes(10));
        let newer = make_record("BBB333", now - Duration::minutes(1));
        let mut done = make_record("CCC444", now - Duration::minutes(5));
        done.status = ApprovalStatus::Executed;

        for record in [&older, &newer, &done] {
            store.save(record).unwrap();
        }

        let pending: Vec<_> = store.list(false).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(pending, vec!["BBB333", "AAA222"]);

        let all: Vec<_> = store.list(true).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(all, vec!["BBB333", "CCC444", "AAA222"]);
    }

    #[test]
    fn list_expires_overdue_pending_records_on_disk() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let created = Utc::now() - Duration::hours(3);
        store.save(&make_record("OLD234", created)).unwrap();

        assert!(store.list(false).unwrap().is_empty());

        let on_disk = store.load("OLD234").unwrap();
        assert_eq!(on_disk.status, ApprovalStatus::Expired);

        let all = store.list(true).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, ApprovalStatus::Expired);
    }

    #[test]
    fn list_leaves_overdue_approved_records_alone() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let mut record = make_record("APP234", Utc::now() - Duration::hours(3));
        record.status = ApprovalStatus::Approved;
        store.save(&record).unwrap();

        store.list(true).unwrap();
        assert_eq!(store.load("APP234").unwrap().status, ApprovalStatus::Approved);
    }

    #[test]
    fn snapshot_does_not_expire_anything() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        store.save(&make_record("OLD234", Utc::now() - Duration::hours(3))).unwrap();

        let records = store.snapshot().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ApprovalStatus::Pending);
        assert_eq!(store.load("OLD234").unwrap().status, ApprovalStatus::Pending);
    }

    #[test]
    fn list_skips_corrupt_and_foreign_files() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        store.save(&make_record("GOOD22", Utc::now())).unwrap();
        fs::write(dir.path().join("BAD234.json"), "not json at all").unwrap();
        fs::write(dir.path().join("GOOD22.json.1-deadbeef.tmp"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let all = store.list(true).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "GOOD22");
    }

    #[test]
    fn concurrent_saves_never_leave_a_partial_record() {
        let dir = tempdir().unwrap();
        let store = Arc::new(RecordStore::new(dir.path()));
        let base = make_record("RACE22", Utc::now());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let mut record = base.clone();
                thread::spawn(move || {
                    for j in 0..25 {
                        record.summary = format!("writer {i} pass {j} {}", "x".repeat(i * 500));
                        store.save(&record).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let loaded = store.load("RACE22").expect("record should parse");
        assert!(loaded.summary.starts_with("writer "));
        assert!(loaded.summary.contains("pass 24"));

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
