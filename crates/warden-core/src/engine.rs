//! The approval lifecycle engine.
//!
//! Owns every state transition. Callers (CLI, chat tool, RPC) only talk to
//! [`ApprovalEngine`]; it reads and writes through the [`RecordStore`],
//! appends to the [`AuditLog`], and hands approved commands to the
//! [`CommandRunner`].
//!
//! # Ordering rules
//!
//! - A record is persisted before its audit entry is appended. An audit
//!   write failure is logged and never undoes the record change.
//! - `approve` checks expiry before anything else. An overdue record is
//!   flipped to `expired` (persisted and audited) and the call fails with
//!   [`EngineError::Expired`].
//! - `deny` never checks expiry; refusing is always safe while pending.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::config::WardenConfig;
use crate::error::{EngineError, StoreError};
use crate::id::{generate_id, normalize_id};
use crate::paths::{approvals_dir, audit_log_path};
use crate::persistence::types::{ApprovalRecord, ApprovalStatus, AuditEntry, AuditEvent};
use crate::persistence::{AuditLog, RecordStore};
use crate::runner::CommandRunner;

/// Attempts at finding an unused id before giving up.
const MAX_ID_ATTEMPTS: usize = 32;

// ============================================================================
// Operation inputs and outputs
// ============================================================================

/// Optional fields for [`ApprovalEngine::propose`].
#[derive(Debug, Clone, Default)]
pub struct ProposeOptions {
    pub details: Option<String>,
    /// Approval window; the configured default when `None`.
    pub ttl: Option<chrono::Duration>,
    pub env: BTreeMap<String, String>,
    pub channel: Option<String>,
    pub chat_id: Option<String>,
    pub proposed_by: Option<String>,
}

impl ProposeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn proposed_by(mut self, who: impl Into<String>) -> Self {
        self.proposed_by = Some(who.into());
        self
    }
}

/// Which records a batch operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchTarget {
    /// Every pending record at call time, newest first.
    All,
    /// These ids, in this order.
    Ids(Vec<String>),
}

/// An id a batch couldn't approve or execute.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub id: String,
    pub kind: String,
    pub error: String,
}

/// Result of [`ApprovalEngine::batch`].
///
/// `approved` holds every record that went through approve and execute,
/// whatever its commands did. `errors` holds ids that never got that far.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub approved: Vec<ApprovalRecord>,
    pub errors: Vec<BatchFailure>,
}

/// Counts per status plus recent history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStats {
    pub total: usize,
    pub counts: BTreeMap<ApprovalStatus, usize>,
    pub recent: Vec<AuditEntry>,
}

impl ApprovalStats {
    pub fn count(&self, status: ApprovalStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The approval state machine over a flat-file store.
///
/// Holds no in-memory state besides paths and settings; every operation
/// reads the current record from disk.
#[derive(Debug, Clone)]
pub struct ApprovalEngine {
    config: WardenConfig,
    records: RecordStore,
    audit: AuditLog,
    runner: CommandRunner,
}

impl ApprovalEngine {
    /// Create an engine for `config.data_dir`.
    pub fn new(config: WardenConfig) -> Self {
        let records = RecordStore::new(approvals_dir(&config.data_dir));
        let audit = AuditLog::new(audit_log_path(&config.data_dir));
        let runner = CommandRunner::from_config(&config);
        Self {
            config,
            records,
            audit,
            runner,
        }
    }

    /// Load `config.json` from `data_dir` and create an engine.
    pub fn open(data_dir: impl Into<std::path::PathBuf>) -> Result<Self, StoreError> {
        let config = crate::config::load_config(&data_dir.into())?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    fn record_audit(&self, entry: AuditEntry) {
        if let Err(e) = self.audit.append(&entry) {
            log::warn!(
                "Failed to append {} audit entry for {}: {}",
                entry.event,
                entry.id,
                e
            );
        }
    }

    fn require(&self, id: &str) -> Result<ApprovalRecord, EngineError> {
        let canonical = normalize_id(id).unwrap_or_else(|| id.trim().to_string());
        self.records
            .load(id)
            .ok_or(EngineError::NotFound(canonical))
    }

    fn ensure_status(
        record: &ApprovalRecord,
        expected: ApprovalStatus,
        action: &'static str,
    ) -> Result<(), EngineError> {
        if record.status != expected {
            return Err(EngineError::InvalidTransition {
                id: record.id.clone(),
                status: record.status,
                action,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Propose
    // ------------------------------------------------------------------------

    /// Create a pending record and audit it.
    pub fn propose(
        &self,
        summary: &str,
        commands: Vec<String>,
        options: ProposeOptions,
    ) -> Result<ApprovalRecord, EngineError> {
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(EngineError::InvalidProposal(
                "summary must not be empty".to_string(),
            ));
        }
        let commands: Vec<String> = commands
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .collect();
        if commands.is_empty() {
            return Err(EngineError::InvalidProposal(
                "at least one command is required".to_string(),
            ));
        }

        let ttl = match options.ttl {
            Some(ttl) => ttl,
            None => self.config.default_ttl().ok_or_else(|| {
                EngineError::InvalidProposal("configured default TTL is out of range".to_string())
            })?,
        };
        let now = Utc::now();
        if now.checked_add_signed(ttl).is_none() {
            return Err(EngineError::InvalidProposal(
                "approval window is out of range".to_string(),
            ));
        }

        let id = self.unused_id()?;
        let mut record = ApprovalRecord::new(id, summary, commands, now, ttl);
        record.details = options.details;
        record.env = options.env;
        record.channel = options.channel;
        record.chat_id = options.chat_id;
        record.proposed_by = options.proposed_by;

        self.records.save(&record)?;
        log::info!(
            "Proposed approval {} ({} commands): {}",
            record.id,
            record.commands.len(),
            record.summary
        );

        self.record_audit(
            AuditEntry::for_record(AuditEvent::Proposed, &record)
                .actor(record.proposed_by.as_deref())
                .details(json!({
                    "commands": record.commands,
                    "expiresAt": record.expires_at,
                })),
        );

        Ok(record)
    }

    fn unused_id(&self) -> Result<String, StoreError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = generate_id();
            if !self.records.exists(&id) {
                return Ok(id);
            }
            log::debug!("Approval id {} already taken, regenerating", id);
        }
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "could not generate an unused approval id",
        )))
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Pending records (or all with `include_all`), newest first.
    pub fn list(&self, include_all: bool) -> Result<Vec<ApprovalRecord>, EngineError> {
        Ok(self.records.list(include_all)?)
    }

    /// Load a record, failing with `NotFound` if it's absent or unreadable.
    pub fn load(&self, id: &str) -> Result<ApprovalRecord, EngineError> {
        self.require(id)
    }

    /// Remove a record. Absent ids are a no-op.
    pub fn delete(&self, id: &str) -> Result<(), EngineError> {
        self.records.delete(id)?;
        Ok(())
    }

    /// Most recent audit entries, newest first.
    pub fn read_audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>, EngineError> {
        Ok(self.audit.read(limit)?)
    }

    /// Counts per status and the most recent audit entries.
    ///
    /// Read-only: overdue pending records are counted as expired without
    /// being rewritten.
    pub fn stats(&self) -> Result<ApprovalStats, EngineError> {
        let now = Utc::now();
        let mut counts: BTreeMap<ApprovalStatus, usize> =
            ApprovalStatus::ALL.iter().map(|s| (*s, 0)).collect();

        let records = self.records.snapshot()?;
        for record in &records {
            let status = if record.should_expire(now) {
                ApprovalStatus::Expired
            } else {
                record.status
            };
            *counts.entry(status).or_insert(0) += 1;
        }

        Ok(ApprovalStats {
            total: records.len(),
            counts,
            recent: self.audit.read(self.config.recent_audit_limit)?,
        })
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Approve a pending record.
    pub fn approve(
        &self,
        id: &str,
        approved_by: Option<&str>,
    ) -> Result<ApprovalRecord, EngineError> {
        self.approve_at(id, approved_by, Utc::now())
    }

    fn approve_at(
        &self,
        id: &str,
        approved_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRecord, EngineError> {
        let mut record = self.require(id)?;
        Self::ensure_status(&record, ApprovalStatus::Pending, "approve")?;

        if record.is_past_expiry(now) {
            record.status = ApprovalStatus::Expired;
            self.records.save(&record)?;
            log::info!("Approval {} expired before it was approved", record.id);
            self.record_audit(
                AuditEntry::for_record(AuditEvent::Expired, &record)
                    .actor(approved_by)
                    .details(json!({ "expiresAt": record.expires_at })),
            );
            return Err(EngineError::Expired(record.id));
        }

        record.status = ApprovalStatus::Approved;
        record.approved_at = Some(now);
        record.approved_by = approved_by.map(str::to_string);
        self.records.save(&record)?;
        log::info!(
            "Approved {} by {}",
            record.id,
            approved_by.unwrap_or("unknown")
        );

        self.record_audit(AuditEntry::for_record(AuditEvent::Approved, &record).actor(approved_by));

        Ok(record)
    }

    /// Deny a pending record. Allowed even past expiry.
    pub fn deny(&self, id: &str, denied_by: Option<&str>) -> Result<ApprovalRecord, EngineError> {
        let mut record = self.require(id)?;
        Self::ensure_status(&record, ApprovalStatus::Pending, "deny")?;

        record.status = ApprovalStatus::Denied;
        record.denied_at = Some(Utc::now());
        record.denied_by = denied_by.map(str::to_string);
        self.records.save(&record)?;
        log::info!("Denied {} by {}", record.id, denied_by.unwrap_or("unknown"));

        self.record_audit(AuditEntry::for_record(AuditEvent::Denied, &record).actor(denied_by));

        Ok(record)
    }

    /// Run an approved record's commands and store the outcome.
    ///
    /// Command failures end up in the record (`partial`/`failed`, `error`),
    /// not in the returned `Result`.
    pub fn execute(&self, id: &str) -> Result<ApprovalRecord, EngineError> {
        self.execute_as(id, None)
    }

    fn execute_as(&self, id: &str, actor: Option<&str>) -> Result<ApprovalRecord, EngineError> {
        let mut record = self.require(id)?;
        Self::ensure_status(&record, ApprovalStatus::Approved, "execute")?;

        log::info!(
            "Executing {} ({} commands)",
            record.id,
            record.commands.len()
        );
        let report = self.runner.run_all(&record.commands, &record.env);

        record.status = report.outcome.into();
        record.executed_at = Some(Utc::now());
        record.result = report.result.clone();
        record.error = report.error.clone();
        self.records.save(&record)?;
        log::info!("Approval {} finished as {}", record.id, record.status);

        self.record_audit(
            AuditEntry::for_record(AuditEvent::Executed, &record)
                .actor(actor)
                .details(json!({
                    "commandCount": record.commands.len(),
                    "hasErrors": report.has_errors(),
                    "status": record.status,
                })),
        );

        Ok(record)
    }

    /// Approve, then execute. Nothing runs if approval fails.
    pub fn approve_and_execute(
        &self,
        id: &str,
        actor: Option<&str>,
    ) -> Result<ApprovalRecord, EngineError> {
        let approved = self.approve(id, actor)?;
        self.execute_as(&approved.id, actor)
    }

    /// Approve and execute several records, isolating failures per id.
    ///
    /// Ids are processed one at a time in order. An id that can't be
    /// approved or executed lands in `errors`; the rest carry on.
    pub fn batch(
        &self,
        target: BatchTarget,
        actor: Option<&str>,
    ) -> Result<BatchOutcome, EngineError> {
        let ids = match target {
            BatchTarget::All => self
                .records
                .list(false)?
                .into_iter()
                .map(|r| r.id)
                .collect(),
            BatchTarget::Ids(ids) => ids,
        };

        let mut outcome = BatchOutcome::default();
        for id in ids {
            match self.approve_and_execute(&id, actor) {
                Ok(record) => outcome.approved.push(record),
                Err(e) => {
                    log::warn!("Batch item {} failed: {}", id, e);
                    outcome.errors.push(BatchFailure {
                        id,
                        kind: e.kind().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Batch finished: {} processed, {} failed",
            outcome.approved.len(),
            outcome.errors.len()
        );
        Ok(outcome)
    }

    /// Delete finished records older than `older_than_days`
    /// (the configured default when `None`).
    ///
    /// Pending records are never removed. Returns how many were deleted.
    pub fn clean(&self, older_than_days: Option<u32>) -> Result<usize, EngineError> {
        let days = older_than_days.unwrap_or(self.config.clean_older_than_days);
        let now = Utc::now();
        // An age beyond the calendar means nothing is old enough
        let cutoff = chrono::Duration::try_days(i64::from(days))
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut removed = Vec::new();
        for record in self.records.list_at(true, now)? {
            if record.status == ApprovalStatus::Pending || record.created_at >= cutoff {
                continue;
            }
            match self.records.delete(&record.id) {
                Ok(()) => removed.push(record.id),
                Err(e) => log::warn!("Failed to delete approval {}: {}", record.id, e),
            }
        }

        if !removed.is_empty() {
            log::info!("Cleaned {} approvals older than {} days", removed.len(), days);
            self.record_audit(AuditEntry {
                timestamp: Utc::now(),
                event: AuditEvent::Cleaned,
                id: removed.join(","),
                summary: format!("Removed {} approvals older than {} days", removed.len(), days),
                actor: None,
                channel: None,
                details: json!({
                    "count": removed.len(),
                    "ids": removed,
                    "olderThanDays": days,
                }),
            });
        }

        Ok(removed.len())
    }
}

// ============================================================================
// TESTS
// ============================================================================
