//! Persistence data types.
//!
//! # Data Model Overview
//!
//! Warden persists two kinds of data:
//!
//! ```text
//! ~/.config/warden/
//! ├── audit.jsonl        # One AuditEntry per line, append-only
//! └── approvals/
//!     └── {id}.json      # One ApprovalRecord per file
//! ```
//!
//! The record file *is* the record. There is no separate index; listing
//! reads every file in the approvals directory.
//!
//! # State machine
//!
//! ```text
//! pending ──┬─> approved ──┬─> executed
//!           │              ├─> partial
//!           ├─> denied     ├─> failed
//!           └─> expired    └─> expired
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Approval Types
// ============================================================================

/// Lifecycle status of an approval record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Executed,
    Partial,
    Failed,
    Expired,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 7] = [
        ApprovalStatus::Pending,
        ApprovalStatus::Approved,
        ApprovalStatus::Denied,
        ApprovalStatus::Executed,
        ApprovalStatus::Partial,
        ApprovalStatus::Failed,
        ApprovalStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
            ApprovalStatus::Executed => "executed",
            ApprovalStatus::Partial => "partial",
            ApprovalStatus::Failed => "failed",
            ApprovalStatus::Expired => "expired",
        }
    }

}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// How a run of an approved command list ended.
///
/// Kept separate from a success flag: consumers branch on all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOutcome {
    /// Every command succeeded.
    Executed,
    /// Some commands succeeded and some failed.
    Partial,
    /// Every command failed.
    Failed,
}

impl From<ExecutionOutcome> for ApprovalStatus {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Executed => ApprovalStatus::Executed,
            ExecutionOutcome::Partial => ApprovalStatus::Partial,
            ExecutionOutcome::Failed => ApprovalStatus::Failed,
        }
    }
}

/// One proposed action and its full lifecycle state.
///
/// Saved to `approvals/{id}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    /// Short identifier, upper case.
    pub id: String,

    pub created_at: DateTime<Utc>,

    /// `created_at + ttl`.
    pub expires_at: DateTime<Utc>,

    /// One-line description shown to the approver.
    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Shell commands, run in order.
    pub commands: Vec<String>,

    /// Extra environment merged in at execution time.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_by: Option<String>,

    pub status: ApprovalStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denied_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denied_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,

    /// Joined output blocks of the commands that succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Joined error blocks of the commands that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApprovalRecord {
    /// A fresh pending record.
    ///
    /// An expiry past the representable range is clamped to the latest
    /// representable instant.
    pub fn new(
        id: impl Into<String>,
        summary: impl Into<String>,
        commands: Vec<String>,
        created_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id: id.into(),
            created_at,
            expires_at: created_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            summary: summary.into(),
            details: None,
            commands,
            env: BTreeMap::new(),
            channel: None,
            chat_id: None,
            proposed_by: None,
            status: ApprovalStatus::Pending,
            approved_at: None,
            approved_by: None,
            denied_at: None,
            denied_by: None,
            executed_at: None,
            result: None,
            error: None,
        }
    }

    /// Whether the approval window has closed at `now`.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Pending and past expiry: due for the lazy `expired` transition.
    pub fn should_expire(&self, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Pending && self.is_past_expiry(now)
    }
}

// ============================================================================
// Audit Types
// ============================================================================

/// Kind of lifecycle event recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditEvent {
    Proposed,
    Approved,
    Denied,
    Executed,
    Expired,
    Cleaned,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::Proposed => "proposed",
            AuditEvent::Approved => "approved",
            AuditEvent::Denied => "denied",
            AuditEvent::Executed => "executed",
            AuditEvent::Expired => "expired",
            AuditEvent::Cleaned => "cleaned",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single line of `audit.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,

    pub event: AuditEvent,

    /// Subject record id; comma-joined ids for `cleaned`.
    pub id: String,

    /// Summary snapshot at the time of the event.
    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Event-specific payload.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl AuditEntry {
    /// An entry about `record`, stamped now.
    pub fn for_record(event: AuditEvent, record: &ApprovalRecord) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            id: record.id.clone(),
            summary: record.summary.clone(),
            actor: None,
            channel: record.channel.clone(),
            details: serde_json::Value::Null,
        }
    }

    pub fn actor(mut self, actor: Option<&str>) -> Self {
        self.actor = actor.map(str::to_string);
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================
