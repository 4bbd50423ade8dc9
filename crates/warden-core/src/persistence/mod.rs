//! Persistence layer for approval records and the audit log.
//!
//! # Overview
//!
//! This module handles all file I/O for Warden's persistent state:
//!
//! - **Records** - One JSON file per approval, keyed by id
//! - **Audit log** - Append-only JSON lines, one per lifecycle event
//!
//! # File Locations
//!
//! All data lives under the data directory:
//!
//! ```text
//! ~/.config/warden/
//! ├── config.json
//! ├── audit.jsonl
//! └── approvals/
//!     ├── <ID>.json
//!     └── ...
//! ```
//!
//! # Design Principles
//!
//! ## Atomic Writes
//!
//! Record saves write to a temp file and rename it into place (atomic on
//! Unix), so readers only ever see a complete document.
//!
//! ## No Locking
//!
//! The store assumes a single writer per record during a transition. With
//! concurrent writers the last completed write wins; nothing is interleaved.

pub mod audit_log;
pub mod records;
pub mod types;

pub use audit_log::AuditLog;
pub use records::RecordStore;
pub use types::*;
