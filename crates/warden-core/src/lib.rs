//! # warden-core
//!
//! Human-gated execution of shell commands proposed by an automated agent.
//!
//! This crate is framework-agnostic and can be used by:
//! - The `warden` CLI
//! - Chat integrations (via the formatting helpers)
//! - Any RPC layer that needs to propose or approve actions
//!
//! ## Key Concepts
//!
//! - **Approval record**: A proposed action with its commands, status and
//!   execution result, stored as one JSON file
//! - **Lifecycle**: `pending` → `approved` → `executed`/`partial`/`failed`,
//!   or `pending` → `denied`/`expired`
//! - **Audit log**: Append-only JSON lines describing every transition

pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod id;
pub mod paths;
pub mod persistence;
pub mod runner;
pub mod shell;

// Re-export commonly used types
pub use config::{load_config, save_config, WardenConfig};
pub use engine::{
    ApprovalEngine, ApprovalStats, BatchFailure, BatchOutcome, BatchTarget, ProposeOptions,
};
pub use error::{EngineError, StoreError};
pub use persistence::{
    ApprovalRecord, ApprovalStatus, AuditEntry, AuditEvent, AuditLog, ExecutionOutcome,
    RecordStore,
};
pub use runner::{CommandResult, CommandRunner, RunReport};
