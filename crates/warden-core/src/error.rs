//! Error types shared across the crate.

use thiserror::Error;

use crate::persistence::types::ApprovalStatus;

/// Failure reading or writing persisted state.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of a lifecycle operation.
///
/// Command failures are not represented here; they are recorded on the
/// approval itself as `partial` or `failed`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Approval not found: {0}")]
    NotFound(String),

    #[error("Approval {id} is {status}, cannot {action}")]
    InvalidTransition {
        id: String,
        status: ApprovalStatus,
        action: &'static str,
    },

    #[error("Approval {0} has expired")]
    Expired(String),

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Short machine-readable kind, used by callers that branch on failures.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::Expired(_) => "expired",
            EngineError::InvalidProposal(_) => "invalid_proposal",
            EngineError::Store(_) => "store",
        }
    }
}
