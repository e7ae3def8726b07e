//! Failures a participant reports to the coordinator
//!
//! No resource-manager error crosses this boundary in native form: every
//! failure is one of the four variants below.

use crate::outcome::HeuristicOutcome;
use proven_xa::XaCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for participant operations
pub type Result<T> = std::result::Result<T, ParticipantError>;

/// Whether the failed operation took effect on the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    Yes,
    No,
    Maybe,
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionStatus::Yes => write!(f, "completed"),
            CompletionStatus::No => write!(f, "not completed"),
            CompletionStatus::Maybe => write!(f, "completion unknown"),
        }
    }
}

/// Why an operation failed fatally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatalReason {
    /// Operation not permitted in the branch's current state
    ProtocolViolation,
    /// Commit issued for a branch the resource manager never prepared
    NotPrepared,
    /// Resource manager failed in a way that cannot be retried
    ResourceManagerFailure,
    /// Resource manager returned a code with no defined meaning here
    UnclassifiedCode,
    /// Failure outside the XA vocabulary
    Unexpected,
    /// No participant is registered under the handle
    HandleNotFound,
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FatalReason::ProtocolViolation => "protocol violation",
            FatalReason::NotPrepared => "not prepared",
            FatalReason::ResourceManagerFailure => "resource manager failure",
            FatalReason::UnclassifiedCode => "unclassified code",
            FatalReason::Unexpected => "unexpected failure",
            FatalReason::HandleNotFound => "handle not found",
        };
        write!(f, "{}", name)
    }
}

/// Participant errors visible to the coordinator
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantError {
    /// The resource resolved the branch on its own
    #[error("Heuristic {outcome}: {detail}")]
    Heuristic {
        outcome: HeuristicOutcome,
        detail: String,
    },

    /// The branch was rolled back instead of performing the request
    #[error("Transaction rolled back ({status}): {detail}")]
    TransactionRolledBack {
        status: CompletionStatus,
        detail: String,
    },

    /// The operation had no effect and may be retried
    #[error("Transient failure: {detail}")]
    Transient { detail: String },

    /// The operation failed and must be resolved above the participant
    #[error("Fatal failure, {reason} ({status}): {detail}")]
    Fatal {
        reason: FatalReason,
        status: CompletionStatus,
        code: Option<XaCode>,
        detail: String,
    },
}

impl ParticipantError {
    pub fn fatal(reason: FatalReason, status: CompletionStatus, detail: impl Into<String>) -> Self {
        ParticipantError::Fatal {
            reason,
            status,
            code: None,
            detail: detail.into(),
        }
    }

    /// Only transient failures may be retried by the coordinator
    pub fn is_retryable(&self) -> bool {
        matches!(self, ParticipantError::Transient { .. })
    }

    pub fn heuristic(&self) -> Option<HeuristicOutcome> {
        match self {
            ParticipantError::Heuristic { outcome, .. } => Some(*outcome),
            _ => None,
        }
    }

    pub fn fatal_reason(&self) -> Option<FatalReason> {
        match self {
            ParticipantError::Fatal { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}
