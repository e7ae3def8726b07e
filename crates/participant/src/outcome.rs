//! Standardized outcome vocabulary

use crate::error::{ParticipantError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Participant operations driven by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Prepare,
    CommitOnePhase,
    Commit,
    Rollback,
    Forget,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Prepare,
        Operation::CommitOnePhase,
        Operation::Commit,
        Operation::Rollback,
        Operation::Forget,
    ];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Prepare => "prepare",
            Operation::CommitOnePhase => "commit_one_phase",
            Operation::Commit => "commit",
            Operation::Rollback => "rollback",
            Operation::Forget => "forget",
        };
        write!(f, "{}", name)
    }
}

/// A participant's answer to prepare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    Commit,
    ReadOnly,
    Rollback,
}

/// How a resource unilaterally resolved a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeuristicOutcome {
    Commit,
    Rollback,
    Mixed,
    Hazard,
}

impl fmt::Display for HeuristicOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeuristicOutcome::Commit => "commit",
            HeuristicOutcome::Rollback => "rollback",
            HeuristicOutcome::Mixed => "mixed",
            HeuristicOutcome::Hazard => "hazard",
        };
        write!(f, "{}", name)
    }
}

/// Result of translating one resource manager reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandardOutcome {
    /// Prepare answered with a vote
    Vote(Vote),
    /// Operation completed as requested
    Ack,
    /// Operation failed
    Failed(ParticipantError),
}

impl StandardOutcome {
    /// Split into what the coordinator sees: a vote (prepare), nothing
    /// (acknowledged), or an error
    pub fn into_result(self) -> Result<Option<Vote>> {
        match self {
            StandardOutcome::Vote(vote) => Ok(Some(vote)),
            StandardOutcome::Ack => Ok(None),
            StandardOutcome::Failed(error) => Err(error),
        }
    }
}
