//! Participant state machine

use crate::error::ParticipantError;
use crate::outcome::{HeuristicOutcome, Operation, StandardOutcome, Vote};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of one transaction branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantState {
    /// Enlisted, work in progress
    Active,

    /// Voted to commit; waiting for the coordinator's decision
    Prepared,

    /// Voted read-only; nothing left to do
    ReadOnly,

    Committed,

    RolledBack,

    /// The resource resolved the branch on its own; kept until forgotten
    HeuristicCommit,
    HeuristicRollback,
    HeuristicMixed,
    HeuristicHazard,

    /// Resource manager was told to discard the branch
    Forgotten,
}

impl ParticipantState {
    /// Still waiting on the coordinator
    pub fn is_active(&self) -> bool {
        matches!(self, ParticipantState::Active | ParticipantState::Prepared)
    }

    /// Finished, but not yet forgotten
    pub fn is_completed(&self) -> bool {
        !self.is_active() && *self != ParticipantState::Forgotten
    }

    pub fn is_heuristic(&self) -> bool {
        matches!(
            self,
            ParticipantState::HeuristicCommit
                | ParticipantState::HeuristicRollback
                | ParticipantState::HeuristicMixed
                | ParticipantState::HeuristicHazard
        )
    }

    /// Whether reaching this state gives up the lifecycle handle
    ///
    /// Heuristic states keep their handle: the coordinator still has to
    /// address the branch to forget it.
    pub fn releases_handle(&self) -> bool {
        !self.is_active() && !self.is_heuristic()
    }

    /// Whether `operation` may be issued from this state
    ///
    /// `strict_ordering` decides commit on a branch that was never prepared:
    /// rejected here, or left to the resource manager to refuse.
    pub fn admits(&self, operation: Operation, strict_ordering: bool) -> bool {
        match (operation, self) {
            (Operation::Forget, state) => !state.is_active(),
            (Operation::Prepare | Operation::CommitOnePhase, ParticipantState::Active) => true,
            (Operation::Commit, ParticipantState::Prepared) => true,
            (Operation::Commit, ParticipantState::Active) => !strict_ordering,
            (Operation::Rollback, state) => state.is_active(),
            _ => false,
        }
    }

    /// The state after `operation` produced `outcome`
    ///
    /// Transient failures leave the state unchanged so the coordinator can
    /// retry. Anything fatal lands in `RolledBack` rather than an
    /// indeterminate state.
    pub fn after(self, operation: Operation, outcome: &StandardOutcome) -> ParticipantState {
        match outcome {
            StandardOutcome::Vote(Vote::Commit) => ParticipantState::Prepared,
            StandardOutcome::Vote(Vote::ReadOnly) => ParticipantState::ReadOnly,
            StandardOutcome::Vote(Vote::Rollback) => ParticipantState::RolledBack,
            StandardOutcome::Ack => match operation {
                Operation::CommitOnePhase | Operation::Commit => ParticipantState::Committed,
                Operation::Forget => ParticipantState::Forgotten,
                Operation::Prepare | Operation::Rollback => ParticipantState::RolledBack,
            },
            StandardOutcome::Failed(ParticipantError::Heuristic { outcome, .. }) => (*outcome).into(),
            StandardOutcome::Failed(ParticipantError::Transient { .. }) => self,
            StandardOutcome::Failed(
                ParticipantError::TransactionRolledBack { .. } | ParticipantError::Fatal { .. },
            ) => ParticipantState::RolledBack,
        }
    }
}

impl From<HeuristicOutcome> for ParticipantState {
    fn from(outcome: HeuristicOutcome) -> Self {
        match outcome {
            HeuristicOutcome::Commit => ParticipantState::HeuristicCommit,
            HeuristicOutcome::Rollback => ParticipantState::HeuristicRollback,
            HeuristicOutcome::Mixed => ParticipantState::HeuristicMixed,
            HeuristicOutcome::Hazard => ParticipantState::HeuristicHazard,
        }
    }
}

impl fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
