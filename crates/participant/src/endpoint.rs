//! Coordinator-facing entry point
//!
//! The coordinator never holds participants directly; it enlists a branch,
//! receives a handle, and drives the protocol through that handle.

use crate::error::{CompletionStatus, FatalReason, ParticipantError, Result};
use crate::lifecycle::{Lifecycle, LifecycleError, ParticipantHandle};
use crate::outcome::Vote;
use crate::participant::Participant;
use std::sync::Arc;

/// Handle-addressed access to the participants of one process
pub struct ParticipantEndpoint {
    lifecycle: Arc<Lifecycle>,
}

impl ParticipantEndpoint {
    pub fn new() -> Self {
        Self::with_lifecycle(Lifecycle::new())
    }

    /// Share an existing lifecycle table
    pub fn with_lifecycle(lifecycle: Arc<Lifecycle>) -> Self {
        Self { lifecycle }
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Register a participant and hand back the handle the coordinator will use
    pub fn enlist(
        &self,
        participant: Participant,
    ) -> std::result::Result<ParticipantHandle, LifecycleError> {
        self.lifecycle.activate(Arc::new(participant))
    }

    pub fn prepare(&self, handle: ParticipantHandle) -> Result<Vote> {
        self.resolve(handle)?.prepare()
    }

    pub fn commit_one_phase(&self, handle: ParticipantHandle) -> Result<()> {
        self.resolve(handle)?.commit_one_phase()
    }

    pub fn commit(&self, handle: ParticipantHandle) -> Result<()> {
        self.resolve(handle)?.commit()
    }

    pub fn rollback(&self, handle: ParticipantHandle) -> Result<()> {
        self.resolve(handle)?.rollback()
    }

    /// Forget is idempotent: a handle that is already gone was forgotten or
    /// never needed forgetting.
    pub fn forget(&self, handle: ParticipantHandle) -> Result<()> {
        match self.lifecycle.lookup(handle) {
            Ok(participant) => participant.forget(),
            Err(_) => {
                tracing::debug!("Forget for released {}", handle);
                Ok(())
            }
        }
    }

    fn resolve(&self, handle: ParticipantHandle) -> Result<Arc<Participant>> {
        self.lifecycle.lookup(handle).map_err(|e| {
            tracing::warn!("Operation on unknown handle: {}", e);
            ParticipantError::fatal(
                FatalReason::HandleNotFound,
                CompletionStatus::No,
                e.to_string(),
            )
        })
    }
}

impl Default for ParticipantEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParticipantConfig;
    use crate::state::ParticipantState;
    use proven_common::{BranchQualifier, GlobalTransactionId, Xid};
    use proven_xa::XaCode;
    use proven_xa::testing::{Call, ScriptedResource, xa};

    fn make_participant(resource: Arc<ScriptedResource>) -> Participant {
        let xid = Xid::new(
            GlobalTransactionId::new(),
            BranchQualifier::from_resource_address("ledger").unwrap(),
        );
        Participant::new(xid, resource, ParticipantConfig::default())
    }

    #[test]
    fn test_two_phase_commit_through_handle() {
        let endpoint = ParticipantEndpoint::new();
        let resource = Arc::new(ScriptedResource::new("ledger"));
        let handle = endpoint.enlist(make_participant(resource.clone())).unwrap();

        assert_eq!(endpoint.prepare(handle).unwrap(), Vote::Commit);
        endpoint.commit(handle).unwrap();

        assert!(endpoint.lifecycle().is_empty());
        assert_eq!(resource.total_calls(), 2);
    }

    #[test]
    fn test_unknown_handle_is_fatal() {
        let endpoint = ParticipantEndpoint::new();
        let resource = Arc::new(ScriptedResource::new("ledger"));
        let handle = endpoint.enlist(make_participant(resource)).unwrap();
        endpoint.commit_one_phase(handle).unwrap();

        let err = endpoint.rollback(handle).unwrap_err();
        assert_eq!(err.fatal_reason(), Some(FatalReason::HandleNotFound));
        assert!(matches!(
            err,
            ParticipantError::Fatal {
                status: CompletionStatus::No,
                ..
            }
        ));
    }

    #[test]
    fn test_forget_released_handle_is_ok() {
        let endpoint = ParticipantEndpoint::new();
        let resource = Arc::new(ScriptedResource::new("ledger"));
        let handle = endpoint.enlist(make_participant(resource.clone())).unwrap();
        endpoint.rollback(handle).unwrap();

        endpoint.forget(handle).unwrap();
        endpoint.forget(handle).unwrap();
        assert_eq!(resource.calls(Call::Forget), 0);
    }

    #[test]
    fn test_heuristic_branch_stays_addressable_until_forgotten() {
        let endpoint = ParticipantEndpoint::new();
        let resource = Arc::new(
            ScriptedResource::new("ledger").fail(Call::Commit, xa(XaCode::HeuristicMixed, "split")),
        );
        let handle = endpoint.enlist(make_participant(resource.clone())).unwrap();

        endpoint.prepare(handle).unwrap();
        let err = endpoint.commit(handle).unwrap_err();
        assert!(err.heuristic().is_some());

        let participant = endpoint.lifecycle().lookup(handle).unwrap();
        assert_eq!(participant.state(), ParticipantState::HeuristicMixed);

        endpoint.forget(handle).unwrap();
        assert_eq!(participant.state(), ParticipantState::Forgotten);
        assert!(endpoint.lifecycle().is_empty());
        assert_eq!(resource.calls(Call::Forget), 1);
    }
}
