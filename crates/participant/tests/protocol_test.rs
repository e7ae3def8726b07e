//! End-to-end participant protocol tests
//!
//! These tests drive participants the way a coordinator does, through
//! handles on a `ParticipantEndpoint`, and check:
//! 1. Votes and heuristic outcomes reach the coordinator intact
//! 2. Handles are withdrawn exactly when a branch is finished
//! 3. Transient failures can be retried
//! 4. A watchdog rollback and a coordinator rollback reach the resource once
//! 5. A rollback that settles late never moves a finished branch backwards

use proven_common::{BranchQualifier, GlobalTransactionId, Xid};
use proven_participant::{
    AsyncRollback, CompletionStatus, FatalReason, HeuristicOutcome, Participant, ParticipantConfig,
    ParticipantEndpoint, ParticipantError, ParticipantState, RollbackGate, Vote,
};
use proven_xa::testing::{Call, ScriptedResource, xa};
use proven_xa::{ResourceError, ResourceManager, RollbackReason, XaCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn make_xid(resource: &str) -> Xid {
    Xid::new(
        GlobalTransactionId::new(),
        BranchQualifier::from_resource_address(resource).unwrap(),
    )
}

fn enlist(
    endpoint: &ParticipantEndpoint,
    resource: ScriptedResource,
) -> (proven_participant::ParticipantHandle, Arc<ScriptedResource>) {
    let resource = Arc::new(resource);
    let participant = Participant::new(
        make_xid("inventory"),
        resource.clone(),
        ParticipantConfig::default(),
    );
    (endpoint.enlist(participant).unwrap(), resource)
}

#[test]
fn test_read_only_vote_releases_handle() {
    let endpoint = ParticipantEndpoint::new();
    let (handle, resource) = enlist(
        &endpoint,
        ScriptedResource::new("inventory").vote(XaCode::ReadOnly),
    );
    let participant = endpoint.lifecycle().lookup(handle).unwrap();

    assert_eq!(endpoint.prepare(handle).unwrap(), Vote::ReadOnly);
    assert_eq!(participant.state(), ParticipantState::ReadOnly);
    assert!(endpoint.lifecycle().is_empty());

    // The coordinator should not commit a read-only branch; if it does, the handle is gone
    let err = endpoint.commit(handle).unwrap_err();
    assert_eq!(err.fatal_reason(), Some(FatalReason::HandleNotFound));
    assert_eq!(resource.calls(Call::Commit), 0);
}

#[test]
fn test_heuristic_mixed_on_one_phase_commit() {
    let endpoint = ParticipantEndpoint::new();
    let (handle, resource) = enlist(
        &endpoint,
        ScriptedResource::new("inventory")
            .fail(Call::CommitOnePhase, xa(XaCode::HeuristicMixed, "partial")),
    );
    let participant = endpoint.lifecycle().lookup(handle).unwrap();

    let err = endpoint.commit_one_phase(handle).unwrap_err();
    assert_eq!(err.heuristic(), Some(HeuristicOutcome::Mixed));
    assert_eq!(participant.state(), ParticipantState::HeuristicMixed);

    // Still addressable until the coordinator forgets it
    assert_eq!(participant.handle(), Some(handle));
    assert_eq!(endpoint.lifecycle().len(), 1);

    endpoint.forget(handle).unwrap();
    assert_eq!(participant.state(), ParticipantState::Forgotten);
    assert_eq!(participant.handle(), None);
    assert_eq!(resource.calls(Call::Forget), 1);
}

#[test]
fn test_transient_commit_failure_can_be_retried() {
    let endpoint = ParticipantEndpoint::new();
    let (handle, resource) = enlist(
        &endpoint,
        ScriptedResource::new("inventory").fail(
            Call::Commit,
            xa(XaCode::Rollback(RollbackReason::CommunicationFailure), "link down"),
        ),
    );
    let participant = endpoint.lifecycle().lookup(handle).unwrap();

    assert_eq!(endpoint.prepare(handle).unwrap(), Vote::Commit);

    let err = endpoint.commit(handle).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(participant.state(), ParticipantState::Prepared);
    assert_eq!(endpoint.lifecycle().len(), 1);

    endpoint.commit(handle).unwrap();
    assert_eq!(participant.state(), ParticipantState::Committed);
    assert_eq!(resource.calls(Call::Commit), 2);
    assert!(endpoint.lifecycle().is_empty());
}

#[test]
fn test_retry_code_on_commit_is_transient() {
    let endpoint = ParticipantEndpoint::new();
    let (handle, _) = enlist(
        &endpoint,
        ScriptedResource::new("inventory")
            .fail(Call::Commit, xa(XaCode::Retry, "busy"))
            .fail(Call::Commit, xa(XaCode::Retry, "still busy")),
    );

    endpoint.prepare(handle).unwrap();
    assert!(matches!(
        endpoint.commit(handle),
        Err(ParticipantError::Transient { .. })
    ));
    assert!(matches!(
        endpoint.commit(handle),
        Err(ParticipantError::Transient { .. })
    ));
    endpoint.commit(handle).unwrap();
}

#[test]
fn test_forget_and_deactivate_are_idempotent() {
    let endpoint = ParticipantEndpoint::new();
    let (handle, resource) = enlist(
        &endpoint,
        ScriptedResource::new("inventory")
            .fail(Call::Rollback, xa(XaCode::HeuristicCommit, "committed anyway")),
    );
    let participant = endpoint.lifecycle().lookup(handle).unwrap();

    let err = endpoint.rollback(handle).unwrap_err();
    assert_eq!(err.heuristic(), Some(HeuristicOutcome::Commit));

    endpoint.forget(handle).unwrap();
    endpoint.forget(handle).unwrap();
    participant.forget().unwrap();

    assert!(!endpoint.lifecycle().deactivate(handle));
    assert!(!participant.deactivate());

    assert_eq!(participant.state(), ParticipantState::Forgotten);
    assert_eq!(resource.calls(Call::Forget), 1);
}

#[test]
fn test_resource_untouched_after_forget() {
    let endpoint = ParticipantEndpoint::new();
    let (handle, resource) = enlist(
        &endpoint,
        ScriptedResource::new("inventory")
            .fail(Call::Commit, xa(XaCode::HeuristicHazard, "unknown")),
    );
    let participant = endpoint.lifecycle().lookup(handle).unwrap();

    endpoint.prepare(handle).unwrap();
    assert!(endpoint.commit(handle).is_err());
    endpoint.forget(handle).unwrap();
    let calls = resource.total_calls();

    assert!(participant.commit().is_err());
    assert!(participant.rollback().is_err());
    assert!(participant.prepare().is_err());
    assert_eq!(resource.total_calls(), calls);
}

#[test]
fn test_unexpected_failure_is_fatal_and_releases_handle() {
    let endpoint = ParticipantEndpoint::new();
    let (handle, _) = enlist(
        &endpoint,
        ScriptedResource::new("inventory").fail(
            Call::CommitOnePhase,
            ResourceError::Unexpected("driver crashed".to_string()),
        ),
    );

    let err = endpoint.commit_one_phase(handle).unwrap_err();
    assert_eq!(
        err,
        ParticipantError::Fatal {
            reason: FatalReason::Unexpected,
            status: CompletionStatus::Maybe,
            code: None,
            detail: "driver crashed".to_string(),
        }
    );
    assert!(endpoint.lifecycle().is_empty());
}

#[test]
fn test_strict_ordering_rejects_commit_without_prepare() {
    let endpoint = ParticipantEndpoint::new();
    let (handle, resource) = enlist(&endpoint, ScriptedResource::new("inventory"));

    let err = endpoint.commit(handle).unwrap_err();
    assert_eq!(err.fatal_reason(), Some(FatalReason::ProtocolViolation));
    assert_eq!(resource.calls(Call::Commit), 0);

    // Rejected locally; the branch is still usable
    assert_eq!(endpoint.prepare(handle).unwrap(), Vote::Commit);
    endpoint.commit(handle).unwrap();
}

#[test]
fn test_lenient_ordering_lets_resource_decide() {
    let endpoint = ParticipantEndpoint::new();
    let resource = Arc::new(ScriptedResource::new("inventory"));
    let participant = Participant::new(
        make_xid("inventory"),
        resource.clone(),
        ParticipantConfig::new().with_strict_ordering(false),
    );
    let handle = endpoint.enlist(participant).unwrap();

    endpoint.commit(handle).unwrap();
    assert_eq!(resource.calls(Call::Commit), 1);
    assert!(endpoint.lifecycle().is_empty());
}

#[test]
fn test_watchdog_and_coordinator_rollback_once() {
    let gate = Arc::new(RollbackGate::new());
    let resource = Arc::new(
        ScriptedResource::new("inventory")
            .with_rollback_delay(Duration::from_millis(50))
            .fail(
                Call::Rollback,
                xa(XaCode::Rollback(RollbackReason::Timeout), "timed out"),
            ),
    );
    let participant = Arc::new(
        Participant::new(
            make_xid("inventory"),
            resource.clone(),
            ParticipantConfig::default(),
        )
        .with_async_rollback(&gate),
    );
    let barrier = Arc::new(Barrier::new(2));

    let callers: Vec<_> = (0..2)
        .map(|_| {
            let participant = participant.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                participant.rollback()
            })
        })
        .collect();

    let results: Vec<_> = callers.into_iter().map(|c| c.join().unwrap()).collect();

    assert_eq!(resource.calls(Call::Rollback), 1);
    assert_eq!(participant.state(), ParticipantState::RolledBack);

    assert_eq!(results[0], results[1]);
    assert!(matches!(
        results[0],
        Err(ParticipantError::TransactionRolledBack {
            status: CompletionStatus::Maybe,
            ..
        })
    ));
}

#[test]
fn test_watchdog_rollback_shares_outcome_with_coordinator() {
    let gate = Arc::new(RollbackGate::new());
    let resource = Arc::new(
        ScriptedResource::new("inventory").with_rollback_delay(Duration::from_millis(50)),
    );
    let participant = Arc::new(
        Participant::new(
            make_xid("inventory"),
            resource.clone(),
            ParticipantConfig::default(),
        )
        .with_async_rollback(&gate),
    );
    let barrier = Arc::new(Barrier::new(2));

    let watchdog = {
        let gate = gate.clone();
        let resource = resource.clone();
        let xid = participant.xid().clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            gate.rollback(&xid, resource.as_ref())
        })
    };

    barrier.wait();
    let coordinator = participant.rollback();
    let watchdog = watchdog.join().unwrap();

    assert!(coordinator.is_ok());
    assert!(watchdog.is_ok());
    assert_eq!(resource.calls(Call::Rollback), 1);
    assert_eq!(gate.outcome(participant.xid()), Some(Ok(())));
}

/// Holds the first rollback until released; later rollbacks go straight to the resource
struct HoldFirstRollback {
    calls: AtomicUsize,
    entered: Barrier,
    release: Barrier,
}

impl AsyncRollback for HoldFirstRollback {
    fn rollback(&self, xid: &Xid, resource: &dyn ResourceManager) -> Result<(), ResourceError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.entered.wait();
            self.release.wait();
            return Ok(());
        }
        resource.rollback(xid)
    }
}

#[test]
fn test_late_rollback_cannot_revive_forgotten_branch() {
    let collaborator = Arc::new(HoldFirstRollback {
        calls: AtomicUsize::new(0),
        entered: Barrier::new(2),
        release: Barrier::new(2),
    });
    let resource = Arc::new(ScriptedResource::new("inventory"));
    let participant = Arc::new(
        Participant::new(
            make_xid("inventory"),
            resource.clone(),
            ParticipantConfig::default(),
        )
        .with_async_rollback(&collaborator),
    );

    let held = {
        let participant = participant.clone();
        thread::spawn(move || participant.rollback())
    };
    collaborator.entered.wait();

    // Both rollbacks were admitted while Active; this one finishes first
    participant.rollback().unwrap();
    participant.forget().unwrap();
    assert_eq!(participant.state(), ParticipantState::Forgotten);

    collaborator.release.wait();
    assert!(held.join().unwrap().is_ok());

    assert_eq!(participant.state(), ParticipantState::Forgotten);
    assert_eq!(resource.calls(Call::Rollback), 1);
    assert_eq!(resource.calls(Call::Forget), 1);
}

#[test]
fn test_finished_rollbacks_do_not_accumulate_in_gate() {
    let gate = Arc::new(RollbackGate::new());
    let endpoint = ParticipantEndpoint::new();
    let mut branches = Vec::new();

    for _ in 0..100 {
        let resource = Arc::new(ScriptedResource::new("inventory"));
        let participant = Participant::new(
            make_xid("inventory"),
            resource.clone(),
            ParticipantConfig::default(),
        )
        .with_async_rollback(&gate);
        let xid = participant.xid().clone();
        let handle = endpoint.enlist(participant).unwrap();

        endpoint.rollback(handle).unwrap();
        endpoint.forget(handle).unwrap();
        branches.push((xid, resource));
    }

    assert!(gate.is_empty());
    assert!(endpoint.lifecycle().is_empty());

    // A watchdog firing after the coordinator finished is answered without a second rollback
    let (xid, resource) = &branches[99];
    gate.rollback(xid, resource.as_ref()).unwrap();
    assert_eq!(resource.calls(Call::Rollback), 1);
    assert!(gate.is_empty());
}
