//! The participant adapter
//!
//! One `Participant` exists per enlisted branch. It forwards the five
//! coordinator operations to the branch's resource manager, translates the
//! reply, advances the branch state and, once the branch is finished, gives
//! up its lifecycle handle.

use crate::config::ParticipantConfig;
use crate::error::{CompletionStatus, FatalReason, ParticipantError, Result};
use crate::lifecycle::{Lifecycle, ParticipantHandle};
use crate::outcome::{Operation, StandardOutcome, Vote};
use crate::rollback::AsyncRollback;
use crate::state::ParticipantState;
use crate::translate::translate;
use parking_lot::Mutex;
use proven_common::{Otid, Xid};
use proven_xa::{ResourceError, ResourceManager, XaCode};
use std::fmt;
use std::sync::{Arc, Weak};

/// Where the participant stands with the lifecycle table
enum Registration {
    Unregistered,
    Active {
        handle: ParticipantHandle,
        lifecycle: Weak<Lifecycle>,
    },
    Released,
}

/// Two-phase commit participant for one XA branch
pub struct Participant {
    xid: Xid,

    /// This branch's resource manager
    resource: Arc<dyn ResourceManager>,

    /// Present when a watchdog may roll the branch back concurrently
    cooperating_rollback: Option<Weak<dyn AsyncRollback>>,

    config: ParticipantConfig,

    state: Mutex<ParticipantState>,

    registration: Mutex<Registration>,
}

impl Participant {
    /// Create a participant for a freshly enlisted branch
    pub fn new(xid: Xid, resource: Arc<dyn ResourceManager>, config: ParticipantConfig) -> Self {
        Self {
            xid,
            resource,
            cooperating_rollback: None,
            config,
            state: Mutex::new(ParticipantState::Active),
            registration: Mutex::new(Registration::Unregistered),
        }
    }

    /// Route rollbacks through `coordinator`
    ///
    /// Only a weak reference is kept; once the coordinator is dropped the
    /// participant rolls back directly.
    pub fn with_async_rollback<R>(mut self, coordinator: &Arc<R>) -> Self
    where
        R: AsyncRollback + 'static,
    {
        let weak: Weak<R> = Arc::downgrade(coordinator);
        self.cooperating_rollback = Some(weak);
        self
    }

    pub fn xid(&self) -> &Xid {
        &self.xid
    }

    pub fn state(&self) -> ParticipantState {
        *self.state.lock()
    }

    /// Handle issued by the lifecycle table, while registered
    pub fn handle(&self) -> Option<ParticipantHandle> {
        match &*self.registration.lock() {
            Registration::Active { handle, .. } => Some(*handle),
            _ => None,
        }
    }

    /// The CosTransactions global id of this branch
    pub fn global_tid(&self) -> Otid {
        self.xid.global_tid()
    }

    // === PROTOCOL OPERATIONS ===

    /// Phase one: ask the resource manager for its vote
    pub fn prepare(&self) -> Result<Vote> {
        self.admit(Operation::Prepare)?;

        let reply = self.resource.prepare(&self.xid);
        match self.settle(Operation::Prepare, reply.as_ref().copied())? {
            Some(vote) => Ok(vote),
            None => Err(ParticipantError::fatal(
                FatalReason::UnclassifiedCode,
                CompletionStatus::Maybe,
                "prepare completed without a vote",
            )),
        }
    }

    /// Commit without a prepare phase (single-participant optimization)
    pub fn commit_one_phase(&self) -> Result<()> {
        self.admit(Operation::CommitOnePhase)?;

        let reply = self.resource.commit_one_phase(&self.xid);
        self.settle(Operation::CommitOnePhase, ok_code(&reply))
            .map(|_| ())
    }

    /// Phase two: commit a prepared branch
    pub fn commit(&self) -> Result<()> {
        self.admit(Operation::Commit)?;

        let reply = self.resource.commit(&self.xid);
        self.settle(Operation::Commit, ok_code(&reply)).map(|_| ())
    }

    /// Roll the branch back
    ///
    /// With a cooperating rollback coordinator the request joins any rollback
    /// a watchdog already started, so the resource sees one rollback.
    pub fn rollback(&self) -> Result<()> {
        let cooperating = self.cooperating_rollback.as_ref().and_then(Weak::upgrade);
        if let Err(rejected) = self.admit(Operation::Rollback) {
            // A racing caller already finished the rollback; report its result
            let replayed = cooperating.and_then(|coordinator| coordinator.outcome(&self.xid));
            return match replayed {
                Some(reply) => translate(Operation::Rollback, ok_code(&reply))
                    .into_result()
                    .map(|_| ()),
                None => Err(rejected),
            };
        }

        let Some(coordinator) = cooperating else {
            let reply = self.resource.rollback(&self.xid);
            return self.settle(Operation::Rollback, ok_code(&reply)).map(|_| ());
        };

        let reply = coordinator.rollback(&self.xid, self.resource.as_ref());
        let result = self.settle(Operation::Rollback, ok_code(&reply)).map(|_| ());
        if self.state().releases_handle() {
            coordinator.release(&self.xid);
        }
        result
    }

    /// Let the resource manager discard the branch
    ///
    /// Best effort: failures are logged and never reported. The resource is
    /// asked at most once, and never again afterwards.
    pub fn forget(&self) -> Result<()> {
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            if previous.is_completed() {
                *state = ParticipantState::Forgotten;
            }
            previous
        };

        if previous == ParticipantState::Forgotten {
            tracing::debug!("{} already forgotten", self);
            return Ok(());
        }
        if previous.is_active() {
            tracing::warn!("Ignoring forget for unfinished {} in state {}", self, previous);
            return Ok(());
        }

        let reply = self.resource.forget(&self.xid);
        if let Err(e) = &reply {
            tracing::warn!("Forget failed for {}: {}", self, e);
        }
        if let Some(coordinator) = self.cooperating_rollback.as_ref().and_then(Weak::upgrade) {
            coordinator.release(&self.xid);
        }
        self.deactivate();

        translate(Operation::Forget, ok_code(&reply))
            .into_result()
            .map(|_| ())
    }

    // === LIFECYCLE ===

    /// Give up the lifecycle handle
    ///
    /// Returns true only for the call that released it.
    pub fn deactivate(&self) -> bool {
        let previous = std::mem::replace(&mut *self.registration.lock(), Registration::Released);
        match previous {
            Registration::Active { handle, lifecycle } => match lifecycle.upgrade() {
                Some(lifecycle) => lifecycle.release(handle).is_some(),
                None => true,
            },
            Registration::Unregistered | Registration::Released => false,
        }
    }

    /// Record the handle issued at activation; refused if ever activated before
    pub(crate) fn attach(&self, handle: ParticipantHandle, lifecycle: Weak<Lifecycle>) -> bool {
        let mut registration = self.registration.lock();
        match *registration {
            Registration::Unregistered => {
                *registration = Registration::Active { handle, lifecycle };
                true
            }
            _ => false,
        }
    }

    /// The lifecycle table withdrew `handle`
    pub(crate) fn detach(&self, handle: ParticipantHandle) {
        let mut registration = self.registration.lock();
        if matches!(&*registration, Registration::Active { handle: issued, .. } if *issued == handle)
        {
            *registration = Registration::Released;
        }
    }

    // === INTERNALS ===

    /// Reject operations the current state does not permit
    fn admit(&self, operation: Operation) -> Result<()> {
        let state = self.state();
        if state.admits(operation, self.config.strict_ordering) {
            return Ok(());
        }
        tracing::warn!("Rejecting {} for {} in state {}", operation, self, state);
        Err(ParticipantError::fatal(
            FatalReason::ProtocolViolation,
            CompletionStatus::No,
            format!("{} not permitted in state {}", operation, state),
        ))
    }

    /// Translate the reply, advance the state and release the handle if finished
    fn settle(
        &self,
        operation: Operation,
        reply: std::result::Result<XaCode, &ResourceError>,
    ) -> Result<Option<Vote>> {
        if let Err(e) = reply {
            log_failure(self, operation, e);
        }
        let outcome = translate(operation, reply);

        let transition = {
            let mut state = self.state.lock();
            let previous = *state;
            // A racing call finished the branch while this one was in flight
            if previous.admits(operation, self.config.strict_ordering) {
                let next = previous.after(operation, &outcome);
                *state = next;
                Some((previous, next))
            } else {
                None
            }
        };

        match transition {
            Some((previous, next)) => {
                if next != previous {
                    tracing::debug!("{} {} -> {} after {}", self, previous, next, operation);
                }
                if next.releases_handle() {
                    self.deactivate();
                }
            }
            None => tracing::debug!("{} already settled, {} leaves state unchanged", self, operation),
        }

        outcome_log(self, operation, &outcome);
        outcome.into_result()
    }
}

/// Successful non-prepare calls reach the translator as `XaCode::Ok`
fn ok_code(reply: &std::result::Result<(), ResourceError>) -> std::result::Result<XaCode, &ResourceError> {
    reply.as_ref().map(|_| XaCode::Ok)
}

fn log_failure(participant: &Participant, operation: Operation, error: &ResourceError) {
    match error.code() {
        Some(XaCode::Unknown(_)) | None => {
            tracing::warn!("Unexpected failure in {} for {}: {}", operation, participant, error)
        }
        Some(_) => tracing::debug!("XA error in {} for {}: {}", operation, participant, error),
    }
}

fn outcome_log(participant: &Participant, operation: Operation, outcome: &StandardOutcome) {
    if let StandardOutcome::Failed(error @ ParticipantError::Heuristic { .. }) = outcome {
        tracing::warn!("{} for {} ended heuristically: {}", operation, participant, error);
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "participant[resource={} xid={}]", self.resource.name(), self.xid)
    }
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("xid", &self.xid)
            .field("resource", &self.resource.name())
            .field("state", &self.state())
            .field("handle", &self.handle())
            .finish()
    }
}
