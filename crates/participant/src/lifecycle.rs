//! Participant handle registry
//!
//! The coordinator addresses participants by opaque handles. A handle is
//! issued once, when the branch is enlisted, and withdrawn when the branch
//! finishes. Withdrawal can be requested from several paths at once (the
//! operation that finished the branch, an error path, an administrator), so
//! it is a compare-and-clear: exactly one request has effect.

use crate::participant::Participant;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use proven_common::Xid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Branch {xid} is already active as {handle}")]
    AlreadyActive { xid: Xid, handle: ParticipantHandle },

    #[error("Participant for {0} was already activated")]
    AlreadyRegistered(Xid),

    #[error("Participant not found: {0}")]
    NotFound(ParticipantHandle),
}

/// Opaque reference by which the coordinator addresses a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantHandle(u64);

impl ParticipantHandle {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ParticipantHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "participant-{}", self.0)
    }
}

/// Handle-to-participant table shared by all coordinator worker threads
pub struct Lifecycle {
    /// Registered participants
    active: DashMap<ParticipantHandle, Arc<Participant>>,

    /// One handle per branch
    branches: DashMap<Xid, ParticipantHandle>,

    next_handle: AtomicU64,
}

impl Lifecycle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: DashMap::new(),
            branches: DashMap::new(),
            next_handle: AtomicU64::new(1),
        })
    }

    /// Register a participant and issue its handle
    pub fn activate(
        self: &Arc<Self>,
        participant: Arc<Participant>,
    ) -> Result<ParticipantHandle, LifecycleError> {
        let xid = participant.xid().clone();
        match self.branches.entry(xid.clone()) {
            Entry::Occupied(entry) => Err(LifecycleError::AlreadyActive {
                xid,
                handle: *entry.get(),
            }),
            Entry::Vacant(entry) => {
                let handle = ParticipantHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
                if !participant.attach(handle, Arc::downgrade(self)) {
                    return Err(LifecycleError::AlreadyRegistered(xid));
                }
                entry.insert(handle);
                self.active.insert(handle, participant);
                tracing::debug!("Activated {} for {}", handle, xid);
                Ok(handle)
            }
        }
    }

    /// Withdraw a handle
    ///
    /// Returns true for the one call that removed it; every other call,
    /// including one for a handle that never existed, is a no-op.
    pub fn deactivate(&self, handle: ParticipantHandle) -> bool {
        match self.release(handle) {
            Some(participant) => {
                participant.detach(handle);
                true
            }
            None => false,
        }
    }

    /// Find the participant behind a handle
    pub fn lookup(&self, handle: ParticipantHandle) -> Result<Arc<Participant>, LifecycleError> {
        self.active
            .get(&handle)
            .map(|entry| entry.value().clone())
            .ok_or(LifecycleError::NotFound(handle))
    }

    /// Handle currently issued for a branch
    pub fn handle_for(&self, xid: &Xid) -> Option<ParticipantHandle> {
        self.branches.get(xid).map(|entry| *entry.value())
    }

    /// Number of active handles
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Remove the table entries without touching the participant
    pub(crate) fn release(&self, handle: ParticipantHandle) -> Option<Arc<Participant>> {
        let (_, participant) = self.active.remove(&handle)?;
        self.branches
            .remove_if(participant.xid(), |_, issued| *issued == handle);
        tracing::debug!("Deactivated {} for {}", handle, participant.xid());
        Some(participant)
    }
}
