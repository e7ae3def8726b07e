//! Serialized rollback for branches that a watchdog may also roll back
//!
//! A transaction timeout can fire on a watchdog thread while the coordinator
//! is rolling the same branch back. Resource managers are not required to
//! tolerate two concurrent xa_rollback calls, so both paths go through an
//! `AsyncRollback` collaborator that runs the rollback once and hands every
//! caller the same result.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Condvar, Mutex};
use proven_common::Xid;
use proven_xa::{ResourceError, ResourceManager};
use std::collections::VecDeque;
use std::sync::Arc;

/// Released branches whose result is kept for late watchdog calls
pub const DEFAULT_RETENTION: usize = 1024;

/// Owner of rollback execution for branches with asynchronous rollback
pub trait AsyncRollback: Send + Sync {
    /// Roll back `xid` on `resource`, or join the rollback already running
    /// for it, and return that rollback's result
    fn rollback(&self, xid: &Xid, resource: &dyn ResourceManager) -> Result<(), ResourceError>;

    /// Result of a rollback that already ran for `xid`, if kept
    fn outcome(&self, _xid: &Xid) -> Option<Result<(), ResourceError>> {
        None
    }

    /// The branch is finished; stop tracking it as in flight
    fn release(&self, _xid: &Xid) {}
}

#[derive(Debug, Clone)]
enum SlotState {
    Idle,

    /// Attempt number of the rollback in progress
    InFlight(u64),

    Done(u64, Result<(), ResourceError>),
}

/// What a caller does after inspecting the slot
enum Step {
    Replay(Result<(), ResourceError>),
    Wait(u64),
    Run(u64),
}

/// One branch's rollback: run once, then replay the result
///
/// A transient failure is replayed only to the callers that were waiting on
/// that attempt; the next caller starts a fresh attempt.
struct RollbackSlot {
    state: Mutex<SlotState>,
    finished: Condvar,
}

impl RollbackSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Idle),
            finished: Condvar::new(),
        }
    }

    fn run<F>(&self, rollback: F) -> Result<(), ResourceError>
    where
        F: FnOnce() -> Result<(), ResourceError>,
    {
        let mut state = self.state.lock();
        let mut joined = None;
        let attempt = loop {
            let step = match &*state {
                SlotState::Idle => Step::Run(1),
                SlotState::InFlight(attempt) => Step::Wait(*attempt),
                SlotState::Done(attempt, result)
                    if joined == Some(*attempt) || !is_transient(result) =>
                {
                    Step::Replay(result.clone())
                }
                SlotState::Done(attempt, _) => Step::Run(attempt + 1),
            };
            match step {
                Step::Replay(result) => return result,
                Step::Wait(attempt) => {
                    joined = Some(attempt);
                    self.finished.wait(&mut state);
                }
                Step::Run(attempt) => break attempt,
            }
        };
        *state = SlotState::InFlight(attempt);
        drop(state);

        let mut guard = CompletionGuard {
            slot: self,
            attempt,
            completed: false,
        };
        let result = rollback();
        guard.complete(result.clone());
        result
    }

    fn finish(&self, attempt: u64, result: Result<(), ResourceError>) {
        *self.state.lock() = SlotState::Done(attempt, result);
        self.finished.notify_all();
    }

    fn outcome(&self) -> Option<Result<(), ResourceError>> {
        match &*self.state.lock() {
            SlotState::Done(_, result) => Some(result.clone()),
            _ => None,
        }
    }
}

fn is_transient(result: &Result<(), ResourceError>) -> bool {
    matches!(result, Err(e) if e.code().is_some_and(|code| code.is_transient()))
}

/// Completes the slot even if the resource call unwinds, so waiters never hang
struct CompletionGuard<'a> {
    slot: &'a RollbackSlot,
    attempt: u64,
    completed: bool,
}

impl CompletionGuard<'_> {
    fn complete(&mut self, result: Result<(), ResourceError>) {
        self.completed = true;
        self.slot.finish(self.attempt, result);
    }
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.slot.finish(
                self.attempt,
                Err(ResourceError::Unexpected(
                    "rollback panicked in resource manager".to_string(),
                )),
            );
        }
    }
}

/// Single-flight `AsyncRollback` keyed by branch
///
/// Slots live while a branch can still be rolled back. Once released, a
/// branch's result moves to a bounded retired list so a watchdog that fires
/// late is answered without reaching the resource again.
pub struct RollbackGate {
    slots: DashMap<Xid, Arc<RollbackSlot>>,

    /// Results of released branches, oldest first
    retired: Mutex<VecDeque<(Xid, Result<(), ResourceError>)>>,

    retention: usize,
}

enum Lookup {
    Live(Arc<RollbackSlot>),
    Retired(Result<(), ResourceError>),
}

impl RollbackGate {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Keep at most `retention` results of released branches
    pub fn with_retention(retention: usize) -> Self {
        Self {
            slots: DashMap::new(),
            retired: Mutex::new(VecDeque::with_capacity(retention.min(DEFAULT_RETENTION))),
            retention,
        }
    }

    /// Number of branches with a live rollback slot
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of retired results currently kept
    pub fn retained(&self) -> usize {
        self.retired.lock().len()
    }

    fn lookup(&self, xid: &Xid) -> Lookup {
        // Clone the Arc out so the map shard is not held across the resource call
        match self.slots.entry(xid.clone()) {
            Entry::Occupied(entry) => Lookup::Live(entry.get().clone()),
            Entry::Vacant(entry) => match self.retired_outcome(xid) {
                Some(result) => Lookup::Retired(result),
                None => Lookup::Live(entry.insert(Arc::new(RollbackSlot::new())).value().clone()),
            },
        }
    }

    fn retire(&self, xid: Xid, result: Result<(), ResourceError>) {
        if self.retention == 0 {
            return;
        }
        let mut retired = self.retired.lock();
        if retired.len() >= self.retention {
            retired.pop_front();
        }
        retired.push_back((xid, result));
    }

    fn retired_outcome(&self, xid: &Xid) -> Option<Result<(), ResourceError>> {
        self.retired
            .lock()
            .iter()
            .rev()
            .find(|(retired, _)| retired == xid)
            .map(|(_, result)| result.clone())
    }
}

impl Default for RollbackGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncRollback for RollbackGate {
    fn rollback(&self, xid: &Xid, resource: &dyn ResourceManager) -> Result<(), ResourceError> {
        let slot = match self.lookup(xid) {
            Lookup::Live(slot) => slot,
            Lookup::Retired(result) => {
                tracing::debug!("Replaying retired rollback result for {}", xid);
                return result;
            }
        };
        slot.run(|| {
            tracing::debug!("Rolling back {} on {}", xid, resource.name());
            resource.rollback(xid)
        })
    }

    fn outcome(&self, xid: &Xid) -> Option<Result<(), ResourceError>> {
        self.slots
            .get(xid)
            .and_then(|slot| slot.outcome())
            .or_else(|| self.retired_outcome(xid))
    }

    fn release(&self, xid: &Xid) {
        if let Entry::Occupied(entry) = self.slots.entry(xid.clone()) {
            // A slot still in flight is dropped without a record; its waiters hold their own Arc
            if let Some(result) = entry.get().outcome() {
                self.retire(xid.clone(), result);
            }
            entry.remove();
        }
    }
}
