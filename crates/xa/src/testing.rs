//! Scripted resource manager for tests
//!
//! Replies are queued per operation and consumed in order; once a queue is
//! empty the operation succeeds. Every call is counted so tests can assert
//! how often the resource was actually reached.

use crate::code::XaCode;
use crate::error::{ResourceError, XaError};
use crate::resource::ResourceManager;
use parking_lot::Mutex;
use proven_common::Xid;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Resource manager operations, for call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Prepare,
    CommitOnePhase,
    Commit,
    Rollback,
    Forget,
}

/// Resource manager whose replies are scripted up front
pub struct ScriptedResource {
    name: String,
    prepare: Mutex<VecDeque<Result<XaCode, ResourceError>>>,
    replies: Mutex<HashMap<Call, VecDeque<Result<(), ResourceError>>>>,
    calls: Mutex<HashMap<Call, usize>>,
    rollback_delay: Option<Duration>,
    prepare_delay: Option<Duration>,
}

impl ScriptedResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prepare: Mutex::new(VecDeque::new()),
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            rollback_delay: None,
            prepare_delay: None,
        }
    }

    /// Hold every rollback for `delay` (widens race windows)
    pub fn with_rollback_delay(mut self, delay: Duration) -> Self {
        self.rollback_delay = Some(delay);
        self
    }

    /// Hold every prepare for `delay`
    pub fn with_prepare_delay(mut self, delay: Duration) -> Self {
        self.prepare_delay = Some(delay);
        self
    }

    /// Queue a prepare return code
    pub fn vote(self, code: XaCode) -> Self {
        self.prepare.lock().push_back(Ok(code));
        self
    }

    /// Queue a prepare failure
    pub fn fail_prepare(self, error: impl Into<ResourceError>) -> Self {
        self.prepare.lock().push_back(Err(error.into()));
        self
    }

    /// Queue a failure for a non-prepare operation
    pub fn fail(self, call: Call, error: impl Into<ResourceError>) -> Self {
        self.push(call, Err(error.into()));
        self
    }

    /// Queue an explicit success for a non-prepare operation
    pub fn succeed(self, call: Call) -> Self {
        self.push(call, Ok(()));
        self
    }

    /// Queue a failure after construction (e.g. from another thread)
    pub fn push(&self, call: Call, reply: Result<(), ResourceError>) {
        self.replies.lock().entry(call).or_default().push_back(reply);
    }

    /// How many times an operation reached this resource
    pub fn calls(&self, call: Call) -> usize {
        self.calls.lock().get(&call).copied().unwrap_or(0)
    }

    /// Total calls across all operations
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    fn record(&self, call: Call) {
        *self.calls.lock().entry(call).or_default() += 1;
    }

    fn reply(&self, call: Call) -> Result<(), ResourceError> {
        self.record(call);
        self.replies
            .lock()
            .get_mut(&call)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()))
    }
}

impl ResourceManager for ScriptedResource {
    fn prepare(&self, _xid: &Xid) -> Result<XaCode, ResourceError> {
        self.record(Call::Prepare);
        if let Some(delay) = self.prepare_delay {
            std::thread::sleep(delay);
        }
        self.prepare.lock().pop_front().unwrap_or(Ok(XaCode::Ok))
    }

    fn commit_one_phase(&self, _xid: &Xid) -> Result<(), ResourceError> {
        self.reply(Call::CommitOnePhase)
    }

    fn commit(&self, _xid: &Xid) -> Result<(), ResourceError> {
        self.reply(Call::Commit)
    }

    fn rollback(&self, _xid: &Xid) -> Result<(), ResourceError> {
        if let Some(delay) = self.rollback_delay {
            std::thread::sleep(delay);
        }
        self.reply(Call::Rollback)
    }

    fn forget(&self, _xid: &Xid) -> Result<(), ResourceError> {
        self.reply(Call::Forget)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Shorthand for an XA failure with a message
pub fn xa(code: XaCode, message: &str) -> ResourceError {
    ResourceError::Xa(XaError::new(code, message))
}
