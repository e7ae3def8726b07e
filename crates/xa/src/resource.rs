//! Resource manager capability
//!
//! This trait is the only way a participant touches its resource. The
//! enlistment step that creates participants supplies the implementation
//! (a JDBC-style XA connection, a message broker session, ...).

use crate::code::XaCode;
use crate::error::ResourceError;
use proven_common::Xid;

/// A transactional resource that can be driven through two-phase commit
///
/// Note: All methods block until the resource manager answers. There is no
/// cancellation once a call has been issued; callers that need a bound on
/// waiting must apply it around the call.
pub trait ResourceManager: Send + Sync {
    /// Ask the resource manager to prepare the branch (xa_prepare)
    ///
    /// Returns the vote as a result code: `XaCode::Ok` to commit,
    /// `XaCode::ReadOnly` if nothing needs committing. Any other code is a
    /// vote to roll back.
    fn prepare(&self, xid: &Xid) -> Result<XaCode, ResourceError>;

    /// Commit the branch without a prepare phase (xa_commit with TMONEPHASE)
    fn commit_one_phase(&self, xid: &Xid) -> Result<(), ResourceError>;

    /// Commit a prepared branch (xa_commit)
    fn commit(&self, xid: &Xid) -> Result<(), ResourceError>;

    /// Roll back the branch (xa_rollback)
    fn rollback(&self, xid: &Xid) -> Result<(), ResourceError>;

    /// Discard knowledge of a heuristically completed branch (xa_forget)
    fn forget(&self, xid: &Xid) -> Result<(), ResourceError>;

    /// Name of this resource manager for logging and debugging
    fn name(&self) -> &str;
}
