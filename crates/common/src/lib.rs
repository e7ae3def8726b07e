//! Common identifier types for XA transaction branches
//!
//! This crate defines:
//! - Global transaction IDs (UUIDv7-based)
//! - Branch qualifiers derived from resource manager addresses
//! - XIDs naming one branch of one global transaction
//! - The CosTransactions `otid_t` view of an XID

mod xid;

pub use xid::{BranchQualifier, GlobalTransactionId, Otid, Xid, XidError};
