//! XA transaction branch identifiers
//!
//! A global transaction is named by a UUIDv7, giving time-ordered uniqueness
//! across coordinators. Each resource manager enlisted in it gets its own
//! branch qualifier, and the pair forms the XID handed to the resource.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors building identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XidError {
    #[error("Branch qualifier is empty")]
    EmptyBranchQualifier,

    #[error("Branch qualifier is {0} bytes, at most {max} allowed", max = BranchQualifier::MAX_LEN)]
    BranchQualifierTooLong(usize),

    #[error("Invalid global transaction ID: {0}")]
    InvalidGlobalId(String),
}

/// Global transaction identifier, shared by every branch of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalTransactionId(Uuid);

impl GlobalTransactionId {
    /// Start a new global transaction; v7 ids sort by creation time
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Adopt a global id allocated by another coordinator
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// The XA `gtrid` bytes handed to resource managers
    pub fn to_bytes(&self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    /// Rebuild from a `gtrid` reported back by a resource manager (e.g. xa_recover)
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse the hyphenated form written by `Display`
    pub fn parse(s: &str) -> Result<Self, XidError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| XidError::InvalidGlobalId(e.to_string()))
    }
}

impl Default for GlobalTransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GlobalTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distinguishes one resource manager's enlistment within a global transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchQualifier(Vec<u8>);

impl BranchQualifier {
    /// X/Open MAXBQUALSIZE
    pub const MAX_LEN: usize = 64;

    /// Create from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, XidError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(XidError::EmptyBranchQualifier);
        }
        if bytes.len() > Self::MAX_LEN {
            return Err(XidError::BranchQualifierTooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    /// Derive the qualifier from a resource manager's address
    pub fn from_resource_address(address: &str) -> Result<Self, XidError> {
        Self::new(address.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for BranchQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => {
                for byte in &self.0 {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// XA transaction branch identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Xid {
    format_id: i32,
    global_id: GlobalTransactionId,
    branch: BranchQualifier,
}

impl Xid {
    /// Format ID used when the enlisting coordinator does not supply one ("PRVN")
    pub const DEFAULT_FORMAT_ID: i32 = 0x5052_564e;

    pub fn new(global_id: GlobalTransactionId, branch: BranchQualifier) -> Self {
        Self::with_format(Self::DEFAULT_FORMAT_ID, global_id, branch)
    }

    pub fn with_format(format_id: i32, global_id: GlobalTransactionId, branch: BranchQualifier) -> Self {
        Self {
            format_id,
            global_id,
            branch,
        }
    }

    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    pub fn global_id(&self) -> GlobalTransactionId {
        self.global_id
    }

    pub fn branch(&self) -> &BranchQualifier {
        &self.branch
    }

    /// The CosTransactions view of this XID
    ///
    /// Only the global part is exported; the branch qualifier stays private
    /// to the resource manager, so `bqual_length` is always zero.
    pub fn global_tid(&self) -> Otid {
        Otid {
            format_id: self.format_id,
            bqual_length: 0,
            tid: self.global_id.to_bytes().to_vec(),
        }
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{}:{}", self.format_id, self.global_id, self.branch)
    }
}

/// CosTransactions `otid_t`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Otid {
    pub format_id: i32,
    pub bqual_length: i32,
    pub tid: Vec<u8>,
}
