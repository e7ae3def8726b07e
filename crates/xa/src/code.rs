//! XA result and error codes
//!
//! Resource managers report outcomes as plain integers. They are decoded once
//! at the boundary into `XaCode` so everything above matches on a closed
//! enumeration; values outside the X/Open set survive as `Unknown`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw X/Open XA constants
pub mod raw {
    pub const XA_OK: i32 = 0;
    pub const XA_RDONLY: i32 = 3;
    pub const XA_RETRY: i32 = 4;
    pub const XA_HEURMIX: i32 = 5;
    pub const XA_HEURRB: i32 = 6;
    pub const XA_HEURCOM: i32 = 7;
    pub const XA_HEURHAZ: i32 = 8;
    pub const XA_NOMIGRATE: i32 = 9;

    pub const XA_RBBASE: i32 = 100;
    pub const XA_RBROLLBACK: i32 = XA_RBBASE;
    pub const XA_RBCOMMFAIL: i32 = XA_RBBASE + 1;
    pub const XA_RBDEADLOCK: i32 = XA_RBBASE + 2;
    pub const XA_RBINTEGRITY: i32 = XA_RBBASE + 3;
    pub const XA_RBOTHER: i32 = XA_RBBASE + 4;
    pub const XA_RBPROTO: i32 = XA_RBBASE + 5;
    pub const XA_RBTIMEOUT: i32 = XA_RBBASE + 6;
    pub const XA_RBTRANSIENT: i32 = XA_RBBASE + 7;
    pub const XA_RBEND: i32 = XA_RBTRANSIENT;

    pub const XAER_ASYNC: i32 = -2;
    pub const XAER_RMERR: i32 = -3;
    pub const XAER_NOTA: i32 = -4;
    pub const XAER_INVAL: i32 = -5;
    pub const XAER_PROTO: i32 = -6;
    pub const XAER_RMFAIL: i32 = -7;
    pub const XAER_DUPID: i32 = -8;
    pub const XAER_OUTSIDE: i32 = -9;
}

/// Why a resource manager rolled a branch back (the XA_RB* range)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RollbackReason {
    Unspecified,
    CommunicationFailure,
    Deadlock,
    Integrity,
    Other,
    Protocol,
    Timeout,
    Transient,
}

impl RollbackReason {
    pub const ALL: [RollbackReason; 8] = [
        RollbackReason::Unspecified,
        RollbackReason::CommunicationFailure,
        RollbackReason::Deadlock,
        RollbackReason::Integrity,
        RollbackReason::Other,
        RollbackReason::Protocol,
        RollbackReason::Timeout,
        RollbackReason::Transient,
    ];

    fn raw(self) -> i32 {
        match self {
            RollbackReason::Unspecified => raw::XA_RBROLLBACK,
            RollbackReason::CommunicationFailure => raw::XA_RBCOMMFAIL,
            RollbackReason::Deadlock => raw::XA_RBDEADLOCK,
            RollbackReason::Integrity => raw::XA_RBINTEGRITY,
            RollbackReason::Other => raw::XA_RBOTHER,
            RollbackReason::Protocol => raw::XA_RBPROTO,
            RollbackReason::Timeout => raw::XA_RBTIMEOUT,
            RollbackReason::Transient => raw::XA_RBTRANSIENT,
        }
    }

    fn name(self) -> &'static str {
        match self {
            RollbackReason::Unspecified => "XA_RBROLLBACK",
            RollbackReason::CommunicationFailure => "XA_RBCOMMFAIL",
            RollbackReason::Deadlock => "XA_RBDEADLOCK",
            RollbackReason::Integrity => "XA_RBINTEGRITY",
            RollbackReason::Other => "XA_RBOTHER",
            RollbackReason::Protocol => "XA_RBPROTO",
            RollbackReason::Timeout => "XA_RBTIMEOUT",
            RollbackReason::Transient => "XA_RBTRANSIENT",
        }
    }
}

/// A decoded XA result or error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XaCode {
    /// XA_OK
    Ok,
    /// XA_RDONLY - branch was read-only and has been committed
    ReadOnly,
    /// XA_RETRY - routine returned with no effect and may be reissued
    Retry,
    /// XA_HEURMIX - branch was partially committed and partially rolled back
    HeuristicMixed,
    /// XA_HEURRB - branch was heuristically rolled back
    HeuristicRollback,
    /// XA_HEURCOM - branch was heuristically committed
    HeuristicCommit,
    /// XA_HEURHAZ - branch may have been heuristically completed
    HeuristicHazard,
    /// XA_NOMIGRATE - resumption must occur where suspension occurred
    NoMigrate,
    /// XA_RB* - the branch was rolled back
    Rollback(RollbackReason),
    /// XAER_ASYNC
    Async,
    /// XAER_RMERR - resource manager error in the branch
    RmError,
    /// XAER_NOTA - XID is not valid
    NotA,
    /// XAER_INVAL - invalid arguments
    Invalid,
    /// XAER_PROTO - routine invoked in an improper context
    Protocol,
    /// XAER_RMFAIL - resource manager unavailable
    RmFail,
    /// XAER_DUPID - XID already exists
    DuplicateId,
    /// XAER_OUTSIDE - resource manager doing work outside the transaction
    Outside,
    /// Anything outside the X/Open set
    Unknown(i32),
}

/// Coarse classification of a code, independent of the operation that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeClass {
    Success,
    ReadOnly,
    RollbackRequired,
    HeuristicCommit,
    HeuristicRollback,
    HeuristicMixed,
    HeuristicHazard,
    Transient,
    ProtocolViolation,
    ResourceFailure,
    Unclassified,
}

impl XaCode {
    /// Decode a raw XA integer
    pub fn from_raw(code: i32) -> Self {
        match code {
            raw::XA_OK => XaCode::Ok,
            raw::XA_RDONLY => XaCode::ReadOnly,
            raw::XA_RETRY => XaCode::Retry,
            raw::XA_HEURMIX => XaCode::HeuristicMixed,
            raw::XA_HEURRB => XaCode::HeuristicRollback,
            raw::XA_HEURCOM => XaCode::HeuristicCommit,
            raw::XA_HEURHAZ => XaCode::HeuristicHazard,
            raw::XA_NOMIGRATE => XaCode::NoMigrate,
            raw::XA_RBBASE..=raw::XA_RBEND => {
                XaCode::Rollback(RollbackReason::ALL[(code - raw::XA_RBBASE) as usize])
            }
            raw::XAER_ASYNC => XaCode::Async,
            raw::XAER_RMERR => XaCode::RmError,
            raw::XAER_NOTA => XaCode::NotA,
            raw::XAER_INVAL => XaCode::Invalid,
            raw::XAER_PROTO => XaCode::Protocol,
            raw::XAER_RMFAIL => XaCode::RmFail,
            raw::XAER_DUPID => XaCode::DuplicateId,
            raw::XAER_OUTSIDE => XaCode::Outside,
            other => XaCode::Unknown(other),
        }
    }

    /// Encode back to the raw XA integer
    pub fn raw(self) -> i32 {
        match self {
            XaCode::Ok => raw::XA_OK,
            XaCode::ReadOnly => raw::XA_RDONLY,
            XaCode::Retry => raw::XA_RETRY,
            XaCode::HeuristicMixed => raw::XA_HEURMIX,
            XaCode::HeuristicRollback => raw::XA_HEURRB,
            XaCode::HeuristicCommit => raw::XA_HEURCOM,
            XaCode::HeuristicHazard => raw::XA_HEURHAZ,
            XaCode::NoMigrate => raw::XA_NOMIGRATE,
            XaCode::Rollback(reason) => reason.raw(),
            XaCode::Async => raw::XAER_ASYNC,
            XaCode::RmError => raw::XAER_RMERR,
            XaCode::NotA => raw::XAER_NOTA,
            XaCode::Invalid => raw::XAER_INVAL,
            XaCode::Protocol => raw::XAER_PROTO,
            XaCode::RmFail => raw::XAER_RMFAIL,
            XaCode::DuplicateId => raw::XAER_DUPID,
            XaCode::Outside => raw::XAER_OUTSIDE,
            XaCode::Unknown(code) => code,
        }
    }

    /// Symbolic X/Open name
    pub fn name(self) -> &'static str {
        match self {
            XaCode::Ok => "XA_OK",
            XaCode::ReadOnly => "XA_RDONLY",
            XaCode::Retry => "XA_RETRY",
            XaCode::HeuristicMixed => "XA_HEURMIX",
            XaCode::HeuristicRollback => "XA_HEURRB",
            XaCode::HeuristicCommit => "XA_HEURCOM",
            XaCode::HeuristicHazard => "XA_HEURHAZ",
            XaCode::NoMigrate => "XA_NOMIGRATE",
            XaCode::Rollback(reason) => reason.name(),
            XaCode::Async => "XAER_ASYNC",
            XaCode::RmError => "XAER_RMERR",
            XaCode::NotA => "XAER_NOTA",
            XaCode::Invalid => "XAER_INVAL",
            XaCode::Protocol => "XAER_PROTO",
            XaCode::RmFail => "XAER_RMFAIL",
            XaCode::DuplicateId => "XAER_DUPID",
            XaCode::Outside => "XAER_OUTSIDE",
            XaCode::Unknown(_) => "UNKNOWN",
        }
    }

    /// Retryable: the same call may succeed if reissued
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            XaCode::Retry
                | XaCode::Rollback(RollbackReason::Transient)
                | XaCode::Rollback(RollbackReason::CommunicationFailure)
        )
    }

    /// Inside the XA_RBBASE..=XA_RBEND range
    pub fn is_rollback(self) -> bool {
        matches!(self, XaCode::Rollback(_))
    }

    pub fn is_heuristic(self) -> bool {
        matches!(
            self,
            XaCode::HeuristicCommit
                | XaCode::HeuristicRollback
                | XaCode::HeuristicMixed
                | XaCode::HeuristicHazard
        )
    }

    pub fn class(self) -> CodeClass {
        match self {
            XaCode::Ok => CodeClass::Success,
            XaCode::ReadOnly => CodeClass::ReadOnly,
            XaCode::Retry | XaCode::RmFail => CodeClass::Transient,
            code if code.is_transient() => CodeClass::Transient,
            XaCode::Rollback(_) => CodeClass::RollbackRequired,
            XaCode::HeuristicCommit => CodeClass::HeuristicCommit,
            XaCode::HeuristicRollback => CodeClass::HeuristicRollback,
            XaCode::HeuristicMixed => CodeClass::HeuristicMixed,
            XaCode::HeuristicHazard => CodeClass::HeuristicHazard,
            XaCode::Protocol | XaCode::Invalid | XaCode::Outside | XaCode::Async => {
                CodeClass::ProtocolViolation
            }
            XaCode::RmError | XaCode::NotA | XaCode::DuplicateId => CodeClass::ResourceFailure,
            XaCode::NoMigrate | XaCode::Unknown(_) => CodeClass::Unclassified,
        }
    }

    /// Every named code plus one value outside the X/Open set
    pub fn all() -> Vec<XaCode> {
        let mut codes = vec![
            XaCode::Ok,
            XaCode::ReadOnly,
            XaCode::Retry,
            XaCode::HeuristicMixed,
            XaCode::HeuristicRollback,
            XaCode::HeuristicCommit,
            XaCode::HeuristicHazard,
            XaCode::NoMigrate,
            XaCode::Async,
            XaCode::RmError,
            XaCode::NotA,
            XaCode::Invalid,
            XaCode::Protocol,
            XaCode::RmFail,
            XaCode::DuplicateId,
            XaCode::Outside,
            XaCode::Unknown(-99),
        ];
        codes.extend(RollbackReason::ALL.iter().map(|reason| XaCode::Rollback(*reason)));
        codes
    }
}

impl From<i32> for XaCode {
    fn from(code: i32) -> Self {
        XaCode::from_raw(code)
    }
}

impl fmt::Display for XaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_codes_decode_and_encode() {
        for code in XaCode::all() {
            assert_eq!(XaCode::from_raw(code.raw()), code, "{}", code);
        }
    }

    #[test]
    fn test_rollback_range() {
        for value in raw::XA_RBBASE..=raw::XA_RBEND {
            assert!(XaCode::from_raw(value).is_rollback());
        }
        assert!(!XaCode::from_raw(raw::XA_RBBASE - 1).is_rollback());
        assert_eq!(XaCode::from_raw(raw::XA_RBEND + 1), XaCode::Unknown(108));
        assert_eq!(
            XaCode::from_raw(raw::XA_RBPROTO),
            XaCode::Rollback(RollbackReason::Protocol)
        );
    }

    #[test]
    fn test_transient_codes() {
        let transient: Vec<_> = XaCode::all().into_iter().filter(|c| c.is_transient()).collect();
        assert_eq!(
            transient,
            vec![
                XaCode::Retry,
                XaCode::Rollback(RollbackReason::CommunicationFailure),
                XaCode::Rollback(RollbackReason::Transient),
            ]
        );
    }

    #[test]
    fn test_classification() {
        assert_eq!(XaCode::Ok.class(), CodeClass::Success);
        assert_eq!(XaCode::ReadOnly.class(), CodeClass::ReadOnly);
        assert_eq!(XaCode::Retry.class(), CodeClass::Transient);
        assert_eq!(XaCode::RmFail.class(), CodeClass::Transient);
        assert_eq!(
            XaCode::Rollback(RollbackReason::Deadlock).class(),
            CodeClass::RollbackRequired
        );
        assert_eq!(
            XaCode::Rollback(RollbackReason::Transient).class(),
            CodeClass::Transient
        );
        assert_eq!(XaCode::HeuristicCommit.class(), CodeClass::HeuristicCommit);
        assert_eq!(XaCode::Protocol.class(), CodeClass::ProtocolViolation);
        assert_eq!(XaCode::NotA.class(), CodeClass::ResourceFailure);
        assert_eq!(XaCode::Unknown(12345).class(), CodeClass::Unclassified);
    }

    #[test]
    fn test_display() {
        assert_eq!(XaCode::HeuristicMixed.to_string(), "XA_HEURMIX(5)");
        assert_eq!(XaCode::Protocol.to_string(), "XAER_PROTO(-6)");
        assert_eq!(XaCode::Unknown(77).to_string(), "UNKNOWN(77)");
    }
}
