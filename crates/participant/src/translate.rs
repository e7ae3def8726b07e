//! Translation of resource manager replies into standardized outcomes
//!
//! `translate` is pure and total: every (operation, reply) pair maps to an
//! outcome, and anything without a defined meaning becomes a fatal failure
//! that keeps the original code and message.

use crate::error::{CompletionStatus, FatalReason, ParticipantError};
use crate::outcome::{HeuristicOutcome, Operation, StandardOutcome, Vote};
use proven_xa::{CodeClass, ResourceError, RollbackReason, XaCode};

/// Map a resource manager reply for `operation` to the outcome the coordinator sees
///
/// For prepare, `Ok` carries the vote code. For every other operation a
/// successful call is `Ok(XaCode::Ok)`; any other `Ok` code is treated as if
/// the resource had failed with it.
pub fn translate(
    operation: Operation,
    reply: std::result::Result<XaCode, &ResourceError>,
) -> StandardOutcome {
    match (operation, reply) {
        (Operation::Forget, _) => StandardOutcome::Ack,
        (Operation::Prepare, Ok(code)) => StandardOutcome::Vote(vote_for(code)),
        (_, Ok(XaCode::Ok)) => StandardOutcome::Ack,
        (_, Ok(code)) => on_code(operation, code, code.name()),
        (_, Err(ResourceError::Xa(error))) => on_code(operation, error.code, &error.message),
        (_, Err(ResourceError::Unexpected(message))) => fatal(
            FatalReason::Unexpected,
            CompletionStatus::Maybe,
            None,
            message,
        ),
    }
}

fn vote_for(code: XaCode) -> Vote {
    match code {
        XaCode::Ok => Vote::Commit,
        XaCode::ReadOnly => Vote::ReadOnly,
        _ => Vote::Rollback,
    }
}

fn on_code(operation: Operation, code: XaCode, detail: &str) -> StandardOutcome {
    match operation {
        Operation::Prepare => on_prepare_failure(code, detail),
        Operation::CommitOnePhase => on_commit_one_phase_failure(code, detail),
        Operation::Commit => on_commit_failure(code, detail),
        Operation::Rollback => on_rollback_failure(code, detail),
        Operation::Forget => StandardOutcome::Ack,
    }
}

fn on_prepare_failure(code: XaCode, detail: &str) -> StandardOutcome {
    match code {
        XaCode::Protocol | XaCode::Invalid | XaCode::RmFail | XaCode::RmError | XaCode::Unknown(_) => {
            unclassified(code, detail)
        }
        // The prepare phase only needs a ternary decision
        _ => StandardOutcome::Vote(Vote::Rollback),
    }
}

fn on_commit_one_phase_failure(code: XaCode, detail: &str) -> StandardOutcome {
    match code {
        _ if code.is_heuristic() => heuristic(code, detail),
        _ if code.is_transient() => transient(code, detail),
        XaCode::Rollback(_) | XaCode::RmError | XaCode::NotA => {
            rolled_back(CompletionStatus::No, code, detail)
        }
        _ => unclassified(code, detail),
    }
}

fn on_commit_failure(code: XaCode, detail: &str) -> StandardOutcome {
    match code {
        _ if code.is_heuristic() => heuristic(code, detail),
        XaCode::Rollback(RollbackReason::Protocol) => fatal(
            FatalReason::NotPrepared,
            CompletionStatus::No,
            Some(code),
            detail,
        ),
        // A prepared branch stays prepared until the resource manager is reachable again
        XaCode::RmFail => transient(code, detail),
        _ if code.is_transient() => transient(code, detail),
        // Rolled back after voting to commit
        XaCode::Rollback(_) => heuristic(XaCode::HeuristicRollback, detail),
        _ => unclassified(code, detail),
    }
}

fn on_rollback_failure(code: XaCode, detail: &str) -> StandardOutcome {
    match code {
        _ if code.is_heuristic() => heuristic(code, detail),
        _ if code.is_transient() => transient(code, detail),
        XaCode::Rollback(_) | XaCode::RmError | XaCode::NotA | XaCode::RmFail => {
            rolled_back(CompletionStatus::Maybe, code, detail)
        }
        _ => unclassified(code, detail),
    }
}

fn heuristic(code: XaCode, detail: &str) -> StandardOutcome {
    let outcome = match code {
        XaCode::HeuristicCommit => HeuristicOutcome::Commit,
        XaCode::HeuristicRollback => HeuristicOutcome::Rollback,
        XaCode::HeuristicMixed => HeuristicOutcome::Mixed,
        _ => HeuristicOutcome::Hazard,
    };
    StandardOutcome::Failed(ParticipantError::Heuristic {
        outcome,
        detail: detail.to_string(),
    })
}

fn transient(code: XaCode, detail: &str) -> StandardOutcome {
    StandardOutcome::Failed(ParticipantError::Transient {
        detail: format!("{}: {}", code, detail),
    })
}

fn rolled_back(status: CompletionStatus, code: XaCode, detail: &str) -> StandardOutcome {
    StandardOutcome::Failed(ParticipantError::TransactionRolledBack {
        status,
        detail: format!("{}: {}", code, detail),
    })
}

/// Fatal failure whose reason follows the code's coarse class
fn unclassified(code: XaCode, detail: &str) -> StandardOutcome {
    let reason = match code.class() {
        CodeClass::ProtocolViolation => FatalReason::ProtocolViolation,
        CodeClass::ResourceFailure | CodeClass::Transient => FatalReason::ResourceManagerFailure,
        _ => FatalReason::UnclassifiedCode,
    };
    fatal(reason, CompletionStatus::Maybe, Some(code), detail)
}

fn fatal(
    reason: FatalReason,
    status: CompletionStatus,
    code: Option<XaCode>,
    detail: &str,
) -> StandardOutcome {
    StandardOutcome::Failed(ParticipantError::Fatal {
        reason,
        status,
        code,
        detail: detail.to_string(),
    })
}
