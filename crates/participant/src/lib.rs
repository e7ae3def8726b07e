//! Two-phase commit participant adapter
//!
//! This crate lets a distributed transaction coordinator drive an XA
//! resource manager through two-phase commit. Each enlisted branch is a
//! `Participant` that:
//! - Forwards prepare/commit/rollback/forget to its `ResourceManager`
//! - Translates XA codes into the coordinator's outcome vocabulary
//! - Enforces the branch state machine
//! - Deactivates its lifecycle handle once the branch is finished
//!
//! Rollbacks that may also be triggered by a timeout watchdog are
//! serialized through an `AsyncRollback` collaborator so the resource sees
//! exactly one rollback per branch.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod outcome;
pub mod participant;
pub mod rollback;
pub mod state;
pub mod translate;

pub use config::ParticipantConfig;
pub use endpoint::ParticipantEndpoint;
pub use error::{CompletionStatus, FatalReason, ParticipantError, Result};
pub use lifecycle::{Lifecycle, LifecycleError, ParticipantHandle};
pub use outcome::{HeuristicOutcome, Operation, StandardOutcome, Vote};
pub use participant::Participant;
pub use rollback::{AsyncRollback, RollbackGate};
pub use state::ParticipantState;
pub use translate::translate;
