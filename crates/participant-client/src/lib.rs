//! Async client for coordinator-side participant calls
//!
//! Participant operations block on the resource manager. The client moves
//! each call onto tokio's blocking pool so an async coordinator can drive
//! many branches at once, and optionally bounds how long it waits.

use proven_participant::{
    FatalReason, ParticipantEndpoint, ParticipantError, ParticipantHandle, Vote,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Participant(#[from] ParticipantError),

    /// The participant did not answer in time. The resource call may still
    /// complete; its outcome is unknown to the caller.
    #[error("Participant did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Participant task failed: {0}")]
    Join(String),
}

impl ClientError {
    /// Whether the coordinator may retry the same operation
    ///
    /// A timeout is not: the abandoned call may still be running against the
    /// resource, and a retry would race it.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Participant(e) => e.is_retryable(),
            ClientError::Timeout(_) | ClientError::Join(_) => false,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Upper bound on waiting for one participant operation (None = wait forever)
    pub operation_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}

/// Async handle-addressed participant client
#[derive(Clone)]
pub struct ParticipantClient {
    endpoint: Arc<ParticipantEndpoint>,
    config: ClientConfig,
}

impl ParticipantClient {
    pub fn new(endpoint: Arc<ParticipantEndpoint>) -> Self {
        Self::with_config(endpoint, ClientConfig::default())
    }

    pub fn with_config(endpoint: Arc<ParticipantEndpoint>, config: ClientConfig) -> Self {
        Self { endpoint, config }
    }

    pub fn endpoint(&self) -> &Arc<ParticipantEndpoint> {
        &self.endpoint
    }

    /// Ask the branch to vote
    pub async fn prepare(&self, handle: ParticipantHandle) -> Result<Vote> {
        self.call("prepare", move |endpoint| endpoint.prepare(handle))
            .await
    }

    pub async fn commit_one_phase(&self, handle: ParticipantHandle) -> Result<()> {
        self.call("commit_one_phase", move |endpoint| {
            endpoint.commit_one_phase(handle)
        })
        .await
    }

    pub async fn commit(&self, handle: ParticipantHandle) -> Result<()> {
        self.call("commit", move |endpoint| endpoint.commit(handle))
            .await
    }

    pub async fn rollback(&self, handle: ParticipantHandle) -> Result<()> {
        self.call("rollback", move |endpoint| endpoint.rollback(handle))
            .await
    }

    pub async fn forget(&self, handle: ParticipantHandle) -> Result<()> {
        self.call("forget", move |endpoint| endpoint.forget(handle))
            .await
    }

    /// Prepare every branch, then commit or roll back all of them
    ///
    /// Read-only branches are left out of phase two. A branch whose prepare
    /// timed out is left alone too, since its prepare may still be running;
    /// the timeout is reported so the coordinator can recover it later.
    /// Returns whether the transaction committed; the first failure is
    /// returned after every other branch has been driven.
    pub async fn two_phase_commit(&self, handles: &[ParticipantHandle]) -> Result<bool> {
        let mut voted_commit = Vec::with_capacity(handles.len());
        let mut decision = true;
        let mut in_doubt = None;
        let mut first_error = None;

        for &handle in handles {
            match self.prepare(handle).await {
                Ok(Vote::Commit) => voted_commit.push(handle),
                Ok(Vote::ReadOnly) => {}
                Ok(Vote::Rollback) => {
                    decision = false;
                    break;
                }
                Err(e) => {
                    tracing::warn!("Prepare failed for {}: {}", handle, e);
                    if matches!(e, ClientError::Timeout(_)) {
                        in_doubt = Some(handle);
                        first_error = Some(e);
                    }
                    decision = false;
                    break;
                }
            }
        }

        if decision {
            for handle in voted_commit {
                if let Err(e) = self.commit(handle).await {
                    tracing::warn!("Commit failed for {}: {}", handle, e);
                    first_error.get_or_insert(e);
                }
            }
        } else {
            // Branches that were never prepared are rolled back too; the
            // endpoint answers HandleNotFound for those already finished
            for &handle in handles.iter().filter(|&&h| Some(h) != in_doubt) {
                match self.rollback(handle).await {
                    Ok(()) => {}
                    Err(ClientError::Participant(e))
                        if e.fatal_reason() == Some(FatalReason::HandleNotFound) => {}
                    Err(e) => {
                        tracing::warn!("Rollback failed for {}: {}", handle, e);
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(decision),
        }
    }

    async fn call<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ParticipantEndpoint) -> proven_participant::Result<T> + Send + 'static,
    {
        let endpoint = self.endpoint.clone();
        let task = tokio::task::spawn_blocking(move || f(&endpoint));

        let joined = match self.config.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!("{} timed out after {:?}", operation, limit);
                    return Err(ClientError::Timeout(limit));
                }
            },
            None => task.await,
        };

        joined
            .map_err(|e| ClientError::Join(e.to_string()))?
            .map_err(ClientError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new().with_operation_timeout(Duration::from_secs(2));
        assert_eq!(config.operation_timeout, Some(Duration::from_secs(2)));
        assert_eq!(ClientConfig::default().operation_timeout, None);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(!ClientError::Timeout(Duration::from_millis(10)).is_retryable());
        assert!(!ClientError::Join("cancelled".to_string()).is_retryable());
        assert!(
            ClientError::Participant(ParticipantError::Transient {
                detail: "XA_RETRY".to_string(),
            })
            .is_retryable()
        );
    }
}
