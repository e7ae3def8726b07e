//! Participant configuration

/// Configuration for a transaction participant
#[derive(Debug, Clone)]
pub struct ParticipantConfig {
    /// Reject `commit` on a branch that was never prepared instead of
    /// forwarding it to the resource manager
    pub strict_ordering: bool,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            strict_ordering: true,
        }
    }
}

impl ParticipantConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether out-of-order commits are rejected locally
    pub fn with_strict_ordering(mut self, strict: bool) -> Self {
        self.strict_ordering = strict;
        self
    }
}
