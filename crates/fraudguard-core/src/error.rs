//! Error types for the FraudGuard engine.

use thiserror::Error;

/// Result type alias using `EngineError`.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur during engine operations.
///
/// Nothing in this taxonomy is fatal to the process; every error is
/// per-request and surfaced to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input validation failed. No state was mutated; the caller must
    /// resubmit corrected input.
    #[error("Input validation failed: {0}")]
    Validation(String),

    /// Rule not found in the rule store.
    #[error("Rule not found: {0}")]
    RuleNotFound(u64),

    /// Alert not found in the alert feed (or already dismissed).
    #[error("Alert not found: {0}")]
    AlertNotFound(uuid::Uuid),

    /// No profile exists for the user.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// A rule with this name already exists.
    #[error("Duplicate rule name: {0}")]
    DuplicateRuleName(String),

    /// A verdict was already produced for this transaction id. The caller
    /// must treat this as a duplicate send, not retry.
    #[error("Transaction already decided: {0}")]
    AlreadyDecided(String),

    /// Evaluation was abandoned before any state mutation.
    #[error("Evaluation cancelled for transaction: {0}")]
    Cancelled(String),

    /// Internal bounded retries were exhausted; the caller may retry the
    /// whole submission.
    #[error("Transient conflict: {0}")]
    Transient(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Config(msg.into())
    }

    /// Returns true if the caller may retry the whole submission.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Transient(_) | EngineError::Cancelled(_)
        )
    }

    /// Returns true if this error indicates a duplicate submission.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, EngineError::AlreadyDecided(_))
    }
}
