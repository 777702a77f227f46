//! Error taxonomy for promptab operations.
//!
//! Callers dispatch on the variant, never on message text: setup failures
//! (validation, not-found, auth, parse) abort the invoking operation, while
//! per-case provider failures are absorbed by the execution engine and
//! surface only as failed cases in the result set.

use crate::cas::StoreError;

/// promptab domain errors.
#[derive(Debug, thiserror::Error)]
pub enum PromptabError {
    /// Invalid input supplied by the caller (empty commit message, empty
    /// staging area, malformed dataset field).
    #[error("validation error: {0}")]
    Validation(String),

    /// An object, commit reference, or test run could not be resolved.
    #[error("not found: {0}")]
    NotFound(String),

    /// Required credential is missing; raised before any execution begins.
    #[error("auth error: {0}")]
    Auth(String),

    /// A single generation-provider call failed. Retryable per test case.
    #[error("provider error: {0}")]
    Provider(String),

    /// A dataset or config file could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("repository not initialized at {0}")]
    NotInitialized(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for PromptabError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(d) => PromptabError::NotFound(format!("object {d}")),
            StoreError::InvalidDigest(s) => PromptabError::Validation(format!("invalid digest: {s}")),
            StoreError::Io(e) => PromptabError::Io(e),
        }
    }
}

/// Result type for promptab domain operations.
pub type Result<T> = std::result::Result<T, PromptabError>;
