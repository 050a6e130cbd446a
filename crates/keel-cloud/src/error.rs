//! Reconciliation engine error types

use thiserror::Error;

/// Errors surfaced by the reconciliation engine and its collaborators.
#[derive(Error, Debug)]
pub enum CloudError {
    /// A resource was asked to act on a snapshot missing something it
    /// needs (e.g. a subnet apply before the network has an identifier).
    /// Never retried.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Raw provider failure, code and message verbatim. The retry
    /// classifier pattern-matches on these.
    #[error("Provider error [{code}]: {message}")]
    Provider { code: String, message: String },

    /// A readiness poll ran out of attempts.
    #[error("Timed out waiting for {what} after {attempts} attempts")]
    WaitTimeout { what: String, attempts: usize },

    /// Apply failed and the rollback of previously created resources
    /// failed too; `abandoned` names what was left behind in the cloud.
    #[error("Rollback abandoned, resources left behind: {}", abandoned.join(", "))]
    RollbackAbandoned {
        abandoned: Vec<String>,
        #[source]
        source: Box<CloudError>,
    },

    /// Apply failed for a resource; rollback of earlier creations
    /// succeeded.
    #[error("Apply failed for {kind} '{name}': {source}")]
    ApplyFailed {
        kind: String,
        name: String,
        #[source]
        source: Box<CloudError>,
    },

    /// Delete failed for a resource during destroy.
    #[error("Delete failed for {kind} '{name}': {source}")]
    DeleteFailed {
        kind: String,
        name: String,
        #[source]
        source: Box<CloudError>,
    },

    /// The operator interrupted the run; honored at a model index
    /// boundary after cleanup.
    #[error("Interrupted by operator")]
    Interrupted,

    /// Bootstrap script rendering failed.
    #[error("Script error: {0}")]
    Script(String),

    /// State file error.
    #[error("State file error: {0}")]
    State(String),

    /// Another run holds the state lock.
    #[error("State lock error: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Shorthand for a provider error with an empty code.
    pub fn provider(message: impl Into<String>) -> Self {
        CloudError::Provider {
            code: String::new(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
