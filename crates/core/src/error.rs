//! Core Error Types
//!
//! Defines the error taxonomy shared across the netdiag workspace. Most of
//! these variants never reach the caller: classification, tool and approval
//! failures are degraded into the diagnosis narrative by the components that
//! observe them. Only `InvalidConfiguration` (and caller mistakes such as an
//! unknown session) propagate out of the public API.

use thiserror::Error;

/// Core error type for the netdiag workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Fatal configuration or session-start errors (e.g. `max_rounds < 1`,
    /// empty symptom). Rejected before any round executes.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// The structured classifier failed or returned an unusable object
    #[error("Classification failed: {0}")]
    Classification(String),

    /// A telemetry / device query failed
    #[error("Tool error: {0}")]
    Tool(String),

    /// A worker or session budget was exhausted
    #[error("Timeout exceeded: {0}")]
    Timeout(String),

    /// A human approval gate rejected an operation
    #[error("Approval rejected: {0}")]
    ApprovalRejected(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create an invalid configuration error
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a classification error
    pub fn classification(msg: impl Into<String>) -> Self {
        Self::Classification(msg.into())
    }

    /// Create a tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error must be surfaced to the caller instead of being
    /// folded into a (possibly low-confidence) report.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::InvalidConfiguration(_))
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
