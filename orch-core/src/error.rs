//! Error types for the orchestrator core.

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchError>;

/// Main error type for the orchestrator.
///
/// Variants line up with the error taxonomy: each carries enough context
/// (step id where applicable) to be surfaced to a caller without leaking
/// the underlying cause's internals.
#[derive(Debug, thiserror::Error)]
pub enum OrchError {
    /// DAG compilation failed (e.g. a dependency cycle).
    #[error("planning error: {0}")]
    Planning(String),

    /// No suitable agent could be found for a step.
    #[error("agent selection failed for step {step_id}: {reason}")]
    Selection { step_id: String, reason: String },

    /// An agent invocation raised an error.
    #[error("agent invocation failed for step {step_id}: {message}")]
    Invocation { step_id: String, message: String },

    /// The circuit breaker for a target is open.
    #[error("circuit open for target {target}")]
    CircuitOpen { target: String },

    /// A step or call exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// A distributed lock could not be acquired in time.
    #[error("lock busy for {resource}")]
    LockBusy { resource: String },

    /// The state store failed to persist a write.
    #[error("state store write failed: {0}")]
    StorePersist(String),

    /// A requested state version or workflow does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Input failed validation before being accepted.
    #[error("validation error: {0}")]
    Validation(String),

    /// The task or workflow was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped errors for compatibility with `anyhow`-based call sites.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchError {
    pub fn planning(msg: impl Into<String>) -> Self {
        Self::Planning(msg.into())
    }

    pub fn selection(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Selection {
            step_id: step_id.into(),
            reason: reason.into(),
        }
    }

    pub fn invocation(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invocation {
            step_id: step_id.into(),
            message: message.into(),
        }
    }

    /// The error `kind` tag used for the structured error surfaced across the
    /// HTTP boundary (spec §6/§7): never the `Debug` rendering of `self`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Planning(_) => "planning_error",
            Self::Selection { .. } => "agent_selection_empty",
            Self::Invocation { .. } => "agent_invocation_error",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Timeout(_) => "step_timeout",
            Self::LockBusy { .. } => "state_store_lock_busy",
            Self::StorePersist(_) => "state_store_write_fail",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Cancelled => "cancellation",
            Self::Serialization(_) | Self::Io(_) | Self::Other(_) => "internal",
        }
    }

    /// Step id this error is attached to, if any.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::Selection { step_id, .. } | Self::Invocation { step_id, .. } => Some(step_id),
            _ => None,
        }
    }

    /// Whether this error class is, in principle, retryable. Callers still
    /// consult a `RetryPolicy`'s explicit predicates on top of this.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Invocation { .. } | Self::Timeout(_) | Self::LockBusy { .. }
        )
    }
}
