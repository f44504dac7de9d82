//! Error types for the durable workflow engine.

use thiserror::Error;

/// Result type alias for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Main error type for the workflow engine.
///
/// Variants are grouped the way the engine's error taxonomy groups them:
/// structural, admission, runtime, and policy. `is_fatal`/`is_retryable`
/// let retry policies and the executor's error-handler dispatch decide how
/// to react without matching on every variant.
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    /// No workflow is registered under this name.
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),

    /// `currentState` has no handler registered for it.
    #[error("unknown state: {0}")]
    UnknownState(String),

    /// A `goto` target, or a resume `GOTO` target, is not a declared
    /// transition from the current state.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// `resume` was called on an execution whose status is not SUSPENDED.
    #[error("execution {0} is not suspended")]
    NotSuspended(String),

    /// Resume strategy GOTO was used without a `targetState`.
    #[error("resume strategy GOTO requires a target state")]
    MissingTargetState,

    /// The concurrency manager could not admit the execution.
    #[error("failed to acquire concurrency lock for key: {0}")]
    LockAcquisitionError(String),

    /// A state handler raised an error.
    #[error("handler error in state {state}: {message}")]
    HandlerError { state: String, message: String },

    /// A lifecycle hook raised an error.
    #[error("hook error in phase {phase}: {message}")]
    HookError { phase: String, message: String },

    /// A state's handler invocation exceeded its configured timeout.
    #[error("state {state_name} timed out after {timeout_ms}ms (elapsed {elapsed_ms}ms)")]
    StateTimeoutError {
        state_name: String,
        timeout_ms: u64,
        elapsed_ms: u64,
    },

    /// A state's retry policy was exhausted.
    #[error("retry exhausted for state {state} after {attempts} attempts: {cause}")]
    RetryExhaustedError {
        state: String,
        attempts: u32,
        cause: String,
    },

    /// The persistence adapter failed.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Execution not found in the persistence adapter.
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// Serialization/deserialization of user data failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Internal invariant violation; should never surface in practice.
    #[error("internal workflow engine error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// Structural and admission errors that must never be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkflowError::UnknownWorkflow(_)
                | WorkflowError::UnknownState(_)
                | WorkflowError::InvalidTransition { .. }
                | WorkflowError::NotSuspended(_)
                | WorkflowError::MissingTargetState
                | WorkflowError::LockAcquisitionError(_)
                | WorkflowError::RetryExhaustedError { .. }
        )
    }

    /// Runtime/policy errors a retry policy is allowed to reconsider.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::HandlerError { .. }
                | WorkflowError::StateTimeoutError { .. }
                | WorkflowError::PersistenceError(_)
        )
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::SerializationError(err.to_string())
    }
}
