//! Lifecycle hooks and the error-handler contract.

use crate::context::ExecutionContext;
use crate::error::WorkflowError;
use async_trait::async_trait;

/// Identifies which stage of the execution loop an error (or the hook that
/// observed it) came from; carried on [`ErrorContext`] so an error handler
/// can make phase-specific decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WorkflowStart,
    BeforeState,
    AfterState,
    WorkflowComplete,
    StateExecute,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::WorkflowStart => "workflow_start",
            Phase::BeforeState => "before_state",
            Phase::AfterState => "after_state",
            Phase::WorkflowComplete => "workflow_complete",
            Phase::StateExecute => "state_execute",
        };
        write!(f, "{s}")
    }
}

/// What is handed to a workflow's error handler whenever any error escapes
/// a handler call, a retry block, or a hook.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub error: WorkflowError,
    pub phase: Phase,
    pub workflow_context: ExecutionContext,
    pub attempt: Option<u32>,
    pub max_attempts: Option<u32>,
}

/// The error handler's verdict. `TransitionTo` is the only decision that
/// also carries data: the recovery target and an optional output to assign
/// to the failing state's output slot.
#[derive(Debug, Clone)]
pub enum ErrorDecision {
    /// Swallow the error; proceed as if the failing step had succeeded.
    Continue,
    /// Stop the execution loop; leave status untouched.
    Exit,
    /// Mark the execution FAILED, persist, and re-raise.
    Fail,
    /// Re-raise without persisting the final record.
    FailNoPersist,
    /// Abandon the retry loop for this state; behaves as `Fail` for it.
    StopRetry,
    /// Record an `error_recovery` self-transition, optionally assign an
    /// output, then transition to `target_state`.
    TransitionTo {
        target_state: String,
        output: Option<serde_json::Value>,
    },
}

/// A workflow's error handler. Absent a handler, every error is equivalent
/// to [`ErrorDecision::Fail`].
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, ctx: &ErrorContext) -> ErrorDecision;
}

/// Workflow-scoped lifecycle hooks. All methods default to no-ops so
/// implementors only override the phases they care about.
#[async_trait]
pub trait WorkflowHooks: Send + Sync {
    async fn on_start(&self, _ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn before_state(&self, _ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn after_state(&self, _ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn on_complete(&self, _ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn on_error(&self, _ctx: &ExecutionContext, _error: &WorkflowError) {}
}

/// State-scoped lifecycle hooks, looked up alongside the state's handler.
#[async_trait]
pub trait StateHooks: Send + Sync {
    async fn on_start(&self, _ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn on_success(&self, _ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn on_failure(&self, _ctx: &ExecutionContext, _error: &WorkflowError) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn on_finish(&self, _ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        Ok(())
    }
}
