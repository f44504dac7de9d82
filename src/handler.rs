//! State handlers and the action builder they use to signal intent.

use crate::context::ExecutionContext;
use crate::error::WorkflowResult;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// The action a handler invocation resolved to. Only the *last* action call
/// within one invocation survives — each call on [`Actions`] overwrites
/// whatever was staged before it.
#[derive(Clone)]
pub(crate) enum StagedAction {
    Next {
        data: Option<serde_json::Value>,
        output: Option<serde_json::Value>,
    },
    Goto {
        target: String,
        data: Option<serde_json::Value>,
        output: Option<serde_json::Value>,
    },
    Suspend {
        waiting_for: Option<String>,
        data: Option<serde_json::Value>,
        output: Option<serde_json::Value>,
    },
    Complete {
        data: Option<serde_json::Value>,
        output: Option<serde_json::Value>,
    },
}

/// The builder a [`StateHandler`] calls into to stage its chosen action.
///
/// A handler may call more than one of `next`/`goto`/`suspend`/`complete`
/// during one invocation; only the last call is read once the handler
/// returns. If no action was staged, the executor treats the invocation as
/// an implicit `next()`.
#[derive(Default)]
pub struct Actions {
    staged: Mutex<Option<StagedAction>>,
}

impl Actions {
    pub fn new() -> Self {
        Self {
            staged: Mutex::new(None),
        }
    }

    pub fn next(&self, data: Option<serde_json::Value>, output: Option<serde_json::Value>) {
        *self.staged.lock().unwrap() = Some(StagedAction::Next { data, output });
    }

    pub fn goto(
        &self,
        target: impl Into<String>,
        data: Option<serde_json::Value>,
        output: Option<serde_json::Value>,
    ) {
        *self.staged.lock().unwrap() = Some(StagedAction::Goto {
            target: target.into(),
            data,
            output,
        });
    }

    pub fn suspend(
        &self,
        waiting_for: Option<String>,
        data: Option<serde_json::Value>,
        output: Option<serde_json::Value>,
    ) {
        *self.staged.lock().unwrap() = Some(StagedAction::Suspend {
            waiting_for,
            data,
            output,
        });
    }

    pub fn complete(&self, data: Option<serde_json::Value>, output: Option<serde_json::Value>) {
        *self.staged.lock().unwrap() = Some(StagedAction::Complete { data, output });
    }

    pub(crate) fn take(&self) -> Option<StagedAction> {
        self.staged.lock().unwrap().take()
    }
}

/// Executes the work of a single state. One handler instance may be bound
/// to many state values; a handler disambiguates via `ctx.current_state`.
#[async_trait]
pub trait StateHandler: Send + Sync {
    async fn execute(&self, ctx: ExecutionContext, actions: &Actions) -> WorkflowResult<()>;
}

/// Per-state metadata attached at registration time rather than hidden in
/// reflective annotations: timeout, retry policy, unconditional pre-handler
/// delay, and whether passing through this state releases the group lock.
#[derive(Debug, Clone, Default)]
pub struct StateMetadata {
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
    pub delay: Option<Duration>,
    pub unlock_after: bool,
}

impl StateMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_unlock_after(mut self, unlock_after: bool) -> Self {
        self.unlock_after = unlock_after;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_action_call_wins() {
        let actions = Actions::new();
        actions.next(None, None);
        actions.goto("B", None, None);
        actions.suspend(Some("payment".into()), None, None);

        match actions.take() {
            Some(StagedAction::Suspend { waiting_for, .. }) => {
                assert_eq!(waiting_for.as_deref(), Some("payment"));
            }
            other => panic!("expected Suspend to win, got {other:?}"),
        }
    }

    #[test]
    fn take_clears_staged_action() {
        let actions = Actions::new();
        actions.complete(None, None);
        assert!(actions.take().is_some());
        assert!(actions.take().is_none());
    }
}

impl std::fmt::Debug for StagedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagedAction::Next { .. } => write!(f, "Next"),
            StagedAction::Goto { target, .. } => write!(f, "Goto({target})"),
            StagedAction::Suspend { waiting_for, .. } => write!(f, "Suspend({waiting_for:?})"),
            StagedAction::Complete { .. } => write!(f, "Complete"),
        }
    }
}
