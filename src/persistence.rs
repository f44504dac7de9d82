//! The persistence contract (§6) and an in-memory reference implementation,
//! generalized from the teacher's `StateManager`.

use crate::error::{WorkflowError, WorkflowResult};
use crate::execution::{ExecutionFilter, WorkflowExecution};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// CRUD plus filtered search over execution records.
///
/// Implementations are free to separate immutable history from the mutable
/// "main" row; if they do, history records must carry a uniqueness key of
/// `(execution_id, state_name, started_at)` and insertions must be
/// idempotent on that key to tolerate retried saves.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn save(&self, execution: &WorkflowExecution) -> WorkflowResult<()>;
    async fn load(&self, id: &str) -> WorkflowResult<Option<WorkflowExecution>>;
    /// Must raise [`WorkflowError::ExecutionNotFound`] if `id` is unknown.
    /// Merges `patch` shallowly into `data` the way
    /// [`WorkflowExecution::merge_data`] does.
    async fn update(&self, id: &str, patch: serde_json::Value) -> WorkflowResult<()>;
    async fn find(&self, filter: &ExecutionFilter) -> WorkflowResult<Vec<WorkflowExecution>>;
    async fn count_running_past_unlock(&self, workflow_name: &str, group_id: &str) -> WorkflowResult<usize>;
}

/// In-memory [`PersistenceAdapter`], grounded in the teacher's
/// `StateManager`: a single `RwLock<HashMap<String, WorkflowExecution>>`
/// guarding the whole table. Sufficient to run the engine standalone and
/// to exercise every scenario in the testable-properties section; a real
/// deployment supplies a SQL- or KV-backed adapter implementing the same
/// trait out of crate.
pub struct InMemoryPersistence {
    executions: Arc<RwLock<HashMap<String, WorkflowExecution>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            executions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryPersistence {
    async fn save(&self, execution: &WorkflowExecution) -> WorkflowResult<()> {
        let mut executions = self.executions.write().await;
        executions.insert(execution.id.clone(), execution.clone());
        debug!(execution_id = %execution.id, "saved workflow execution");
        Ok(())
    }

    async fn load(&self, id: &str) -> WorkflowResult<Option<WorkflowExecution>> {
        let executions = self.executions.read().await;
        Ok(executions.get(id).cloned())
    }

    async fn update(&self, id: &str, patch: serde_json::Value) -> WorkflowResult<()> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(id)
            .ok_or_else(|| WorkflowError::ExecutionNotFound(id.to_string()))?;
        execution.merge_data(Some(patch));
        Ok(())
    }

    async fn find(&self, filter: &ExecutionFilter) -> WorkflowResult<Vec<WorkflowExecution>> {
        let executions = self.executions.read().await;
        Ok(executions
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn count_running_past_unlock(&self, workflow_name: &str, group_id: &str) -> WorkflowResult<usize> {
        use crate::execution::ExecutionStatus;
        let executions = self.executions.read().await;
        let count = executions
            .values()
            .filter(|e| {
                e.workflow_name == workflow_name
                    && e.group_id.as_deref() == Some(group_id)
                    && e.status == ExecutionStatus::Running
                    && e.history.iter().any(|t| t.status == crate::execution::TransitionStatus::Success)
            })
            .count();
        info!(workflow_name, group_id, count, "counted throttle-active executions");
        Ok(count)
    }
}
