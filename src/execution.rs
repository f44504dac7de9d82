//! The persistent unit of work: [`WorkflowExecution`] and its history.

use crate::context::Outputs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Status of a workflow execution. See the data model invariants: I1
/// (`Completed` implies `completed_at` set and no suspension), I2
/// (`Suspended` implies suspension present).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Suspended,
}

/// Status recorded on a single [`StateTransition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStatus {
    Success,
    Failure,
    Suspended,
    ErrorRecovery,
}

/// A single recorded transition. A self-transition (`from == to`) encodes a
/// retry attempt or a suspension, not a real state change; consumers
/// reconstructing the execution graph rely on that encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: String,
    pub to: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: TransitionStatus,
    pub error: Option<String>,
}

impl StateTransition {
    pub fn new(from: impl Into<String>, to: impl Into<String>, status: TransitionStatus) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            status,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Marks the transition complete, computing its duration.
    pub fn finish(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0));
    }
}

/// Bookkeeping carried on every execution, distinct from the state machine's
/// own progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_attempts: u32,
}

impl ExecutionMetadata {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            updated_at: now,
            completed_at: None,
            total_attempts: 0,
        }
    }
}

/// Present iff `status == Suspended` (invariant I2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suspension {
    pub waiting_for: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub suspended_at: DateTime<Utc>,
}

/// The persistent unit: a single run of a workflow.
///
/// `group_id` is computed once at execution start from the workflow's
/// concurrency config and never recomputed (invariant I5). `history` is
/// append-only (invariant I3); resume adds transitions, it never rewrites
/// past ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_name: String,
    pub group_id: Option<String>,
    pub current_state: String,
    pub status: ExecutionStatus,
    pub data: serde_json::Value,
    pub outputs: Outputs,
    pub history: Vec<StateTransition>,
    pub metadata: ExecutionMetadata,
    pub suspension: Option<Suspension>,
}

impl WorkflowExecution {
    /// Creates a fresh, RUNNING execution. `id` is generated with
    /// `Uuid::new_v4` when the caller does not supply one.
    pub fn new(
        workflow_name: impl Into<String>,
        initial_state: impl Into<String>,
        data: serde_json::Value,
        id: Option<String>,
        group_id: Option<String>,
    ) -> Self {
        Self {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            workflow_name: workflow_name.into(),
            group_id,
            current_state: initial_state.into(),
            status: ExecutionStatus::Running,
            data,
            outputs: Outputs::new(),
            history: Vec::new(),
            metadata: ExecutionMetadata::new(),
            suspension: None,
        }
    }

    pub fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }

    pub fn append_transition(&mut self, transition: StateTransition) {
        self.history.push(transition);
        self.touch();
    }

    pub fn mark_completed(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.metadata.completed_at = Some(Utc::now());
        self.suspension = None;
        self.touch();
    }

    pub fn mark_failed(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.metadata.completed_at = Some(Utc::now());
        self.touch();
    }

    pub fn mark_suspended(&mut self, waiting_for: Option<String>, metadata: Option<serde_json::Value>) {
        self.status = ExecutionStatus::Suspended;
        self.suspension = Some(Suspension {
            waiting_for,
            metadata,
            suspended_at: Utc::now(),
        });
        self.touch();
    }

    pub fn clear_suspension(&mut self) {
        self.suspension = None;
    }

    pub fn merge_data(&mut self, patch: Option<serde_json::Value>) {
        let Some(patch) = patch else { return };
        match (&mut self.data, patch) {
            (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
                for (k, v) in patch {
                    base.insert(k, v);
                }
            }
            (slot, patch) => *slot = patch,
        }
        self.touch();
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub status: Option<Vec<ExecutionStatus>>,
    pub group_id: Option<String>,
    pub workflow_name: Option<String>,
    pub current_state: Option<String>,
}

impl ExecutionFilter {
    pub fn matches(&self, execution: &WorkflowExecution) -> bool {
        if let Some(statuses) = &self.status {
            if !statuses.contains(&execution.status) {
                return false;
            }
        }
        if let Some(group_id) = &self.group_id {
            if execution.group_id.as_deref() != Some(group_id.as_str()) {
                return false;
            }
        }
        if let Some(workflow_name) = &self.workflow_name {
            if &execution.workflow_name != workflow_name {
                return false;
            }
        }
        if let Some(current_state) = &self.current_state {
            if &execution.current_state != current_state {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeStrategy {
    Retry,
    Skip,
    Goto,
}

impl Default for ResumeStrategy {
    fn default() -> Self {
        ResumeStrategy::Retry
    }
}

/// Caller-supplied options to [`crate::executor::Executor::resume`].
#[derive(Debug, Clone, Default)]
pub struct ResumeOptions {
    pub strategy: ResumeStrategy,
    pub data: Option<serde_json::Value>,
    pub target_state: Option<String>,
    pub output: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_execution_is_running_with_empty_history() {
        let exec = WorkflowExecution::new("wf", "A", serde_json::json!({}), None, None);
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert_eq!(exec.current_state, "A");
        assert!(exec.history.is_empty());
        assert!(exec.outputs.as_map().is_empty());
    }

    #[test]
    fn mark_completed_sets_timestamp_and_clears_suspension() {
        let mut exec = WorkflowExecution::new("wf", "A", serde_json::json!({}), None, None);
        exec.mark_suspended(Some("x".into()), None);
        assert!(exec.suspension.is_some());
        exec.mark_completed();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert!(exec.metadata.completed_at.is_some());
        assert!(exec.suspension.is_none());
    }

    #[test]
    fn merge_data_shallow_merges_objects() {
        let mut exec = WorkflowExecution::new(
            "wf",
            "A",
            serde_json::json!({"a": 1, "b": 2}),
            None,
            None,
        );
        exec.merge_data(Some(serde_json::json!({"b": 3, "c": 4})));
        assert_eq!(exec.data, serde_json::json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn filter_matches_on_all_specified_fields() {
        let exec = WorkflowExecution::new("wf", "A", serde_json::json!({}), None, Some("g1".into()));
        let filter = ExecutionFilter {
            status: Some(vec![ExecutionStatus::Running]),
            group_id: Some("g1".into()),
            workflow_name: Some("wf".into()),
            current_state: Some("A".into()),
        };
        assert!(filter.matches(&exec));

        let mismatched = ExecutionFilter {
            current_state: Some("B".into()),
            ..Default::default()
        };
        assert!(!mismatched.matches(&exec));
    }
}
