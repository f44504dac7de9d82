//! The read/write view handed to state handlers, hooks, and conditions.

use crate::execution::StateTransition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Typed read/write view over a single execution's output map.
///
/// Handlers never see the raw `outputs` field on [`crate::execution::WorkflowExecution`]
/// directly; they read prior outputs (for states that already ran) through
/// this accessor and stage their own output via the `actions` builder passed
/// alongside the context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Outputs(HashMap<String, serde_json::Value>);

impl Outputs {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Returns the output recorded for `state`, if any.
    pub fn get(&self, state: &str) -> Option<&serde_json::Value> {
        self.0.get(state)
    }

    /// Sets the output for `state`. Used both by real transitions and by
    /// virtual-output assignment from conditional transitions.
    pub fn set(&mut self, state: impl Into<String>, value: serde_json::Value) {
        self.0.insert(state.into(), value);
    }

    pub fn contains(&self, state: &str) -> bool {
        self.0.contains_key(state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &HashMap<String, serde_json::Value> {
        &self.0
    }
}

/// Context observed by a state handler, a hook, or a transition condition.
///
/// This is a snapshot: mutating `data` through [`crate::handler::Actions`] does
/// not retroactively change the context a handler already received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub workflow_name: String,
    pub group_id: Option<String>,
    pub current_state: String,
    pub data: serde_json::Value,
    pub outputs: Outputs,
    pub history: Vec<StateTransition>,
    pub metadata: HashMap<String, String>,
    pub attempt: u32,
}
