//! Compiled workflow definitions: the non-persistent configuration built
//! once at registration time.
//!
//! This replaces the teacher's DAG-of-tasks model (`dag.rs`, task nodes
//! joined by dependency edges) with a typed finite-state machine: an
//! enumeration of states in declaration order, an initial state, and
//! explicit/conditional transition tables. The builder shape — a plain
//! struct built up with `with_*` methods and validated once via
//! `validate()` — is kept from the teacher's `WorkflowDag`.

use crate::condition::{Condition, GroupBy, VirtualOutput};
use crate::error::{WorkflowError, WorkflowResult};
use crate::hooks::{ErrorHandler, WorkflowHooks};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One or more `from` states an explicit transition applies to.
#[derive(Clone)]
pub enum StateSet {
    One(String),
    Many(Vec<String>),
}

impl StateSet {
    pub fn contains(&self, state: &str) -> bool {
        match self {
            StateSet::One(s) => s == state,
            StateSet::Many(states) => states.iter().any(|s| s == state),
        }
    }
}

impl From<&str> for StateSet {
    fn from(value: &str) -> Self {
        StateSet::One(value.to_string())
    }
}

impl From<Vec<&str>> for StateSet {
    fn from(value: Vec<&str>) -> Self {
        StateSet::Many(value.into_iter().map(|s| s.to_string()).collect())
    }
}

/// An explicit `from -> to` transition, optionally gated by a condition.
#[derive(Clone)]
pub struct ExplicitTransition {
    pub from: StateSet,
    pub to: String,
    pub condition: Option<Arc<dyn Condition>>,
}

impl ExplicitTransition {
    pub fn new(from: impl Into<StateSet>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Arc<dyn Condition>) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// One branch of a conditional transition: predicate, target, and the
/// virtual outputs to assign if this branch fires.
#[derive(Clone)]
pub struct ConditionalBranch {
    pub condition: Arc<dyn Condition>,
    pub to: String,
    pub virtual_outputs: Option<HashMap<String, VirtualOutput>>,
}

/// A conditional transition table rooted at one `from` state: branches are
/// evaluated in declared order, first true wins; `default` covers the case
/// where no branch fires.
#[derive(Clone)]
pub struct ConditionalTransition {
    pub from: String,
    pub branches: Vec<ConditionalBranch>,
    pub default: Option<String>,
    pub default_virtual_outputs: Option<HashMap<String, VirtualOutput>>,
}

impl ConditionalTransition {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            branches: Vec::new(),
            default: None,
            default_virtual_outputs: None,
        }
    }

    pub fn branch(
        mut self,
        condition: Arc<dyn Condition>,
        to: impl Into<String>,
        virtual_outputs: Option<HashMap<String, VirtualOutput>>,
    ) -> Self {
        self.branches.push(ConditionalBranch {
            condition,
            to: to.into(),
            virtual_outputs,
        });
        self
    }

    pub fn with_default(
        mut self,
        to: impl Into<String>,
        virtual_outputs: Option<HashMap<String, VirtualOutput>>,
    ) -> Self {
        self.default = Some(to.into());
        self.default_virtual_outputs = virtual_outputs;
        self
    }
}

/// Admission-control mode applied to a group of executions (see the
/// concurrency manager, §4.2).
#[derive(Clone)]
pub enum ConcurrencyMode {
    Sequential,
    Parallel,
    Throttle { max_concurrent_after_unlock: usize },
}

#[derive(Clone)]
pub struct ConcurrencyConfig {
    pub group_by: GroupBy,
    pub mode: ConcurrencyMode,
}

/// A compiled workflow: states in declaration order, the initial state, the
/// transition tables, optional concurrency config, optional error handler,
/// and optional lifecycle hooks.
#[derive(Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    states: Vec<String>,
    initial_state: String,
    transitions: Vec<ExplicitTransition>,
    conditional_transitions: Vec<ConditionalTransition>,
    pub concurrency: Option<ConcurrencyConfig>,
    pub error_handler: Option<Arc<dyn ErrorHandler>>,
    pub hooks: Option<Arc<dyn WorkflowHooks>>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, states: Vec<&str>, initial_state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: states.into_iter().map(|s| s.to_string()).collect(),
            initial_state: initial_state.into(),
            transitions: Vec::new(),
            conditional_transitions: Vec::new(),
            concurrency: None,
            error_handler: None,
            hooks: None,
        }
    }

    pub fn with_transition(mut self, transition: ExplicitTransition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_conditional_transition(mut self, transition: ConditionalTransition) -> Self {
        self.conditional_transitions.push(transition);
        self
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyConfig) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn WorkflowHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    pub fn conditional_transitions_from(&self, state: &str) -> Option<&ConditionalTransition> {
        self.conditional_transitions.iter().find(|t| t.from == state)
    }

    /// Explicit transitions declared with `from` covering `state`, in
    /// declaration order.
    pub fn explicit_transitions_from(&self, state: &str) -> Vec<&ExplicitTransition> {
        self.transitions
            .iter()
            .filter(|t| t.from.contains(state))
            .collect()
    }

    pub fn has_any_transition_from(&self, state: &str) -> bool {
        self.conditional_transitions_from(state).is_some() || !self.explicit_transitions_from(state).is_empty()
    }

    /// The next state in enumeration order after `state`, if any.
    pub fn next_in_enumeration(&self, state: &str) -> Option<&str> {
        let idx = self.states.iter().position(|s| s == state)?;
        self.states.get(idx + 1).map(|s| s.as_str())
    }

    pub fn is_last_in_enumeration(&self, state: &str) -> bool {
        self.states.last().map(|s| s == state).unwrap_or(false)
    }

    /// Validates structural integrity: at least one state, the initial
    /// state is declared, and every transition references declared states.
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.states.is_empty() {
            return Err(WorkflowError::Internal(format!(
                "workflow {} has no declared states",
                self.name
            )));
        }

        let declared: HashSet<&str> = self.states.iter().map(|s| s.as_str()).collect();

        if !declared.contains(self.initial_state.as_str()) {
            return Err(WorkflowError::Internal(format!(
                "workflow {}: initial state {} is not a declared state",
                self.name, self.initial_state
            )));
        }

        for transition in &self.transitions {
            if !declared.contains(transition.to.as_str()) {
                return Err(WorkflowError::Internal(format!(
                    "workflow {}: transition target {} is not a declared state",
                    self.name, transition.to
                )));
            }
        }

        for conditional in &self.conditional_transitions {
            if !declared.contains(conditional.from.as_str()) {
                return Err(WorkflowError::Internal(format!(
                    "workflow {}: conditional transition from {} is not a declared state",
                    self.name, conditional.from
                )));
            }
            for branch in &conditional.branches {
                if !declared.contains(branch.to.as_str()) {
                    return Err(WorkflowError::Internal(format!(
                        "workflow {}: conditional transition target {} is not a declared state",
                        self.name, branch.to
                    )));
                }
            }
            if let Some(default) = &conditional.default {
                if !declared.contains(default.as_str()) {
                    return Err(WorkflowError::Internal(format!(
                        "workflow {}: conditional default target {} is not a declared state",
                        self.name, default
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_workflow_with_no_states() {
        let def = WorkflowDefinition::new("empty", vec![], "A");
        assert!(def.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_initial_state() {
        let def = WorkflowDefinition::new("wf", vec!["A", "B"], "C");
        assert!(def.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_definition() {
        let def = WorkflowDefinition::new("wf", vec!["A", "B", "C"], "A");
        assert!(def.validate().is_ok());
    }

    #[test]
    fn enumeration_order_fallthrough() {
        let def = WorkflowDefinition::new("wf", vec!["A", "B", "C"], "A");
        assert_eq!(def.next_in_enumeration("A"), Some("B"));
        assert_eq!(def.next_in_enumeration("C"), None);
        assert!(def.is_last_in_enumeration("C"));
    }

    #[test]
    fn explicit_transitions_filtered_by_from_state() {
        let def = WorkflowDefinition::new("wf", vec!["A", "B", "C"], "A")
            .with_transition(ExplicitTransition::new("A", "C"));
        assert_eq!(def.explicit_transitions_from("A").len(), 1);
        assert!(def.explicit_transitions_from("B").is_empty());
    }
}
