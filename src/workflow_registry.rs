//! Workflow Registry: per-engine map from workflow name to compiled
//! [`WorkflowDefinition`].

use crate::definition::WorkflowDefinition;
use crate::error::{WorkflowError, WorkflowResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    definitions: Arc<RwLock<HashMap<String, Arc<WorkflowDefinition>>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self {
            definitions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register(&self, definition: WorkflowDefinition) -> WorkflowResult<()> {
        definition.validate()?;
        let mut definitions = self.definitions.write().unwrap();
        definitions.insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    pub fn get(&self, name: &str) -> WorkflowResult<Arc<WorkflowDefinition>> {
        self.definitions
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownWorkflow(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.read().unwrap().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_get_roundtrip() {
        let registry = WorkflowRegistry::new();
        let def = WorkflowDefinition::new("wf", vec!["A", "B"], "A");
        registry.register(def).unwrap();

        let fetched = registry.get("wf").unwrap();
        assert_eq!(fetched.name, "wf");
    }

    #[test]
    fn get_unknown_workflow_errors() {
        let registry = WorkflowRegistry::new();
        assert!(matches!(registry.get("missing"), Err(WorkflowError::UnknownWorkflow(_))));
    }

    #[test]
    fn register_rejects_invalid_definition() {
        let registry = WorkflowRegistry::new();
        let def = WorkflowDefinition::new("bad", vec![], "A");
        assert!(registry.register(def).is_err());
        assert!(!registry.contains("bad"));
    }
}
