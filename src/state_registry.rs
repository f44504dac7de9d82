//! State Registry: state-value -> handler lookup.
//!
//! The specification describes this as process-wide, for auto-discovery
//! convenience. Per the design notes, that global-ness is a pragmatic
//! choice the spec explicitly permits scoping per engine instead; this
//! implementation promotes it to engine-owned state (an `Arc`-shared
//! registry constructed once at startup and handed to every executor),
//! which keeps the same published semantics without requiring a process
//! singleton.

use crate::handler::{StateHandler, StateMetadata};
use crate::hooks::StateHooks;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A handler plus the metadata and optional state-scoped hooks attached at
/// registration time.
#[derive(Clone)]
pub struct StateRegistration {
    pub handler: Arc<dyn StateHandler>,
    pub metadata: StateMetadata,
    pub hooks: Option<Arc<dyn StateHooks>>,
}

/// Declares which state values an instance should be auto-registered
/// under, so one handler instance can back many state values.
pub trait StateDeclaration {
    fn state_values(&self) -> Vec<String>;
}

/// Process- or engine-wide map from state value to handler.
#[derive(Clone, Default)]
pub struct StateRegistry {
    handlers: Arc<RwLock<HashMap<String, StateRegistration>>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register(&self, state_value: impl Into<String>, handler: Arc<dyn StateHandler>) {
        self.register_with_metadata(state_value, handler, StateMetadata::default());
    }

    pub fn register_with_metadata(
        &self,
        state_value: impl Into<String>,
        handler: Arc<dyn StateHandler>,
        metadata: StateMetadata,
    ) {
        self.register_with_hooks(state_value, handler, metadata, None);
    }

    pub fn register_with_hooks(
        &self,
        state_value: impl Into<String>,
        handler: Arc<dyn StateHandler>,
        metadata: StateMetadata,
        hooks: Option<Arc<dyn StateHooks>>,
    ) {
        let mut handlers = self.handlers.write().unwrap();
        handlers.insert(
            state_value.into(),
            StateRegistration {
                handler,
                metadata,
                hooks,
            },
        );
    }

    /// Registers `handler` under every state value its declaration names.
    pub fn auto_register<H>(&self, handler: Arc<H>)
    where
        H: StateHandler + StateDeclaration + 'static,
    {
        for state_value in handler.state_values() {
            let h: Arc<dyn StateHandler> = handler.clone();
            self.register(state_value, h);
        }
    }

    pub fn get(&self, state_value: &str) -> Option<StateRegistration> {
        self.handlers.read().unwrap().get(state_value).cloned()
    }

    /// Returns the subset of registrations whose state value belongs to
    /// `enumeration`, isolating workflows that happen to share registry
    /// space.
    pub fn discover_states(&self, enumeration: &[String]) -> HashMap<String, StateRegistration> {
        let handlers = self.handlers.read().unwrap();
        enumeration
            .iter()
            .filter_map(|state| handlers.get(state).map(|reg| (state.clone(), reg.clone())))
            .collect()
    }
}
