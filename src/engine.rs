//! Engine facade (§4.4): the public entry point wiring a [`WorkflowRegistry`],
//! a [`StateRegistry`], shared persistence/lock adapters, and one
//! [`Executor`] per workflow name.
//!
//! Generalizes the teacher's `WorkflowEngineBuilder`/`WorkflowEngine` pair:
//! same builder shape, same `execute`/`version`-style facade methods, but
//! fronting the state-machine executor instead of the DAG scheduler.

use crate::concurrency::ConcurrencyManager;
use crate::definition::WorkflowDefinition;
use crate::error::{WorkflowError, WorkflowResult};
use crate::execution::{ExecutionFilter, ResumeOptions, WorkflowExecution};
use crate::executor::{ExecuteOptions, Executor};
use crate::handler::{StateHandler, StateMetadata};
use crate::hooks::StateHooks;
use crate::lock::{InMemoryLockAdapter, LockAdapter};
use crate::persistence::{InMemoryPersistence, PersistenceAdapter};
use crate::state_registry::StateRegistry;
use crate::workflow_registry::WorkflowRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// The handful of engine-wide knobs that are not a property of any single
/// workflow. History append batching is deliberately not a field here:
/// history writes are always synchronous, never configurable.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL applied to SEQUENTIAL-mode group locks.
    pub lock_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(300),
        }
    }
}

/// Builder for a [`WorkflowEngine`]. Defaults to the in-memory persistence
/// and lock adapters, suitable for tests and single-process deployments; a
/// production build swaps in adapters backed by durable storage.
pub struct WorkflowEngineBuilder {
    persistence: Option<Arc<dyn PersistenceAdapter>>,
    lock: Option<Arc<dyn LockAdapter>>,
    config: EngineConfig,
}

impl WorkflowEngineBuilder {
    pub fn new() -> Self {
        Self {
            persistence: None,
            lock: None,
            config: EngineConfig::default(),
        }
    }

    /// Supplies a persistence adapter; defaults to [`InMemoryPersistence`].
    pub fn persistence(mut self, persistence: Arc<dyn PersistenceAdapter>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Supplies a lock adapter; defaults to [`InMemoryLockAdapter`].
    pub fn lock(mut self, lock: Arc<dyn LockAdapter>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// TTL applied to SEQUENTIAL-mode group locks. Default 300s.
    pub fn lock_ttl(mut self, ttl: Duration) -> Self {
        self.config.lock_ttl = ttl;
        self
    }

    /// Replaces the whole engine config at once.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> WorkflowEngine {
        let persistence = self.persistence.unwrap_or_else(|| Arc::new(InMemoryPersistence::new()));
        let lock = self.lock.unwrap_or_else(|| Arc::new(InMemoryLockAdapter::new()));
        let concurrency = Arc::new(ConcurrencyManager::new(lock, persistence.clone(), self.config.lock_ttl));

        WorkflowEngine {
            workflows: WorkflowRegistry::new(),
            states: StateRegistry::new(),
            persistence,
            concurrency,
            executors: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for WorkflowEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The engine facade: one instance fronts every registered workflow.
///
/// An [`Executor`] is built lazily per workflow name on its first
/// `execute`/`resume` call and cached thereafter, rather than built eagerly
/// at `register_workflow` time — this mirrors the specification's
/// "auto-registers on first use" wording for the executor layer while
/// keeping workflow *definition* registration (which must validate
/// immediately) synchronous and eager.
pub struct WorkflowEngine {
    workflows: WorkflowRegistry,
    states: StateRegistry,
    persistence: Arc<dyn PersistenceAdapter>,
    concurrency: Arc<ConcurrencyManager>,
    executors: RwLock<HashMap<String, Arc<Executor>>>,
}

impl WorkflowEngine {
    pub fn new() -> Self {
        WorkflowEngineBuilder::new().build()
    }

    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::new()
    }

    /// Validates and registers a workflow definition.
    pub fn register_workflow(&self, definition: WorkflowDefinition) -> WorkflowResult<()> {
        let name = definition.name.clone();
        self.workflows.register(definition)?;
        info!(workflow = %name, "registered workflow definition");
        Ok(())
    }

    /// Registers a state handler under `state_value`, with no metadata or
    /// state-scoped hooks.
    pub fn register_state(&self, state_value: impl Into<String>, handler: Arc<dyn StateHandler>) {
        self.states.register(state_value, handler);
    }

    /// Registers a state handler with timeout/retry/delay/unlock metadata.
    pub fn register_state_with_metadata(
        &self,
        state_value: impl Into<String>,
        handler: Arc<dyn StateHandler>,
        metadata: StateMetadata,
    ) {
        self.states.register_with_metadata(state_value, handler, metadata);
    }

    /// Registers a state handler with metadata and state-scoped hooks.
    pub fn register_state_with_hooks(
        &self,
        state_value: impl Into<String>,
        handler: Arc<dyn StateHandler>,
        metadata: StateMetadata,
        hooks: Option<Arc<dyn StateHooks>>,
    ) {
        self.states.register_with_hooks(state_value, handler, metadata, hooks);
    }

    pub fn state_registry(&self) -> &StateRegistry {
        &self.states
    }

    pub fn persistence(&self) -> &Arc<dyn PersistenceAdapter> {
        &self.persistence
    }

    /// Starts a fresh execution of `workflow_name`.
    pub async fn execute(&self, workflow_name: &str, options: ExecuteOptions) -> WorkflowResult<WorkflowExecution> {
        let executor = self.executor_for(workflow_name).await?;
        executor.execute(options).await
    }

    /// Resumes a SUSPENDED execution. The owning workflow's executor is
    /// discovered from the persisted record, so callers never need to
    /// track which workflow an execution id belongs to.
    pub async fn resume(&self, execution_id: &str, options: ResumeOptions) -> WorkflowResult<WorkflowExecution> {
        let existing = self
            .persistence
            .load(execution_id)
            .await?
            .ok_or_else(|| WorkflowError::ExecutionNotFound(execution_id.to_string()))?;
        let executor = self.executor_for(&existing.workflow_name).await?;
        executor.resume(execution_id, options).await
    }

    /// Delegates to persistence. Returns an empty list if none match,
    /// never an error, per §4.4.
    pub async fn find_executions(&self, filter: &ExecutionFilter) -> WorkflowResult<Vec<WorkflowExecution>> {
        self.persistence.find(filter).await
    }

    /// Delegates to persistence. Returns `None` rather than erroring when
    /// the id is unknown, per §4.4.
    pub async fn get_execution(&self, id: &str) -> WorkflowResult<Option<WorkflowExecution>> {
        self.persistence.load(id).await
    }

    async fn executor_for(&self, workflow_name: &str) -> WorkflowResult<Arc<Executor>> {
        if let Some(executor) = self.executors.read().await.get(workflow_name) {
            return Ok(executor.clone());
        }

        let definition = self.workflows.get(workflow_name)?;
        let mut executors = self.executors.write().await;
        let executor = executors
            .entry(workflow_name.to_string())
            .or_insert_with(|| {
                Arc::new(Executor::new(
                    definition,
                    self.states.clone(),
                    self.persistence.clone(),
                    self.concurrency.clone(),
                ))
            })
            .clone();
        Ok(executor)
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}
