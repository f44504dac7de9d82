//! # Durable Workflow Engine
//!
//! A state-machine workflow engine: workflows are compiled definitions of
//! states and transitions, driven one state at a time by an [`Executor`],
//! with pluggable persistence and distributed locking underneath.
//!
//! ## Features
//!
//! - **State Machine Execution**: states, explicit transitions, and
//!   conditional transition tables with virtual outputs
//! - **Concurrency Admission Control**: sequential, parallel, and
//!   throttled group-scoped execution
//! - **Retry Policies**: fixed, linear, and exponential backoff per state
//! - **Lifecycle Hooks**: workflow- and state-scoped hooks plus a
//!   dispatchable error handler with seven recovery decisions
//! - **Suspend/Resume**: durable suspension points with retry/skip/goto
//!   resume strategies
//! - **Pluggable Persistence and Locking**: swap in durable adapters behind
//!   the same traits the in-memory reference implementations satisfy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use durable_workflow::prelude::*;
//! use std::sync::Arc;
//!
//! struct GreetHandler;
//!
//! #[async_trait::async_trait]
//! impl StateHandler for GreetHandler {
//!     async fn execute(&self, _ctx: ExecutionContext, actions: &Actions) -> WorkflowResult<()> {
//!         actions.next(None, Some(serde_json::json!({"greeted": true})));
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> WorkflowResult<()> {
//!     let engine = WorkflowEngine::new();
//!     engine.register_state("GREET", Arc::new(GreetHandler));
//!     engine.register_workflow(WorkflowDefinition::new("greeting", vec!["GREET"], "GREET"))?;
//!
//!     let execution = engine
//!         .execute(
//!             "greeting",
//!             ExecuteOptions {
//!                 data: serde_json::json!({}),
//!                 execution_id: None,
//!             },
//!         )
//!         .await?;
//!
//!     assert_eq!(execution.status, ExecutionStatus::Completed);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Definition**: compiled workflow shape — states, transitions,
//!   concurrency config, error handler, hooks
//! - **State Registry**: state value → handler (+ metadata, + state hooks)
//! - **Workflow Registry**: workflow name → compiled definition
//! - **Executor**: drives one workflow's executions through the state
//!   machine, retry loop, and error-handler dispatch
//! - **Concurrency Manager**: group-scoped admission control
//! - **Persistence / Lock Adapters**: pluggable durability and distributed
//!   locking, each with an in-memory reference implementation
//! - **Engine**: facade tying the above together, one [`Executor`] built
//!   lazily per workflow name

pub mod concurrency;
pub mod condition;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod execution;
pub mod executor;
pub mod handler;
pub mod hooks;
pub mod lock;
pub mod logger;
pub mod persistence;
pub mod plugin;
pub mod retry;
pub mod state_registry;
pub mod workflow_registry;

pub use concurrency::ConcurrencyManager;
pub use definition::{
    ConcurrencyConfig, ConcurrencyMode, ConditionalBranch, ConditionalTransition, ExplicitTransition, StateSet,
    WorkflowDefinition,
};
pub use engine::{EngineConfig, WorkflowEngine, WorkflowEngineBuilder};
pub use error::{WorkflowError, WorkflowResult};
pub use execution::{
    ExecutionFilter, ExecutionMetadata, ExecutionStatus, ResumeOptions, ResumeStrategy, StateTransition, Suspension,
    TransitionStatus, WorkflowExecution,
};
pub use executor::{ExecuteOptions, Executor};
pub use handler::{Actions, StateHandler, StateMetadata};
pub use hooks::{ErrorContext, ErrorDecision, ErrorHandler, Phase, StateHooks, WorkflowHooks};
pub use lock::{InMemoryLockAdapter, LockAdapter};
pub use logger::{LoggerAdapter, TracingLoggerAdapter};
pub use persistence::{InMemoryPersistence, PersistenceAdapter};
pub use plugin::PluginWrapper;
pub use retry::{RetryPolicy, RetryStrategy};
pub use state_registry::{StateDeclaration, StateRegistration, StateRegistry};
pub use workflow_registry::WorkflowRegistry;

/// Current version of the workflow engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::concurrency::ConcurrencyManager;
    pub use crate::condition::{Condition, GroupBy, SyncCondition, VirtualOutput};
    pub use crate::context::{ExecutionContext, Outputs};
    pub use crate::definition::{
        ConcurrencyConfig, ConcurrencyMode, ConditionalTransition, ExplicitTransition, WorkflowDefinition,
    };
    pub use crate::engine::{WorkflowEngine, WorkflowEngineBuilder};
    pub use crate::error::{WorkflowError, WorkflowResult};
    pub use crate::execution::{
        ExecutionFilter, ExecutionStatus, ResumeOptions, ResumeStrategy, WorkflowExecution,
    };
    pub use crate::executor::{ExecuteOptions, Executor};
    pub use crate::handler::{Actions, StateHandler, StateMetadata};
    pub use crate::hooks::{ErrorContext, ErrorDecision, ErrorHandler, StateHooks, WorkflowHooks};
    pub use crate::lock::LockAdapter;
    pub use crate::logger::LoggerAdapter;
    pub use crate::persistence::PersistenceAdapter;
    pub use crate::plugin::PluginWrapper;
    pub use crate::retry::{RetryPolicy, RetryStrategy};
    pub use crate::state_registry::StateRegistry;
}
