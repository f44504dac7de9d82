//! The plugin wrapper contract (§6): engine-wide extension points distinct
//! from a single workflow's lifecycle hooks.
//!
//! Unlike [`crate::hooks::WorkflowHooks`] (scoped to one workflow
//! definition), a plugin observes every execution the engine drives and may
//! rewrite the context handed to subsequent hooks and handlers via
//! `extend_context`.

use crate::context::ExecutionContext;
use crate::error::WorkflowError;
use async_trait::async_trait;

/// An engine-wide extension. All methods default to no-ops; `extend_context`
/// defaults to returning the context unchanged.
#[async_trait]
pub trait PluginWrapper: Send + Sync {
    async fn on_init(&self) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn before_execute(&self, _ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn after_execute(&self, _ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn on_error(&self, _ctx: &ExecutionContext, _error: &WorkflowError) {}

    /// May replace the context observed by subsequent hooks and handlers.
    async fn extend_context(&self, ctx: ExecutionContext) -> ExecutionContext {
        ctx
    }
}
