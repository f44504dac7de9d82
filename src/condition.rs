//! Predicates and derivations evaluated against a running execution:
//! transition conditions, virtual-output values, and group-key derivation.
//!
//! All three are modeled as small async traits (mirroring
//! [`crate::handler::StateHandler`]) so that implementations backed by I/O
//! (a feature flag lookup, a remote config check) can yield exactly like the
//! specification's suspension-point list allows.

use crate::context::ExecutionContext;
use async_trait::async_trait;
use std::sync::Arc;

/// A predicate evaluated against the current execution context, used by
/// both conditional and explicit transitions.
#[async_trait]
pub trait Condition: Send + Sync {
    async fn evaluate(&self, ctx: &ExecutionContext) -> bool;
}

/// Wraps a plain synchronous closure as a [`Condition`].
pub struct SyncCondition<F>(F);

impl<F> SyncCondition<F>
where
    F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
{
    pub fn new(f: F) -> Arc<dyn Condition> {
        Arc::new(Self(f))
    }
}

#[async_trait]
impl<F> Condition for SyncCondition<F>
where
    F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
{
    async fn evaluate(&self, ctx: &ExecutionContext) -> bool {
        (self.0)(ctx)
    }
}

/// A value assigned into `outputs` for a state that was *not* executed,
/// written by a firing conditional transition's `virtualOutputs` mapping.
#[derive(Clone)]
pub enum VirtualOutput {
    /// A literal value, written as-is.
    Literal(serde_json::Value),
    /// A callable resolved against the context at the moment the
    /// conditional transition fires; may perform async work.
    Callable(Arc<dyn VirtualOutputFn>),
}

impl VirtualOutput {
    pub async fn resolve(&self, ctx: &ExecutionContext) -> serde_json::Value {
        match self {
            VirtualOutput::Literal(v) => v.clone(),
            VirtualOutput::Callable(f) => f.resolve(ctx).await,
        }
    }

    pub fn literal(value: serde_json::Value) -> Self {
        VirtualOutput::Literal(value)
    }
}

#[async_trait]
pub trait VirtualOutputFn: Send + Sync {
    async fn resolve(&self, ctx: &ExecutionContext) -> serde_json::Value;
}

/// Derives a `groupId` from the execution's `data`. Either a plain property
/// name (`GroupBy::Field`) or a derivation function (`GroupBy::Derive`).
#[derive(Clone)]
pub enum GroupBy {
    Field(String),
    Derive(Arc<dyn GroupByFn>),
}

#[async_trait]
pub trait GroupByFn: Send + Sync {
    async fn derive(&self, data: &serde_json::Value) -> Option<String>;
}

impl GroupBy {
    pub async fn resolve(&self, data: &serde_json::Value) -> Option<String> {
        match self {
            GroupBy::Field(name) => data.get(name).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            GroupBy::Derive(f) => f.derive(data).await,
        }
    }
}
