//! Concurrency Manager: group-scoped admission control.
//!
//! Interprets a workflow's [`ConcurrencyConfig`] and enforces one of three
//! modes (§4.2): SEQUENTIAL serializes a group through a hard lock,
//! THROTTLE caps concurrency by counting active executions in persistence
//! (a "soft" lock), PARALLEL never consults either.

use crate::condition::GroupBy;
use crate::definition::{ConcurrencyConfig, ConcurrencyMode};
use crate::error::{WorkflowError, WorkflowResult};
use crate::lock::LockAdapter;
use crate::persistence::PersistenceAdapter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

fn lock_key(group_id: &str) -> String {
    format!("workflow:group:{group_id}")
}

/// Resolves a `groupId` for a fresh execution from the workflow's
/// concurrency config, per §4.2. Returns `None` when `groupBy` is unset,
/// which disables concurrency control regardless of the declared mode.
pub async fn resolve_group_id(
    concurrency: Option<&ConcurrencyConfig>,
    data: &serde_json::Value,
) -> Option<String> {
    let concurrency = concurrency?;
    resolve_group_by(&concurrency.group_by, data).await
}

async fn resolve_group_by(group_by: &GroupBy, data: &serde_json::Value) -> Option<String> {
    group_by.resolve(data).await
}

pub struct ConcurrencyManager {
    lock: Arc<dyn LockAdapter>,
    persistence: Arc<dyn PersistenceAdapter>,
    lock_ttl: Duration,
}

impl ConcurrencyManager {
    pub fn new(lock: Arc<dyn LockAdapter>, persistence: Arc<dyn PersistenceAdapter>, lock_ttl: Duration) -> Self {
        Self {
            lock,
            persistence,
            lock_ttl,
        }
    }

    /// Attempts to admit `execution_id` into the group identified by
    /// `group_id`. A `None` `group_id` (no `groupBy` configured, or no
    /// concurrency config at all) always admits.
    pub async fn acquire(
        &self,
        workflow_name: &str,
        group_id: Option<&str>,
        concurrency: Option<&ConcurrencyConfig>,
        execution_id: &str,
    ) -> WorkflowResult<()> {
        let (Some(concurrency), Some(group_id)) = (concurrency, group_id) else {
            return Ok(());
        };

        match &concurrency.mode {
            ConcurrencyMode::Sequential => {
                let key = lock_key(group_id);
                if self.lock.acquire(&key, execution_id, self.lock_ttl).await {
                    debug!(key, execution_id, "acquired sequential group lock");
                    Ok(())
                } else {
                    warn!(key, execution_id, "sequential group lock already held");
                    Err(WorkflowError::LockAcquisitionError(key))
                }
            }
            ConcurrencyMode::Parallel => Ok(()),
            ConcurrencyMode::Throttle {
                max_concurrent_after_unlock,
            } => {
                let active = self
                    .persistence
                    .count_running_past_unlock(workflow_name, group_id)
                    .await?;
                if active < *max_concurrent_after_unlock {
                    Ok(())
                } else {
                    let key = lock_key(group_id);
                    warn!(key, active, cap = max_concurrent_after_unlock, "throttle cap reached");
                    Err(WorkflowError::LockAcquisitionError(key))
                }
            }
        }
    }

    /// Called immediately after a state flagged `unlockAfter` succeeds.
    /// Only SEQUENTIAL mode performs a real release here; THROTTLE's
    /// capacity accounting is implicit (it recomputes from persistence on
    /// every `acquire`), and PARALLEL never held anything.
    pub async fn release_after_unlock_state(
        &self,
        group_id: Option<&str>,
        concurrency: Option<&ConcurrencyConfig>,
    ) {
        let (Some(concurrency), Some(group_id)) = (concurrency, group_id) else {
            return;
        };
        if matches!(concurrency.mode, ConcurrencyMode::Sequential) {
            let key = lock_key(group_id);
            self.lock.release(&key).await;
            debug!(key, "released group lock after unlockAfter state");
        }
    }

    /// Called when an execution terminates or suspends, unless the lock
    /// was already released by an `unlockAfter` state.
    pub async fn release(&self, group_id: Option<&str>, concurrency: Option<&ConcurrencyConfig>) {
        let (Some(concurrency), Some(group_id)) = (concurrency, group_id) else {
            return;
        };
        if matches!(concurrency.mode, ConcurrencyMode::Sequential) {
            let key = lock_key(group_id);
            self.lock.release(&key).await;
            debug!(key, "released group lock at execution end");
        }
    }
}
