//! The Executor: the per-workflow state-machine driver.
//!
//! Generalizes the teacher's `WorkflowExecutor` (a DAG-of-tasks scheduler)
//! into a single-state-at-a-time driver over a [`WorkflowDefinition`]'s
//! transition tables. The shape survives: `execute`/`resume` as the public
//! entry points, a retry loop wrapping a timeout-bounded handler call, and
//! `tracing` at every state change, same as `execute_task` did for tasks.

use crate::concurrency::{resolve_group_id, ConcurrencyManager};
use crate::condition::VirtualOutput;
use crate::context::ExecutionContext;
use crate::definition::WorkflowDefinition;
use crate::error::{WorkflowError, WorkflowResult};
use crate::execution::{
    ExecutionStatus, ResumeOptions, ResumeStrategy, StateTransition, TransitionStatus, WorkflowExecution,
};
use crate::handler::{Actions, StagedAction};
use crate::hooks::{ErrorContext, ErrorDecision, Phase};
use crate::persistence::PersistenceAdapter;
use crate::state_registry::{StateRegistration, StateRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Inputs to [`Executor::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub data: serde_json::Value,
    pub execution_id: Option<String>,
}

/// What to do next after a state's handler invocation (including its
/// retries) concludes, and after dispatching any resulting error to the
/// workflow's error handler.
enum StepOutcome {
    /// The handler returned (eventually) without error; here is the action
    /// it staged, ready for §4.1.2 interpretation.
    Action(StagedAction),
    /// `CONTINUE`: swallow the error, re-enter the same state.
    Retry,
    /// `EXIT`: stop the loop, leave status untouched.
    Break,
    /// `TRANSITION_TO`: the error handler already redirected the execution;
    /// history and `current_state` were updated in place.
    Recovered,
}

/// The successor state chosen by §4.1.4, or a signal that the workflow has
/// no further state to run.
enum NextResolution {
    State(String, Option<HashMap<String, VirtualOutput>>),
    Complete,
}

/// Drives every execution of one compiled [`WorkflowDefinition`].
///
/// One `Executor` is built per workflow name and reused across every
/// `execute`/`resume` call for that workflow, mirroring the teacher's
/// single long-lived `WorkflowExecutor` per process.
pub struct Executor {
    definition: Arc<WorkflowDefinition>,
    registry: StateRegistry,
    persistence: Arc<dyn PersistenceAdapter>,
    concurrency: Arc<ConcurrencyManager>,
}

impl Executor {
    pub fn new(
        definition: Arc<WorkflowDefinition>,
        registry: StateRegistry,
        persistence: Arc<dyn PersistenceAdapter>,
        concurrency: Arc<ConcurrencyManager>,
    ) -> Self {
        Self {
            definition,
            registry,
            persistence,
            concurrency,
        }
    }

    /// Starts a fresh execution and drives it to a terminal status.
    pub async fn execute(&self, options: ExecuteOptions) -> WorkflowResult<WorkflowExecution> {
        let group_id = resolve_group_id(self.definition.concurrency.as_ref(), &options.data).await;
        let execution_id = options.execution_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        self.concurrency
            .acquire(
                &self.definition.name,
                group_id.as_deref(),
                self.definition.concurrency.as_ref(),
                &execution_id,
            )
            .await?;

        let mut execution = WorkflowExecution::new(
            self.definition.name.clone(),
            self.definition.initial_state().to_string(),
            options.data,
            Some(execution_id),
            group_id,
        );

        info!(
            execution_id = %execution.id,
            workflow = %self.definition.name,
            "starting workflow execution"
        );
        self.persistence.save(&execution).await?;

        self.drive(&mut execution, true).await?;
        Ok(execution)
    }

    /// Continues a SUSPENDED execution.
    pub async fn resume(&self, execution_id: &str, options: ResumeOptions) -> WorkflowResult<WorkflowExecution> {
        let mut execution = self
            .persistence
            .load(execution_id)
            .await?
            .ok_or_else(|| WorkflowError::ExecutionNotFound(execution_id.to_string()))?;

        if execution.status != ExecutionStatus::Suspended {
            return Err(WorkflowError::NotSuspended(execution_id.to_string()));
        }

        let entered_state = execution.current_state.clone();
        execution.merge_data(options.data);
        execution.clear_suspension();
        execution.status = ExecutionStatus::Running;

        if let Err(e) = self
            .concurrency
            .acquire(
                &self.definition.name,
                execution.group_id.as_deref(),
                self.definition.concurrency.as_ref(),
                &execution.id,
            )
            .await
        {
            if !self.passed_unlock_after(&execution) {
                return Err(e);
            }
            debug!(execution_id = %execution.id, "resume proceeding without lock: already past unlockAfter state");
        }

        match options.strategy {
            ResumeStrategy::Retry => {}
            ResumeStrategy::Skip => {
                let ctx = self.snapshot(&execution, 0);
                match self.resolve_next(&entered_state, &ctx).await? {
                    NextResolution::State(target, virtual_outputs) => {
                        if let Some(virtual_outputs) = virtual_outputs {
                            for (key, vo) in virtual_outputs {
                                let value = vo.resolve(&ctx).await;
                                execution.outputs.set(key, value);
                            }
                        }
                        if let Some(output) = options.output.clone() {
                            execution.outputs.set(entered_state.clone(), output);
                        }
                        let mut transition = StateTransition::new(&entered_state, &target, TransitionStatus::Success);
                        transition.finish();
                        transition.duration_ms = Some(0);
                        execution.append_transition(transition);
                        execution.current_state = target;
                    }
                    NextResolution::Complete => execution.mark_completed(),
                }
            }
            ResumeStrategy::Goto => {
                let target = options.target_state.clone().ok_or(WorkflowError::MissingTargetState)?;
                if !self.definition.states().iter().any(|s| s == &target) {
                    return Err(WorkflowError::InvalidTransition {
                        from: entered_state,
                        to: target,
                    });
                }
                if let Some(output) = options.output.clone() {
                    execution.outputs.set(entered_state.clone(), output);
                }
                let mut transition = StateTransition::new(&entered_state, &target, TransitionStatus::Success);
                transition.finish();
                execution.append_transition(transition);
                execution.current_state = target;
            }
        }

        self.persistence.save(&execution).await?;
        self.drive(&mut execution, false).await?;
        Ok(execution)
    }

    /// The execution loop, §4.1.1. `fresh_start` gates the one-time
    /// `onStart` hook, which a resumed execution has already fired.
    async fn drive(&self, execution: &mut WorkflowExecution, fresh_start: bool) -> WorkflowResult<()> {
        let mut released = false;

        if fresh_start {
            if let Some(hooks) = self.definition.hooks.clone() {
                let ctx = self.snapshot(execution, 0);
                if let Err(e) = hooks.on_start(&ctx).await {
                    let state = execution.current_state.clone();
                    match self
                        .dispatch_error(execution, Phase::WorkflowStart, &state, e, None, None)
                        .await
                    {
                        Ok(StepOutcome::Break) => return Ok(()),
                        Ok(_) => {}
                        Err(e) => {
                            self.release_if_needed(execution, &mut released).await;
                            return Err(e);
                        }
                    }
                }
            }
        }

        while execution.status == ExecutionStatus::Running {
            let entered_state = execution.current_state.clone();

            if let Some(hooks) = self.definition.hooks.clone() {
                let ctx = self.snapshot(execution, 0);
                if let Err(e) = hooks.before_state(&ctx).await {
                    match self
                        .dispatch_error(execution, Phase::BeforeState, &entered_state, e, None, None)
                        .await
                    {
                        Ok(StepOutcome::Break) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            self.release_if_needed(execution, &mut released).await;
                            return Err(e);
                        }
                    }
                }
            }

            let registration = match self.registry.get(&entered_state) {
                Some(r) => r,
                None => {
                    self.release_if_needed(execution, &mut released).await;
                    return Err(WorkflowError::UnknownState(entered_state));
                }
            };

            if let Some(state_hooks) = registration.hooks.clone() {
                let ctx = self.snapshot(execution, 0);
                if let Err(e) = state_hooks.on_start(&ctx).await {
                    match self
                        .dispatch_error(execution, Phase::BeforeState, &entered_state, e, None, None)
                        .await
                    {
                        Ok(StepOutcome::Break) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            self.release_if_needed(execution, &mut released).await;
                            return Err(e);
                        }
                    }
                }
            }

            let step_result = self.run_state(execution, &entered_state, &registration).await;

            // onFinish observes every concluded invocation of this state,
            // success or failure, before the loop decides what happens next.
            if let Some(state_hooks) = registration.hooks.clone() {
                let ctx = self.snapshot(execution, 0);
                let _ = state_hooks.on_finish(&ctx).await;
            }

            let step = match step_result {
                Ok(step) => step,
                Err(e) => {
                    self.release_if_needed(execution, &mut released).await;
                    return Err(e);
                }
            };

            match step {
                StepOutcome::Break => break,
                StepOutcome::Retry | StepOutcome::Recovered => continue,
                StepOutcome::Action(action) => {
                    if let Err(e) = self.interpret_action(execution, &entered_state, action).await {
                        self.release_if_needed(execution, &mut released).await;
                        return Err(e);
                    }

                    if let Some(state_hooks) = registration.hooks.clone() {
                        let ctx = self.snapshot(execution, 0);
                        let _ = state_hooks.on_success(&ctx).await;
                    }
                }
            }

            if registration.metadata.unlock_after && !released {
                self.concurrency
                    .release_after_unlock_state(execution.group_id.as_deref(), self.definition.concurrency.as_ref())
                    .await;
                released = true;
            }

            if let Some(hooks) = self.definition.hooks.clone() {
                let ctx = self.snapshot(execution, 0);
                if let Err(e) = hooks.after_state(&ctx).await {
                    match self
                        .dispatch_error(execution, Phase::AfterState, &entered_state, e, None, None)
                        .await
                    {
                        Ok(StepOutcome::Break) => break,
                        Ok(_) => {}
                        Err(e) => {
                            self.release_if_needed(execution, &mut released).await;
                            return Err(e);
                        }
                    }
                }
            }
        }

        match execution.status {
            ExecutionStatus::Completed => {
                if let Some(hooks) = self.definition.hooks.clone() {
                    let ctx = self.snapshot(execution, 0);
                    if let Err(e) = hooks.on_complete(&ctx).await {
                        let state = execution.current_state.clone();
                        if let Err(e) = self
                            .dispatch_error(execution, Phase::WorkflowComplete, &state, e, None, None)
                            .await
                        {
                            self.release_if_needed(execution, &mut released).await;
                            return Err(e);
                        }
                    }
                }
            }
            ExecutionStatus::Failed => {
                if let Some(hooks) = self.definition.hooks.clone() {
                    let ctx = self.snapshot(execution, 0);
                    hooks.on_error(&ctx, &WorkflowError::Internal("execution failed".into())).await;
                }
            }
            _ => {}
        }

        self.persistence.save(execution).await?;
        self.release_if_needed(execution, &mut released).await;
        Ok(())
    }

    async fn release_if_needed(&self, execution: &WorkflowExecution, released: &mut bool) {
        if !*released {
            self.concurrency
                .release(execution.group_id.as_deref(), self.definition.concurrency.as_ref())
                .await;
            *released = true;
        }
    }

    /// Invokes `entered_state`'s handler under its timeout and retry policy
    /// (§4.1.3), appending a `failure`-status self-transition for each
    /// attempt that is followed by a retry (property P6: at most
    /// `max_attempts - 1` such transitions per invocation). On final
    /// exhaustion (or a non-retryable error), escalates through
    /// [`Self::dispatch_error`].
    async fn run_state(
        &self,
        execution: &mut WorkflowExecution,
        entered_state: &str,
        registration: &StateRegistration,
    ) -> WorkflowResult<StepOutcome> {
        let metadata = registration.metadata.clone();
        let max_attempts = metadata.retry.as_ref().map(|r| r.max_attempts).unwrap_or(1);
        let mut attempt: u32 = 1;

        loop {
            if let Some(delay) = metadata.delay {
                sleep(delay).await;
            }

            let actions = Actions::new();
            let ctx = self.snapshot(execution, attempt);
            execution.metadata.total_attempts += 1;

            let started = Instant::now();
            let call = registration.handler.execute(ctx, &actions);
            let outcome: WorkflowResult<()> = match metadata.timeout {
                Some(timeout_dur) => match tokio::time::timeout(timeout_dur, call).await {
                    Ok(inner) => inner,
                    Err(_) => Err(WorkflowError::StateTimeoutError {
                        state_name: entered_state.to_string(),
                        timeout_ms: timeout_dur.as_millis() as u64,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }),
                },
                None => call.await,
            };

            match outcome {
                Ok(()) => {
                    let action = actions
                        .take()
                        .unwrap_or(StagedAction::Next { data: None, output: None });
                    return Ok(StepOutcome::Action(action));
                }
                Err(err) => {
                    warn!(state = entered_state, attempt, error = %err, "state handler failed");

                    let has_retry = metadata.retry.is_some();
                    // Only an attempt that is actually followed by a retry earns a
                    // `failure`-status self-transition (property P6: at most
                    // `max_attempts - 1` of these per invocation). The attempt that
                    // exhausts the budget is represented downstream instead, by
                    // whatever the error handler's decision records (an
                    // `error_recovery` transition for TRANSITION_TO, or the FAIL
                    // branch relying on the preceding retries already in history).
                    let will_retry = has_retry && attempt < max_attempts && !err.is_fatal();

                    if will_retry {
                        let mut failure =
                            StateTransition::new(entered_state, entered_state, TransitionStatus::Failure).with_error(err.to_string());
                        failure.finish();
                        execution.append_transition(failure);
                        self.persistence.save(execution).await?;
                    }

                    if let Some(state_hooks) = registration.hooks.clone() {
                        let ctx = self.snapshot(execution, attempt);
                        let _ = state_hooks.on_failure(&ctx, &err).await;
                    }

                    if will_retry {
                        if let Some(delay) = metadata.retry.as_ref().and_then(|r| r.next_delay(attempt)) {
                            sleep(delay).await;
                        }
                        attempt += 1;
                        continue;
                    }

                    let escalated = if has_retry && attempt >= max_attempts {
                        WorkflowError::RetryExhaustedError {
                            state: entered_state.to_string(),
                            attempts: attempt,
                            cause: err.to_string(),
                        }
                    } else {
                        err
                    };

                    return self
                        .dispatch_error(
                            execution,
                            Phase::StateExecute,
                            entered_state,
                            escalated,
                            Some(attempt),
                            metadata.retry.as_ref().map(|r| r.max_attempts),
                        )
                        .await;
                }
            }
        }
    }

    /// Calls the workflow's error handler (§4.1.6), applying the decision to
    /// `execution` and translating it into a [`StepOutcome`] or a
    /// propagating `Err`. Absent a handler, every error behaves as `FAIL`.
    async fn dispatch_error(
        &self,
        execution: &mut WorkflowExecution,
        phase: Phase,
        failing_state: &str,
        error: WorkflowError,
        attempt: Option<u32>,
        max_attempts: Option<u32>,
    ) -> WorkflowResult<StepOutcome> {
        let decision = match &self.definition.error_handler {
            Some(handler) => {
                let ctx = ErrorContext {
                    error: error.clone(),
                    phase,
                    workflow_context: self.snapshot(execution, attempt.unwrap_or(0)),
                    attempt,
                    max_attempts,
                };
                handler.handle(&ctx).await
            }
            None => ErrorDecision::Fail,
        };

        match decision {
            ErrorDecision::Continue => Ok(StepOutcome::Retry),
            ErrorDecision::Exit => Ok(StepOutcome::Break),
            ErrorDecision::Fail | ErrorDecision::StopRetry => {
                execution.mark_failed();
                self.persistence.save(execution).await?;
                Err(error)
            }
            ErrorDecision::FailNoPersist => Err(error),
            ErrorDecision::TransitionTo { target_state, output } => {
                if !self.validate_target(failing_state, &target_state) {
                    return Err(WorkflowError::InvalidTransition {
                        from: failing_state.to_string(),
                        to: target_state,
                    });
                }

                let mut recovery =
                    StateTransition::new(failing_state, failing_state, TransitionStatus::ErrorRecovery).with_error(error.to_string());
                recovery.finish();
                execution.append_transition(recovery);

                if let Some(output) = output {
                    execution.outputs.set(failing_state, output);
                }

                let mut success = StateTransition::new(failing_state, &target_state, TransitionStatus::Success);
                success.finish();
                execution.append_transition(success);
                execution.current_state = target_state;

                self.persistence.save(execution).await?;
                Ok(StepOutcome::Recovered)
            }
        }
    }

    /// Applies a handler's staged action (§4.1.2): resolves the successor
    /// state where relevant, merges data, writes the output, appends the
    /// transition, and persists.
    async fn interpret_action(
        &self,
        execution: &mut WorkflowExecution,
        entered_state: &str,
        action: StagedAction,
    ) -> WorkflowResult<()> {
        match action {
            StagedAction::Next { data, output } => {
                let ctx = self.snapshot(execution, 0);
                match self.resolve_next(entered_state, &ctx).await? {
                    NextResolution::State(target, virtual_outputs) => {
                        if let Some(virtual_outputs) = virtual_outputs {
                            for (key, vo) in virtual_outputs {
                                let value = vo.resolve(&ctx).await;
                                execution.outputs.set(key, value);
                            }
                        }
                        execution.merge_data(data);
                        if let Some(output) = output {
                            execution.outputs.set(entered_state, output);
                        }
                        let mut transition = StateTransition::new(entered_state, &target, TransitionStatus::Success);
                        transition.finish();
                        execution.append_transition(transition);
                        execution.current_state = target;
                    }
                    NextResolution::Complete => {
                        execution.merge_data(data);
                        if let Some(output) = output {
                            execution.outputs.set(entered_state, output);
                        }
                        execution.mark_completed();
                    }
                }
            }
            StagedAction::Goto { target, data, output } => {
                if !self.validate_target(entered_state, &target) {
                    return Err(WorkflowError::InvalidTransition {
                        from: entered_state.to_string(),
                        to: target,
                    });
                }
                execution.merge_data(data);
                if let Some(output) = output {
                    execution.outputs.set(entered_state, output);
                }
                let mut transition = StateTransition::new(entered_state, &target, TransitionStatus::Success);
                transition.finish();
                execution.append_transition(transition);
                execution.current_state = target;
            }
            StagedAction::Suspend {
                waiting_for,
                data,
                output,
            } => {
                execution.merge_data(data);
                if let Some(output) = output {
                    execution.outputs.set(entered_state, output);
                }
                let mut transition = StateTransition::new(entered_state, entered_state, TransitionStatus::Suspended);
                transition.finish();
                execution.append_transition(transition);
                execution.mark_suspended(waiting_for, None);
            }
            StagedAction::Complete { data, output } => {
                execution.merge_data(data);
                if let Some(output) = output {
                    execution.outputs.set(entered_state, output);
                }
                let mut transition = StateTransition::new(entered_state, entered_state, TransitionStatus::Success);
                transition.finish();
                execution.append_transition(transition);
                execution.mark_completed();
            }
        }

        self.persistence.save(execution).await?;
        Ok(())
    }

    /// Next-state resolution, §4.1.4: conditional transitions, then explicit
    /// transitions, then automatic enumeration-order fallthrough.
    async fn resolve_next(&self, state: &str, ctx: &ExecutionContext) -> WorkflowResult<NextResolution> {
        if let Some(conditional) = self.definition.conditional_transitions_from(state) {
            for branch in &conditional.branches {
                if branch.condition.evaluate(ctx).await {
                    return Ok(NextResolution::State(branch.to.clone(), branch.virtual_outputs.clone()));
                }
            }
            return Ok(match &conditional.default {
                Some(default) => NextResolution::State(default.clone(), conditional.default_virtual_outputs.clone()),
                None => NextResolution::Complete,
            });
        }

        let explicit = self.definition.explicit_transitions_from(state);
        if !explicit.is_empty() {
            for transition in &explicit {
                let satisfied = match &transition.condition {
                    Some(condition) => condition.evaluate(ctx).await,
                    None => true,
                };
                if satisfied {
                    return Ok(NextResolution::State(transition.to.clone(), None));
                }
            }
            return Ok(NextResolution::Complete);
        }

        Ok(match self.definition.next_in_enumeration(state) {
            Some(next) => NextResolution::State(next.to_string(), None),
            None => NextResolution::Complete,
        })
    }

    /// Whether `target` is a declared transition target from `from`. Used by
    /// both `goto` (§4.1.2) and `TRANSITION_TO` (§4.1.6). A `from` with no
    /// explicit transitions at all validates nothing — every target is
    /// rejected, matching the specification's calibration example.
    fn validate_target(&self, from: &str, target: &str) -> bool {
        let explicit = self.definition.explicit_transitions_from(from);
        !explicit.is_empty() && explicit.iter().any(|t| t.to == target)
    }

    /// Infers whether `execution` already passed a state flagged
    /// `unlockAfter`, from its history rather than a dedicated field — used
    /// to make lock re-acquisition on resume advisory rather than fatal.
    fn passed_unlock_after(&self, execution: &WorkflowExecution) -> bool {
        execution.history.iter().any(|t| {
            t.status == TransitionStatus::Success
                && self
                    .registry
                    .get(&t.from)
                    .map(|reg| reg.metadata.unlock_after)
                    .unwrap_or(false)
        })
    }

    fn snapshot(&self, execution: &WorkflowExecution, attempt: u32) -> ExecutionContext {
        let mut metadata = HashMap::new();
        metadata.insert("startedAt".to_string(), execution.metadata.started_at.to_rfc3339());
        metadata.insert("totalAttempts".to_string(), execution.metadata.total_attempts.to_string());

        ExecutionContext {
            execution_id: execution.id.clone(),
            workflow_name: execution.workflow_name.clone(),
            group_id: execution.group_id.clone(),
            current_state: execution.current_state.clone(),
            data: execution.data.clone(),
            outputs: execution.outputs.clone(),
            history: execution.history.clone(),
            metadata,
            attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::SyncCondition;
    use crate::definition::{ConditionalTransition, ExplicitTransition};
    use crate::handler::StateHandler;
    use crate::hooks::ErrorHandler;
    use crate::lock::InMemoryLockAdapter;
    use crate::persistence::InMemoryPersistence;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct NextHandler {
        output: serde_json::Value,
    }

    #[async_trait]
    impl StateHandler for NextHandler {
        async fn execute(&self, _ctx: ExecutionContext, actions: &Actions) -> WorkflowResult<()> {
            actions.next(None, Some(self.output.clone()));
            Ok(())
        }
    }

    struct AlwaysFailHandler {
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl StateHandler for AlwaysFailHandler {
        async fn execute(&self, _ctx: ExecutionContext, _actions: &Actions) -> WorkflowResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(WorkflowError::HandlerError {
                state: "PROCESSING".into(),
                message: "boom".into(),
            })
        }
    }

    struct SuspendingHandler;

    #[async_trait]
    impl StateHandler for SuspendingHandler {
        async fn execute(&self, ctx: ExecutionContext, actions: &Actions) -> WorkflowResult<()> {
            let pending = ctx
                .data
                .get("payment")
                .and_then(|p| p.get("status"))
                .and_then(|s| s.as_str())
                == Some("pending");
            if pending {
                actions.suspend(Some("payment_approval".into()), None, None);
            } else {
                actions.complete(None, None);
            }
            Ok(())
        }
    }

    struct TransitionToRecovery;

    #[async_trait]
    impl ErrorHandler for TransitionToRecovery {
        async fn handle(&self, ctx: &ErrorContext) -> ErrorDecision {
            ErrorDecision::TransitionTo {
                target_state: "RECOVERY".into(),
                output: Some(serde_json::json!({"recovered": false, "reason": ctx.error.to_string()})),
            }
        }
    }

    struct RecoveryHandler;

    #[async_trait]
    impl StateHandler for RecoveryHandler {
        async fn execute(&self, _ctx: ExecutionContext, actions: &Actions) -> WorkflowResult<()> {
            actions.complete(None, None);
            Ok(())
        }
    }

    fn test_executor(definition: WorkflowDefinition, registry: StateRegistry) -> Executor {
        Executor::new(
            Arc::new(definition),
            registry,
            Arc::new(InMemoryPersistence::new()),
            Arc::new(ConcurrencyManager::new(
                Arc::new(InMemoryLockAdapter::new()),
                Arc::new(InMemoryPersistence::new()),
                Duration::from_secs(30),
            )),
        )
    }

    /// S1: linear three-state workflow with no declared transitions.
    #[tokio::test]
    async fn linear_three_state_completes_via_enumeration_fallthrough() {
        let registry = StateRegistry::new();
        registry.register(
            "A",
            Arc::new(NextHandler {
                output: serde_json::json!({"step": 1}),
            }),
        );
        registry.register(
            "B",
            Arc::new(NextHandler {
                output: serde_json::json!({"step": 2}),
            }),
        );
        registry.register(
            "C",
            Arc::new(NextHandler {
                output: serde_json::json!({"step": 3}),
            }),
        );

        let definition = WorkflowDefinition::new("linear", vec!["A", "B", "C"], "A");
        let executor = test_executor(definition, registry);

        let execution = executor
            .execute(ExecuteOptions {
                data: serde_json::json!({"counter": 0}),
                execution_id: None,
            })
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.current_state, "C");
        assert_eq!(execution.history.len(), 2);
        assert_eq!(execution.history[0].from, "A");
        assert_eq!(execution.history[0].to, "B");
        assert_eq!(execution.history[1].from, "B");
        assert_eq!(execution.history[1].to, "C");
        assert_eq!(execution.outputs.get("A"), Some(&serde_json::json!({"step": 1})));
        assert_eq!(execution.outputs.get("C"), Some(&serde_json::json!({"step": 3})));
    }

    /// S3: retry exhaustion routed to TRANSITION_TO.
    #[tokio::test]
    async fn retry_exhaustion_recovers_via_transition_to() {
        use crate::handler::StateMetadata;
        use crate::retry::RetryPolicy;

        let registry = StateRegistry::new();
        let attempts = Arc::new(AtomicU32::new(0));
        registry.register_with_metadata(
            "PROCESSING",
            Arc::new(AlwaysFailHandler {
                attempts: attempts.clone(),
            }),
            StateMetadata::new().with_retry(RetryPolicy::fixed(Duration::from_millis(1), 3)),
        );
        registry.register("RECOVERY", Arc::new(RecoveryHandler));

        let definition = WorkflowDefinition::new("retry-wf", vec!["PROCESSING", "RECOVERY"], "PROCESSING")
            .with_transition(ExplicitTransition::new("PROCESSING", "RECOVERY"))
            .with_error_handler(Arc::new(TransitionToRecovery));
        let executor = test_executor(definition, registry);

        let execution = executor
            .execute(ExecuteOptions {
                data: serde_json::json!({}),
                execution_id: None,
            })
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(
            execution.outputs.get("PROCESSING").and_then(|v| v.get("recovered")),
            Some(&serde_json::json!(false))
        );

        let recovery_transitions: Vec<_> = execution
            .history
            .iter()
            .filter(|t| t.status == TransitionStatus::ErrorRecovery)
            .collect();
        assert_eq!(recovery_transitions.len(), 1);
        assert_eq!(recovery_transitions[0].from, "PROCESSING");

        let success_into_recovery: Vec<_> = execution
            .history
            .iter()
            .filter(|t| t.status == TransitionStatus::Success && t.from == "PROCESSING" && t.to == "RECOVERY")
            .collect();
        assert_eq!(success_into_recovery.len(), 1);
    }

    /// S4: suspend then resume.
    #[tokio::test]
    async fn suspend_then_resume_completes() {
        let registry = StateRegistry::new();
        registry.register("WAITING", Arc::new(SuspendingHandler));

        let definition = Arc::new(WorkflowDefinition::new("waiting-wf", vec!["WAITING"], "WAITING"));
        let persistence = Arc::new(InMemoryPersistence::new());
        let executor = Executor::new(
            definition,
            registry,
            persistence.clone(),
            Arc::new(ConcurrencyManager::new(
                Arc::new(InMemoryLockAdapter::new()),
                persistence.clone(),
                Duration::from_secs(30),
            )),
        );

        let suspended = executor
            .execute(ExecuteOptions {
                data: serde_json::json!({"payment": {"status": "pending"}}),
                execution_id: None,
            })
            .await
            .unwrap();

        assert_eq!(suspended.status, ExecutionStatus::Suspended);
        assert_eq!(suspended.current_state, "WAITING");
        assert_eq!(
            suspended.suspension.as_ref().and_then(|s| s.waiting_for.clone()),
            Some("payment_approval".to_string())
        );
        let suspended_history_len = suspended.history.len();

        let resumed = executor
            .resume(
                &suspended.id,
                ResumeOptions {
                    strategy: crate::execution::ResumeStrategy::Retry,
                    data: Some(serde_json::json!({"payment": {"status": "approved"}})),
                    target_state: None,
                    output: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(resumed.status, ExecutionStatus::Completed);
        assert!(resumed.suspension.is_none());
        assert!(resumed.history.len() > suspended_history_len);
    }

    /// P5 / S5: SEQUENTIAL mode admits only one execution per group at a time.
    #[tokio::test]
    async fn sequential_concurrency_rejects_second_execution_in_same_group() {
        use crate::condition::GroupBy;
        use crate::definition::{ConcurrencyConfig, ConcurrencyMode};

        let registry = StateRegistry::new();
        registry.register(
            "A",
            Arc::new(NextHandler {
                output: serde_json::json!({}),
            }),
        );

        let definition = Arc::new(
            WorkflowDefinition::new("seq-wf", vec!["A"], "A").with_concurrency(ConcurrencyConfig {
                group_by: GroupBy::Field("userId".into()),
                mode: ConcurrencyMode::Sequential,
            }),
        );

        let lock = Arc::new(InMemoryLockAdapter::new());
        lock.acquire("workflow:group:u1", "someone-else", Duration::from_secs(30))
            .await;

        let persistence = Arc::new(InMemoryPersistence::new());
        let executor = Executor::new(
            definition,
            registry,
            persistence.clone(),
            Arc::new(ConcurrencyManager::new(lock, persistence, Duration::from_secs(30))),
        );

        let result = executor
            .execute(ExecuteOptions {
                data: serde_json::json!({"userId": "u1"}),
                execution_id: None,
            })
            .await;

        assert!(matches!(result, Err(WorkflowError::LockAcquisitionError(_))));
    }

    /// S6: virtual outputs skip real execution of the listed states.
    #[tokio::test]
    async fn virtual_outputs_are_assigned_without_executing_their_states() {
        struct PanicHandler;
        #[async_trait]
        impl StateHandler for PanicHandler {
            async fn execute(&self, _ctx: ExecutionContext, _actions: &Actions) -> WorkflowResult<()> {
                panic!("virtual-output states must never execute");
            }
        }

        let registry = StateRegistry::new();
        registry.register(
            "START",
            Arc::new(NextHandler {
                output: serde_json::json!({}),
            }),
        );
        registry.register(
            "END",
            Arc::new(NextHandler {
                output: serde_json::json!({"final": true}),
            }),
        );
        registry.register("VALIDATION", Arc::new(PanicHandler));
        registry.register("PAYMENT", Arc::new(PanicHandler));
        registry.register("SHIPPING", Arc::new(PanicHandler));

        let mut virtual_outputs = HashMap::new();
        virtual_outputs.insert("VALIDATION".to_string(), VirtualOutput::literal(serde_json::json!({"skipped": true})));
        virtual_outputs.insert("PAYMENT".to_string(), VirtualOutput::literal(serde_json::json!({"skipped": true})));
        virtual_outputs.insert("SHIPPING".to_string(), VirtualOutput::literal(serde_json::json!({"skipped": true})));

        let is_premium = SyncCondition::new(|ctx| ctx.data.get("isPremium").and_then(|v| v.as_bool()).unwrap_or(false));
        let conditional = ConditionalTransition::new("START").branch(is_premium, "END", Some(virtual_outputs));

        let definition =
            WorkflowDefinition::new("premium-wf", vec!["START", "VALIDATION", "PAYMENT", "SHIPPING", "END"], "START")
                .with_conditional_transition(conditional);
        let executor = test_executor(definition, registry);

        let execution = executor
            .execute(ExecuteOptions {
                data: serde_json::json!({"isPremium": true}),
                execution_id: None,
            })
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.history.len(), 1);
        assert_eq!(execution.history[0].from, "START");
        assert_eq!(execution.history[0].to, "END");
        assert_eq!(
            execution.outputs.get("VALIDATION"),
            Some(&serde_json::json!({"skipped": true}))
        );
        assert_eq!(execution.outputs.get("PAYMENT"), Some(&serde_json::json!({"skipped": true})));
        assert_eq!(execution.outputs.get("SHIPPING"), Some(&serde_json::json!({"skipped": true})));
    }

    /// goto targeting a state with no declared explicit transitions is rejected.
    #[tokio::test]
    async fn goto_with_no_explicit_transitions_declared_is_invalid() {
        struct GotoHandler;
        #[async_trait]
        impl StateHandler for GotoHandler {
            async fn execute(&self, _ctx: ExecutionContext, actions: &Actions) -> WorkflowResult<()> {
                actions.goto("B", None, None);
                Ok(())
            }
        }

        let registry = StateRegistry::new();
        registry.register("A", Arc::new(GotoHandler));
        registry.register("B", Arc::new(RecoveryHandler));

        let definition = WorkflowDefinition::new("goto-wf", vec!["A", "B"], "A");
        let executor = test_executor(definition, registry);

        let result = executor
            .execute(ExecuteOptions {
                data: serde_json::json!({}),
                execution_id: None,
            })
            .await;

        assert!(matches!(result, Err(WorkflowError::InvalidTransition { .. })));
    }

    /// State-scoped hooks fire onFailure per failed attempt and onFinish once
    /// the state's invocation concludes, whether it succeeded or failed.
    #[tokio::test]
    async fn state_hooks_observe_failure_and_finish() {
        use crate::handler::StateMetadata;
        use crate::hooks::StateHooks;
        use crate::retry::RetryPolicy;

        struct CountingHooks {
            failures: Arc<AtomicU32>,
            finishes: Arc<AtomicU32>,
        }

        #[async_trait]
        impl StateHooks for CountingHooks {
            async fn on_failure(&self, _ctx: &ExecutionContext, _error: &WorkflowError) -> WorkflowResult<()> {
                self.failures.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }

            async fn on_finish(&self, _ctx: &ExecutionContext) -> WorkflowResult<()> {
                self.finishes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let registry = StateRegistry::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let failures = Arc::new(AtomicU32::new(0));
        let finishes = Arc::new(AtomicU32::new(0));

        registry.register_with_hooks(
            "PROCESSING",
            Arc::new(AlwaysFailHandler {
                attempts: attempts.clone(),
            }),
            StateMetadata::new().with_retry(RetryPolicy::fixed(Duration::from_millis(1), 2)),
            Some(Arc::new(CountingHooks {
                failures: failures.clone(),
                finishes: finishes.clone(),
            })),
        );

        let definition = WorkflowDefinition::new("hooks-wf", vec!["PROCESSING"], "PROCESSING");
        let executor = test_executor(definition, registry);

        let result = executor
            .execute(ExecuteOptions {
                data: serde_json::json!({}),
                execution_id: None,
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(failures.load(Ordering::SeqCst), 2);
        assert_eq!(finishes.load(Ordering::SeqCst), 1);
    }

    /// S2: conditional routing picks the first matching branch, not the
    /// default, and leaves the other branches' states unexecuted.
    #[tokio::test]
    async fn conditional_routing_picks_first_matching_branch_over_default() {
        use crate::condition::SyncCondition;
        use crate::definition::ConditionalTransition;

        struct PanicHandler;
        #[async_trait]
        impl StateHandler for PanicHandler {
            async fn execute(&self, _ctx: ExecutionContext, _actions: &Actions) -> WorkflowResult<()> {
                panic!("this branch's state must never execute");
            }
        }

        let registry = StateRegistry::new();
        registry.register(
            "START",
            Arc::new(NextHandler {
                output: serde_json::json!({}),
            }),
        );
        registry.register("HIGH", Arc::new(PanicHandler));
        registry.register(
            "MEDIUM",
            Arc::new(NextHandler {
                output: serde_json::json!({"tier": "medium"}),
            }),
        );
        registry.register("LOW", Arc::new(PanicHandler));
        registry.register(
            "END",
            Arc::new(NextHandler {
                output: serde_json::json!({"final": true}),
            }),
        );

        let is_high = SyncCondition::new(|ctx: &ExecutionContext| {
            ctx.data.get("value").and_then(|v| v.as_i64()).unwrap_or(0) > 100
        });
        let is_medium = SyncCondition::new(|ctx: &ExecutionContext| {
            ctx.data.get("value").and_then(|v| v.as_i64()).unwrap_or(0) > 50
        });
        let conditional = ConditionalTransition::new("START")
            .branch(is_high, "HIGH", None)
            .branch(is_medium, "MEDIUM", None)
            .with_default("LOW", None);

        let definition = WorkflowDefinition::new("tier-wf", vec!["START", "HIGH", "MEDIUM", "LOW", "END"], "START")
            .with_conditional_transition(conditional)
            .with_transition(ExplicitTransition::new(vec!["HIGH", "MEDIUM", "LOW"], "END"));
        let executor = test_executor(definition, registry);

        let execution = executor
            .execute(ExecuteOptions {
                data: serde_json::json!({"value": 75}),
                execution_id: None,
            })
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.history.len(), 2);
        assert_eq!(execution.history[0].from, "START");
        assert_eq!(execution.history[0].to, "MEDIUM");
        assert_eq!(execution.history[1].from, "MEDIUM");
        assert_eq!(execution.history[1].to, "END");
        assert!(execution.outputs.get("MEDIUM").is_some());
        assert!(execution.outputs.get("HIGH").is_none());
        assert!(execution.outputs.get("LOW").is_none());
    }

    /// P7: a state whose handler outlives its configured timeout raises
    /// `StateTimeoutError` rather than waiting for the handler to return.
    #[tokio::test]
    async fn state_handler_exceeding_timeout_raises_state_timeout_error() {
        use crate::handler::StateMetadata;

        struct SlowHandler;
        #[async_trait]
        impl StateHandler for SlowHandler {
            async fn execute(&self, _ctx: ExecutionContext, actions: &Actions) -> WorkflowResult<()> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                actions.next(None, None);
                Ok(())
            }
        }

        let registry = StateRegistry::new();
        registry.register_with_metadata(
            "SLOW",
            Arc::new(SlowHandler),
            StateMetadata::new().with_timeout(Duration::from_millis(5)),
        );

        let definition = WorkflowDefinition::new("timeout-wf", vec!["SLOW"], "SLOW");
        let executor = test_executor(definition, registry);

        let result = executor
            .execute(ExecuteOptions {
                data: serde_json::json!({}),
                execution_id: None,
            })
            .await;

        match result {
            Err(WorkflowError::StateTimeoutError {
                state_name,
                timeout_ms,
                ..
            }) => {
                assert_eq!(state_name, "SLOW");
                assert_eq!(timeout_ms, 5);
            }
            other => panic!("expected StateTimeoutError, got {other:?}"),
        }
    }
}
