//! The execution engine.
//!
//! [`Executor::execute`] drives an [`ExecutionPlan`] wave by wave. Waves
//! are totally ordered: wave N+1 starts only after every node in wave N
//! has terminated. Within a wave, nodes run concurrently against a
//! snapshot of the state; each node task accumulates its results and
//! context updates in a private [`ScopeState`], and the wave join applies
//! those updates to the real state in wave order. All writes therefore go
//! through a single owner, and a node can never observe a sibling from its
//! own wave.
//!
//! Control-flow nodes execute their runtime (which returns metadata), then
//! the executor interprets the construct: evaluating conditions, driving
//! iterations, forking scopes for `parallel`/`foreach` concurrency: in
//! [`control`].
//!
//! Every attempt runs under its own cancellation token and deadline;
//! retries follow the node's `<on-error>` policy or the runtime defaults
//! (3 retries, 1 s base, 30 s per-attempt timeout).

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::ast::{NodeAst, NodeBody, TransformType};
use crate::cancel::CancelToken;
use crate::errors::{ErrorDetail, ExecutionError};
use crate::expr::{EvalContext, render_template};
use crate::planner::ExecutionPlan;
use crate::registry::{ExecutionParams, RuntimeRegistry};
use crate::state::{ExecutionState, NodeResult, NodeStatus};

mod control;
pub mod duration;
pub mod retry;

pub use retry::{BACKOFF_CAP_MS, RetryPolicy, calculate_backoff_ms, is_retryable_error};

/// Tunables for one executor instance.
#[derive(Clone, Debug)]
pub struct ExecutorOptions {
    /// Deadline for each individual attempt.
    pub attempt_timeout: Duration,
    /// Iteration cap for `while` (and `loop` without `max-iterations`).
    pub safety_bound: u64,
    /// Optional whole-run deadline; drives the per-run cancel signal.
    pub run_timeout: Option<Duration>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(30),
            safety_bound: 10_000,
            run_timeout: None,
        }
    }
}

/// Wave-driven workflow executor.
pub struct Executor {
    registry: Arc<RuntimeRegistry>,
    options: ExecutorOptions,
}

impl Executor {
    #[must_use]
    pub fn new(registry: Arc<RuntimeRegistry>) -> Self {
        Self {
            registry,
            options: ExecutorOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(registry: Arc<RuntimeRegistry>, options: ExecutorOptions) -> Self {
        Self { registry, options }
    }

    /// Execute a plan to completion, mutating `state` in place.
    ///
    /// Nodes whose ids already carry a successful result are skipped, so
    /// feeding a reloaded state resumes where the previous run stopped.
    /// The state is always left in a terminal status; persistence of the
    /// failed state is the caller's responsibility before surfacing the
    /// error.
    #[instrument(skip(self, plan, state), fields(workflow = %plan.workflow_id, run = %state.run_id), err)]
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        state: &mut ExecutionState,
    ) -> Result<(), ExecutionError> {
        let run_cancel = CancelToken::new();
        if let Some(deadline) = self.options.run_timeout {
            let watchdog = run_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                watchdog.cancel();
            });
        }

        let run = RunContext {
            executor: self,
            nodes_by_id: collect_nodes(plan),
            run_cancel: run_cancel.clone(),
        };

        state.mark_running();
        let mut failure: Option<ExecutionError> = None;

        for wave in &plan.waves {
            state.current_wave = wave.wave_number;
            if run_cancel.is_cancelled() {
                state.mark_cancelled();
                return Err(ExecutionError::Abort);
            }

            let pending: Vec<&NodeAst> = wave
                .node_ids
                .iter()
                .filter_map(|id| plan.nodes.get(id))
                .filter(|node| {
                    state
                        .node_results
                        .get(&node.id)
                        .is_none_or(|r| r.status != NodeStatus::Success)
                })
                .collect();
            if pending.is_empty() {
                continue;
            }

            tracing::debug!(wave = wave.wave_number, nodes = pending.len(), "dispatching wave");

            // Snapshot once; every node in the wave sees only prior waves.
            let base = state.clone();
            let tasks = pending.iter().map(|node| {
                let mut scope = ScopeState::new(base.clone());
                let cancel = run_cancel.child();
                let run = &run;
                async move {
                    let locals = FxHashMap::default();
                    let outcome = run.execute_node(node, &mut scope, &locals, &cancel).await;
                    (scope, outcome)
                }
            });
            let outcomes = futures_util::future::join_all(tasks).await;

            // Barrier: apply every task's updates in wave order.
            for (scope, outcome) in outcomes {
                scope.apply_to(state);
                if let Err(err) = outcome
                    && failure.is_none()
                {
                    failure = Some(err);
                }
            }
            if failure.is_some() {
                break;
            }
        }

        match failure {
            Some(err) => {
                if matches!(err, ExecutionError::Abort) && run_cancel.is_cancelled() {
                    state.mark_cancelled();
                } else {
                    state.mark_failed();
                }
                Err(err)
            }
            None => {
                state.mark_completed();
                Ok(())
            }
        }
    }
}

/// Every node in the plan, nested children included, for fallback and
/// `on-timeout` target lookup.
fn collect_nodes(plan: &ExecutionPlan) -> FxHashMap<String, NodeAst> {
    let mut out = FxHashMap::default();
    fn visit(node: &NodeAst, out: &mut FxHashMap<String, NodeAst>) {
        out.insert(node.id.clone(), node.clone());
        for child in node.body.children() {
            visit(child, out);
        }
    }
    for node in plan.nodes.values() {
        visit(node, &mut out);
    }
    out
}

// ---------------------------------------------------------------------------
// Scope state: collect-then-apply updates
// ---------------------------------------------------------------------------

/// A node task's private working state plus the update log the wave join
/// replays onto the run state.
pub(crate) struct ScopeState {
    pub(crate) state: ExecutionState,
    recorded: Vec<(String, NodeResult)>,
    globals: Vec<(String, Value)>,
    phase_ctx: Option<FxHashMap<String, Value>>,
}

impl ScopeState {
    pub(crate) fn new(state: ExecutionState) -> Self {
        Self {
            state,
            recorded: Vec::new(),
            globals: Vec::new(),
            phase_ctx: None,
        }
    }

    pub(crate) fn record(&mut self, id: &str, result: NodeResult) {
        self.state.record_node_result(id.to_string(), result.clone());
        self.recorded.push((id.to_string(), result));
    }

    pub(crate) fn set_global(&mut self, key: String, value: Value) {
        self.state.global_context.insert(key.clone(), value.clone());
        self.globals.push((key, value));
    }

    pub(crate) fn set_phase(&mut self, ctx: FxHashMap<String, Value>) {
        self.state.set_phase_context(ctx.clone());
        self.phase_ctx = Some(ctx);
    }

    /// A fork sees the current state but starts a fresh update log.
    pub(crate) fn fork(&self) -> ScopeState {
        ScopeState::new(self.state.clone())
    }

    /// Replay a fork's updates onto this scope, in the fork's order.
    pub(crate) fn absorb(&mut self, fork: ScopeState) {
        for (id, result) in fork.recorded {
            self.state.record_node_result(id.clone(), result.clone());
            self.recorded.push((id, result));
        }
        for (key, value) in fork.globals {
            self.state.global_context.insert(key.clone(), value.clone());
            self.globals.push((key, value));
        }
        if let Some(ctx) = fork.phase_ctx {
            self.set_phase(ctx);
        }
    }

    /// Replay onto the real run state at the wave barrier.
    fn apply_to(self, state: &mut ExecutionState) {
        for (id, result) in self.recorded {
            state.record_node_result(id, result);
        }
        for (key, value) in self.globals {
            state.global_context.insert(key, value);
        }
        if let Some(ctx) = self.phase_ctx {
            state.set_phase_context(ctx);
        }
    }
}

// ---------------------------------------------------------------------------
// Per-run context
// ---------------------------------------------------------------------------

pub(crate) struct RunContext<'e> {
    pub(crate) executor: &'e Executor,
    pub(crate) nodes_by_id: FxHashMap<String, NodeAst>,
    #[allow(dead_code)]
    pub(crate) run_cancel: CancelToken,
}

impl RunContext<'_> {
    /// Execute one node (and, for containers, its subtree) against the
    /// given scope. Boxed for async recursion.
    pub(crate) fn execute_node<'a>(
        &'a self,
        node: &'a NodeAst,
        scope: &'a mut ScopeState,
        locals: &'a FxHashMap<String, Value>,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<Value, ExecutionError>> {
        async move { self.execute_node_inner(node, scope, locals, cancel).await }.boxed()
    }

    async fn execute_node_inner(
        &self,
        node: &NodeAst,
        scope: &mut ScopeState,
        locals: &FxHashMap<String, Value>,
        cancel: &CancelToken,
    ) -> Result<Value, ExecutionError> {
        let started = Utc::now();
        let type_key = node.type_key();

        let Some(runtime) = self.executor.registry.get(&type_key) else {
            let err = ExecutionError::UnknownRuntime { type_key };
            scope.record(&node.id, NodeResult::failure(&err, started, Utc::now()));
            return Err(err);
        };

        let input = node
            .input
            .as_deref()
            .and_then(|id| scope.state.node_output(id).cloned());

        let config = match self.resolve_config(node, scope, locals) {
            Ok(config) => config,
            Err(err) => {
                scope.record(&node.id, NodeResult::failure(&err, started, Utc::now()));
                return Err(err);
            }
        };

        let policy = RetryPolicy::from_error_config(node.error_config.as_ref());
        let mut attempt: u32 = 0;
        let raw_output = loop {
            let attempt_cancel = cancel.child();
            let call = runtime.execute(ExecutionParams {
                node,
                input: input.clone(),
                config: config.clone(),
                state: &scope.state,
                cancel: attempt_cancel.clone(),
            });

            let result = tokio::select! {
                outcome = tokio::time::timeout(self.executor.options.attempt_timeout, call) => {
                    match outcome {
                        Ok(inner) => inner,
                        Err(_) => {
                            attempt_cancel.cancel();
                            Err(ExecutionError::Timeout {
                                ms: self.executor.options.attempt_timeout.as_millis() as u64,
                            })
                        }
                    }
                }
                () = cancel.cancelled() => {
                    attempt_cancel.cancel();
                    Err(ExecutionError::Abort)
                }
            };

            match result {
                Ok(value) => break value,
                Err(err) => {
                    let retry_allowed = attempt < policy.max_retries
                        && err.is_retryable()
                        && self.retry_guard_passes(&policy, &err, scope, locals)
                        && !cancel.is_cancelled();
                    if retry_allowed {
                        let delay = policy.delay(attempt);
                        attempt += 1;
                        tracing::debug!(
                            node = %node.id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying after failure"
                        );
                        tokio::select! {
                            () = tokio::time::sleep(delay) => continue,
                            () = cancel.cancelled() => {
                                let err = ExecutionError::Abort;
                                scope.record(&node.id, NodeResult::failure(&err, started, Utc::now()));
                                return Err(err);
                            }
                        }
                    }

                    // Exhausted (or unretryable): a declared fallback node
                    // may still consume the failure.
                    if let Some(fallback_id) =
                        node.error_config.as_ref().and_then(|c| c.fallback.clone())
                        && !matches!(err, ExecutionError::Abort)
                        && let Some(fallback) = self.nodes_by_id.get(&fallback_id)
                    {
                        tracing::debug!(node = %node.id, fallback = %fallback_id, "running fallback");
                        match self.execute_node(fallback, scope, locals, cancel).await {
                            Ok(value) => break value,
                            Err(_) => {
                                // The original failure is the one reported.
                                scope.record(
                                    &node.id,
                                    NodeResult::failure(&err, started, Utc::now()),
                                );
                                return Err(err);
                            }
                        }
                    }

                    scope.record(&node.id, NodeResult::failure(&err, started, Utc::now()));
                    return Err(err);
                }
            }
        };

        // Containers return metadata; interpret the construct.
        let output = if needs_interpretation(&node.body) {
            match control::interpret(self, node, &raw_output, input, scope, locals, cancel).await {
                Ok(output) => output,
                Err(err) => {
                    scope.record(&node.id, NodeResult::failure(&err, started, Utc::now()));
                    return Err(err);
                }
            }
        } else {
            raw_output
        };

        scope.record(
            &node.id,
            NodeResult::success(output.clone(), started, Utc::now()),
        );
        Ok(output)
    }

    /// Resolve a node's config: template-bearing strings are evaluated
    /// now, except the keys the node's construct evaluates itself (per
    /// iteration, per condition check).
    fn resolve_config(
        &self,
        node: &NodeAst,
        scope: &ScopeState,
        locals: &FxHashMap<String, Value>,
    ) -> Result<Map<String, Value>, ExecutionError> {
        let deferred = deferred_keys(&node.body);
        let ctx = EvalContext::from_state(&scope.state).with_locals(locals.clone());
        let mut out = Map::new();
        for (key, value) in &node.config {
            let resolved = match value {
                Value::String(s)
                    if crate::expr::is_template(s)
                        && !deferred.iter().any(|d| *d == key.as_str()) =>
                {
                    render_template(s, &ctx)?
                }
                other => other.clone(),
            };
            out.insert(key.clone(), resolved);
        }
        Ok(out)
    }

    /// Evaluate a retry `when` guard with the error bound as `error`.
    /// Evaluation failures disable the retry rather than masking the
    /// original error.
    fn retry_guard_passes(
        &self,
        policy: &RetryPolicy,
        err: &ExecutionError,
        scope: &ScopeState,
        locals: &FxHashMap<String, Value>,
    ) -> bool {
        let Some(guard) = &policy.when else {
            return true;
        };
        let mut ctx = EvalContext::from_state(&scope.state).with_locals(locals.clone());
        let detail = ErrorDetail::from(err);
        ctx.insert_local(
            "error",
            serde_json::to_value(&detail).unwrap_or(Value::Null),
        );
        control::eval_attr(guard, &ctx)
            .map(|v| crate::expr::is_truthy(&v))
            .unwrap_or(false)
    }
}

/// Whether the executor interprets this node after its runtime returns
/// metadata (control flow and the scope adjusters).
fn needs_interpretation(body: &NodeBody) -> bool {
    body.is_control_flow() || matches!(body, NodeBody::Context { .. } | NodeBody::Set { .. })
}

/// Config keys the construct evaluates itself.
fn deferred_keys(body: &NodeBody) -> &'static [&'static str] {
    match body {
        NodeBody::Transform {
            transform_type: TransformType::Template,
        } => &["template"],
        NodeBody::Transform {
            transform_type: TransformType::Map | TransformType::Filter,
        } => &["expression"],
        // Control-flow attributes (conditions, collections, bindings) are
        // evaluated per interpretation step, not once up front.
        NodeBody::Branch { .. }
        | NodeBody::If { .. }
        | NodeBody::Loop { .. }
        | NodeBody::While { .. }
        | NodeBody::Foreach { .. }
        | NodeBody::Parallel { .. }
        | NodeBody::Phase { .. }
        | NodeBody::Context { .. }
        | NodeBody::Set { .. }
        | NodeBody::Include { .. }
        | NodeBody::Call { .. } => &[
            "condition",
            "when",
            "collection",
            "value",
            "break-condition",
            "breakCondition",
        ],
        _ => &[],
    }
}
