//! Control-flow interpretation.
//!
//! Runtimes for control constructs return metadata; this module gives the
//! constructs their semantics. Child node lists are planned into sub-waves
//! with the same Kahn pass as the top level and executed in order within
//! the owning node's scope, so a container's children always see their
//! scope's earlier results. `parallel` branches and concurrent `foreach`
//! iterations run on scope forks that are absorbed back in deterministic
//! order.

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::ast::{CheckpointAction, NodeAst, NodeBody};
use crate::cancel::CancelToken;
use crate::errors::ExecutionError;
use crate::expr::{EvalContext, ExpressionError, is_truthy, iteration_locals, render_template};
use crate::planner::plan_waves;
use crate::state::NodeResult;

use super::duration::parse_duration;
use super::{RunContext, ScopeState};

/// Evaluate an attribute that may be a `{{…}}` template or a bare
/// expression.
pub(crate) fn eval_attr(raw: &str, ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
    if crate::expr::is_template(raw) {
        render_template(raw, ctx)
    } else {
        crate::expr::evaluate(raw, ctx)
    }
}

fn eval_condition(
    raw: &str,
    scope: &ScopeState,
    locals: &FxHashMap<String, Value>,
) -> Result<bool, ExecutionError> {
    let ctx = EvalContext::from_state(&scope.state).with_locals(locals.clone());
    Ok(is_truthy(&eval_attr(raw, &ctx)?))
}

/// Interpret a control-flow node after its runtime returned metadata.
/// Returns the node's output value.
pub(crate) async fn interpret(
    run: &RunContext<'_>,
    node: &NodeAst,
    metadata: &Value,
    input: Option<Value>,
    scope: &mut ScopeState,
    locals: &FxHashMap<String, Value>,
    cancel: &CancelToken,
) -> Result<Value, ExecutionError> {
    match &node.body {
        NodeBody::If {
            condition,
            then_nodes,
            else_nodes,
        } => {
            let arm = if eval_condition(condition, scope, locals)? {
                Some(then_nodes.as_slice())
            } else {
                else_nodes.as_deref()
            };
            match arm {
                Some(nodes) => run_sequence(run, nodes, scope, locals, cancel)
                    .await
                    .map(|out| out.unwrap_or(Value::Null)),
                None => Ok(input.unwrap_or(Value::Null)),
            }
        }

        NodeBody::Branch { cases, default } => {
            for case in cases {
                if eval_condition(&case.condition, scope, locals)? {
                    return run_sequence(run, &case.nodes, scope, locals, cancel)
                        .await
                        .map(|out| out.unwrap_or(Value::Null));
                }
            }
            match default {
                Some(nodes) => run_sequence(run, nodes, scope, locals, cancel)
                    .await
                    .map(|out| out.unwrap_or(Value::Null)),
                None => Ok(input.unwrap_or(Value::Null)),
            }
        }

        NodeBody::Loop {
            max_iterations,
            break_condition,
            body,
        } => {
            let cap = (*max_iterations).unwrap_or(run.executor.options.safety_bound);
            let mut last = Value::Null;
            for index in 0..cap {
                let mut iter_locals = locals.clone();
                iter_locals.insert("$index".to_string(), json!(index));
                if let Some(out) = run_sequence(run, body, scope, &iter_locals, cancel).await? {
                    last = out;
                }
                if let Some(expr) = break_condition
                    && eval_condition(expr, scope, &iter_locals)?
                {
                    break;
                }
            }
            Ok(last)
        }

        NodeBody::While { condition, body } => {
            let mut last = Value::Null;
            let mut iterations: u64 = 0;
            while eval_condition(condition, scope, locals)? {
                if iterations >= run.executor.options.safety_bound {
                    return Err(ExecutionError::Runtime {
                        message: format!(
                            "while `{}` exceeded the safety bound of {} iterations",
                            node.id, run.executor.options.safety_bound
                        ),
                    });
                }
                iterations += 1;
                if let Some(out) = run_sequence(run, body, scope, locals, cancel).await? {
                    last = out;
                }
            }
            Ok(last)
        }

        NodeBody::Foreach {
            collection,
            item_var,
            max_concurrency,
            body,
        } => {
            let ctx = EvalContext::from_state(&scope.state).with_locals(locals.clone());
            let items = match eval_attr(collection, &ctx)? {
                Value::Null => Vec::new(),
                Value::Array(items) => items,
                single => vec![single],
            };
            let concurrency = (*max_concurrency).unwrap_or(1).max(1) as usize;

            let mut outputs = Vec::with_capacity(items.len());
            if concurrency <= 1 {
                for (index, item) in items.iter().enumerate() {
                    let iter_locals = merged_locals(
                        locals,
                        iteration_locals(item, index, &items, item_var.as_deref()),
                    );
                    let out =
                        run_sequence(run, body, scope, &iter_locals, cancel).await?;
                    outputs.push(out.unwrap_or(Value::Null));
                }
            } else {
                // Batched forks: up to `concurrency` iterations in flight,
                // absorbed back in index order.
                for batch in items.chunks(concurrency) {
                    let batch_base = batch.len();
                    let offset = outputs.len();
                    let mut forks = Vec::with_capacity(batch_base);
                    for _ in 0..batch_base {
                        forks.push(scope.fork());
                    }
                    let tasks = batch.iter().zip(forks.into_iter()).enumerate().map(
                        |(i, (item, mut fork))| {
                            let index = offset + i;
                            let iter_locals = merged_locals(
                                locals,
                                iteration_locals(item, index, &items, item_var.as_deref()),
                            );
                            let cancel = cancel.clone();
                            async move {
                                let out = run_sequence(run, body, &mut fork, &iter_locals, &cancel)
                                    .await;
                                (fork, out)
                            }
                        },
                    );
                    let results = futures_util::future::join_all(tasks).await;
                    let mut first_err = None;
                    for (fork, out) in results {
                        scope.absorb(fork);
                        match out {
                            Ok(value) => outputs.push(value.unwrap_or(Value::Null)),
                            Err(err) => {
                                if first_err.is_none() {
                                    first_err = Some(err);
                                }
                            }
                        }
                    }
                    if let Some(err) = first_err {
                        return Err(err);
                    }
                }
            }
            Ok(Value::Array(outputs))
        }

        NodeBody::Parallel { branches } => {
            let mut forks = Vec::with_capacity(branches.len());
            for _ in 0..branches.len() {
                forks.push(scope.fork());
            }
            let tasks = branches.iter().zip(forks.into_iter()).map(|(branch, mut fork)| {
                let cancel = cancel.clone();
                async move {
                    let out = run_sequence(run, branch, &mut fork, locals, &cancel).await;
                    (fork, out)
                }
            });
            // Join on all branches; a failure fails the parallel only
            // after every branch has terminated.
            let results = futures_util::future::join_all(tasks).await;
            let mut outputs = Vec::with_capacity(branches.len());
            let mut first_err = None;
            for (fork, out) in results {
                scope.absorb(fork);
                match out {
                    Ok(value) => outputs.push(value.unwrap_or(Value::Null)),
                    Err(err) => {
                        if first_err.is_none() {
                            first_err = Some(err);
                        }
                    }
                }
            }
            match first_err {
                Some(err) => Err(err),
                None => Ok(Value::Array(outputs)),
            }
        }

        NodeBody::Checkpoint {
            prompt,
            default_action,
            ..
        } => {
            // Batch execution: no interactive driver, so the default
            // action applies immediately. The metadata echo allows a
            // replacement runtime to override the default.
            let action = metadata
                .get("defaultAction")
                .and_then(|v| v.as_str())
                .and_then(CheckpointAction::parse)
                .unwrap_or(*default_action);
            let ctx = EvalContext::from_state(&scope.state).with_locals(locals.clone());
            let prompt = render_template(prompt, &ctx)
                .map(|v| crate::expr::stringify(&v))
                .unwrap_or_else(|_| prompt.clone());
            match action {
                CheckpointAction::Approve => Ok(json!({
                    "approved": true,
                    "prompt": prompt,
                })),
                CheckpointAction::Reject => Err(ExecutionError::Runtime {
                    message: format!("checkpoint `{}` rejected: {prompt}", node.id),
                }),
            }
        }

        NodeBody::Timeout {
            duration,
            on_timeout,
            children,
        } => {
            let ctx = EvalContext::from_state(&scope.state).with_locals(locals.clone());
            let resolved = match eval_attr(duration, &ctx) {
                Ok(value) => crate::expr::stringify(&value),
                Err(_) => duration.clone(),
            };
            let Some(deadline) = parse_duration(&resolved) else {
                return Err(ExecutionError::Runtime {
                    message: format!("invalid timeout duration `{resolved}` on `{}`", node.id),
                });
            };
            let scope_cancel = cancel.child();
            let timed_out = {
                let children_run =
                    run_sequence(run, children, scope, locals, &scope_cancel);
                tokio::select! {
                    out = children_run => Some(out),
                    () = tokio::time::sleep(deadline) => None,
                }
            };
            match timed_out {
                Some(out) => out.map(|v| v.unwrap_or(Value::Null)),
                None => {
                    scope_cancel.cancel();
                    if let Some(target_id) = on_timeout
                        && let Some(target) = run.nodes_by_id.get(target_id)
                    {
                        return run.execute_node(target, scope, locals, cancel).await;
                    }
                    Err(ExecutionError::Timeout {
                        ms: deadline.as_millis() as u64,
                    })
                }
            }
        }

        NodeBody::Phase { name, children } => {
            let mut phase_ctx = FxHashMap::default();
            phase_ctx.insert("name".to_string(), Value::String(name.clone()));
            scope.set_phase(phase_ctx);
            run_sequence(run, children, scope, locals, cancel)
                .await
                .map(|out| out.unwrap_or(Value::Null))
        }

        NodeBody::Context { entries } => {
            let mut applied = serde_json::Map::new();
            for entry in entries {
                let ctx = EvalContext::from_state(&scope.state).with_locals(locals.clone());
                let value = render_template(&entry.value, &ctx)?;
                applied.insert(entry.key.clone(), value.clone());
                scope.set_global(entry.key.clone(), value);
            }
            Ok(Value::Object(applied))
        }

        NodeBody::Set { var, value } => {
            let ctx = EvalContext::from_state(&scope.state).with_locals(locals.clone());
            let resolved = render_template(value, &ctx)?;
            scope.set_global(var.clone(), resolved.clone());
            Ok(resolved)
        }

        other => Err(ExecutionError::Runtime {
            message: format!(
                "`{}` node `{}` has no interpretation",
                other.kind_name(),
                node.id
            ),
        }),
    }
}

/// Execute a child node list: plan it into sub-waves with the same Kahn
/// pass as the top level, then run the nodes in order within this scope.
/// Fails fast: within a container, the first failure aborts the rest.
///
/// Returns the last successful node output, if any.
pub(crate) async fn run_sequence(
    run: &RunContext<'_>,
    nodes: &[NodeAst],
    scope: &mut ScopeState,
    locals: &FxHashMap<String, Value>,
    cancel: &CancelToken,
) -> Result<Option<Value>, ExecutionError> {
    if nodes.is_empty() {
        return Ok(None);
    }
    let waves = plan_waves(nodes).map_err(|remaining| ExecutionError::Runtime {
        message: format!("unresolved dependencies among {remaining:?}"),
    })?;

    let mut last = None;
    for wave in waves {
        for id in &wave.node_ids {
            if cancel.is_cancelled() {
                let err = ExecutionError::Abort;
                scope.record(
                    id,
                    NodeResult::failure(&err, Utc::now(), Utc::now()),
                );
                return Err(err);
            }
            let node = nodes
                .iter()
                .find(|n| &n.id == id)
                .expect("planned node exists in slice");
            let out = run.execute_node(node, scope, locals, cancel).await?;
            last = Some(out);
        }
    }
    Ok(last)
}

fn merged_locals(
    base: &FxHashMap<String, Value>,
    extra: FxHashMap<String, Value>,
) -> FxHashMap<String, Value> {
    let mut merged = base.clone();
    for (key, value) in extra {
        merged.insert(key, value);
    }
    merged
}
