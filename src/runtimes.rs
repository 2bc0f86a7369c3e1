//! Built-in node runtimes.
//!
//! Data-flow work the core can do itself (template/map/filter transforms,
//! delay) plus the metadata runtimes for control flow. External concerns
//! (HTTP, file I/O, AI providers, email, database sinks, and workflow
//! composition) are deliberately absent; they plug in through the
//! registry under their own type keys.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::ast::NodeBody;
use crate::errors::ExecutionError;
use crate::executor::duration::parse_duration;
use crate::expr::{EvalContext, iteration_locals, render_template};
use crate::registry::{ExecutionParams, NodeRuntime, RuntimeRegistry};

/// Register every built-in runtime.
pub fn register_builtins(registry: &mut RuntimeRegistry) {
    registry.register("transform:template", Arc::new(TemplateTransform));
    registry.register("transform:map", Arc::new(MapTransform));
    registry.register("transform:filter", Arc::new(FilterTransform));
    registry.register("temporal:delay", Arc::new(DelayRuntime));
    for key in [
        "temporal:timeout",
        "control:branch",
        "control:if",
        "control:loop",
        "control:while",
        "control:foreach",
        "control:parallel",
        "control:checkpoint",
        "scope:phase",
        "scope:context",
        "scope:set",
    ] {
        registry.register(key, Arc::new(ControlMetadata));
    }
}

/// `transform:template`: renders the captured template against the state
/// context with the node's input bound as `input`.
pub struct TemplateTransform;

#[async_trait]
impl NodeRuntime for TemplateTransform {
    async fn execute(&self, params: ExecutionParams<'_>) -> Result<Value, ExecutionError> {
        let template = params
            .node
            .config
            .get("template")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let mut ctx = EvalContext::from_state(params.state);
        ctx.insert_local("input", params.input.clone().unwrap_or(Value::Null));
        Ok(render_template(template, &ctx)?)
    }
}

/// `transform:map`: evaluates `expression` once per input item with the
/// iteration locals in scope. Singleton inputs are wrapped.
pub struct MapTransform;

#[async_trait]
impl NodeRuntime for MapTransform {
    async fn execute(&self, params: ExecutionParams<'_>) -> Result<Value, ExecutionError> {
        let expression = raw_expression(&params)?;
        let items = as_items(params.input.clone());
        let base = EvalContext::from_state(params.state);
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let ctx = base.with_locals(iteration_locals(item, index, &items, None));
            out.push(crate::expr::evaluate(&expression, &ctx)?);
        }
        Ok(Value::Array(out))
    }
}

/// `transform:filter`: keeps the items whose `expression` is truthy.
pub struct FilterTransform;

#[async_trait]
impl NodeRuntime for FilterTransform {
    async fn execute(&self, params: ExecutionParams<'_>) -> Result<Value, ExecutionError> {
        let expression = raw_expression(&params)?;
        let items = as_items(params.input.clone());
        let base = EvalContext::from_state(params.state);
        let mut out = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let ctx = base.with_locals(iteration_locals(item, index, &items, None));
            if crate::expr::is_truthy(&crate::expr::evaluate(&expression, &ctx)?) {
                out.push(item.clone());
            }
        }
        Ok(Value::Array(out))
    }
}

/// `temporal:delay`: sleeps for the parsed duration, passing its input
/// through. Honors cancellation.
pub struct DelayRuntime;

#[async_trait]
impl NodeRuntime for DelayRuntime {
    async fn execute(&self, params: ExecutionParams<'_>) -> Result<Value, ExecutionError> {
        let raw = params
            .config
            .get("duration")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| match &params.node.body {
                NodeBody::Delay { duration } => Some(duration.clone()),
                _ => None,
            })
            .unwrap_or_default();
        let duration = parse_duration(&raw).ok_or_else(|| ExecutionError::Runtime {
            message: format!("invalid delay duration `{raw}`"),
        })?;
        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(params.input.unwrap_or(Value::Null)),
            () = params.cancel.cancelled() => Err(ExecutionError::Abort),
        }
    }
}

/// Metadata runtime for control-flow constructs: echoes the parameters the
/// executor needs to interpret the node. Expressions stay raw; the
/// executor evaluates conditions per iteration.
pub struct ControlMetadata;

#[async_trait]
impl NodeRuntime for ControlMetadata {
    async fn execute(&self, params: ExecutionParams<'_>) -> Result<Value, ExecutionError> {
        let meta = match &params.node.body {
            NodeBody::Branch { cases, default } => json!({
                "cases": cases.iter().map(|c| c.condition.clone()).collect::<Vec<_>>(),
                "hasDefault": default.is_some(),
            }),
            NodeBody::If { condition, .. } => json!({ "condition": condition }),
            NodeBody::Loop {
                max_iterations,
                break_condition,
                ..
            } => json!({
                "maxIterations": max_iterations,
                "breakCondition": break_condition,
            }),
            NodeBody::While { condition, .. } => json!({ "condition": condition }),
            NodeBody::Foreach {
                collection,
                item_var,
                max_concurrency,
                ..
            } => json!({
                "collection": collection,
                "itemVar": item_var,
                "maxConcurrency": max_concurrency,
            }),
            NodeBody::Parallel { branches } => json!({ "branches": branches.len() }),
            NodeBody::Checkpoint {
                prompt,
                timeout,
                default_action,
            } => json!({
                "prompt": prompt,
                "timeout": timeout,
                "defaultAction": default_action,
            }),
            NodeBody::Timeout {
                duration,
                on_timeout,
                children,
            } => json!({
                "duration": duration,
                "onTimeout": on_timeout,
                "children": children.len(),
            }),
            NodeBody::Phase { name, .. } => json!({ "name": name }),
            NodeBody::Context { entries } => json!({
                "entries": entries.iter().map(|b| b.key.clone()).collect::<Vec<_>>(),
            }),
            NodeBody::Set { var, value } => json!({ "var": var, "value": value }),
            other => {
                return Err(ExecutionError::Runtime {
                    message: format!(
                        "control metadata runtime invoked for `{}` node `{}`",
                        other.kind_name(),
                        params.node.id
                    ),
                });
            }
        };
        Ok(meta)
    }
}

fn raw_expression(params: &ExecutionParams<'_>) -> Result<String, ExecutionError> {
    params
        .node
        .config
        .get("expression")
        .and_then(|v| v.as_str())
        .map(|raw| {
            // Accept both `{{ expr }}` attributes and bare expressions.
            raw.trim()
                .strip_prefix("{{")
                .and_then(|s| s.strip_suffix("}}"))
                .unwrap_or(raw)
                .trim()
                .to_string()
        })
        .ok_or_else(|| ExecutionError::Runtime {
            message: format!("transform `{}` is missing `expression`", params.node.id),
        })
}

fn as_items(input: Option<Value>) -> Vec<Value> {
    match input {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(single) => vec![single],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TransformType;
    use crate::state::ExecutionState;
    use indexmap::IndexMap;
    use serde_json::Map;

    fn node(body: NodeBody, config: IndexMap<String, Value>) -> crate::ast::NodeAst {
        crate::ast::NodeAst {
            id: "n".into(),
            loc: crate::source::SourceLocation::at(crate::source::Position::start()),
            input: None,
            error_config: None,
            config,
            body,
        }
    }

    fn params<'a>(
        node: &'a crate::ast::NodeAst,
        state: &'a ExecutionState,
        input: Option<Value>,
    ) -> ExecutionParams<'a> {
        ExecutionParams {
            node,
            input,
            config: Map::new(),
            state,
            cancel: crate::cancel::CancelToken::new(),
        }
    }

    #[tokio::test]
    async fn map_transform_projects_items() {
        let mut config = IndexMap::new();
        config.insert("expression".to_string(), json!("{{$item * 2}}"));
        let node = node(
            NodeBody::Transform {
                transform_type: TransformType::Map,
            },
            config,
        );
        let state = ExecutionState::new("wf");
        let out = MapTransform
            .execute(params(&node, &state, Some(json!([1, 2, 3]))))
            .await
            .unwrap();
        assert_eq!(out, json!([2, 4, 6]));
    }

    #[tokio::test]
    async fn filter_transform_keeps_truthy() {
        let mut config = IndexMap::new();
        config.insert("expression".to_string(), json!("$item > 1"));
        let node = node(
            NodeBody::Transform {
                transform_type: TransformType::Filter,
            },
            config,
        );
        let state = ExecutionState::new("wf");
        let out = FilterTransform
            .execute(params(&node, &state, Some(json!([1, 2, 3]))))
            .await
            .unwrap();
        assert_eq!(out, json!([2, 3]));
    }

    #[tokio::test]
    async fn template_sees_input() {
        let mut config = IndexMap::new();
        config.insert("template".to_string(), json!("got {{input.x}}"));
        let node = node(
            NodeBody::Transform {
                transform_type: TransformType::Template,
            },
            config,
        );
        let state = ExecutionState::new("wf");
        let out = TemplateTransform
            .execute(params(&node, &state, Some(json!({"x": 7}))))
            .await
            .unwrap();
        assert_eq!(out, json!("got 7"));
    }
}
