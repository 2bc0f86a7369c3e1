//! Layered variable lookup for expression evaluation.
//!
//! Layers, lowest precedence first: workflow `config` → secrets (exposed as
//! `$secrets.*`) → global context → phase context → node context →
//! iteration locals. Later layers shadow earlier ones. Node results are
//! addressable by node id (`{{fetch.output.title}}`) once the node has
//! executed.
//!
//! Secrets are never written into diagnostics; [`EvalContext::redacted_snapshot`]
//! is the only context rendering the error path uses.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::state::{ExecutionState, NodeResult};

/// Read-only view over the context layers for one evaluation.
///
/// Cheap to construct per node / per iteration; iteration locals are the
/// only owned layer.
#[derive(Clone, Debug, Default)]
pub struct EvalContext<'a> {
    config: Option<&'a FxHashMap<String, Value>>,
    secrets: Option<&'a FxHashMap<String, String>>,
    global: Option<&'a FxHashMap<String, Value>>,
    phase: Option<&'a FxHashMap<String, Value>>,
    node: Option<&'a FxHashMap<String, Value>>,
    node_results: Option<&'a IndexMap<String, NodeResult>>,
    /// Iteration locals (`$item`, `$index`, …) plus any named item var.
    pub locals: FxHashMap<String, Value>,
}

impl<'a> EvalContext<'a> {
    /// An empty context; lookups only see what is added afterwards.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full layered context from a run's execution state.
    #[must_use]
    pub fn from_state(state: &'a ExecutionState) -> Self {
        Self {
            config: Some(&state.config),
            secrets: Some(&state.secrets),
            global: Some(&state.global_context),
            phase: Some(&state.phase_context),
            node: Some(&state.node_context),
            node_results: Some(&state.node_results),
            locals: FxHashMap::default(),
        }
    }

    /// Derive a context with additional iteration locals layered on top.
    #[must_use]
    pub fn with_locals(&self, locals: FxHashMap<String, Value>) -> Self {
        let mut next = self.clone();
        for (key, value) in locals {
            next.locals.insert(key, value);
        }
        next
    }

    /// Insert a single local binding (highest-precedence layer).
    pub fn insert_local(&mut self, key: impl Into<String>, value: Value) {
        self.locals.insert(key.into(), value);
    }

    /// Resolve an identifier through the layers, highest precedence first.
    ///
    /// Returns `None` when no layer defines the name; the evaluator turns
    /// that into an unknown-identifier error.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.locals.get(name) {
            return Some(value.clone());
        }
        if let Some(node) = self.node
            && let Some(value) = node.get(name)
        {
            return Some(value.clone());
        }
        if let Some(phase) = self.phase
            && let Some(value) = phase.get(name)
        {
            return Some(value.clone());
        }
        if let Some(global) = self.global
            && let Some(value) = global.get(name)
        {
            return Some(value.clone());
        }
        if let Some(results) = self.node_results
            && let Some(result) = results.get(name)
        {
            return Some(node_result_value(result));
        }
        if name == "$secrets" {
            let map: serde_json::Map<String, Value> = self
                .secrets
                .map(|s| {
                    s.iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect()
                })
                .unwrap_or_default();
            return Some(Value::Object(map));
        }
        if let Some(config) = self.config
            && let Some(value) = config.get(name)
        {
            return Some(value.clone());
        }
        None
    }

    /// A diagnostic-safe description of the context: layer keys only, with
    /// secret names listed but values elided.
    #[must_use]
    pub fn redacted_snapshot(&self) -> String {
        fn keys(map: Option<&FxHashMap<String, Value>>) -> Vec<&str> {
            let mut out: Vec<&str> = map
                .map(|m| m.keys().map(String::as_str).collect())
                .unwrap_or_default();
            out.sort_unstable();
            out
        }
        let mut locals: Vec<&str> = self.locals.keys().map(String::as_str).collect();
        locals.sort_unstable();
        let mut secret_names: Vec<&str> = self
            .secrets
            .map(|s| s.keys().map(String::as_str).collect())
            .unwrap_or_default();
        secret_names.sort_unstable();
        let nodes: Vec<&str> = self
            .node_results
            .map(|r| r.keys().map(String::as_str).collect())
            .unwrap_or_default();
        json!({
            "config": keys(self.config),
            "global": keys(self.global),
            "phase": keys(self.phase),
            "node": keys(self.node),
            "locals": locals,
            "nodes": nodes,
            "secrets": secret_names.iter().map(|_| "<redacted>").collect::<Vec<_>>(),
        })
        .to_string()
    }
}

/// The value a node id resolves to in expressions: status plus output for
/// executed nodes.
fn node_result_value(result: &NodeResult) -> Value {
    json!({
        "status": result.status,
        "output": result.output.clone().unwrap_or(Value::Null),
    })
}

/// Standard iteration locals for one `foreach`/`map` iteration.
#[must_use]
pub fn iteration_locals(
    item: &Value,
    index: usize,
    items: &[Value],
    item_var: Option<&str>,
) -> FxHashMap<String, Value> {
    let mut locals = FxHashMap::default();
    locals.insert("$item".to_string(), item.clone());
    locals.insert("$index".to_string(), json!(index));
    locals.insert("$first".to_string(), Value::Bool(index == 0));
    locals.insert(
        "$last".to_string(),
        Value::Bool(index + 1 == items.len()),
    );
    locals.insert("$items".to_string(), Value::Array(items.to_vec()));
    if let Some(var) = item_var {
        locals.insert(var.to_string(), item.clone());
    }
    locals
}
