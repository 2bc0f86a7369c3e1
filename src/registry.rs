//! Runtime registry: type-keyed dispatch for node execution.
//!
//! A [`NodeRuntime`] executes nodes of one type, looked up by the node's
//! type key (`source:http`, `transform:map`, `temporal:delay`, …). The
//! registry's lifecycle is initialization-then-read-only: register every
//! runtime before the first `execute`, then treat it as immutable
//! (`clear` exists for tests).
//!
//! Control-flow constructs are runtimes too: they return **metadata**
//! values (the loop cap and break expression, the foreach collection
//! expression, the timeout duration) that the executor interprets. That
//! uniform contract is the extension point: external crates plug in HTTP,
//! file, AI, or composition runtimes without the executor changing.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::ast::NodeAst;
use crate::cancel::CancelToken;
use crate::errors::ExecutionError;
use crate::state::ExecutionState;

/// Everything a runtime gets for one node execution.
pub struct ExecutionParams<'a> {
    pub node: &'a NodeAst,
    /// The upstream node's output, when `input` is wired and succeeded.
    pub input: Option<Value>,
    /// The node's config with template-bearing values already resolved
    /// (expression-bearing keys the executor defers are passed verbatim).
    pub config: Map<String, Value>,
    /// Read-only view of the run state.
    pub state: &'a ExecutionState,
    /// Cooperative cancellation signal for this attempt.
    pub cancel: CancelToken,
}

/// A pluggable node executor.
#[async_trait]
pub trait NodeRuntime: Send + Sync {
    async fn execute(&self, params: ExecutionParams<'_>) -> Result<Value, ExecutionError>;
}

/// Type-keyed dispatch table.
#[derive(Clone, Default)]
pub struct RuntimeRegistry {
    runtimes: FxHashMap<String, Arc<dyn NodeRuntime>>,
}

impl RuntimeRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the built-in runtimes (template/map/
    /// filter transforms, control-flow metadata, delay).
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::runtimes::register_builtins(&mut registry);
        registry
    }

    /// Register a runtime for a type key, replacing any previous one.
    pub fn register(&mut self, type_key: impl Into<String>, runtime: Arc<dyn NodeRuntime>) {
        self.runtimes.insert(type_key.into(), runtime);
    }

    #[must_use]
    pub fn get(&self, type_key: &str) -> Option<Arc<dyn NodeRuntime>> {
        self.runtimes.get(type_key).cloned()
    }

    #[must_use]
    pub fn has(&self, type_key: &str) -> bool {
        self.runtimes.contains_key(type_key)
    }

    /// Registered type keys, sorted for stable output.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.runtimes.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Remove everything. Intended for tests.
    pub fn clear(&mut self) {
        self.runtimes.clear();
    }
}

impl std::fmt::Debug for RuntimeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeRegistry")
            .field("types", &self.list())
            .finish()
    }
}
