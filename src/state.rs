//! Per-run execution state.
//!
//! [`ExecutionState`] is the single mutable record of one workflow run:
//! status, timings, the insertion-ordered map of node results, and the
//! context layers expressions resolve against. It is owned by exactly one
//! executor; concurrent node tasks never touch it directly: they return
//! partial updates that the executor applies at wave joins, so all writes
//! are serialized through one owner.
//!
//! # Examples
//!
//! ```rust
//! use flowscript::state::ExecutionState;
//! use serde_json::json;
//!
//! let mut state = ExecutionState::builder("daily-report")
//!     .with_config_value("limit", json!(10))
//!     .with_global("input", json!({"x": 1}))
//!     .build();
//!
//! state.mark_running();
//! assert!(state.node_output("missing").is_none());
//! ```

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{ErrorDetail, ExecutionError};

/// Overall status of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Outcome of a single node execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    Failed,
    Skipped,
}

/// The recorded result of one node, with timings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl NodeResult {
    /// A successful result with the given output and timings.
    #[must_use]
    pub fn success(output: Value, started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> Self {
        Self {
            status: NodeStatus::Success,
            output: Some(output),
            error: None,
            duration_ms: duration_ms(started_at, completed_at),
            started_at,
            completed_at,
        }
    }

    /// A failed result recording the error.
    #[must_use]
    pub fn failure(
        error: &ExecutionError,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: NodeStatus::Failed,
            output: None,
            error: Some(ErrorDetail::from(error)),
            duration_ms: duration_ms(started_at, completed_at),
            started_at,
            completed_at,
        }
    }

    /// A skipped result (condition not met, or already satisfied by a
    /// resumed run).
    #[must_use]
    pub fn skipped(at: DateTime<Utc>) -> Self {
        Self {
            status: NodeStatus::Skipped,
            output: None,
            error: None,
            duration_ms: 0,
            started_at: at,
            completed_at: at,
        }
    }
}

fn duration_ms(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> u64 {
    (completed_at - started_at).num_milliseconds().max(0) as u64
}

/// Mutable state for one workflow run.
///
/// `node_results` preserves insertion order; the execution log and
/// last-output derivation depend on it.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionState {
    pub workflow_id: String,
    /// UUID v4 unless supplied by the caller (e.g. a resumed run).
    pub run_id: String,
    pub status: RunStatus,
    pub current_wave: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub node_results: IndexMap<String, NodeResult>,
    pub global_context: FxHashMap<String, Value>,
    pub phase_context: FxHashMap<String, Value>,
    pub node_context: FxHashMap<String, Value>,
    pub config: FxHashMap<String, Value>,
    pub secrets: FxHashMap<String, String>,
}

impl ExecutionState {
    /// A fresh pending state with a generated run id.
    #[must_use]
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self::builder(workflow_id).build()
    }

    #[must_use]
    pub fn builder(workflow_id: impl Into<String>) -> ExecutionStateBuilder {
        ExecutionStateBuilder {
            workflow_id: workflow_id.into(),
            run_id: None,
            config: FxHashMap::default(),
            secrets: FxHashMap::default(),
            global_context: FxHashMap::default(),
        }
    }

    /// Record a node's result. Single-writer: only the executor that owns
    /// this state calls this.
    pub fn record_node_result(&mut self, id: impl Into<String>, result: NodeResult) {
        self.node_results.insert(id.into(), result);
    }

    /// A node's output, present only when the node succeeded.
    #[must_use]
    pub fn node_output(&self, id: &str) -> Option<&Value> {
        self.node_results
            .get(id)
            .filter(|r| r.status == NodeStatus::Success)
            .and_then(|r| r.output.as_ref())
    }

    /// Whether any result (success, failure, or skip) is recorded for `id`.
    #[must_use]
    pub fn has_executed(&self, id: &str) -> bool {
        self.node_results.contains_key(id)
    }

    /// All successful outputs, in execution order.
    #[must_use]
    pub fn node_outputs(&self) -> IndexMap<String, Value> {
        self.node_results
            .iter()
            .filter(|(_, r)| r.status == NodeStatus::Success)
            .filter_map(|(id, r)| r.output.clone().map(|o| (id.clone(), o)))
            .collect()
    }

    /// The most recent successful output, if any.
    #[must_use]
    pub fn last_output(&self) -> Option<&Value> {
        self.node_results
            .values()
            .rev()
            .find(|r| r.status == NodeStatus::Success)
            .and_then(|r| r.output.as_ref())
    }

    /// Replace the phase context layer (shallow).
    pub fn set_phase_context(&mut self, context: FxHashMap<String, Value>) {
        self.phase_context = context;
    }

    /// Replace the node context layer (shallow).
    pub fn set_node_context(&mut self, context: FxHashMap<String, Value>) {
        self.node_context = context;
    }

    pub fn mark_running(&mut self) {
        self.status = RunStatus::Running;
    }

    pub fn mark_completed(&mut self) {
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self) {
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = RunStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }
}

/// Builder for [`ExecutionState`], mirroring the shape of a run request:
/// workflow id, optional run id, config, secrets, and initial globals.
#[derive(Debug)]
pub struct ExecutionStateBuilder {
    workflow_id: String,
    run_id: Option<String>,
    config: FxHashMap<String, Value>,
    secrets: FxHashMap<String, String>,
    global_context: FxHashMap<String, Value>,
}

impl ExecutionStateBuilder {
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: FxHashMap<String, Value>) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_config_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_secrets(mut self, secrets: FxHashMap<String, String>) -> Self {
        self.secrets = secrets;
        self
    }

    #[must_use]
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_global(mut self, key: impl Into<String>, value: Value) -> Self {
        self.global_context.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn build(self) -> ExecutionState {
        ExecutionState {
            workflow_id: self.workflow_id,
            run_id: self
                .run_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            status: RunStatus::Pending,
            current_wave: 0,
            started_at: Utc::now(),
            completed_at: None,
            node_results: IndexMap::new(),
            global_context: self.global_context,
            phase_context: FxHashMap::default(),
            node_context: FxHashMap::default(),
            config: self.config,
            secrets: self.secrets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result_with(status: NodeStatus, output: Option<Value>) -> NodeResult {
        let now = Utc::now();
        NodeResult {
            status,
            output,
            error: None,
            duration_ms: 0,
            started_at: now,
            completed_at: now,
        }
    }

    #[test]
    fn run_id_defaults_to_uuid() {
        let state = ExecutionState::new("wf");
        assert_eq!(state.run_id.len(), 36);
        assert_eq!(state.status, RunStatus::Pending);
    }

    #[test]
    fn node_output_requires_success() {
        let mut state = ExecutionState::new("wf");
        state.record_node_result("ok", result_with(NodeStatus::Success, Some(json!(1))));
        state.record_node_result("bad", result_with(NodeStatus::Failed, Some(json!(2))));
        assert_eq!(state.node_output("ok"), Some(&json!(1)));
        assert!(state.node_output("bad").is_none());
        assert!(state.has_executed("bad"));
        assert_eq!(state.node_outputs().len(), 1);
    }

    #[test]
    fn last_output_skips_failures() {
        let mut state = ExecutionState::new("wf");
        state.record_node_result("a", result_with(NodeStatus::Success, Some(json!("first"))));
        state.record_node_result("b", result_with(NodeStatus::Failed, None));
        assert_eq!(state.last_output(), Some(&json!("first")));
    }

    #[test]
    fn terminal_marks_stamp_completion() {
        let mut state = ExecutionState::new("wf");
        state.mark_running();
        assert!(state.completed_at.is_none());
        state.mark_failed();
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.completed_at.is_some());
    }
}
