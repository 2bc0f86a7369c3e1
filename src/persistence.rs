//! Persistence and resumption of execution state.
//!
//! State is serialized as JSON. `node_results` is written as an array of
//! `[id, result]` tuples: order is part of the contract (the log and
//! last-output derivation depend on it), and arrays avoid any JSON
//! object-key reservations. Errors persist as `{name, message, stack?,
//! code?}`.
//!
//! The default layout is `<state_dir>/<workflow_id>/<run_id>.json`; parent
//! directories are created as needed.
//!
//! A saved run is resumable iff it ended `failed` or `cancelled`. Resuming
//! resets the status to pending; the executor then skips every node that
//! already has a successful result, which lands it on the first wave with
//! unexecuted work.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::errors::ExecutionError;
use crate::state::{ExecutionState, NodeResult, RunStatus};

/// Serde model of a persisted run.
///
/// Field-for-field the same data as [`ExecutionState`], with the ordered
/// results map flattened to tuples.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedState {
    pub workflow_id: String,
    pub run_id: String,
    pub status: RunStatus,
    pub current_wave: usize,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub node_results: Vec<(String, NodeResult)>,
    #[serde(default)]
    pub global_context: FxHashMap<String, Value>,
    #[serde(default)]
    pub phase_context: FxHashMap<String, Value>,
    #[serde(default)]
    pub node_context: FxHashMap<String, Value>,
    #[serde(default)]
    pub config: FxHashMap<String, Value>,
    #[serde(default)]
    pub secrets: FxHashMap<String, String>,
}

impl From<&ExecutionState> for PersistedState {
    fn from(state: &ExecutionState) -> Self {
        Self {
            workflow_id: state.workflow_id.clone(),
            run_id: state.run_id.clone(),
            status: state.status,
            current_wave: state.current_wave,
            started_at: state.started_at,
            completed_at: state.completed_at,
            node_results: state
                .node_results
                .iter()
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect(),
            global_context: state.global_context.clone(),
            phase_context: state.phase_context.clone(),
            node_context: state.node_context.clone(),
            config: state.config.clone(),
            secrets: state.secrets.clone(),
        }
    }
}

impl PersistedState {
    /// Rebuild the in-memory state, preserving result order.
    #[must_use]
    pub fn into_state(self) -> ExecutionState {
        ExecutionState {
            workflow_id: self.workflow_id,
            run_id: self.run_id,
            status: self.status,
            current_wave: self.current_wave,
            started_at: self.started_at,
            completed_at: self.completed_at,
            node_results: self.node_results.into_iter().collect(),
            global_context: self.global_context,
            phase_context: self.phase_context,
            node_context: self.node_context,
            config: self.config,
            secrets: self.secrets,
        }
    }
}

/// Optional replacements applied at load time.
#[derive(Clone, Debug, Default)]
pub struct LoadOverrides {
    pub config: Option<FxHashMap<String, Value>>,
    pub secrets: Option<FxHashMap<String, String>>,
}

/// The default state file path: `<state_dir>/<workflow_id>/<run_id>.json`.
#[must_use]
pub fn state_path(state_dir: &Path, workflow_id: &str, run_id: &str) -> PathBuf {
    state_dir.join(workflow_id).join(format!("{run_id}.json"))
}

/// Serialize and write the state, creating parent directories as needed.
#[instrument(skip(state), fields(run = %state.run_id), err)]
pub async fn save_state(state: &ExecutionState, path: &Path) -> Result<(), ExecutionError> {
    let persisted = PersistedState::from(state);
    let json = serde_json::to_string_pretty(&persisted).map_err(|e| ExecutionError::File {
        path: path.display().to_string(),
        code: format!("SERIALIZE: {e}"),
    })?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(path, &e))?;
    }
    tokio::fs::write(path, json)
        .await
        .map_err(|e| io_error(path, &e))
}

/// Save under the default `<state_dir>/<workflow_id>/<run_id>.json`
/// layout, returning the path written.
pub async fn save_to_dir(
    state: &ExecutionState,
    state_dir: &Path,
) -> Result<PathBuf, ExecutionError> {
    let path = state_path(state_dir, &state.workflow_id, &state.run_id);
    save_state(state, &path).await?;
    Ok(path)
}

/// Load a saved state. Missing file → `FileError(ENOENT)`; malformed JSON
/// → `FileError(PARSE_ERROR)`.
pub async fn load_state(path: &Path) -> Result<ExecutionState, ExecutionError> {
    load_state_with(path, LoadOverrides::default()).await
}

#[instrument(skip(overrides), err)]
pub async fn load_state_with(
    path: &Path,
    overrides: LoadOverrides,
) -> Result<ExecutionState, ExecutionError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| io_error(path, &e))?;
    let persisted: PersistedState =
        serde_json::from_str(&raw).map_err(|_| ExecutionError::File {
            path: path.display().to_string(),
            code: "PARSE_ERROR".to_string(),
        })?;
    let mut state = persisted.into_state();
    if let Some(config) = overrides.config {
        state.config = config;
    }
    if let Some(secrets) = overrides.secrets {
        state.secrets = secrets;
    }
    Ok(state)
}

/// Whether the state saved at `path` can be resumed (`failed` or
/// `cancelled`).
pub async fn can_resume(path: &Path) -> bool {
    match load_state(path).await {
        Ok(state) => matches!(state.status, RunStatus::Failed | RunStatus::Cancelled),
        Err(_) => false,
    }
}

/// Reset a loaded state for re-execution. Successful node results stay in
/// place so the executor skips them.
pub fn prepare_resume(state: &mut ExecutionState) {
    state.status = RunStatus::Pending;
    state.completed_at = None;
    // Failed and skipped results are dropped so those nodes re-execute.
    state
        .node_results
        .retain(|_, result| result.status == crate::state::NodeStatus::Success);
}

fn io_error(path: &Path, error: &std::io::Error) -> ExecutionError {
    let code = match error.kind() {
        std::io::ErrorKind::NotFound => "ENOENT",
        std::io::ErrorKind::PermissionDenied => "EACCES",
        _ => "EIO",
    };
    ExecutionError::File {
        path: path.display().to_string(),
        code: code.to_string(),
    }
}
