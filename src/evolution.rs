//! Evolution feedback: run metrics, drift detection, and version bumps.
//!
//! Everything here is a pure function over recorded results and a history
//! of prior [`ExecutionMetrics`]: no I/O, no clock. Callers persist
//! metrics however they like and feed the history back in.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expr::type_name;
use crate::state::{ExecutionState, NodeStatus};

/// Aggregated metrics for one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub run_id: String,
    pub workflow_id: String,
    pub duration_ms: u64,
    /// Successful nodes / executed nodes, in `[0, 1]`.
    pub success_rate: f64,
    pub node_count: usize,
    pub failed_nodes: Vec<String>,
    pub succeeded_nodes: Vec<String>,
    /// Stays zero unless a pricing lookup is plugged in.
    pub total_cost: f64,
}

/// Derive metrics from a finished run.
#[must_use]
pub fn collect_metrics(state: &ExecutionState) -> ExecutionMetrics {
    let node_count = state.node_results.len();
    let succeeded_nodes: Vec<String> = state
        .node_results
        .iter()
        .filter(|(_, r)| r.status == NodeStatus::Success)
        .map(|(id, _)| id.clone())
        .collect();
    let failed_nodes: Vec<String> = state
        .node_results
        .iter()
        .filter(|(_, r)| r.status == NodeStatus::Failed)
        .map(|(id, _)| id.clone())
        .collect();
    let duration_ms = state
        .completed_at
        .map(|done| (done - state.started_at).num_milliseconds().max(0) as u64)
        .unwrap_or(0);
    ExecutionMetrics {
        run_id: state.run_id.clone(),
        workflow_id: state.workflow_id.clone(),
        duration_ms,
        success_rate: if node_count == 0 {
            1.0
        } else {
            succeeded_nodes.len() as f64 / node_count as f64
        },
        node_count,
        failed_nodes,
        succeeded_nodes,
        total_cost: 0.0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    RecurringFailure,
    PerformanceDegradation,
    SuccessRateDrop,
    Recovery,
}

/// One detected pattern across the run history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub kind: FeedbackKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub message: String,
}

/// Analyze the current run against prior history (oldest first).
#[must_use]
pub fn analyze_history(current: &ExecutionMetrics, history: &[ExecutionMetrics]) -> Vec<Feedback> {
    let mut findings = Vec::new();

    // Recurring failures: a node failing in >= 3 of the last 4 runs
    // (current included).
    let mut window: Vec<&ExecutionMetrics> = history.iter().rev().take(3).collect();
    window.insert(0, current);
    let mut failure_counts: FxHashMap<&str, usize> = FxHashMap::default();
    for run in &window {
        for node in &run.failed_nodes {
            *failure_counts.entry(node.as_str()).or_insert(0) += 1;
        }
    }
    let mut recurring: Vec<(&str, usize)> = failure_counts
        .into_iter()
        .filter(|(_, count)| *count >= 3)
        .collect();
    recurring.sort_unstable();
    for (node, count) in recurring {
        findings.push(Feedback {
            kind: FeedbackKind::RecurringFailure,
            node_id: Some(node.to_string()),
            message: format!("node `{node}` failed in {count} of the last {} runs", window.len()),
        });
    }

    if !history.is_empty() {
        let mean_duration =
            history.iter().map(|m| m.duration_ms as f64).sum::<f64>() / history.len() as f64;
        if mean_duration > 0.0 && current.duration_ms as f64 > 3.0 * mean_duration {
            findings.push(Feedback {
                kind: FeedbackKind::PerformanceDegradation,
                node_id: None,
                message: format!(
                    "run took {}ms, over 3x the rolling mean of {:.0}ms",
                    current.duration_ms, mean_duration
                ),
            });
        }

        let mean_rate =
            history.iter().map(|m| m.success_rate).sum::<f64>() / history.len() as f64;
        if current.success_rate <= 0.7 * mean_rate {
            findings.push(Feedback {
                kind: FeedbackKind::SuccessRateDrop,
                node_id: None,
                message: format!(
                    "success rate {:.2} dropped below 0.7x the prior mean {:.2}",
                    current.success_rate, mean_rate
                ),
            });
        }
    }

    // Recovery: a node that succeeded now after failing in at least the
    // last 3 runs.
    for node in &current.succeeded_nodes {
        let prior_failures = history
            .iter()
            .rev()
            .take_while(|run| run.failed_nodes.contains(node))
            .count();
        if prior_failures >= 3 {
            findings.push(Feedback {
                kind: FeedbackKind::Recovery,
                node_id: Some(node.clone()),
                message: format!("node `{node}` recovered after {prior_failures} straight failures"),
            });
        }
    }

    findings
}

// ---------------------------------------------------------------------------
// Behavior drift
// ---------------------------------------------------------------------------

/// Shape of one node's output: type plus size/keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeBehavior {
    pub output_type: String,
    pub size: usize,
    /// Sorted key list for object outputs; empty otherwise.
    pub keys: Vec<String>,
}

/// Per-node output shapes for one run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub nodes: FxHashMap<String, NodeBehavior>,
}

/// Capture the behavior profile of a finished run (successful outputs
/// only).
#[must_use]
pub fn capture_behavior(state: &ExecutionState) -> BehaviorProfile {
    let mut nodes = FxHashMap::default();
    for (id, result) in &state.node_results {
        if result.status != NodeStatus::Success {
            continue;
        }
        let output = result.output.as_ref().unwrap_or(&Value::Null);
        nodes.insert(id.clone(), behavior_of(output));
    }
    BehaviorProfile { nodes }
}

fn behavior_of(value: &Value) -> NodeBehavior {
    let (size, keys) = match value {
        Value::String(s) => (s.chars().count(), Vec::new()),
        Value::Array(items) => (items.len(), Vec::new()),
        Value::Object(map) => {
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();
            (map.len(), keys)
        }
        _ => (0, Vec::new()),
    };
    NodeBehavior {
        output_type: type_name(value).to_string(),
        size,
        keys,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    TypeChange,
    MissingNode,
    NewNode,
    KeyChange,
    LengthShift,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriftSignal {
    pub kind: DriftKind,
    pub node_id: String,
    pub message: String,
}

/// Result of comparing two behavior profiles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviorComparison {
    /// 0 = identical shapes; 1 = everything moved.
    pub drift_score: f64,
    pub signals: Vec<DriftSignal>,
}

impl BehaviorComparison {
    #[must_use]
    pub fn drift_detected(&self) -> bool {
        !self.signals.is_empty()
    }
}

/// Compare a baseline profile against the current one.
#[must_use]
pub fn compare_behavior(
    baseline: &BehaviorProfile,
    current: &BehaviorProfile,
) -> BehaviorComparison {
    let mut signals = Vec::new();
    let mut weight = 0.0f64;

    let mut node_ids: Vec<&String> = baseline.nodes.keys().chain(current.nodes.keys()).collect();
    node_ids.sort();
    node_ids.dedup();
    let universe = node_ids.len().max(1) as f64;

    for id in node_ids {
        match (baseline.nodes.get(id), current.nodes.get(id)) {
            (Some(_), None) => {
                weight += 1.0;
                signals.push(DriftSignal {
                    kind: DriftKind::MissingNode,
                    node_id: id.clone(),
                    message: format!("node `{id}` no longer produces output"),
                });
            }
            (None, Some(_)) => {
                weight += 0.5;
                signals.push(DriftSignal {
                    kind: DriftKind::NewNode,
                    node_id: id.clone(),
                    message: format!("node `{id}` is new"),
                });
            }
            (Some(before), Some(after)) => {
                if before.output_type != after.output_type {
                    weight += 1.0;
                    signals.push(DriftSignal {
                        kind: DriftKind::TypeChange,
                        node_id: id.clone(),
                        message: format!(
                            "node `{id}` output changed from {} to {}",
                            before.output_type, after.output_type
                        ),
                    });
                    continue;
                }
                if before.keys != after.keys {
                    weight += 0.5;
                    signals.push(DriftSignal {
                        kind: DriftKind::KeyChange,
                        node_id: id.clone(),
                        message: format!("node `{id}` object keys changed"),
                    });
                }
                if length_shifted(before.size, after.size) {
                    weight += 0.25;
                    signals.push(DriftSignal {
                        kind: DriftKind::LengthShift,
                        node_id: id.clone(),
                        message: format!(
                            "node `{id}` output size moved from {} to {}",
                            before.size, after.size
                        ),
                    });
                }
            }
            (None, None) => unreachable!("id came from one of the profiles"),
        }
    }

    BehaviorComparison {
        drift_score: (weight / universe).clamp(0.0, 1.0),
        signals,
    }
}

/// A size change of more than half the larger value counts as a shift.
fn length_shifted(before: usize, after: usize) -> bool {
    let larger = before.max(after);
    if larger == 0 {
        return false;
    }
    before.abs_diff(after) * 2 > larger
}

/// Suggest a behavior-bump version (`X.Y.Z+bN`) when drift was detected.
///
/// The `+bN` convention is informal (ordinary semver gates reject build
/// metadata); the format is preserved verbatim, incrementing an existing
/// counter.
#[must_use]
pub fn suggest_version_bump(version: &str, comparison: &BehaviorComparison) -> Option<String> {
    if !comparison.drift_detected() {
        return None;
    }
    match version.split_once("+b") {
        Some((base, counter)) => {
            let next = counter.parse::<u64>().map(|n| n + 1).unwrap_or(1);
            Some(format!("{base}+b{next}"))
        }
        None => Some(format!("{version}+b1")),
    }
}
