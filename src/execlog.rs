//! Markdown execution log.
//!
//! Renders a run summary as a markdown block and splices it into a
//! workflow file: appended beneath a `---` separator, or replacing a
//! previous `## Execution Log` section in place.

use std::path::Path;

use crate::errors::ExecutionError;
use crate::expr::stringify;
use crate::state::{ExecutionState, NodeResult, NodeStatus, RunStatus};

const LOG_HEADING: &str = "## Execution Log";
const OUTPUT_LIMIT: usize = 50;

/// Render the log block for a run.
#[must_use]
pub fn render_log(state: &ExecutionState) -> String {
    let duration_secs = state
        .completed_at
        .map(|done| (done - state.started_at).num_milliseconds().max(0) as f64 / 1000.0)
        .unwrap_or(0.0);

    let mut out = String::new();
    out.push_str(LOG_HEADING);
    out.push_str("\n\n");
    out.push_str(&format!("- **Run**: {}\n", state.run_id));
    out.push_str(&format!("- **Workflow**: {}\n", state.workflow_id));
    out.push_str(&format!(
        "- **Started**: {}\n",
        state.started_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    ));
    out.push_str(&format!("- **Duration**: {duration_secs:.2}s\n"));
    out.push_str(&format!("- **Status**: {}\n", status_label(state.status)));
    out.push_str(&format!("- **Waves**: {}\n", state.current_wave + 1));
    out.push('\n');
    out.push_str("| Node | Status | Duration | Output |\n");
    out.push_str("|------|--------|----------|--------|\n");

    let mut rows: Vec<(&String, &NodeResult)> = state.node_results.iter().collect();
    rows.sort_by_key(|(_, result)| result.started_at);
    for (id, result) in rows {
        let output = result
            .output
            .as_ref()
            .map(|v| cell(&stringify(v)))
            .unwrap_or_default();
        out.push_str(&format!(
            "| {} | {} | {}ms | {} |\n",
            cell(id),
            node_status_label(result.status),
            result.duration_ms,
            output
        ));
    }
    out
}

/// Splice the log into workflow file content.
///
/// An existing `## Execution Log` section is replaced in place (up to the
/// next `## ` heading or end of file); otherwise the block is appended
/// beneath a `---` separator.
#[must_use]
pub fn splice_log(content: &str, state: &ExecutionState) -> String {
    let block = render_log(state);
    if let Some(start) = content.find(LOG_HEADING) {
        let after_heading = start + LOG_HEADING.len();
        let section_end = content[after_heading..]
            .find("\n## ")
            .map(|i| after_heading + i + 1)
            .unwrap_or(content.len());
        let mut out = String::with_capacity(content.len() + block.len());
        out.push_str(&content[..start]);
        out.push_str(&block);
        out.push_str(&content[section_end..]);
        out
    } else {
        let mut out = content.to_string();
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("\n---\n\n");
        out.push_str(&block);
        out
    }
}

/// Append (or replace) the log section in the workflow file on disk.
pub async fn append_log_to_file(
    path: &Path,
    state: &ExecutionState,
) -> Result<(), ExecutionError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| file_error(path, &e))?;
    let updated = splice_log(&content, state);
    tokio::fs::write(path, updated)
        .await
        .map_err(|e| file_error(path, &e))
}

/// Truncate to the cell limit and escape pipes so the table stays intact.
fn cell(raw: &str) -> String {
    let flat = raw.replace('\n', " ").replace('|', "\\|");
    if flat.chars().count() <= OUTPUT_LIMIT {
        flat
    } else {
        let cut: String = flat.chars().take(OUTPUT_LIMIT).collect();
        format!("{cut}…")
    }
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    }
}

fn node_status_label(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Success => "success",
        NodeStatus::Failed => "failed",
        NodeStatus::Skipped => "skipped",
    }
}

fn file_error(path: &Path, error: &std::io::Error) -> ExecutionError {
    ExecutionError::File {
        path: path.display().to_string(),
        code: match error.kind() {
            std::io::ErrorKind::NotFound => "ENOENT".to_string(),
            _ => "EIO".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn state_with_results() -> ExecutionState {
        let mut state = ExecutionState::new("demo");
        let now = Utc::now();
        state.record_node_result(
            "fetch",
            NodeResult::success(json!({"a": "x|y"}), now, now),
        );
        state.record_node_result(
            "render",
            NodeResult::success(
                json!("a".repeat(80)),
                now + chrono::Duration::milliseconds(5),
                now + chrono::Duration::milliseconds(9),
            ),
        );
        state.mark_completed();
        state
    }

    #[test]
    fn renders_table_sorted_with_truncation_and_escaping() {
        let log = render_log(&state_with_results());
        assert!(log.starts_with(LOG_HEADING));
        assert!(log.contains("| Node | Status | Duration | Output |"));
        // Pipe escaped inside the output cell.
        assert!(log.contains("\\|"));
        // Long outputs are cut at the limit with an ellipsis.
        assert!(log.contains(&format!("{}…", "a".repeat(OUTPUT_LIMIT))));
        let fetch_at = log.find("| fetch |").unwrap();
        let render_at = log.find("| render |").unwrap();
        assert!(fetch_at < render_at);
    }

    #[test]
    fn appends_beneath_separator() {
        let updated = splice_log("---\nname: x\n---\n<nodes/>\n", &state_with_results());
        assert!(updated.contains("\n---\n\n## Execution Log"));
    }

    #[test]
    fn replaces_existing_section_in_place() {
        let original = "body\n\n---\n\n## Execution Log\n\nold content\n\n## Other\nkeep\n";
        let updated = splice_log(original, &state_with_results());
        assert!(!updated.contains("old content"));
        assert!(updated.contains("## Other\nkeep"));
        assert_eq!(updated.matches(LOG_HEADING).count(), 1);
    }
}
