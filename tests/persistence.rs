//! State persistence: JSON round-trip, error codes, and resume.

mod common;

use std::sync::Arc;

use common::compile;
use common::runtimes::{FlakyRuntime, StaticSource};
use flowscript::executor::Executor;
use flowscript::persistence::{
    LoadOverrides, can_resume, load_state, load_state_with, prepare_resume, save_state,
    save_to_dir, state_path,
};
use flowscript::registry::RuntimeRegistry;
use flowscript::state::{ExecutionState, NodeResult, NodeStatus, RunStatus};
use serde_json::json;

fn sample_state() -> ExecutionState {
    let mut state = ExecutionState::builder("demo")
        .with_config_value("limit", json!(3))
        .with_secret("API_KEY", "shh")
        .with_global("input", json!({"x": 1}))
        .build();
    let now = chrono::Utc::now();
    state.record_node_result("a", NodeResult::success(json!([1, 2]), now, now));
    state.record_node_result(
        "b",
        NodeResult::failure(
            &flowscript::errors::ExecutionError::Http {
                status: 502,
                body: Some("bad gateway".into()),
            },
            now,
            now,
        ),
    );
    state.mark_failed();
    state
}

#[tokio::test]
async fn save_load_round_trip_preserves_structure_and_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = sample_state();
    let path = save_to_dir(&state, dir.path()).await.expect("save");
    assert_eq!(path, state_path(dir.path(), "demo", &state.run_id));

    let loaded = load_state(&path).await.expect("load");
    assert_eq!(loaded, state);
    let ids: Vec<&String> = loaded.node_results.keys().collect();
    assert_eq!(ids, vec!["a", "b"]);
    let error = loaded.node_results["b"].error.as_ref().expect("error");
    assert_eq!(error.name, "HttpError");
    assert_eq!(error.code.as_deref(), Some("502"));
}

#[tokio::test]
async fn node_results_serialize_as_tuples() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = sample_state();
    let path = save_to_dir(&state, dir.path()).await.expect("save");
    let raw: serde_json::Value =
        serde_json::from_str(&tokio::fs::read_to_string(&path).await.expect("read"))
            .expect("json");
    let results = raw.get("node_results").expect("field");
    assert!(results.is_array());
    assert_eq!(results[0][0], json!("a"));
    assert!(results[0][1].is_object());
}

#[tokio::test]
async fn missing_file_is_enoent_and_garbage_is_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nope.json");
    let err = load_state(&missing).await.unwrap_err();
    match err {
        flowscript::errors::ExecutionError::File { code, .. } => assert_eq!(code, "ENOENT"),
        other => panic!("expected FileError, got {other}"),
    }

    let garbage = dir.path().join("bad.json");
    tokio::fs::write(&garbage, "{not json").await.expect("write");
    let err = load_state(&garbage).await.unwrap_err();
    match err {
        flowscript::errors::ExecutionError::File { code, .. } => assert_eq!(code, "PARSE_ERROR"),
        other => panic!("expected FileError, got {other}"),
    }
}

#[tokio::test]
async fn overrides_replace_config_and_secrets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = sample_state();
    let path = save_to_dir(&state, dir.path()).await.expect("save");

    let mut config = rustc_hash::FxHashMap::default();
    config.insert("limit".to_string(), json!(99));
    let loaded = load_state_with(
        &path,
        LoadOverrides {
            config: Some(config),
            secrets: None,
        },
    )
    .await
    .expect("load");
    assert_eq!(loaded.config.get("limit"), Some(&json!(99)));
    assert_eq!(loaded.secrets.get("API_KEY").map(String::as_str), Some("shh"));
}

#[tokio::test]
async fn resumable_only_when_failed_or_cancelled() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut failed = sample_state();
    failed.mark_failed();
    let failed_path = save_to_dir(&failed, dir.path()).await.expect("save");
    assert!(can_resume(&failed_path).await);

    let mut done = ExecutionState::new("demo");
    done.mark_completed();
    let done_path = save_to_dir(&done, dir.path()).await.expect("save");
    assert!(!can_resume(&done_path).await);

    let mut cancelled = ExecutionState::new("demo");
    cancelled.mark_cancelled();
    let cancelled_path = save_to_dir(&cancelled, dir.path()).await.expect("save");
    assert!(can_resume(&cancelled_path).await);

    assert!(!can_resume(&dir.path().join("absent.json")).await);
}

#[tokio::test]
async fn resume_skips_completed_waves() {
    let body = r#"
        <source id="fetch" type="http" url="https://example.com"/>
        <transform id="shape" type="map" input="fetch" expression="{{$item + 1}}"/>
        <sink id="deliver" type="http" input="shape" url="https://example.com/out"/>
    "#;
    let (_, plan) = compile(body);

    // First run: the sink fails twice (both initial runs), then recovers.
    let (flaky_sink, sink_calls) = FlakyRuntime::new(4, 500, json!("delivered"));
    let flaky_sink = Arc::new(flaky_sink);
    let mut registry = RuntimeRegistry::with_builtins();
    registry.register("source:http", Arc::new(StaticSource(json!([1, 2]))));
    registry.register("sink:http", flaky_sink.clone());
    let executor = Executor::new(Arc::new(registry.clone()));

    let mut state = ExecutionState::new("demo");
    let first = executor.execute(&plan, &mut state).await;
    assert!(first.is_err(), "sink fails the first run");
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.node_results["fetch"].status, NodeStatus::Success);
    assert_eq!(state.node_results["shape"].status, NodeStatus::Success);

    // Persist, reload, resume: waves 0 and 1 must not re-execute.
    let dir = tempfile::tempdir().expect("tempdir");
    let path = save_to_dir(&state, dir.path()).await.expect("save");
    let mut resumed = load_state(&path).await.expect("load");
    assert!(can_resume(&path).await);
    prepare_resume(&mut resumed);
    assert_eq!(resumed.status, RunStatus::Pending);

    let calls_before_resume = sink_calls.load(std::sync::atomic::Ordering::SeqCst);
    let second = executor.execute(&plan, &mut resumed).await;
    second.expect("resumed run completes");
    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.node_output("deliver"), Some(&json!("delivered")));
    // Source and transform kept their original results; only the sink ran.
    assert_eq!(
        sink_calls.load(std::sync::atomic::Ordering::SeqCst) - calls_before_resume,
        1,
        "only the failed sink re-executed"
    );
}
