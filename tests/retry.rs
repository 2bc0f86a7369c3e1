//! Retry behavior: classification-driven recovery, attempt counting, and
//! backoff bounds.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use common::runtimes::{FailingRuntime, FlakyRuntime};
use common::run_with;
use flowscript::executor::{BACKOFF_CAP_MS, calculate_backoff_ms};
use flowscript::registry::RuntimeRegistry;
use flowscript::state::{NodeStatus, RunStatus};
use proptest::prelude::*;
use serde_json::json;

#[tokio::test]
async fn http_500_is_retried_until_success() {
    let body = r#"<source id="src" type="http" url="https://example.com"/>"#;
    let (flaky, calls) = FlakyRuntime::new(1, 500, json!({"ok": true}));
    let mut registry = RuntimeRegistry::with_builtins();
    registry.register("source:http", Arc::new(flaky));

    let start = Instant::now();
    let (state, outcome) = run_with(body, registry).await;
    outcome.expect("retry recovers");
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.node_results["src"].status, NodeStatus::Success);
    assert_eq!(state.node_output("src"), Some(&json!({"ok": true})));
    assert!(calls.load(Ordering::SeqCst) >= 2, "at least two attempts");
    // One full-jitter backoff at base 1000ms stays under a second.
    assert!(start.elapsed().as_millis() < 2_500);
}

#[tokio::test]
async fn http_404_is_not_retried() {
    let body = r#"<source id="src" type="http" url="https://example.com"/>"#;
    let (flaky, calls) = FlakyRuntime::new(1, 404, json!("never"));
    let mut registry = RuntimeRegistry::with_builtins();
    registry.register("source:http", Arc::new(flaky));

    let (state, outcome) = run_with(body, registry).await;
    assert!(outcome.is_err());
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "no retry on 4xx");
}

#[tokio::test]
async fn declared_retry_max_bounds_attempts() {
    let body = r#"
        <source id="src" type="http" url="https://example.com">
          <on-error><retry max="2" backoff="fixed"/></on-error>
        </source>
    "#;
    let (flaky, calls) = FlakyRuntime::new(10, 503, json!("unreachable"));
    let mut registry = RuntimeRegistry::with_builtins();
    registry.register("source:http", Arc::new(flaky));

    let (state, outcome) = run_with(body, registry).await;
    assert!(outcome.is_err());
    assert_eq!(state.node_results["src"].status, NodeStatus::Failed);
    // Initial attempt plus two retries.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn abort_like_failures_never_retry() {
    let body = r#"<source id="src" type="http" url="https://example.com"/>"#;
    let mut registry = RuntimeRegistry::with_builtins();
    registry.register("source:http", Arc::new(FailingRuntime(400)));
    let (state, outcome) = run_with(body, registry).await;
    assert!(outcome.is_err());
    let error = state.node_results["src"].error.as_ref().expect("error");
    assert_eq!(error.code.as_deref(), Some("400"));
}

proptest! {
    // Backoff bound: delay(k, base) ∈ [0, min(base·2^k, 32000)).
    #[test]
    fn backoff_within_bounds(attempt in 0u32..16, base in 1u64..5_000) {
        let delay = calculate_backoff_ms(attempt, base);
        let ceiling = base
            .checked_shl(attempt)
            .unwrap_or(BACKOFF_CAP_MS)
            .min(BACKOFF_CAP_MS);
        prop_assert!(delay < ceiling.max(1));
        prop_assert!(delay < BACKOFF_CAP_MS);
    }
}
