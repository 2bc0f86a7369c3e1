//! End-to-end pipeline scenarios: parse → validate → plan → execute.

mod common;

use std::sync::Arc;

use common::runtimes::{EchoRuntime, FailingRuntime, StaticSource};
use common::{compile, doc, run, run_with};
use flowscript::parser::parse_workflow;
use flowscript::registry::RuntimeRegistry;
use flowscript::state::{NodeStatus, RunStatus};
use flowscript::validator::validate;
use serde_json::json;

#[tokio::test]
async fn minimal_template_workflow_completes() {
    let body = r#"<transform id="t" type="template"><template>hello world</template></transform>"#;

    let (_, plan) = compile(body);
    assert_eq!(plan.waves.len(), 1);
    assert_eq!(plan.waves[0].node_ids, vec!["t"]);

    let (state, outcome) = run(body).await;
    outcome.expect("run completes");
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.node_output("t"), Some(&json!("hello world")));
}

#[tokio::test]
async fn outputs_flow_along_input_edges() {
    let body = r#"
        <source id="A" type="http" url="https://example.com/items"/>
        <transform id="B" type="map" input="A" expression="{{$item * 10}}"/>
        <sink id="C" type="http" input="B" url="https://example.com/out"/>
    "#;

    let (_, plan) = compile(body);
    let waves: Vec<Vec<String>> = plan.waves.iter().map(|w| w.node_ids.clone()).collect();
    assert_eq!(waves, vec![vec!["A"], vec!["B"], vec!["C"]]);

    let mut registry = RuntimeRegistry::with_builtins();
    registry.register("source:http", Arc::new(StaticSource(json!([1, 2]))));
    registry.register("sink:http", Arc::new(EchoRuntime));

    let (state, outcome) = run_with(body, registry).await;
    outcome.expect("run completes");
    assert_eq!(state.node_output("B"), Some(&json!([10, 20])));
    assert_eq!(state.node_output("C"), Some(&json!([10, 20])));
}

#[tokio::test]
async fn sink_failure_fails_the_run_after_the_wave() {
    let body = r#"
        <source id="A" type="http" url="https://example.com"/>
        <transform id="B" type="map" input="A" expression="{{$item}}"/>
        <sink id="C" type="http" input="B" url="https://example.com/out"/>
    "#;

    let mut registry = RuntimeRegistry::with_builtins();
    registry.register("source:http", Arc::new(StaticSource(json!([1]))));
    registry.register("sink:http", Arc::new(FailingRuntime(400)));

    let (state, outcome) = run_with(body, registry).await;
    assert!(outcome.is_err());
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.node_results["A"].status, NodeStatus::Success);
    assert_eq!(state.node_results["B"].status, NodeStatus::Success);
    assert_eq!(state.node_results["C"].status, NodeStatus::Failed);
    let error = state.node_results["C"].error.as_ref().expect("recorded error");
    assert_eq!(error.name, "HttpError");
    assert_eq!(error.code.as_deref(), Some("400"));
}

#[tokio::test]
async fn missing_runtime_is_an_unknown_runtime_failure() {
    let body = r#"<sink id="out" type="carrier-pigeon" input="src"/>
                  <source id="src" type="http" url="x"/>"#;
    let mut registry = RuntimeRegistry::with_builtins();
    registry.register("source:http", Arc::new(StaticSource(json!(1))));

    let (state, outcome) = run_with(body, registry).await;
    assert!(outcome.is_err());
    let error = state.node_results["out"].error.as_ref().expect("error");
    assert_eq!(error.name, "UnknownRuntime");
}

#[tokio::test]
async fn config_and_input_reach_templates() {
    // The library-side contract behind `run -c limit=10 --input '{"x":1}'`.
    let body = r#"<transform id="t" type="template"><template>{{limit}}:{{input.x}}:{{nested.k}}</template></transform>"#;
    let source = doc(body);
    let ast = parse_workflow(&source, "t.flow.md").expect("parse");
    assert!(validate(&ast).valid);
    let plan = flowscript::planner::plan(&ast).expect("plan");

    let mut state = flowscript::state::ExecutionState::builder("test-workflow")
        .with_config_value("limit", json!(10))
        .with_config_value("nested", json!({"k": "v"}))
        .with_global("input", json!({"x": 1}))
        .build();
    let executor =
        flowscript::executor::Executor::new(Arc::new(RuntimeRegistry::with_builtins()));
    executor.execute(&plan, &mut state).await.expect("run");
    assert_eq!(state.node_output("t"), Some(&json!("10:1:v")));
}

#[test]
fn parse_errors_accumulate_across_siblings() {
    let source = doc(
        r#"<source id="a" type="nope"/>
           <mystery id="b"/>
           <transform type="template"><template>x</template></transform>"#,
    );
    let errs = parse_workflow(&source, "t.flow.md").unwrap_err();
    assert_eq!(errs.len(), 3, "all sibling errors reported: {errs:#?}");
}
