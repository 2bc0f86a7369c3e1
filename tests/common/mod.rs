#![allow(dead_code)]

pub mod runtimes;

use std::sync::Arc;

use flowscript::ast::WorkflowAst;
use flowscript::errors::ExecutionError;
use flowscript::executor::Executor;
use flowscript::parser::parse_workflow;
use flowscript::planner::{ExecutionPlan, plan};
use flowscript::registry::RuntimeRegistry;
use flowscript::state::ExecutionState;
use flowscript::validator::validate;

/// Wrap a node body in minimal valid frontmatter.
pub fn doc(body: &str) -> String {
    format!("---\nname: test-workflow\nversion: 1.0\n---\n{body}\n")
}

/// Parse, validate, and plan a body snippet, panicking on any diagnostic.
pub fn compile(body: &str) -> (WorkflowAst, ExecutionPlan) {
    let source = doc(body);
    let ast = parse_workflow(&source, "test.flow.md")
        .unwrap_or_else(|errs| panic!("parse failed: {errs:#?}"));
    let report = validate(&ast);
    assert!(report.valid, "validation failed: {:#?}", report.errors);
    let plan = plan(&ast).expect("plan");
    (ast, plan)
}

/// Execute a body snippet against a registry, returning the final state
/// and the executor outcome.
pub async fn run_with(
    body: &str,
    registry: RuntimeRegistry,
) -> (ExecutionState, Result<(), ExecutionError>) {
    let (_, plan) = compile(body);
    let mut state = ExecutionState::new("test-workflow");
    let executor = Executor::new(Arc::new(registry));
    let outcome = executor.execute(&plan, &mut state).await;
    (state, outcome)
}

/// Execute with the built-in runtimes only.
pub async fn run(body: &str) -> (ExecutionState, Result<(), ExecutionError>) {
    run_with(body, RuntimeRegistry::with_builtins()).await
}
