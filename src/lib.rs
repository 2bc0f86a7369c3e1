//! # FlowScript: Declarative Workflow Engine
//!
//! FlowScript executes workflows authored as Markdown-like documents: YAML
//! frontmatter for metadata, an XML body for the node graph. A document
//! moves through a four-stage pipeline:
//!
//! 1. **Compile**: [`parser`] splits frontmatter from body and produces a
//!    typed [`ast::WorkflowAst`] with precise source locations.
//! 2. **Validate**: [`validator`] runs structural, reference, and cycle
//!    passes (plus optional schema-compat warnings).
//! 3. **Plan**: [`planner`] applies Kahn's algorithm to the `input`
//!    dependency graph, grouping nodes into parallel execution waves.
//! 4. **Execute**: [`executor`] drives the waves through pluggable
//!    [`registry`] runtimes with per-node retries, timeouts, cooperative
//!    cancellation, and single-writer state updates at wave barriers.
//!
//! Runs persist as JSON ([`persistence`]) and resume from failure;
//! [`execlog`] renders a markdown run report, and [`evolution`] detects
//! regressions and behavior drift across run history.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use flowscript::{executor::Executor, parser, planner, registry::RuntimeRegistry,
//!                  state::ExecutionState, validator};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = "---\nname: hello\nversion: 1.0\n---\n\
//!     <transform id=\"t\" type=\"template\"><template>hello world</template></transform>";
//!
//! let ast = parser::parse_workflow(source, "hello.flow.md")
//!     .map_err(|errs| format!("{errs:?}"))?;
//! let report = validator::validate(&ast);
//! assert!(report.valid);
//!
//! let plan = planner::plan(&ast)?;
//! let mut state = ExecutionState::new("hello");
//! let executor = Executor::new(Arc::new(RuntimeRegistry::with_builtins()));
//! executor.execute(&plan, &mut state).await?;
//!
//! assert_eq!(state.node_output("t"), Some(&serde_json::json!("hello world")));
//! # Ok(())
//! # }
//! ```
//!
//! ## Extending
//!
//! External runtimes (HTTP sources, file sinks, AI transforms, workflow
//! composition) implement [`registry::NodeRuntime`] and register under
//! their type key before execution starts. Control-flow constructs go
//! through the same interface: their runtimes return metadata the
//! executor interprets: so replacing, say, the checkpoint behavior is
//! just another registration.
//!
//! ## Module Guide
//!
//! - [`source`] - Source positions and the line-offset index
//! - [`ast`] - Typed workflow AST
//! - [`parser`] - Frontmatter + XML body compilation
//! - [`expr`] - `{{…}}` templates and the expression language
//! - [`validator`] - Structural / reference / cycle passes
//! - [`planner`] - Wave planning (Kahn's algorithm)
//! - [`state`] - Per-run execution state
//! - [`registry`] - Type-keyed runtime dispatch
//! - [`runtimes`] - Built-in runtimes
//! - [`executor`] - Wave driver, control flow, retry/timeout/cancel
//! - [`cancel`] - Cooperative cancellation tokens
//! - [`composition`] - Include/call cycle guard
//! - [`persistence`] - Save / load / resume
//! - [`execlog`] - Markdown execution log
//! - [`evolution`] - Metrics and drift detection
//! - [`telemetry`] - Tracing bootstrap

pub mod ast;
pub mod cancel;
pub mod composition;
pub mod errors;
pub mod execlog;
pub mod executor;
pub mod evolution;
pub mod expr;
pub mod parser;
pub mod persistence;
pub mod planner;
pub mod registry;
pub mod runtimes;
pub mod source;
pub mod state;
pub mod telemetry;
pub mod validator;
