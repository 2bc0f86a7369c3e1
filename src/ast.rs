//! Typed AST for workflow documents.
//!
//! A workflow document compiles to a [`WorkflowAst`]: parsed frontmatter
//! metadata plus a forest of [`NodeAst`] values. Node kinds are a tagged
//! variant ([`NodeBody`]) so downstream passes can match exhaustively.
//!
//! The AST is produced by the parser and treated as immutable once
//! validation has accepted it. All attribute values and template text are
//! stored verbatim; the expression layer resolves `{{…}}` segments at
//! execution time.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::source::{SourceLocation, SourceMap};

/// Parsed workflow frontmatter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub name: String,
    /// Semver `X.Y` or `X.Y.Z`; prerelease/build suffixes are rejected at
    /// parse time.
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    /// Declared config fields, in declaration order.
    #[serde(default)]
    pub config: IndexMap<String, ConfigField>,
    /// Declared secret names, in declaration order.
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Opaque named schemas (consumed by the type-compat validator pass).
    #[serde(default)]
    pub schemas: FxHashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evolution: Option<EvolutionMeta>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub config: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Manual,
    Webhook,
    Schedule,
}

impl TriggerType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "webhook" => Some(Self::Webhook),
            "schedule" => Some(Self::Schedule),
            _ => None,
        }
    }
}

/// One declared config field from frontmatter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    #[serde(rename = "type")]
    pub field_type: ConfigFieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ConfigFieldType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            _ => None,
        }
    }
}

/// Evolution lineage metadata, recognized only when `generation` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvolutionMeta {
    pub generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Fitness in `[0, 1]`; out-of-range values are dropped at parse time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitness: Option<f64>,
    #[serde(default)]
    pub learnings: Vec<String>,
}

/// A single workflow node: identity, location, wiring, and its kind-specific
/// payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeAst {
    /// Unique within the whole document (nested children share the global
    /// id namespace).
    pub id: String,
    pub loc: SourceLocation,
    /// Id of the node whose output feeds this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_config: Option<ErrorConfig>,
    /// Raw attribute map (plus captured template text), stored verbatim.
    #[serde(default)]
    pub config: IndexMap<String, Value>,
    pub body: NodeBody,
}

/// Kind-specific node payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeBody {
    Source {
        source_type: SourceType,
    },
    Transform {
        transform_type: TransformType,
    },
    Sink {
        /// Open set: `http`, `file`, `email`, `database`, and whatever a
        /// registered runtime claims.
        sink_type: String,
    },
    Branch {
        cases: Vec<BranchCase>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Vec<NodeAst>>,
    },
    If {
        condition: String,
        then_nodes: Vec<NodeAst>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_nodes: Option<Vec<NodeAst>>,
    },
    Loop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_iterations: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        break_condition: Option<String>,
        body: Vec<NodeAst>,
    },
    While {
        condition: String,
        body: Vec<NodeAst>,
    },
    Foreach {
        collection: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_var: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_concurrency: Option<u64>,
        body: Vec<NodeAst>,
    },
    Parallel {
        branches: Vec<Vec<NodeAst>>,
    },
    Checkpoint {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<String>,
        #[serde(default)]
        default_action: CheckpointAction,
    },
    Include {
        workflow: String,
        #[serde(default)]
        bindings: Vec<Binding>,
    },
    Call {
        workflow: String,
        #[serde(default)]
        args: IndexMap<String, String>,
    },
    Phase {
        name: String,
        children: Vec<NodeAst>,
    },
    Context {
        entries: Vec<Binding>,
    },
    Set {
        var: String,
        value: String,
    },
    Delay {
        duration: String,
    },
    Timeout {
        duration: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_timeout: Option<String>,
        children: Vec<NodeAst>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchCase {
    /// The `when` expression, stored verbatim.
    pub condition: String,
    pub nodes: Vec<NodeAst>,
}

/// A `key`/`value` pair for context entries and include bindings. Values
/// are template strings, resolved at execution time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Http,
    File,
}

impl SourceType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Self::Http),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::File => "file",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformType {
    Ai,
    Template,
    Map,
    Filter,
}

impl TransformType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ai" => Some(Self::Ai),
            "template" => Some(Self::Template),
            "map" => Some(Self::Map),
            "filter" => Some(Self::Filter),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Template => "template",
            Self::Map => "map",
            Self::Filter => "filter",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointAction {
    Approve,
    #[default]
    Reject,
}

impl CheckpointAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Per-node error handling declared via `<on-error>`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    /// Id of a node to run when retries are exhausted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Optional guard expression; retries apply only when it is truthy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    pub max: u32,
    #[serde(default)]
    pub backoff: Backoff,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    Linear,
    #[default]
    Exponential,
}

impl Backoff {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(Self::Fixed),
            "linear" => Some(Self::Linear),
            "exponential" => Some(Self::Exponential),
            _ => None,
        }
    }
}

impl NodeBody {
    /// The variant name as it appears in documents (`source`, `if`, …).
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeBody::Source { .. } => "source",
            NodeBody::Transform { .. } => "transform",
            NodeBody::Sink { .. } => "sink",
            NodeBody::Branch { .. } => "branch",
            NodeBody::If { .. } => "if",
            NodeBody::Loop { .. } => "loop",
            NodeBody::While { .. } => "while",
            NodeBody::Foreach { .. } => "foreach",
            NodeBody::Parallel { .. } => "parallel",
            NodeBody::Checkpoint { .. } => "checkpoint",
            NodeBody::Include { .. } => "include",
            NodeBody::Call { .. } => "call",
            NodeBody::Phase { .. } => "phase",
            NodeBody::Context { .. } => "context",
            NodeBody::Set { .. } => "set",
            NodeBody::Delay { .. } => "delay",
            NodeBody::Timeout { .. } => "timeout",
        }
    }

    /// True for nodes whose children the executor interprets itself rather
    /// than scheduling them in the top-level plan.
    #[must_use]
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            NodeBody::Branch { .. }
                | NodeBody::If { .. }
                | NodeBody::Loop { .. }
                | NodeBody::While { .. }
                | NodeBody::Foreach { .. }
                | NodeBody::Parallel { .. }
                | NodeBody::Checkpoint { .. }
                | NodeBody::Phase { .. }
                | NodeBody::Timeout { .. }
        )
    }

    /// All directly nested child nodes, in source order.
    pub fn children(&self) -> Vec<&NodeAst> {
        match self {
            NodeBody::Branch { cases, default } => {
                let mut out: Vec<&NodeAst> = cases.iter().flat_map(|c| c.nodes.iter()).collect();
                if let Some(default) = default {
                    out.extend(default.iter());
                }
                out
            }
            NodeBody::If {
                then_nodes,
                else_nodes,
                ..
            } => {
                let mut out: Vec<&NodeAst> = then_nodes.iter().collect();
                if let Some(else_nodes) = else_nodes {
                    out.extend(else_nodes.iter());
                }
                out
            }
            NodeBody::Loop { body, .. }
            | NodeBody::While { body, .. }
            | NodeBody::Foreach { body, .. } => body.iter().collect(),
            NodeBody::Parallel { branches } => branches.iter().flatten().collect(),
            NodeBody::Phase { children, .. } | NodeBody::Timeout { children, .. } => {
                children.iter().collect()
            }
            _ => Vec::new(),
        }
    }
}

impl NodeAst {
    /// The registry lookup key for this node (`variant:discriminator`).
    #[must_use]
    pub fn type_key(&self) -> String {
        match &self.body {
            NodeBody::Source { source_type } => format!("source:{}", source_type.as_str()),
            NodeBody::Transform { transform_type } => {
                format!("transform:{}", transform_type.as_str())
            }
            NodeBody::Sink { sink_type } => format!("sink:{sink_type}"),
            NodeBody::Delay { .. } => "temporal:delay".to_string(),
            NodeBody::Timeout { .. } => "temporal:timeout".to_string(),
            NodeBody::Include { .. } => "compose:include".to_string(),
            NodeBody::Call { .. } => "compose:call".to_string(),
            NodeBody::Phase { .. } | NodeBody::Context { .. } | NodeBody::Set { .. } => {
                format!("scope:{}", self.body.kind_name())
            }
            other => format!("control:{}", other.kind_name()),
        }
    }
}

impl fmt::Display for NodeAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.body.kind_name(), self.id)
    }
}

/// The compiled document: metadata, the top-level node forest, and the
/// source map used for diagnostics.
#[derive(Clone, Debug)]
pub struct WorkflowAst {
    pub metadata: WorkflowMetadata,
    pub nodes: Vec<NodeAst>,
    pub source_map: SourceMap,
}

impl WorkflowAst {
    /// Depth-first visit of every node in the document, children included.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a NodeAst)) {
        walk_nodes(&self.nodes, f);
    }

    /// Find any node (top-level or nested) by id.
    #[must_use]
    pub fn find_node(&self, id: &str) -> Option<&NodeAst> {
        let mut found = None;
        self.walk(&mut |node| {
            if found.is_none() && node.id == id {
                found = Some(node);
            }
        });
        found
    }
}

/// Depth-first visit over a node slice, recursing into control-flow
/// children.
pub fn walk_nodes<'a>(nodes: &'a [NodeAst], f: &mut impl FnMut(&'a NodeAst)) {
    for node in nodes {
        f(node);
        for child in node.body.children() {
            f(child);
            walk_children(child, f);
        }
    }
}

fn walk_children<'a>(node: &'a NodeAst, f: &mut impl FnMut(&'a NodeAst)) {
    for child in node.body.children() {
        f(child);
        walk_children(child, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceLocation;
    use crate::source::Position;

    fn leaf(id: &str) -> NodeAst {
        NodeAst {
            id: id.to_string(),
            loc: SourceLocation::at(Position::start()),
            input: None,
            error_config: None,
            config: IndexMap::new(),
            body: NodeBody::Transform {
                transform_type: TransformType::Template,
            },
        }
    }

    #[test]
    fn type_keys() {
        let mut node = leaf("t");
        assert_eq!(node.type_key(), "transform:template");
        node.body = NodeBody::Sink {
            sink_type: "http".into(),
        };
        assert_eq!(node.type_key(), "sink:http");
        node.body = NodeBody::Delay {
            duration: "5s".into(),
        };
        assert_eq!(node.type_key(), "temporal:delay");
    }

    #[test]
    fn walk_visits_nested_children() {
        let mut parent = leaf("p");
        parent.body = NodeBody::If {
            condition: "{{x}}".into(),
            then_nodes: vec![leaf("a")],
            else_nodes: Some(vec![leaf("b")]),
        };
        let mut seen = Vec::new();
        walk_nodes(std::slice::from_ref(&parent), &mut |n| {
            seen.push(n.id.clone())
        });
        assert_eq!(seen, vec!["p", "a", "b"]);
    }
}
