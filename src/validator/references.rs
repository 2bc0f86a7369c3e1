//! Pass B: id uniqueness and reference resolution.
//!
//! Collects every node id (nested children share the global namespace),
//! then checks `input` edges, fallback targets, node references inside
//! `{{…}}` templates (a root identifier accessed through `.output` is a
//! node reference), and `$secrets.*` names against the declared secrets.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{NodeAst, NodeBody, WorkflowAst, walk_nodes};
use crate::expr::template_refs;
use crate::source::SourceLocation;

use super::{ValidationErrorKind, ValidationIssue};

/// Returns `true` when ids are unique and all node references resolve,
/// the precondition for a meaningful cycle pass.
pub(super) fn run(
    ast: &WorkflowAst,
    errors: &mut Vec<ValidationIssue>,
) -> bool {
    let before = errors.len();

    // Collect ids, reporting duplicates at their second occurrence.
    let mut ids: FxHashMap<&str, SourceLocation> = FxHashMap::default();
    walk_nodes(&ast.nodes, &mut |node| {
        if ids.contains_key(node.id.as_str()) {
            errors.push(
                ValidationIssue::new(
                    ValidationErrorKind::DuplicateNodeId,
                    format!("duplicate node id `{}`", node.id),
                )
                .at(node.loc),
            );
        } else {
            ids.insert(node.id.as_str(), node.loc);
        }
    });

    let secrets: FxHashSet<&str> = ast.metadata.secrets.iter().map(String::as_str).collect();

    walk_nodes(&ast.nodes, &mut |node| {
        if let Some(input) = &node.input
            && !ids.contains_key(input.as_str())
        {
            errors.push(
                ValidationIssue::new(
                    ValidationErrorKind::UndefinedNodeRef,
                    format!("node `{}` reads input from undefined node `{input}`", node.id),
                )
                .at(node.loc),
            );
        }
        if let Some(fallback) = node.error_config.as_ref().and_then(|e| e.fallback.as_ref())
            && !ids.contains_key(fallback.as_str())
        {
            errors.push(
                ValidationIssue::new(
                    ValidationErrorKind::UndefinedNodeRef,
                    format!("fallback of `{}` names undefined node `{fallback}`", node.id),
                )
                .at(node.loc),
            );
        }

        for template in template_strings(node) {
            check_template(node, &template, &ids, &secrets, errors);
        }
    });

    errors.len() == before
}

/// Every template-bearing string a node carries.
fn template_strings(node: &NodeAst) -> Vec<String> {
    let mut out: Vec<String> = node
        .config
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    match &node.body {
        NodeBody::Branch { cases, .. } => {
            out.extend(cases.iter().map(|c| c.condition.clone()));
        }
        NodeBody::If { condition, .. } | NodeBody::While { condition, .. } => {
            out.push(condition.clone());
        }
        NodeBody::Loop {
            break_condition, ..
        } => {
            if let Some(expr) = break_condition {
                out.push(expr.clone());
            }
        }
        NodeBody::Foreach { collection, .. } => out.push(collection.clone()),
        NodeBody::Set { value, .. } => out.push(value.clone()),
        NodeBody::Context { entries } => out.extend(entries.iter().map(|b| b.value.clone())),
        NodeBody::Include { bindings, .. } => {
            out.extend(bindings.iter().map(|b| b.value.clone()));
        }
        NodeBody::Call { args, .. } => out.extend(args.values().cloned()),
        _ => {}
    }
    out
}

fn check_template(
    node: &NodeAst,
    template: &str,
    ids: &FxHashMap<&str, SourceLocation>,
    secrets: &FxHashSet<&str>,
    errors: &mut Vec<ValidationIssue>,
) {
    // Bare expressions (conditions, collections) and templated attributes
    // go through the same reference extraction.
    let source = if crate::expr::is_template(template) {
        template.to_string()
    } else if looks_like_expression(node, template) {
        format!("{{{{{template}}}}}")
    } else {
        return;
    };

    let refs = match template_refs(&source) {
        Ok(refs) => refs,
        Err(message) => {
            errors.push(
                ValidationIssue::new(
                    ValidationErrorKind::InvalidFieldType,
                    format!("malformed template on `{}`: {message}", node.id),
                )
                .at(node.loc),
            );
            return;
        }
    };

    for (root, path) in refs {
        if root == "$secrets" {
            if let Some(name) = path.first()
                && !secrets.contains(name.as_str())
            {
                errors.push(
                    ValidationIssue::new(
                        ValidationErrorKind::UndefinedSecretRef,
                        format!("node `{}` references undeclared secret `{name}`", node.id),
                    )
                    .at(node.loc)
                    .with_hint("Declare the secret under `secrets:` in the frontmatter."),
                );
            }
            continue;
        }
        // Only `.output` access marks a root as a node reference; anything
        // else may legitimately come from config or context layers.
        if path.first().map(String::as_str) == Some("output")
            && !ids.contains_key(root.as_str())
        {
            errors.push(
                ValidationIssue::new(
                    ValidationErrorKind::UndefinedNodeRef,
                    format!("node `{}` references undefined node `{root}`", node.id),
                )
                .at(node.loc),
            );
        }
    }
}

/// Condition-like fields are expressions even without `{{…}}` wrapping.
fn looks_like_expression(node: &NodeAst, raw: &str) -> bool {
    match &node.body {
        NodeBody::If { condition, .. } | NodeBody::While { condition, .. } => condition == raw,
        NodeBody::Branch { cases, .. } => cases.iter().any(|c| c.condition == raw),
        NodeBody::Loop { break_condition, .. } => break_condition.as_deref() == Some(raw),
        NodeBody::Foreach { collection, .. } => collection == raw,
        _ => false,
    }
}
