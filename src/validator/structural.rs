//! Pass A: structural constraints per node kind.

use crate::ast::{NodeAst, NodeBody, TransformType, WorkflowAst, walk_nodes};
use crate::executor::duration::parse_duration;

use super::{ValidationErrorKind, ValidationIssue};

pub(super) fn run(
    ast: &WorkflowAst,
    errors: &mut Vec<ValidationIssue>,
    warnings: &mut Vec<ValidationIssue>,
) {
    walk_nodes(&ast.nodes, &mut |node| {
        check_node(node, errors, warnings);
    });
}

fn check_node(
    node: &NodeAst,
    errors: &mut Vec<ValidationIssue>,
    warnings: &mut Vec<ValidationIssue>,
) {
    match &node.body {
        NodeBody::Transform { transform_type } => {
            if *transform_type == TransformType::Ai && node.input.is_none() {
                warnings.push(
                    ValidationIssue::new(
                        ValidationErrorKind::MissingRequiredField,
                        format!("ai transform `{}` has no input", node.id),
                    )
                    .at(node.loc)
                    .with_hint("AI transforms usually consume another node's output via `input`."),
                );
            }
            if matches!(transform_type, TransformType::Map | TransformType::Filter)
                && !node.config.contains_key("expression")
            {
                errors.push(
                    ValidationIssue::new(
                        ValidationErrorKind::MissingRequiredField,
                        format!(
                            "{} transform `{}` requires an `expression`",
                            transform_type.as_str(),
                            node.id
                        ),
                    )
                    .at(node.loc),
                );
            }
        }
        NodeBody::Sink { .. } => {
            if node.input.is_none() {
                warnings.push(
                    ValidationIssue::new(
                        ValidationErrorKind::MissingRequiredField,
                        format!("sink `{}` has no input", node.id),
                    )
                    .at(node.loc),
                );
            }
        }
        NodeBody::Branch { cases, .. } => {
            if cases.is_empty() {
                errors.push(
                    ValidationIssue::new(
                        ValidationErrorKind::MissingRequiredField,
                        format!("branch `{}` requires at least one case", node.id),
                    )
                    .at(node.loc),
                );
            }
            for (i, case) in cases.iter().enumerate() {
                if case.condition.trim().is_empty() {
                    errors.push(
                        ValidationIssue::new(
                            ValidationErrorKind::MissingRequiredField,
                            format!("case {} of branch `{}` requires a `when`", i + 1, node.id),
                        )
                        .at(node.loc),
                    );
                }
            }
        }
        NodeBody::If { condition, .. } | NodeBody::While { condition, .. } => {
            if condition.trim().is_empty() {
                errors.push(
                    ValidationIssue::new(
                        ValidationErrorKind::MissingRequiredField,
                        format!("`{}` node `{}` requires a `condition`", node.body.kind_name(), node.id),
                    )
                    .at(node.loc),
                );
            }
        }
        NodeBody::Loop {
            max_iterations,
            break_condition,
            ..
        } => {
            if max_iterations.is_none() && break_condition.is_none() {
                warnings.push(
                    ValidationIssue::new(
                        ValidationErrorKind::MissingRequiredField,
                        format!("loop `{}` has neither max-iterations nor break-condition", node.id),
                    )
                    .at(node.loc)
                    .with_hint("Unbounded loops only stop at the executor's safety bound."),
                );
            }
            if let Some(0) = max_iterations {
                errors.push(positive_integer(node, "max-iterations"));
            }
        }
        NodeBody::Foreach {
            collection,
            max_concurrency,
            ..
        } => {
            if collection.trim().is_empty() {
                errors.push(
                    ValidationIssue::new(
                        ValidationErrorKind::MissingRequiredField,
                        format!("foreach `{}` requires a `collection`", node.id),
                    )
                    .at(node.loc),
                );
            }
            if let Some(0) = max_concurrency {
                errors.push(positive_integer(node, "max-concurrency"));
            }
        }
        NodeBody::Parallel { branches } => {
            if branches.is_empty() {
                warnings.push(
                    ValidationIssue::new(
                        ValidationErrorKind::MissingRequiredField,
                        format!("parallel `{}` has no branches", node.id),
                    )
                    .at(node.loc),
                );
            }
        }
        NodeBody::Checkpoint {
            prompt, timeout, ..
        } => {
            if prompt.trim().is_empty() {
                errors.push(
                    ValidationIssue::new(
                        ValidationErrorKind::MissingRequiredField,
                        format!("checkpoint `{}` requires a `prompt`", node.id),
                    )
                    .at(node.loc),
                );
            }
            if let Some(timeout) = timeout {
                check_duration(node, "timeout", timeout, errors);
            }
        }
        NodeBody::Include { workflow, .. } | NodeBody::Call { workflow, .. } => {
            if workflow.trim().is_empty() {
                errors.push(
                    ValidationIssue::new(
                        ValidationErrorKind::MissingRequiredField,
                        format!("`{}` node `{}` requires a `workflow`", node.body.kind_name(), node.id),
                    )
                    .at(node.loc),
                );
            }
        }
        NodeBody::Set { var, .. } => {
            if var.trim().is_empty() {
                errors.push(
                    ValidationIssue::new(
                        ValidationErrorKind::MissingRequiredField,
                        format!("set `{}` requires a `var`", node.id),
                    )
                    .at(node.loc),
                );
            }
        }
        NodeBody::Delay { duration } => {
            check_duration(node, "duration", duration, errors);
        }
        NodeBody::Timeout { duration, .. } => {
            check_duration(node, "duration", duration, errors);
        }
        NodeBody::Source { .. } | NodeBody::Phase { .. } | NodeBody::Context { .. } => {}
    }
}

fn positive_integer(node: &NodeAst, field: &str) -> ValidationIssue {
    ValidationIssue::new(
        ValidationErrorKind::InvalidFieldType,
        format!("`{field}` on `{}` must be a positive integer", node.id),
    )
    .at(node.loc)
}

/// Literal (non-template) durations are validated ahead of time; templated
/// durations can only fail at execution.
fn check_duration(node: &NodeAst, field: &str, raw: &str, errors: &mut Vec<ValidationIssue>) {
    if raw.trim().is_empty() {
        errors.push(
            ValidationIssue::new(
                ValidationErrorKind::MissingRequiredField,
                format!("`{}` node `{}` requires a `{field}`", node.body.kind_name(), node.id),
            )
            .at(node.loc),
        );
        return;
    }
    if !crate::expr::is_template(raw) && parse_duration(raw).is_none() {
        errors.push(
            ValidationIssue::new(
                ValidationErrorKind::InvalidFieldType,
                format!("invalid {field} `{raw}` on `{}`", node.id),
            )
            .at(node.loc)
            .with_hint("Use ISO-8601 (`PT30S`) or shorthand (`500ms`, `5s`, `2m`, `1h30m`), or plain milliseconds."),
        );
    }
}
