//! Expression and template evaluation.
//!
//! Templates are strings with embedded `{{ expression }}` segments. A
//! template that is exactly one expression evaluates to the raw value;
//! anything else stringifies each segment and concatenates. Expressions are
//! a small, side-effect-free language (literals, member/index access,
//! arithmetic, comparison, logical operators, ternary, `??`, and a fixed
//! registry of pure functions) evaluated over the layered context in
//! [`context::EvalContext`].
//!
//! Any failure (unknown identifier, division by zero, type mismatch,
//! malformed template) surfaces as a single [`ExpressionError`] carrying
//! the failing expression, its position inside the template, and a
//! secrets-redacted context snapshot.

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

pub mod context;
mod eval;
mod functions;
mod parse;
mod token;

pub use context::{EvalContext, iteration_locals};
pub use eval::{is_truthy, number_value, stringify, type_name};

/// A failed expression or template evaluation.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq)]
#[error("expression error in `{expression}`: {message}")]
#[diagnostic(
    code(flowscript::expr::evaluation),
    help("Context layers at the point of failure: {context}")
)]
pub struct ExpressionError {
    /// The expression (or template) that failed.
    pub expression: String,
    /// Byte offset of the failing expression within its template, when the
    /// failure came from a template segment.
    pub position: Option<usize>,
    pub message: String,
    /// Redacted context snapshot (layer keys only; secret values elided).
    pub context: String,
}

impl ExpressionError {
    fn new(expression: &str, position: Option<usize>, message: String, ctx: &EvalContext<'_>) -> Self {
        Self {
            expression: expression.to_string(),
            position,
            message,
            context: ctx.redacted_snapshot(),
        }
    }
}

/// One piece of a split template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// An expression segment: the source between the braces and its byte
    /// offset within the template.
    Expr { source: String, offset: usize },
}

/// Split a template into literal and expression segments.
///
/// An opening `{{` without a matching `}}` is a malformed template.
pub fn split_template(template: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut rest = template;
    let mut consumed = 0;
    while let Some(open) = rest.find("{{") {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            return Err(format!(
                "unclosed expression at offset {}",
                consumed + open
            ));
        };
        segments.push(Segment::Expr {
            source: after_open[..close].trim().to_string(),
            offset: consumed + open,
        });
        let advanced = open + 2 + close + 2;
        consumed += advanced;
        rest = &rest[advanced..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

/// True when the string contains at least one `{{…}}` segment.
#[must_use]
pub fn is_template(s: &str) -> bool {
    s.contains("{{")
}

/// Evaluate a bare expression (no surrounding braces) to its raw value.
pub fn evaluate(source: &str, ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
    evaluate_at(source, None, ctx)
}

fn evaluate_at(
    source: &str,
    position: Option<usize>,
    ctx: &EvalContext<'_>,
) -> Result<Value, ExpressionError> {
    let expr = parse::parse(source)
        .map_err(|e| ExpressionError::new(source, position, e.message, ctx))?;
    eval::evaluate(&expr, ctx).map_err(|e| ExpressionError::new(source, position, e.message, ctx))
}

/// Evaluate an expression and reduce it to truthiness (for conditions).
pub fn evaluate_truthy(source: &str, ctx: &EvalContext<'_>) -> Result<bool, ExpressionError> {
    Ok(is_truthy(&evaluate(source, ctx)?))
}

/// Render a template against the context.
///
/// A template made of exactly one expression segment returns the raw
/// evaluated value (so `max="{{limit}}"` can stay a number); mixed
/// templates render to a string. A template without `{{…}}` segments is
/// returned unchanged.
pub fn render_template(template: &str, ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
    let segments = split_template(template)
        .map_err(|message| ExpressionError::new(template, None, message, ctx))?;

    match segments.as_slice() {
        [] => return Ok(Value::String(String::new())),
        [Segment::Expr { source, offset }] => {
            return evaluate_at(source, Some(*offset), ctx);
        }
        _ => {}
    }

    let mut out = String::new();
    for segment in &segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Expr { source, offset } => {
                let value = evaluate_at(source, Some(*offset), ctx)?;
                out.push_str(&stringify(&value));
            }
        }
    }
    Ok(Value::String(out))
}

/// Root identifiers (with their member paths) referenced by a template's
/// expression segments. Used by the reference-validation pass.
pub fn template_refs(template: &str) -> Result<Vec<(String, Vec<String>)>, String> {
    let mut refs = Vec::new();
    for segment in split_template(template)? {
        if let Segment::Expr { source, .. } = segment {
            let expr = parse::parse(&source).map_err(|e| e.message)?;
            expr.collect_roots(&mut refs);
        }
    }
    Ok(refs)
}
