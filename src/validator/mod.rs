//! Multi-pass semantic validation of a parsed workflow.
//!
//! Three passes run in order:
//!
//! - **A: structural**: required fields, enum values, and contextual
//!   constraints per node kind.
//! - **B: references & duplicates**: id uniqueness, `input`/fallback
//!   resolution, node references inside templates, secret references.
//! - **C: cycles**: Kahn's algorithm over the `input` edges of every
//!   sibling scope, with DFS recovery of a concrete cycle path.
//!
//! Pass C is skipped when pass B reported unresolved or duplicate ids,
//! since running it anyway would manufacture false positives on a broken
//! graph.
//! The optional type-compat pass emits warnings when a consumer path does
//! not exist in an AI transform's declared output schema.

use miette::Diagnostic;
use thiserror::Error;

use crate::ast::WorkflowAst;
use crate::source::SourceLocation;

mod cycles;
mod references;
mod schema;
mod structural;

pub use schema::SchemaType;

/// Structured code for a validation diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationErrorKind {
    MissingRequiredField,
    InvalidFieldType,
    UnknownNodeType,
    UndefinedNodeRef,
    UndefinedSecretRef,
    DuplicateNodeId,
    CircularDependency,
    InvalidSchema,
    TypeMismatch,
}

impl ValidationErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingRequiredField => "MissingRequiredField",
            Self::InvalidFieldType => "InvalidFieldType",
            Self::UnknownNodeType => "UnknownNodeType",
            Self::UndefinedNodeRef => "UndefinedNodeRef",
            Self::UndefinedSecretRef => "UndefinedSecretRef",
            Self::DuplicateNodeId => "DuplicateNodeId",
            Self::CircularDependency => "CircularDependency",
            Self::InvalidSchema => "InvalidSchema",
            Self::TypeMismatch => "TypeMismatch",
        }
    }
}

/// One validation diagnostic.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq)]
#[error("{}: {message}{}", .kind.as_str(), .loc.map(|l| format!(" at {l}")).unwrap_or_default())]
#[diagnostic(code(flowscript::validator))]
pub struct ValidationIssue {
    pub kind: ValidationErrorKind,
    pub message: String,
    pub loc: Option<SourceLocation>,
    pub hints: Vec<String>,
}

impl ValidationIssue {
    #[must_use]
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            loc: None,
            hints: Vec::new(),
        }
    }

    #[must_use]
    pub fn at(mut self, loc: SourceLocation) -> Self {
        self.loc = Some(loc);
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }
}

/// Outcome of validation: `valid` iff no errors (warnings never fail a
/// workflow unless strict mode promoted them).
#[derive(Clone, Debug, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// Validation options. `strict` promotes warnings to errors.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidationOptions {
    pub strict: bool,
}

/// Validate with default options.
#[must_use]
pub fn validate(ast: &WorkflowAst) -> ValidationResult {
    validate_with(ast, ValidationOptions::default())
}

#[must_use]
pub fn validate_with(ast: &WorkflowAst, options: ValidationOptions) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    structural::run(ast, &mut errors, &mut warnings);

    let references_clean = references::run(ast, &mut errors);

    // Cycle detection over unresolved references would report phantom
    // cycles; skip it until the ids are sound.
    if references_clean {
        cycles::run(ast, &mut errors);
    }

    schema::run(ast, &mut warnings);

    if options.strict {
        errors.append(&mut warnings);
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Detect cycles in the `input` graph and return one concrete path per
/// cycle (`["P", "Q", "P"]`). Empty iff the plan will succeed.
#[must_use]
pub fn detect_cycles(ast: &WorkflowAst) -> Vec<Vec<String>> {
    cycles::detect(ast)
}
