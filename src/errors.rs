//! Runtime-domain error taxonomy.
//!
//! Execution-time failures are a single sum type, [`ExecutionError`], whose
//! variants expose the fields retry classification depends on (HTTP status,
//! AI retryable flag, …). [`ExecutionError::is_retryable`] is the one
//! decision point the retry loop consults.
//!
//! Parse and validation diagnostics live with their own modules; this
//! taxonomy covers everything that can go wrong once a plan is running.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::ExpressionError;

/// Error codes raised by AI-provider runtimes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiErrorCode {
    Timeout,
    RateLimit,
    Validation,
    ApiError,
}

impl AiErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::RateLimit => "RATE_LIMIT",
            Self::Validation => "VALIDATION",
            Self::ApiError => "API_ERROR",
        }
    }
}

/// Any failure surfaced while executing a plan.
///
/// Runtimes raise the domain variants (`Http`, `File`, `Timeout`, `Ai`);
/// the executor itself raises `UnknownRuntime`, `Expression`, and `Abort`.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutionError {
    /// HTTP-domain failure with the response status.
    #[error("http error: status {status}")]
    #[diagnostic(code(flowscript::error::http))]
    Http { status: u16, body: Option<String> },

    /// Filesystem failure with an errno-style code (`ENOENT`,
    /// `PARSE_ERROR`, …).
    #[error("file error ({code}): {path}")]
    #[diagnostic(code(flowscript::error::file))]
    File { path: String, code: String },

    /// An attempt or scope exceeded its deadline.
    #[error("timed out after {ms}ms")]
    #[diagnostic(code(flowscript::error::timeout))]
    Timeout { ms: u64 },

    /// A path escaped its permitted root.
    #[error("path traversal rejected: {path}")]
    #[diagnostic(
        code(flowscript::error::path_traversal),
        help("Paths must stay inside the workflow's working directory.")
    )]
    PathTraversal { path: String },

    /// AI-provider failure carrying the provider's retryable verdict.
    #[error("ai error ({}): {}", .code.as_str(), .message)]
    #[diagnostic(code(flowscript::error::ai))]
    Ai {
        code: AiErrorCode,
        message: String,
        retryable: bool,
    },

    /// Cooperative cancellation. Never retried.
    #[error("aborted")]
    #[diagnostic(code(flowscript::error::abort))]
    Abort,

    /// No runtime registered for a node's type key.
    #[error("no runtime registered for type `{type_key}`")]
    #[diagnostic(
        code(flowscript::error::unknown_runtime),
        help("Register a runtime for `{type_key}` before executing the plan.")
    )]
    UnknownRuntime { type_key: String },

    /// Expression or template evaluation failed.
    #[error(transparent)]
    #[diagnostic(code(flowscript::error::expression))]
    Expression(#[from] ExpressionError),

    /// Any other runtime-reported failure. Never retried.
    #[error("runtime error: {message}")]
    #[diagnostic(code(flowscript::error::runtime))]
    Runtime { message: String },
}

impl ExecutionError {
    /// Retry classification.
    ///
    /// Retryable: HTTP 429 and 5xx, timeouts, and AI errors the provider
    /// marked retryable. Everything else (4xx, aborts, expression and
    /// domain errors) is permanent.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecutionError::Http { status, .. } => *status == 429 || *status >= 500,
            ExecutionError::Timeout { .. } => true,
            ExecutionError::Ai { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// The stable error name used in persisted state.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionError::Http { .. } => "HttpError",
            ExecutionError::File { .. } => "FileError",
            ExecutionError::Timeout { .. } => "TimeoutError",
            ExecutionError::PathTraversal { .. } => "PathTraversalError",
            ExecutionError::Ai { .. } => "AIError",
            ExecutionError::Abort => "AbortError",
            ExecutionError::UnknownRuntime { .. } => "UnknownRuntime",
            ExecutionError::Expression(_) => "ExpressionError",
            ExecutionError::Runtime { .. } => "RuntimeError",
        }
    }

    /// Machine-readable code for persisted state, when the variant has one.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        match self {
            ExecutionError::Http { status, .. } => Some(status.to_string()),
            ExecutionError::File { code, .. } => Some(code.clone()),
            ExecutionError::Ai { code, .. } => Some(code.as_str().to_string()),
            _ => None,
        }
    }
}

/// The serialized form of an error inside a persisted [`NodeResult`]
/// (`{name, message, stack?, code?}`).
///
/// [`NodeResult`]: crate::state::NodeResult
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<&ExecutionError> for ErrorDetail {
    fn from(err: &ExecutionError) -> Self {
        ErrorDetail {
            name: err.name().to_string(),
            message: err.to_string(),
            stack: None,
            code: err.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(
            ExecutionError::Http {
                status: 429,
                body: None
            }
            .is_retryable()
        );
        assert!(
            ExecutionError::Http {
                status: 503,
                body: None
            }
            .is_retryable()
        );
        assert!(
            !ExecutionError::Http {
                status: 404,
                body: None
            }
            .is_retryable()
        );
        assert!(ExecutionError::Timeout { ms: 100 }.is_retryable());
        assert!(!ExecutionError::Abort.is_retryable());
        assert!(
            ExecutionError::Ai {
                code: AiErrorCode::RateLimit,
                message: "slow down".into(),
                retryable: true
            }
            .is_retryable()
        );
        assert!(
            !ExecutionError::Ai {
                code: AiErrorCode::Validation,
                message: "bad schema".into(),
                retryable: false
            }
            .is_retryable()
        );
    }

    #[test]
    fn detail_round_trip() {
        let err = ExecutionError::File {
            path: "/tmp/x".into(),
            code: "ENOENT".into(),
        };
        let detail = ErrorDetail::from(&err);
        assert_eq!(detail.name, "FileError");
        assert_eq!(detail.code.as_deref(), Some("ENOENT"));
    }
}
