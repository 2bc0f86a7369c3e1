//! Compiling workflow documents from text to the typed AST.
//!
//! A document is YAML frontmatter between `---` delimiters followed by an
//! XML body of nodes. Parsing proceeds in three stages:
//!
//! 1. **Split**: locate the frontmatter delimiters (LF and CRLF both
//!    accepted) and fail fast with precise locations when the leading or
//!    closing delimiter is missing, or the body is empty.
//! 2. **Frontmatter**: safe YAML parsing (no code execution) into
//!    [`WorkflowMetadata`], enforcing required fields and the semver gate.
//! 3. **Body**: XML parsing into the [`NodeAst`] forest. Sibling errors
//!    accumulate: one bad node never hides the nodes after it.
//!
//! [`WorkflowMetadata`]: crate::ast::WorkflowMetadata
//! [`NodeAst`]: crate::ast::NodeAst

use miette::Diagnostic;
use thiserror::Error;

use crate::ast::WorkflowAst;
use crate::source::{SourceLocation, SourceMap};

mod body;
mod frontmatter;

pub use frontmatter::is_valid_version;

/// Structured code for a parse diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    MissingFrontmatter,
    MissingBody,
    YamlInvalid,
    XmlInvalid,
    MissingRequiredField,
    InvalidFieldValue,
    UnknownNodeType,
    MissingNodeId,
}

impl ParseErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingFrontmatter => "MissingFrontmatter",
            Self::MissingBody => "MissingBody",
            Self::YamlInvalid => "YamlInvalid",
            Self::XmlInvalid => "XmlInvalid",
            Self::MissingRequiredField => "MissingRequiredField",
            Self::InvalidFieldValue => "InvalidFieldValue",
            Self::UnknownNodeType => "UnknownNodeType",
            Self::MissingNodeId => "MissingNodeId",
        }
    }
}

/// One parse diagnostic: kind, message, optional location, hints.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq)]
#[error("{}: {message}{}", .kind.as_str(), .loc.map(|l| format!(" at {l}")).unwrap_or_default())]
#[diagnostic(code(flowscript::parser))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub loc: Option<SourceLocation>,
    pub hints: Vec<String>,
}

impl ParseError {
    #[must_use]
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
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

/// Parse a complete workflow document.
///
/// Returns the AST, or every diagnostic found. Split and frontmatter
/// failures are fail-fast (a single error); body errors accumulate across
/// siblings.
pub fn parse_workflow(source: &str, file_path: &str) -> Result<WorkflowAst, Vec<ParseError>> {
    let source_map = SourceMap::new(source.to_string(), file_path.to_string());

    let split = split_document(source, &source_map).map_err(|e| vec![e])?;

    let metadata = frontmatter::parse_metadata(split.frontmatter, split.frontmatter_offset, &source_map)
        .map_err(|e| vec![e])?;

    let nodes = body::parse_body(split.body, split.body_offset, &source_map)?;

    Ok(WorkflowAst {
        metadata,
        nodes,
        source_map,
    })
}

struct SplitDocument<'a> {
    frontmatter: &'a str,
    frontmatter_offset: usize,
    body: &'a str,
    body_offset: usize,
}

/// Split the document at its `---` delimiters.
fn split_document<'a>(
    source: &'a str,
    source_map: &SourceMap,
) -> Result<SplitDocument<'a>, ParseError> {
    let stripped = source.strip_prefix('\u{feff}').unwrap_or(source);
    let bom_len = source.len() - stripped.len();

    let first_line_end = stripped.find('\n').unwrap_or(stripped.len());
    let first_line = stripped[..first_line_end].trim_end_matches('\r');
    if first_line != "---" {
        return Err(ParseError::new(
            ParseErrorKind::MissingFrontmatter,
            "document must begin with a `---` frontmatter delimiter",
        )
        .at(source_map.location_at(bom_len))
        .with_hint("Start the file with `---`, the YAML metadata, and a closing `---` line."));
    }

    let fm_offset = bom_len + first_line_end + 1;
    if fm_offset >= source.len() {
        return Err(ParseError::new(
            ParseErrorKind::MissingFrontmatter,
            "frontmatter is missing its closing `---` delimiter",
        )
        .at(source_map.location_at(source.len())));
    }

    // Scan line by line for the closing delimiter.
    let mut cursor = fm_offset;
    let mut close: Option<(usize, usize)> = None; // (line start, next line start)
    while cursor <= source.len() {
        let line_end = source[cursor..]
            .find('\n')
            .map(|i| cursor + i)
            .unwrap_or(source.len());
        let line = source[cursor..line_end].trim_end_matches('\r');
        if line == "---" {
            close = Some((cursor, (line_end + 1).min(source.len())));
            break;
        }
        if line_end >= source.len() {
            break;
        }
        cursor = line_end + 1;
    }

    let Some((close_start, body_offset)) = close else {
        return Err(ParseError::new(
            ParseErrorKind::MissingFrontmatter,
            "frontmatter is missing its closing `---` delimiter",
        )
        .at(source_map.location_at(source.len()))
        .with_hint("Add a `---` line after the YAML metadata."));
    };

    let body = &source[body_offset..];
    if body.trim().is_empty() {
        return Err(ParseError::new(
            ParseErrorKind::MissingBody,
            "workflow body is empty",
        )
        .at(source_map.location_at(body_offset))
        .with_hint("Add at least one node element after the closing `---`."));
    }

    Ok(SplitDocument {
        frontmatter: &source[fm_offset..close_start],
        frontmatter_offset: fm_offset,
        body,
        body_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_leading_delimiter() {
        let errs = parse_workflow("name: x\n", "t.flow.md").unwrap_err();
        assert_eq!(errs[0].kind, ParseErrorKind::MissingFrontmatter);
        assert_eq!(errs[0].loc.unwrap().start.line, 1);
    }

    #[test]
    fn rejects_missing_closing_delimiter() {
        let errs = parse_workflow("---\nname: x\nversion: 1.0\n", "t.flow.md").unwrap_err();
        assert_eq!(errs[0].kind, ParseErrorKind::MissingFrontmatter);
        assert!(errs[0].message.contains("closing"));
    }

    #[test]
    fn rejects_empty_body() {
        let errs = parse_workflow("---\nname: x\nversion: 1.0\n---\n  \n", "t.flow.md").unwrap_err();
        assert_eq!(errs[0].kind, ParseErrorKind::MissingBody);
    }

    #[test]
    fn accepts_crlf_delimiters() {
        let src = "---\r\nname: x\r\nversion: 1.0\r\n---\r\n<transform id=\"t\" type=\"template\"><template>hi</template></transform>\r\n";
        let ast = parse_workflow(src, "t.flow.md").unwrap();
        assert_eq!(ast.metadata.name, "x");
        assert_eq!(ast.nodes.len(), 1);
    }
}
