//! Optional pass: type compatibility warnings from declared schemas.
//!
//! AI transforms may declare an output schema in a small TypeScript-like
//! DSL: `string | number | boolean | T[] | {key: T, …}`. When a consumer
//! references a field path on that node's output (`{{ai.output.a.b}}`)
//! that the schema cannot produce, a `TypeMismatch` warning is emitted.
//! Warnings only: schemas are advisory.

use rustc_hash::FxHashMap;

use crate::ast::{NodeBody, TransformType, WorkflowAst, walk_nodes};
use crate::expr::template_refs;

use super::{ValidationErrorKind, ValidationIssue};

/// A parsed schema type.
#[derive(Clone, Debug, PartialEq)]
pub enum SchemaType {
    String,
    Number,
    Boolean,
    Array(Box<SchemaType>),
    Object(Vec<(String, SchemaType)>),
}

impl SchemaType {
    /// Parse the DSL; `None` on malformed input.
    #[must_use]
    pub fn parse(source: &str) -> Option<Self> {
        let mut parser = SchemaParser {
            chars: source.chars().collect(),
            pos: 0,
        };
        let parsed = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos == parser.chars.len() {
            Some(parsed)
        } else {
            None
        }
    }

    /// Whether a dotted field path exists in this schema. Numeric segments
    /// index into arrays.
    #[must_use]
    pub fn has_path(&self, path: &[String]) -> bool {
        let mut cursor = self;
        for segment in path {
            cursor = match cursor {
                SchemaType::Object(fields) => {
                    match fields.iter().find(|(name, _)| name == segment) {
                        Some((_, t)) => t,
                        None => return false,
                    }
                }
                SchemaType::Array(item) => {
                    if segment.parse::<usize>().is_ok() {
                        item
                    } else {
                        return false;
                    }
                }
                // Scalars have no fields.
                _ => return false,
            };
        }
        true
    }
}

struct SchemaParser {
    chars: Vec<char>,
    pos: usize,
}

impl SchemaParser {
    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.chars.get(self.pos) == Some(&c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_type(&mut self) -> Option<SchemaType> {
        self.skip_ws();
        let mut base = if self.eat('{') {
            let mut fields = Vec::new();
            loop {
                self.skip_ws();
                if self.eat('}') {
                    break;
                }
                let name = self.parse_ident()?;
                if !self.eat(':') {
                    return None;
                }
                let field_type = self.parse_type()?;
                fields.push((name, field_type));
                // Commas between fields are optional before the brace.
                let _ = self.eat(',');
            }
            SchemaType::Object(fields)
        } else {
            match self.parse_ident()?.as_str() {
                "string" => SchemaType::String,
                "number" => SchemaType::Number,
                "boolean" => SchemaType::Boolean,
                _ => return None,
            }
        };
        // Array suffixes bind tightest: `string[][]`.
        loop {
            self.skip_ws();
            if self.chars.get(self.pos) == Some(&'[') && self.chars.get(self.pos + 1) == Some(&']')
            {
                self.pos += 2;
                base = SchemaType::Array(Box::new(base));
            } else {
                break;
            }
        }
        Some(base)
    }

    fn parse_ident(&mut self) -> Option<String> {
        self.skip_ws();
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
        {
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            Some(self.chars[start..self.pos].iter().collect())
        }
    }
}

pub(super) fn run(ast: &WorkflowAst, warnings: &mut Vec<ValidationIssue>) {
    // Schemas declared by AI transforms, by node id.
    let mut declared: FxHashMap<String, SchemaType> = FxHashMap::default();
    walk_nodes(&ast.nodes, &mut |node| {
        if let NodeBody::Transform {
            transform_type: TransformType::Ai,
        } = node.body
            && let Some(raw) = node
                .config
                .get("schema")
                .or_else(|| node.config.get("output-schema"))
                .or_else(|| node.config.get("outputSchema"))
                .and_then(|v| v.as_str())
        {
            // The attribute is either the DSL itself or the name of a
            // frontmatter schema whose value is the DSL.
            let source = ast
                .metadata
                .schemas
                .get(raw)
                .and_then(|v| v.as_str())
                .unwrap_or(raw);
            match SchemaType::parse(source) {
                Some(schema) => {
                    declared.insert(node.id.clone(), schema);
                }
                None => warnings.push(
                    ValidationIssue::new(
                        ValidationErrorKind::InvalidSchema,
                        format!("unparseable output schema on `{}`", node.id),
                    )
                    .at(node.loc),
                ),
            }
        }
    });

    if declared.is_empty() {
        return;
    }

    walk_nodes(&ast.nodes, &mut |node| {
        for value in node.config.values() {
            let Some(template) = value.as_str() else {
                continue;
            };
            let Ok(refs) = template_refs(template) else {
                continue;
            };
            for (root, path) in refs {
                if path.first().map(String::as_str) != Some("output") {
                    continue;
                }
                if let Some(schema) = declared.get(&root)
                    && !schema.has_path(&path[1..])
                {
                    warnings.push(
                        ValidationIssue::new(
                            ValidationErrorKind::TypeMismatch,
                            format!(
                                "node `{}` reads `{root}.output.{}` which is not in `{root}`'s schema",
                                node.id,
                                path[1..].join(".")
                            ),
                        )
                        .at(node.loc),
                    );
                }
            }
        }
    });
}
