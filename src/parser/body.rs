//! XML body parsing: the node forest.
//!
//! The body is read with `quick-xml` into a small element tree first, then
//! lowered to [`NodeAst`] values with error accumulation: a malformed node
//! reports a diagnostic and parsing continues with its siblings. Only a
//! malformed document (mismatched tags, broken syntax) aborts the whole
//! body.
//!
//! External entity expansion is never performed: `quick-xml` resolves only
//! the predefined character entities, which closes the XXE hole by
//! construction. CDATA sections are accepted for text content. All
//! attribute values are stored verbatim; `{{…}}` resolution happens at
//! execution time.

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::Value;

use super::{ParseError, ParseErrorKind};
use crate::ast::{
    Backoff, Binding, BranchCase, CheckpointAction, ErrorConfig, NodeAst, NodeBody, RetryConfig,
    SourceType, TransformType,
};
use crate::source::{SourceLocation, SourceMap};

// ---------------------------------------------------------------------------
// Element tree
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct XmlElement {
    name: String,
    attrs: IndexMap<String, String>,
    children: Vec<XmlNode>,
    /// Byte offset of the element inside the (wrapped) XML input.
    offset: usize,
}

#[derive(Debug)]
enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Attribute lookup accepting both kebab-case and camelCase spellings.
    fn attr_any(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|n| self.attr(n))
    }

    fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    fn find_child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.name == name)
    }

    /// Concatenated text content of direct text/CDATA children.
    fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let XmlNode::Text(t) = child {
                out.push_str(t);
            }
        }
        out
    }
}

/// Parse the wrapped XML input into an element tree. Errors carry the byte
/// offset within the input.
fn parse_tree(xml: &str) -> Result<XmlElement, (String, usize)> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = vec![XmlElement {
        name: String::new(),
        attrs: IndexMap::new(),
        children: Vec::new(),
        offset: 0,
    }];

    loop {
        let event_offset = reader.buffer_position();
        match reader.read_event() {
            Err(e) => return Err((e.to_string(), reader.buffer_position())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => {
                let element = element_from_start(&start, event_offset)
                    .map_err(|msg| (msg, event_offset))?;
                stack.push(element);
            }
            Ok(Event::Empty(start)) => {
                let element = element_from_start(&start, event_offset)
                    .map_err(|msg| (msg, event_offset))?;
                stack
                    .last_mut()
                    .expect("stack has a root")
                    .children
                    .push(XmlNode::Element(element));
            }
            Ok(Event::End(_)) => {
                let finished = stack.pop().expect("stack has a root");
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(finished)),
                    None => return Err(("unbalanced closing tag".to_string(), event_offset)),
                }
            }
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|e| (e.to_string(), event_offset))?;
                if !text.trim().is_empty() {
                    stack
                        .last_mut()
                        .expect("stack has a root")
                        .children
                        .push(XmlNode::Text(text.into_owned()));
                }
            }
            Ok(Event::CData(cdata)) => {
                let text = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                stack
                    .last_mut()
                    .expect("stack has a root")
                    .children
                    .push(XmlNode::Text(text));
            }
            // Declarations, comments, processing instructions: skipped.
            Ok(_) => {}
        }
    }

    if stack.len() != 1 {
        return Err(("unclosed element at end of body".to_string(), xml.len()));
    }
    Ok(stack.pop().expect("root remains"))
}

fn element_from_start(
    start: &quick_xml::events::BytesStart<'_>,
    offset: usize,
) -> Result<XmlElement, String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = IndexMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| e.to_string())?
            .into_owned();
        attrs.insert(key, value);
    }
    Ok(XmlElement {
        name,
        attrs,
        children: Vec::new(),
        offset,
    })
}

// ---------------------------------------------------------------------------
// Lowering to the AST
// ---------------------------------------------------------------------------

struct BodyContext<'a> {
    source_map: &'a SourceMap,
    body_offset: usize,
    wrapper_len: usize,
    body_len: usize,
}

impl BodyContext<'_> {
    /// Map an offset inside the wrapped XML back into the document.
    fn loc(&self, xml_offset: usize) -> SourceLocation {
        let in_body = xml_offset.saturating_sub(self.wrapper_len).min(self.body_len);
        self.source_map.location_at(self.body_offset + in_body)
    }
}

pub(super) fn parse_body(
    body: &str,
    body_offset: usize,
    source_map: &SourceMap,
) -> Result<Vec<NodeAst>, Vec<ParseError>> {
    // Tolerate both bare node lists and an explicit <workflow> root.
    let (wrapped, wrapper_len) = if body.trim_start().starts_with("<workflow") {
        (body.to_string(), 0)
    } else {
        (format!("<workflow>{body}</workflow>"), "<workflow>".len())
    };

    let ctx = BodyContext {
        source_map,
        body_offset,
        wrapper_len,
        body_len: body.len(),
    };

    let root = match parse_tree(&wrapped) {
        Ok(root) => root,
        Err((message, offset)) => {
            return Err(vec![
                ParseError::new(ParseErrorKind::XmlInvalid, format!("invalid XML: {message}"))
                    .at(ctx.loc(offset)),
            ]);
        }
    };

    // Unwrap the single <workflow> element (explicit or synthetic).
    let top: Vec<&XmlElement> = match root.child_elements().collect::<Vec<_>>().as_slice() {
        [single] if single.name == "workflow" => single.child_elements().collect(),
        _ => root.child_elements().collect(),
    };

    let mut errors = Vec::new();
    let nodes = parse_siblings(&top, &ctx, &mut errors);
    if errors.is_empty() {
        Ok(nodes)
    } else {
        Err(errors)
    }
}

/// Parse a sibling list, accumulating diagnostics instead of stopping at
/// the first bad node.
fn parse_siblings(
    elements: &[&XmlElement],
    ctx: &BodyContext<'_>,
    errors: &mut Vec<ParseError>,
) -> Vec<NodeAst> {
    elements
        .iter()
        .filter_map(|e| parse_node(e, ctx, errors))
        .collect()
}

fn child_nodes(
    element: &XmlElement,
    ctx: &BodyContext<'_>,
    errors: &mut Vec<ParseError>,
) -> Vec<NodeAst> {
    let children: Vec<&XmlElement> = element.child_elements().collect();
    parse_siblings(&children, ctx, errors)
}

fn parse_node(
    element: &XmlElement,
    ctx: &BodyContext<'_>,
    errors: &mut Vec<ParseError>,
) -> Option<NodeAst> {
    let loc = ctx.loc(element.offset);

    let body = match element.name.as_str() {
        "source" => {
            let raw = element.attr("type").unwrap_or_default();
            match SourceType::parse(raw) {
                Some(source_type) => NodeBody::Source { source_type },
                None => {
                    errors.push(
                        ParseError::new(
                            ParseErrorKind::InvalidFieldValue,
                            format!("invalid source type `{raw}`"),
                        )
                        .at(loc)
                        .with_hint("Source type must be one of: http, file."),
                    );
                    return None;
                }
            }
        }
        "transform" => {
            let raw = element.attr("type").unwrap_or_default();
            match TransformType::parse(raw) {
                Some(transform_type) => NodeBody::Transform { transform_type },
                None => {
                    errors.push(
                        ParseError::new(
                            ParseErrorKind::InvalidFieldValue,
                            format!("invalid transform type `{raw}`"),
                        )
                        .at(loc)
                        .with_hint("Transform type must be one of: ai, template, map, filter."),
                    );
                    return None;
                }
            }
        }
        "sink" => {
            let raw = element.attr("type").unwrap_or_default();
            if raw.is_empty() {
                errors.push(
                    ParseError::new(
                        ParseErrorKind::MissingRequiredField,
                        "sink requires a `type` attribute",
                    )
                    .at(loc),
                );
                return None;
            }
            NodeBody::Sink {
                sink_type: raw.to_string(),
            }
        }
        "branch" => {
            let mut cases = Vec::new();
            let mut default = None;
            for child in element.child_elements() {
                match child.name.as_str() {
                    "case" => {
                        let condition = child.attr("when").unwrap_or_default().to_string();
                        let nodes = child_nodes(child, ctx, errors);
                        cases.push(BranchCase { condition, nodes });
                    }
                    "default" => {
                        default = Some(child_nodes(child, ctx, errors));
                    }
                    "on-error" => {}
                    other => errors.push(
                        ParseError::new(
                            ParseErrorKind::UnknownNodeType,
                            format!("unexpected `{other}` inside branch (expected case/default)"),
                        )
                        .at(ctx.loc(child.offset)),
                    ),
                }
            }
            NodeBody::Branch { cases, default }
        }
        "if" => {
            let condition = element.attr("condition").unwrap_or_default().to_string();
            let (then_nodes, else_nodes) = match element.find_child("then") {
                Some(then) => {
                    let then_nodes = child_nodes(then, ctx, errors);
                    let else_nodes = element
                        .find_child("else")
                        .map(|e| child_nodes(e, ctx, errors));
                    (then_nodes, else_nodes)
                }
                // Without a <then> wrapper, direct children are the then
                // arm and <else> is still honored.
                None => {
                    let direct: Vec<&XmlElement> = element
                        .child_elements()
                        .filter(|e| e.name != "else" && e.name != "on-error")
                        .collect();
                    let then_nodes = parse_siblings(&direct, ctx, errors);
                    let else_nodes = element
                        .find_child("else")
                        .map(|e| child_nodes(e, ctx, errors));
                    (then_nodes, else_nodes)
                }
            };
            NodeBody::If {
                condition,
                then_nodes,
                else_nodes,
            }
        }
        "loop" => NodeBody::Loop {
            max_iterations: parse_numeric_attr(
                element,
                &["max-iterations", "maxIterations", "max"],
                ctx,
                errors,
            ),
            break_condition: element
                .attr_any(&["break-condition", "breakCondition"])
                .map(str::to_string),
            body: non_error_children(element, ctx, errors),
        },
        "while" => NodeBody::While {
            condition: element.attr("condition").unwrap_or_default().to_string(),
            body: non_error_children(element, ctx, errors),
        },
        "foreach" => NodeBody::Foreach {
            collection: element.attr("collection").unwrap_or_default().to_string(),
            item_var: element
                .attr_any(&["item-var", "itemVar", "as"])
                .map(str::to_string),
            max_concurrency: parse_numeric_attr(
                element,
                &["max-concurrency", "maxConcurrency"],
                ctx,
                errors,
            ),
            body: non_error_children(element, ctx, errors),
        },
        "parallel" => {
            let mut branches = Vec::new();
            for child in element.child_elements() {
                if child.name == "branch" {
                    branches.push(child_nodes(child, ctx, errors));
                } else if child.name != "on-error" {
                    // A bare node is a single-node branch.
                    if let Some(node) = parse_node(child, ctx, errors) {
                        branches.push(vec![node]);
                    }
                }
            }
            NodeBody::Parallel { branches }
        }
        "checkpoint" => {
            let prompt = element
                .attr("prompt")
                .map(str::to_string)
                .unwrap_or_else(|| element.text().trim().to_string());
            let default_action = match element.attr_any(&["default", "default-action", "defaultAction"]) {
                Some(raw) => match CheckpointAction::parse(raw) {
                    Some(action) => action,
                    None => {
                        errors.push(
                            ParseError::new(
                                ParseErrorKind::InvalidFieldValue,
                                format!("invalid checkpoint default `{raw}`"),
                            )
                            .at(loc)
                            .with_hint("Checkpoint default must be `approve` or `reject`."),
                        );
                        return None;
                    }
                },
                None => CheckpointAction::default(),
            };
            NodeBody::Checkpoint {
                prompt,
                timeout: element.attr("timeout").map(str::to_string),
                default_action,
            }
        }
        "include" => {
            let mut bindings = Vec::new();
            for child in element.child_elements() {
                if child.name == "binding"
                    && let (Some(key), Some(value)) = (child.attr("key"), child.attr("value"))
                {
                    bindings.push(Binding {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
            }
            NodeBody::Include {
                workflow: element.attr("workflow").unwrap_or_default().to_string(),
                bindings,
            }
        }
        "call" => {
            let mut args = IndexMap::new();
            for child in element.child_elements() {
                if child.name == "arg"
                    && let Some(name) = child.attr("name")
                {
                    args.insert(
                        name.to_string(),
                        child.attr("value").unwrap_or_default().to_string(),
                    );
                }
            }
            NodeBody::Call {
                workflow: element.attr("workflow").unwrap_or_default().to_string(),
                args,
            }
        }
        "phase" => NodeBody::Phase {
            name: element.attr("name").unwrap_or_default().to_string(),
            children: non_error_children(element, ctx, errors),
        },
        "context" => {
            let mut entries = Vec::new();
            for child in element.child_elements() {
                if child.name == "entry"
                    && let (Some(key), Some(value)) = (child.attr("key"), child.attr("value"))
                {
                    entries.push(Binding {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
            }
            NodeBody::Context { entries }
        }
        "set" => NodeBody::Set {
            var: element.attr("var").unwrap_or_default().to_string(),
            value: element
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| element.text().trim().to_string()),
        },
        "delay" => NodeBody::Delay {
            duration: element.attr("duration").unwrap_or_default().to_string(),
        },
        "timeout" => NodeBody::Timeout {
            duration: element.attr("duration").unwrap_or_default().to_string(),
            on_timeout: element
                .attr_any(&["on-timeout", "onTimeout"])
                .map(str::to_string),
            children: non_error_children(element, ctx, errors),
        },
        other => {
            errors.push(
                ParseError::new(
                    ParseErrorKind::UnknownNodeType,
                    format!("unknown node type `{other}`"),
                )
                .at(loc),
            );
            return None;
        }
    };

    // Identifier: explicit `id`; phase falls back to `name`, set to `var`.
    let id = element
        .attr("id")
        .or_else(|| match element.name.as_str() {
            "phase" => element.attr("name"),
            "set" => element.attr("var"),
            _ => None,
        })
        .map(str::to_string);
    let Some(id) = id else {
        errors.push(
            ParseError::new(
                ParseErrorKind::MissingNodeId,
                format!("`{}` node requires an `id`", element.name),
            )
            .at(loc),
        );
        return None;
    };

    let mut config: IndexMap<String, Value> = element
        .attrs
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    // Template transforms capture their text content verbatim.
    if let NodeBody::Transform {
        transform_type: TransformType::Template,
    } = body
    {
        let template = element
            .find_child("template")
            .map(|t| t.text())
            .unwrap_or_else(|| element.text());
        config.insert("template".to_string(), Value::String(template));
    }

    Some(NodeAst {
        id,
        loc,
        input: element.attr("input").map(str::to_string),
        error_config: parse_error_config(element, ctx, errors),
        config,
        body,
    })
}

/// Children of a container, excluding its `<on-error>` declaration.
fn non_error_children(
    element: &XmlElement,
    ctx: &BodyContext<'_>,
    errors: &mut Vec<ParseError>,
) -> Vec<NodeAst> {
    let children: Vec<&XmlElement> = element
        .child_elements()
        .filter(|e| e.name != "on-error" && e.name != "template")
        .collect();
    parse_siblings(&children, ctx, errors)
}

/// `<on-error>` → [`ErrorConfig`], merging `<retry>` and `<fallback>`.
fn parse_error_config(
    element: &XmlElement,
    ctx: &BodyContext<'_>,
    errors: &mut Vec<ParseError>,
) -> Option<ErrorConfig> {
    let on_error = element.find_child("on-error")?;
    let mut config = ErrorConfig {
        retry: None,
        fallback: None,
    };

    if let Some(retry) = on_error.find_child("retry") {
        let max = match retry.attr("max") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) => n,
                Err(_) => {
                    errors.push(
                        ParseError::new(
                            ParseErrorKind::InvalidFieldValue,
                            format!("invalid retry max `{raw}`"),
                        )
                        .at(ctx.loc(retry.offset)),
                    );
                    return None;
                }
            },
            None => 3,
        };
        let backoff = match retry.attr("backoff") {
            Some(raw) => match Backoff::parse(raw) {
                Some(b) => b,
                None => {
                    errors.push(
                        ParseError::new(
                            ParseErrorKind::InvalidFieldValue,
                            format!("invalid backoff `{raw}`"),
                        )
                        .at(ctx.loc(retry.offset))
                        .with_hint("Backoff must be one of: fixed, linear, exponential."),
                    );
                    return None;
                }
            },
            None => Backoff::default(),
        };
        config.retry = Some(RetryConfig {
            when: retry.attr("when").map(str::to_string),
            max,
            backoff,
        });
    }

    if let Some(fallback) = on_error.find_child("fallback") {
        let target = fallback
            .attr("node")
            .map(str::to_string)
            .unwrap_or_else(|| fallback.text().trim().to_string());
        if !target.is_empty() {
            config.fallback = Some(target);
        }
    }

    if config.retry.is_none() && config.fallback.is_none() {
        None
    } else {
        Some(config)
    }
}

fn parse_numeric_attr(
    element: &XmlElement,
    names: &[&str],
    ctx: &BodyContext<'_>,
    errors: &mut Vec<ParseError>,
) -> Option<u64> {
    let raw = element.attr_any(names)?;
    match raw.parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            errors.push(
                ParseError::new(
                    ParseErrorKind::InvalidFieldValue,
                    format!("`{}` must be a positive integer, got `{raw}`", names[0]),
                )
                .at(ctx.loc(element.offset)),
            );
            None
        }
    }
}
