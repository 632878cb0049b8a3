//! HTML parsing via `tl`.
//!
//! `tl` gives a borrowed, read-only tree. It is converted into the owned
//! [`Node`] model for diffing, and walked directly for element source
//! spans. Structure is checked separately by [`super::validate`].

use std::ops::Range;

use thiserror::Error;

use super::node::{Element, Node, is_void};
use super::validate;

/// A structural problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} {}", self.line, self.column, self.message)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ParseError(pub Diagnostic);

// =============================================================================
// Positions
// =============================================================================

/// Byte offset → (line, column), both 1-based.
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(src: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(src.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub fn position(&self, src: &str, offset: usize) -> (usize, usize) {
        let line = self.starts.partition_point(|&s| s <= offset).max(1);
        let start = self.starts[line - 1];
        let column = src
            .get(start..offset.min(src.len()))
            .map_or(1, |s| s.chars().count() + 1);
        (line, column)
    }

    /// Zero-based line/character → byte offset, clamped to the source.
    pub fn offset(&self, src: &str, line: usize, character: usize) -> usize {
        let Some(&start) = self.starts.get(line) else {
            return src.len();
        };
        let line_text = src[start..].split('\n').next().unwrap_or("");
        let within = line_text
            .char_indices()
            .nth(character)
            .map_or(line_text.len(), |(i, _)| i);
        start + within
    }
}

// =============================================================================
// Tree
// =============================================================================

/// Parse result with every structural problem found.
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    pub nodes: Vec<Node>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Parsed {
    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Parse markup, collecting every structural problem.
pub fn parse_document(src: &str) -> Parsed {
    let diagnostics = validate::check(src);
    let nodes = match tl::parse(src, tl::ParserOptions::default()) {
        Ok(dom) => {
            let parser = dom.parser();
            let mut nodes = Vec::new();
            for handle in dom.children() {
                convert(*handle, parser, &mut nodes);
            }
            nodes
        }
        Err(_) => Vec::new(),
    };
    Parsed { nodes, diagnostics }
}

/// Parse a body fragment, failing on the first structural problem.
pub fn parse_fragment(src: &str) -> Result<Vec<Node>, ParseError> {
    let mut parsed = parse_document(src);
    if parsed.diagnostics.is_empty() {
        Ok(parsed.nodes)
    } else {
        Err(ParseError(parsed.diagnostics.swap_remove(0)))
    }
}

/// Convert one `tl` node into `out`.
///
/// Children `tl` placed under a void element are hoisted to follow it.
fn convert(handle: tl::NodeHandle, parser: &tl::Parser, out: &mut Vec<Node>) {
    let Some(node) = handle.get(parser) else {
        return;
    };

    match node {
        tl::Node::Tag(tag) => {
            let mut element = Element::new(tag.name().as_utf8_str().to_ascii_lowercase());
            for (key, value) in tag.attributes().iter() {
                let key: &str = key.as_ref();
                let value = value.map(|v| v.to_string()).unwrap_or_default();
                element.set_attr(&key.to_ascii_lowercase(), &value);
            }
            element.attrs.sort_by(|a, b| a.0.cmp(&b.0));

            let mut children = Vec::new();
            for child in tag.children().top().iter() {
                convert(*child, parser, &mut children);
            }
            if is_void(&element.tag) {
                out.push(Node::Element(element));
                out.extend(children);
            } else {
                element.children = children;
                out.push(Node::Element(element));
            }
        }
        tl::Node::Raw(bytes) => {
            let text = bytes.as_utf8_str();
            if !text.is_empty() {
                out.push(Node::Text(text.into_owned()));
            }
        }
        tl::Node::Comment(bytes) => {
            let raw = bytes.as_utf8_str();
            let inner = raw
                .strip_prefix("<!--")
                .and_then(|s| s.strip_suffix("-->"))
                .unwrap_or(raw.as_ref());
            out.push(Node::Comment(inner.to_string()));
        }
    }
}

// =============================================================================
// Element spans
// =============================================================================

/// Source extent of one element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpan {
    pub tag: String,
    /// From `<` of the start tag to past the end tag (or end of input)
    pub range: Range<usize>,
    /// Offset just past the tag name, where attributes can be inserted
    pub name_end: usize,
    /// Content between the start and end tags
    pub inner: Range<usize>,
}

/// Locate every element in the source.
pub fn element_spans(src: &str) -> Vec<ElementSpan> {
    let Ok(dom) = tl::parse(src, tl::ParserOptions::default()) else {
        return Vec::new();
    };
    let parser = dom.parser();

    dom.nodes()
        .iter()
        .filter_map(|node| node.as_tag())
        .filter_map(|tag| {
            let (start, last) = tag.boundaries(parser);
            let name = tag.name().as_utf8_str().to_ascii_lowercase();
            let name_end = start + 1 + tag.name().as_bytes().len();
            let open_end = start_tag_end(src, name_end)?;

            let range = if is_void(&name) {
                start..open_end
            } else {
                start..(last + 1).min(src.len())
            };
            let self_closing = src[..open_end].ends_with("/>");
            let inner = if is_void(&name) || self_closing {
                open_end..open_end
            } else {
                open_end..close_tag_start(src, &range, &name).max(open_end)
            };
            Some(ElementSpan {
                tag: name,
                range,
                name_end,
                inner,
            })
        })
        .collect()
}

/// Offset just past the `>` ending the start tag, skipping quoted values.
fn start_tag_end(src: &str, from: usize) -> Option<usize> {
    let mut quote = None;
    for (i, b) in src.as_bytes().iter().enumerate().skip(from) {
        match (quote, b) {
            (Some(q), _) if *b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(*b),
            (None, b'>') => return Some(i + 1),
            (None, _) => {}
        }
    }
    None
}

/// Start of the `</name>` closing `range`, or its end when unclosed.
fn close_tag_start(src: &str, range: &Range<usize>, name: &str) -> usize {
    let outer = &src[range.clone()];
    outer
        .rfind("</")
        .filter(|&i| {
            outer[i + 2..]
                .get(..name.len())
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .map_or(range.end, |i| range.start + i)
}

// =============================================================================
// Tests
// =============================================================================
