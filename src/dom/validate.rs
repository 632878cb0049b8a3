//! Tag-balance check.
//!
//! `tl` recovers from any markup without reporting what it repaired, so
//! structure is checked here: closing tags must match, and elements without
//! an optional end tag must be closed. Each problem becomes a
//! [`Diagnostic`] with its line and column.

use std::sync::LazyLock;

use regex::Regex;

use super::node::{is_raw_text, is_void};
use super::parse::{Diagnostic, LineIndex};

/// Elements whose end tag may be omitted.
const OPTIONAL_END: [&str; 18] = [
    "html", "head", "body", "p", "li", "dt", "dd", "option", "optgroup", "tr", "td", "th",
    "thead", "tbody", "tfoot", "colgroup", "rt", "rp",
];

/// Start tags that close an open `<p>`.
const CLOSES_P: [&str; 26] = [
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "main", "nav", "ol", "p", "pre", "ul",
];

/// Anything that starts markup: comment, declaration, end tag or start tag.
static OPENER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:!|\?|/?[A-Za-z])").expect("opener pattern"));

/// One complete construct. Group 1 is an end tag's name; groups 2 and 3
/// are a start tag's name and its self-closing slash.
static MARKUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s)<!--.*?-->|<![^>]*>|<\?.*?\?>",
        r"|</([A-Za-z][\w:.-]*)\s*>",
        r#"|<([A-Za-z][\w:.-]*)(?:\s+[^\s"'>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?)*\s*(/?)>"#,
    ))
    .expect("markup pattern")
});

/// Every structural problem in `src`, in source order.
pub fn check(src: &str) -> Vec<Diagnostic> {
    let mut checker = Checker::new(src);
    let mut pos = 0;

    while let Some(opener) = OPENER_RE.find_at(src, pos) {
        let at = opener.start();
        let Some(caps) = MARKUP_RE.captures_at(src, at).filter(|c| c.get(0).is_some_and(|m| m.start() == at)) else {
            checker.report(at, format!("unterminated {}", construct(opener.as_str())));
            return checker.diagnostics;
        };
        let whole = caps.get(0).map_or(at..at + 1, |m| m.range());
        pos = whole.end;

        if let Some(name) = caps.get(1) {
            checker.end(&name.as_str().to_ascii_lowercase(), at);
        } else if let Some(name) = caps.get(2) {
            let name = name.as_str().to_ascii_lowercase();
            let self_closing = caps.get(3).is_some_and(|s| !s.is_empty());
            if !self_closing && is_raw_text(&name) {
                pos = raw_text_end(src, pos, &name);
            }
            checker.start(name, self_closing, at);
        }
    }
    checker.finish()
}

fn construct(opener: &str) -> &'static str {
    match opener {
        "<!" | "<?" => "comment or declaration",
        _ if opener.starts_with("</") => "closing tag",
        _ => "tag",
    }
}

/// Offset of `</name` after a raw-text start tag (end of input if missing).
fn raw_text_end(src: &str, from: usize, name: &str) -> usize {
    src[from..]
        .to_ascii_lowercase()
        .find(&format!("</{name}"))
        .map_or(src.len(), |i| from + i)
}

fn closes_implicitly(open: &str, incoming: &str) -> bool {
    match open {
        "p" => CLOSES_P.contains(&incoming),
        "li" => incoming == "li",
        "dt" | "dd" => matches!(incoming, "dt" | "dd"),
        "option" => matches!(incoming, "option" | "optgroup"),
        "td" | "th" => matches!(incoming, "td" | "th" | "tr"),
        "tr" => incoming == "tr",
        "thead" | "tbody" => matches!(incoming, "tbody" | "tfoot"),
        _ => false,
    }
}

struct Checker<'a> {
    src: &'a str,
    lines: LineIndex,
    /// Open elements with the offset of their start tag
    open: Vec<(String, usize)>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Checker<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            lines: LineIndex::new(src),
            open: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn report(&mut self, offset: usize, message: String) {
        let (line, column) = self.lines.position(self.src, offset);
        self.diagnostics.push(Diagnostic {
            offset,
            line,
            column,
            message,
        });
    }

    fn start(&mut self, name: String, self_closing: bool, offset: usize) {
        while self
            .open
            .last()
            .is_some_and(|(top, _)| closes_implicitly(top, &name))
        {
            self.open.pop();
        }
        if !self_closing && !is_void(&name) {
            self.open.push((name, offset));
        }
    }

    fn end(&mut self, name: &str, offset: usize) {
        if is_void(name) {
            self.report(offset, format!("stray closing tag </{name}>"));
            return;
        }
        let Some(index) = self.open.iter().rposition(|(tag, _)| tag == name) else {
            self.report(offset, format!("unexpected closing tag </{name}>"));
            return;
        };
        while self.open.len() > index + 1 {
            self.close_unclosed(Some(name));
        }
        self.open.pop();
    }

    fn close_unclosed(&mut self, closing: Option<&str>) {
        let Some((tag, opened)) = self.open.pop() else {
            return;
        };
        if OPTIONAL_END.contains(&tag.as_str()) {
            return;
        }
        let (line, column) = self.lines.position(self.src, opened);
        let message = match closing {
            Some(found) => {
                format!("unclosed element <{tag}> (opened at {line}:{column}) before </{found}>")
            }
            None => format!("unclosed element <{tag}> (opened at {line}:{column})"),
        };
        self.report(opened, message);
    }

    fn finish(mut self) -> Vec<Diagnostic> {
        while !self.open.is_empty() {
            self.close_unclosed(None);
        }
        self.diagnostics
    }
}
