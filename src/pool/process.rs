//! Body processors run inside workers.
//!
//! Processors are registered by extension before the pool starts. Each one
//! turns the task text into markup; the markup is then validated, the
//! `<body>` extracted, and the element under the cursor highlighted.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use rustc_hash::FxHashMap;

use super::task::{Report, TASK_SCHEMA_VERSION, WorkerError, WorkerResult, WorkerTask};
use crate::dom::parse::{LineIndex, element_spans, parse_document};
use crate::reload::message::CursorPosition;

/// Attribute marking the element under the editor cursor
pub const HIGHLIGHT_ATTR: &str = r#" data-highlight="true""#;

/// Elements never highlighted (they cover the whole page).
const UNHIGHLIGHTABLE: [&str; 3] = ["html", "head", "body"];

static PHP_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<\?(?:php|=)?.*?(?:\?>|\z)").expect("php block pattern"));

pub trait Processor: Send + Sync {
    /// Produce the markup for a task's text.
    fn render(&self, task: &WorkerTask) -> Result<String, WorkerError>;
}

/// HTML passes through unchanged.
pub struct MarkupProcessor;

impl Processor for MarkupProcessor {
    fn render(&self, task: &WorkerTask) -> Result<String, WorkerError> {
        Ok(task.text.clone())
    }
}

/// Runs PHP source through an interpreter, or strips PHP blocks when none
/// is configured.
pub struct PhpProcessor {
    executable: Option<PathBuf>,
}

impl PhpProcessor {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }
}

impl Processor for PhpProcessor {
    fn render(&self, task: &WorkerTask) -> Result<String, WorkerError> {
        match &self.executable {
            Some(php) => run_php(php, &task.text),
            None => Ok(strip_php(&task.text)),
        }
    }
}

fn run_php(php: &Path, text: &str) -> Result<String, WorkerError> {
    let process_err = |e: std::io::Error| WorkerError::Process(format!("{}: {e}", php.display()));

    let mut child = Command::new(php)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(process_err)?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes()).map_err(process_err)?;
    }
    let output = child.wait_with_output().map_err(process_err)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(WorkerError::Process(format!(
            "php exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn strip_php(text: &str) -> String {
    PHP_BLOCK_RE.replace_all(text, "").into_owned()
}

// =============================================================================
// Registry
// =============================================================================

/// Named processors keyed by lowercase extension
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: FxHashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// `html`/`htm` as markup, `php` through `php` (or stripped).
    pub fn with_defaults(php: Option<PathBuf>) -> Self {
        let mut registry = Self::default();
        let markup: Arc<dyn Processor> = Arc::new(MarkupProcessor);
        registry.register("html", Arc::clone(&markup));
        registry.register("htm", markup);
        registry.register("php", Arc::new(PhpProcessor::new(php)));
        registry
    }

    pub fn register(&mut self, extension: &str, processor: Arc<dyn Processor>) {
        self.processors
            .insert(extension.to_ascii_lowercase(), processor);
    }

    pub fn get(&self, extension: &str) -> Option<&Arc<dyn Processor>> {
        self.processors.get(extension)
    }

    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<_> = self.processors.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

// =============================================================================
// Task execution
// =============================================================================

/// Run one task to a result. Called on a worker thread.
pub fn run_task(registry: &ProcessorRegistry, task: &WorkerTask) -> Result<WorkerResult, WorkerError> {
    if task.version != TASK_SCHEMA_VERSION {
        return Err(WorkerError::VersionMismatch {
            expected: TASK_SCHEMA_VERSION,
            found: task.version,
        });
    }

    let ext = task.extension().unwrap_or_default();
    let processor = registry
        .get(&ext)
        .ok_or_else(|| WorkerError::Process(format!("no processor for `.{ext}` files")))?;

    let mut markup = processor.render(task)?;
    if task.should_highlight
        && let Some(cursor) = task.cursor_position
        && let Some(highlighted) = highlight(&markup, cursor)
    {
        markup = highlighted;
    }

    let report = validate(&markup);
    let (body, ignore) = match extract_body(&markup) {
        Some(body) => (body, false),
        None => (String::new(), true),
    };

    Ok(WorkerResult {
        version: TASK_SCHEMA_VERSION,
        file_name: task.file_name.clone(),
        body,
        report,
        ignore,
        time: false,
    })
}

/// Structural validation with `line:column` messages.
pub fn validate(markup: &str) -> Report {
    let parsed = parse_document(markup);
    Report {
        valid: parsed.is_valid(),
        messages: parsed.diagnostics.iter().map(ToString::to_string).collect(),
    }
}

/// Source of the `<body>` contents, `None` for documents without one.
pub fn extract_body(markup: &str) -> Option<String> {
    element_spans(markup)
        .into_iter()
        .find(|span| span.tag == "body")
        .map(|span| markup[span.inner].trim().to_string())
}

/// Mark the innermost element enclosing `cursor`.
pub fn highlight(markup: &str, cursor: CursorPosition) -> Option<String> {
    let offset = LineIndex::new(markup).offset(markup, cursor.line, cursor.character);
    let target = element_spans(markup)
        .into_iter()
        .filter(|span| !UNHIGHLIGHTABLE.contains(&span.tag.as_str()))
        .filter(|span| span.range.start <= offset && offset < span.range.end)
        .max_by_key(|span| (span.range.start, std::cmp::Reverse(span.range.end)))?;

    let mut out = String::with_capacity(markup.len() + HIGHLIGHT_ATTR.len());
    out.push_str(&markup[..target.name_end]);
    out.push_str(HIGHLIGHT_ATTR);
    out.push_str(&markup[target.name_end..]);
    Some(out)
}
