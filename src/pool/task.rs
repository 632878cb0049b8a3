//! Typed worker messages.
//!
//! Tasks and results cross the pool boundary by value. Both carry the
//! schema version so a dispatcher and worker built from different shapes
//! fail loudly instead of misreading each other.

use thiserror::Error;

use crate::reload::message::CursorPosition;

/// Current task/result schema
pub const TASK_SCHEMA_VERSION: u32 = 1;

/// Pool-assigned identity of an accepted task
pub type TaskId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTask {
    pub version: u32,
    /// Root-relative file name, also the key results are matched by
    pub file_name: String,
    pub text: String,
    pub should_highlight: bool,
    pub cursor_position: Option<CursorPosition>,
}

impl WorkerTask {
    pub fn new(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            version: TASK_SCHEMA_VERSION,
            file_name: file_name.into(),
            text: text.into(),
            should_highlight: false,
            cursor_position: None,
        }
    }

    /// Highlight the element under `cursor` in the produced body.
    pub fn with_cursor(mut self, cursor: CursorPosition) -> Self {
        self.should_highlight = true;
        self.cursor_position = Some(cursor);
        self
    }

    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Validation outcome of a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub valid: bool,
    /// `line:column message` per problem
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerResult {
    pub version: u32,
    pub file_name: String,
    /// Inner HTML of `<body>`
    pub body: String,
    pub report: Report,
    /// Nothing to send (e.g. a partial without `<body>`)
    pub ignore: bool,
    /// Processing was timed and logged
    pub time: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("task schema v{found}, worker expects v{expected}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("worker panicked")]
    Panicked,
    #[error("cancelled by pool shutdown")]
    Cancelled,
    #[error("{0}")]
    Process(String),
}

/// Exactly one per accepted task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub id: TaskId,
    pub file_name: String,
    pub result: Result<WorkerResult, WorkerError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder() {
        let task = WorkerTask::new("pages/About.HTML", "<p>x</p>");
        assert_eq!(task.version, TASK_SCHEMA_VERSION);
        assert!(!task.should_highlight);
        assert_eq!(task.extension().as_deref(), Some("html"));

        let task = task.with_cursor(CursorPosition {
            line: 1,
            character: 2,
        });
        assert!(task.should_highlight);
        assert!(task.cursor_position.is_some());
    }
}
