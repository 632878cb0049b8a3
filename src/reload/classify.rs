//! Change Classification
//!
//! Pure mapping from a filesystem change to the update it implies.
//! No side effects; unknown input falls back to a full reload.
//!
//! Rules, first match wins:
//!
//! | Condition                                  | Intent               |
//! |--------------------------------------------|----------------------|
//! | path is ignored                            | `Ignored`            |
//! | directory added/removed                    | `FullReload`         |
//! | `.css`, injection on                       | `CssRefresh[Silent]` |
//! | `.html`/`.php`, hot-body on                | `HotBodyCandidate`   |
//! | anything else                              | `FullReload`         |

use std::fmt;
use std::path::Path;

use regex::Regex;

use crate::config::ConfigError;

/// Package manager directories that are never watched for reloads.
const VENDOR_DIRS: [&str; 3] = ["node_modules", "bower_components", "jspm_packages"];

// =============================================================================
// Change events
// =============================================================================

/// What happened on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
    AddDir,
    UnlinkDir,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Change => "change",
            Self::Unlink => "unlink",
            Self::AddDir => "addDir",
            Self::UnlinkDir => "unlinkDir",
        }
    }

    pub fn is_dir(self) -> bool {
        matches!(self, Self::AddDir | Self::UnlinkDir)
    }
}

/// A single filesystem change, consumed once by the classifier.
///
/// `path` is root-relative with `/` separators, the same form browsers
/// report as their associated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

// =============================================================================
// Update intents
// =============================================================================

/// Classified action a change should trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    FullReload,
    CssRefresh,
    CssRefreshSilent,
    HotBodyCandidate,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateIntent {
    pub kind: IntentKind,
    pub path: String,
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FullReload => "full-reload",
            Self::CssRefresh => "css-refresh",
            Self::CssRefreshSilent => "css-refresh-silent",
            Self::HotBodyCandidate => "hot-body-candidate",
            Self::Ignored => "ignored",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Ignore predicate
// =============================================================================

/// Paths that never trigger an update.
///
/// Always ignores editor artifacts (any path component starting with `.`/`#`,
/// or ending with `__`/`~`) and vendored package directories; configured globs and an
/// optional regex extend the set.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    globs: Vec<glob::Pattern>,
    pattern: Option<Regex>,
}

impl IgnoreMatcher {
    pub fn new(globs: &[String], pattern: Option<&str>) -> Result<Self, ConfigError> {
        let globs = globs
            .iter()
            .map(|g| {
                glob::Pattern::new(g)
                    .map_err(|e| ConfigError::Validation(format!("ignore glob `{g}`: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let pattern = pattern
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| ConfigError::Validation(format!("ignore_pattern `{p}`: {e}")))
            })
            .transpose()?;
        Ok(Self { globs, pattern })
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        is_editor_artifact(path)
            || in_vendor_dir(path)
            || self.globs.iter().any(|g| g.matches(path))
            || self.pattern.as_ref().is_some_and(|re| re.is_match(path))
    }
}

/// Dotfiles, `#autosave#` files, `name__` and `name~` backups, and
/// anything inside such a directory (`.git/`, `.cache/`).
fn is_editor_artifact(path: &str) -> bool {
    path.split(['/', '\\'])
        .filter(|part| !matches!(*part, "" | "." | ".."))
        .any(|part| {
            part.starts_with('.') || part.starts_with('#') || part.ends_with("__") || part.ends_with('~')
        })
}

fn in_vendor_dir(path: &str) -> bool {
    path.split(['/', '\\']).any(|part| VENDOR_DIRS.contains(&part))
}

// =============================================================================
// Classification
// =============================================================================

/// Feature switches consulted by the classifier
#[derive(Debug, Clone, Default)]
pub struct ClassifyOptions {
    /// Refresh stylesheets in place instead of reloading
    pub inject_css: bool,
    /// Show a notice in the browser after a stylesheet refresh
    pub css_notice: bool,
    /// Send HTML/PHP changes through the hot-body path
    pub inject_body: bool,
    pub ignore: IgnoreMatcher,
}

/// Classify a change. Pure, never fails.
pub fn classify(event: &ChangeEvent, options: &ClassifyOptions) -> UpdateIntent {
    let kind = classify_kind(event, options);
    UpdateIntent {
        kind,
        path: event.path.clone(),
    }
}

fn classify_kind(event: &ChangeEvent, options: &ClassifyOptions) -> IntentKind {
    if options.ignore.is_ignored(&event.path) {
        return IntentKind::Ignored;
    }
    if event.kind.is_dir() {
        return IntentKind::FullReload;
    }

    let ext = Path::new(&event.path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("css") if options.inject_css && options.css_notice => IntentKind::CssRefresh,
        Some("css") if options.inject_css => IntentKind::CssRefreshSilent,
        Some("html" | "php") if options.inject_body => IntentKind::HotBodyCandidate,
        _ => IntentKind::FullReload,
    }
}

// =============================================================================
// Tests
// =============================================================================
