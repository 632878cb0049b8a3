//! Effects the browser engine asks its environment to perform.
//!
//! The engine never touches the page itself. A host (the real page binding
//! or a test double) performs each effect and reports results back through
//! the engine's `on_*` entry points.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::console::ConsoleLevel;
use super::popup::Popup;
use crate::dom::{Node, Patch, PatchError};

/// Query parameter appended to stylesheet URLs to defeat caching
pub const CACHE_BUST_PARAM: &str = "_reload";

static CACHE_BUST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(&|\?){CACHE_BUST_PARAM}=[0-9]+")).expect("cache-bust pattern")
});

/// Timers the engine schedules; each fires back as `on_timer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    StatusRetry,
    Reconnect,
    LostConnectionNotice,
    ForcedReload,
}

/// Answer of the status check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusResponse {
    /// Parsed body; ready when `status == "online"`
    Status(String),
    /// Network error or unparsable body
    Failed,
}

impl StatusResponse {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Status(s) if s == "online")
    }
}

/// A `<link>` element in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleLink {
    pub href: String,
    pub rel: String,
}

impl StyleLink {
    pub fn is_stylesheet(&self) -> bool {
        self.href.contains(".css") || self.rel.eq_ignore_ascii_case("stylesheet")
    }
}

/// Rewrite a stylesheet URL so the browser fetches it again.
pub fn cache_bust(href: &str, now_ms: u64) -> String {
    let base = CACHE_BUST_RE.replace_all(href, "");
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{CACHE_BUST_PARAM}={now_ms}")
}

pub trait Host {
    fn set_timer(&mut self, timer: Timer, delay: Duration);
    /// Request the status endpoint; answer with `on_status`.
    fn fetch_status(&mut self);
    /// Open the socket; answer with `on_open` or `on_close`.
    fn open_socket(&mut self);
    fn send(&mut self, frame: &str);

    fn reload(&mut self);
    fn navigate(&mut self, url: &str);

    /// Files this page declares (sent to the server on open)
    fn page_files(&self) -> Vec<String>;
    /// Current children of the live `<body>`
    fn body(&self) -> Vec<Node>;
    /// Apply patches to the live `<body>`.
    fn commit_body(&mut self, patches: &[Patch]) -> Result<(), PatchError>;
    fn replace_body(&mut self, html: &str);
    fn scroll_to_highlight(&mut self);

    fn stylesheet_links(&self) -> Vec<StyleLink>;
    /// Point link `index` at `href` and move it to the end of `<head>`.
    fn reinsert_stylesheet(&mut self, index: usize, href: &str);
    fn now_ms(&self) -> u64;

    fn show_popup(&mut self, popup: &Popup);
    fn hide_popup(&mut self);
    /// Original console output, bypassing forwarding
    fn console_output(&mut self, level: ConsoleLevel, message: &[String]);

    /// Start loading the diff engine; answer with `on_diff_engine_ready`.
    fn load_diff_engine(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_bust() {
        assert_eq!(cache_bust("/a.css", 5), "/a.css?_reload=5");
        assert_eq!(cache_bust("/a.css?v=2", 5), "/a.css?v=2&_reload=5");
        assert_eq!(cache_bust("/a.css?_reload=4", 5), "/a.css?_reload=5");
        assert_eq!(cache_bust("/a.css?v=2&_reload=4", 9), "/a.css?v=2&_reload=9");
    }

    #[test]
    fn test_repeated_refresh_replaces_param() {
        let mut href = "/site.css".to_string();
        for now in 1..=3 {
            href = cache_bust(&href, now);
        }
        assert_eq!(href, "/site.css?_reload=3");
    }

    #[test]
    fn test_stylesheet_filter() {
        let css = StyleLink {
            href: "/site.css".into(),
            rel: String::new(),
        };
        let sheet = StyleLink {
            href: "/theme".into(),
            rel: "Stylesheet".into(),
        };
        let icon = StyleLink {
            href: "/favicon.ico".into(),
            rel: "icon".into(),
        };
        assert!(css.is_stylesheet());
        assert!(sheet.is_stylesheet());
        assert!(!icon.is_stylesheet());
    }

    #[test]
    fn test_status_online() {
        assert!(StatusResponse::Status("online".into()).is_online());
        assert!(!StatusResponse::Status("starting".into()).is_online());
        assert!(!StatusResponse::Failed.is_online());
    }
}
