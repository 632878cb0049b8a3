//! Terminal output.
//!
//! - `log!` always prints, `notice!` is hidden at level 0, `debug!` needs
//!   level 2 (or `--verbose`)
//! - [`UpdateStatus`] keeps the outcome of the latest hot update in one
//!   block that is redrawn instead of scrolled
//! - [`log_browser`] prints console lines forwarded by browser sessions
//!
//! ```ignore
//! notice!("watch"; "change detected {}", path);
//! debug!("ws"; "broadcast to {} sessions", count);
//! ```

use std::io::{Write, stdout};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU8, Ordering};

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::{OwoColorize, Style};
use parking_lot::Mutex;

use crate::actor::ws::ColorTag;
use crate::client::ConsoleLevel;

/// 0 errors only, 1 change notices, 2+ debug
static LEVEL: AtomicU8 = AtomicU8::new(1);

pub fn set_level(level: u8) {
    LEVEL.store(level, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    LEVEL.load(Ordering::Relaxed) >= 2
}

pub fn is_quiet() -> bool {
    LEVEL.load(Ordering::Relaxed) == 0
}

#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Debug output, printed at level 2+
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

/// Change notices, hidden at level 0
#[macro_export]
macro_rules! notice {
    ($module:expr; $($arg:tt)*) => {{
        if !$crate::logger::is_quiet() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

pub fn log(module: &str, message: &str) {
    let prefix = format!("[{module}]");
    let prefix = prefix.style(prefix_style(module));

    let mut out = stdout().lock();
    execute!(out, Clear(ClearType::UntilNewLine)).ok();
    writeln!(out, "{prefix} {message}").ok();
    out.flush().ok();
}

fn prefix_style(module: &str) -> Style {
    let style = Style::new().bold();
    match module {
        "serve" | "status" => style.bright_blue(),
        "watch" => style.bright_green(),
        "css" => style.bright_magenta(),
        "ws" | "browser" => style.bright_cyan(),
        "pool" => style.bright_white(),
        "error" => style.bright_red(),
        _ => style.bright_yellow(),
    }
}

/// A console call forwarded by a session, prefixed with its color-tagged IP.
pub fn log_browser(color: ColorTag, ip: &str, level: ConsoleLevel, message: &str) {
    let tag = color.paint(&format!("[{ip}]"));
    let body = match level {
        ConsoleLevel::Log => message.to_string(),
        ConsoleLevel::Warn => message.yellow().to_string(),
        ConsoleLevel::Error => message.red().to_string(),
    };
    log("browser", &format!("{tag} {body}"));
}

// ============================================================================
// Update status
// ============================================================================

/// Result of processing one hot-body candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Patched,
    Invalid,
}

/// Redrawn status block for hot updates.
///
/// Consecutive reports replace each other, so saving the same file over and
/// over leaves one block on screen rather than a scroll of repeats.
#[derive(Debug, Default)]
pub struct UpdateStatus {
    /// Height of the block currently on screen
    height: usize,
}

static UPDATE_STATUS: LazyLock<Mutex<UpdateStatus>> =
    LazyLock::new(|| Mutex::new(UpdateStatus::default()));

impl UpdateStatus {
    pub fn report(&mut self, outcome: Outcome, file: &str, diagnostics: &[String]) {
        if outcome == Outcome::Patched && is_quiet() {
            return;
        }
        let block = render(outcome, file, diagnostics);

        let mut out = stdout().lock();
        match u16::try_from(self.height) {
            Ok(0) | Err(_) => {}
            Ok(up) => {
                execute!(out, cursor::MoveUp(up), Clear(ClearType::FromCursorDown)).ok();
            }
        }
        writeln!(out, "{} {block}", format!("[{}]", clock()).dimmed()).ok();
        out.flush().ok();

        self.height = block.lines().count().max(1);
    }
}

fn render(outcome: Outcome, file: &str, diagnostics: &[String]) -> String {
    let mut block = match outcome {
        Outcome::Patched => format!("{} patched {file}", "✓".green()),
        Outcome::Invalid => format!("{} invalid {file}", "✗".red()),
    };
    for line in diagnostics {
        block.push_str("\n  ");
        block.push_str(line);
    }
    block
}

/// HH:MM:SS (UTC)
fn clock() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    format!("{:02}:{:02}:{:02}", secs / 3600 % 24, secs / 60 % 60, secs % 60)
}

pub fn status_patched(file: &str) {
    UPDATE_STATUS.lock().report(Outcome::Patched, file, &[]);
}

pub fn status_invalid(file: &str, diagnostics: &[String]) {
    UPDATE_STATUS.lock().report(Outcome::Invalid, file, diagnostics);
}
