//! Browser Protocol Engine
//!
//! The logic of the script injected into served pages, as a sans-IO state
//! machine: reconnect/backoff, status probing, the hot-body
//! trial-then-commit transaction, popups and remote console forwarding.
//!
//! # Module Structure
//!
//! - `engine` - state machine and frame handling
//! - `host` - effects the page performs for the engine
//! - `backoff` - reconnect and status-check budgets
//! - `popup` - deduplicated notifications
//! - `console` - remote console forwarding

pub mod backoff;
pub mod console;
pub mod engine;
pub mod host;
pub mod popup;

#[cfg(test)]
mod tests;

pub use console::{ConsoleLevel, RemoteConsole};
pub use engine::{ClientEngine, ClientState, DiffEngineStatus};
pub use host::{Host, StatusResponse, StyleLink, Timer};
pub use popup::{Popup, PopupKind, PopupOptions};
